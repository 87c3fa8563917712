//! Destination trace writer.
//!
//! A [`CtfWriter`] owns one destination graph and the directory it is
//! written to: a `metadata` file, rewritten whenever the schema changed since
//! the last write, and one `stream_<index>` data file per stream. Events are
//! buffered per stream until the packet they belong to is flushed.

use std::{
    fs,
    path::{Path, PathBuf},
};

use prost::Message;

use crate::{
    error::{Error, Result},
    ir::{
        field::{FieldValue, StructType, StructValue},
        stream::{EventClass, StreamClass},
        StreamClassHandle, StreamHandle, TraceClass,
    },
    metadata::write_metadata,
    proto,
    trace::{writer::PacketFileWriter, RawEvent, CTF_PACKET_MAGIC},
};

struct PendingPacket {
    context: StructValue,
    events: Vec<RawEvent>,
}

struct WriterStream {
    file: PacketFileWriter,
    open_packet: Option<PendingPacket>,
    seq_num: u64,
    /// Latest clock value written or appended on this stream.
    last_ts: u64,
}

pub struct CtfWriter {
    root: PathBuf,
    trace: TraceClass,
    streams: Vec<WriterStream>,
    packetized_metadata: bool,
    metadata_dirty: bool,
    closed: bool,
}

fn event_timestamp(event: &RawEvent) -> Option<u64> {
    event.header.as_ref()?.get("timestamp")?.as_u64()
}

/// Orders `value` as `layout` and checks it. Every declared field must be
/// set and no undeclared field may be.
fn conform(
    what: &str,
    layout: Option<&StructType>,
    value: Option<StructValue>,
) -> std::result::Result<Option<StructValue>, String> {
    match (layout, value) {
        (None, None) => Ok(None),
        (None, Some(v)) if v.is_empty() => Ok(None),
        (None, Some(_)) => Err(format!("{} is not declared", what)),
        (Some(layout), value) => {
            let value = value.unwrap_or_default();
            if let Some(f) = layout.fields.iter().find(|f| !value.contains(&f.name)) {
                return Err(format!("{} field `{}` is not set", what, f.name));
            }

            let value = value.ordered_as(layout);
            layout
                .check(&value)
                .map_err(|e| format!("{}: {}", what, e))?;

            Ok(Some(value))
        }
    }
}

impl CtfWriter {
    /// Creates the trace directory `root` with an empty destination graph.
    pub fn create<P: Into<PathBuf>>(root: P, packetized_metadata: bool) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::io(&root, e))?;

        tracing::debug!("created destination trace `{}`", root.display());

        Ok(Self {
            root,
            trace: TraceClass::new(),
            streams: Vec::new(),
            packetized_metadata,
            metadata_dirty: true,
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn trace(&self) -> &TraceClass {
        &self.trace
    }

    /// Changes made through the returned graph are written with the next
    /// metadata update.
    pub fn trace_mut(&mut self) -> &mut TraceClass {
        self.metadata_dirty = true;
        &mut self.trace
    }

    pub fn add_stream_class(&mut self, stream_class: StreamClass) -> Result<StreamClassHandle> {
        let handle = self.trace.add_stream_class(stream_class)?;
        self.metadata_dirty = true;
        Ok(handle)
    }

    pub fn add_event_class(
        &mut self,
        stream_class: StreamClassHandle,
        event_class: EventClass,
    ) -> Result<()> {
        self.trace.add_event_class(stream_class, event_class)?;
        self.metadata_dirty = true;
        Ok(())
    }

    /// Creates a stream of `class` and its data file.
    pub fn create_stream(
        &mut self,
        class: StreamClassHandle,
        instance_id: Option<u64>,
    ) -> Result<StreamHandle> {
        let index = self.streams.len();
        let file = PacketFileWriter::create(self.root.join(format!("stream_{}", index)))?;
        let handle = self.trace.create_stream(class, instance_id)?;
        debug_assert_eq!(handle.index(), index);

        self.streams.push(WriterStream {
            file,
            open_packet: None,
            seq_num: 0,
            last_ts: 0,
        });

        Ok(handle)
    }

    /// Number of packets flushed on `stream`.
    pub fn packet_count(&self, stream: StreamHandle) -> Option<usize> {
        self.streams.get(stream.index()).map(|s| s.file.count())
    }

    pub fn has_open_packet(&self, stream: StreamHandle) -> bool {
        self.streams
            .get(stream.index())
            .is_some_and(|s| s.open_packet.is_some())
    }

    /// Opens a packet on `stream` with the given context.
    pub fn set_packet_context(&mut self, stream: StreamHandle, context: StructValue) -> Result<()> {
        let ws = self
            .streams
            .get_mut(stream.index())
            .ok_or(Error::MissingMapping("stream"))?;

        if ws.open_packet.is_some() {
            return Err(Error::PacketAlreadyOpen(stream.index() as u64));
        }

        ws.open_packet = Some(PendingPacket {
            context,
            events: Vec::new(),
        });

        Ok(())
    }

    /// Appends an event of class `event_class_id` to the open packet of
    /// `stream`. The event header `id` and `timestamp` are set when missing.
    pub fn append_event(
        &mut self,
        stream: StreamHandle,
        event_class_id: u64,
        mut event: RawEvent,
    ) -> Result<()> {
        let index = stream.index() as u64;
        let ws = self
            .streams
            .get_mut(stream.index())
            .ok_or(Error::MissingMapping("stream"))?;
        let sc = self.trace.stream_class(self.trace.stream(stream).class);
        let ec = sc
            .event_class_by_id(event_class_id)
            .ok_or(Error::UnknownEventClass {
                stream_class_id: sc.id,
                id: event_class_id,
            })?;

        let pending = ws
            .open_packet
            .as_mut()
            .ok_or(Error::PacketNotOpen(index))?;

        if let Some(layout) = &sc.event_header {
            let header = event.header.get_or_insert_with(StructValue::new);
            if layout.field("id").is_some() && !header.contains("id") {
                header.set("id", FieldValue::Unsigned(ec.id));
            }
            if layout.field("timestamp").is_some() && !header.contains("timestamp") {
                header.set("timestamp", FieldValue::Unsigned(ws.last_ts));
            }
        }

        let append_err = |reason| Error::Append {
            stream: index,
            reason,
        };

        event.header =
            conform("event header", sc.event_header.as_ref(), event.header).map_err(append_err)?;
        event.stream_context = conform(
            "event context",
            sc.event_context.as_ref(),
            event.stream_context,
        )
        .map_err(append_err)?;
        event.context = conform(
            "event specific context",
            ec.context.as_ref(),
            event.context,
        )
        .map_err(append_err)?;
        event.payload = conform("event payload", Some(&ec.payload), Some(event.payload))
            .map_err(append_err)?
            .unwrap_or_default();

        if let Some(ts) = event_timestamp(&event) {
            ws.last_ts = ws.last_ts.max(ts);
        }

        pending.events.push(event);
        Ok(())
    }

    /// Writes the open packet of `stream` and closes it.
    ///
    /// The packet header, the packet sizes and any unset timestamp,
    /// discarded event count or sequence number are filled in first. The
    /// packet is dropped when it does not validate.
    pub fn flush(&mut self, stream: StreamHandle) -> Result<()> {
        let index = stream.index() as u64;
        let ws = self
            .streams
            .get_mut(stream.index())
            .ok_or(Error::MissingMapping("stream"))?;
        let pending = ws.open_packet.take().ok_or(Error::PacketNotOpen(index))?;

        let s = self.trace.stream(stream);
        let sc = self.trace.stream_class(s.class);
        let flush_err = |reason| Error::Flush {
            stream: index,
            reason,
        };

        let events: Vec<proto::Event> = pending.events.iter().map(proto::Event::from).collect();
        let content_bits = events.iter().map(Message::encoded_len).sum::<usize>() as u64 * 8;

        let mut header = StructValue::new();
        if let Some(layout) = &self.trace.packet_header {
            for field in &layout.fields {
                let value = match field.name.as_str() {
                    "magic" => CTF_PACKET_MAGIC,
                    "stream_id" => sc.id,
                    "stream_instance_id" => s.instance_id.unwrap_or(index),
                    _ => continue,
                };
                header.set(&field.name, FieldValue::Unsigned(value));
            }
        }
        let header = conform("packet header", self.trace.packet_header.as_ref(), Some(header))
            .map_err(flush_err)?;

        let mut context = pending.context;
        if let Some(layout) = &sc.packet_context {
            let begin = pending
                .events
                .first()
                .and_then(event_timestamp)
                .unwrap_or(ws.last_ts);
            let end = pending
                .events
                .iter()
                .filter_map(event_timestamp)
                .max()
                .unwrap_or(begin);

            for (name, value, always) in [
                ("content_size", content_bits, true),
                ("packet_size", content_bits, true),
                ("timestamp_begin", begin, false),
                ("timestamp_end", end, false),
                ("events_discarded", 0, false),
                ("packet_seq_num", ws.seq_num, false),
            ] {
                if layout.field(name).is_some() && (always || !context.contains(name)) {
                    context.set(name, FieldValue::Unsigned(value));
                }
            }
        }
        let context = conform("packet context", sc.packet_context.as_ref(), Some(context))
            .map_err(flush_err)?;

        let packet = proto::Packet {
            header: header.as_ref().map(proto::StructValue::from),
            context: context.as_ref().map(proto::StructValue::from),
            events,
        };
        ws.file.write_proto(&packet)?;
        ws.seq_num += 1;

        if let Some(ts) = context
            .as_ref()
            .and_then(|c| c.get("timestamp_end"))
            .and_then(FieldValue::as_u64)
        {
            ws.last_ts = ws.last_ts.max(ts);
        }

        tracing::debug!(
            "flushed packet {} of stream {} ({} events)",
            ws.seq_num - 1,
            index,
            pending.events.len()
        );

        self.flush_metadata()
    }

    /// Writes the metadata file if the schema changed since the last write.
    pub fn flush_metadata(&mut self) -> Result<()> {
        if self.metadata_dirty {
            write_metadata(&self.root, &self.trace, self.packetized_metadata)?;
            self.metadata_dirty = false;
        }

        Ok(())
    }

    /// Flushes the data files and the metadata. Packets still open are
    /// dropped. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        for ws in &mut self.streams {
            if let Some(pending) = ws.open_packet.take() {
                tracing::warn!(
                    "dropping unflushed packet of `{}` ({} events)",
                    ws.file.path().display(),
                    pending.events.len()
                );
            }
            ws.file.close()?;
        }

        self.flush_metadata()?;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::clock::ClockClass,
        metadata::{JsonMetadataProvider, MetadataProvider},
        test_support::*,
        trace::{reader::FramedCursor, RecordCursor},
    };

    fn sample_writer(root: &Path) -> (CtfWriter, StreamHandle) {
        let mut writer = CtfWriter::create(root, false).unwrap();
        writer.trace_mut().packet_header = Some(packet_header_type());
        writer
            .trace_mut()
            .add_clock_class(ClockClass::new(CLOCK, 1_000_000_000))
            .unwrap();
        let sc = writer.add_stream_class(sample_stream_class(2)).unwrap();
        let stream = writer.create_stream(sc, Some(9)).unwrap();
        (writer, stream)
    }

    #[test]
    fn test_flush_populates_packet() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("trace_000");
        let (mut writer, stream) = sample_writer(&root);

        writer.set_packet_context(stream, StructValue::new()).unwrap();
        writer
            .append_event(stream, 0, sample_event(15, -1, "first"))
            .unwrap();
        let tick = RawEvent {
            header: Some(StructValue::new().with("timestamp", FieldValue::Unsigned(20))),
            ..Default::default()
        };
        writer.append_event(stream, 1, tick).unwrap();
        writer.flush(stream).unwrap();

        writer.set_packet_context(stream, StructValue::new()).unwrap();
        writer.flush(stream).unwrap();
        writer.close().unwrap();
        assert_eq!(writer.packet_count(stream), Some(2));

        let mut cursor = FramedCursor::open(root.join("stream_0")).unwrap();
        let first = cursor.next_packet().unwrap().unwrap();

        let header = first.header.unwrap();
        assert_eq!(header.get("magic"), Some(&FieldValue::Unsigned(CTF_PACKET_MAGIC)));
        assert_eq!(header.get("stream_id"), Some(&FieldValue::Unsigned(2)));
        assert_eq!(header.get("stream_instance_id"), Some(&FieldValue::Unsigned(9)));

        let events_len: usize = first
            .events
            .iter()
            .map(|e| proto::Event::from(e).encoded_len())
            .sum();
        let context = first.context.unwrap();
        assert_eq!(
            context.get("content_size"),
            Some(&FieldValue::Unsigned(events_len as u64 * 8))
        );
        assert_eq!(context.get("timestamp_begin"), Some(&FieldValue::Unsigned(15)));
        assert_eq!(context.get("timestamp_end"), Some(&FieldValue::Unsigned(20)));
        assert_eq!(context.get("packet_seq_num"), Some(&FieldValue::Unsigned(0)));

        let tick = &first.events[1].header;
        assert_eq!(
            tick.as_ref().unwrap().get("id"),
            Some(&FieldValue::Unsigned(1))
        );

        let second = cursor.next_packet().unwrap().unwrap();
        let context = second.context.unwrap();
        assert_eq!(context.get("packet_seq_num"), Some(&FieldValue::Unsigned(1)));
        assert_eq!(context.get("timestamp_begin"), Some(&FieldValue::Unsigned(20)));
        assert_eq!(context.get("content_size"), Some(&FieldValue::Unsigned(0)));
        assert!(cursor.next_packet().unwrap().is_none());

        let trace = JsonMetadataProvider.load(&root).unwrap();
        assert!(trace.stream_class_by_id(2).is_some());
    }

    #[test]
    fn test_packet_state() {
        let dir = tempfile::tempdir().unwrap();
        let (mut writer, stream) = sample_writer(dir.path());

        assert!(matches!(writer.flush(stream), Err(Error::PacketNotOpen(0))));
        assert!(matches!(
            writer.append_event(stream, 0, sample_event(1, 1, "x")),
            Err(Error::PacketNotOpen(0))
        ));

        writer.set_packet_context(stream, StructValue::new()).unwrap();
        assert!(matches!(
            writer.set_packet_context(stream, StructValue::new()),
            Err(Error::PacketAlreadyOpen(0))
        ));

        writer.flush(stream).unwrap();
        assert!(matches!(writer.flush(stream), Err(Error::PacketNotOpen(0))));
        assert_eq!(writer.packet_count(stream), Some(1));
    }

    #[test]
    fn test_invalid_records() {
        let dir = tempfile::tempdir().unwrap();
        let (mut writer, stream) = sample_writer(dir.path());
        writer.set_packet_context(stream, StructValue::new()).unwrap();

        let mut event = sample_event(1, 1, "x");
        event.payload = StructValue::new().with("a", FieldValue::Signed(1));
        assert!(matches!(
            writer.append_event(stream, 0, event),
            Err(Error::Append { .. })
        ));

        let mut event = sample_event(1, 1 << 40, "x");
        assert!(matches!(
            writer.append_event(stream, 0, event.clone()),
            Err(Error::Append { .. })
        ));
        event.payload.set("a", FieldValue::Signed(3));
        assert!(matches!(
            writer.append_event(stream, 7, event),
            Err(Error::UnknownEventClass { id: 7, .. })
        ));

        writer.flush(stream).unwrap();
        writer
            .set_packet_context(
                stream,
                StructValue::new().with("cpu_id", FieldValue::Unsigned(0)),
            )
            .unwrap();
        assert!(matches!(writer.flush(stream), Err(Error::Flush { .. })));
        assert!(!writer.has_open_packet(stream));
        assert_eq!(writer.packet_count(stream), Some(1));
    }
}
