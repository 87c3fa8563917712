//! Per-port notification iteration.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::Arc,
};

use super::assembler::{resolve_stream_class, OutputPort};
use crate::{
    error::{Error, Result},
    ir::{field::FieldValue, StreamHandle, TraceClass},
    notification::{Event, Notification, Packet},
    trace::{RawEvent, RawPacket, RecordCursor, RecordSource, CTF_PACKET_MAGIC},
};

/// An open data-stream file of a group, turning its packets into
/// notifications.
pub struct DataStreamFile {
    path: PathBuf,
    cursor: Box<dyn RecordCursor>,
    trace: Arc<TraceClass>,
    stream: StreamHandle,
    pending: VecDeque<Notification>,
}

impl DataStreamFile {
    pub fn open(
        records: &dyn RecordSource,
        path: &Path,
        trace: Arc<TraceClass>,
        stream: StreamHandle,
    ) -> Result<Self> {
        tracing::debug!("opening stream file `{}`", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            cursor: records.open(path)?,
            trace,
            stream,
            pending: VecDeque::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the next notification, or `None` at the end of the file.
    pub fn next_notification(&mut self) -> Result<Option<Notification>> {
        if let Some(notif) = self.pending.pop_front() {
            return Ok(Some(notif));
        }

        match self.cursor.next_packet()? {
            Some(packet) => {
                self.decode_packet(packet)?;
                Ok(self.pending.pop_front())
            }
            None => Ok(None),
        }
    }

    fn check_header(&self, packet: &RawPacket) -> Result<()> {
        let Some(header) = packet.header.as_ref() else {
            return Ok(());
        };

        if let Some(magic) = header.get("magic") {
            if magic.as_u64() != Some(CTF_PACKET_MAGIC) {
                return Err(Error::decode(
                    &self.path,
                    format!("invalid packet magic {}", magic),
                ));
            }
        }

        let expected = self.trace.stream(self.stream).class;
        if resolve_stream_class(&self.trace, Some(header), &self.path)? != expected {
            return Err(Error::decode(
                &self.path,
                "packet belongs to another stream class",
            ));
        }

        Ok(())
    }

    fn decode_packet(&mut self, raw: RawPacket) -> Result<()> {
        self.check_header(&raw)?;

        let sc = self.trace.stream_class(self.trace.stream(self.stream).class);
        let layout = sc.packet_context.as_ref();
        let begin = self
            .trace
            .clock_snapshot(layout, raw.context.as_ref(), "timestamp_begin");
        let end = self
            .trace
            .clock_snapshot(layout, raw.context.as_ref(), "timestamp_end");

        let packet = Arc::new(Packet {
            trace: self.trace.clone(),
            stream: self.stream,
            header: raw.header,
            context: raw.context,
            begin,
            end,
        });

        let mut notifs = VecDeque::with_capacity(raw.events.len() + 2);
        notifs.push_back(Notification::PacketBegin(packet.clone()));
        for event in raw.events {
            notifs.push_back(Notification::Event(self.decode_event(&packet, event)?));
        }
        notifs.push_back(Notification::PacketEnd(packet));

        self.pending = notifs;
        Ok(())
    }

    fn decode_event(&self, packet: &Arc<Packet>, raw: RawEvent) -> Result<Event> {
        let sc = packet.stream_class();

        let id = match raw.header.as_ref().and_then(|h| h.get("id")) {
            Some(FieldValue::Unsigned(id)) => *id,
            Some(other) => {
                return Err(Error::decode(
                    &self.path,
                    format!("invalid event id {}", other),
                ))
            }
            None => match sc.event_classes() {
                [only] => only.id,
                _ => return Err(Error::decode(&self.path, "event header has no id")),
            },
        };

        if sc.event_class_by_id(id).is_none() {
            return Err(Error::UnknownEventClass {
                stream_class_id: sc.id,
                id,
            });
        }

        let clock = self.trace.clock_snapshot(
            sc.event_header.as_ref(),
            raw.header.as_ref(),
            "timestamp",
        );

        Ok(Event {
            packet: packet.clone(),
            event_class_id: id,
            header: raw.header,
            stream_context: raw.stream_context,
            context: raw.context,
            payload: raw.payload,
            clock,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorState {
    Active,
    Done,
}

/// Notifications of one output port, reading its group's files one after
/// the other.
pub struct NotificationIterator {
    port: OutputPort,
    records: Arc<dyn RecordSource>,
    file_index: usize,
    current: Option<DataStreamFile>,
    state: IteratorState,
}

impl NotificationIterator {
    pub fn init(port: OutputPort, records: Arc<dyn RecordSource>) -> Result<Self> {
        let first = port.group().files().first().ok_or(Error::EmptyGroup)?;
        let current = DataStreamFile::open(
            records.as_ref(),
            &first.path,
            port.trace().clone(),
            port.group().stream(),
        )?;

        Ok(Self {
            port,
            records,
            file_index: 0,
            current: Some(current),
            state: IteratorState::Active,
        })
    }

    pub fn port(&self) -> &OutputPort {
        &self.port
    }

    pub fn state(&self) -> IteratorState {
        self.state
    }

    /// Returns the next notification of the port, or `None` once every
    /// file is read. Errors are terminal.
    pub fn next_notification(&mut self) -> Result<Option<Notification>> {
        if self.state == IteratorState::Done {
            return Ok(None);
        }

        let res = self.advance();
        if !matches!(res, Ok(Some(_))) {
            self.finalize();
        }
        res
    }

    fn advance(&mut self) -> Result<Option<Notification>> {
        if let Some(notif) = self.current_file()?.next_notification()? {
            return Ok(Some(notif));
        }

        self.file_index += 1;
        let Some(next_path) = self
            .port
            .group()
            .files()
            .get(self.file_index)
            .map(|f| f.path.clone())
        else {
            return Ok(None);
        };

        // Close the exhausted file before opening the next one.
        self.current = None;
        self.current = Some(DataStreamFile::open(
            self.records.as_ref(),
            &next_path,
            self.port.trace().clone(),
            self.port.group().stream(),
        )?);

        // Empty files never make it into a group.
        match self.current_file()?.next_notification()? {
            Some(notif) => Ok(Some(notif)),
            None => Err(Error::UnexpectedEnd(next_path)),
        }
    }

    fn current_file(&mut self) -> Result<&mut DataStreamFile> {
        self.current.as_mut().ok_or(Error::EmptyGroup)
    }

    /// Releases the open file. Calling it again does nothing.
    pub fn finalize(&mut self) {
        if let Some(file) = self.current.take() {
            tracing::debug!("closing stream file `{}`", file.path().display());
        }
        self.state = IteratorState::Done;
    }
}

impl Iterator for NotificationIterator {
    type Item = Result<Notification>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_notification().transpose()
    }
}
