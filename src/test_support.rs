//! Sample traces for tests.

use std::path::Path;

use crate::{
    ir::{
        clock::ClockClass,
        field::{FieldType, FieldValue, StructType, StructValue},
        stream::{EventClass, StreamClass},
        TraceClass,
    },
    metadata::write_metadata,
    trace::{writer::PacketFileWriter, RawEvent, RawPacket, CTF_PACKET_MAGIC},
};

pub const CLOCK: &str = "monotonic";

pub fn packet_header_type() -> StructType {
    StructType::new()
        .with_field("magic", FieldType::uint(32))
        .with_field("stream_id", FieldType::uint(64))
        .with_field("stream_instance_id", FieldType::uint(64))
}

pub fn packet_context_type() -> StructType {
    StructType::new()
        .with_field("timestamp_begin", FieldType::clock_uint(64, CLOCK))
        .with_field("timestamp_end", FieldType::clock_uint(64, CLOCK))
        .with_field("content_size", FieldType::uint(64))
        .with_field("packet_size", FieldType::uint(64))
        .with_field("events_discarded", FieldType::uint(64))
        .with_field("packet_seq_num", FieldType::uint(64))
}

/// Stream class with a `sample` event class (id 0, a signed integer and a
/// string) and a `tick` event class (id 1, empty payload).
pub fn sample_stream_class(id: u64) -> StreamClass {
    let mut sc = StreamClass::new(id);
    sc.packet_context = Some(packet_context_type());
    sc.event_header = Some(
        StructType::new()
            .with_field("id", FieldType::uint(32))
            .with_field("timestamp", FieldType::clock_uint(32, CLOCK)),
    );

    let payload = StructType::new()
        .with_field("a", FieldType::int(32))
        .with_field("msg", FieldType::String);
    sc.add_event_class(EventClass::new(0, "sample", payload))
        .unwrap();
    sc.add_event_class(EventClass::new(1, "tick", StructType::new()))
        .unwrap();
    sc
}

pub fn sample_trace_class(stream_class_ids: &[u64]) -> TraceClass {
    let mut trace = TraceClass::new();
    trace.name = Some("sample".to_string());
    trace.packet_header = Some(packet_header_type());
    trace
        .add_clock_class(ClockClass::new(CLOCK, 1_000_000_000))
        .unwrap();
    for id in stream_class_ids {
        trace.add_stream_class(sample_stream_class(*id)).unwrap();
    }
    trace
}

pub fn sample_event(ts: u64, a: i64, msg: &str) -> RawEvent {
    RawEvent {
        header: Some(
            StructValue::new()
                .with("id", FieldValue::Unsigned(0))
                .with("timestamp", FieldValue::Unsigned(ts)),
        ),
        stream_context: None,
        context: None,
        payload: StructValue::new()
            .with("a", FieldValue::Signed(a))
            .with("msg", FieldValue::String(msg.to_string())),
    }
}

/// Packet of the sample stream class. Its end time is the time of its last
/// event, or its begin time when it holds none.
pub fn sample_packet(
    stream_id: Option<u64>,
    instance_id: Option<u64>,
    begin: Option<u64>,
    events: Vec<RawEvent>,
) -> RawPacket {
    let mut header = StructValue::new().with("magic", FieldValue::Unsigned(CTF_PACKET_MAGIC));
    if let Some(id) = stream_id {
        header.set("stream_id", FieldValue::Unsigned(id));
    }
    if let Some(id) = instance_id {
        header.set("stream_instance_id", FieldValue::Unsigned(id));
    }

    let end = events
        .iter()
        .filter_map(|e| e.header.as_ref()?.get("timestamp")?.as_u64())
        .max()
        .or(begin);

    let mut context = StructValue::new();
    if let Some(ts) = begin {
        context.set("timestamp_begin", FieldValue::Unsigned(ts));
    }
    if let Some(ts) = end {
        context.set("timestamp_end", FieldValue::Unsigned(ts));
    }
    context.set("content_size", FieldValue::Unsigned(0));
    context.set("packet_size", FieldValue::Unsigned(0));
    context.set("events_discarded", FieldValue::Unsigned(0));
    context.set("packet_seq_num", FieldValue::Unsigned(0));

    RawPacket {
        header: Some(header),
        context: Some(context),
        events,
    }
}

pub fn write_stream_file(path: &Path, packets: &[RawPacket]) {
    let mut writer = PacketFileWriter::create(path).unwrap();
    for p in packets {
        writer.write(p).unwrap();
    }
    writer.close().unwrap();
}

pub fn write_trace_dir(dir: &Path, trace: &TraceClass) {
    std::fs::create_dir_all(dir).unwrap();
    write_metadata(dir, trace, false).unwrap();
}
