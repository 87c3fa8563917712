//! Notifications flowing from sources to sinks.

use std::sync::Arc;

use crate::ir::{
    clock::ClockSnapshot,
    field::StructValue,
    stream::{EventClass, Stream, StreamClass},
    StreamHandle, TraceClass,
};

/// A packet of one source stream.
#[derive(Debug)]
pub struct Packet {
    pub trace: Arc<TraceClass>,
    pub stream: StreamHandle,
    pub header: Option<StructValue>,
    pub context: Option<StructValue>,
    pub begin: Option<ClockSnapshot>,
    pub end: Option<ClockSnapshot>,
}

impl Packet {
    pub fn stream(&self) -> &Stream {
        self.trace.stream(self.stream)
    }

    pub fn stream_class(&self) -> &StreamClass {
        self.trace.stream_class(self.stream().class)
    }
}

/// An event record along with the packet it belongs to.
#[derive(Debug)]
pub struct Event {
    pub packet: Arc<Packet>,
    pub event_class_id: u64,
    pub header: Option<StructValue>,
    pub stream_context: Option<StructValue>,
    pub context: Option<StructValue>,
    pub payload: StructValue,
    pub clock: Option<ClockSnapshot>,
}

impl Event {
    pub fn trace(&self) -> &Arc<TraceClass> {
        &self.packet.trace
    }

    pub fn event_class(&self) -> Option<&EventClass> {
        self.packet.stream_class().event_class_by_id(self.event_class_id)
    }
}

#[derive(Debug)]
pub enum Notification {
    PacketBegin(Arc<Packet>),
    Event(Event),
    PacketEnd(Arc<Packet>),
}

impl Notification {
    pub fn packet(&self) -> &Arc<Packet> {
        match self {
            Notification::PacketBegin(p) | Notification::PacketEnd(p) => p,
            Notification::Event(e) => &e.packet,
        }
    }

    pub fn trace(&self) -> &Arc<TraceClass> {
        &self.packet().trace
    }

    /// Clock value the notification is ordered by.
    pub fn clock(&self) -> Option<ClockSnapshot> {
        match self {
            Notification::PacketBegin(p) => p.begin,
            Notification::Event(e) => e.clock,
            Notification::PacketEnd(p) => p.end,
        }
    }

    pub fn timestamp_ns(&self) -> Option<i64> {
        self.clock().and_then(|c| c.ns_from_epoch)
    }
}
