//! Trace metadata graph.
//!
//! A [`TraceClass`] is an arena holding the clock classes, stream classes and
//! streams of one trace. Objects are referred to by typed handles which are
//! only meaningful for the graph that created them; the graph's [`TraceUid`]
//! scopes them when several graphs coexist (e.g. a source trace and the
//! destination trace it is transcribed into).

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub mod clock;
pub mod field;
pub mod stream;

use self::{
    clock::{ClockClass, ClockSnapshot},
    field::{FieldType, FieldValue, StructType, StructValue},
    stream::{EventClass, Stream, StreamClass},
};

static NEXT_TRACE_UID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identity of a metadata graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceUid(u64);

impl TraceUid {
    fn next() -> Self {
        TraceUid(NEXT_TRACE_UID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClockClassHandle(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamClassHandle(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamHandle(pub(crate) usize);

impl StreamHandle {
    /// Position of the stream in its graph, in creation order.
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Integer(i64),
    String(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TraceClass {
    #[serde(skip, default = "TraceUid::next")]
    uid: TraceUid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, EnvValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_header: Option<StructType>,
    #[serde(default)]
    clock_classes: Vec<ClockClass>,
    #[serde(default)]
    stream_classes: Vec<StreamClass>,
    #[serde(skip)]
    streams: Vec<Stream>,
    #[serde(skip)]
    is_static: bool,
}

fn collect_mapped_clocks<'a>(ty: &'a FieldType, out: &mut Vec<&'a str>) {
    match ty {
        FieldType::Integer(int) => out.extend(int.mapped_clock.as_deref()),
        FieldType::Struct(st) => st
            .fields
            .iter()
            .for_each(|f| collect_mapped_clocks(&f.ty, out)),
        FieldType::Array { element, .. } | FieldType::Sequence { element, .. } => {
            collect_mapped_clocks(element, out)
        }
        FieldType::Float(_) | FieldType::String => {}
    }
}

fn struct_mapped_clocks<'a>(layout: Option<&'a StructType>, out: &mut Vec<&'a str>) {
    if let Some(st) = layout {
        st.fields
            .iter()
            .for_each(|f| collect_mapped_clocks(&f.ty, out));
    }
}

impl TraceClass {
    pub fn new() -> Self {
        Self {
            uid: TraceUid::next(),
            name: None,
            environment: BTreeMap::new(),
            packet_header: None,
            clock_classes: Vec::new(),
            stream_classes: Vec::new(),
            streams: Vec::new(),
            is_static: false,
        }
    }

    pub fn uid(&self) -> TraceUid {
        self.uid
    }

    pub fn add_clock_class(&mut self, clock_class: ClockClass) -> Result<ClockClassHandle> {
        if self.clock_class_by_name(&clock_class.name).is_some() {
            return Err(Error::DuplicateClockClass(clock_class.name));
        }

        self.clock_classes.push(clock_class);
        Ok(ClockClassHandle(self.clock_classes.len() - 1))
    }

    pub fn clock_class(&self, handle: ClockClassHandle) -> &ClockClass {
        &self.clock_classes[handle.0]
    }

    pub fn clock_class_by_name(&self, name: &str) -> Option<ClockClassHandle> {
        self.clock_classes
            .iter()
            .position(|cc| cc.name == name)
            .map(ClockClassHandle)
    }

    pub fn clock_classes(&self) -> impl Iterator<Item = (ClockClassHandle, &ClockClass)> {
        self.clock_classes
            .iter()
            .enumerate()
            .map(|(i, cc)| (ClockClassHandle(i), cc))
    }

    pub fn clock_classes_mut(&mut self) -> impl Iterator<Item = &mut ClockClass> {
        self.clock_classes.iter_mut()
    }

    pub fn clock_class_count(&self) -> usize {
        self.clock_classes.len()
    }

    fn check_clocks(&self, clocks: &[&str]) -> Result<()> {
        match clocks
            .iter()
            .find(|name| self.clock_class_by_name(name).is_none())
        {
            Some(name) => Err(Error::UnknownClockClass(name.to_string())),
            None => Ok(()),
        }
    }

    /// Registers a stream class. Every clock class its layouts map must
    /// already be part of this trace.
    pub fn add_stream_class(&mut self, stream_class: StreamClass) -> Result<StreamClassHandle> {
        if self.is_static {
            return Err(Error::StaticTrace);
        }

        if self.stream_class_by_id(stream_class.id).is_some() {
            return Err(Error::DuplicateStreamClass(stream_class.id));
        }

        let mut clocks = Vec::new();
        struct_mapped_clocks(stream_class.packet_context.as_ref(), &mut clocks);
        struct_mapped_clocks(stream_class.event_header.as_ref(), &mut clocks);
        struct_mapped_clocks(stream_class.event_context.as_ref(), &mut clocks);
        for ec in stream_class.event_classes() {
            struct_mapped_clocks(ec.context.as_ref(), &mut clocks);
            struct_mapped_clocks(Some(&ec.payload), &mut clocks);
        }
        self.check_clocks(&clocks)?;

        self.stream_classes.push(stream_class);
        Ok(StreamClassHandle(self.stream_classes.len() - 1))
    }

    /// Adds an event class to an existing stream class.
    pub fn add_event_class(
        &mut self,
        stream_class: StreamClassHandle,
        event_class: EventClass,
    ) -> Result<()> {
        let mut clocks = Vec::new();
        struct_mapped_clocks(event_class.context.as_ref(), &mut clocks);
        struct_mapped_clocks(Some(&event_class.payload), &mut clocks);
        self.check_clocks(&clocks)?;

        self.stream_classes[stream_class.0].add_event_class(event_class)
    }

    pub fn stream_class(&self, handle: StreamClassHandle) -> &StreamClass {
        &self.stream_classes[handle.0]
    }

    pub fn stream_class_by_id(&self, id: u64) -> Option<StreamClassHandle> {
        self.stream_classes
            .iter()
            .position(|sc| sc.id == id)
            .map(StreamClassHandle)
    }

    pub fn stream_class_by_index(&self, index: usize) -> Option<StreamClassHandle> {
        (index < self.stream_classes.len()).then_some(StreamClassHandle(index))
    }

    pub fn stream_class_count(&self) -> usize {
        self.stream_classes.len()
    }

    pub fn create_stream(
        &mut self,
        class: StreamClassHandle,
        instance_id: Option<u64>,
    ) -> Result<StreamHandle> {
        if self.is_static {
            return Err(Error::StaticTrace);
        }

        debug_assert!(class.0 < self.stream_classes.len());
        self.streams.push(Stream { class, instance_id });
        Ok(StreamHandle(self.streams.len() - 1))
    }

    pub fn stream(&self, handle: StreamHandle) -> &Stream {
        &self.streams[handle.0]
    }

    pub fn streams(&self) -> impl Iterator<Item = (StreamHandle, &Stream)> {
        self.streams
            .iter()
            .enumerate()
            .map(|(i, s)| (StreamHandle(i), s))
    }

    /// Freezes the schema: no stream class or stream can be added anymore.
    pub fn set_static(&mut self) {
        self.is_static = true;
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Checks the invariants a deserialized graph cannot enforce by itself.
    pub fn validate(&self) -> Result<()> {
        for (i, cc) in self.clock_classes.iter().enumerate() {
            if self.clock_classes[..i].iter().any(|o| o.name == cc.name) {
                return Err(Error::DuplicateClockClass(cc.name.clone()));
            }
        }

        let mut clocks = Vec::new();
        struct_mapped_clocks(self.packet_header.as_ref(), &mut clocks);

        for (i, sc) in self.stream_classes.iter().enumerate() {
            if self.stream_classes[..i].iter().any(|o| o.id == sc.id) {
                return Err(Error::DuplicateStreamClass(sc.id));
            }

            struct_mapped_clocks(sc.packet_context.as_ref(), &mut clocks);
            struct_mapped_clocks(sc.event_header.as_ref(), &mut clocks);
            struct_mapped_clocks(sc.event_context.as_ref(), &mut clocks);

            for (j, ec) in sc.event_classes().iter().enumerate() {
                if sc.event_classes()[..j].iter().any(|o| o.id == ec.id) {
                    return Err(Error::DuplicateEventClass {
                        stream_class_id: sc.id,
                        id: ec.id,
                    });
                }
                struct_mapped_clocks(ec.context.as_ref(), &mut clocks);
                struct_mapped_clocks(Some(&ec.payload), &mut clocks);
            }
        }

        self.check_clocks(&clocks)
    }

    /// Reads the integer field `field` of `value` as a clock value, using the
    /// clock class `layout` maps it to.
    pub fn clock_snapshot(
        &self,
        layout: Option<&StructType>,
        value: Option<&StructValue>,
        field: &str,
    ) -> Option<ClockSnapshot> {
        let clock = self.clock_class_by_name(layout?.mapped_clock(field)?)?;
        let cycles = value?.get(field).and_then(FieldValue::as_u64)?;

        Some(ClockSnapshot {
            clock,
            cycles,
            ns_from_epoch: self.clock_class(clock).ns_from_epoch(cycles),
        })
    }
}

impl Default for TraceClass {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_class_with_clock(id: u64, clock: &str) -> StreamClass {
        let mut sc = StreamClass::new(id);
        sc.packet_context = Some(
            StructType::new().with_field("timestamp_begin", FieldType::clock_uint(64, clock)),
        );
        sc
    }

    #[test]
    fn test_stream_class_requires_clock() {
        let mut trace = TraceClass::new();

        assert!(matches!(
            trace.add_stream_class(stream_class_with_clock(0, "monotonic")),
            Err(Error::UnknownClockClass(_))
        ));

        trace
            .add_clock_class(ClockClass::new("monotonic", 1_000_000_000))
            .unwrap();
        let sc = trace
            .add_stream_class(stream_class_with_clock(0, "monotonic"))
            .unwrap();

        assert_eq!(trace.stream_class_by_id(0), Some(sc));
        assert_eq!(trace.stream_class_by_index(0), Some(sc));
        assert_eq!(trace.stream_class_by_index(1), None);
        assert!(matches!(
            trace.add_stream_class(StreamClass::new(0)),
            Err(Error::DuplicateStreamClass(0))
        ));
    }

    #[test]
    fn test_static_trace() {
        let mut trace = TraceClass::new();
        let sc = trace.add_stream_class(StreamClass::new(1)).unwrap();
        trace.create_stream(sc, Some(4)).unwrap();

        trace.set_static();

        assert!(matches!(
            trace.add_stream_class(StreamClass::new(2)),
            Err(Error::StaticTrace)
        ));
        assert!(matches!(
            trace.create_stream(sc, None),
            Err(Error::StaticTrace)
        ));
        assert_eq!(trace.streams().count(), 1);
    }

    #[test]
    fn test_uids_are_unique() {
        let a = TraceClass::new();
        let b = TraceClass::new();
        let c: TraceClass = serde_json::from_str("{}").unwrap();

        assert_ne!(a.uid(), b.uid());
        assert_ne!(b.uid(), c.uid());
    }

    #[test]
    fn test_clock_snapshot() {
        let mut trace = TraceClass::new();
        let mut cc = ClockClass::new("monotonic", 1_000_000_000);
        cc.offset_s = 1;
        let clock = trace.add_clock_class(cc).unwrap();
        let layout = stream_class_with_clock(0, "monotonic").packet_context;
        let value = StructValue::new().with("timestamp_begin", FieldValue::Unsigned(5));

        let snap = trace
            .clock_snapshot(layout.as_ref(), Some(&value), "timestamp_begin")
            .unwrap();
        assert_eq!(snap.clock, clock);
        assert_eq!(snap.cycles, 5);
        assert_eq!(snap.ns_from_epoch, Some(1_000_000_005));

        assert!(trace
            .clock_snapshot(layout.as_ref(), Some(&value), "timestamp_end")
            .is_none());
        assert!(trace
            .clock_snapshot(None, Some(&value), "timestamp_begin")
            .is_none());
    }

    #[test]
    fn test_validate_deserialized() {
        let json = r#"{
            "clock_classes": [{ "name": "monotonic" }],
            "stream_classes": [
                { "id": 0, "event_classes": [
                    { "id": 1, "name": "a" },
                    { "id": 1, "name": "b" }
                ] }
            ]
        }"#;
        let trace: TraceClass = serde_json::from_str(json).unwrap();

        assert!(matches!(
            trace.validate(),
            Err(Error::DuplicateEventClass { id: 1, .. })
        ));
    }
}
