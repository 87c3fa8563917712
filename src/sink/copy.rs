//! Structural copy of source objects into a destination graph.

use crate::{
    error::{Error, Result},
    ir::{
        field::{FieldType, StructType, StructValue},
        stream::{EventClass, StreamClass},
        TraceClass,
    },
    notification::{Event, Packet},
    trace::RawEvent,
};

/// Packet context fields the writer always computes itself.
pub const WRITER_PACKET_FIELDS: [&str; 2] = ["content_size", "packet_size"];

/// Packet context fields copied only when populating internal fields.
pub const INTERNAL_PACKET_FIELDS: [&str; 4] = [
    "timestamp_begin",
    "timestamp_end",
    "events_discarded",
    "packet_seq_num",
];

/// Event header fields copied only when populating internal fields.
pub const INTERNAL_EVENT_HEADER_FIELDS: [&str; 2] = ["id", "timestamp"];

/// Copies metadata and data from a source graph to a destination graph.
///
/// With `populate` set, the copies carry the fields a writer would
/// otherwise fill in itself (timestamps, sequence numbers, event IDs).
pub trait StructuralCopy {
    /// Copies the name, environment and packet header layout.
    fn copy_trace(&self, src: &TraceClass, dst: &mut TraceClass) -> Result<()>;

    /// Adds every clock class of `src` missing from `dst`.
    fn copy_clock_classes(&self, src: &TraceClass, dst: &mut TraceClass) -> Result<()>;

    /// Copies a stream class without its event classes.
    fn copy_stream_class(&self, src: &StreamClass, populate: bool) -> Result<StreamClass>;

    fn copy_event_class(&self, src: &EventClass) -> Result<EventClass>;

    fn copy_event(&self, src: &Event, populate: bool) -> Result<RawEvent>;

    fn copy_packet_context(&self, src: &Packet, populate: bool) -> Result<Option<StructValue>>;
}

/// Field by field [`StructuralCopy`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldCopier;

fn widen_clock_integer(ty: &mut FieldType) {
    match ty {
        FieldType::Integer(int) => {
            if int.mapped_clock.is_some() {
                int.size = 64;
            }
        }
        FieldType::Struct(st) => widen_clock_integers(st),
        FieldType::Array { element, .. } | FieldType::Sequence { element, .. } => {
            widen_clock_integer(element)
        }
        FieldType::Float(_) | FieldType::String => {}
    }
}

fn widen_clock_integers(layout: &mut StructType) {
    layout
        .fields
        .iter_mut()
        .for_each(|f| widen_clock_integer(&mut f.ty));
}

fn copy_without(value: &StructValue, skipped: &[&str]) -> StructValue {
    StructValue::from_fields(
        value
            .iter()
            .filter(|(name, _)| !skipped.contains(&name.as_str()))
            .map(|(name, v)| (name.clone(), v.clone())),
    )
}

impl StructuralCopy for FieldCopier {
    fn copy_trace(&self, src: &TraceClass, dst: &mut TraceClass) -> Result<()> {
        if dst.stream_class_count() > 0 {
            return Err(Error::Copy(
                "destination trace already has stream classes".to_string(),
            ));
        }

        dst.name = src.name.clone();
        dst.environment = src.environment.clone();
        dst.packet_header = src.packet_header.clone();
        Ok(())
    }

    fn copy_clock_classes(&self, src: &TraceClass, dst: &mut TraceClass) -> Result<()> {
        for (_, cc) in src.clock_classes() {
            match dst.clock_class_by_name(&cc.name) {
                Some(existing) if dst.clock_class(existing) == cc => {}
                Some(_) => {
                    return Err(Error::Copy(format!(
                        "clock class `{}` already exists with another definition",
                        cc.name
                    )))
                }
                None => {
                    dst.add_clock_class(cc.clone())?;
                }
            }
        }

        Ok(())
    }

    fn copy_stream_class(&self, src: &StreamClass, populate: bool) -> Result<StreamClass> {
        let mut sc = StreamClass::new(src.id);
        sc.name = src.name.clone();
        sc.packet_context = src.packet_context.clone();
        sc.event_header = src.event_header.clone();
        sc.event_context = src.event_context.clone();

        if populate {
            for layout in [
                &mut sc.packet_context,
                &mut sc.event_header,
                &mut sc.event_context,
            ]
            .into_iter()
            .flatten()
            {
                widen_clock_integers(layout);
            }
        }

        Ok(sc)
    }

    fn copy_event_class(&self, src: &EventClass) -> Result<EventClass> {
        Ok(src.clone())
    }

    fn copy_event(&self, src: &Event, populate: bool) -> Result<RawEvent> {
        let header = src.header.as_ref().map(|h| {
            if populate {
                h.clone()
            } else {
                copy_without(h, &INTERNAL_EVENT_HEADER_FIELDS)
            }
        });

        Ok(RawEvent {
            header,
            stream_context: src.stream_context.clone(),
            context: src.context.clone(),
            payload: src.payload.clone(),
        })
    }

    fn copy_packet_context(&self, src: &Packet, populate: bool) -> Result<Option<StructValue>> {
        Ok(src.context.as_ref().map(|ctx| {
            if populate {
                copy_without(ctx, &WRITER_PACKET_FIELDS)
            } else {
                let mut skipped = WRITER_PACKET_FIELDS.to_vec();
                skipped.extend(INTERNAL_PACKET_FIELDS);
                copy_without(ctx, &skipped)
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        ir::{clock::ClockClass, field::FieldValue},
        test_support::*,
    };

    fn sample_packet_notif() -> Packet {
        let mut trace = sample_trace_class(&[0]);
        let stream = trace.create_stream(trace.stream_class_by_id(0).unwrap(), Some(3)).unwrap();
        let raw = sample_packet(Some(0), Some(3), Some(10), vec![sample_event(12, 1, "x")]);

        Packet {
            trace: Arc::new(trace),
            stream,
            header: raw.header,
            context: raw.context,
            begin: None,
            end: None,
        }
    }

    #[test]
    fn test_copy_packet_context() {
        let packet = sample_packet_notif();

        let full = FieldCopier.copy_packet_context(&packet, true).unwrap().unwrap();
        assert!(!full.contains("content_size"));
        assert!(!full.contains("packet_size"));
        assert_eq!(full.get("timestamp_begin"), Some(&FieldValue::Unsigned(10)));
        assert!(full.contains("packet_seq_num"));

        let bare = FieldCopier.copy_packet_context(&packet, false).unwrap().unwrap();
        assert!(bare.is_empty());
    }

    #[test]
    fn test_copy_event_header() {
        let packet = Arc::new(sample_packet_notif());
        let raw = sample_event(12, 1, "x");
        let event = Event {
            packet,
            event_class_id: 0,
            header: raw.header,
            stream_context: None,
            context: None,
            payload: raw.payload.clone(),
            clock: None,
        };

        let copy = FieldCopier.copy_event(&event, true).unwrap();
        assert_eq!(copy.header, event.header);
        assert_eq!(copy.payload, raw.payload);

        let copy = FieldCopier.copy_event(&event, false).unwrap();
        assert!(copy.header.unwrap().is_empty());
    }

    #[test]
    fn test_copy_stream_class_widens_timestamps() {
        let src = sample_stream_class(4);

        let copy = FieldCopier.copy_stream_class(&src, true).unwrap();
        assert!(copy.event_classes().is_empty());
        let FieldType::Integer(ts) = copy.event_header.as_ref().unwrap().field("timestamp").unwrap()
        else {
            panic!("timestamp is not an integer");
        };
        assert_eq!(ts.size, 64);
        let FieldType::Integer(id) = copy.event_header.as_ref().unwrap().field("id").unwrap() else {
            panic!("id is not an integer");
        };
        assert_eq!(id.size, 32);

        let copy = FieldCopier.copy_stream_class(&src, false).unwrap();
        assert_eq!(copy.event_header, src.event_header);
    }

    #[test]
    fn test_copy_clock_classes_is_idempotent() {
        let src = sample_trace_class(&[0]);
        let mut dst = TraceClass::new();

        FieldCopier.copy_trace(&src, &mut dst).unwrap();
        FieldCopier.copy_clock_classes(&src, &mut dst).unwrap();
        FieldCopier.copy_clock_classes(&src, &mut dst).unwrap();
        assert_eq!(dst.clock_class_count(), 1);
        assert_eq!(dst.name.as_deref(), Some("sample"));

        let mut other = TraceClass::new();
        other
            .add_clock_class(ClockClass::new(CLOCK, 1000))
            .unwrap();
        assert!(matches!(
            FieldCopier.copy_clock_classes(&other, &mut dst),
            Err(Error::Copy(_))
        ));
    }

    #[test]
    fn test_copy_stream_class_widens_nested_timestamps() {
        let mut src = StreamClass::new(0);
        let nested = StructType::new()
            .with_field("ts", FieldType::clock_uint(27, CLOCK))
            .with_field("cpu", FieldType::uint(8));
        src.packet_context = Some(
            StructType::new()
                .with_field("inner", FieldType::Struct(nested))
                .with_field(
                    "samples",
                    FieldType::Array {
                        element: Box::new(FieldType::clock_uint(16, CLOCK)),
                        length: 2,
                    },
                ),
        );

        let copy = FieldCopier.copy_stream_class(&src, true).unwrap();
        let ctx = copy.packet_context.unwrap();

        let Some(FieldType::Struct(inner)) = ctx.field("inner") else {
            panic!("inner is not a structure");
        };
        assert_eq!(inner.field("ts"), Some(&FieldType::clock_uint(64, CLOCK)));
        assert_eq!(inner.field("cpu"), Some(&FieldType::uint(8)));

        let Some(FieldType::Array { element, .. }) = ctx.field("samples") else {
            panic!("samples is not an array");
        };
        assert_eq!(**element, FieldType::clock_uint(64, CLOCK));
    }
}
