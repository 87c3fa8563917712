//! Protobuf messages of the data-stream packet frames.

use prost::Message;

use crate::{
    ir::field,
    trace::{RawEvent, RawPacket},
};

#[derive(Clone, PartialEq, Message)]
pub struct Packet {
    #[prost(message, optional, tag = "1")]
    pub header: Option<StructValue>,
    #[prost(message, optional, tag = "2")]
    pub context: Option<StructValue>,
    #[prost(message, repeated, tag = "3")]
    pub events: Vec<Event>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Event {
    #[prost(message, optional, tag = "1")]
    pub header: Option<StructValue>,
    #[prost(message, optional, tag = "2")]
    pub stream_context: Option<StructValue>,
    #[prost(message, optional, tag = "3")]
    pub context: Option<StructValue>,
    #[prost(message, optional, tag = "4")]
    pub payload: Option<StructValue>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StructValue {
    #[prost(message, repeated, tag = "1")]
    pub fields: Vec<NamedValue>,
}

#[derive(Clone, PartialEq, Message)]
pub struct NamedValue {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<FieldValue>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ArrayValue {
    #[prost(message, repeated, tag = "1")]
    pub elements: Vec<FieldValue>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FieldValue {
    #[prost(oneof = "field_value::Kind", tags = "1, 2, 3, 4, 5, 6")]
    pub kind: Option<field_value::Kind>,
}

pub mod field_value {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(uint64, tag = "1")]
        Unsigned(u64),
        #[prost(sint64, tag = "2")]
        Signed(i64),
        #[prost(double, tag = "3")]
        Float(f64),
        #[prost(string, tag = "4")]
        Str(String),
        #[prost(message, tag = "5")]
        Struct(super::StructValue),
        #[prost(message, tag = "6")]
        Array(super::ArrayValue),
    }
}

use field_value::Kind;

impl From<&field::FieldValue> for FieldValue {
    fn from(value: &field::FieldValue) -> Self {
        let kind = match value {
            field::FieldValue::Unsigned(v) => Kind::Unsigned(*v),
            field::FieldValue::Signed(v) => Kind::Signed(*v),
            field::FieldValue::Float(v) => Kind::Float(*v),
            field::FieldValue::String(s) => Kind::Str(s.clone()),
            field::FieldValue::Struct(s) => Kind::Struct(s.into()),
            field::FieldValue::Array(items) => Kind::Array(ArrayValue {
                elements: items.iter().map(FieldValue::from).collect(),
            }),
        };

        FieldValue { kind: Some(kind) }
    }
}

impl From<&field::StructValue> for StructValue {
    fn from(value: &field::StructValue) -> Self {
        StructValue {
            fields: value
                .iter()
                .map(|(name, v)| NamedValue {
                    name: name.clone(),
                    value: Some(v.into()),
                })
                .collect(),
        }
    }
}

impl TryFrom<FieldValue> for field::FieldValue {
    type Error = String;

    fn try_from(value: FieldValue) -> Result<Self, Self::Error> {
        match value.kind.ok_or_else(|| "field value has no kind".to_string())? {
            Kind::Unsigned(v) => Ok(field::FieldValue::Unsigned(v)),
            Kind::Signed(v) => Ok(field::FieldValue::Signed(v)),
            Kind::Float(v) => Ok(field::FieldValue::Float(v)),
            Kind::Str(s) => Ok(field::FieldValue::String(s)),
            Kind::Struct(s) => Ok(field::FieldValue::Struct(s.try_into()?)),
            Kind::Array(a) => a
                .elements
                .into_iter()
                .map(field::FieldValue::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(field::FieldValue::Array),
        }
    }
}

impl TryFrom<StructValue> for field::StructValue {
    type Error = String;

    fn try_from(value: StructValue) -> Result<Self, Self::Error> {
        let fields = value
            .fields
            .into_iter()
            .map(|f| {
                let v = f
                    .value
                    .ok_or_else(|| format!("field `{}` has no value", f.name))?;
                Ok((f.name, field::FieldValue::try_from(v)?))
            })
            .collect::<Result<Vec<_>, String>>()?;

        Ok(field::StructValue::from_fields(fields))
    }
}

fn struct_to_proto(value: &Option<field::StructValue>) -> Option<StructValue> {
    value.as_ref().map(StructValue::from)
}

fn struct_from_proto(value: Option<StructValue>) -> Result<Option<field::StructValue>, String> {
    value.map(field::StructValue::try_from).transpose()
}

impl From<&RawEvent> for Event {
    fn from(event: &RawEvent) -> Self {
        Event {
            header: struct_to_proto(&event.header),
            stream_context: struct_to_proto(&event.stream_context),
            context: struct_to_proto(&event.context),
            payload: Some((&event.payload).into()),
        }
    }
}

impl TryFrom<Event> for RawEvent {
    type Error = String;

    fn try_from(event: Event) -> Result<Self, Self::Error> {
        Ok(RawEvent {
            header: struct_from_proto(event.header)?,
            stream_context: struct_from_proto(event.stream_context)?,
            context: struct_from_proto(event.context)?,
            payload: struct_from_proto(event.payload)?.unwrap_or_default(),
        })
    }
}

impl From<&RawPacket> for Packet {
    fn from(packet: &RawPacket) -> Self {
        Packet {
            header: struct_to_proto(&packet.header),
            context: struct_to_proto(&packet.context),
            events: packet.events.iter().map(Event::from).collect(),
        }
    }
}

impl TryFrom<Packet> for RawPacket {
    type Error = String;

    fn try_from(packet: Packet) -> Result<Self, Self::Error> {
        Ok(RawPacket {
            header: struct_from_proto(packet.header)?,
            context: struct_from_proto(packet.context)?,
            events: packet
                .events
                .into_iter()
                .map(RawEvent::try_from)
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

impl Packet {
    /// Encoded size of the event records, in bytes.
    pub fn events_len(&self) -> usize {
        self.events.iter().map(Message::encoded_len).sum()
    }
}
