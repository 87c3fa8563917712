//! Stream classes, event classes and streams.

use serde::{Deserialize, Serialize};

use super::{field::StructType, StreamClassHandle};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventClass {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<StructType>,
    #[serde(default)]
    pub payload: StructType,
}

impl EventClass {
    pub fn new(id: u64, name: &str, payload: StructType) -> Self {
        Self {
            id,
            name: name.to_string(),
            log_level: None,
            context: None,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamClass {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_context: Option<StructType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_header: Option<StructType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_context: Option<StructType>,
    #[serde(default)]
    event_classes: Vec<EventClass>,
}

impl StreamClass {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            name: None,
            packet_context: None,
            event_header: None,
            event_context: None,
            event_classes: Vec::new(),
        }
    }

    pub fn event_class_by_id(&self, id: u64) -> Option<&EventClass> {
        self.event_classes.iter().find(|ec| ec.id == id)
    }

    pub fn event_classes(&self) -> &[EventClass] {
        &self.event_classes
    }

    pub fn add_event_class(&mut self, event_class: EventClass) -> Result<()> {
        if self.event_class_by_id(event_class.id).is_some() {
            return Err(Error::DuplicateEventClass {
                stream_class_id: self.id,
                id: event_class.id,
            });
        }

        self.event_classes.push(event_class);
        Ok(())
    }
}

/// One stream instance of a stream class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub class: StreamClassHandle,
    pub instance_id: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_event_class() {
        let mut sc = StreamClass::new(3);
        sc.add_event_class(EventClass::new(0, "a", StructType::new()))
            .unwrap();
        sc.add_event_class(EventClass::new(1, "b", StructType::new()))
            .unwrap();

        assert!(matches!(
            sc.add_event_class(EventClass::new(1, "c", StructType::new())),
            Err(Error::DuplicateEventClass {
                stream_class_id: 3,
                id: 1
            })
        ));
        assert_eq!(sc.event_class_by_id(1).map(|ec| ec.name.as_str()), Some("b"));
        assert_eq!(sc.event_classes().len(), 2);
    }
}
