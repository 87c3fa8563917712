//! Data-stream files.
//!
//! A data-stream file is a sequence of packets; each packet carries an
//! optional header, an optional context and a list of event records. The
//! library reaches the bytes only through [`RecordSource`], so another
//! on-disk encoding only needs another implementation of it.
//! [`reader::FramedRecordSource`] and [`writer::PacketFileWriter`] handle
//! length-delimited protobuf frames.

use std::path::Path;

use crate::{error::Result, ir::field::StructValue};

pub mod reader;
pub mod writer;

/// Value of the `magic` field of packet headers.
pub const CTF_PACKET_MAGIC: u64 = 0xC1FC_1FC1;

/// One decoded event record, before its class is resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEvent {
    pub header: Option<StructValue>,
    pub stream_context: Option<StructValue>,
    pub context: Option<StructValue>,
    pub payload: StructValue,
}

/// One decoded packet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPacket {
    pub header: Option<StructValue>,
    pub context: Option<StructValue>,
    pub events: Vec<RawEvent>,
}

/// Sequential reader over the packets of one open file.
pub trait RecordCursor {
    /// Returns the next packet, or `None` at the end of the file.
    fn next_packet(&mut self) -> Result<Option<RawPacket>>;
}

/// Opens data-stream files.
pub trait RecordSource: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn RecordCursor>>;

    /// Header and context of the first packet of `path`.
    fn first_packet_header_and_context(
        &self,
        path: &Path,
    ) -> Result<(Option<StructValue>, Option<StructValue>)>;
}
