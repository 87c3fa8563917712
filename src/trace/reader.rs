//! Framed data-stream reader.

use std::{
    fs::File,
    io::{BufReader, ErrorKind, Read},
    path::{Path, PathBuf},
};

use prost::Message;

use super::{RawPacket, RecordCursor, RecordSource};
use crate::{
    error::{Error, Result},
    ir::field::StructValue,
    proto,
};

/// Frames larger than this are taken as corruption.
const MAX_FRAME_LEN: u64 = 256 * 1024 * 1024;

/// Reads the varint length prefix of the next frame. A clean end of file is
/// only accepted before its first byte.
fn read_frame_len<R: Read>(reader: &mut R) -> std::io::Result<Option<u64>> {
    let mut length_buf = [0u8; 10];
    let mut length_pos = 0;

    loop {
        match reader.read_exact(&mut length_buf[length_pos..length_pos + 1]) {
            Ok(_) => {
                if length_buf[length_pos] & 0x80 == 0 {
                    break;
                }
                length_pos += 1;
                if length_pos == length_buf.len() {
                    return Err(std::io::Error::new(
                        ErrorKind::InvalidData,
                        "frame length prefix is too long",
                    ));
                }
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof && length_pos == 0 => return Ok(None),
            Err(e) => return Err(e),
        }
    }

    let mut length: u64 = 0;
    for (i, &byte) in length_buf[..=length_pos].iter().enumerate() {
        length |= ((byte & 0x7F) as u64) << (i * 7);
    }

    Ok(Some(length))
}

/// Packet cursor over one open framed file.
pub struct FramedCursor<R: Read> {
    path: PathBuf,
    reader: R,
    count: usize,
}

impl FramedCursor<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;

        Ok(Self::new(path, BufReader::new(file)))
    }
}

impl<R: Read> FramedCursor<R> {
    pub fn new<P: AsRef<Path>>(path: P, reader: R) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            reader,
            count: 0,
        }
    }

    fn read_next_packet(&mut self) -> Result<Option<RawPacket>> {
        let length = match read_frame_len(&mut self.reader) {
            Ok(Some(length)) => length,
            Ok(None) => return Ok(None),
            Err(e) => {
                return Err(Error::decode(
                    &self.path,
                    format!("packet {}: {}", self.count, e),
                ))
            }
        };

        if length > MAX_FRAME_LEN {
            return Err(Error::decode(
                &self.path,
                format!("packet {}: frame of {} bytes", self.count, length),
            ));
        }

        let mut buf = vec![0u8; length as usize];
        self.reader.read_exact(&mut buf).map_err(|e| {
            Error::decode(&self.path, format!("packet {}: {}", self.count, e))
        })?;

        let packet = proto::Packet::decode(buf.as_slice())
            .map_err(|e| Error::decode(&self.path, format!("packet {}: {}", self.count, e)))?;
        let packet = RawPacket::try_from(packet)
            .map_err(|e| Error::decode(&self.path, format!("packet {}: {}", self.count, e)))?;

        self.count += 1;
        Ok(Some(packet))
    }
}

impl<R: Read> RecordCursor for FramedCursor<R> {
    fn next_packet(&mut self) -> Result<Option<RawPacket>> {
        self.read_next_packet()
    }
}

/// [`RecordSource`] of length-delimited protobuf packet frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct FramedRecordSource;

impl RecordSource for FramedRecordSource {
    fn open(&self, path: &Path) -> Result<Box<dyn RecordCursor>> {
        Ok(Box::new(FramedCursor::open(path)?))
    }

    fn first_packet_header_and_context(
        &self,
        path: &Path,
    ) -> Result<(Option<StructValue>, Option<StructValue>)> {
        let mut cursor = FramedCursor::open(path)?;

        match cursor.next_packet()? {
            Some(packet) => Ok((packet.header, packet.context)),
            None => Err(Error::decode(path, "file holds no packet")),
        }
    }
}
