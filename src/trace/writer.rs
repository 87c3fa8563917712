//! Framed data-stream writer.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use prost::Message;

use super::RawPacket;
use crate::{
    error::{Error, Result},
    proto,
};

/// Appends packet frames to a data-stream file.
pub struct PacketFileWriter {
    path: PathBuf,
    file: BufWriter<File>,
    count: usize,
}

impl PacketFileWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::io(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: BufWriter::with_capacity(64 * 1024, file),
            count: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of packets written so far.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn write(&mut self, packet: &RawPacket) -> Result<()> {
        self.write_proto(&proto::Packet::from(packet))
    }

    pub(crate) fn write_proto(&mut self, packet: &proto::Packet) -> Result<()> {
        let mut buf = Vec::with_capacity(packet.encoded_len() + 10);
        prost::encoding::encode_varint(packet.encoded_len() as u64, &mut buf);
        packet
            .encode(&mut buf)
            .map_err(|e| Error::decode(&self.path, e.to_string()))?;

        self.file
            .write_all(&buf)
            .map_err(|e| Error::io(&self.path, e))?;

        self.count += 1;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.file.flush().map_err(|e| Error::io(&self.path, e))
    }
}
