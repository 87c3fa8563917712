//! Packetized metadata stream decoding.
//!
//! A packetized metadata file is a sequence of packets, each starting with a
//! 37-byte header followed by a chunk of the metadata text. The byte order of
//! the header fields is given by how the magic number reads.

use nom::{bytes::complete::take, number::complete as num, number::Endianness, IResult};

pub const PACKET_MAGIC: u32 = 0x75D1_1D57;
pub const PACKET_HEADER_SIZE: usize = 37;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PacketHeader {
    magic: u32,
    checksum: u32,
    content_size: u32,
    packet_size: u32,
    compression_scheme: u8,
    encryption_scheme: u8,
    checksum_scheme: u8,
    major: u8,
    minor: u8,
}

fn parse_header(input: &[u8], endianness: Endianness) -> IResult<&[u8], PacketHeader> {
    let (i, magic) = num::u32(endianness)(input)?;
    let (i, _uuid) = take(16usize)(i)?;
    let (i, checksum) = num::u32(endianness)(i)?;
    let (i, content_size) = num::u32(endianness)(i)?;
    let (i, packet_size) = num::u32(endianness)(i)?;
    let (i, compression_scheme) = num::u8(i)?;
    let (i, encryption_scheme) = num::u8(i)?;
    let (i, checksum_scheme) = num::u8(i)?;
    let (i, major) = num::u8(i)?;
    let (i, minor) = num::u8(i)?;

    Ok((
        i,
        PacketHeader {
            magic,
            checksum,
            content_size,
            packet_size,
            compression_scheme,
            encryption_scheme,
            checksum_scheme,
            major,
            minor,
        },
    ))
}

/// Returns the byte order of a packetized metadata stream, or `None` if
/// `data` is plain text.
pub fn packetized_byte_order(data: &[u8]) -> Option<Endianness> {
    let magic: [u8; 4] = data.get(..4)?.try_into().ok()?;

    if u32::from_le_bytes(magic) == PACKET_MAGIC {
        Some(Endianness::Little)
    } else if u32::from_be_bytes(magic) == PACKET_MAGIC {
        Some(Endianness::Big)
    } else {
        None
    }
}

/// Concatenates the text of every metadata packet of `data`.
pub fn decode(data: &[u8], endianness: Endianness) -> Result<String, String> {
    let mut text = Vec::new();
    let mut rest = data;
    let mut index = 0;

    while !rest.is_empty() {
        let (_, header) = parse_header(rest, endianness)
            .map_err(|_| format!("packet {}: truncated header", index))?;

        if header.magic != PACKET_MAGIC {
            return Err(format!("packet {}: bad magic {:#x}", index, header.magic));
        }

        if (header.major, header.minor) != (1, 8) {
            return Err(format!(
                "packet {}: unsupported version {}.{}",
                index, header.major, header.minor
            ));
        }

        if header.compression_scheme != 0
            || header.encryption_scheme != 0
            || header.checksum_scheme != 0
        {
            return Err(format!(
                "packet {}: compression, encryption and checksum are not supported",
                index
            ));
        }

        if header.checksum != 0 {
            tracing::debug!("ignoring metadata packet {} checksum", index);
        }

        let content_size = header.content_size as usize / 8;
        let packet_size = header.packet_size as usize / 8;

        if content_size < PACKET_HEADER_SIZE || packet_size < content_size {
            return Err(format!(
                "packet {}: invalid sizes (content {} bits, packet {} bits)",
                index, header.content_size, header.packet_size
            ));
        }

        if packet_size > rest.len() {
            return Err(format!("packet {}: truncated content", index));
        }

        text.extend_from_slice(&rest[PACKET_HEADER_SIZE..content_size]);
        rest = &rest[packet_size..];
        index += 1;
    }

    String::from_utf8(text).map_err(|e| format!("metadata text is not UTF-8: {}", e))
}

/// Wraps `text` into metadata packets of at most `max_packet_size` bytes.
pub fn encode(text: &str, endianness: Endianness, max_packet_size: usize) -> Vec<u8> {
    let chunk_size = max_packet_size.saturating_sub(PACKET_HEADER_SIZE).max(1);
    let mut out = Vec::with_capacity(text.len() + PACKET_HEADER_SIZE);

    let put_u32 = |out: &mut Vec<u8>, v: u32| match endianness {
        Endianness::Big => out.extend_from_slice(&v.to_be_bytes()),
        _ => out.extend_from_slice(&v.to_le_bytes()),
    };

    for chunk in text.as_bytes().chunks(chunk_size) {
        let size = ((PACKET_HEADER_SIZE + chunk.len()) * 8) as u32;

        put_u32(&mut out, PACKET_MAGIC);
        out.extend_from_slice(&[0u8; 16]);
        put_u32(&mut out, 0);
        put_u32(&mut out, size);
        put_u32(&mut out, size);
        out.extend_from_slice(&[0, 0, 0, 1, 8]);
        out.extend_from_slice(chunk);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_packetized() {
        assert_eq!(packetized_byte_order(b"/* CTF 1.8 */"), None);
        assert_eq!(packetized_byte_order(b"ab"), None);
    }

    #[test]
    fn test_decode_both_byte_orders() {
        let text = "trace { major = 1; minor = 8; };\n".repeat(10);

        for endianness in [Endianness::Little, Endianness::Big] {
            let data = encode(&text, endianness, 64);
            assert!(data.len() > 64);
            assert_eq!(packetized_byte_order(&data), Some(endianness));
            assert_eq!(decode(&data, endianness).unwrap(), text);
        }
    }

    #[test]
    fn test_decode_rejects_bad_packets() {
        let mut data = encode("abc", Endianness::Little, 4096);
        data.truncate(data.len() - 1);
        assert!(decode(&data, Endianness::Little).is_err());

        let mut data = encode("abc", Endianness::Little, 4096);
        // compression scheme
        data[32] = 1;
        assert!(decode(&data, Endianness::Little).is_err());

        let mut data = encode("abc", Endianness::Little, 4096);
        // minor version
        data[36] = 7;
        assert!(decode(&data, Endianness::Little).is_err());
    }
}
