//! Trace metadata files.
//!
//! Every trace directory holds one `metadata` file describing its schema.
//! The file is either plain text or a packetized stream (see
//! [`packetized`]). Turning the document into a [`TraceClass`] is the job of
//! a [`MetadataProvider`]; [`JsonMetadataProvider`] reads documents whose
//! body is the JSON rendering of the graph, as produced by [`write_metadata`].

use std::{
    fs,
    path::{Path, PathBuf},
};

use nom::number::Endianness;

use crate::{
    error::{Error, Result},
    ir::TraceClass,
};

pub mod packetized;

pub const METADATA_FILENAME: &str = "metadata";
pub const METADATA_TEXT_SIG: &str = "/* CTF 1.8";

const METADATA_PACKET_SIZE: usize = 4096;

/// Builds the metadata graph of a trace.
pub trait MetadataProvider {
    fn load(&self, trace_root: &Path) -> Result<TraceClass>;
}

/// Decoded content of a metadata file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataDocument {
    pub text: String,
    pub is_packetized: bool,
}

pub fn metadata_path<P: AsRef<Path>>(trace_root: P) -> PathBuf {
    trace_root.as_ref().join(METADATA_FILENAME)
}

/// Reads the metadata file of `trace_root`, decoding it if packetized.
pub fn read_metadata<P: AsRef<Path>>(trace_root: P) -> Result<MetadataDocument> {
    let path = metadata_path(trace_root);
    let data = fs::read(&path).map_err(|e| Error::io(&path, e))?;

    match packetized::packetized_byte_order(&data) {
        Some(endianness) => {
            let text = packetized::decode(&data, endianness).map_err(|reason| {
                Error::Metadata {
                    path: path.clone(),
                    reason,
                }
            })?;

            Ok(MetadataDocument {
                text,
                is_packetized: true,
            })
        }
        None => {
            let text = String::from_utf8(data).map_err(|e| Error::Metadata {
                path: path.clone(),
                reason: e.to_string(),
            })?;

            Ok(MetadataDocument {
                text,
                is_packetized: false,
            })
        }
    }
}

/// Prefixes `text` with the CTF 1.8 signature unless it already has one.
pub fn with_signature(text: &str) -> String {
    if text.starts_with(METADATA_TEXT_SIG) {
        text.to_string()
    } else {
        format!("{} */\n\n{}", METADATA_TEXT_SIG, text)
    }
}

/// Answers the `metadata-info` query for the trace at `path`.
pub fn metadata_info<P: AsRef<Path>>(path: P) -> Result<MetadataDocument> {
    let doc = read_metadata(path)?;

    Ok(MetadataDocument {
        text: with_signature(&doc.text),
        is_packetized: doc.is_packetized,
    })
}

fn strip_leading_comment(text: &str) -> Option<&str> {
    let text = text.trim_start();

    match text.strip_prefix("/*") {
        Some(rest) => rest.find("*/").map(|end| &rest[end + 2..]),
        None => Some(text),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMetadataProvider;

impl MetadataProvider for JsonMetadataProvider {
    fn load(&self, trace_root: &Path) -> Result<TraceClass> {
        let path = metadata_path(trace_root);
        let doc = read_metadata(trace_root)?;

        let body = strip_leading_comment(&doc.text).ok_or_else(|| Error::Metadata {
            path: path.clone(),
            reason: "unterminated comment".to_string(),
        })?;

        let trace: TraceClass = serde_json::from_str(body).map_err(|e| Error::Metadata {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        trace.validate().map_err(|e| Error::Metadata {
            path,
            reason: e.to_string(),
        })?;

        tracing::debug!(
            "loaded metadata of `{}`: {} clock classes, {} stream classes",
            trace_root.display(),
            trace.clock_class_count(),
            trace.stream_class_count()
        );

        Ok(trace)
    }
}

/// Writes the metadata file of `trace` in `trace_root`.
pub fn write_metadata<P: AsRef<Path>>(
    trace_root: P,
    trace: &TraceClass,
    packetize: bool,
) -> Result<()> {
    let path = metadata_path(trace_root);
    let json = serde_json::to_string_pretty(trace).map_err(|e| Error::Metadata {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    let text = with_signature(&json);

    let data = if packetize {
        packetized::encode(&text, Endianness::Little, METADATA_PACKET_SIZE)
    } else {
        text.into_bytes()
    };

    fs::write(&path, data).map_err(|e| Error::io(&path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{clock::ClockClass, stream::StreamClass};

    fn sample_trace() -> TraceClass {
        let mut trace = TraceClass::new();
        trace.name = Some("sample".to_string());
        trace
            .add_clock_class(ClockClass::new("monotonic", 1_000_000_000))
            .unwrap();
        trace.add_stream_class(StreamClass::new(7)).unwrap();
        trace
    }

    #[test]
    fn test_signature() {
        assert_eq!(with_signature("x"), "/* CTF 1.8 */\n\nx");
        assert_eq!(with_signature("/* CTF 1.8 */ x"), "/* CTF 1.8 */ x");
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();

        for packetize in [false, true] {
            write_metadata(dir.path(), &sample_trace(), packetize).unwrap();

            let info = metadata_info(dir.path()).unwrap();
            assert_eq!(info.is_packetized, packetize);
            assert!(info.text.starts_with(METADATA_TEXT_SIG));

            let trace = JsonMetadataProvider.load(dir.path()).unwrap();
            assert_eq!(trace.name.as_deref(), Some("sample"));
            assert_eq!(trace.clock_class_count(), 1);
            assert!(trace.stream_class_by_id(7).is_some());
        }
    }

    #[test]
    fn test_metadata_info_adds_signature() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(metadata_path(dir.path()), "{}").unwrap();

        let info = metadata_info(dir.path()).unwrap();
        assert_eq!(info.text, "/* CTF 1.8 */\n\n{}");
        assert!(!info.is_packetized);

        assert!(JsonMetadataProvider.load(dir.path()).is_ok());
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            JsonMetadataProvider.load(dir.path()),
            Err(Error::Io { .. })
        ));

        fs::write(metadata_path(dir.path()), "/* CTF 1.8 */ trace { };").unwrap();
        assert!(matches!(
            JsonMetadataProvider.load(dir.path()),
            Err(Error::Metadata { .. })
        ));
    }
}
