//! The CTF file-system source.
//!
//! [`CtfFsSource`] finds every trace below a path, assembles each of them
//! into output ports (one per stream file group) and feeds sinks with the
//! merged notifications of all ports.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_json::{json, Value};

use crate::{
    context::Context,
    error::{Error, Result},
    ir::TraceUid,
    metadata::{metadata_info, JsonMetadataProvider, MetadataProvider},
    mux::Muxer,
    trace::{reader::FramedRecordSource, RecordSource},
    NotificationSink, NotificationSource,
};

pub mod assembler;
pub mod discovery;
pub mod file_group;
pub mod iterator;

use self::{
    assembler::{CtfFsTrace, OutputPort, TraceAssembler},
    discovery::{derive_names, find_traces},
    iterator::NotificationIterator,
};

/// Parameters of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceParams {
    pub path: PathBuf,
    pub clock_offset_s: i64,
    pub clock_offset_ns: i64,
}

fn integer_param(map: &serde_json::Map<String, Value>, key: &str) -> Result<i64> {
    match map.get(key) {
        None => Ok(0),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| Error::InvalidParam(format!("{} should be an integer", key))),
    }
}

impl SourceParams {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            clock_offset_s: 0,
            clock_offset_ns: 0,
        }
    }

    /// Reads `{"path": ..., "offset-s": ..., "offset-ns": ...}`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::InvalidParam("parameters are not a map".to_string()))?;

        let path = map
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidParam("`path` should be a string".to_string()))?;

        Ok(Self {
            path: PathBuf::from(path),
            clock_offset_s: integer_param(map, "offset-s")?,
            clock_offset_ns: integer_param(map, "offset-ns")?,
        })
    }
}

pub struct CtfFsSource {
    traces: Vec<CtfFsTrace>,
    records: Arc<dyn RecordSource>,
}

impl CtfFsSource {
    /// Opens the traces below `params.path`, with JSON metadata and framed
    /// data streams.
    pub fn open(params: &SourceParams) -> Result<Self> {
        Self::with_collaborators(params, &JsonMetadataProvider, Arc::new(FramedRecordSource))
    }

    pub fn with_collaborators(
        params: &SourceParams,
        metadata: &dyn MetadataProvider,
        records: Arc<dyn RecordSource>,
    ) -> Result<Self> {
        let paths = find_traces(&params.path)?;
        let names = derive_names(&paths);

        let assembler = TraceAssembler::new(metadata, records.as_ref())
            .with_clock_offset(params.clock_offset_s, params.clock_offset_ns);

        let mut traces = Vec::with_capacity(names.len());
        for (path, name) in &names {
            let trace = assembler.assemble(path, name).map_err(|e| {
                tracing::error!("cannot create trace for `{}`: {}", path.display(), e);
                e
            })?;
            traces.push(trace);
        }

        Ok(Self { traces, records })
    }

    pub fn traces(&self) -> &[CtfFsTrace] {
        &self.traces
    }

    pub fn ports(&self) -> impl Iterator<Item = &OutputPort> {
        self.traces.iter().flat_map(|t| t.ports())
    }

    pub fn iterator(&self, port: &OutputPort) -> Result<NotificationIterator> {
        NotificationIterator::init(port.clone(), self.records.clone())
    }

    /// Merges the notifications of every port.
    pub fn muxer(&self) -> Result<Muxer> {
        let iterators = self
            .ports()
            .map(|p| self.iterator(p))
            .collect::<Result<Vec<_>>>()?;

        Ok(Muxer::new(iterators))
    }

    /// Answers `object` queries. Only `metadata-info` is known.
    pub fn query(object: &str, params: &Value) -> Result<Value> {
        match object {
            "metadata-info" => {
                let path = params
                    .as_object()
                    .ok_or_else(|| {
                        Error::InvalidParam("query parameters are not a map".to_string())
                    })?
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::InvalidParam("cannot get `path` string parameter".to_string())
                    })?;

                let info = metadata_info(Path::new(path))?;

                Ok(json!({
                    "text": info.text,
                    "is-packetized": info.is_packetized,
                }))
            }
            _ => Err(Error::UnknownQuery(object.to_string())),
        }
    }
}

impl NotificationSource for CtfFsSource {
    fn event_loop<S: NotificationSink>(&mut self, sink: &mut S, ctx: &Context) -> anyhow::Result<()> {
        let mut failed_ports = 0;

        for res in self.muxer()? {
            match res {
                Ok((_, notif)) => sink.consume_notification(notif, ctx),
                Err(e) => {
                    tracing::error!("{}", e);
                    failed_ports += 1;
                }
            }
        }

        if failed_ports > 0 {
            anyhow::bail!("{} port(s) stopped on an error", failed_ports);
        }

        Ok(())
    }

    fn trace_name(&self, uid: TraceUid) -> Option<&str> {
        self.traces
            .iter()
            .find(|t| t.class().uid() == uid)
            .map(|t| t.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn test_source_params() {
        let params = SourceParams::from_value(&json!({
            "path": "/t",
            "offset-s": -2,
        }))
        .unwrap();
        assert_eq!(params.path, PathBuf::from("/t"));
        assert_eq!(params.clock_offset_s, -2);
        assert_eq!(params.clock_offset_ns, 0);

        assert!(matches!(
            SourceParams::from_value(&json!({ "path": "/t", "offset-ns": "3" })),
            Err(Error::InvalidParam(_))
        ));
        assert!(matches!(
            SourceParams::from_value(&json!({ "offset-s": 1 })),
            Err(Error::InvalidParam(_))
        ));
    }

    #[test]
    fn test_query() {
        let dir = tempfile::tempdir().unwrap();
        write_trace_dir(dir.path(), &sample_trace_class(&[0]));

        let res = CtfFsSource::query(
            "metadata-info",
            &json!({ "path": dir.path().to_string_lossy() }),
        )
        .unwrap();
        assert!(res["text"].as_str().unwrap().starts_with("/* CTF 1.8"));
        assert_eq!(res["is-packetized"], json!(false));

        assert!(matches!(
            CtfFsSource::query("stream-info", &json!({})),
            Err(Error::UnknownQuery(_))
        ));
        assert!(matches!(
            CtfFsSource::query("metadata-info", &json!([])),
            Err(Error::InvalidParam(_))
        ));
    }

    #[test]
    fn test_open_several_traces() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        for name in ["x/t1", "x/t2"] {
            let trace_dir = root.join(name);
            write_trace_dir(&trace_dir, &sample_trace_class(&[0]));
            write_stream_file(
                &trace_dir.join("stream_0"),
                &[sample_packet(Some(0), Some(0), Some(1), vec![sample_event(1, 0, "m")])],
            );
            std::fs::write(trace_dir.join("stream_1"), b"").unwrap();
        }

        let source = CtfFsSource::open(&SourceParams::new(root)).unwrap();
        let names: Vec<&str> = source.traces().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["t1", "t2"]);
        assert_eq!(source.ports().count(), 2);

        let uid = source.traces()[1].class().uid();
        assert_eq!(source.trace_name(uid), Some("t2"));

        let count = source.muxer().unwrap().count();
        assert_eq!(count, 6);
    }
}
