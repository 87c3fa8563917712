//! Trace assembly: from a trace directory to output ports.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use super::file_group::{StreamFileGroup, StreamFileInfo};
use crate::{
    error::{Error, Result},
    ir::{
        clock::ClockClassPriorityMap,
        field::{FieldValue, StructValue},
        StreamClassHandle, TraceClass,
    },
    metadata::{MetadataProvider, METADATA_FILENAME},
    trace::RecordSource,
};

/// One source of notifications: the files of one stream file group.
#[derive(Debug, Clone)]
pub struct OutputPort {
    name: String,
    trace: Arc<TraceClass>,
    group: Arc<StreamFileGroup>,
    priority_map: Arc<ClockClassPriorityMap>,
}

impl OutputPort {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trace(&self) -> &Arc<TraceClass> {
        &self.trace
    }

    pub fn group(&self) -> &Arc<StreamFileGroup> {
        &self.group
    }

    pub fn priority_map(&self) -> &Arc<ClockClassPriorityMap> {
        &self.priority_map
    }
}

/// An assembled trace. Its metadata graph is static.
#[derive(Debug)]
pub struct CtfFsTrace {
    path: PathBuf,
    name: String,
    class: Arc<TraceClass>,
    priority_map: Arc<ClockClassPriorityMap>,
    ports: Vec<OutputPort>,
}

impl CtfFsTrace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> &Arc<TraceClass> {
        &self.class
    }

    pub fn priority_map(&self) -> &Arc<ClockClassPriorityMap> {
        &self.priority_map
    }

    /// One port per stream file group.
    pub fn ports(&self) -> &[OutputPort] {
        &self.ports
    }

    pub fn groups(&self) -> impl Iterator<Item = &StreamFileGroup> {
        self.ports.iter().map(|p| p.group.as_ref())
    }
}

/// Selects the stream class of a packet: the one named by the header's
/// `stream_id`, else the sole stream class of the trace.
pub(crate) fn resolve_stream_class(
    class: &TraceClass,
    header: Option<&StructValue>,
    path: &Path,
) -> Result<StreamClassHandle> {
    if let Some(value) = header.and_then(|h| h.get("stream_id")) {
        let id = value
            .as_u64()
            .ok_or_else(|| Error::decode(path, format!("invalid stream_id {}", value)))?;

        return class
            .stream_class_by_id(id)
            .ok_or(Error::UnknownStreamClass(id));
    }

    match class.stream_class_count() {
        0 => Err(Error::NoStreamClass(path.to_path_buf())),
        1 => class
            .stream_class_by_index(0)
            .ok_or_else(|| Error::NoStreamClass(path.to_path_buf())),
        count => Err(Error::AmbiguousStreamClass {
            path: path.to_path_buf(),
            count,
        }),
    }
}

fn stream_instance_id(header: Option<&StructValue>) -> Option<u64> {
    match header?.get("stream_instance_id")? {
        FieldValue::Unsigned(id) => Some(*id),
        _ => None,
    }
}

/// Lists the candidate data-stream files of a trace directory, in file name
/// order.
fn list_data_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(root)
        .map_err(|e| Error::io(root, e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::io(root, e))?;
    entries.sort_by_key(|e| e.file_name());

    let mut files = Vec::new();

    for entry in entries {
        let path = entry.path();
        let basename = entry.file_name();
        let basename = basename.to_string_lossy();

        if basename == METADATA_FILENAME {
            continue;
        }

        if basename.starts_with('.') {
            tracing::debug!("ignoring hidden file `{}`", path.display());
            continue;
        }

        let meta = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta,
            _ => {
                tracing::debug!("ignoring non-regular file `{}`", path.display());
                continue;
            }
        };

        if meta.len() == 0 {
            tracing::debug!("ignoring empty file `{}`", path.display());
            continue;
        }

        files.push(path);
    }

    Ok(files)
}

/// Builds [`CtfFsTrace`]s out of trace directories.
pub struct TraceAssembler<'a> {
    metadata: &'a dyn MetadataProvider,
    records: &'a dyn RecordSource,
    clock_offset_s: i64,
    clock_offset_ns: i64,
}

impl<'a> TraceAssembler<'a> {
    pub fn new(metadata: &'a dyn MetadataProvider, records: &'a dyn RecordSource) -> Self {
        Self {
            metadata,
            records,
            clock_offset_s: 0,
            clock_offset_ns: 0,
        }
    }

    /// Shifts every clock class of the assembled traces.
    pub fn with_clock_offset(mut self, offset_s: i64, offset_ns: i64) -> Self {
        self.clock_offset_s = offset_s;
        self.clock_offset_ns = offset_ns;
        self
    }

    pub fn assemble(&self, root: &Path, name: &str) -> Result<CtfFsTrace> {
        let mut class = self.metadata.load(root)?;

        if self.clock_offset_s != 0 || self.clock_offset_ns != 0 {
            for cc in class.clock_classes_mut() {
                cc.apply_offset(self.clock_offset_s, self.clock_offset_ns);
            }
        }

        let mut groups = Vec::new();
        for path in list_data_files(root)? {
            self.add_stream_file(&mut class, &mut groups, path)?;
        }

        let mut priority_map = ClockClassPriorityMap::new();
        for (clock, _) in class.clock_classes() {
            priority_map.add(clock, 0);
        }

        // Every stream is known now.
        class.set_static();

        let class = Arc::new(class);
        let priority_map = Arc::new(priority_map);

        let ports: Vec<OutputPort> = groups
            .into_iter()
            .map(|group| {
                let name = group.first_path().to_string_lossy().into_owned();
                tracing::debug!("creating port `{}`", name);

                OutputPort {
                    name,
                    trace: class.clone(),
                    group: Arc::new(group),
                    priority_map: priority_map.clone(),
                }
            })
            .collect();

        tracing::info!(
            "trace `{}` ({}): {} ports",
            name,
            root.display(),
            ports.len()
        );

        Ok(CtfFsTrace {
            path: root.to_path_buf(),
            name: name.to_string(),
            class,
            priority_map,
            ports,
        })
    }

    fn add_stream_file(
        &self,
        class: &mut TraceClass,
        groups: &mut Vec<StreamFileGroup>,
        path: PathBuf,
    ) -> Result<()> {
        let (header, context) = self
            .records
            .first_packet_header_and_context(&path)
            .map_err(|e| Error::FirstPacket {
                path: path.clone(),
                source: Box::new(e),
            })?;

        let stream_class = resolve_stream_class(class, header.as_ref(), &path)?;
        let mut instance_id = stream_instance_id(header.as_ref());

        let begin_ns = class
            .clock_snapshot(
                class.stream_class(stream_class).packet_context.as_ref(),
                context.as_ref(),
                "timestamp_begin",
            )
            .and_then(|snapshot| snapshot.ns_from_epoch)
            .and_then(|ns| u64::try_from(ns).ok());

        // Without a begin time the file cannot be ordered among others.
        if begin_ns.is_none() {
            instance_id = None;
        }

        let info = StreamFileInfo::new(path, begin_ns);

        match groups
            .iter_mut()
            .find(|g| g.matches(stream_class, instance_id))
        {
            Some(group) => group.insert(info),
            None => {
                let stream = class.create_stream(stream_class, instance_id)?;
                groups.push(StreamFileGroup::new(stream_class, instance_id, stream, info));
            }
        }

        Ok(())
    }
}
