//! Stream file groups.

use std::path::{Path, PathBuf};

use crate::ir::{StreamClassHandle, StreamHandle};

/// One data-stream file and the begin time of its first packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFileInfo {
    pub path: PathBuf,
    /// Nanoseconds from the epoch, `None` when unknown.
    pub begin_ns: Option<u64>,
}

impl StreamFileInfo {
    pub fn new<P: Into<PathBuf>>(path: P, begin_ns: Option<u64>) -> Self {
        Self {
            path: path.into(),
            begin_ns,
        }
    }
}

/// The files making up one stream instance, sorted by begin time.
#[derive(Debug)]
pub struct StreamFileGroup {
    files: Vec<StreamFileInfo>,
    stream_class: StreamClassHandle,
    stream_instance_id: Option<u64>,
    stream: StreamHandle,
}

impl StreamFileGroup {
    pub fn new(
        stream_class: StreamClassHandle,
        stream_instance_id: Option<u64>,
        stream: StreamHandle,
        first: StreamFileInfo,
    ) -> Self {
        Self {
            files: vec![first],
            stream_class,
            stream_instance_id,
            stream,
        }
    }

    /// Whether files of `stream_class` with `instance_id` belong here. A
    /// group without instance ID never takes more files.
    pub fn matches(&self, stream_class: StreamClassHandle, instance_id: Option<u64>) -> bool {
        self.stream_instance_id.is_some()
            && self.stream_class == stream_class
            && self.stream_instance_id == instance_id
    }

    /// Inserts `info` before the first file beginning strictly later, so
    /// that files with equal begin times keep their insertion order.
    pub fn insert(&mut self, info: StreamFileInfo) {
        let at = self
            .files
            .iter()
            .position(|f| info.begin_ns < f.begin_ns)
            .unwrap_or(self.files.len());

        self.files.insert(at, info);
    }

    pub fn files(&self) -> &[StreamFileInfo] {
        &self.files
    }

    pub fn stream_class(&self) -> StreamClassHandle {
        self.stream_class
    }

    pub fn stream_instance_id(&self) -> Option<u64> {
        self.stream_instance_id
    }

    pub fn stream(&self) -> StreamHandle {
        self.stream
    }

    /// Path of the earliest file.
    pub fn first_path(&self) -> &Path {
        &self.files[0].path
    }
}
