//! Source to destination identity maps.
//!
//! Every source trace gets its own destination [`CtfWriter`], named
//! `<base>/<name_base>_<seq>` with a three-digit sequence number. Source
//! stream classes and streams are mapped to their destination counterpart the
//! first time they are seen; later lookups return the same handle.

use std::path::PathBuf;

use super::{
    copy::{FieldCopier, StructuralCopy},
    ctf_writer::CtfWriter,
};
use crate::{
    context::WriterParams,
    error::{Error, Result},
    ir::{stream::EventClass, StreamClassHandle, StreamHandle, TraceClass, TraceUid},
    utils::Dispatcher,
};

pub struct TranscriptionCache<C = FieldCopier> {
    copier: C,
    params: WriterParams,
    next_seq: u32,
    writers: Dispatcher<TraceUid, CtfWriter>,
    stream_classes: Dispatcher<(TraceUid, StreamClassHandle), StreamClassHandle>,
    streams: Dispatcher<(TraceUid, StreamHandle), StreamHandle>,
}

impl TranscriptionCache<FieldCopier> {
    pub fn new(params: WriterParams) -> Self {
        Self::with_copier(params, FieldCopier)
    }
}

impl<C: StructuralCopy> TranscriptionCache<C> {
    pub fn with_copier(params: WriterParams, copier: C) -> Self {
        Self {
            copier,
            params,
            next_seq: 0,
            writers: Dispatcher::new(),
            stream_classes: Dispatcher::new(),
            streams: Dispatcher::new(),
        }
    }

    pub fn copier(&self) -> &C {
        &self.copier
    }

    pub fn writer(&self, src: TraceUid) -> Option<&CtfWriter> {
        self.writers.get(&src)
    }

    pub fn writer_mut(&mut self, src: TraceUid) -> Result<&mut CtfWriter> {
        self.writers
            .get_mut(&src)
            .ok_or(Error::MissingMapping("writer"))
    }

    pub fn writers(&self) -> impl Iterator<Item = &CtfWriter> {
        self.writers.values()
    }

    fn trace_path(&self, seq: u32) -> PathBuf {
        self.params
            .base_path
            .join(format!("{}_{:03}", self.params.trace_name_base, seq))
    }

    /// Destination writer of `src`. A failed creation consumes its sequence
    /// number and leaves nothing cached.
    pub fn get_or_create_writer(&mut self, src: &TraceClass) -> Result<&mut CtfWriter> {
        if !self.writers.contains(&src.uid()) {
            let seq = self.next_seq;
            self.next_seq += 1;
            let path = self.trace_path(seq);

            let copier = &self.copier;
            let packetized = self.params.packetized_metadata;
            self.writers.try_get_or_new(&src.uid(), || {
                let mut writer = CtfWriter::create(&path, packetized)?;
                copier.copy_trace(src, writer.trace_mut())?;
                tracing::info!(
                    "writing trace `{}` to `{}`",
                    src.name.as_deref().unwrap_or(""),
                    path.display()
                );
                Ok::<_, Error>(writer)
            })?;
        }

        self.writer_mut(src.uid())
    }

    pub fn lookup_stream_class(
        &self,
        src: TraceUid,
        stream_class: StreamClassHandle,
    ) -> Option<StreamClassHandle> {
        self.stream_classes.get(&(src, stream_class)).copied()
    }

    /// Destination stream class of `stream_class`. On a miss, the clock
    /// classes of `src` are copied first, then the stream class itself with
    /// internal fields populated.
    pub fn get_or_create_stream_class(
        &mut self,
        src: &TraceClass,
        stream_class: StreamClassHandle,
    ) -> Result<StreamClassHandle> {
        if let Some(handle) = self.lookup_stream_class(src.uid(), stream_class) {
            return Ok(handle);
        }

        self.get_or_create_writer(src)?;
        let writer = self
            .writers
            .get_mut(&src.uid())
            .ok_or(Error::MissingMapping("writer"))?;

        self.copier.copy_clock_classes(src, writer.trace_mut())?;
        let copy = self
            .copier
            .copy_stream_class(src.stream_class(stream_class), true)?;
        let handle = writer.add_stream_class(copy)?;

        self.stream_classes
            .get_or_new(&(src.uid(), stream_class), || handle);
        Ok(handle)
    }

    pub fn lookup_stream(&self, src: TraceUid, stream: StreamHandle) -> Option<StreamHandle> {
        self.streams.get(&(src, stream)).copied()
    }

    pub fn get_or_create_stream(
        &mut self,
        src: &TraceClass,
        stream: StreamHandle,
    ) -> Result<StreamHandle> {
        if let Some(handle) = self.lookup_stream(src.uid(), stream) {
            return Ok(handle);
        }

        let src_stream = src.stream(stream);
        let stream_class = self.get_or_create_stream_class(src, src_stream.class)?;
        let handle = self
            .writer_mut(src.uid())?
            .create_stream(stream_class, src_stream.instance_id)?;

        self.streams.get_or_new(&(src.uid(), stream), || handle);
        Ok(handle)
    }

    /// Makes sure the destination stream class holds a copy of
    /// `event_class`, looked up by ID.
    pub fn get_or_create_event_class(
        &mut self,
        src: TraceUid,
        stream_class: StreamClassHandle,
        event_class: &EventClass,
    ) -> Result<()> {
        let writer = self
            .writers
            .get_mut(&src)
            .ok_or(Error::MissingMapping("writer"))?;

        if writer
            .trace()
            .stream_class(stream_class)
            .event_class_by_id(event_class.id)
            .is_some()
        {
            return Ok(());
        }

        let copy = self.copier.copy_event_class(event_class)?;
        writer.add_event_class(stream_class, copy)
    }

    /// Closes every writer, going on after a failure. The first error is
    /// returned.
    pub fn close_all(&mut self) -> Result<()> {
        let mut res = Ok(());
        for writer in self.writers.values_mut() {
            if let Err(e) = writer.close() {
                tracing::error!("cannot close `{}`: {}", writer.path().display(), e);
                if res.is_ok() {
                    res = Err(e);
                }
            }
        }
        res
    }
}
