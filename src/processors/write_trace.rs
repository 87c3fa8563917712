use std::{collections::HashSet, fs, path::PathBuf};

use anyhow::{Context as _, Result};

use crate::{
    context::{Context, WriterParams},
    error::Error,
    ir::TraceUid,
    notification::{Event, Notification, Packet},
    sink::{FieldCopier, StructuralCopy, TranscriptionCache},
    NotificationSink, NotificationSource,
};

/// Writes every source trace it is fed with as a new CTF trace.
///
/// A failure while transcribing a source trace stops the output of that
/// trace only.
pub struct WriterComponent<C = FieldCopier> {
    base_path: PathBuf,
    cache: TranscriptionCache<C>,
    failed: HashSet<TraceUid>,
    packets: usize,
    events: usize,
}

impl WriterComponent<FieldCopier> {
    pub fn new(params: WriterParams) -> Self {
        Self::with_cache(params.base_path.clone(), TranscriptionCache::new(params))
    }
}

impl<C: StructuralCopy> WriterComponent<C> {
    pub fn with_cache(base_path: PathBuf, cache: TranscriptionCache<C>) -> Self {
        Self {
            base_path,
            cache,
            failed: HashSet::new(),
            packets: 0,
            events: 0,
        }
    }

    pub fn cache(&self) -> &TranscriptionCache<C> {
        &self.cache
    }

    pub fn is_failed(&self, src: TraceUid) -> bool {
        self.failed.contains(&src)
    }

    pub fn on_new_packet(&mut self, packet: &Packet) -> crate::error::Result<()> {
        let src = &packet.trace;
        let stream = self.cache.get_or_create_stream(src, packet.stream)?;
        let context = self.cache.copier().copy_packet_context(packet, true)?;

        self.cache
            .writer_mut(src.uid())?
            .set_packet_context(stream, context.unwrap_or_default())
    }

    pub fn on_close_packet(&mut self, packet: &Packet) -> crate::error::Result<()> {
        let src = &packet.trace;
        let stream = self
            .cache
            .lookup_stream(src.uid(), packet.stream)
            .ok_or(Error::MissingMapping("stream"))?;

        self.cache.writer_mut(src.uid())?.flush(stream)?;
        self.packets += 1;
        Ok(())
    }

    pub fn on_event(&mut self, event: &Event) -> crate::error::Result<()> {
        let src = event.trace();
        let stream = self
            .cache
            .lookup_stream(src.uid(), event.packet.stream)
            .ok_or(Error::MissingMapping("stream"))?;
        let stream_class = self
            .cache
            .lookup_stream_class(src.uid(), event.packet.stream().class)
            .ok_or(Error::MissingMapping("stream class"))?;

        let event_class = event.event_class().ok_or(Error::UnknownEventClass {
            stream_class_id: event.packet.stream_class().id,
            id: event.event_class_id,
        })?;
        self.cache
            .get_or_create_event_class(src.uid(), stream_class, event_class)?;

        let copy = self.cache.copier().copy_event(event, true)?;
        self.cache
            .writer_mut(src.uid())?
            .append_event(stream, event_class.id, copy)?;
        self.events += 1;
        Ok(())
    }

    fn handle(&mut self, notif: &Notification) -> crate::error::Result<()> {
        match notif {
            Notification::PacketBegin(packet) => self.on_new_packet(packet),
            Notification::Event(event) => self.on_event(event),
            Notification::PacketEnd(packet) => self.on_close_packet(packet),
        }
    }
}

impl TryFrom<&Context> for WriterComponent {
    type Error = anyhow::Error;

    fn try_from(ctx: &Context) -> Result<Self> {
        let params = ctx
            .writer
            .clone()
            .context("no output directory given")?;
        Ok(WriterComponent::new(params))
    }
}

impl<C: StructuralCopy> NotificationSink for WriterComponent<C> {
    fn pre_load_init(&mut self, _ctx: &Context) -> Result<()> {
        fs::create_dir_all(&self.base_path)
            .with_context(|| format!("cannot create `{}`", self.base_path.display()))?;

        Ok(())
    }

    fn post_load_init(&mut self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    fn consume_notification(&mut self, notif: Notification, _ctx: &Context) {
        let uid = notif.trace().uid();
        if self.failed.contains(&uid) {
            return;
        }

        if let Err(e) = self.handle(&notif) {
            tracing::error!("stopping the output of a trace: {}", e);
            self.failed.insert(uid);
        }
    }

    fn finalize<S: NotificationSource>(&mut self, src: &S, _ctx: &Context) -> Result<()> {
        self.cache.close_all()?;

        tracing::info!("wrote {} packets, {} events", self.packets, self.events);
        eprintln!("Results saved in {}.", self.base_path.display());

        if !self.failed.is_empty() {
            let names: Vec<&str> = self
                .failed
                .iter()
                .map(|uid| src.trace_name(*uid).unwrap_or("?"))
                .collect();
            anyhow::bail!("incomplete output for trace(s): {}", names.join(", "));
        }

        Ok(())
    }
}
