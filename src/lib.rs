//! Reading and writing CTF traces on the file system.
//!
//! `ctf-fs` finds the CTF traces below a directory, groups their data-stream
//! files into ports and reads them as a stream of notifications (packet
//! beginnings, events, packet ends). The notifications can be written back as
//! new CTF traces, with metadata transcribed into fresh destination graphs.
//!
//! The main components are either __notification sources__ or
//! __notification sinks__:
//! - A source produces notifications. It implements the `NotificationSource`
//!   trait. The file-system source, [`fs::CtfFsSource`], merges the ports of
//!   all the traces it found by time.
//! - A sink consumes notifications. It implements the `NotificationSink`
//!   trait. There are two sinks: the CTF writer
//!   ([`processors::write_trace::WriterComponent`]) and a text printer
//!   ([`processors::print_trace::TextPrinter`]).

pub mod cli;
pub mod context;
pub mod error;
pub mod logging;
pub mod utils;

pub mod fs;
pub mod ir;
pub mod metadata;
pub mod mux;
pub mod notification;
pub mod proto;
pub mod trace;

pub mod processors;
pub mod sink;

#[cfg(test)]
mod test_support;

use anyhow::Result;

use crate::{context::Context, ir::TraceUid, notification::Notification};

/// Feeds a `NotificationSink` with a stream of notifications.
pub trait NotificationSource: Sized {
    /// Consume and feed all notifications to the supplied sink.
    fn event_loop<S: NotificationSink>(&mut self, sink: &mut S, ctx: &Context) -> Result<()>;

    /// Process the notifications with the supplied `NotificationSink`. The
    /// sink is finalized even when the event loop fails.
    fn process_notifications<S: NotificationSink>(
        &mut self,
        mut sink: S,
        ctx: &Context,
    ) -> Result<()> {
        sink.post_load_init(ctx)?;

        let res = self.event_loop(&mut sink, ctx);

        let fin = sink.finalize(self, ctx);
        res.and(fin)
    }

    /// Name of the source trace whose graph is `uid`.
    fn trace_name(&self, uid: TraceUid) -> Option<&str>;
}

/// Consumes a stream of notifications.
pub trait NotificationSink {
    /// Initialize the sink before supplying it to a source.
    fn pre_load_init(&mut self, ctx: &Context) -> Result<()>;

    /// Initialize the sink after it has been supplied to a source.
    fn post_load_init(&mut self, ctx: &Context) -> Result<()>;

    /// Process a notification
    fn consume_notification(&mut self, notif: Notification, ctx: &Context);

    /// Destructor function
    fn finalize<S: NotificationSource>(&mut self, src: &S, ctx: &Context) -> Result<()>;
}
