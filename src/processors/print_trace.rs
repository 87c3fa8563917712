use std::{
    collections::BTreeMap,
    io::{self, Stdout, Write},
};

use anyhow::Result;
use time::{macros::format_description, OffsetDateTime};

use crate::{
    context::Context, ir::TraceUid, notification::Notification, NotificationSink,
    NotificationSource,
};

const NS_PER_S: u64 = 1_000_000_000;

#[derive(Debug, Default, Clone, Copy)]
struct TraceCounts {
    packets: usize,
    events: usize,
}

/// Prints notifications as text lines, one per notification.
pub struct TextPrinter<W = Stdout> {
    out: W,
    last_ns: Option<i64>,
    counts: BTreeMap<TraceUid, TraceCounts>,
    write_error: Option<io::Error>,
}

impl TextPrinter<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

fn format_timestamp(ns: i64) -> String {
    let date_format = format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:9]"
    );

    OffsetDateTime::from_unix_timestamp_nanos(ns as i128)
        .ok()
        .and_then(|t| t.format(&date_format).ok())
        .unwrap_or_else(|| ns.to_string())
}

fn format_delta(delta: i64) -> String {
    let sign = if delta < 0 { '-' } else { '+' };
    let delta = delta.unsigned_abs();
    format!("{}{}.{:09}", sign, delta / NS_PER_S, delta % NS_PER_S)
}

impl<W: Write> TextPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_ns: None,
            counts: BTreeMap::new(),
            write_error: None,
        }
    }

    fn print(&mut self, notif: &Notification) -> io::Result<()> {
        let ts = notif.timestamp_ns();
        let stamp = match ts {
            Some(ns) => format_timestamp(ns),
            None => "unknown".to_string(),
        };
        let delta = match (ts, self.last_ns) {
            (Some(ns), Some(last)) => format_delta(ns.saturating_sub(last)),
            (Some(_), None) => format_delta(0),
            (None, _) => "+?.?????????".to_string(),
        };
        if ts.is_some() {
            self.last_ns = ts;
        }

        let packet = notif.packet();
        let sc = packet.stream_class();
        write!(self.out, "[{}] ({}) ", stamp, delta)?;

        match notif {
            Notification::PacketBegin(_) => {
                write!(
                    self.out,
                    "packet begin: stream class {}, stream {}",
                    sc.id,
                    packet.stream.index()
                )?;
                if let Some(ctx) = &packet.context {
                    write!(self.out, ", context = {}", ctx)?;
                }
            }
            Notification::Event(event) => {
                let name = event
                    .event_class()
                    .map(|ec| ec.name.as_str())
                    .unwrap_or("?");
                write!(self.out, "{}:", name)?;
                if let Some(ctx) = &event.stream_context {
                    write!(self.out, " stream context = {},", ctx)?;
                }
                if let Some(ctx) = &event.context {
                    write!(self.out, " context = {},", ctx)?;
                }
                write!(self.out, " {}", event.payload)?;
            }
            Notification::PacketEnd(_) => {
                write!(self.out, "packet end: stream {}", packet.stream.index())?;
            }
        }

        writeln!(self.out)
    }
}

impl<W: Write> NotificationSink for TextPrinter<W> {
    fn pre_load_init(&mut self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    fn post_load_init(&mut self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    fn consume_notification(&mut self, notif: Notification, _ctx: &Context) {
        let counts = self.counts.entry(notif.trace().uid()).or_default();
        match notif {
            Notification::PacketBegin(_) => counts.packets += 1,
            Notification::Event(_) => counts.events += 1,
            Notification::PacketEnd(_) => {}
        }

        if self.write_error.is_some() {
            return;
        }
        if let Err(e) = self.print(&notif) {
            self.write_error = Some(e);
        }
    }

    fn finalize<S: NotificationSource>(&mut self, src: &S, _ctx: &Context) -> Result<()> {
        if let Some(e) = self.write_error.take() {
            return Err(e.into());
        }

        for (uid, counts) in &self.counts {
            tracing::info!(
                "trace `{}`: {} packets, {} events",
                src.trace_name(*uid).unwrap_or("?"),
                counts.packets,
                counts.events
            );
        }

        self.out.flush()?;
        Ok(())
    }
}
