//! Notification sinks.
//!
//! This module contains the front-end of the sinks. Each of them is invoked
//! by a different CLI subcommand.

pub mod print_trace;
pub mod write_trace;
