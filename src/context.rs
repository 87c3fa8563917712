//! Runtime parameters.
//!
//! The `Context` struct gathers everything the source and the sinks need at
//! runtime. It is meant to be built from command line parameters.
//! ```no_run
//! use ctf_fs::{cli::CLI, context::Context};
//! use clap::Parser;
//!
//! let args = CLI::parse();
//! let ctx = Context::from(&args);
//! ```

use std::path::PathBuf;

use crate::{
    cli::{CtfFsSubCommand, CLI},
    fs::SourceParams,
};

pub const DEFAULT_TRACE_NAME_BASE: &str = "trace";

/// Where and how the CTF writer outputs traces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterParams {
    /// Directory holding the written traces.
    pub base_path: PathBuf,
    /// Written traces are named `<base_path>/<trace_name_base>_<seq>`.
    pub trace_name_base: String,
    pub packetized_metadata: bool,
}

impl WriterParams {
    pub fn new<P: Into<PathBuf>>(base_path: P) -> Self {
        Self {
            base_path: base_path.into(),
            trace_name_base: DEFAULT_TRACE_NAME_BASE.to_string(),
            packetized_metadata: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    pub source: Option<SourceParams>,
    pub writer: Option<WriterParams>,
    pub verbose: bool,
}

impl Context {
    pub fn new(source: SourceParams) -> Self {
        Self {
            source: Some(source),
            writer: None,
            verbose: false,
        }
    }

    pub fn with_writer(mut self, writer: WriterParams) -> Self {
        self.writer = Some(writer);
        self
    }
}

impl From<&CLI> for Context {
    fn from(cli_opts: &CLI) -> Self {
        let source = cli_opts.source_args().map(|args| SourceParams {
            path: args.path.clone(),
            clock_offset_s: args.offset_s,
            clock_offset_ns: args.offset_ns,
        });

        let writer = match &cli_opts.command {
            CtfFsSubCommand::Convert {
                output,
                name,
                packetized,
                ..
            } => Some(WriterParams {
                base_path: output.clone(),
                trace_name_base: name.clone(),
                packetized_metadata: *packetized,
            }),
            _ => None,
        };

        Self {
            source,
            writer,
            verbose: cli_opts.verbose,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_context_from_cli() {
        let cli = CLI::parse_from([
            "ctf-fs",
            "convert",
            "/in",
            "--offset-ns",
            "12",
            "-o",
            "/out",
            "--name",
            "copy",
        ]);
        let ctx = Context::from(&cli);

        let source = ctx.source.unwrap();
        assert_eq!(source.clock_offset_ns, 12);
        let writer = ctx.writer.unwrap();
        assert_eq!(writer.base_path, PathBuf::from("/out"));
        assert_eq!(writer.trace_name_base, "copy");
        assert!(!writer.packetized_metadata);

        let cli = CLI::parse_from(["ctf-fs", "list", "/in"]);
        let ctx = Context::from(&cli);
        assert!(ctx.writer.is_none());
        assert_eq!(ctx.source, Some(SourceParams::new("/in")));
    }
}
