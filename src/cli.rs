//! Command line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(author, version, about = "Reads CTF traces from the file system and writes them back")]
pub struct CLI {
    #[command(subcommand)]
    pub command: CtfFsSubCommand,

    /// Report progress on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Trace directory, or a directory holding traces
    pub path: PathBuf,

    /// Seconds added to the offset of every clock class
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub offset_s: i64,

    /// Nanoseconds added to the offset of every clock class
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub offset_ns: i64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryObject {
    /// Metadata text of a trace and whether it is packetized
    MetadataInfo,
}

#[derive(Subcommand, Debug)]
pub enum CtfFsSubCommand {
    /// Copy traces through the CTF writer
    Convert {
        #[command(flatten)]
        source: SourceArgs,

        /// Directory receiving the written traces
        #[arg(short, long)]
        output: PathBuf,

        /// Base name of the written traces
        #[arg(long, default_value = "trace")]
        name: String,

        /// Write packetized metadata files
        #[arg(long)]
        packetized: bool,
    },

    /// List traces, ports and stream files
    List {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Print every notification in time order
    Print {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Query a trace
    Query {
        #[arg(value_enum)]
        object: QueryObject,

        /// Trace directory
        path: PathBuf,
    },
}

impl QueryObject {
    pub fn name(&self) -> &'static str {
        match self {
            QueryObject::MetadataInfo => "metadata-info",
        }
    }
}

impl CLI {
    pub fn source_args(&self) -> Option<&SourceArgs> {
        match &self.command {
            CtfFsSubCommand::Convert { source, .. }
            | CtfFsSubCommand::List { source }
            | CtfFsSubCommand::Print { source } => Some(source),
            CtfFsSubCommand::Query { .. } => None,
        }
    }
}
