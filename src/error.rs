//! Error types.
//!
//! Every fatal condition of the library is reported as an [`Error`] value.
//! Nothing here aborts the process and nothing is retried: callers decide.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no CTF traces recursively found in `{}`", .0.display())]
    NoTraces(PathBuf),

    #[error("opening a trace in `/` is not supported")]
    RootTrace,

    #[error("invalid metadata in `{}`: {reason}", path.display())]
    Metadata { path: PathBuf, reason: String },

    #[error("cannot get first packet's header and context fields of `{}`: {source}", path.display())]
    FirstPacket {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("cannot select a stream class for `{}`: packet header has no stream ID and the trace declares {count} stream classes", path.display())]
    AmbiguousStreamClass { path: PathBuf, count: usize },

    #[error("trace declares no stream class (`{}`)", .0.display())]
    NoStreamClass(PathBuf),

    #[error("unknown stream class ID {0}")]
    UnknownStreamClass(u64),

    #[error("unknown event class ID {id} in stream class {stream_class_id}")]
    UnknownEventClass { stream_class_id: u64, id: u64 },

    #[error("trace is static: no stream class or stream can be added")]
    StaticTrace,

    #[error("duplicate clock class `{0}`")]
    DuplicateClockClass(String),

    #[error("duplicate stream class ID {0}")]
    DuplicateStreamClass(u64),

    #[error("duplicate event class ID {id} in stream class {stream_class_id}")]
    DuplicateEventClass { stream_class_id: u64, id: u64 },

    #[error("clock class `{0}` not found")]
    UnknownClockClass(String),

    #[error("cannot decode `{}`: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("stream file `{}` ended before producing any notification", .0.display())]
    UnexpectedEnd(PathBuf),

    #[error("stream file group is empty")]
    EmptyGroup,

    #[error("structural copy failed: {0}")]
    Copy(String),

    #[error("no destination {0} mapped for this source object")]
    MissingMapping(&'static str),

    #[error("stream {0} has no open packet")]
    PacketNotOpen(u64),

    #[error("stream {0} already has an open packet")]
    PacketAlreadyOpen(u64),

    #[error("cannot flush stream {stream}: {reason}")]
    Flush { stream: u64, reason: String },

    #[error("cannot append event to stream {stream}: {reason}")]
    Append { stream: u64, reason: String },

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("unknown query object `{0}`")]
    UnknownQuery(String),
}

impl Error {
    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn decode<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Error::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
