//! CTF writer sink.
//!
//! Source objects are transcribed into destination graphs: [`copy`] turns
//! them into destination objects, [`cache`] keeps the source to destination
//! mapping and [`ctf_writer`] lays the destination traces out on disk.

pub mod cache;
pub mod copy;
pub mod ctf_writer;

pub use self::{
    cache::TranscriptionCache,
    copy::{FieldCopier, StructuralCopy},
    ctf_writer::CtfWriter,
};
