//! In-process byte pipe connecting the archive producer to the storage
//! consumer.
//!
//! The pipe is a rendezvous, not a queue: a write completes only once the
//! read side has consumed its bytes, so a slow upload directly back-pressures
//! the archive encoder and memory stays bounded regardless of archive size.
//! Each half can be closed cleanly or closed carrying an error; the error is
//! observed by the peer half (a reader sees it in place of end-of-data, a
//! writer sees it as the failure of its next write). Closing a half twice is
//! a no-op, and dropping a half closes it cleanly.

mod in_memory;

pub use in_memory::{in_memory, BlockingWriter, PipeReader, PipeWriter};
