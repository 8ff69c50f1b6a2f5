//! Crate-level error type.
//!
//! A single `Snafu`-derived enum covers every public operation; the surface is small enough that
//! splitting it per module would just add indirection. Each variant carries the context (path,
//! seq, or the underlying `io::Error`) a caller needs to decide how to recover.

use std::{io, path::PathBuf};

use snafu::Snafu;

/// Errors returned by [`crate::LogStore`] and the cursors it creates.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// An I/O error occurred while opening, extending, or mapping a file.
    #[snafu(display("I/O error on {}: {}", path.display(), source))]
    Io { path: PathBuf, source: io::Error },

    /// The operation was attempted after the store (or block map) was closed.
    #[snafu(display("operation attempted on a closed store"))]
    Closed,

    /// `close()` was called while one or more blocks were still pinned.
    #[snafu(display("cannot close block map: {count} block(s) still in use"))]
    InUse { count: usize },

    /// `start_excerpt` was asked for a capacity that does not fit in a single data block.
    #[snafu(display("requested capacity {requested} is not smaller than the data block size {block_size}"))]
    CapacityTooLarge { requested: usize, block_size: u64 },

    /// A negative sequence number was supplied where only non-negative values are valid.
    #[snafu(display("sequence number {seq} is out of bounds"))]
    IndexOutOfBounds { seq: i64 },

    /// `finish()` detected that another writer advanced the store since this appender was
    /// created. The core does not serialize writers with a lock; this is the fallback detection.
    #[snafu(display(
        "concurrent writer detected: appender expected store size {expected}, found {actual}"
    ))]
    ConcurrentWriter { expected: i64, actual: i64 },

    /// Recovery, or a reader, found index bytes that cannot be interpreted under the padding /
    /// slot rules in the data model. Treated as fatal; the store refuses to open.
    #[snafu(display("corrupt index file {}: {reason}", path.display()))]
    Corrupt { path: PathBuf, reason: String },
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
