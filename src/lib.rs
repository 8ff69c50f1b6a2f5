//! An append-only, indexed log over memory-mapped files.
//!
//! A [`LogStore`] owns a pair of files (`<base>.index`, `<base>.data`) and hands out three kinds
//! of cursor over them: one [`Appender`] (single writer), any number of [`Tailer`]s (sequential
//! readers), and any number of [`Excerpt`]s (random-access readers). Publication is lock-free:
//! the appender release-stores a slot value once a record is fully written, and readers
//! acquire-load it, so a reader never observes a record's bytes before the slot that marks it
//! readable.
//!
//! Opening a store recovers its last committed sequence number by scanning the index file; this
//! lets a process crash mid-write without losing already-committed records or corrupting the
//! recovered position.

#[macro_use]
extern crate tracing;

mod appender;
mod block_map;
mod config;
mod cursor;
mod error;
mod layout;
mod pool;
mod excerpt;
mod raw;
mod slot;
mod store;
mod tailer;

pub use appender::{Appender, ExcerptWrite};
pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use excerpt::{Comparator, Excerpt};
pub use pool::{RollDirection, StoreFileListener, StorePool};
pub use store::LogStore;
pub use tailer::Tailer;
