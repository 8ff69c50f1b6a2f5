//! Shared cursor state used by [`crate::Appender`], [`crate::Tailer`], and [`crate::Excerpt`].
//!
//! All three need the same position bookkeeping (which index/data block is pinned, where the
//! write/read head sits within it, the currently-open line's base offset); rather than an
//! inheritance hierarchy, that state lives in one plain struct and each cursor type is a thin
//! wrapper that interprets the bytes its position points at differently. No virtual dispatch is
//! needed since none of the three are ever stored behind a common trait object on a hot path.

use std::sync::Arc;

use crate::{block_map::Block, config::Config, error::Result, layout, store::LogStore};

/// Position within the index file and data file, plus the currently-open line's base offset.
pub(crate) struct Cursor {
    pub(crate) store: Arc<LogStore>,
    pub(crate) config: Config,

    pub(crate) seq: u64,

    pub(crate) index_block_idx: u64,
    pub(crate) index_addr: u64,
    pub(crate) index_block: Block,

    pub(crate) data_block_idx: u64,
    pub(crate) data_addr: u64,
    pub(crate) data_block: Block,

    /// Absolute data-file offset that slot values in the currently-open index line are relative
    /// to. Zero until the first line of the log has ever been opened.
    pub(crate) base_data_offset: i64,
}

impl Cursor {
    /// Creates a cursor positioned at `seq == 0`, with block 0 of both files pinned.
    pub(crate) fn at_origin(store: Arc<LogStore>, config: Config) -> Result<Self> {
        let index_block = store.index_map.acquire(0)?;
        let data_block = store.data_map.acquire(0)?;
        Ok(Self {
            store,
            config,
            seq: 0,
            index_block_idx: 0,
            index_addr: 0,
            index_block,
            data_block_idx: 0,
            data_addr: 0,
            data_block,
            base_data_offset: 0,
        })
    }

    pub(crate) fn index_ptr(&self) -> *mut u8 {
        self.index_block.as_ptr()
    }

    pub(crate) fn data_ptr(&self) -> *mut u8 {
        self.data_block.as_ptr()
    }

    /// Absolute byte position of the write/read head in the data file.
    pub(crate) fn data_absolute(&self) -> i64 {
        (self.data_block_idx * self.config.data_block_size + self.data_addr) as i64
    }

    /// Absolute byte offset where the current data block starts.
    pub(crate) fn data_block_start_absolute(&self) -> i64 {
        (self.data_block_idx * self.config.data_block_size) as i64
    }

    /// Moves the index position to `seq`'s line/slot and pins the matching index block,
    /// re-acquiring if it differs from the currently-pinned one.
    pub(crate) fn seek_index_to(&mut self, seq: u64) -> Result<()> {
        let addr = layout::locate(seq, &self.config);
        if addr.block != self.index_block_idx {
            self.index_block = self.store.index_map.acquire(addr.block)?;
            self.index_block_idx = addr.block;
        }
        self.index_addr = addr.slot_offset(&self.config);
        Ok(())
    }

    /// Advances to the next index block (called when `index_addr` runs off the end of the
    /// current one).
    pub(crate) fn advance_index_block(&mut self) -> Result<()> {
        self.index_block_idx += 1;
        self.index_block = self.store.index_map.acquire(self.index_block_idx)?;
        self.index_addr = 0;
        Ok(())
    }

    /// Advances to the next data block, resetting the write/read head to its start.
    pub(crate) fn advance_data_block(&mut self) -> Result<()> {
        self.data_block_idx += 1;
        self.data_block = self.store.data_map.acquire(self.data_block_idx)?;
        self.data_addr = 0;
        Ok(())
    }

    /// Positions the data cursor at an arbitrary absolute offset, acquiring whichever data block
    /// contains it.
    pub(crate) fn seek_data_to_absolute(&mut self, absolute: i64) -> Result<()> {
        let db = self.config.data_block_size;
        let block = (absolute as u64) / db;
        let addr = (absolute as u64) % db;
        if block != self.data_block_idx {
            self.data_block = self.store.data_map.acquire(block)?;
            self.data_block_idx = block;
        }
        self.data_addr = addr;
        Ok(())
    }
}
