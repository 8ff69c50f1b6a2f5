//! The sequential forward reader.
//!
//! A cursor that polls for the next record and returns `None` rather than blocking when nothing
//! new has been published yet, leaving the decision of whether/how long to wait to the caller.

use std::sync::Arc;

use crate::{cursor::Cursor, error::Result, raw, store::LogStore};

/// Reads records in sequence order, starting from `0`. Safe to use concurrently with the single
/// [`crate::Appender`] writing to the same store, and with other tailers and excerpts.
pub struct Tailer {
    cursor: Cursor,
}

impl Tailer {
    pub(crate) fn new(store: Arc<LogStore>) -> Result<Self> {
        let config = *store.config();
        let cursor = Cursor::at_origin(store, config)?;
        Ok(Self { cursor })
    }

    /// The next sequence number this tailer will attempt to read.
    pub fn position(&self) -> u64 {
        self.cursor.seq
    }

    /// Returns the next record, or `None` if nothing past the current position has been published
    /// yet. A `None` is not permanent: call again later to check for new data. Internally skips
    /// over padding entries without surfacing them.
    pub fn next_index(&mut self) -> Result<Option<&[u8]>> {
        loop {
            let cl = self.cursor.config.cache_line_size;
            if self.cursor.index_addr % cl == 0 {
                if self.cursor.index_addr >= self.cursor.config.index_block_size {
                    self.cursor.advance_index_block()?;
                }
                let is_origin = self.cursor.index_block_idx == 0 && self.cursor.index_addr == 0;
                // SAFETY: `index_addr` is within the pinned index block, 8-byte aligned.
                let base = unsafe { raw::load_i64_acquire(self.cursor.index_ptr(), self.cursor.index_addr) };
                if base == 0 && !is_origin {
                    return Ok(None);
                }
                self.cursor.base_data_offset = base;
                self.cursor.index_addr += 8;
            }

            // SAFETY: `index_addr` is within the pinned index block, 4-byte aligned.
            let value = unsafe {
                raw::load_i32_acquire_with_retry(self.cursor.index_ptr(), self.cursor.index_addr)
            };
            if value == 0 {
                return Ok(None);
            }
            self.cursor.index_addr += 4;

            if value < 0 {
                self.cursor.seq += 1;
                self.cursor.advance_data_block()?;
                continue;
            }

            let db = self.cursor.config.data_block_size;
            if self.cursor.data_addr >= db {
                self.cursor.advance_data_block()?;
            }

            let absolute_start = self.cursor.data_absolute();
            let absolute_end = self.cursor.base_data_offset + i64::from(value);
            let len = (absolute_end - absolute_start) as usize;

            let offset = self.cursor.data_addr as usize;
            // SAFETY: the appender never lets a record span two data blocks, so `[offset,
            // offset+len)` lies entirely within this pinned block.
            let record = unsafe { std::slice::from_raw_parts(self.cursor.data_ptr().add(offset), len) };

            self.cursor.data_addr += len as u64;
            self.cursor.seq += 1;
            return Ok(Some(record));
        }
    }
}
