//! The single-writer cursor.
//!
//! One struct owns the write head, reserving space before the caller fills it in and publishing
//! it on `finish`. There is no background flush actor: publication is a single release-store, and
//! `synchronous_mode` folds msync into `finish` directly rather than routing through a channel.

use std::sync::Arc;

use crate::{
    config::Config,
    cursor::Cursor,
    error::{self, Result},
    layout, raw,
    slot::{self, Resolved},
    store::LogStore,
};

/// Appends records to a log. Only one `Appender` should be live per store at a time; concurrent
/// use from two appenders is detected (not prevented) at [`ExcerptWrite::finish`].
pub struct Appender {
    cursor: Cursor,
}

impl Appender {
    pub(crate) fn new(store: Arc<LogStore>) -> Result<Self> {
        let config = *store.config();
        let mut cursor = Cursor::at_origin(store, config)?;
        seek_to_end(&mut cursor)?;
        Ok(Self { cursor })
    }

    /// Reserves `capacity` bytes in the data file for a new record, rolling to a fresh data block
    /// first if the record would not fit in the one currently open.
    pub fn start_excerpt(&mut self, capacity: usize) -> Result<ExcerptWrite<'_>> {
        let db = self.cursor.config.data_block_size;
        if capacity as u64 >= db {
            return error::CapacityTooLargeSnafu {
                requested: capacity,
                block_size: db,
            }
            .fail();
        }

        if self.cursor.data_addr + capacity as u64 > db {
            ensure_index_line(&mut self.cursor)?;
            emit_padding(&mut self.cursor)?;
            self.cursor.advance_data_block()?;
        }
        ensure_index_line(&mut self.cursor)?;

        let start_absolute = self.cursor.data_absolute();
        Ok(ExcerptWrite {
            appender: self,
            capacity,
            start_absolute,
        })
    }

    /// Forces the current data block closed with a padding entry, without writing a record.
    pub fn add_padded_entry(&mut self) -> Result<()> {
        ensure_index_line(&mut self.cursor)?;
        emit_padding(&mut self.cursor)?;
        self.cursor.advance_data_block()?;
        Ok(())
    }

    /// Sequence number that the next call to [`Appender::start_excerpt`] will commit.
    pub fn next_sequence(&self) -> u64 {
        self.cursor.seq
    }
}

/// A reserved, not-yet-published data region. Write the record into [`ExcerptWrite::bytes_mut`],
/// then call [`ExcerptWrite::finish`] with the number of bytes actually used.
pub struct ExcerptWrite<'a> {
    appender: &'a mut Appender,
    capacity: usize,
    start_absolute: i64,
}

impl<'a> ExcerptWrite<'a> {
    /// The reserved, writable region. Any bytes left unused past what is passed to `finish` are
    /// never read back.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let cursor = &self.appender.cursor;
        let offset = cursor.data_addr as usize;
        // SAFETY: `start_excerpt` reserved `capacity` bytes at this offset within the pinned data
        // block, and nothing else writes through this pointer while `self` is alive.
        unsafe { std::slice::from_raw_parts_mut(cursor.data_ptr().add(offset), self.capacity) }
    }

    /// Publishes the record as `used_len` bytes of the reserved region and returns its sequence
    /// number.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ConcurrentWriter`] if another appender has committed records to
    /// this store since this one was constructed.
    pub fn finish(self, used_len: usize) -> Result<u64> {
        assert!(
            used_len <= self.capacity,
            "used_len must not exceed the reserved capacity"
        );
        let cursor = &mut self.appender.cursor;

        let expected = cursor.seq;
        let actual = cursor.store.size();
        if actual != expected {
            return error::ConcurrentWriterSnafu {
                expected: expected as i64,
                actual: actual as i64,
            }
            .fail();
        }

        let end_absolute = self.start_absolute + used_len as i64;
        let rel_off = end_absolute - cursor.base_data_offset;
        assert!(rel_off > 0, "record end must be past its line's base offset");

        // SAFETY: `index_addr` is within the pinned index block, 4-byte aligned by construction.
        unsafe { raw::store_i32_release(cursor.index_ptr(), cursor.index_addr, rel_off as i32) };
        cursor.index_addr += 4;
        let committed_seq = cursor.seq;
        cursor.seq += 1;
        cursor.store.bump_last_written_index(committed_seq as i64);
        cursor.data_addr += used_len as u64;

        ensure_index_line(cursor)?;

        if cursor.config.synchronous_mode {
            cursor.data_block.flush()?;
            cursor.index_block.flush()?;
        }

        Ok(committed_seq)
    }
}

/// Opens the index line at the cursor's current position if it has not been opened yet, writing
/// its base-data-offset from the cursor's live data position. Acquires the next index block first
/// if the current one is exhausted. A no-op if the cursor is mid-line.
fn ensure_index_line(cursor: &mut Cursor) -> Result<()> {
    let cl = cursor.config.cache_line_size;
    let rem = cursor.index_addr % cl;
    if rem == 0 {
        if cursor.index_addr >= cursor.config.index_block_size {
            cursor.advance_index_block()?;
        }
        let base = cursor.data_absolute();
        // SAFETY: `index_addr` is within the pinned index block, 8-byte aligned (a multiple of
        // `cache_line_size`).
        unsafe { raw::store_i64_plain(cursor.index_ptr(), cursor.index_addr, base) };
        cursor.base_data_offset = base;
        cursor.index_addr += 8;
    } else {
        debug_assert_ne!(rem, 4, "index cursor landed inside a line's base field");
    }
    Ok(())
}

/// Writes a padding entry covering the rest of the current data block, if any bytes remain in it.
/// Returns whether a padding entry was actually written.
fn emit_padding(cursor: &mut Cursor) -> Result<bool> {
    let db = cursor.config.data_block_size as i64;
    let block_end = cursor.data_block_start_absolute() + db;
    let pad_size = block_end - cursor.data_absolute();
    if pad_size == 0 {
        return Ok(false);
    }

    // SAFETY: `index_addr` is within the pinned index block, 4-byte aligned by construction.
    unsafe {
        raw::store_i32_release(cursor.index_ptr(), cursor.index_addr, -(pad_size as i32));
    }
    cursor.index_addr += 4;
    cursor.seq += 1;
    cursor.store.bump_last_written_index((cursor.seq - 1) as i64);
    Ok(true)
}

/// Positions a freshly-constructed cursor just past the last committed record (or padding entry),
/// ready for the next write.
fn seek_to_end(cursor: &mut Cursor) -> Result<()> {
    let size = cursor.store.size();
    if size == 0 {
        cursor.seq = 0;
        return Ok(());
    }

    let last_seq = size - 1;
    let addr = layout::locate(last_seq, &cursor.config);
    cursor.seek_index_to(last_seq)?;

    let path = cursor.store.base_path();
    // SAFETY: `last_seq < size` means this slot was already observed committed by a successful
    // `finish`/`emit_padding`, so the index block backing it is fully mapped.
    let resolved = unsafe { slot::resolve(cursor.index_ptr(), &cursor.config, addr, path)? };
    let line_base_off = layout::line_base_offset(addr.line, &cursor.config);
    // SAFETY: see above.
    let line_base = unsafe { raw::load_i64_acquire(cursor.index_ptr(), line_base_off) };

    let absolute_end = match resolved {
        Resolved::Record { end, .. } => end,
        Resolved::Padding { .. } => {
            // SAFETY: see above.
            let start = unsafe { slot::slot_start(cursor.index_ptr(), &cursor.config, addr, path)? };
            slot::round_up_to_block(start, cursor.config.data_block_size)
        }
        Resolved::Empty => {
            return error::CorruptSnafu {
                path: path.to_path_buf(),
                reason: format!("last_written_index claims seq {last_seq} committed but its slot is empty"),
            }
            .fail();
        }
    };

    cursor.index_addr += 4;
    cursor.base_data_offset = line_base;
    cursor.seq = size;
    cursor.seek_data_to_absolute(absolute_end)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::ConfigBuilder;

    use super::*;

    fn spec_config() -> Config {
        ConfigBuilder::new()
            .data_block_size(4096)
            .index_block_size(4096)
            .cache_line_size(64)
            .build()
            .unwrap()
    }

    #[test]
    fn appends_are_sequential_and_readable_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::open(dir.path().join("log"), spec_config()).unwrap();
        let mut appender = store.create_appender().unwrap();

        for i in 0..20u8 {
            let mut write = appender.start_excerpt(8).unwrap();
            write.bytes_mut()[0] = i;
            let seq = write.finish(1).unwrap();
            assert_eq!(seq, i as u64);
        }

        assert_eq!(store.size(), 20);
        assert_eq!(store.last_written_index(), 19);
    }

    #[test]
    fn rolling_past_a_data_block_pads_and_advances_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::open(dir.path().join("log"), spec_config()).unwrap();
        let mut appender = store.create_appender().unwrap();

        {
            let mut write = appender.start_excerpt(3000).unwrap();
            write.bytes_mut()[..3000].fill(1);
            write.finish(3000).unwrap();
        }
        // 4096 - 3000 = 1096 bytes left; this one should force a roll, consuming a padding slot.
        {
            let mut write = appender.start_excerpt(2000).unwrap();
            write.bytes_mut()[..2000].fill(2);
            let seq = write.finish(2000).unwrap();
            assert_eq!(seq, 2, "record 1 was the padding entry");
        }

        assert_eq!(store.size(), 3);
    }

    #[test]
    fn line_rollover_writes_the_next_lines_base_offset() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::open(dir.path().join("log"), spec_config()).unwrap();
        let mut appender = store.create_appender().unwrap();

        // 14 records of 8 bytes fill line 0; the 15th opens line 1, whose base must equal
        // the cumulative data offset so far: 14 * 8 = 112.
        for i in 0..15u8 {
            let mut write = appender.start_excerpt(8).unwrap();
            write.bytes_mut().fill(i);
            write.finish(8).unwrap();
        }
        drop(appender);

        let block = store.index_map.acquire(0).unwrap();
        let line1_base = i64::from_ne_bytes(block.as_slice()[64..72].try_into().unwrap());
        assert_eq!(line1_base, 112);
    }

    #[test]
    fn reopening_an_appender_resumes_after_the_last_record() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("log");
        {
            let store = LogStore::open(&base, spec_config()).unwrap();
            let mut appender = store.create_appender().unwrap();
            for i in 0..5u8 {
                let mut write = appender.start_excerpt(4).unwrap();
                write.bytes_mut()[0] = i;
                write.finish(1).unwrap();
            }
        }

        let store = LogStore::open(&base, spec_config()).unwrap();
        assert_eq!(store.size(), 5);
        let mut appender = store.create_appender().unwrap();
        assert_eq!(appender.next_sequence(), 5);
        let mut write = appender.start_excerpt(4).unwrap();
        write.bytes_mut()[0] = 9;
        let seq = write.finish(1).unwrap();
        assert_eq!(seq, 5);
    }
}
