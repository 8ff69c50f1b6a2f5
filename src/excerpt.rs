//! Random-access reads and binary search over committed records.
//!
//! Jumps straight to an arbitrary sequence number rather than only seeking forward from the
//! current position, the way a sequential reader does.

use std::{cmp::Ordering, sync::Arc};

use crate::{
    cursor::Cursor,
    error::Result,
    layout,
    slot::{self, Resolved},
    store::LogStore,
};

/// Random-access reader. Each call to [`Excerpt::index`] repositions the cursor; the previously
/// indexed record's bytes are no longer accessible once a new `index` call succeeds or fails.
pub struct Excerpt {
    cursor: Cursor,
    current: Option<(u64, i64, i64)>,
}

impl Excerpt {
    pub(crate) fn new(store: Arc<LogStore>) -> Result<Self> {
        let config = *store.config();
        let cursor = Cursor::at_origin(store, config)?;
        Ok(Self {
            cursor,
            current: None,
        })
    }

    /// Attempts to position this excerpt at `seq`. Returns `false` (and leaves
    /// [`Excerpt::bytes`] returning `None`) if `seq` has not been committed yet or names a
    /// padding entry rather than a record.
    pub fn index(&mut self, seq: u64) -> Result<bool> {
        self.current = None;
        if seq as i64 > self.cursor.store.last_written_index() {
            return Ok(false);
        }

        let addr = layout::locate(seq, &self.cursor.config);
        self.cursor.seek_index_to(seq)?;
        let path = self.cursor.store.base_path();
        // SAFETY: `seq` was checked above against `last_written_index`, so its index block is
        // fully mapped and its slot is committed.
        let resolved = unsafe { slot::resolve(self.cursor.index_ptr(), &self.cursor.config, addr, path)? };

        match resolved {
            Resolved::Record { start, end } => {
                self.cursor.seek_data_to_absolute(start)?;
                self.current = Some((seq, start, end));
                Ok(true)
            }
            Resolved::Padding { .. } | Resolved::Empty => Ok(false),
        }
    }

    /// The sequence number last successfully indexed.
    pub fn sequence(&self) -> Option<u64> {
        self.current.map(|(seq, ..)| seq)
    }

    /// The bytes of the record last successfully indexed.
    pub fn bytes(&self) -> Option<&[u8]> {
        let (_, start, end) = self.current?;
        let len = (end - start) as usize;
        let offset = self.cursor.data_addr as usize;
        // SAFETY: `index` positioned the data cursor at `start` within this pinned block, and
        // the appender never lets a record span two data blocks.
        Some(unsafe { std::slice::from_raw_parts(self.cursor.data_ptr().add(offset), len) })
    }

    /// Binary searches `[lo, hi]` (inclusive) for a record where `cmp` returns
    /// [`Ordering::Equal`], assuming records compare monotonically across the range. Padding
    /// slots encountered mid-search are skipped by trying an adjacent sequence number once.
    pub fn find_match(
        &mut self,
        mut lo: u64,
        mut hi: u64,
        cmp: &dyn Comparator,
    ) -> Result<Option<u64>> {
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            let Some(probe) = self.nearest_record(mid, lo, hi)? else {
                return Ok(None);
            };
            if !self.index(probe)? {
                return Ok(None);
            }
            match cmp.compare(self.bytes().expect("index() just returned true")) {
                Ordering::Equal => return Ok(Some(probe)),
                Ordering::Less => lo = probe + 1,
                Ordering::Greater => {
                    if probe == lo {
                        return Ok(None);
                    }
                    hi = probe - 1;
                }
            }
        }
        Ok(None)
    }

    /// Finds the contiguous `[start, end]` run of sequence numbers within `[lo, hi]` for which
    /// `cmp` returns [`Ordering::Equal`], or `None` if no record in range matches.
    pub fn find_range(
        &mut self,
        lo: u64,
        hi: u64,
        cmp: &dyn Comparator,
    ) -> Result<Option<(u64, u64)>> {
        let Some(anchor) = self.find_match(lo, hi, cmp)? else {
            return Ok(None);
        };

        let mut start = anchor;
        while start > lo {
            let candidate = start - 1;
            if !self.index(candidate)? || cmp.compare(self.bytes().unwrap()) != Ordering::Equal {
                break;
            }
            start = candidate;
        }

        let mut end = anchor;
        while end < hi {
            let candidate = end + 1;
            if !self.index(candidate)? || cmp.compare(self.bytes().unwrap()) != Ordering::Equal {
                break;
            }
            end = candidate;
        }

        Ok(Some((start, end)))
    }

    /// Returns `seq` if it names a record; otherwise tries `seq + 1` then `seq - 1` within
    /// `[lo, hi]`, to step past an isolated padding slot encountered mid-search.
    fn nearest_record(&mut self, seq: u64, lo: u64, hi: u64) -> Result<Option<u64>> {
        if self.index(seq)? {
            return Ok(Some(seq));
        }
        if seq < hi && self.index(seq + 1)? {
            return Ok(Some(seq + 1));
        }
        if seq > lo && self.index(seq - 1)? {
            return Ok(Some(seq - 1));
        }
        Ok(None)
    }
}

/// User-supplied ordering of a target value against a record's bytes, used by
/// [`Excerpt::find_match`] and [`Excerpt::find_range`].
pub trait Comparator {
    fn compare(&self, record: &[u8]) -> Ordering;
}
