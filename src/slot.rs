//! Interpreting a single index slot: resolving its line base and deciding whether it describes a
//! committed record, a padding entry, or is not yet written.
//!
//! Shared between [`crate::Excerpt`] (random lookups) and [`crate::Appender`] (repositioning to
//! the end of the log on construction); [`crate::Tailer`] has its own inline version because it
//! also needs to advance its own incremental state as it goes, rather than resolving a slot in
//! isolation.

use std::path::Path;

use crate::{
    config::Config,
    error::{self, Result},
    layout::{self, SlotAddr},
    raw,
};

pub(crate) enum Resolved {
    /// A committed, readable record.
    Record { start: i64, end: i64 },
    /// A padding entry of the given length; carries no payload.
    Padding { length: i64 },
    /// Not yet written.
    Empty,
}

/// Reads the line base and the previous slot (if needed) to determine where the record at
/// `addr.slot` starts, given the line's base offset.
///
/// # Safety
///
/// `ptr` must point at a fully-mapped index block containing `addr`'s line.
unsafe fn record_start(
    ptr: *const u8,
    line_base_off: u64,
    line_base: i64,
    slot: u64,
    path: &Path,
) -> Result<i64> {
    if slot == 0 {
        return Ok(line_base);
    }
    let prev_off = line_base_off + 8 + (slot - 1) * 4;
    let prev = raw::load_i32_acquire_with_retry(ptr, prev_off);
    if prev <= 0 {
        return error::CorruptSnafu {
            path: path.to_path_buf(),
            reason: "previous slot in line is padding or unwritten".to_string(),
        }
        .fail();
    }
    Ok(line_base + i64::from(prev))
}

/// Resolves what `addr`'s slot describes.
///
/// # Safety
///
/// `ptr` must point at a fully-mapped index block containing `addr`'s line.
pub(crate) unsafe fn resolve(
    ptr: *const u8,
    config: &Config,
    addr: SlotAddr,
    path: &Path,
) -> Result<Resolved> {
    let line_base_off = layout::line_base_offset(addr.line, config);
    let line_base = raw::load_i64_acquire(ptr, line_base_off);
    let slot_off = addr.slot_offset(config);
    let value = raw::load_i32_acquire_with_retry(ptr, slot_off);

    if value == 0 {
        return Ok(Resolved::Empty);
    }
    if value < 0 {
        return Ok(Resolved::Padding {
            length: i64::from(-value),
        });
    }

    let start = record_start(ptr, line_base_off, line_base, addr.slot, path)?;
    Ok(Resolved::Record {
        start,
        end: line_base + i64::from(value),
    })
}

/// Resolves just the start of whatever is at `addr`, whether it is a record or padding. Used when
/// repositioning to the end of the log after a trailing padding entry.
///
/// # Safety
///
/// `ptr` must point at a fully-mapped index block containing `addr`'s line.
pub(crate) unsafe fn slot_start(
    ptr: *const u8,
    config: &Config,
    addr: SlotAddr,
    path: &Path,
) -> Result<i64> {
    let line_base_off = layout::line_base_offset(addr.line, config);
    let line_base = raw::load_i64_acquire(ptr, line_base_off);
    record_start(ptr, line_base_off, line_base, addr.slot, path)
}

/// Rounds `value` up to the next multiple of `block_size`.
pub(crate) fn round_up_to_block(value: i64, block_size: u64) -> i64 {
    let block_size = block_size as i64;
    ((value + block_size - 1) / block_size) * block_size
}
