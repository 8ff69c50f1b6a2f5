//! Pure index-geometry math: mapping a sequence number to `(block, line, slot)` and back.
//!
//! Kept as free functions over [`Config`] rather than methods on the cursor types, since none of
//! the three cursor types own this math any more than the others do.

use crate::config::Config;

/// Resolved location of an index slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotAddr {
    pub block: u64,
    pub line: u64,
    pub slot: u64,
}

impl SlotAddr {
    /// Byte offset of this slot within its index block.
    pub fn slot_offset(&self, config: &Config) -> u64 {
        self.line * config.cache_line_size + 8 + self.slot * 4
    }

}

/// Computes `(block, line, slot)` for a given sequence number under `config`.
pub(crate) fn locate(seq: u64, config: &Config) -> SlotAddr {
    let epl = config.entries_per_line();
    let epb = config.entries_per_block();
    let block = seq / epb;
    let r = seq % epb;
    let line = r / epl;
    let slot = r % epl;
    SlotAddr { block, line, slot }
}

/// Byte offset, within an index block, of a line's 8-byte base-data-offset field.
pub(crate) fn line_base_offset(line: u64, config: &Config) -> u64 {
    line * config.cache_line_size
}

/// Number of lines per index block.
pub(crate) fn lines_per_block(config: &Config) -> u64 {
    config.index_block_size / config.cache_line_size
}
