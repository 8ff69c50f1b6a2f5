//! Store configuration.
//!
//! A builder with `Option<T>` fields that fall back to module-level defaults, validated once in
//! `build()`.

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Default size of a data block: 64 MiB.
pub const DEFAULT_DATA_BLOCK_SIZE: u64 = 64 * 1024 * 1024;

/// Default size of an index block: 16 MiB.
pub const DEFAULT_INDEX_BLOCK_SIZE: u64 = 16 * 1024 * 1024;

/// Default size of a cache line within an index block.
pub const DEFAULT_CACHE_LINE_SIZE: u64 = 64;

/// Default capacity handed to `start_excerpt` when the caller does not specify one.
pub const DEFAULT_MESSAGE_CAPACITY: usize = 128 * 1024;

const MIN_BLOCK_SIZE: u64 = 4 * 1024;
const MIN_CACHE_LINE_SIZE: u64 = 16;

/// Error returned when a [`ConfigBuilder`] is given an invalid combination of parameters.
#[derive(Debug, Snafu)]
pub enum BuildError {
    #[snafu(display("parameter '{}' was invalid: {}", param_name, reason))]
    InvalidParameter {
        param_name: &'static str,
        reason: String,
    },
}

/// Resolved, validated configuration for a [`crate::LogStore`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Size, in bytes, of a data block. Must be a power of two.
    pub data_block_size: u64,

    /// Size, in bytes, of an index block. Must be a power of two and a multiple of
    /// `cache_line_size`.
    pub index_block_size: u64,

    /// Size, in bytes, of a single index cache line. Must divide `index_block_size` and be at
    /// least 16 bytes (8 for the line base plus room for at least two slots).
    pub cache_line_size: u64,

    /// Default capacity used by `start_excerpt` when no explicit capacity is given.
    pub message_capacity: usize,

    /// When set, `finish()` flushes the data block then the index block to disk before
    /// returning, trading latency for a tighter durability window.
    pub synchronous_mode: bool,
}

impl Config {
    /// Entries per index line: `(cache_line_size - 8) / 4`.
    pub(crate) fn entries_per_line(&self) -> u64 {
        (self.cache_line_size - 8) / 4
    }

    /// Entries per index block: `index_block_size / cache_line_size * entries_per_line`.
    pub(crate) fn entries_per_block(&self) -> u64 {
        self.index_block_size / self.cache_line_size * self.entries_per_line()
    }
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::new()
            .build()
            .expect("default configuration must be valid")
    }
}

/// Builder for [`Config`].
#[derive(Clone, Debug, Default)]
pub struct ConfigBuilder {
    data_block_size: Option<u64>,
    index_block_size: Option<u64>,
    cache_line_size: Option<u64>,
    message_capacity: Option<usize>,
    synchronous_mode: Option<bool>,
}

impl ConfigBuilder {
    /// Creates a new builder with no overrides set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the data block size. Must be a power of two, at least 4 KiB.
    pub fn data_block_size(mut self, size: u64) -> Self {
        self.data_block_size = Some(size);
        self
    }

    /// Overrides the index block size. Must be a power of two, at least 4 KiB.
    pub fn index_block_size(mut self, size: u64) -> Self {
        self.index_block_size = Some(size);
        self
    }

    /// Overrides the cache line size. Must divide the index block size and be at least 16 bytes.
    pub fn cache_line_size(mut self, size: u64) -> Self {
        self.cache_line_size = Some(size);
        self
    }

    /// Overrides the default capacity used by `start_excerpt` when none is given.
    pub fn message_capacity(mut self, capacity: usize) -> Self {
        self.message_capacity = Some(capacity);
        self
    }

    /// Enables or disables synchronous (`msync`-on-finish) durability.
    pub fn synchronous_mode(mut self, enabled: bool) -> Self {
        self.synchronous_mode = Some(enabled);
        self
    }

    /// Validates the accumulated overrides and produces a [`Config`].
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidParameter`] if a size is not a power of two, is smaller than
    /// the minimum allowed, or if `cache_line_size` does not evenly divide `index_block_size`.
    pub fn build(self) -> Result<Config, BuildError> {
        let data_block_size = self.data_block_size.unwrap_or(DEFAULT_DATA_BLOCK_SIZE);
        let index_block_size = self.index_block_size.unwrap_or(DEFAULT_INDEX_BLOCK_SIZE);
        let cache_line_size = self.cache_line_size.unwrap_or(DEFAULT_CACHE_LINE_SIZE);

        require_power_of_two("data_block_size", data_block_size, MIN_BLOCK_SIZE)?;
        require_power_of_two("index_block_size", index_block_size, MIN_BLOCK_SIZE)?;

        if cache_line_size < MIN_CACHE_LINE_SIZE {
            return InvalidParameterSnafu {
                param_name: "cache_line_size",
                reason: format!("must be at least {MIN_CACHE_LINE_SIZE} bytes"),
            }
            .fail();
        }

        if index_block_size % cache_line_size != 0 {
            return InvalidParameterSnafu {
                param_name: "cache_line_size",
                reason: "must evenly divide index_block_size".to_string(),
            }
            .fail();
        }

        Ok(Config {
            data_block_size,
            index_block_size,
            cache_line_size,
            message_capacity: self.message_capacity.unwrap_or(DEFAULT_MESSAGE_CAPACITY),
            synchronous_mode: self.synchronous_mode.unwrap_or(false),
        })
    }
}

fn require_power_of_two(param_name: &'static str, value: u64, min: u64) -> Result<(), BuildError> {
    if value < min {
        return InvalidParameterSnafu {
            param_name,
            reason: format!("must be at least {min} bytes"),
        }
        .fail();
    }
    if !value.is_power_of_two() {
        return InvalidParameterSnafu {
            param_name,
            reason: "must be a power of two".to_string(),
        }
        .fail();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.data_block_size, DEFAULT_DATA_BLOCK_SIZE);
        assert_eq!(config.entries_per_line(), (DEFAULT_CACHE_LINE_SIZE - 8) / 4);
    }

    #[test]
    fn rejects_non_power_of_two() {
        let err = ConfigBuilder::new()
            .data_block_size(4097)
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidParameter { .. }));
    }

    #[test]
    fn rejects_cache_line_not_dividing_index_block() {
        let err = ConfigBuilder::new()
            .index_block_size(4096)
            .cache_line_size(100)
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidParameter { .. }));
    }

    #[test]
    fn entries_per_block_matches_spec_example() {
        let config = ConfigBuilder::new()
            .data_block_size(4096)
            .index_block_size(4096)
            .cache_line_size(64)
            .build()
            .unwrap();
        assert_eq!(config.entries_per_line(), 14);
        assert_eq!(config.entries_per_block(), 896);
    }
}
