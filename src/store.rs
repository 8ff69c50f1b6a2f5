//! The owner of a log's two backing files and its cached recovery state.
//!
//! A small struct owning the durable state shared by readers and writers, loaded once at open
//! time (`recover_last_index`), and handed out to cursors as an `Arc` so they can outlive the call
//! that created them.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use tracing::{debug, warn};

use crate::{
    appender::Appender,
    block_map::BlockMap,
    config::Config,
    error::{self, Result},
    excerpt::Excerpt,
    layout, raw,
    tailer::Tailer,
};

/// Owns the `.index` and `.data` files backing one log, plus the config used to interpret them.
pub struct LogStore {
    pub(crate) config: Config,
    pub(crate) index_map: BlockMap,
    pub(crate) data_map: BlockMap,
    last_written_index: AtomicI64,
    base_path: PathBuf,
}

impl LogStore {
    /// Opens (creating if absent) the store rooted at `base_path`, i.e. `<base_path>.index` and
    /// `<base_path>.data`, and recovers `last_written_index` from their contents.
    pub fn open(base_path: impl AsRef<Path>, config: Config) -> Result<Arc<Self>> {
        let base_path = base_path.as_ref().to_path_buf();
        if let Some(parent) = base_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context_io(parent)?;
            }
        }

        let index_path = index_file_path(&base_path);
        let data_path = data_file_path(&base_path);

        let index_map = BlockMap::open(&index_path, config.index_block_size)?;
        let data_map = BlockMap::open(&data_path, config.data_block_size)?;

        let last_written_index = recover_last_index(&index_map, &config)?;
        debug!(last_written_index, "recovered store state");

        Ok(Arc::new(Self {
            config,
            index_map,
            data_map,
            last_written_index: AtomicI64::new(last_written_index),
            base_path,
        }))
    }

    /// The largest sequence number whose index slot is committed (non-zero), or `-1` if empty.
    pub fn last_written_index(&self) -> i64 {
        self.last_written_index.load(Ordering::Acquire)
    }

    /// Number of committed sequence numbers (`last_written_index() + 1`, floored at zero).
    pub fn size(&self) -> u64 {
        let last = self.last_written_index();
        if last < 0 {
            0
        } else {
            (last + 1) as u64
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub(crate) fn bump_last_written_index(&self, seq: i64) {
        self.last_written_index.fetch_max(seq, Ordering::AcqRel);
    }

    /// Creates the single writer cursor for this store. The caller is responsible for ensuring
    /// only one `Appender` is used at a time; the core detects, but does not prevent, violations.
    pub fn create_appender(self: &Arc<Self>) -> Result<Appender> {
        Appender::new(Arc::clone(self))
    }

    /// Creates a sequential reader starting from sequence `0`.
    pub fn create_tailer(self: &Arc<Self>) -> Result<Tailer> {
        Tailer::new(Arc::clone(self))
    }

    /// Creates a random-access reader.
    pub fn create_excerpt(self: &Arc<Self>) -> Result<Excerpt> {
        Excerpt::new(Arc::clone(self))
    }

    /// Closes both backing block maps.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InUse`] if any block is still pinned by a live cursor.
    pub fn close(&self) -> Result<()> {
        self.index_map.close()?;
        self.data_map.close()?;
        Ok(())
    }

    /// Deletes both backing files. The store must already be closed.
    pub fn clear(&self) -> Result<()> {
        for path in [index_file_path(&self.base_path), data_file_path(&self.base_path)] {
            if path.exists() {
                fs::remove_file(&path).context_io(&path)?;
            }
        }
        self.last_written_index.store(-1, Ordering::Release);
        Ok(())
    }
}

pub(crate) fn index_file_path(base: &Path) -> PathBuf {
    with_extension(base, "index")
}

pub(crate) fn data_file_path(base: &Path) -> PathBuf {
    with_extension(base, "data")
}

fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = base
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(ext);
    match base.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}

/// Runs the recovery algorithm described in the data model: scans index blocks from the end
/// backwards to find the last committed slot.
fn recover_last_index(index_map: &BlockMap, config: &Config) -> Result<i64> {
    let size = index_map.size()?;
    if size == 0 {
        return Ok(-1);
    }

    let ib = config.index_block_size;
    let epl = config.entries_per_line();
    let epb = config.entries_per_block();
    let lines_per_block = layout::lines_per_block(config);

    let num_blocks = size / ib;
    if num_blocks == 0 {
        return Ok(-1);
    }

    let mut b = num_blocks - 1;
    loop {
        let block = index_map.acquire(b)?;
        let ptr = block.as_ptr() as *const u8;

        // SAFETY: `ptr` covers `ib` bytes for this block; offset 0 is always 8-byte aligned.
        let first_line_base = unsafe { raw::load_i64_plain(ptr, 0) };
        if first_line_base == 0 && b > 0 {
            warn!(block = b, "index block never used, skipping to previous");
            b -= 1;
            continue;
        }

        match last_active_line(ptr, config, lines_per_block) {
            None => {
                if b == 0 {
                    return Ok(-1);
                }
                b -= 1;
                continue;
            }
            Some(line) => {
                if let Some(k) = last_nonzero_slot(ptr, config, line, epl) {
                    let seq = b * epb + line * epl + k;
                    return Ok(seq as i64);
                }
                if line > 0 {
                    if let Some(k) = last_nonzero_slot(ptr, config, line - 1, epl) {
                        let seq = b * epb + (line - 1) * epl + k;
                        return Ok(seq as i64);
                    }
                }
                if b == 0 {
                    return Ok(-1);
                }
                b -= 1;
            }
        }
    }
}

/// Finds the last "active" line in a block: the line whose next line's base is still zero, or
/// the final line in the block. Returns `None` if no line is active at all.
fn last_active_line(ptr: *const u8, config: &Config, lines_per_block: u64) -> Option<u64> {
    for line in 0..lines_per_block {
        let pos = layout::line_base_offset(line, config);
        // SAFETY: `pos` is within the block and 8-byte aligned (a multiple of `cache_line_size`).
        let base = unsafe { raw::load_i64_plain(ptr, pos) };
        let active = base != 0 || line == 0;
        if !active {
            return None;
        }
        let is_last = if line + 1 >= lines_per_block {
            true
        } else {
            let next_pos = layout::line_base_offset(line + 1, config);
            let next_base = unsafe { raw::load_i64_plain(ptr, next_pos) };
            next_base == 0
        };
        if is_last {
            return Some(line);
        }
    }
    None
}

/// Scans a line's slots left to right and returns the (0-based) index of the last non-zero slot.
fn last_nonzero_slot(ptr: *const u8, config: &Config, line: u64, epl: u64) -> Option<u64> {
    let pos = layout::line_base_offset(line, config);
    let mut last = None;
    for slot in 0..epl {
        let off = pos + 8 + slot * 4;
        // SAFETY: `off` is within the block and 4-byte aligned.
        let v = unsafe { raw::load_i32_plain(ptr, off) };
        if v == 0 {
            break;
        }
        last = Some(slot);
    }
    last
}

trait IoContext<T> {
    fn context_io(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn context_io(self, path: &Path) -> Result<T> {
        use snafu::ResultExt;
        self.context(error::IoSnafu { path: path.to_path_buf() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;

    fn spec_config() -> Config {
        ConfigBuilder::new()
            .data_block_size(4096)
            .index_block_size(4096)
            .cache_line_size(64)
            .build()
            .unwrap()
    }

    #[test]
    fn fresh_store_reports_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::open(dir.path().join("log"), spec_config()).unwrap();
        assert_eq!(store.last_written_index(), -1);
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn file_paths_use_base_name() {
        let base = Path::new("/tmp/foo/bar");
        assert_eq!(index_file_path(base), Path::new("/tmp/foo/bar.index"));
        assert_eq!(data_file_path(base), Path::new("/tmp/foo/bar.data"));
    }

    /// Zeroing a committed slot's index bytes (simulating a crash that flushed the data write but
    /// not the index publish) must recover to the slot before it, and a subsequent append must
    /// reuse the data offset the zeroed slot would have started at, rather than leaving a gap.
    #[test]
    fn crash_recovery_discards_a_corrupted_tail_slot() {
        use std::io::{Seek, SeekFrom, Write};

        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("log");
        {
            let store = LogStore::open(&base, spec_config()).unwrap();
            let mut appender = store.create_appender().unwrap();
            for payload in [[1u8; 10], [2u8; 10], [3u8; 10]] {
                let mut write = appender.start_excerpt(10).unwrap();
                write.bytes_mut().copy_from_slice(&payload);
                write.finish(10).unwrap();
            }
            drop(appender);
            store.close().unwrap();
        }

        // Slot for seq 2 is line 0, slot 2: byte offset 8 + 2 * 4 = 16 into the first index block.
        {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .open(index_file_path(&base))
                .unwrap();
            file.seek(SeekFrom::Start(16)).unwrap();
            file.write_all(&[0u8; 4]).unwrap();
        }

        let store = LogStore::open(&base, spec_config()).unwrap();
        assert_eq!(store.last_written_index(), 1);
        assert_eq!(store.size(), 2);

        let mut appender = store.create_appender().unwrap();
        assert_eq!(appender.next_sequence(), 2);
        let mut write = appender.start_excerpt(10).unwrap();
        write.bytes_mut().copy_from_slice(&[9u8; 10]);
        let seq = write.finish(10).unwrap();
        assert_eq!(seq, 2);
        drop(appender);
        store.close().unwrap();

        let data = std::fs::read(data_file_path(&base)).unwrap();
        assert_eq!(
            &data[20..30],
            &[9u8; 10],
            "recovered append must reuse the original data offset 20"
        );
    }
}
