//! Lazy block-indexed memory mapping over a single backing file.
//!
//! `parking_lot::Mutex` guards the shared block-cache bookkeeping; the mapped bytes themselves
//! stay accessible without locking once a block is acquired. Each [`Block`] covers exactly one
//! fixed-size window, acquired lazily and extended on demand -- the file grows one block at a time
//! as the appender advances, rather than being pre-sized up front.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use memmap2::MmapOptions;
use parking_lot::Mutex;
use snafu::ResultExt;
use tracing::trace;

use crate::error::{self, Error, Result};

struct MappedBlock {
    mmap: memmap2::MmapMut,
    ptr: *mut u8,
    len: usize,
    pinned: AtomicUsize,
    path: PathBuf,
}

// SAFETY: the mapped region is only ever accessed through the ordered atomic loads/stores that
// `Appender`/`Tailer`/`Excerpt` perform on specific byte offsets; `MappedBlock` itself does not
// assume any particular access pattern.
unsafe impl Send for MappedBlock {}
unsafe impl Sync for MappedBlock {}

/// A pinned reference to one block's mapped bytes.
///
/// The block stays mapped, and its address stays stable, for as long as any `Block` handle for it
/// is alive. Dropping the last handle releases the pin; the block may then be unmapped by the
/// owning [`BlockMap`].
pub struct Block {
    inner: Arc<MappedBlock>,
}

impl Block {
    /// Raw pointer to the start of this block's mapped window.
    ///
    /// # Safety
    ///
    /// Callers must only dereference offsets within `[0, len())` and must honor the release/
    /// acquire ordering contract documented on [`crate::Appender`] and [`crate::Tailer`] when
    /// reading or writing through this pointer.
    pub fn as_ptr(&self) -> *mut u8 {
        self.inner.ptr
    }

    /// Length, in bytes, of this block's mapped window.
    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Returns an immutable view of the full block as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr`/`len` describe the live mmap for the lifetime of `inner`.
        unsafe { std::slice::from_raw_parts(self.inner.ptr, self.inner.len) }
    }

    /// Flushes this block's mapped bytes to disk.
    pub fn flush(&self) -> Result<()> {
        self.inner
            .mmap
            .flush()
            .context(error::IoSnafu { path: self.inner.path.clone() })
    }

    /// Explicit release, for parity with the source API. Equivalent to dropping the handle.
    pub fn release(self) {
        drop(self);
    }
}

impl Clone for Block {
    fn clone(&self) -> Self {
        self.inner.pinned.fetch_add(1, Ordering::AcqRel);
        Block {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        self.inner.pinned.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Lazily maps fixed-size blocks of a single backing file.
pub struct BlockMap {
    path: PathBuf,
    file: File,
    block_size: u64,
    blocks: Mutex<HashMap<u64, Arc<MappedBlock>>>,
    closed: AtomicBool,
}

impl BlockMap {
    /// Opens (creating if absent) the file at `path` for block-wise read/write mapping.
    pub fn open(path: impl AsRef<Path>, block_size: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .context(error::IoSnafu { path: path.clone() })?;

        Ok(Self {
            path,
            file,
            block_size,
            blocks: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Size, in bytes, of the backing file.
    pub fn size(&self) -> Result<u64> {
        self.ensure_open()?;
        self.file
            .metadata()
            .map(|m| m.len())
            .context(error::IoSnafu { path: self.path.clone() })
    }

    /// Acquires a pinned reference to `block_idx`, extending and mapping the file if needed.
    pub fn acquire(&self, block_idx: u64) -> Result<Block> {
        self.ensure_open()?;

        let mut blocks = self.blocks.lock();
        if let Some(existing) = blocks.get(&block_idx) {
            existing.pinned.fetch_add(1, Ordering::AcqRel);
            return Ok(Block {
                inner: Arc::clone(existing),
            });
        }

        let required_len = (block_idx + 1) * self.block_size;
        let current_len = self
            .file
            .metadata()
            .context(error::IoSnafu { path: self.path.clone() })?
            .len();
        if current_len < required_len {
            self.file
                .set_len(required_len)
                .context(error::IoSnafu { path: self.path.clone() })?;
        }

        // SAFETY: the file is owned by this `BlockMap` and kept open for the mapping's lifetime;
        // no other process is expected to truncate it concurrently (single-writer discipline).
        let mut mmap = unsafe {
            MmapOptions::new()
                .offset(block_idx * self.block_size)
                .len(self.block_size as usize)
                .map_mut(&self.file)
        }
        .context(error::IoSnafu { path: self.path.clone() })?;
        let ptr = mmap.as_mut_ptr();
        let len = mmap.len();

        trace!(block_idx, block_size = self.block_size, "mapped block");

        let mapped = Arc::new(MappedBlock {
            mmap,
            ptr,
            len,
            pinned: AtomicUsize::new(1),
            path: self.path.clone(),
        });
        blocks.insert(block_idx, Arc::clone(&mapped));

        Ok(Block { inner: mapped })
    }

    /// Closes the block map, unmapping every block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InUse`] if any block is still pinned by a live [`Block`] handle.
    pub fn close(&self) -> Result<()> {
        let mut blocks = self.blocks.lock();
        let pinned: usize = blocks
            .values()
            .map(|b| b.pinned.load(Ordering::Acquire))
            .sum();
        if pinned > 0 {
            return error::InUseSnafu { count: pinned }.fail();
        }
        blocks.clear();
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return error::ClosedSnafu.fail();
        }
        Ok(())
    }
}
