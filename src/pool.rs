//! Collaborator traits for rolling multiple stores into time-based cycles.
//!
//! This crate implements a single store; composing stores into daily/hourly cycles, deciding file
//! naming, and evicting idle stores is left to a caller-supplied [`StorePool`]. No concrete pool
//! is provided here: retention policy is a trait seam, not something baked into the store itself.

use std::sync::Arc;

use crate::store::LogStore;

/// Direction to roll when looking for the next cycle relative to a reference one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollDirection {
    Forward,
    Backward,
}

/// Manages the set of per-cycle stores backing a rolling log. Implementations decide how a cycle
/// number maps to a file path, and when idle stores get closed.
pub trait StorePool {
    /// Returns the store for `cycle`, creating its backing files if `create_if_absent` is set and
    /// none exist yet. Returns `None` if the cycle doesn't exist and `create_if_absent` is false.
    fn acquire(&self, cycle: i64, create_if_absent: bool) -> Option<Arc<LogStore>>;

    /// Signals that the caller is done with a store obtained from [`StorePool::acquire`]. Pools
    /// that reference-count stores use this to know when a store may be closed.
    fn release(&self, store: &Arc<LogStore>);

    /// Returns the next cycle number that has a store, searching from `current` in `direction`,
    /// or `None` if there isn't one.
    fn next_cycle(&self, current: i64, direction: RollDirection) -> Option<i64>;

    /// Returns every cycle number with a store in `[lo, hi]`, ascending.
    fn cycles(&self, lo: i64, hi: i64) -> Vec<i64>;
}

/// Notified as a pool acquires and releases stores, e.g. to maintain external bookkeeping about
/// which cycle files are currently open.
pub trait StoreFileListener {
    fn on_acquired(&self, cycle: i64);
    fn on_released(&self, cycle: i64);
}
