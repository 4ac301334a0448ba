//! Watch Set
//!
//! Bus-supplied descriptors the run loop has to include in its wait.
//! Records live in an arena indexed by `WatchId`; the transport's own handle
//! (`WatchKey`) is mapped to an arena slot through a side table, so nothing
//! owned by the bus library ever lands in core state.

use std::collections::BTreeMap;
use std::os::unix::io::RawFd;

use log::{debug, warn};

use crate::bus::WatchFlags;

/// Opaque watch identity handed out by the bus transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchKey(pub u64);

/// Arena slot plus generation, so a slot reused by a later watch never
/// matches an id captured before the removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchId {
    index: u32,
    generation: u32,
}

/// Core-side record derived from a watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchRecord {
    pub key: WatchKey,
    pub fd: RawFd,
    /// poll(2) event mask, fixed when the watch is added
    pub events: libc::c_short,
    pub enabled: bool,
}

struct Slot {
    generation: u32,
    record: Option<WatchRecord>,
}

/// Collection of live watches plus the "projection is stale" bookkeeping
pub struct WatchSet {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_key: BTreeMap<WatchKey, WatchId>,
    /// Any add/remove/toggle since the last rebuild
    dirty: bool,
    /// A removal since the last rebuild (forces an immediate rebuild)
    removed: bool,
}

impl WatchSet {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_key: BTreeMap::new(),
            dirty: true,
            removed: false,
        }
    }

    /// Transport asked for `fd` to be monitored for `flags`.
    ///
    /// Re-adding a live key replaces the old record.
    pub fn add(&mut self, key: WatchKey, fd: RawFd, flags: WatchFlags, enabled: bool) -> WatchId {
        if self.by_key.contains_key(&key) {
            warn!("watch {:?} added twice, replacing", key);
            self.remove(key);
        }

        let record = WatchRecord {
            key,
            fd,
            events: flags.to_poll_events(),
            enabled,
        };

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.record = Some(record);
                WatchId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    record: Some(record),
                });
                WatchId {
                    index,
                    generation: 0,
                }
            }
        };

        debug!("watch added: {:?} fd={} flags={:?} enabled={}", key, fd, flags, enabled);
        self.by_key.insert(key, id);
        self.dirty = true;
        id
    }

    /// Enabled state changed; descriptor and interest stay as added.
    pub fn toggle(&mut self, key: WatchKey, enabled: bool) {
        let Some(id) = self.by_key.get(&key).copied() else {
            warn!("toggle for unknown watch {:?}", key);
            return;
        };
        if let Some(record) = self.record_mut(id) {
            debug!("watch toggled: {:?} enabled={}", key, enabled);
            record.enabled = enabled;
            self.dirty = true;
        }
    }

    /// Transport no longer wants `key` monitored.
    pub fn remove(&mut self, key: WatchKey) {
        let Some(id) = self.by_key.remove(&key) else {
            return;
        };
        let slot = &mut self.slots[id.index as usize];
        slot.record = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        debug!("watch removed: {:?}", key);
        self.dirty = true;
        self.removed = true;
    }

    pub fn get(&self, id: WatchId) -> Option<&WatchRecord> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.record.as_ref()
    }

    fn record_mut(&mut self, id: WatchId) -> Option<&mut WatchRecord> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.record.as_mut()
    }

    pub fn id_of(&self, key: WatchKey) -> Option<WatchId> {
        self.by_key.get(&key).copied()
    }

    /// Enabled watches in key order
    pub fn enabled(&self) -> impl Iterator<Item = (WatchId, &WatchRecord)> + '_ {
        self.by_key.values().filter_map(move |&id| {
            let record = self.get(id)?;
            record.enabled.then_some((id, record))
        })
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn has_removals(&self) -> bool {
        self.removed
    }

    /// Called by the registry once it has rebuilt from the current set
    pub(super) fn mark_clean(&mut self) {
        self.dirty = false;
        self.removed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RW: WatchFlags = WatchFlags::READABLE.union(WatchFlags::WRITABLE);

    #[test]
    fn test_add_toggle_remove() {
        let mut set = WatchSet::new();
        set.mark_clean();

        let id = set.add(WatchKey(7), 11, WatchFlags::READABLE, true);
        assert!(set.is_dirty());
        assert_eq!(set.get(id).map(|r| r.fd), Some(11));
        assert_eq!(
            set.get(id).map(|r| r.events),
            Some(libc::POLLIN | libc::POLLHUP | libc::POLLERR)
        );

        set.mark_clean();
        set.toggle(WatchKey(7), false);
        assert!(set.is_dirty());
        assert!(!set.has_removals());
        assert_eq!(set.enabled().count(), 0);
        assert_eq!(set.len(), 1);

        set.mark_clean();
        set.remove(WatchKey(7));
        assert!(set.is_dirty());
        assert!(set.has_removals());
        assert!(set.get(id).is_none());
        assert!(set.is_empty());
    }

    #[test]
    fn test_reused_slot_rejects_stale_id() {
        let mut set = WatchSet::new();
        let old = set.add(WatchKey(1), 10, RW, true);
        set.remove(WatchKey(1));
        let new = set.add(WatchKey(2), 10, RW, true);

        assert_ne!(old, new);
        assert!(set.get(old).is_none());
        assert_eq!(set.get(new).map(|r| r.key), Some(WatchKey(2)));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let mut set = WatchSet::new();
        set.mark_clean();
        set.toggle(WatchKey(3), true);
        set.remove(WatchKey(3));
        assert!(!set.is_dirty());
    }

    #[test]
    fn test_enabled_in_key_order() {
        let mut set = WatchSet::new();
        set.add(WatchKey(9), 90, RW, true);
        set.add(WatchKey(2), 20, RW, true);
        set.add(WatchKey(5), 50, RW, false);
        let fds: Vec<RawFd> = set.enabled().map(|(_, r)| r.fd).collect();
        assert_eq!(fds, vec![20, 90]);
    }
}
