//! Per-section in-process mutexes.
//!
//! # Responsibility
//! - Serialize mutations of one `(owner_id, kind)` within this process from
//!   transaction start until its change event has been delivered.
//!
//! # Invariants
//! - Two different sections never share a mutex.
//! - Clones share the same table; services that must order events for the
//!   same sections need clones of one `SectionLocks`.

use crate::model::section::{OwnerId, SectionKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

type SlotMap = HashMap<(OwnerId, SectionKind), Arc<Mutex<()>>>;

/// Lock table keyed by section identity.
#[derive(Debug, Clone, Default)]
pub struct SectionLocks {
    slots: Arc<Mutex<SlotMap>>,
}

impl SectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex for one section, creating it on first use.
    pub fn slot(&self, owner_id: OwnerId, kind: SectionKind) -> Arc<Mutex<()>> {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slots.len() >= PRUNE_THRESHOLD {
            // Only the table itself holds idle slots.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        }
        Arc::clone(slots.entry((owner_id, kind)).or_default())
    }

    /// Number of slots currently tracked.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Locks a slot, recovering from poisoning: the guarded unit carries no data.
pub fn lock_slot(slot: &Mutex<()>) -> MutexGuard<'_, ()> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
