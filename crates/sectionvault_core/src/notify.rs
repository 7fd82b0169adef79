//! Post-commit change notification seam.
//!
//! # Responsibility
//! - Define the sink contract that receives one `ChangeEvent` per
//!   content-changing mutation.
//! - Provide small built-in sinks for logging and tests.
//!
//! # Invariants
//! - Notifiers run after the mutation committed; their failures never undo it.

use crate::model::event::ChangeEvent;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Mutex;

/// Delivery failure reported by a notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyError(pub String);

impl Display for NotifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "change notification failed: {}", self.0)
    }
}

impl Error for NotifyError {}

/// Sink for change events. Delivery semantics belong to the implementor.
pub trait ChangeNotifier: Send + Sync {
    fn notify(&self, event: &ChangeEvent) -> Result<(), NotifyError>;
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ChangeNotifier for NoopNotifier {
    fn notify(&self, _event: &ChangeEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Writes each event as a metadata-only log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl ChangeNotifier for LogNotifier {
    fn notify(&self, event: &ChangeEvent) -> Result<(), NotifyError> {
        info!(
            "event=section_change module=notify status=ok action={:?} kind={} owner_id={} section_id={} actor_id={} version_number={} timestamp={}",
            event.action,
            event.kind,
            event.owner_id,
            event.section_id,
            event.actor_id,
            event.version_number,
            event.timestamp
        );
        Ok(())
    }
}

/// Collects events in delivery order.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<ChangeEvent>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every event received so far.
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChangeNotifier for MemoryNotifier {
    fn notify(&self, event: &ChangeEvent) -> Result<(), NotifyError> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
        Ok(())
    }
}
