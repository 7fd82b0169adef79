//! Change notification value handed to the external notifier.
//!
//! `ChangeEvent` is built after a content-changing mutation commits and is
//! never persisted or read back by the store.

use crate::model::section::{ActorId, OwnerId, SectionId, SectionKind};
use serde::{Deserialize, Serialize};

/// What kind of mutation produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// Content written through `save`, including section creation.
    SectionUpdated,
    /// Content copied back from an archived version.
    SectionRestored,
}

/// One content-changing mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub action: ChangeAction,
    pub kind: SectionKind,
    pub owner_id: OwnerId,
    pub section_id: SectionId,
    pub actor_id: ActorId,
    /// Archive number written by this mutation; orders events per section.
    pub version_number: u32,
    /// Human-readable one-liner for activity feeds.
    pub summary: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}
