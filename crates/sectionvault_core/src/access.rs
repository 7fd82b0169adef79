//! Access-control seam.
//!
//! The real gate lives in the embedding application. The store asks it once
//! per save or restore, before touching storage, and otherwise trusts
//! `actor_id` as given. Reads are not gated.

use crate::model::section::{ActorId, OwnerId};

/// Decides whether `actor_id` may write sections of `owner_id`.
pub trait AccessGate: Send + Sync {
    fn is_authorized(&self, actor_id: ActorId, owner_id: OwnerId) -> bool;
}

/// Gate for callers that already ran their own authorization.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessGate for AllowAll {
    fn is_authorized(&self, _actor_id: ActorId, _owner_id: OwnerId) -> bool {
        true
    }
}
