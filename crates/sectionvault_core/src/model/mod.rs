//! Domain model for versioned document sections.
//!
//! # Responsibility
//! - Define the current-value record (`Section`) and its archive rows (`Version`).
//! - Define the closed set of section kinds and the change notification value.
//!
//! # Invariants
//! - At most one `Section` exists per `(owner_id, kind)`.
//! - `Version` rows are immutable and numbered `1..N` per section.

pub mod event;
pub mod section;
