//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository transactions into the save/restore/history
//!   use cases.
//! - Own the cross-cutting concerns around them: access gate, conflict
//!   retries, per-section ordering and post-commit notification.

pub mod section_locks;
pub mod section_service;
