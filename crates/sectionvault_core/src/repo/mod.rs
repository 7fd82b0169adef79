//! Repository layer contracts and SQLite persistence implementations.
//!
//! # Responsibility
//! - Define the section/version data access contract.
//! - Keep SQL and transaction boundaries out of the service layer.
//!
//! # Invariants
//! - Every content-changing write is one explicit transaction.
//! - Repository APIs return semantic errors (`VersionNotFound`,
//!   `SectionMismatch`, `Conflict`) in addition to DB transport errors.

pub mod section_repo;
