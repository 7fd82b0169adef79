//! Core domain logic for versioned document sections.
//! This crate is the single source of truth for section/version invariants.

pub mod access;
pub mod clock;
pub mod config;
pub mod db;
pub mod labels;
pub mod logging;
pub mod model;
pub mod notify;
pub mod repo;
pub mod service;

pub use access::{AccessGate, AllowAll};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::StoreConfig;
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::event::{ChangeAction, ChangeEvent};
pub use model::section::{
    ActorId, InvalidKind, OwnerId, Section, SectionId, SectionKind, Version, VersionId,
};
pub use notify::{ChangeNotifier, LogNotifier, MemoryNotifier, NoopNotifier, NotifyError};
pub use repo::section_repo::{
    RepoError, RepoResult, RestoreCommand, RestoreOutcome, SaveCommand, SaveOutcome,
    SectionRepository, SqliteSectionRepository,
};
pub use service::section_locks::SectionLocks;
pub use service::section_service::{
    RestoreRequest, RestoreResult, SaveRequest, SaveResult, SectionHistory, SectionService,
    SectionServiceError,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
