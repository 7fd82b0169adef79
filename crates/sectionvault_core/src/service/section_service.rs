//! Section use-case service: section store, restore engine and history reads.
//!
//! # Responsibility
//! - Gate every mutation through the external `AccessGate`.
//! - Run save/restore repository transactions with bounded conflict retries.
//! - Build one `ChangeEvent` per content-changing mutation and hand it to the
//!   notifier after commit.
//!
//! # Invariants
//! - Notifier failures are logged and never surface to the caller.
//! - Events for one section are delivered in commit order: the section's
//!   slot in `SectionLocks` is held from transaction start to delivery.
//! - Unchanged saves and already-current restores emit no event.

use crate::access::{AccessGate, AllowAll};
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::labels::{section_title, summarize_content};
use crate::model::event::{ChangeAction, ChangeEvent};
use crate::model::section::{
    ActorId, InvalidKind, OwnerId, Section, SectionKind, Version, VersionId,
};
use crate::notify::{ChangeNotifier, LogNotifier};
use crate::repo::section_repo::{
    RepoError, RepoResult, RestoreCommand, RestoreOutcome, SaveCommand, SaveOutcome,
    SectionRepository,
};
use crate::service::section_locks::{lock_slot, SectionLocks};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Errors from section service operations.
#[derive(Debug)]
pub enum SectionServiceError {
    /// The access gate refused the actor for this owner.
    NotAuthorized { actor_id: ActorId, owner_id: OwnerId },
    /// Kind key outside the closed enumeration.
    InvalidKind(String),
    /// No section exists for `(owner_id, kind)`.
    SectionNotFound { owner_id: OwnerId, kind: SectionKind },
    /// No archived version with this id.
    VersionNotFound(VersionId),
    /// The version belongs to a different section.
    SectionMismatch {
        version_id: VersionId,
        owner_id: OwnerId,
        kind: SectionKind,
    },
    /// Version-number race persisted through every retry.
    Conflict { attempts: u32 },
    /// The transaction was interrupted and rolled back.
    Cancelled,
    /// Persistence-layer failure; nothing was applied.
    Storage(RepoError),
}

impl SectionServiceError {
    /// Stable snake_case code for API envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAuthorized { .. } => "not_authorized",
            Self::InvalidKind(_) => "invalid_kind",
            Self::SectionNotFound { .. } => "section_not_found",
            Self::VersionNotFound(_) => "version_not_found",
            Self::SectionMismatch { .. } => "section_mismatch",
            Self::Conflict { .. } => "conflict",
            Self::Cancelled => "cancelled",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Whether the caller may retry the same call later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl Display for SectionServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAuthorized { actor_id, owner_id } => {
                write!(f, "actor {actor_id} is not authorized for owner {owner_id}")
            }
            Self::InvalidKind(value) => write!(f, "invalid section kind: `{value}`"),
            Self::SectionNotFound { owner_id, kind } => {
                write!(f, "section not found: owner {owner_id} kind {kind}")
            }
            Self::VersionNotFound(id) => write!(f, "section version not found: {id}"),
            Self::SectionMismatch {
                version_id,
                owner_id,
                kind,
            } => write!(
                f,
                "version {version_id} does not belong to section owner {owner_id} kind {kind}"
            ),
            Self::Conflict { attempts } => write!(
                f,
                "section write conflict persisted after {attempts} attempt(s)"
            ),
            Self::Cancelled => write!(f, "section operation cancelled"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SectionServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for SectionServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::VersionNotFound(id) => Self::VersionNotFound(id),
            RepoError::SectionMismatch {
                version_id,
                owner_id,
                kind,
            } => Self::SectionMismatch {
                version_id,
                owner_id,
                kind,
            },
            RepoError::Conflict(_) => Self::Conflict { attempts: 1 },
            RepoError::Interrupted => Self::Cancelled,
            other => Self::Storage(other),
        }
    }
}

impl From<InvalidKind> for SectionServiceError {
    fn from(value: InvalidKind) -> Self {
        Self::InvalidKind(value.0)
    }
}

/// Input for `SectionService::save`.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub owner_id: OwnerId,
    pub kind: SectionKind,
    pub content: String,
    /// Replaces stored metadata when `Some`; `None` keeps it.
    pub metadata: Option<serde_json::Value>,
    pub actor_id: ActorId,
}

/// Input for `SectionService::restore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreRequest {
    pub owner_id: OwnerId,
    pub kind: SectionKind,
    pub version_id: VersionId,
    pub actor_id: ActorId,
}

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveResult {
    /// Section state after the call.
    pub section: Section,
    /// Version written by this call: the baseline on creation, the
    /// superseded value on change, `None` when content was unchanged.
    pub archived: Option<Version>,
    /// Event handed to the notifier, if any.
    pub event: Option<ChangeEvent>,
}

impl SaveResult {
    pub fn changed(&self) -> bool {
        self.event.is_some()
    }
}

/// Result of a successful restore.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreResult {
    pub section: Section,
    /// Archive of the pre-restore content; `None` when already current.
    pub archived: Option<Version>,
    /// Version whose content is now current.
    pub restored_from: Version,
    pub event: Option<ChangeEvent>,
}

impl RestoreResult {
    pub fn changed(&self) -> bool {
        self.event.is_some()
    }
}

/// Current value plus full archive of one section.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionHistory {
    pub section: Section,
    pub current_content: String,
    /// Newest first.
    pub versions: Vec<Version>,
}

/// Section service facade over a repository implementation.
pub struct SectionService<R: SectionRepository> {
    repo: R,
    notifier: Arc<dyn ChangeNotifier>,
    gate: Arc<dyn AccessGate>,
    clock: Arc<dyn Clock>,
    locks: SectionLocks,
    max_conflict_retries: u32,
    retry_backoff: Duration,
}

impl<R: SectionRepository> SectionService<R> {
    /// Creates a service with default config, a logging notifier, an
    /// allow-all gate and the system clock.
    pub fn new(repo: R) -> Self {
        let config = StoreConfig::default();
        Self {
            repo,
            notifier: Arc::new(LogNotifier),
            gate: Arc::new(AllowAll),
            clock: Arc::new(SystemClock),
            locks: SectionLocks::new(),
            max_conflict_retries: config.max_conflict_retries,
            retry_backoff: config.retry_backoff,
        }
    }

    pub fn with_config(mut self, config: &StoreConfig) -> Self {
        self.max_conflict_retries = config.max_conflict_retries;
        self.retry_backoff = config.retry_backoff;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_gate(mut self, gate: Arc<dyn AccessGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Shares a lock table with other services in this process.
    pub fn with_locks(mut self, locks: SectionLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Writes new content for a section, creating it on first save.
    ///
    /// # Contract
    /// - First save: section and baseline version 1 (same content) are written.
    /// - Changed content: the previous content is archived as `max + 1`, then
    ///   replaced.
    /// - Equal content: no archive, no event; `updated_at`/metadata touched.
    pub fn save(&self, request: &SaveRequest) -> Result<SaveResult, SectionServiceError> {
        let started_at = Instant::now();
        let result = self.save_inner(request);
        match &result {
            Ok(saved) => info!(
                "event=section_save module=service status=ok kind={} owner_id={} changed={} version_number={} duration_ms={}",
                request.kind,
                request.owner_id,
                saved.changed(),
                saved
                    .archived
                    .as_ref()
                    .map_or(0, |version| version.version_number),
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure("section_save", request.kind, request.owner_id, err),
        }
        result
    }

    fn save_inner(&self, request: &SaveRequest) -> Result<SaveResult, SectionServiceError> {
        self.authorize(request.actor_id, request.owner_id)?;

        let slot = self.locks.slot(request.owner_id, request.kind);
        let _guard = lock_slot(&slot);

        let now_ms = self.clock.now_ms();
        let command = SaveCommand {
            owner_id: request.owner_id,
            kind: request.kind,
            title: section_title(request.kind),
            content: request.content.as_str(),
            metadata: request.metadata.as_ref(),
            actor_id: request.actor_id,
            now_ms,
        };
        let outcome = self.with_conflict_retry("section_save", || {
            self.repo.save_section(&command)
        })?;

        let (section, archived) = match outcome {
            SaveOutcome::Unchanged { section } => {
                return Ok(SaveResult {
                    section,
                    archived: None,
                    event: None,
                });
            }
            SaveOutcome::Created { section, baseline } => (section, baseline),
            SaveOutcome::Updated { section, archived } => (section, archived),
        };

        let summary = match summarize_content(&section.content) {
            Some(preview) => format!("Updated {} section: {preview}", section.title),
            None => format!("Updated {} section", section.title),
        };
        let event = self.build_event(
            ChangeAction::SectionUpdated,
            &section,
            request.actor_id,
            archived.version_number,
            summary,
            now_ms,
        );
        self.deliver(&event);

        Ok(SaveResult {
            section,
            archived: Some(archived),
            event: Some(event),
        })
    }

    /// Makes an archived version's content current again.
    ///
    /// # Contract
    /// - The version must belong to `(owner_id, kind)`.
    /// - The pre-restore content is archived as `max + 1` first; no existing
    ///   version is altered.
    /// - Restoring content that is already current writes nothing.
    pub fn restore(&self, request: &RestoreRequest) -> Result<RestoreResult, SectionServiceError> {
        let started_at = Instant::now();
        let result = self.restore_inner(request);
        match &result {
            Ok(restored) => info!(
                "event=section_restore module=service status=ok kind={} owner_id={} changed={} source_version={} duration_ms={}",
                request.kind,
                request.owner_id,
                restored.changed(),
                restored.restored_from.version_number,
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure("section_restore", request.kind, request.owner_id, err),
        }
        result
    }

    fn restore_inner(
        &self,
        request: &RestoreRequest,
    ) -> Result<RestoreResult, SectionServiceError> {
        self.authorize(request.actor_id, request.owner_id)?;

        let slot = self.locks.slot(request.owner_id, request.kind);
        let _guard = lock_slot(&slot);

        let now_ms = self.clock.now_ms();
        let command = RestoreCommand {
            owner_id: request.owner_id,
            kind: request.kind,
            version_id: request.version_id,
            actor_id: request.actor_id,
            now_ms,
        };
        let outcome = self.with_conflict_retry("section_restore", || {
            self.repo.restore_section(&command)
        })?;

        match outcome {
            RestoreOutcome::AlreadyCurrent { section, source } => Ok(RestoreResult {
                section,
                archived: None,
                restored_from: source,
                event: None,
            }),
            RestoreOutcome::Restored {
                section,
                archived,
                source,
            } => {
                let summary = format!(
                    "Restored {} section to version {}",
                    section.title, source.version_number
                );
                let event = self.build_event(
                    ChangeAction::SectionRestored,
                    &section,
                    request.actor_id,
                    archived.version_number,
                    summary,
                    now_ms,
                );
                self.deliver(&event);
                Ok(RestoreResult {
                    section,
                    archived: Some(archived),
                    restored_from: source,
                    event: Some(event),
                })
            }
        }
    }

    /// Returns current content and every archived version, newest first.
    pub fn list_versions(
        &self,
        owner_id: OwnerId,
        kind: SectionKind,
    ) -> Result<SectionHistory, SectionServiceError> {
        let (section, versions) = self
            .repo
            .load_history(owner_id, kind)?
            .ok_or(SectionServiceError::SectionNotFound { owner_id, kind })?;
        debug!(
            "event=section_history module=service status=ok kind={} owner_id={} versions={}",
            kind,
            owner_id,
            versions.len()
        );
        Ok(SectionHistory {
            current_content: section.content.clone(),
            section,
            versions,
        })
    }

    /// Loads the current section, if it was ever saved.
    pub fn get_section(
        &self,
        owner_id: OwnerId,
        kind: SectionKind,
    ) -> Result<Option<Section>, SectionServiceError> {
        self.repo.get_section(owner_id, kind).map_err(Into::into)
    }

    /// Lists every saved section of one owner, ordered by kind key.
    pub fn list_sections(&self, owner_id: OwnerId) -> Result<Vec<Section>, SectionServiceError> {
        self.repo.list_sections(owner_id).map_err(Into::into)
    }

    /// Loads one archived version, checking it belongs to `(owner_id, kind)`.
    pub fn get_version(
        &self,
        owner_id: OwnerId,
        kind: SectionKind,
        version_id: VersionId,
    ) -> Result<Version, SectionServiceError> {
        let version = self
            .repo
            .get_version(version_id)?
            .ok_or(SectionServiceError::VersionNotFound(version_id))?;
        let belongs = self
            .repo
            .get_section(owner_id, kind)?
            .is_some_and(|section| section.id == version.section_id);
        if !belongs {
            return Err(SectionServiceError::SectionMismatch {
                version_id,
                owner_id,
                kind,
            });
        }
        Ok(version)
    }

    fn authorize(&self, actor_id: ActorId, owner_id: OwnerId) -> Result<(), SectionServiceError> {
        if self.gate.is_authorized(actor_id, owner_id) {
            Ok(())
        } else {
            Err(SectionServiceError::NotAuthorized { actor_id, owner_id })
        }
    }

    fn with_conflict_retry<T>(
        &self,
        operation: &'static str,
        mut attempt_once: impl FnMut() -> RepoResult<T>,
    ) -> Result<T, SectionServiceError> {
        let max_attempts = self.max_conflict_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match attempt_once() {
                Ok(value) => return Ok(value),
                Err(RepoError::Conflict(detail)) if attempt < max_attempts => {
                    warn!(
                        "event={} module=service status=retry attempt={} max_attempts={} detail={}",
                        operation, attempt, max_attempts, detail
                    );
                    let delay = self.retry_backoff.saturating_mul(attempt);
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(RepoError::Conflict(_)) => {
                    return Err(SectionServiceError::Conflict { attempts: attempt });
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    fn build_event(
        &self,
        action: ChangeAction,
        section: &Section,
        actor_id: ActorId,
        version_number: u32,
        summary: String,
        timestamp: i64,
    ) -> ChangeEvent {
        ChangeEvent {
            action,
            kind: section.kind,
            owner_id: section.owner_id,
            section_id: section.id,
            actor_id,
            version_number,
            summary,
            timestamp,
        }
    }

    fn deliver(&self, event: &ChangeEvent) {
        if let Err(err) = self.notifier.notify(event) {
            warn!(
                "event=section_notify module=service status=error kind={} section_id={} version_number={} error={}",
                event.kind, event.section_id, event.version_number, err
            );
        }
    }
}

fn log_failure(operation: &str, kind: SectionKind, owner_id: OwnerId, err: &SectionServiceError) {
    match err {
        SectionServiceError::Storage(_) => error!(
            "event={} module=service status=error kind={} owner_id={} error_code={} error={}",
            operation,
            kind,
            owner_id,
            err.code(),
            err
        ),
        _ => warn!(
            "event={} module=service status=rejected kind={} owner_id={} error_code={}",
            operation,
            kind,
            owner_id,
            err.code()
        ),
    }
}
