//! Use-case API for host applications.
//!
//! # Responsibility
//! - Expose section save, restore and history as string-in, envelope-out calls.
//! - Parse ids, kinds and metadata at the boundary so the core only sees
//!   typed values.
//!
//! # Invariants
//! - Exported functions never panic; failures come back as envelopes with a
//!   stable `error_code`.
//! - Calls made through one `SectionApi` share a lock table, so change events
//!   for one section reach the notifier in commit order.

use log::debug;
use sectionvault_core::db::open_db_with_config;
use sectionvault_core::{
    core_version as core_version_inner, init_logging as init_logging_inner,
    init_logging_from_config, ping as ping_inner, AccessGate, AllowAll, ChangeNotifier,
    InvalidKind, LogNotifier, RepoError, RestoreRequest, RestoreResult, SaveRequest, SaveResult,
    SectionHistory, SectionKind, SectionLocks, SectionService, SectionServiceError,
    SqliteSectionRepository, StoreConfig, Version,
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_DB_FILE_NAME: &str = "sectionvault.sqlite3";

/// Minimal health-check API for host smoke integration.
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Exposes the core crate version.
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: directory where rolling logs are written.
///
/// Returns an empty string on success and the error message on failure.
/// Repeating the same `level + log_dir` is a no-op; a different
/// configuration is rejected.
pub fn init_logging(level: &str, log_dir: &str) -> String {
    match init_logging_inner(level, log_dir) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Result envelope for mutating calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Stable snake_case failure code; `None` on success.
    pub error_code: Option<String>,
    /// Whether the same call may succeed if repeated later.
    pub retryable: bool,
    /// Human-readable message for diagnostics.
    pub message: String,
    /// Section touched by the call.
    pub section_id: Option<String>,
    /// Archive number written by the call, if any.
    pub version_number: Option<u32>,
    /// Whether current content changed.
    pub changed: bool,
}

impl ActionResponse {
    fn success(
        message: impl Into<String>,
        section_id: Uuid,
        version_number: Option<u32>,
        changed: bool,
    ) -> Self {
        Self {
            ok: true,
            error_code: None,
            retryable: false,
            message: message.into(),
            section_id: Some(section_id.to_string()),
            version_number,
            changed,
        }
    }

    fn failure(operation: &str, err: &ApiError) -> Self {
        Self {
            ok: false,
            error_code: Some(err.code().to_string()),
            retryable: err.is_retryable(),
            message: format!("{operation} failed: {err}"),
            section_id: None,
            version_number: None,
            changed: false,
        }
    }
}

/// One archived version as seen by hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionItem {
    pub version_id: String,
    pub version_number: u32,
    pub content: String,
    pub author_id: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

impl From<Version> for VersionItem {
    fn from(value: Version) -> Self {
        Self {
            version_id: value.id.to_string(),
            version_number: value.version_number,
            content: value.content,
            author_id: value.author_id.to_string(),
            created_at: value.created_at,
        }
    }
}

/// History envelope: current content plus every version, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionListResponse {
    pub ok: bool,
    pub error_code: Option<String>,
    pub message: String,
    pub section_id: Option<String>,
    pub current_content: Option<String>,
    pub versions: Vec<VersionItem>,
}

impl VersionListResponse {
    fn failure(err: &ApiError) -> Self {
        Self {
            ok: false,
            error_code: Some(err.code().to_string()),
            message: format!("list_versions failed: {err}"),
            section_id: None,
            current_content: None,
            versions: Vec::new(),
        }
    }
}

/// Boundary failure: either a malformed input or a core service error.
#[derive(Debug)]
enum ApiError {
    InvalidId { field: &'static str, value: String },
    InvalidMetadata(String),
    Service(SectionServiceError),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidId { .. } => "invalid_id",
            Self::InvalidMetadata(_) => "invalid_metadata",
            Self::Service(err) => err.code(),
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Service(err) if err.is_retryable())
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidId { field, value } => write!(f, "{field} is not a valid id: `{value}`"),
            Self::InvalidMetadata(detail) => write!(f, "metadata is not valid JSON: {detail}"),
            Self::Service(err) => write!(f, "{err}"),
        }
    }
}

impl From<SectionServiceError> for ApiError {
    fn from(value: SectionServiceError) -> Self {
        Self::Service(value)
    }
}

impl From<RepoError> for ApiError {
    fn from(value: RepoError) -> Self {
        Self::Service(value.into())
    }
}

impl From<InvalidKind> for ApiError {
    fn from(value: InvalidKind) -> Self {
        Self::Service(value.into())
    }
}

/// Entry point for hosts. Opens one connection per call against the
/// configured database file.
pub struct SectionApi {
    config: StoreConfig,
    db_path: PathBuf,
    gate: Arc<dyn AccessGate>,
    notifier: Arc<dyn ChangeNotifier>,
    locks: SectionLocks,
}

impl SectionApi {
    /// Creates an API over `config`. Without a configured path the database
    /// lives in the system temp directory.
    pub fn new(config: StoreConfig) -> Self {
        let db_path = config
            .db_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_DB_FILE_NAME));
        Self {
            config,
            db_path,
            gate: Arc::new(AllowAll),
            notifier: Arc::new(LogNotifier),
            locks: SectionLocks::new(),
        }
    }

    /// Creates an API configured from `SECTIONVAULT_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(StoreConfig::from_env())
    }

    pub fn with_gate(mut self, gate: Arc<dyn AccessGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Initializes core logging at this API's configured level.
    ///
    /// Same contract as the free `init_logging`: empty string on success,
    /// error message otherwise.
    pub fn init_logging(&self, log_dir: &str) -> String {
        match init_logging_from_config(&self.config, log_dir) {
            Ok(()) => String::new(),
            Err(err) => err,
        }
    }

    /// Saves `content` as the current value of one section.
    ///
    /// `metadata_json`, when given, must be a JSON document and replaces the
    /// stored metadata; `None` keeps it.
    pub fn save(
        &self,
        owner_id: &str,
        kind: &str,
        content: &str,
        metadata_json: Option<&str>,
        actor_id: &str,
    ) -> ActionResponse {
        match self.save_inner(owner_id, kind, content, metadata_json, actor_id) {
            Ok(saved) => {
                let message = if saved.changed() {
                    "Section saved."
                } else {
                    "Section unchanged."
                };
                let version_number = saved
                    .archived
                    .as_ref()
                    .map(|version| version.version_number);
                ActionResponse::success(message, saved.section.id, version_number, saved.changed())
            }
            Err(err) => {
                log_rejection("save", &err);
                ActionResponse::failure("save", &err)
            }
        }
    }

    /// Makes archived version `version_id` current again.
    pub fn restore(
        &self,
        owner_id: &str,
        kind: &str,
        version_id: &str,
        actor_id: &str,
    ) -> ActionResponse {
        match self.restore_inner(owner_id, kind, version_id, actor_id) {
            Ok(restored) => {
                let message = if restored.changed() {
                    format!(
                        "Restored version {}.",
                        restored.restored_from.version_number
                    )
                } else {
                    "Version already current.".to_string()
                };
                let version_number = restored
                    .archived
                    .as_ref()
                    .map(|version| version.version_number);
                ActionResponse::success(
                    message,
                    restored.section.id,
                    version_number,
                    restored.changed(),
                )
            }
            Err(err) => {
                log_rejection("restore", &err);
                ActionResponse::failure("restore", &err)
            }
        }
    }

    /// Lists current content and every archived version, newest first.
    pub fn list_versions(&self, owner_id: &str, kind: &str) -> VersionListResponse {
        match self.list_versions_inner(owner_id, kind) {
            Ok(history) => VersionListResponse {
                ok: true,
                error_code: None,
                message: format!("Found {} version(s).", history.versions.len()),
                section_id: Some(history.section.id.to_string()),
                current_content: Some(history.current_content),
                versions: history.versions.into_iter().map(VersionItem::from).collect(),
            },
            Err(err) => {
                log_rejection("list_versions", &err);
                VersionListResponse::failure(&err)
            }
        }
    }

    fn save_inner(
        &self,
        owner_id: &str,
        kind: &str,
        content: &str,
        metadata_json: Option<&str>,
        actor_id: &str,
    ) -> Result<SaveResult, ApiError> {
        let request = SaveRequest {
            owner_id: parse_id("owner_id", owner_id)?,
            kind: parse_kind(kind)?,
            content: content.to_string(),
            metadata: parse_metadata(metadata_json)?,
            actor_id: parse_id("actor_id", actor_id)?,
        };
        self.with_service(|service| service.save(&request))
    }

    fn restore_inner(
        &self,
        owner_id: &str,
        kind: &str,
        version_id: &str,
        actor_id: &str,
    ) -> Result<RestoreResult, ApiError> {
        let request = RestoreRequest {
            owner_id: parse_id("owner_id", owner_id)?,
            kind: parse_kind(kind)?,
            version_id: parse_id("version_id", version_id)?,
            actor_id: parse_id("actor_id", actor_id)?,
        };
        self.with_service(|service| service.restore(&request))
    }

    fn list_versions_inner(&self, owner_id: &str, kind: &str) -> Result<SectionHistory, ApiError> {
        let owner_id = parse_id("owner_id", owner_id)?;
        let kind = parse_kind(kind)?;
        self.with_service(|service| service.list_versions(owner_id, kind))
    }

    fn with_service<T>(
        &self,
        f: impl FnOnce(&SectionService<SqliteSectionRepository<'_>>) -> Result<T, SectionServiceError>,
    ) -> Result<T, ApiError> {
        let conn = open_db_with_config(&self.db_path, &self.config).map_err(RepoError::from)?;
        let repo = SqliteSectionRepository::try_new(&conn)?;
        let service = SectionService::new(repo)
            .with_config(&self.config)
            .with_gate(Arc::clone(&self.gate))
            .with_notifier(Arc::clone(&self.notifier))
            .with_locks(self.locks.clone());
        f(&service).map_err(ApiError::from)
    }
}

fn parse_id(field: &'static str, value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value.trim()).map_err(|_| ApiError::InvalidId {
        field,
        value: value.to_string(),
    })
}

fn parse_kind(value: &str) -> Result<SectionKind, ApiError> {
    Ok(value.parse::<SectionKind>()?)
}

fn parse_metadata(value: Option<&str>) -> Result<Option<serde_json::Value>, ApiError> {
    match value {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => serde_json::from_str(raw)
            .map(Some)
            .map_err(|err| ApiError::InvalidMetadata(err.to_string())),
    }
}

fn log_rejection(operation: &str, err: &ApiError) {
    // Service errors are already logged by the core with full context.
    if !matches!(err, ApiError::Service(_)) {
        debug!(
            "event=api_call module=api status=rejected op={} error_code={}",
            operation,
            err.code()
        );
    }
}
