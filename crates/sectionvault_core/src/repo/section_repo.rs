//! Section repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Own the `sections` current-value rows and the append-only
//!   `section_versions` archive.
//! - Run each content-changing mutation as one explicit IMMEDIATE transaction:
//!   read section, read max version number, insert archive row, update section.
//!
//! # Invariants
//! - Version numbers per section are `1..N` with no gaps or duplicates.
//! - The archived row always holds the value being superseded, never the new one.
//! - Any error before `commit` drops the transaction, which rolls it back.
//! - Archive rows are never updated or deleted.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::section::{
    ActorId, OwnerId, Section, SectionId, SectionKind, Version, VersionId,
};
use rusqlite::ffi;
use rusqlite::{params, Connection, ErrorCode, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const SECTION_SELECT_SQL: &str = "SELECT
    id,
    owner_id,
    kind,
    title,
    content,
    metadata,
    created_at,
    updated_at
FROM sections";

const VERSION_SELECT_SQL: &str = "SELECT
    id,
    section_id,
    content,
    version_number,
    author_id,
    created_at
FROM section_versions";

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from section repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Write lost a race: uniqueness violation or writer lock timeout.
    /// The transaction was rolled back and may be retried.
    Conflict(String),
    /// The connection was interrupted mid-statement; nothing was applied.
    Interrupted,
    /// No archived version with this id.
    VersionNotFound(VersionId),
    /// The version exists but belongs to another section.
    SectionMismatch {
        version_id: VersionId,
        owner_id: OwnerId,
        kind: SectionKind,
    },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Conflict(detail) => write!(f, "concurrent section write conflict: {detail}"),
            Self::Interrupted => write!(f, "section transaction interrupted"),
            Self::VersionNotFound(id) => write!(f, "section version not found: {id}"),
            Self::SectionMismatch {
                version_id,
                owner_id,
                kind,
            } => write!(
                f,
                "version {version_id} does not belong to section owner {owner_id} kind {kind}"
            ),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "section repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "section repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "section repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid section data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, message) = &value {
            let detail = message
                .clone()
                .unwrap_or_else(|| failure.to_string());
            match failure.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    return Self::Conflict(detail);
                }
                ErrorCode::OperationInterrupted => return Self::Interrupted,
                ErrorCode::ConstraintViolation
                    if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                        || failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
                {
                    return Self::Conflict(detail);
                }
                _ => {}
            }
        }
        Self::Db(DbError::Sqlite(value))
    }
}

/// Input for one `save` transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveCommand<'a> {
    pub owner_id: OwnerId,
    pub kind: SectionKind,
    /// Title written only when the section is created.
    pub title: &'a str,
    pub content: &'a str,
    /// `None` keeps the stored metadata.
    pub metadata: Option<&'a serde_json::Value>,
    pub actor_id: ActorId,
    pub now_ms: i64,
}

/// Input for one `restore` transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreCommand {
    pub owner_id: OwnerId,
    pub kind: SectionKind,
    pub version_id: VersionId,
    pub actor_id: ActorId,
    pub now_ms: i64,
}

/// Committed result of a `save` transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// First save: section row and baseline version 1 were written.
    Created { section: Section, baseline: Version },
    /// Previous content archived, new content applied.
    Updated { section: Section, archived: Version },
    /// Content already equal; only `updated_at`/metadata were touched.
    Unchanged { section: Section },
}

impl SaveOutcome {
    pub fn section(&self) -> &Section {
        match self {
            Self::Created { section, .. }
            | Self::Updated { section, .. }
            | Self::Unchanged { section } => section,
        }
    }
}

/// Committed result of a `restore` transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    /// Pre-restore content archived, source content applied.
    Restored {
        section: Section,
        archived: Version,
        source: Version,
    },
    /// Source content already current; nothing was written.
    AlreadyCurrent { section: Section, source: Version },
}

impl RestoreOutcome {
    pub fn section(&self) -> &Section {
        match self {
            Self::Restored { section, .. } | Self::AlreadyCurrent { section, .. } => section,
        }
    }
}

/// Repository interface for section store and version archive operations.
pub trait SectionRepository {
    /// Creates or updates one section, archiving the superseded value.
    fn save_section(&self, command: &SaveCommand<'_>) -> RepoResult<SaveOutcome>;
    /// Copies an archived version back into the current value.
    fn restore_section(&self, command: &RestoreCommand) -> RepoResult<RestoreOutcome>;
    /// Loads the current section for `(owner_id, kind)`.
    fn get_section(&self, owner_id: OwnerId, kind: SectionKind) -> RepoResult<Option<Section>>;
    /// Lists every section of one owner ordered by kind key.
    fn list_sections(&self, owner_id: OwnerId) -> RepoResult<Vec<Section>>;
    /// Loads one section and its archive (newest first) from a single
    /// read snapshot.
    fn load_history(
        &self,
        owner_id: OwnerId,
        kind: SectionKind,
    ) -> RepoResult<Option<(Section, Vec<Version>)>>;
    /// Loads one archived version by id.
    fn get_version(&self, version_id: VersionId) -> RepoResult<Option<Version>>;
}

/// SQLite-backed section repository.
pub struct SqliteSectionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSectionRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_section_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn begin_write(&self) -> RepoResult<Transaction<'conn>> {
        // IMMEDIATE takes the writer lock up front, so the max-number read
        // and the archive insert cannot interleave with another writer.
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

impl SectionRepository for SqliteSectionRepository<'_> {
    fn save_section(&self, command: &SaveCommand<'_>) -> RepoResult<SaveOutcome> {
        let metadata_json = command.metadata.map(encode_metadata).transpose()?;
        let tx = self.begin_write()?;

        let outcome = match find_section(&tx, command.owner_id, command.kind)? {
            None => {
                let section = Section {
                    id: Uuid::new_v4(),
                    owner_id: command.owner_id,
                    kind: command.kind,
                    title: command.title.to_string(),
                    content: command.content.to_string(),
                    metadata: command.metadata.cloned(),
                    created_at: command.now_ms,
                    updated_at: command.now_ms,
                };
                insert_section(&tx, &section, metadata_json.as_deref())?;
                let baseline = insert_version(
                    &tx,
                    section.id,
                    &section.content,
                    1,
                    command.actor_id,
                    command.now_ms,
                )?;
                SaveOutcome::Created { section, baseline }
            }
            Some(mut section) if section.content == command.content => {
                touch_section(&tx, section.id, metadata_json.as_deref(), command.now_ms)?;
                if let Some(metadata) = command.metadata {
                    section.metadata = Some(metadata.clone());
                }
                section.updated_at = command.now_ms;
                SaveOutcome::Unchanged { section }
            }
            Some(mut section) => {
                let next_number = next_version_number(&tx, section.id)?;
                let archived = insert_version(
                    &tx,
                    section.id,
                    &section.content,
                    next_number,
                    command.actor_id,
                    command.now_ms,
                )?;
                update_section_content(
                    &tx,
                    section.id,
                    command.content,
                    metadata_json.as_deref(),
                    command.now_ms,
                )?;
                section.content = command.content.to_string();
                if let Some(metadata) = command.metadata {
                    section.metadata = Some(metadata.clone());
                }
                section.updated_at = command.now_ms;
                SaveOutcome::Updated { section, archived }
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn restore_section(&self, command: &RestoreCommand) -> RepoResult<RestoreOutcome> {
        let tx = self.begin_write()?;

        let source = load_version(&tx, command.version_id)?
            .ok_or(RepoError::VersionNotFound(command.version_id))?;
        let mut section = find_section(&tx, command.owner_id, command.kind)?
            .filter(|section| section.id == source.section_id)
            .ok_or(RepoError::SectionMismatch {
                version_id: command.version_id,
                owner_id: command.owner_id,
                kind: command.kind,
            })?;

        if section.content == source.content {
            // Nothing written; dropping the transaction releases the lock.
            return Ok(RestoreOutcome::AlreadyCurrent { section, source });
        }

        let next_number = next_version_number(&tx, section.id)?;
        let archived = insert_version(
            &tx,
            section.id,
            &section.content,
            next_number,
            command.actor_id,
            command.now_ms,
        )?;
        update_section_content(&tx, section.id, &source.content, None, command.now_ms)?;
        tx.commit()?;

        section.content = source.content.clone();
        section.updated_at = command.now_ms;
        Ok(RestoreOutcome::Restored {
            section,
            archived,
            source,
        })
    }

    fn get_section(&self, owner_id: OwnerId, kind: SectionKind) -> RepoResult<Option<Section>> {
        find_section(self.conn, owner_id, kind)
    }

    fn list_sections(&self, owner_id: OwnerId) -> RepoResult<Vec<Section>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SECTION_SELECT_SQL}
             WHERE owner_id = ?1
             ORDER BY kind ASC;"
        ))?;
        let mut rows = stmt.query([owner_id.to_string()])?;
        let mut sections = Vec::new();
        while let Some(row) = rows.next()? {
            sections.push(parse_section_row(row)?);
        }
        Ok(sections)
    }

    fn load_history(
        &self,
        owner_id: OwnerId,
        kind: SectionKind,
    ) -> RepoResult<Option<(Section, Vec<Version>)>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;
        let Some(section) = find_section(&tx, owner_id, kind)? else {
            return Ok(None);
        };
        let versions = list_versions(&tx, section.id)?;
        tx.commit()?;
        Ok(Some((section, versions)))
    }

    fn get_version(&self, version_id: VersionId) -> RepoResult<Option<Version>> {
        load_version(self.conn, version_id)
    }
}

fn find_section(
    conn: &Connection,
    owner_id: OwnerId,
    kind: SectionKind,
) -> RepoResult<Option<Section>> {
    let mut stmt = conn.prepare(&format!(
        "{SECTION_SELECT_SQL}
         WHERE owner_id = ?1
           AND kind = ?2;"
    ))?;
    let mut rows = stmt.query(params![owner_id.to_string(), kind.as_str()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_section_row(row)?));
    }
    Ok(None)
}

fn list_versions(conn: &Connection, section_id: SectionId) -> RepoResult<Vec<Version>> {
    let mut stmt = conn.prepare(&format!(
        "{VERSION_SELECT_SQL}
         WHERE section_id = ?1
         ORDER BY version_number DESC;"
    ))?;
    let mut rows = stmt.query([section_id.to_string()])?;
    let mut versions = Vec::new();
    while let Some(row) = rows.next()? {
        versions.push(parse_version_row(row)?);
    }
    Ok(versions)
}

fn load_version(conn: &Connection, version_id: VersionId) -> RepoResult<Option<Version>> {
    let mut stmt = conn.prepare(&format!("{VERSION_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([version_id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_version_row(row)?));
    }
    Ok(None)
}

fn next_version_number(conn: &Connection, section_id: SectionId) -> RepoResult<u32> {
    let current: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version_number), 0)
         FROM section_versions
         WHERE section_id = ?1;",
        [section_id.to_string()],
        |row| row.get(0),
    )?;
    let current = u32::try_from(current).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid max version_number `{current}` for section {section_id}"
        ))
    })?;
    current.checked_add(1).ok_or_else(|| {
        RepoError::InvalidData(format!("version_number overflow for section {section_id}"))
    })
}

fn insert_section(conn: &Connection, section: &Section, metadata_json: Option<&str>) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO sections (
            id,
            owner_id,
            kind,
            title,
            content,
            metadata,
            created_at,
            updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
        params![
            section.id.to_string(),
            section.owner_id.to_string(),
            section.kind.as_str(),
            section.title.as_str(),
            section.content.as_str(),
            metadata_json,
            section.created_at,
            section.updated_at,
        ],
    )?;
    Ok(())
}

fn insert_version(
    conn: &Connection,
    section_id: SectionId,
    content: &str,
    version_number: u32,
    author_id: ActorId,
    now_ms: i64,
) -> RepoResult<Version> {
    let version = Version {
        id: Uuid::new_v4(),
        section_id,
        content: content.to_string(),
        version_number,
        author_id,
        created_at: now_ms,
    };
    conn.execute(
        "INSERT INTO section_versions (
            id,
            section_id,
            content,
            version_number,
            author_id,
            created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            version.id.to_string(),
            version.section_id.to_string(),
            version.content.as_str(),
            i64::from(version.version_number),
            version.author_id.to_string(),
            version.created_at,
        ],
    )?;
    Ok(version)
}

fn update_section_content(
    conn: &Connection,
    section_id: SectionId,
    content: &str,
    metadata_json: Option<&str>,
    now_ms: i64,
) -> RepoResult<()> {
    let changed = conn.execute(
        "UPDATE sections
         SET content = ?2,
             metadata = COALESCE(?3, metadata),
             updated_at = ?4
         WHERE id = ?1;",
        params![section_id.to_string(), content, metadata_json, now_ms],
    )?;
    if changed == 0 {
        return Err(RepoError::InvalidData(format!(
            "section {section_id} vanished inside its own transaction"
        )));
    }
    Ok(())
}

fn touch_section(
    conn: &Connection,
    section_id: SectionId,
    metadata_json: Option<&str>,
    now_ms: i64,
) -> RepoResult<()> {
    conn.execute(
        "UPDATE sections
         SET metadata = COALESCE(?2, metadata),
             updated_at = ?3
         WHERE id = ?1;",
        params![section_id.to_string(), metadata_json, now_ms],
    )?;
    Ok(())
}

fn encode_metadata(metadata: &serde_json::Value) -> RepoResult<String> {
    serde_json::to_string(metadata)
        .map_err(|err| RepoError::InvalidData(format!("unserializable section metadata: {err}")))
}

fn parse_section_row(row: &Row<'_>) -> RepoResult<Section> {
    let id_text: String = row.get("id")?;
    let owner_text: String = row.get("owner_id")?;
    let kind_text: String = row.get("kind")?;
    let kind = kind_text.parse::<SectionKind>().map_err(|_| {
        RepoError::InvalidData(format!("invalid section kind `{kind_text}` in sections.kind"))
    })?;
    let metadata = row
        .get::<_, Option<String>>("metadata")?
        .map(|value| {
            serde_json::from_str(&value).map_err(|err| {
                RepoError::InvalidData(format!("invalid JSON in sections.metadata: {err}"))
            })
        })
        .transpose()?;

    Ok(Section {
        id: parse_uuid(&id_text, "sections.id")?,
        owner_id: parse_uuid(&owner_text, "sections.owner_id")?,
        kind,
        title: row.get("title")?,
        content: row.get("content")?,
        metadata,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_version_row(row: &Row<'_>) -> RepoResult<Version> {
    let id_text: String = row.get("id")?;
    let section_text: String = row.get("section_id")?;
    let author_text: String = row.get("author_id")?;
    let number: i64 = row.get("version_number")?;
    let version_number = u32::try_from(number)
        .ok()
        .filter(|value| *value >= 1)
        .ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid version_number `{number}` in section_versions.version_number"
            ))
        })?;

    Ok(Version {
        id: parse_uuid(&id_text, "section_versions.id")?,
        section_id: parse_uuid(&section_text, "section_versions.section_id")?,
        content: row.get("content")?,
        version_number,
        author_id: parse_uuid(&author_text, "section_versions.author_id")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn ensure_section_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let required: [(&'static str, &[&'static str]); 2] = [
        (
            "sections",
            &[
                "id",
                "owner_id",
                "kind",
                "title",
                "content",
                "metadata",
                "created_at",
                "updated_at",
            ],
        ),
        (
            "section_versions",
            &[
                "id",
                "section_id",
                "content",
                "version_number",
                "author_id",
                "created_at",
            ],
        ),
    ];

    for (table, columns) in required {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
