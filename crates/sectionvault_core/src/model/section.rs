//! Section and version records.
//!
//! # Responsibility
//! - Describe one named content slot and its archived snapshots.
//! - Parse and render the closed `SectionKind` enumeration.
//!
//! # Invariants
//! - `SectionKind::as_str` is the storage key and must never change for an
//!   existing variant.
//! - A `Version` belongs to exactly one section; its content, number and
//!   author never change once written.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier of a `Section` row.
pub type SectionId = Uuid;
/// Stable identifier of a `Version` row.
pub type VersionId = Uuid;
/// Identifier of the entity owning a set of sections (e.g. a project).
pub type OwnerId = Uuid;
/// Identifier of the principal performing a mutation.
pub type ActorId = Uuid;

/// Closed set of section slots an owner can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// Background and motivation.
    Context,
    /// What is in and out of scope.
    Scope,
    /// Functional and non-functional requirements.
    Requirements,
    /// System architecture write-up.
    Architecture,
    /// Known risks and mitigations.
    Risks,
    /// Delivery milestones.
    Milestones,
}

impl SectionKind {
    /// Every kind, in storage-key order.
    pub const ALL: [SectionKind; 6] = [
        Self::Architecture,
        Self::Context,
        Self::Milestones,
        Self::Requirements,
        Self::Risks,
        Self::Scope,
    ];

    /// Storage key persisted in `sections.kind`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Scope => "scope",
            Self::Requirements => "requirements",
            Self::Architecture => "architecture",
            Self::Risks => "risks",
            Self::Milestones => "milestones",
        }
    }
}

impl Display for SectionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a kind key is outside the closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidKind(pub String);

impl Display for InvalidKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid section kind: `{}`", self.0)
    }
}

impl Error for InvalidKind {}

impl FromStr for SectionKind {
    type Err = InvalidKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "context" => Ok(Self::Context),
            "scope" => Ok(Self::Scope),
            "requirements" => Ok(Self::Requirements),
            "architecture" => Ok(Self::Architecture),
            "risks" => Ok(Self::Risks),
            "milestones" => Ok(Self::Milestones),
            _ => Err(InvalidKind(value.to_string())),
        }
    }
}

/// Current value of one `(owner_id, kind)` slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub owner_id: OwnerId,
    pub kind: SectionKind,
    /// Display label captured when the section was created.
    pub title: String,
    pub content: String,
    /// Opaque side data (external links etc.), stored as JSON.
    pub metadata: Option<serde_json::Value>,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds. Touched by every save, including no-op ones.
    pub updated_at: i64,
}

/// Immutable archived snapshot of a section's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub section_id: SectionId,
    pub content: String,
    /// 1-based, gapless per section.
    pub version_number: u32,
    /// Principal whose mutation produced this archive entry.
    pub author_id: ActorId,
    /// Epoch milliseconds.
    pub created_at: i64,
}
