//! The `Change` entity (spec §3): a directory at `<root>/changes/<slug>`
//! holding a proposal, a task list, and an optional delta subtree.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::lock::LockInfo;

pub const PROPOSAL_FILE: &str = "proposal.md";
pub const TASKS_FILE: &str = "tasks.md";
pub const DELTA_DIR: &str = "delta";
pub const LOCK_FILE: &str = ".lock";
pub const RECEIPT_FILE: &str = "receipt.json";
pub const CHANGES_DIR: &str = "changes";
pub const ARCHIVE_DIR: &str = "archive";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Draft,
    Archived,
}

impl ChangeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Archived => "archived",
        }
    }
}

/// Filesystem paths for one change, relative to `<root>/changes/<slug>`
/// (or `<root>/changes/archive/<slug>` once archived).
#[derive(Debug, Clone)]
pub struct ChangePaths {
    pub root: PathBuf,
    pub proposal: PathBuf,
    pub tasks: PathBuf,
    pub delta: PathBuf,
    pub lock: PathBuf,
    pub receipt: PathBuf,
}

impl ChangePaths {
    pub fn new(change_dir: PathBuf) -> Self {
        Self {
            proposal: change_dir.join(PROPOSAL_FILE),
            tasks: change_dir.join(TASKS_FILE),
            delta: change_dir.join(DELTA_DIR),
            lock: change_dir.join(LOCK_FILE),
            receipt: change_dir.join(RECEIPT_FILE),
            root: change_dir,
        }
    }
}

/// Active-directory path for a slug: `<repo_root>/changes/<slug>`.
pub fn active_dir(repo_root: &Path, slug: &str) -> PathBuf {
    repo_root.join(CHANGES_DIR).join(slug)
}

/// Archived-directory path for a slug: `<repo_root>/changes/archive/<slug>`.
pub fn archived_dir(repo_root: &Path, slug: &str) -> PathBuf {
    repo_root.join(CHANGES_DIR).join(ARCHIVE_DIR).join(slug)
}

/// Base directory the pagination engine scans for active (non-archived) changes.
pub fn changes_base_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(CHANGES_DIR)
}

/// Resource URIs a change exposes, per spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUris {
    pub proposal: String,
    pub tasks: String,
    pub delta: String,
}

impl ResourceUris {
    pub fn for_slug(slug: &str) -> Self {
        Self {
            proposal: format!("change://{slug}/proposal"),
            tasks: format!("change://{slug}/tasks"),
            delta: format!("change://{slug}/delta"),
        }
    }
}

/// In-memory summary of a change, as returned by `changes.active` listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSummary {
    pub slug: String,
    pub title: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub paths: ChangeSummaryPaths,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSummaryPaths {
    pub root: String,
    pub proposal: String,
    pub tasks: String,
}

/// Attributes of a change's metadata sidecar (`.meta.json`), used to carry
/// title/rationale/owner/template across a resume (spec §3's Change
/// attributes — title, rationale, owner, template kind, timestamps — aren't
/// derivable purely from the directory listing, so we persist them).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeMeta {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub template: String,
    pub created_at: String,
}

pub const META_FILE: &str = ".meta.json";

/// Live status derived from the filesystem: directory presence plus lock state.
#[derive(Debug, Clone)]
pub struct Change {
    pub slug: String,
    pub status: ChangeStatus,
    pub paths: ChangePaths,
    pub lock: Option<LockInfo>,
    pub meta: Option<ChangeMeta>,
}
