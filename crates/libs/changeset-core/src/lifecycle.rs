//! Change lifecycle (spec §4.3): `change_open`, `change_archive`,
//! `changes_active`. The three operations the dispatcher's `tools/call`
//! exposes as `change.open` / `change.archive` / `changes.active`, layered
//! on top of the lock manager (§4.2) and the pagination engine (§4.5).
//!
//! Archived changes move to `<root>/changes/archive/<slug>/` — a physical
//! relocation rather than an in-place flag, so "archived changes never
//! appear in active listings" falls out of the base directory scan never
//! seeing them (the Open Question in spec §9, resolved in DESIGN.md).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::change::{
    ARCHIVE_DIR, CHANGES_DIR, Change, ChangeMeta, ChangePaths, ChangeStatus, ChangeSummary,
    ChangeSummaryPaths, META_FILE, RECEIPT_FILE, ResourceUris, active_dir, archived_dir,
    changes_base_dir,
};
use crate::error::{ErrorCode, Result, WorkflowError};
use crate::git_collab::CommitLookup;
use crate::lock::{self, LockInfo};
use crate::pagination::{self, Pagination};
use crate::receipt::{Actor, Receipt, TestSummary};
use crate::template::{TemplateRenderer, TemplateRequest, normalize_kind};
use crate::test_collab::TestSummaryProvider;

const DEFAULT_TTL_SECS: i64 = 3600;
const MIN_TTL_SECS: i64 = 60;
const MAX_TTL_SECS: i64 = 86_400;
const DEFAULT_OWNER: &str = "anonymous";

#[derive(Debug, Clone, Default)]
pub struct ChangeOpenParams {
    pub title: String,
    pub slug: String,
    pub rationale: Option<String>,
    pub owner: Option<String>,
    pub ttl: Option<i64>,
    pub template: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeOpenPaths {
    pub root: String,
    pub proposal: String,
    pub tasks: String,
    pub delta: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeOpenResult {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub slug: String,
    pub created: bool,
    pub locked: bool,
    pub status: String,
    pub paths: ChangeOpenPaths,
    #[serde(rename = "resourceUris")]
    pub resource_uris: ResourceUris,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeArchiveResult {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub slug: String,
    pub archived: bool,
    #[serde(rename = "receiptPath")]
    pub receipt_path: String,
    pub receipt: Receipt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangesActivePage {
    pub page: u32,
    #[serde(rename = "pageSize")]
    pub page_size: usize,
    #[serde(rename = "totalItems")]
    pub total_items: usize,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
    #[serde(rename = "nextPageToken", skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    #[serde(rename = "modificationWarning", skip_serializing_if = "is_false")]
    pub modification_warning: bool,
    pub items: Vec<ChangeSummary>,
}

/// Ties the workflow primitives together: slug/path validation happens in
/// every caller (spec §4.1's "called on every slug argument"), locking in
/// `crate::lock`, pagination in `crate::pagination`. The engine itself is
/// stateless and safe to share across concurrent HTTP handlers (spec §5).
pub struct WorkflowEngine {
    pub root: PathBuf,
    pub api_version: String,
    pub template_renderer: Arc<dyn TemplateRenderer>,
    pub commit_lookup: Arc<dyn CommitLookup>,
    pub test_summary: Arc<dyn TestSummaryProvider>,
    pub pagination: Pagination,
}

impl WorkflowEngine {
    pub fn change_open(&self, params: ChangeOpenParams) -> Result<ChangeOpenResult> {
        crate::validator::validate_slug(&params.slug)?;
        if params.title.is_empty() {
            return Err(WorkflowError::new(ErrorCode::InvalidInput, "title must not be empty"));
        }

        let archive_path = archived_dir(&self.root, &params.slug);
        if archive_path.exists() {
            return Err(WorkflowError::archived(&params.slug));
        }

        let owner = params.owner.clone().unwrap_or_else(|| DEFAULT_OWNER.to_string());
        let ttl = params
            .ttl
            .unwrap_or(DEFAULT_TTL_SECS)
            .clamp(MIN_TTL_SECS, MAX_TTL_SECS);

        let change_dir = active_dir(&self.root, &params.slug);
        let paths = ChangePaths::new(change_dir.clone());

        let (created, info) = if change_dir.exists() {
            let now = lock::now_epoch_secs();
            match lock::inspect(&paths.lock) {
                Some(existing) if !existing.is_stale(now) && existing.owner != owner => {
                    return Err(WorkflowError::locked(
                        &params.slug,
                        &existing.owner,
                        existing.expires_at() - now,
                    ));
                }
                Some(existing) if !existing.is_stale(now) && existing.owner == owner => {
                    (false, lock::refresh(&paths.lock, &owner, ttl)?)
                }
                _ => (false, lock::atomic_lock(&paths.lock, &owner, ttl)?),
            }
        } else {
            fs::create_dir_all(&change_dir).map_err(WorkflowError::io)?;
            fs::create_dir_all(&paths.delta).map_err(WorkflowError::io)?;

            let info = lock::atomic_lock(&paths.lock, &owner, ttl)?;

            let kind = normalize_kind(params.template.as_deref());
            let files = self.template_renderer.render(&TemplateRequest {
                kind: kind.to_string(),
                slug: params.slug.clone(),
                title: params.title.clone(),
                rationale: params.rationale.clone(),
            })?;
            for (rel, bytes) in &files {
                let dest = change_dir.join(rel);
                atomic_write(&dest, bytes)?;
            }

            let meta = ChangeMeta {
                title: params.title.clone(),
                rationale: params.rationale.clone(),
                owner: Some(owner.clone()),
                template: kind.to_string(),
                created_at: iso_now(),
            };
            let meta_json = serde_json::to_vec(&meta).map_err(WorkflowError::io)?;
            atomic_write(&change_dir.join(META_FILE), &meta_json)?;

            (true, info)
        };

        Ok(ChangeOpenResult {
            api_version: self.api_version.clone(),
            slug: params.slug.clone(),
            created,
            locked: info.owner == owner,
            status: ChangeStatus::Draft.as_str().to_string(),
            paths: ChangeOpenPaths {
                root: paths.root.display().to_string(),
                proposal: paths.proposal.display().to_string(),
                tasks: paths.tasks.display().to_string(),
                delta: paths.delta.display().to_string(),
            },
            resource_uris: ResourceUris::for_slug(&params.slug),
        })
    }

    pub fn change_archive(&self, slug: &str) -> Result<ChangeArchiveResult> {
        crate::validator::validate_slug(slug)?;

        let archive_path = archived_dir(&self.root, slug);
        if archive_path.exists() {
            return Err(WorkflowError::archived(slug));
        }

        let change_dir = active_dir(&self.root, slug);
        if !change_dir.exists() {
            return Err(WorkflowError::no_change(slug));
        }

        let paths = ChangePaths::new(change_dir.clone());
        require_nonempty(&paths.proposal, ErrorCode::EBadShapeMissingProposal, "proposal")?;
        require_nonempty(&paths.tasks, ErrorCode::EBadShapeMissingTasks, "tasks")?;

        let meta = load_meta(&change_dir);
        let title = meta.as_ref().map(|m| m.title.clone()).unwrap_or_else(|| slug.to_string());

        let commits = self.commit_lookup.commits_touching(&change_dir);
        let tests = self.test_summary.summarize(&change_dir).unwrap_or_default();
        let files_touched = list_files_touched(&change_dir);

        let receipt = Receipt {
            actor: Actor { kind: "server".to_string(), name: "changeset-workflow".to_string() },
            api_version: self.api_version.clone(),
            archived_at: iso_now(),
            commits,
            files_touched,
            slug: slug.to_string(),
            tests,
            title,
        };
        let receipt_bytes = crate::receipt::to_canonical_json(&receipt)?;
        atomic_write(&paths.receipt, &receipt_bytes)?;

        let archive_base = self.root.join(CHANGES_DIR).join(ARCHIVE_DIR);
        fs::create_dir_all(&archive_base).map_err(WorkflowError::io)?;
        fs::rename(&change_dir, &archive_path).map_err(WorkflowError::io)?;

        let _ = fs::remove_file(archive_path.join(crate::change::LOCK_FILE));

        Ok(ChangeArchiveResult {
            api_version: self.api_version.clone(),
            slug: slug.to_string(),
            archived: true,
            receipt_path: archive_path.join(RECEIPT_FILE).display().to_string(),
            receipt,
        })
    }

    pub fn changes_active(
        &self,
        page: u32,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<ChangesActivePage> {
        let base_dir = changes_base_dir(&self.root);
        let items = pagination::scan_active_dir(&base_dir).map_err(WorkflowError::io)?;

        let result = self.pagination.paginate(items, page.max(1), page_size, cursor, None)?;

        let summaries = result
            .items
            .iter()
            .map(|item| summarize(item))
            .collect::<Vec<_>>();

        Ok(ChangesActivePage {
            page: result.page,
            page_size: result.page_size,
            total_items: result.total_items,
            has_more: result.has_more,
            next_page_token: result.next_page_token,
            modification_warning: result.modification_warning,
            items: summaries,
        })
    }

    /// Live status of a single slug, used by `resources/read` on
    /// `change://<slug>/...` URIs to tell draft/locked/archived apart
    /// before serving an artifact.
    pub fn inspect_change(&self, slug: &str) -> Option<Change> {
        let archive_path = archived_dir(&self.root, slug);
        if archive_path.exists() {
            return Some(Change {
                slug: slug.to_string(),
                status: ChangeStatus::Archived,
                paths: ChangePaths::new(archive_path),
                lock: None,
                meta: None,
            });
        }

        let change_dir = active_dir(&self.root, slug);
        if !change_dir.exists() {
            return None;
        }
        let paths = ChangePaths::new(change_dir.clone());
        Some(Change {
            slug: slug.to_string(),
            status: ChangeStatus::Draft,
            lock: lock::inspect(&paths.lock),
            meta: load_meta(&change_dir),
            paths,
        })
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn summarize(item: &pagination::Item) -> ChangeSummary {
    let meta = load_meta(&item.path);
    let paths = ChangePaths::new(item.path.clone());
    ChangeSummary {
        slug: item.slug.clone(),
        title: meta.as_ref().map(|m| m.title.clone()).unwrap_or_else(|| item.slug.clone()),
        status: ChangeStatus::Draft.as_str().to_string(),
        template: meta.as_ref().map(|m| m.template.clone()),
        owner: meta.as_ref().and_then(|m| m.owner.clone()),
        created_at: meta.as_ref().map(|m| m.created_at.clone()).unwrap_or_else(|| item.mtime_iso.clone()),
        updated_at: item.mtime_iso.clone(),
        paths: ChangeSummaryPaths {
            root: paths.root.display().to_string(),
            proposal: paths.proposal.display().to_string(),
            tasks: paths.tasks.display().to_string(),
        },
    }
}

fn load_meta(change_dir: &Path) -> Option<ChangeMeta> {
    let raw = fs::read_to_string(change_dir.join(META_FILE)).ok()?;
    serde_json::from_str(&raw).ok()
}

fn require_nonempty(path: &Path, code: ErrorCode, what: &str) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(WorkflowError::new(code, format!("{what} file is empty"))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(WorkflowError::new(code, format!("{what} file is missing")))
        }
        Err(e) => Err(WorkflowError::io(e)),
    }
}

/// List every file under `change_dir` except the server-owned sidecars
/// (lock, meta, receipt), relative to `change_dir`, sorted for determinism.
fn list_files_touched(change_dir: &Path) -> Vec<String> {
    let mut out = Vec::new();
    walk(change_dir, change_dir, &mut out);
    out.sort();
    out
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, out);
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if matches!(name, crate::change::LOCK_FILE | META_FILE | RECEIPT_FILE) {
            continue;
        }
        if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.display().to_string());
        }
    }
}

fn atomic_write(dest: &Path, bytes: &[u8]) -> Result<()> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(WorkflowError::io)?;
    let file_name = dest.file_name().and_then(|n| n.to_str()).unwrap_or("artifact");
    let tmp = parent.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));
    fs::write(&tmp, bytes).map_err(WorkflowError::io)?;
    fs::rename(&tmp, dest).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        WorkflowError::io(e)
    })
}

fn iso_now() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    chrono::DateTime::<chrono::Utc>::from_timestamp(secs as i64, 0)
        .unwrap_or_default()
        .to_rfc3339()
}
