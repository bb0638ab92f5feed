//! `resources/list` and `resources/read` (spec §4.7, §4.4, §6). Resource
//! URIs name either a listing (`changes://active`) or an artifact within a
//! change (`change://<slug>/proposal|tasks|delta/<relpath>`); both are
//! served through this one dispatcher method so a client never needs to
//! know which backing subsystem (pagination engine vs. streaming reader)
//! answered the read.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use changeset_core::change::{DELTA_DIR, PROPOSAL_FILE, TASKS_FILE};
use changeset_core::error::{ErrorCode, Result, WorkflowError};
use changeset_core::lifecycle::WorkflowEngine;
use changeset_core::memory::MemoryMonitor;
use changeset_core::streaming::{
    BackpressureLevel, ErrorClass, ResourcePriority, StreamingReader, backpressure_score,
    read_buffered, should_stream,
};
use changeset_core::uri::{self, ResourceUri};
use changeset_core::validator::ValidationLimits;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct ResourceDescriptor {
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Registered schemes and example URIs (spec §4.7's `resources/list`:
/// "enumerate the registered resource URI schemes and example URIs").
pub fn list() -> Vec<ResourceDescriptor> {
    vec![
        ResourceDescriptor {
            uri_template: "changes://active[?page&pageSize&nextPageToken]".to_string(),
            description: "Paginated listing of non-archived changes.".to_string(),
            mime_type: "application/json".to_string(),
        },
        ResourceDescriptor {
            uri_template: "change://<slug>/proposal".to_string(),
            description: "The change's proposal document.".to_string(),
            mime_type: "text/markdown".to_string(),
        },
        ResourceDescriptor {
            uri_template: "change://<slug>/tasks".to_string(),
            description: "The change's task list.".to_string(),
            mime_type: "text/markdown".to_string(),
        },
        ResourceDescriptor {
            uri_template: "change://<slug>/delta/<relpath>".to_string(),
            description: "An artifact from the change's delta subtree; MIME inferred from the suffix.".to_string(),
            mime_type: "application/octet-stream".to_string(),
        },
    ]
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceContent {
    pub uri: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

fn is_text_mime(mime: &str) -> bool {
    mime.starts_with("text/") || mime == "application/json" || mime == "application/yaml"
        || mime == "application/toml" || mime == "image/svg+xml"
}

/// Read one resource URI. Security flags from the parser are enforced
/// here (spec §3's "carries a path-traversal warning and must be refused
/// by the workflow engine") — the parser itself never rejects on warnings.
pub async fn read(
    engine: &Arc<WorkflowEngine>,
    raw_uri: &str,
    limits: &ValidationLimits,
    memory: &Arc<MemoryMonitor>,
) -> Result<Value> {
    let parsed = uri::parse(raw_uri, limits)?;

    if parsed.security.has_path_traversal {
        return Err(WorkflowError::path_escape(format!(
            "resource URI carries a traversal marker: {raw_uri}"
        )));
    }

    match parsed.scheme.as_str() {
        "changes" => read_listing(engine, &parsed).await,
        "change" => read_artifact(engine, &parsed, raw_uri, memory).await,
        other => Err(WorkflowError::new(ErrorCode::InvalidScheme, format!("unsupported scheme: {other}"))),
    }
}

async fn read_listing(engine: &Arc<WorkflowEngine>, parsed: &ResourceUri) -> Result<Value> {
    let page: u32 = parsed
        .query
        .get("page")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let page_size: usize = parsed
        .query
        .get("pageSize")
        .and_then(|v| v.parse().ok())
        .unwrap_or(changeset_core::pagination::DEFAULT_PAGE_SIZE);
    let cursor = parsed.query.get("nextPageToken").map(String::as_str);

    let result = engine.changes_active(page, page_size, cursor)?;
    serde_json::to_value(result).map_err(|e| WorkflowError::io(e.to_string()))
}

async fn read_artifact(
    engine: &Arc<WorkflowEngine>,
    parsed: &ResourceUri,
    raw_uri: &str,
    memory: &Arc<MemoryMonitor>,
) -> Result<Value> {
    if parsed.security.has_invalid_slug {
        return Err(WorkflowError::bad_slug(format!(
            "resource URI names an invalid slug: {raw_uri}"
        )));
    }
    let slug = parsed.slug().ok_or_else(|| {
        WorkflowError::new(ErrorCode::InvalidFormat, "change:// URI missing slug host segment")
    })?;
    changeset_core::validator::validate_slug(slug)?;

    let found = engine
        .inspect_change(slug)
        .ok_or_else(|| WorkflowError::no_change(slug))?;

    let segments = parsed.artifact_segments();
    // Delta artifacts tend to be the bulkiest reads (whole touched files,
    // not short documents) and are the least time-critical to a caller
    // mid-review, so they're the first thing released under critical
    // memory pressure; proposal/tasks stay at normal priority.
    let (rel_path, priority): (PathBuf, ResourcePriority) = match segments.first().map(String::as_str) {
        Some("proposal") => (PathBuf::from(PROPOSAL_FILE), ResourcePriority::Normal),
        Some("tasks") => (PathBuf::from(TASKS_FILE), ResourcePriority::Normal),
        Some("delta") => {
            let mut p = PathBuf::from(DELTA_DIR);
            for seg in &segments[1..] {
                p.push(seg);
            }
            (p, ResourcePriority::Low)
        }
        _ => {
            return Err(WorkflowError::new(
                ErrorCode::InvalidFormat,
                "change:// URI must name proposal, tasks, or a delta/<relpath>",
            ));
        }
    };

    let file_path = found.paths.root.join(&rel_path);
    if !changeset_core::validator::is_within_root(&found.paths.root, &file_path) {
        return Err(WorkflowError::path_escape("artifact path escapes the change directory"));
    }

    let bytes = read_artifact_bytes(&file_path, memory, priority).await?;
    let file_name = rel_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("artifact");
    let mime = changeset_core::mime::infer(file_name);

    let content = if is_text_mime(mime) {
        ResourceContent {
            uri: raw_uri.to_string(),
            mime_type: mime.to_string(),
            text: Some(String::from_utf8_lossy(&bytes).into_owned()),
            blob: None,
        }
    } else {
        use base64::Engine as _;
        ResourceContent {
            uri: raw_uri.to_string(),
            mime_type: mime.to_string(),
            text: None,
            blob: Some(base64::engine::general_purpose::STANDARD.encode(&bytes)),
        }
    };

    serde_json::to_value(content).map_err(|e| WorkflowError::io(e.to_string()))
}

/// Materialize one artifact's bytes, routing through the streaming reader
/// above the threshold (spec §4.6) and a plain buffered read below it —
/// both paths are byte-identical for the same file (spec §8's streaming
/// equivalence property). The streaming path consults a real
/// `MemoryMonitor` snapshot both for the stream/no-stream decision and for
/// pacing each chunk against the measured backpressure band.
async fn read_artifact_bytes(
    path: &Path,
    memory: &Arc<MemoryMonitor>,
    priority: ResourcePriority,
) -> Result<Vec<u8>> {
    let metadata = tokio::fs::metadata(path).await.map_err(WorkflowError::io)?;
    let pressure = memory.snapshot();
    if !should_stream(metadata.len(), pressure) {
        return read_buffered(path).await;
    }

    let guard = memory.register_stream(priority);
    let mut reader = StreamingReader::open(path, pressure).await?;
    let mut out = Vec::with_capacity(reader.file_size() as usize);
    let mut last_chunk_ms = 0.0_f64;
    let mut retries_left = 2u8;

    loop {
        if guard.should_abort() {
            return Err(WorkflowError::new(
                ErrorCode::EIo,
                "stream released under critical memory pressure",
            )
            .with_hint("retry the read once pressure subsides"));
        }

        let score = backpressure_score(memory.heap_used_pct(), memory.active_stream_count(), last_chunk_ms);
        let level = BackpressureLevel::from_score(score);
        if level == BackpressureLevel::Critical {
            return Err(WorkflowError::new(ErrorCode::EIo, "stream aborted: critical backpressure"));
        }
        let delay = level.inter_chunk_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let throughput_mib_s = if last_chunk_ms > 0.0 {
            (reader.file_size().min(u32::MAX as u64) as f64 / (1024.0 * 1024.0)) / (last_chunk_ms / 1000.0)
        } else {
            f64::INFINITY
        };

        let started = Instant::now();
        match reader.next_chunk(throughput_mib_s).await {
            Ok(Some(chunk)) => {
                last_chunk_ms = started.elapsed().as_secs_f64() * 1000.0;
                let is_last = chunk.is_last;
                out.extend_from_slice(&chunk.bytes);
                if is_last {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                let class = ErrorClass::from_error_code(err.code);
                if class.is_retryable() && retries_left > 0 {
                    retries_left -= 1;
                    if let Some(checkpoint) = reader.checkpoint().cloned() {
                        reader = StreamingReader::resume(&checkpoint, pressure).await.map_err(|_| err)?;
                        continue;
                    }
                }
                return Err(err);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use changeset_core::git_collab::NullCommitLookup;
    use changeset_core::lifecycle::ChangeOpenParams;
    use changeset_core::pagination::Pagination;
    use changeset_core::template::DefaultTemplateRenderer;
    use changeset_core::test_collab::NoTestSummary;

    fn engine() -> (tempfile::TempDir, Arc<WorkflowEngine>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = Arc::new(WorkflowEngine {
            root: dir.path().to_path_buf(),
            api_version: "1.0".to_string(),
            template_renderer: Arc::new(DefaultTemplateRenderer::default()),
            commit_lookup: Arc::new(NullCommitLookup),
            test_summary: Arc::new(NoTestSummary),
            pagination: Pagination::default(),
        });
        (dir, engine)
    }

    fn memory() -> Arc<MemoryMonitor> {
        MemoryMonitor::new(
            changeset_core::memory::DEFAULT_WARNING_THRESHOLD,
            changeset_core::memory::DEFAULT_CRITICAL_THRESHOLD,
        )
    }

    #[tokio::test]
    async fn reads_proposal_as_markdown() {
        let (_dir, engine) = engine();
        engine
            .change_open(ChangeOpenParams {
                title: "Add auth".to_string(),
                slug: "add-auth".to_string(),
                rationale: None,
                owner: Some("u".to_string()),
                ttl: None,
                template: None,
            })
            .expect("open");

        let limits = ValidationLimits::default();
        let value = read(&engine, "change://add-auth/proposal", &limits, &memory()).await.expect("read");
        assert_eq!(value["mimeType"], "text/markdown");
        assert!(value["text"].as_str().unwrap().contains("Add auth"));
    }

    #[tokio::test]
    async fn traversal_uri_is_refused() {
        let (_dir, engine) = engine();
        let limits = ValidationLimits::default();
        let err = read(&engine, "change://../../etc/passwd/proposal", &limits, &memory())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::EPathEscape);
    }

    #[tokio::test]
    async fn listing_uri_delegates_to_pagination() {
        let (_dir, engine) = engine();
        engine
            .change_open(ChangeOpenParams {
                title: "Add auth".to_string(),
                slug: "add-auth".to_string(),
                rationale: None,
                owner: Some("u".to_string()),
                ttl: None,
                template: None,
            })
            .expect("open");

        let limits = ValidationLimits::default();
        let value = read(&engine, "changes://active", &limits, &memory()).await.expect("read");
        assert_eq!(value["items"][0]["slug"], "add-auth");
    }
}
