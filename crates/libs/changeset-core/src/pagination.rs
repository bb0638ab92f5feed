//! Cursor-based pagination engine (spec §4.5). Offset pagination skips or
//! duplicates items under concurrent mutation; this engine instead sorts by
//! a composite key and treats the cursor as a lower bound, not an identity,
//! so a page always resumes from "the next item after the cursor" even if
//! the cursor's own item was deleted between pages.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{ErrorCode, Result, WorkflowError};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 200;
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;
const MAX_TOKEN_BYTES: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortKey {
    /// `<mtime-ISO8601>_<slug>` composite, descending by mtime (negated via
    /// the deriving `Ord` + a reversed comparison at call sites), ascending
    /// by slug as the tie-break.
    pub mtime_iso: String,
    pub slug: String,
}

impl SortKey {
    pub fn render(&self) -> String {
        format!("{}_{}", self.mtime_iso, self.slug)
    }
}

#[derive(Debug, Clone)]
pub struct Item {
    pub slug: String,
    pub mtime_iso: String,
    pub path: std::path::PathBuf,
}

impl Item {
    fn sort_key(&self) -> SortKey {
        SortKey {
            mtime_iso: self.mtime_iso.clone(),
            slug: self.slug.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenPayload {
    page: u32,
    timestamp: i64,
    sort_key: String,
}

#[derive(Debug, Clone)]
pub struct PageToken {
    pub page: u32,
    pub created_at: i64,
    pub sort_key: String,
}

pub struct Pagination {
    pub token_ttl_secs: i64,
    pub signing_key: Option<Vec<u8>>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            signing_key: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page {
    pub page: u32,
    pub page_size: usize,
    pub total_items: usize,
    pub has_more: bool,
    pub next_page_token: Option<String>,
    pub items: Vec<Item>,
    pub modification_warning: bool,
}

impl Pagination {
    pub fn encode_token(&self, payload_page: u32, sort_key: &str, now: i64) -> Result<String> {
        let payload = TokenPayload {
            page: payload_page,
            timestamp: now,
            sort_key: sort_key.to_string(),
        };
        let json = serde_json::to_vec(&payload).map_err(|e| WorkflowError::io(e.to_string()))?;
        let encoded = URL_SAFE_NO_PAD.encode(&json);

        if let Some(key) = &self.signing_key {
            let mut mac = Hmac::<Sha256>::new_from_slice(key)
                .map_err(|e| WorkflowError::io(e.to_string()))?;
            mac.update(encoded.as_bytes());
            let sig = mac.finalize().into_bytes();
            let sig_b64 = URL_SAFE_NO_PAD.encode(sig);
            Ok(format!("{encoded}.{sig_b64}"))
        } else {
            Ok(encoded)
        }
    }

    pub fn decode_token(&self, token: &str, now: i64) -> Result<PageToken> {
        if token.len() > MAX_TOKEN_BYTES {
            return Err(WorkflowError::new(ErrorCode::InvalidCursorToken, "token exceeds max size"));
        }

        let (encoded, sig) = match token.split_once('.') {
            Some((e, s)) => (e, Some(s)),
            None => (token, None),
        };

        if let Some(key) = &self.signing_key {
            let provided_sig = sig.ok_or_else(|| {
                WorkflowError::new(ErrorCode::InvalidCursorToken, "missing signature on signed token")
            })?;
            let mut mac = Hmac::<Sha256>::new_from_slice(key)
                .map_err(|e| WorkflowError::io(e.to_string()))?;
            mac.update(encoded.as_bytes());
            let expected = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
            if expected != provided_sig {
                return Err(WorkflowError::new(ErrorCode::InvalidCursorToken, "signature mismatch"));
            }
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| WorkflowError::new(ErrorCode::InvalidCursorToken, "malformed base64"))?;
        let payload: TokenPayload = serde_json::from_slice(&bytes)
            .map_err(|_| WorkflowError::new(ErrorCode::InvalidCursorToken, "malformed payload"))?;

        if now - payload.timestamp > self.token_ttl_secs {
            return Err(WorkflowError::new(ErrorCode::ExpiredCursorToken, "token expired"));
        }

        Ok(PageToken {
            page: payload.page,
            created_at: payload.timestamp,
            sort_key: payload.sort_key,
        })
    }

    /// Compute one page of `items` (already scanned and filtered to
    /// non-archived). `items` need not be pre-sorted; this sorts them by
    /// the composite key (descending mtime, ascending slug, then path).
    pub fn paginate(
        &self,
        mut items: Vec<Item>,
        page: u32,
        page_size: usize,
        cursor: Option<&str>,
        epoch_total_at_start: Option<usize>,
    ) -> Result<Page> {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let now = now_epoch_secs();

        items.sort_by(|a, b| {
            b.mtime_iso
                .cmp(&a.mtime_iso)
                .then_with(|| a.slug.cmp(&b.slug))
                .then_with(|| a.path.cmp(&b.path))
        });

        let total_items = items.len();

        let start_index = if let Some(tok) = cursor {
            let decoded = self.decode_token(tok, now)?;
            match items.iter().position(|it| it.sort_key().render() == decoded.sort_key) {
                Some(idx) => idx + 1,
                None => {
                    // Cursor item deleted: it's a lower bound, not an identity —
                    // resume from the first remaining item strictly less than it
                    // (descending order means "sorts after" it lexically).
                    items
                        .iter()
                        .position(|it| it.sort_key().render() < decoded.sort_key)
                        .unwrap_or(total_items)
                }
            }
        } else {
            0
        };

        let end_index = (start_index + page_size).min(total_items);
        let slice: Vec<Item> = items[start_index..end_index].to_vec();
        let has_more = end_index < total_items;

        let next_page_token = if has_more {
            let last = slice.last().expect("has_more implies non-empty slice");
            Some(self.encode_token(page + 1, &last.sort_key().render(), now)?)
        } else {
            None
        };

        let modification_warning = epoch_total_at_start
            .map(|start_total| start_total != total_items)
            .unwrap_or(false);

        Ok(Page {
            page,
            page_size,
            total_items,
            has_more,
            next_page_token,
            items: slice,
            modification_warning,
        })
    }
}

/// Scan `base_dir` for subdirectories, excluding `archive` and hidden
/// entries, and build `(slug, mtime, path)` triples.
pub fn scan_active_dir(base_dir: &Path) -> std::io::Result<Vec<Item>> {
    let mut out = Vec::new();
    if !base_dir.exists() {
        return Ok(out);
    }
    for entry in std::fs::read_dir(base_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == crate::change::ARCHIVE_DIR || name.starts_with('.') {
            continue;
        }
        let metadata = entry.metadata()?;
        let mtime = metadata.modified().unwrap_or(UNIX_EPOCH);
        let mtime_iso = system_time_to_iso8601(mtime);
        out.push(Item {
            slug: name.to_string(),
            mtime_iso,
            path,
        });
    }
    Ok(out)
}

fn system_time_to_iso8601(t: SystemTime) -> String {
    let secs = t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    chrono::DateTime::<chrono::Utc>::from_timestamp(secs as i64, 0)
        .unwrap_or_default()
        .to_rfc3339()
}

fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn item(slug: &str, mtime_iso: &str) -> Item {
        Item {
            slug: slug.to_string(),
            mtime_iso: mtime_iso.to_string(),
            path: PathBuf::from(slug),
        }
    }

    #[test]
    fn paginates_without_duplication() {
        let pager = Pagination::default();
        let items: Vec<Item> = (0..120)
            .map(|i| item(&format!("slug-{i:03}"), "2026-01-01T00:00:00Z"))
            .collect();

        let page1 = pager.paginate(items.clone(), 1, 50, None, None).expect("page1");
        assert_eq!(page1.items.len(), 50);
        assert!(page1.has_more);

        let token = page1.next_page_token.clone().expect("token");
        let page2 = pager
            .paginate(items.clone(), 2, 50, Some(&token), None)
            .expect("page2");
        assert_eq!(page2.items.len(), 50);

        let seen: std::collections::HashSet<_> =
            page1.items.iter().chain(page2.items.iter()).map(|i| i.slug.clone()).collect();
        assert_eq!(seen.len(), 100);
    }

    #[test]
    fn cursor_survives_deleted_item() {
        let pager = Pagination::default();
        let items = vec![
            item("a", "2026-01-03T00:00:00Z"),
            item("b", "2026-01-02T00:00:00Z"),
            item("c", "2026-01-01T00:00:00Z"),
        ];
        let page1 = pager.paginate(items.clone(), 1, 1, None, None).expect("page1");
        assert_eq!(page1.items[0].slug, "a");
        let token = page1.next_page_token.unwrap();

        // "b" deleted between pages.
        let remaining = vec![items[0].clone(), items[2].clone()];
        let page2 = pager.paginate(remaining, 2, 1, Some(&token), None).expect("page2");
        assert_eq!(page2.items[0].slug, "c");
    }

    #[test]
    fn signed_token_tamper_detected() {
        let pager = Pagination {
            signing_key: Some(b"secret".to_vec()),
            ..Pagination::default()
        };
        let items = vec![item("a", "2026-01-01T00:00:00Z"), item("b", "2026-01-01T00:00:00Z")];
        let page = pager.paginate(items, 1, 1, None, None).expect("page");
        let mut token = page.next_page_token.expect("token");
        // Flip a character to simulate a one-bit mutation.
        let mut chars: Vec<char> = token.chars().collect();
        let i = chars.len() / 2;
        chars[i] = if chars[i] == 'a' { 'b' } else { 'a' };
        token = chars.into_iter().collect();

        let now = now_epoch_secs();
        assert!(pager.decode_token(&token, now).is_err());
    }

    #[test]
    fn expired_token_rejected() {
        let pager = Pagination { token_ttl_secs: 1, ..Pagination::default() };
        let token = pager.encode_token(1, "k", now_epoch_secs() - 1000).expect("encode");
        let err = pager.decode_token(&token, now_epoch_secs()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ExpiredCursorToken);
    }
}
