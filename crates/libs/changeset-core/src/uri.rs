//! Resource URI parser (spec §4.4): `changes://active[?query]` and
//! `change://<slug>[/path...][?query][#fragment]`. Hand-rolled rather than
//! built on a general URL crate because the security checks here (raw *and*
//! decoded traversal detection, segment/query caps) must run over both the
//! pre- and post-decode forms of each segment — a generic URL parser would
//! only give us the decoded form.

use std::collections::BTreeMap;

use crate::error::{ErrorCode, Result, WorkflowError};
use crate::mime::{self, DEFAULT_MIME};
use crate::validator::{self, ValidationLimits, validate_slug};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UriSecurity {
    pub has_path_traversal: bool,
    pub has_invalid_slug: bool,
    pub has_invalid_query_params: bool,
    pub warnings: Vec<String>,
}

impl UriSecurity {
    pub fn is_clean(&self) -> bool {
        !self.has_path_traversal && !self.has_invalid_slug && !self.has_invalid_query_params
    }
}

#[derive(Debug, Clone)]
pub struct ResourceUri {
    pub scheme: String,
    pub host: String,
    pub path_segments: Vec<String>,
    pub query: BTreeMap<String, String>,
    pub fragment: Option<String>,
    pub mime: &'static str,
    pub security: UriSecurity,
}

impl ResourceUri {
    /// The slug for `change://` URIs is the host segment.
    pub fn slug(&self) -> Option<&str> {
        if self.scheme == "change" {
            Some(self.host.as_str())
        } else {
            None
        }
    }

    /// Path segments after the slug (the artifact path within the change).
    pub fn artifact_segments(&self) -> &[String] {
        &self.path_segments
    }
}

/// Parse a resource URI. Returns `INVALID_SCHEME`/`INVALID_FORMAT` for
/// structurally malformed input; any traversal/invalid-slug/invalid-query
/// condition is recorded in `security` rather than rejected here — the
/// workflow engine decides policy (spec: "the parser never rejects solely
/// on warnings").
pub fn parse(raw: &str, limits: &ValidationLimits) -> Result<ResourceUri> {
    let sentinel = "://";
    let Some(scheme_end) = raw.find(sentinel) else {
        return Err(WorkflowError::new(ErrorCode::InvalidFormat, "missing scheme sentinel `://`"));
    };
    let scheme = &raw[..scheme_end];
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(WorkflowError::new(ErrorCode::InvalidFormat, "scheme must be alphanumeric"));
    }
    if scheme != "changes" && scheme != "change" {
        return Err(WorkflowError::new(
            ErrorCode::InvalidScheme,
            format!("unsupported scheme: {scheme}"),
        ));
    }

    let rest = &raw[scheme_end + sentinel.len()..];

    // Split off fragment, then query, leaving the bare path.
    let (path_and_query, fragment) = match rest.split_once('#') {
        Some((p, f)) => (p, Some(f.to_string())),
        None => (rest, None),
    };
    let (path_part, raw_query) = match path_and_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_and_query, None),
    };

    let mut security = UriSecurity::default();

    if let Some(q) = raw_query {
        if limits.check_query(q).is_err() {
            security.has_invalid_query_params = true;
            security.warnings.push("query string exceeds max length".to_string());
        }
    }

    let mut raw_segments: Vec<&str> = path_part.split('/').filter(|s| !s.is_empty()).collect();
    if raw_segments.is_empty() {
        return Err(WorkflowError::new(ErrorCode::InvalidFormat, "URI missing host segment"));
    }
    let host_raw = raw_segments.remove(0);

    if limits.check_segments(&raw_segments).is_err() {
        security.warnings.push(format!(
            "path has {} segments, exceeding max {}",
            raw_segments.len(),
            limits.max_segments
        ));
    }

    for seg in std::iter::once(&host_raw).chain(raw_segments.iter()) {
        if validator::contains_traversal_marker(seg) {
            security.has_path_traversal = true;
            security.warnings.push(format!("segment carries a traversal marker: {seg}"));
        }
    }

    let host = validator::percent_decode(host_raw);
    let path_segments: Vec<String> = raw_segments.iter().map(|s| validator::percent_decode(s)).collect();

    for seg in std::iter::once(&host).chain(path_segments.iter()) {
        if validator::contains_traversal_marker(seg) {
            security.has_path_traversal = true;
            security.warnings.push(format!("decoded segment carries a traversal marker: {seg}"));
        }
    }

    if scheme == "change" && validate_slug(&host).is_err() {
        security.has_invalid_slug = true;
        security.warnings.push(format!("invalid slug: {host}"));
    }

    let mut query = BTreeMap::new();
    if let Some(q) = raw_query {
        for pair in q.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let key = validator::percent_decode(k);
            let value = validator::percent_decode(v);
            if limits.check_query_value(&value).is_err() {
                security.has_invalid_query_params = true;
                security.warnings.push(format!("query value too long for key: {key}"));
            }
            if validator::contains_traversal_marker(&value) {
                security.has_path_traversal = true;
                security.warnings.push(format!("query value carries a traversal marker: {key}"));
            }
            query.insert(key, value);
        }
    }

    let mime = path_segments
        .last()
        .map(|s| mime::infer(s))
        .unwrap_or(DEFAULT_MIME);

    Ok(ResourceUri {
        scheme: scheme.to_string(),
        host,
        path_segments,
        query,
        fragment,
        mime,
        security,
    })
}
