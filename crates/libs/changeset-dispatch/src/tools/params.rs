//! Input parameter structs for the three registered tools (spec §6).
//! `JsonSchema` drives `tools/list`'s generated input schema
//! (`schema::schema_from_params`); `Deserialize` drives `tools/call`'s
//! argument validation — a malformed `arguments` object fails to
//! deserialize and is reported as `INVALID_INPUT` before it ever reaches
//! the workflow engine.

use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ChangeOpenInput {
    /// Human-readable title for the change.
    pub title: String,
    /// Directory name; must match `^[a-z0-9][a-z0-9-]{1,62}[a-z0-9]$`.
    pub slug: String,
    /// Optional rationale rendered into the proposal template.
    pub rationale: Option<String>,
    /// Lock owner identity; defaults to an anonymous placeholder.
    pub owner: Option<String>,
    /// Lock TTL in seconds, clamped to 60..=86400.
    pub ttl: Option<i64>,
    /// One of `feature`, `bugfix`, `chore`; defaults to `feature`.
    pub template: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ChangeArchiveInput {
    /// Slug of the change to archive.
    pub slug: String,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangesActiveInput {
    /// 1-based page number, used only when no cursor is supplied.
    pub page: Option<u32>,
    /// Page size, clamped to 1..=200; defaults to 50.
    pub page_size: Option<usize>,
    /// Opaque continuation token from a prior page's `nextPageToken`.
    pub next_page_token: Option<String>,
}
