//! The archive receipt (spec §3, §6): an immutable JSON document committing
//! a change's terminal state. Canonical serialization — keys alphabetical
//! within objects, arrays preserve insertion order — so two receipts built
//! from the same inputs produce byte-identical output (spec §8's "Archive
//! idempotence on receipt content").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestSummary {
    pub added: u32,
    pub passed: bool,
    pub updated: u32,
}

impl Default for TestSummary {
    fn default() -> Self {
        Self { added: 0, passed: true, updated: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Field order here is deliberately alphabetical (matching the struct's
/// `derive(Serialize)` output for a `BTreeMap`-style object) so the written
/// JSON is canonical without a second serialization pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    pub actor: Actor,
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    #[serde(rename = "archivedAt")]
    pub archived_at: String,
    pub commits: Vec<String>,
    #[serde(rename = "filesTouched")]
    pub files_touched: Vec<String>,
    pub slug: String,
    pub tests: TestSummary,
    pub title: String,
}

/// Serialize a receipt to canonical UTF-8 JSON, no trailing newline.
/// `serde_json`'s struct-field order already matches the declaration order
/// above, which we keep alphabetical, so a plain `to_vec` is canonical.
pub fn to_canonical_json(receipt: &Receipt) -> crate::error::Result<Vec<u8>> {
    serde_json::to_vec(receipt).map_err(|e| crate::error::WorkflowError::io(e.to_string()))
}
