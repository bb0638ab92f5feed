//! Test fixtures for creating change payloads.

use uuid::Uuid;

pub struct TestFixtures;

impl TestFixtures {
    /// A unique slug so parallel test runs never collide on disk.
    pub fn unique_slug(prefix: &str) -> String {
        format!("{prefix}-{}", &Uuid::new_v4().to_string()[..8])
    }

    pub fn open_payload(slug: &str, owner: &str) -> serde_json::Value {
        serde_json::json!({
            "title": format!("Add {slug}"),
            "slug": slug,
            "owner": owner,
            "rationale": "exercised by an end-to-end test",
        })
    }

    pub fn archive_payload(slug: &str) -> serde_json::Value {
        serde_json::json!({ "slug": slug })
    }
}
