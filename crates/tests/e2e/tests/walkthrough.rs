//! Full change lifecycle over the JSON-RPC dispatcher: initialize, open a
//! draft, list it, read its proposal resource, archive it, and confirm it
//! drops out of the active listing.

use std::sync::Arc;

use changeset_core::git_collab::NullCommitLookup;
use changeset_core::lifecycle::WorkflowEngine;
use changeset_core::pagination::Pagination;
use changeset_core::template::DefaultTemplateRenderer;
use changeset_core::test_collab::NoTestSummary;
use changeset_dispatch::rpc::{Dispatcher, JsonRpcRequest};
use changeset_e2e::TestFixtures;
use serde_json::{json, Value};

fn dispatcher() -> (tempfile::TempDir, Dispatcher) {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = Arc::new(WorkflowEngine {
        root: dir.path().to_path_buf(),
        api_version: "1.0".to_string(),
        template_renderer: Arc::new(DefaultTemplateRenderer::default()),
        commit_lookup: Arc::new(NullCommitLookup),
        test_summary: Arc::new(NoTestSummary),
        pagination: Pagination::default(),
    });
    (dir, Dispatcher::new(engine))
}

async fn call(d: &Dispatcher, method: &str, params: Value) -> Value {
    let req = JsonRpcRequest { jsonrpc: "2.0".into(), id: json!(1), method: method.into(), params };
    let resp = d.dispatch(req).await;
    resp.result.unwrap_or_else(|| panic!("{method} failed: {:?}", resp.error))
}

#[tokio::test]
async fn open_list_read_archive_round_trip() {
    let (_dir, d) = dispatcher();
    let slug = TestFixtures::unique_slug("feature");

    let opened = call(
        &d,
        "tools/call",
        json!({ "name": "change.open", "arguments": TestFixtures::open_payload(&slug, "alice") }),
    )
    .await;
    assert_eq!(opened["created"], true);
    assert_eq!(opened["status"], "draft");

    let listed = call(&d, "tools/call", json!({ "name": "changes.active", "arguments": {} })).await;
    let items = listed["items"].as_array().expect("items array");
    assert!(items.iter().any(|i| i["slug"] == slug));

    let proposal_uri = format!("change://{slug}/proposal");
    let read = call(&d, "resources/read", json!({ "uri": proposal_uri })).await;
    let text = read["contents"][0]["text"].as_str().expect("proposal text");
    assert!(text.contains(&slug), "proposal should mention the slug: {text}");

    let archived = call(
        &d,
        "tools/call",
        json!({ "name": "change.archive", "arguments": TestFixtures::archive_payload(&slug) }),
    )
    .await;
    assert_eq!(archived["archived"], true);

    let listed_after = call(&d, "tools/call", json!({ "name": "changes.active", "arguments": {} })).await;
    let items_after = listed_after["items"].as_array().expect("items array");
    assert!(!items_after.iter().any(|i| i["slug"] == slug), "archived change must drop out of the active listing");
}

#[tokio::test]
async fn resume_by_same_owner_does_not_recreate() {
    let (_dir, d) = dispatcher();
    let slug = TestFixtures::unique_slug("bugfix");
    let payload = TestFixtures::open_payload(&slug, "bob");

    let first = call(&d, "tools/call", json!({ "name": "change.open", "arguments": payload.clone() })).await;
    assert_eq!(first["created"], true);

    let second = call(&d, "tools/call", json!({ "name": "change.open", "arguments": payload })).await;
    assert_eq!(second["created"], false, "same owner resuming an open draft should not recreate it");
}
