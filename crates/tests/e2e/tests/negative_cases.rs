//! Error-path scenarios the dispatcher must surface with the right wire code.

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

async fn call(d: &Dispatcher, method: &str, params: Value) -> changeset_dispatch::JsonRpcResponse {
    let req = JsonRpcRequest { jsonrpc: "2.0".into(), id: json!(1), method: method.into(), params };
    d.dispatch(req).await
}

#[tokio::test]
async fn path_traversal_slug_is_rejected() {
    let (_dir, d) = dispatcher();
    let resp = call(
        &d,
        "tools/call",
        json!({ "name": "change.open", "arguments": { "title": "x", "slug": "../../etc/passwd", "owner": "eve" } }),
    )
    .await;
    let error = resp.error.expect("expected an error");
    assert_eq!(error.code, -32602);
}

#[tokio::test]
async fn resource_uri_with_encoded_traversal_is_rejected() {
    let (_dir, d) = dispatcher();
    let resp = call(&d, "resources/read", json!({ "uri": "change://foo/delta/%2e%2e/secret" })).await;
    assert!(resp.error.is_some(), "double-encoded traversal must not be served");
}

#[tokio::test]
async fn archiving_a_missing_change_is_enochange() {
    let (_dir, d) = dispatcher();
    let resp = call(
        &d,
        "tools/call",
        json!({ "name": "change.archive", "arguments": TestFixtures::archive_payload("does-not-exist") }),
    )
    .await;
    let error = resp.error.expect("expected an error");
    let data = error.data.expect("error data");
    assert_eq!(data["code"], "ENOCHANGE");
}

#[tokio::test]
async fn opening_a_locked_change_under_a_different_owner_is_elocked() {
    let (_dir, d) = dispatcher();
    let slug = TestFixtures::unique_slug("contended");

    let first = call(&d, "tools/call", json!({ "name": "change.open", "arguments": TestFixtures::open_payload(&slug, "owner-a") })).await;
    assert!(first.error.is_none());

    let second = call(
        &d,
        "tools/call",
        json!({ "name": "change.open", "arguments": TestFixtures::open_payload(&slug, "owner-b") }),
    )
    .await;
    let error = second.error.expect("expected a lock conflict");
    let data = error.data.expect("error data");
    assert_eq!(data["code"], "ELOCKED");
}

#[tokio::test]
async fn reopening_an_archived_change_is_earchived() {
    let (_dir, d) = dispatcher();
    let slug = TestFixtures::unique_slug("retired");

    call(&d, "tools/call", json!({ "name": "change.open", "arguments": TestFixtures::open_payload(&slug, "owner-a") })).await;
    let archived = call(&d, "tools/call", json!({ "name": "change.archive", "arguments": TestFixtures::archive_payload(&slug) })).await;
    assert!(archived.error.is_none());

    let reopen = call(&d, "tools/call", json!({ "name": "change.open", "arguments": TestFixtures::open_payload(&slug, "owner-a") })).await;
    let error = reopen.error.expect("expected an archived conflict");
    let data = error.data.expect("error data");
    assert_eq!(data["code"], "EARCHIVED");
}

#[tokio::test]
async fn unknown_tool_name_is_tool_not_found() {
    let (_dir, d) = dispatcher();
    let resp = call(&d, "tools/call", json!({ "name": "change.teleport", "arguments": {} })).await;
    // TOOL_NOT_FOUND shares spec.md §7's INVALID_TOOL_NAME/TOOL_NOT_FOUND/INVALID_INPUT
    // row (-32602, "invalid params"); -32601 is reserved for an unrecognized
    // top-level JSON-RPC method, a distinct wire concept.
    assert_eq!(resp.error.expect("error").code, -32602);
}

#[tokio::test]
async fn unknown_jsonrpc_method_is_method_not_found() {
    let (_dir, d) = dispatcher();
    let resp = call(&d, "change.teleport", json!({})).await;
    assert_eq!(resp.error.expect("error").code, -32601);
}
