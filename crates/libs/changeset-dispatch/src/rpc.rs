//! JSON-RPC 2.0 request/response framing and method routing (spec §4.7).
//! Transport-agnostic: both the stdio transport (one request per line) and
//! the HTTP transport (one request per `/sse` or `/mcp` POST body) build a
//! `JsonRpcRequest` from their own framing and hand it to `Dispatcher::dispatch`.

use std::sync::Arc;

use changeset_core::error::{ErrorCode, Result, WorkflowError};
use changeset_core::lifecycle::WorkflowEngine;
use changeset_core::memory::MemoryMonitor;
use changeset_core::validator::ValidationLimits;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{resources, tools};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn default_jsonrpc_version() -> String {
    "2.0".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorObj {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&WorkflowError> for JsonRpcErrorObj {
    fn from(err: &WorkflowError) -> Self {
        let mut data = json!({ "code": err.code.as_str() });
        if let Some(hint) = &err.hint {
            data["hint"] = json!(hint);
        }
        if let Some(details) = &err.details {
            data["details"] = details.clone();
        }
        Self { code: err.code.jsonrpc_code(), message: err.message.clone(), data: Some(data) }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObj>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(result), error: None }
    }

    pub fn failure(id: Value, err: &WorkflowError) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: None, error: Some(err.into()) }
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ResourceReadParams {
    uri: String,
}

/// Binds the tool registry and resource reader to the five JSON-RPC
/// methods spec §4.7 names. Stateless beyond the shared `WorkflowEngine`,
/// so it is safe to invoke concurrently from multiple HTTP connections.
pub struct Dispatcher {
    pub engine: Arc<WorkflowEngine>,
    pub uri_limits: ValidationLimits,
    pub memory: Arc<MemoryMonitor>,
}

impl Dispatcher {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            engine,
            uri_limits: ValidationLimits::default(),
            memory: MemoryMonitor::new(
                changeset_core::memory::DEFAULT_WARNING_THRESHOLD,
                changeset_core::memory::DEFAULT_CRITICAL_THRESHOLD,
            ),
        }
    }

    pub async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        match self.handle(&request.method, request.params).await {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(err) => {
                tracing::warn!(code = err.code.as_str(), method = %request.method, "request failed");
                JsonRpcResponse::failure(id, &err)
            }
        }
    }

    async fn handle(&self, method: &str, params: Value) -> Result<Value> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": { "name": "changeset-workflow", "version": env!("CARGO_PKG_VERSION") },
            })),
            "tools/list" => {
                let schemas = tools::get_tool_schemas();
                serde_json::to_value(json!({ "tools": schemas })).map_err(|e| WorkflowError::io(e.to_string()))
            }
            "tools/call" => {
                let call: ToolCallParams = serde_json::from_value(params).map_err(|e| {
                    WorkflowError::new(ErrorCode::InvalidInput, format!("malformed tools/call params: {e}"))
                })?;
                tools::call_tool(&self.engine, &call.name, &call.arguments)
            }
            "resources/list" => {
                let descriptors = resources::list();
                serde_json::to_value(json!({ "resources": descriptors })).map_err(|e| WorkflowError::io(e.to_string()))
            }
            "resources/read" => {
                let read: ResourceReadParams = serde_json::from_value(params).map_err(|e| {
                    WorkflowError::new(ErrorCode::InvalidInput, format!("malformed resources/read params: {e}"))
                })?;
                resources::read(&self.engine, &read.uri, &self.uri_limits, &self.memory).await
            }
            other => Err(WorkflowError::new(ErrorCode::MethodNotFound, format!("no such method: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use changeset_core::git_collab::NullCommitLookup;
    use changeset_core::pagination::Pagination;
    use changeset_core::template::DefaultTemplateRenderer;
    use changeset_core::test_collab::NoTestSummary;

    fn dispatcher() -> Dispatcher {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = Arc::new(WorkflowEngine {
            root: dir.into_path(),
            api_version: "1.0".to_string(),
            template_renderer: Arc::new(DefaultTemplateRenderer::default()),
            commit_lookup: Arc::new(NullCommitLookup),
            test_summary: Arc::new(NoTestSummary),
            pagination: Pagination::default(),
        });
        Dispatcher::new(engine)
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let d = dispatcher();
        let req = JsonRpcRequest { jsonrpc: "2.0".into(), id: json!(1), method: "initialize".into(), params: Value::Null };
        let first = d.dispatch(req.clone()).await;
        let second = d.dispatch(req).await;
        assert!(first.result.is_some());
        assert!(second.result.is_some());
    }

    #[tokio::test]
    async fn unknown_method_maps_to_method_not_found() {
        let d = dispatcher();
        let req = JsonRpcRequest { jsonrpc: "2.0".into(), id: json!(1), method: "bogus/method".into(), params: Value::Null };
        let resp = d.dispatch(req).await;
        assert_eq!(resp.error.expect("error").code, -32601);
    }

    #[tokio::test]
    async fn tools_call_round_trips_through_dispatcher() {
        let d = dispatcher();
        let req = JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: json!(2),
            method: "tools/call".into(),
            params: json!({ "name": "change.open", "arguments": { "title": "Add auth", "slug": "add-auth", "owner": "u" } }),
        };
        let resp = d.dispatch(req).await;
        let result = resp.result.expect("result");
        assert_eq!(result["created"], true);
    }

    #[tokio::test]
    async fn invalid_slug_surfaces_as_application_error() {
        let d = dispatcher();
        let req = JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: json!(3),
            method: "tools/call".into(),
            params: json!({ "name": "change.open", "arguments": { "title": "x", "slug": "../../etc/passwd" } }),
        };
        let resp = d.dispatch(req).await;
        let error = resp.error.expect("error");
        assert_eq!(error.code, -32602);
    }
}
