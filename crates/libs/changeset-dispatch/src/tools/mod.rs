//! The tool registry (spec §4.7, §9's "polymorphic tool handlers"): a
//! tagged map from tool name to `{inputSchema, invoke}`. The dispatcher
//! looks up by name, rejects unknown names with `TOOL_NOT_FOUND`, validates
//! `arguments` by deserializing into the tool's param struct, then invokes.
//! No reflection — each tool is one arm of a match.

pub mod params;
pub mod schema;

use std::sync::Arc;

use changeset_core::error::{ErrorCode, Result, WorkflowError};
use changeset_core::lifecycle::WorkflowEngine;
use serde::Serialize;
use serde_json::Value;

use params::{ChangeArchiveInput, ChangeOpenInput, ChangesActiveInput};

#[derive(Debug, Clone, Serialize)]
pub struct ParameterSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub required: bool,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSchema>,
}

pub const TOOL_NAMES: &[&str] = &["change.open", "change.archive", "changes.active"];

/// Static registry entries for `tools/list`.
pub fn get_tool_schemas() -> Vec<ToolSchema> {
    vec![
        schema::schema_from_params::<ChangeOpenInput>(
            "change.open",
            "Open a new draft change, or resume one this caller already holds a live lock on.",
        ),
        schema::schema_from_params::<ChangeArchiveInput>(
            "change.archive",
            "Archive a draft change, writing an immutable receipt and retiring it from active listings.",
        ),
        schema::schema_from_params::<ChangesActiveInput>(
            "changes.active",
            "List non-archived changes, paginated by cursor.",
        ),
    ]
}

fn deserialize_args<T: serde::de::DeserializeOwned>(arguments: &Value) -> Result<T> {
    serde_json::from_value(arguments.clone()).map_err(|e| {
        WorkflowError::new(ErrorCode::InvalidInput, format!("invalid arguments: {e}"))
    })
}

/// Dispatch one `tools/call` invocation by name. Returns the tool's raw
/// output value (spec §6's output shapes) on success; `WorkflowError`
/// covers both validation failures (`INVALID_INPUT`) and the workflow
/// engine's own taxonomy (`ELOCKED`, `ENOCHANGE`, ...).
pub fn call_tool(engine: &Arc<WorkflowEngine>, name: &str, arguments: &Value) -> Result<Value> {
    match name {
        "change.open" => {
            let input: ChangeOpenInput = deserialize_args(arguments)?;
            let result = engine.change_open(changeset_core::lifecycle::ChangeOpenParams {
                title: input.title,
                slug: input.slug,
                rationale: input.rationale,
                owner: input.owner,
                ttl: input.ttl,
                template: input.template,
            })?;
            serde_json::to_value(result).map_err(|e| WorkflowError::io(e.to_string()))
        }
        "change.archive" => {
            let input: ChangeArchiveInput = deserialize_args(arguments)?;
            let result = engine.change_archive(&input.slug)?;
            serde_json::to_value(result).map_err(|e| WorkflowError::io(e.to_string()))
        }
        "changes.active" => {
            let input: ChangesActiveInput = deserialize_args(arguments)?;
            let page = input.page.unwrap_or(1);
            let page_size =
                input.page_size.unwrap_or(changeset_core::pagination::DEFAULT_PAGE_SIZE);
            let result =
                engine.changes_active(page, page_size, input.next_page_token.as_deref())?;
            serde_json::to_value(result).map_err(|e| WorkflowError::io(e.to_string()))
        }
        _ => Err(WorkflowError::new(
            ErrorCode::ToolNotFound,
            format!("no such tool: {name}"),
        )),
    }
}
