//! Stdio transport: one JSON-RPC request per line on stdin, one response
//! per line on stdout. Single-threaded and cooperative — requests are
//! handled one at a time in the order they arrive, matching the framing a
//! desktop client driving a child process over pipes expects. Every method
//! but `initialize` is rejected with `-32002` until the client has sent
//! exactly one `initialize` call; logs go to stderr so stdout stays pure
//! JSON-RPC.

use std::sync::Arc;

use anyhow::Context;
use changeset_common::config::AppConfig;
use changeset_core::git_collab::Git2CommitLookup;
use changeset_core::lifecycle::WorkflowEngine;
use changeset_core::pagination::Pagination;
use changeset_core::template::DefaultTemplateRenderer;
use changeset_core::test_collab::NoTestSummary;
use changeset_dispatch::rpc::{Dispatcher, JsonRpcErrorObj, JsonRpcRequest, JsonRpcResponse};
use changeset_dispatch::tools::{ToolSchema, get_tool_schemas};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser)]
#[command(name = "changeset-stdio")]
#[command(about = "Line-framed JSON-RPC stdio transport for the changeset workflow engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the JSON-RPC loop over stdio (default).
    Serve,
    /// Print the tool registry's JSON schemas.
    Schema {
        #[arg(short, long, default_value = "json")]
        format: String,
        #[arg(short, long)]
        output: Option<String>,
    },
    /// List available tools with their one-line descriptions.
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await,
        Commands::Schema { format, output } => export_schema(&format, output.as_deref()),
        Commands::Tools => {
            list_tools();
            Ok(())
        }
    }
}

fn build_engine() -> Arc<WorkflowEngine> {
    let config = AppConfig::from_env();
    let pagination = Pagination {
        token_ttl_secs: (config.pagination.token_ttl_hours as i64) * 3600,
        signing_key: config.pagination.signing_key.as_ref().map(|k| k.as_bytes().to_vec()),
    };
    Arc::new(WorkflowEngine {
        root: config.working_directory,
        api_version: "1.0".to_string(),
        template_renderer: Arc::new(DefaultTemplateRenderer::default()),
        commit_lookup: Arc::new(Git2CommitLookup),
        test_summary: Arc::new(NoTestSummary),
        pagination,
    })
}

async fn serve() -> anyhow::Result<()> {
    changeset_common::tracing::setup_tracing(false);

    let engine = build_engine();
    std::fs::create_dir_all(&engine.root)
        .with_context(|| format!("creating working directory {}", engine.root.display()))?;

    let dispatcher = Dispatcher::new(engine);
    dispatcher.memory.spawn_sampler();
    let mut initialized = false;

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    tracing::info!("changeset-stdio ready, awaiting requests");

    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(line) {
            Err(e) => JsonRpcResponse::failure(
                Value::Null,
                &changeset_core::error::WorkflowError::new(
                    changeset_core::error::ErrorCode::InvalidInput,
                    format!("malformed JSON-RPC request: {e}"),
                ),
            ),
            Ok(request) if !initialized && request.method != "initialize" => {
                not_initialized_response(request.id.clone())
            }
            Ok(request) => {
                let is_initialize = request.method == "initialize";
                let response = dispatcher.dispatch(request).await;
                if is_initialize && response.error.is_none() {
                    initialized = true;
                }
                response
            }
        };

        let mut serialized = serde_json::to_string(&response).unwrap_or_else(|e| {
            json!({"jsonrpc": "2.0", "id": Value::Null, "error": {"code": -32603, "message": e.to_string()}})
                .to_string()
        });
        serialized.push('\n');
        stdout.write_all(serialized.as_bytes()).await.context("writing stdout")?;
        stdout.flush().await.context("flushing stdout")?;
    }

    tracing::info!("stdin closed, shutting down");
    Ok(())
}

fn not_initialized_response(id: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id,
        result: None,
        error: Some(JsonRpcErrorObj {
            code: -32002,
            message: "server not initialized: send `initialize` first".to_string(),
            data: None,
        }),
    }
}

fn export_schema(format: &str, output: Option<&str>) -> anyhow::Result<()> {
    let schemas = get_tool_schemas();
    let content = match format {
        "markdown" | "md" => generate_markdown_docs(&schemas),
        _ => serde_json::to_string_pretty(&schemas)?,
    };

    match output {
        Some(path) => {
            std::fs::write(path, &content)?;
            eprintln!("schema written to {path}");
        }
        None => println!("{content}"),
    }
    Ok(())
}

fn list_tools() {
    let schemas = get_tool_schemas();
    println!("changeset tools ({} total)\n", schemas.len());
    println!("{:<20} {}", "TOOL", "DESCRIPTION");
    println!("{}", "-".repeat(72));
    for schema in &schemas {
        println!("{:<20} {}", schema.name, schema.description);
    }
}

fn generate_markdown_docs(schemas: &[ToolSchema]) -> String {
    let mut md = String::from("# changeset workflow tools\n\n");
    md.push_str(&format!("Total tools: {}\n\n", schemas.len()));
    for schema in schemas {
        md.push_str(&format!("## {}\n\n{}\n\n", schema.name, schema.description));
        if !schema.parameters.is_empty() {
            md.push_str("| Name | Type | Required | Description |\n");
            md.push_str("|------|------|----------|-------------|\n");
            for param in &schema.parameters {
                md.push_str(&format!(
                    "| `{}` | {} | {} | {} |\n",
                    param.name,
                    param.param_type,
                    if param.required { "Yes" } else { "No" },
                    param.description
                ));
            }
            md.push('\n');
        }
    }
    md
}
