//! Administrative CLI for the workflow engine: open/archive/list changes
//! directly against a root directory, without running either transport.
//! Useful for scripting and for inspecting the tool registry's schemas —
//! it does not select or launch `changeset-http`/`changeset-stdio`, which
//! is left to whatever process manager or shell invokes them.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use changeset_core::git_collab::Git2CommitLookup;
use changeset_core::lifecycle::{ChangeOpenParams, WorkflowEngine};
use changeset_core::pagination::{DEFAULT_PAGE_SIZE, Pagination};
use changeset_core::template::DefaultTemplateRenderer;
use changeset_core::test_collab::NoTestSummary;
use changeset_dispatch::tools::{ToolSchema, get_tool_schemas};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "changeset-cli")]
#[command(about = "Administrative CLI for the changeset workflow engine")]
#[command(version)]
struct Cli {
    /// Root directory containing the `changes/` tree.
    #[arg(long, env = "CHANGESET_ROOT", default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a new draft change (or resume one this owner already holds).
    Open {
        #[arg(long)]
        title: String,
        #[arg(long)]
        slug: String,
        #[arg(long)]
        rationale: Option<String>,
        #[arg(long, default_value = "anonymous")]
        owner: String,
        #[arg(long)]
        ttl: Option<i64>,
        #[arg(long)]
        template: Option<String>,
    },
    /// Archive a draft change and write its receipt.
    Archive {
        slug: String,
    },
    /// List non-archived changes.
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
        #[arg(long)]
        cursor: Option<String>,
    },
    /// Print the tool registry's JSON schemas.
    ToolsSchema,
    /// List available tools with their one-line descriptions.
    ToolsList,
}

fn main() -> anyhow::Result<()> {
    changeset_common::tracing::setup_tracing(false);
    let cli = Cli::parse();

    match cli.command {
        Commands::ToolsSchema => {
            println!("{}", serde_json::to_string_pretty(&get_tool_schemas())?);
            return Ok(());
        }
        Commands::ToolsList => {
            print_tool_list(&get_tool_schemas());
            return Ok(());
        }
        _ => {}
    }

    let engine = build_engine(cli.root)?;

    match cli.command {
        Commands::Open { title, slug, rationale, owner, ttl, template } => {
            let result = engine.change_open(ChangeOpenParams {
                title,
                slug,
                rationale,
                owner: Some(owner),
                ttl,
                template,
            })?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Archive { slug } => {
            let result = engine.change_archive(&slug)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::List { page, page_size, cursor } => {
            let result = engine.changes_active(page, page_size, cursor.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::ToolsSchema | Commands::ToolsList => unreachable!("handled above"),
    }

    Ok(())
}

fn build_engine(root: PathBuf) -> anyhow::Result<Arc<WorkflowEngine>> {
    std::fs::create_dir_all(&root).with_context(|| format!("creating working directory {}", root.display()))?;
    Ok(Arc::new(WorkflowEngine {
        root,
        api_version: "1.0".to_string(),
        template_renderer: Arc::new(DefaultTemplateRenderer::default()),
        commit_lookup: Arc::new(Git2CommitLookup),
        test_summary: Arc::new(NoTestSummary),
        pagination: Pagination::default(),
    }))
}

fn print_tool_list(schemas: &[ToolSchema]) {
    println!("changeset tools ({} total)\n", schemas.len());
    println!("{:<20} {}", "TOOL", "DESCRIPTION");
    println!("{}", "-".repeat(72));
    for schema in schemas {
        println!("{:<20} {}", schema.name, schema.description);
    }
}
