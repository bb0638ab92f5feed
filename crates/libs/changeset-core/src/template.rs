//! Template rendering collaborator (spec §1: "Deliberately out of scope").
//! The workflow engine depends only on this trait; the real renderer is an
//! external collaborator the spec says consumes `{kind, slug, title,
//! rationale}` and returns file-path → bytes. This module supplies the
//! trait plus a minimal built-in implementation (`minijinja`-rendered
//! proposal/tasks templates for `feature`/`bugfix`/`chore`) so the rest of
//! the system has something to call in tests and in the reference binaries.

use std::collections::BTreeMap;
use std::path::PathBuf;

use minijinja::Environment;

use crate::change::{PROPOSAL_FILE, TASKS_FILE};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct TemplateRequest {
    pub kind: String,
    pub slug: String,
    pub title: String,
    pub rationale: Option<String>,
}

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, request: &TemplateRequest) -> Result<BTreeMap<PathBuf, Vec<u8>>>;
}

const PROPOSAL_TMPL: &str = "\
# {{ title }}

- **Slug:** {{ slug }}
- **Kind:** {{ kind }}

## Rationale

{{ rationale }}

## Summary

_Describe the proposed change here._
";

const TASKS_TMPL: &str = "\
# Tasks — {{ title }}

- [ ] Draft the implementation plan
- [ ] Implement the change
- [ ] Write tests
- [ ] Request review
";

/// Built-in renderer covering the three recognized kinds (`feature`,
/// `bugfix`, `chore`). All three currently share one template pair; the
/// `kind` is templated into the proposal body so the distinction is still
/// visible on disk.
pub struct DefaultTemplateRenderer {
    env: Environment<'static>,
}

impl Default for DefaultTemplateRenderer {
    fn default() -> Self {
        let mut env = Environment::new();
        env.add_template("proposal.md", PROPOSAL_TMPL).expect("built-in template is valid");
        env.add_template("tasks.md", TASKS_TMPL).expect("built-in template is valid");
        Self { env }
    }
}

impl TemplateRenderer for DefaultTemplateRenderer {
    fn render(&self, request: &TemplateRequest) -> Result<BTreeMap<PathBuf, Vec<u8>>> {
        let ctx = minijinja::context! {
            title => request.title,
            slug => request.slug,
            kind => request.kind,
            rationale => request.rationale.clone().unwrap_or_else(|| "_No rationale given._".to_string()),
        };

        let proposal = self
            .env
            .get_template("proposal.md")
            .and_then(|t| t.render(&ctx))
            .map_err(|e| crate::error::WorkflowError::io(e.to_string()))?;
        let tasks = self
            .env
            .get_template("tasks.md")
            .and_then(|t| t.render(&ctx))
            .map_err(|e| crate::error::WorkflowError::io(e.to_string()))?;

        let mut out = BTreeMap::new();
        out.insert(PathBuf::from(PROPOSAL_FILE), proposal.into_bytes());
        out.insert(PathBuf::from(TASKS_FILE), tasks.into_bytes());
        Ok(out)
    }
}

/// Recognized template kinds (spec §4.3): `feature` (default), `bugfix`, `chore`.
pub fn normalize_kind(kind: Option<&str>) -> &'static str {
    match kind {
        Some("bugfix") => "bugfix",
        Some("chore") => "chore",
        _ => "feature",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_proposal_and_tasks() {
        let renderer = DefaultTemplateRenderer::default();
        let files = renderer
            .render(&TemplateRequest {
                kind: "feature".into(),
                slug: "add-auth".into(),
                title: "Add auth".into(),
                rationale: Some("Users need sign-in".into()),
            })
            .expect("render");

        assert!(files.contains_key(&PathBuf::from(PROPOSAL_FILE)));
        assert!(files.contains_key(&PathBuf::from(TASKS_FILE)));
        let proposal = String::from_utf8(files[&PathBuf::from(PROPOSAL_FILE)].clone()).expect("utf8");
        assert!(proposal.contains("Add auth"));
        assert!(proposal.contains("Users need sign-in"));
    }
}
