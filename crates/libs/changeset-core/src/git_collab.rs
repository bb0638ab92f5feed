//! Git integration collaborator (spec §1: "Deliberately out of scope").
//! Consumes a change directory, returns the commit identifiers that touched
//! it. The default implementation uses `git2` and tolerates "not a git
//! repository" (or any other discovery failure) as an empty result, per
//! spec §4.3 step 4: "tolerate absence of either by recording empty
//! structures."

use std::path::Path;

pub trait CommitLookup: Send + Sync {
    /// Commit identifiers (short hex OIDs) touching `change_dir`, most
    /// recent first.
    fn commits_touching(&self, change_dir: &Path) -> Vec<String>;
}

pub struct Git2CommitLookup;

impl CommitLookup for Git2CommitLookup {
    fn commits_touching(&self, change_dir: &Path) -> Vec<String> {
        let repo = match git2::Repository::discover(change_dir) {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };

        let workdir = match repo.workdir() {
            Some(w) => w,
            None => return Vec::new(),
        };

        let Ok(rel_path) = change_dir.strip_prefix(workdir) else {
            return Vec::new();
        };

        let mut revwalk = match repo.revwalk() {
            Ok(w) => w,
            Err(_) => return Vec::new(),
        };
        if revwalk.push_head().is_err() {
            return Vec::new();
        }

        let mut out = Vec::new();
        for oid in revwalk.flatten() {
            let Ok(commit) = repo.find_commit(oid) else { continue };
            let Ok(tree) = commit.tree() else { continue };
            let parent_tree = commit.parent(0).ok().and_then(|p| p.tree().ok());

            let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None);
            let Ok(diff) = diff else { continue };

            let touches_change = diff
                .deltas()
                .any(|d| {
                    d.new_file().path().is_some_and(|p| p.starts_with(rel_path))
                        || d.old_file().path().is_some_and(|p| p.starts_with(rel_path))
                });

            if touches_change {
                out.push(format!("{}", oid));
            }
        }
        out
    }
}

/// Trivial collaborator for tests and for deployments with no git repo.
pub struct NullCommitLookup;

impl CommitLookup for NullCommitLookup {
    fn commits_touching(&self, _change_dir: &Path) -> Vec<String> {
        Vec::new()
    }
}
