//! Atomic guard: isolate a build from the user's repository state.
//!
//! The guard snapshots the current branch, HEAD, and any dirty working
//! state before the inner action runs, and restores all three afterwards —
//! on success as well as on error. The linear chain a successful build
//! produced survives as dangling commits; pointing a ref at it is the
//! caller's decision.

use tracing::{debug, instrument};

use crate::diag;
use crate::engine::Config;
use crate::error::LinearizeError;
use crate::model::CommitId;
use crate::repo::{GitError, GitRepo};

/// Run `inner` with the repository state snapshotted and restored.
///
/// # Errors
/// Returns the inner error after a successful restore; a failed restore
/// dominates with `Restore` (the repository may be in a non-canonical
/// state and the user must be told).
#[instrument(skip_all)]
pub fn run<T>(
    repo: &GitRepo,
    cfg: &Config,
    inner: impl FnOnce() -> Result<T, LinearizeError>,
) -> Result<T, LinearizeError> {
    let branch = repo.current_branch().map_err(LinearizeError::from)?;
    let head = repo.head()?;

    let entry_snapshot = if repo.is_dirty()? {
        let snap = repo.stash_create()?;
        if let Some(oid) = &snap {
            debug!(snapshot = %oid.short(), "snapshotted dirty working state");
            diag::debug(
                cfg.debug,
                format!("working tree snapshotted as {}", oid.short()),
            );
            repo.reset_hard("HEAD")?;
        }
        snap
    } else {
        None
    };

    let result = inner();

    if let Err(restore_err) = restore(repo, branch.as_deref(), &head, entry_snapshot.as_ref()) {
        if let Err(inner_err) = &result {
            diag::warning(format!("run failed before restore: {inner_err}"));
        }
        return Err(LinearizeError::Restore {
            detail: restore_err.to_string(),
        });
    }

    result
}

fn restore(
    repo: &GitRepo,
    branch: Option<&str>,
    head: &CommitId,
    entry_snapshot: Option<&CommitId>,
) -> Result<(), GitError> {
    // A failed inner action may have been interrupted mid-operation; clear
    // any sequencer state before touching HEAD.
    repo.cherry_pick_abort();
    repo.rebase_abort();
    repo.merge_abort();

    // Leftover uncommitted changes become a recoverable stash, never a
    // silent loss.
    if repo.is_dirty()? {
        if let Some(remnant) = repo.stash_create()? {
            repo.stash_store(&remnant, "linearize: remnant working-tree state")?;
            diag::warning(format!(
                "run left uncommitted changes; recover them with: git stash apply {remnant}"
            ));
        }
        repo.reset_hard("HEAD")?;
    }

    match branch {
        Some(name) => {
            let tip = repo.rev_parse(name)?;
            if tip != *head {
                diag::warning(format!(
                    "branch '{name}' drifted during the run; moving it back to {}",
                    head.short()
                ));
                repo.branch_force(name, head)?;
            }
            repo.checkout_branch(name)?;
        }
        None => {
            if repo.head()? != *head {
                repo.checkout_detach(head.as_str())?;
            }
        }
    }

    if let Some(snap) = entry_snapshot {
        repo.stash_apply(snap)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;
    use tempfile::TempDir;

    fn setup() -> (TempDir, GitRepo) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        for args in [
            vec!["init", "--quiet", "-b", "main"],
            vec!["config", "user.name", "Test User"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "commit.gpgsign", "false"],
        ] {
            let out = Command::new("git")
                .args(&args)
                .current_dir(&root)
                .output()
                .unwrap();
            assert!(out.status.success());
        }
        let repo = GitRepo::open(root);
        fs::write(repo.root().join("base.txt"), "0\n").unwrap();
        let out = Command::new("git")
            .args(["add", "-A"])
            .current_dir(repo.root())
            .output()
            .unwrap();
        assert!(out.status.success());
        repo.commit("initial", false).unwrap();
        (temp, repo)
    }

    fn scribble_commit(repo: &GitRepo) -> CommitId {
        fs::write(repo.root().join("scratch.txt"), "scratch\n").unwrap();
        let out = Command::new("git")
            .args(["add", "-A"])
            .current_dir(repo.root())
            .output()
            .unwrap();
        assert!(out.status.success());
        repo.commit("scratch", false).unwrap();
        repo.head().unwrap()
    }

    #[test]
    fn success_restores_branch_and_head() {
        let (_t, repo) = setup();
        let head = repo.head().unwrap();
        let cfg = Config::default();

        let tip = run(&repo, &cfg, || {
            repo.checkout_detach(head.as_str()).unwrap();
            Ok(scribble_commit(&repo))
        })
        .unwrap();

        assert_eq!(repo.head().unwrap(), head);
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("main"));
        // The built commit dangles but is still addressable by id.
        assert!(repo.tree_of(tip.as_str()).is_ok());
    }

    #[test]
    fn failure_restores_branch_and_head() {
        let (_t, repo) = setup();
        let head = repo.head().unwrap();
        let cfg = Config::default();

        let err = run(&repo, &cfg, || -> Result<(), LinearizeError> {
            repo.checkout_detach(head.as_str()).unwrap();
            scribble_commit(&repo);
            Err(LinearizeError::MalformedPlan { detail: "injected" })
        })
        .unwrap_err();

        assert!(matches!(err, LinearizeError::MalformedPlan { .. }));
        assert_eq!(repo.head().unwrap(), head);
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("main"));
        assert!(!repo.is_dirty().unwrap());
    }

    #[test]
    fn dirty_entry_state_is_reapplied() {
        let (_t, repo) = setup();
        let cfg = Config::default();
        fs::write(repo.root().join("base.txt"), "dirty\n").unwrap();

        run(&repo, &cfg, || {
            // The inner action sees a clean tree.
            assert!(!repo.is_dirty().unwrap());
            Ok(())
        })
        .unwrap();

        assert!(repo.is_dirty().unwrap());
        assert_eq!(
            fs::read_to_string(repo.root().join("base.txt")).unwrap(),
            "dirty\n"
        );
    }

    #[test]
    fn leftover_changes_become_a_remnant_stash() {
        let (_t, repo) = setup();
        let cfg = Config::default();

        let _ = run(&repo, &cfg, || -> Result<(), LinearizeError> {
            fs::write(repo.root().join("base.txt"), "leftover\n").unwrap();
            Err(LinearizeError::MalformedPlan { detail: "injected" })
        });

        assert!(!repo.is_dirty().unwrap(), "tree is clean after restore");
        let out = Command::new("git")
            .args(["stash", "list"])
            .current_dir(repo.root())
            .output()
            .unwrap();
        let list = String::from_utf8_lossy(&out.stdout);
        assert!(
            list.contains("remnant working-tree state"),
            "stash list: {list}"
        );
    }

    #[test]
    fn detached_start_is_restored_detached() {
        let (_t, repo) = setup();
        let head = repo.head().unwrap();
        repo.checkout_detach(head.as_str()).unwrap();
        let cfg = Config::default();

        run(&repo, &cfg, || {
            scribble_commit(&repo);
            Ok(())
        })
        .unwrap();

        assert_eq!(repo.head().unwrap(), head);
        assert!(repo.current_branch().unwrap().is_none());
    }
}
