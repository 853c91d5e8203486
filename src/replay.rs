//! Compensated replay: cherry-pick, rebase, and merge-resolution
//! reproduction.
//!
//! Everything here mutates the scratch HEAD and assumes it runs inside the
//! Atomic guard. A commit that cannot be replayed verbatim is materialized
//! according to the conflict mode: a single ours-strategy commit, or a
//! theirs-strategy commit followed by a compensation commit restoring the
//! ours result.

use tracing::{debug, instrument};

use crate::diag;
use crate::engine::{Config, ConflictMode};
use crate::error::LinearizeError;
use crate::model::CommitId;
use crate::repo::GitRepo;

/// Message prefix of a compensation that restores an ours result after a
/// theirs-strategy replay. Recursive runs recognize and drop these.
pub const OURS_THEIRS_PREFIX: &str = "COMPENSATION: ours-theirs:";

/// Message prefix of a compensation that reproduces a manually resolved
/// merge.
pub const RESOLVE_PREFIX: &str = "COMPENSATION: resolve-merge-conflict:";

/// Message prefix of the final tree fixup commit.
pub const FINAL_FIXUP_PREFIX: &str = "COMPENSATION: final-fixup:";

// ---------------------------------------------------------------------------
// Compensated cherry-pick
// ---------------------------------------------------------------------------

/// Replay a single commit onto the current HEAD, preserving empty and
/// redundant commits. `mainline` selects the parent when `commit` is a
/// merge.
///
/// # Errors
/// `CherryPick` when every strategy fails; `Apply` when the split-mode
/// compensation patch does not apply.
#[instrument(skip(repo, cfg), fields(commit = %commit.short()))]
pub fn cherry_pick_compensated(
    repo: &GitRepo,
    commit: &CommitId,
    mainline: Option<u32>,
    cfg: &Config,
) -> Result<(), LinearizeError> {
    if cfg.recursive {
        let message = repo.commit_message(commit)?;
        if message.starts_with(OURS_THEIRS_PREFIX) {
            diag::info(format!(
                "dropping redundant compensation commit {}",
                commit.short()
            ));
            return Ok(());
        }
    }

    if repo.try_cherry_pick(commit, None, mainline)? {
        return Ok(());
    }
    repo.cherry_pick_abort();
    debug!(commit = %commit.short(), "plain replay conflicted, retrying with ours strategy");

    if !repo.try_cherry_pick(commit, Some("ours"), mainline)? {
        repo.cherry_pick_abort();
        return Err(LinearizeError::CherryPick {
            commit: commit.clone(),
        });
    }

    if cfg.on_conflict == ConflictMode::Split {
        let ours = repo.head()?;
        repo.reset_hard("HEAD^")?;
        if !repo.try_cherry_pick(commit, Some("theirs"), mainline)? {
            repo.cherry_pick_abort();
            return Err(LinearizeError::CherryPick {
                commit: commit.clone(),
            });
        }
        let patch = repo.diff_patch("HEAD", ours.as_str())?;
        repo.apply_patch(&patch)
            .map_err(|e| LinearizeError::Apply {
                context: format!("restoring the ours result for commit {}: {e}", commit.short()),
            })?;
        repo.commit(&format!("{OURS_THEIRS_PREFIX} {commit}"), true)?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Compensated rebase
// ---------------------------------------------------------------------------

/// Replay every commit in `(base, tip]` onto the current HEAD, oldest
/// first. Tries one straight rebase; on failure falls back to per-commit
/// compensated cherry-picks.
///
/// # Errors
/// Propagates cherry-pick and git failures.
#[instrument(skip(repo, cfg), fields(base = %base.short(), tip = %tip.short()))]
pub fn rebase_compensated(
    repo: &GitRepo,
    base: &CommitId,
    tip: &CommitId,
    cfg: &Config,
) -> Result<(), LinearizeError> {
    let range = repo.rev_list(tip, std::slice::from_ref(base))?;
    if range.is_empty() {
        debug!("empty range, nothing to replay");
        return Ok(());
    }

    let onto = repo.head()?;
    if repo.try_rebase_onto(&onto, base, tip)? {
        return Ok(());
    }
    repo.rebase_abort();
    debug!(onto = %onto.short(), "straight rebase failed, replaying commit by commit");
    diag::debug(
        cfg.debug,
        format!(
            "rebase of ({}, {}] onto {} conflicted, compensating per commit",
            base.short(),
            tip.short(),
            onto.short()
        ),
    );

    repo.checkout_detach(onto.as_str())?;
    for entry in range.iter().rev() {
        cherry_pick_compensated(repo, &entry.id, None, cfg)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Resolve merge conflict
// ---------------------------------------------------------------------------

/// Reproduce a merge whose recorded resolution differs from the standard
/// three-way result, on top of the current HEAD.
///
/// The merge's delta is rebuilt out of line (ours-strategy merge of the
/// side branch, plus a compensation patch up to the recorded tree), then
/// replayed onto the saved HEAD. In `merge` mode the replayed sequence is
/// squashed into a single commit carrying the original merge's message.
///
/// # Errors
/// `MergeReplay` when the ours-strategy merge itself fails; `Apply` when
/// the compensation patch does not apply.
#[instrument(skip(repo, cfg), fields(merge = %merge.short()))]
pub fn resolve_merge_conflict(
    repo: &GitRepo,
    merge: &CommitId,
    cfg: &Config,
) -> Result<(), LinearizeError> {
    let parents = repo.parents(merge)?;
    if parents.len() != 2 {
        return Err(LinearizeError::UnsupportedTopology {
            commit: merge.clone(),
            parents: parents.len(),
        });
    }
    let left = &parents[0];
    let right = &parents[1];

    let saved = repo.head()?;

    repo.checkout_detach(left.as_str())?;
    if !repo.try_merge(right, Some("ours"))? {
        repo.merge_abort();
        return Err(LinearizeError::MergeReplay {
            merge: merge.clone(),
        });
    }
    let ours = repo.head()?;

    let patch = repo.diff_patch(ours.as_str(), merge.as_str())?;
    let fixed = if patch.trim().is_empty() {
        // The ours strategy already reproduces the recorded tree; an empty
        // compensation would only add noise.
        diag::info(format!(
            "manual resolution of merge {} matches the ours-strategy result",
            merge.short()
        ));
        ours.clone()
    } else {
        repo.apply_patch(&patch)
            .map_err(|e| LinearizeError::Apply {
                context: format!(
                    "reproducing the manual resolution of merge {}: {e}",
                    merge.short()
                ),
            })?;
        repo.commit(&format!("{RESOLVE_PREFIX} {merge}"), true)?;
        repo.head()?
    };

    // Fold the synthesized sequence onto the saved HEAD. The ours commit
    // is a merge, so it replays against its first parent.
    repo.checkout_detach(saved.as_str())?;
    cherry_pick_compensated(repo, &ours, Some(1), cfg)?;
    if fixed != ours {
        cherry_pick_compensated(repo, &fixed, None, cfg)?;
    }

    if cfg.on_conflict == ConflictMode::Merge {
        let message = repo.commit_message(merge)?;
        repo.reset_soft(saved.as_str())?;
        repo.commit(message.trim_end(), true)?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
