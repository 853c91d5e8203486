//! Plan phase: walk the commit DAG from tip to base and emit the
//! instruction stream describing its linear reconstruction.
//!
//! The walk is read-only. Instructions come out in reverse chronological
//! intent — the orchestrator reverses the stream before execution, so the
//! `push`/`base` pair emitted last for a merge subgraph is what the
//! executor sees first.

use tracing::{debug, instrument};

use crate::diag;
use crate::engine::Config;
use crate::error::LinearizeError;
use crate::model::{CommitId, Instruction, WalkPath};
use crate::reduce;
use crate::repo::GitRepo;

/// Safety limit on merge nesting. Real histories sit far below this; the
/// limit exists so a pathological graph fails cleanly instead of blowing
/// the stack.
const MAX_WALK_DEPTH: usize = 512;

/// Plan the linearization of `head` bounded by `limits`.
///
/// The returned stream starts with the `end` sentinel (it executes last
/// after reversal). A stream containing only the sentinel means the range
/// is empty.
///
/// # Errors
/// Fails on unsupported topology (octopus merges, a root commit heading a
/// range) and on any git query failure.
#[instrument(skip_all, fields(head = %head.short()))]
pub fn plan(
    repo: &GitRepo,
    head: &CommitId,
    limits: &[CommitId],
    cfg: &Config,
) -> Result<Vec<Instruction>, LinearizeError> {
    let mut out = vec![Instruction::End { head: head.clone() }];
    walk(repo, head, limits, WalkPath::root(), 0, cfg, &mut out)?;
    Ok(out)
}

fn walk(
    repo: &GitRepo,
    head: &CommitId,
    limits: &[CommitId],
    path: WalkPath,
    depth: usize,
    cfg: &Config,
    out: &mut Vec<Instruction>,
) -> Result<(), LinearizeError> {
    if depth > MAX_WALK_DEPTH {
        return Err(LinearizeError::WalkDepthExceeded {
            depth: MAX_WALK_DEPTH,
        });
    }

    let revs = repo.rev_list(head, limits)?;
    let Some(tip) = revs.first() else {
        debug!(head = %head.short(), "empty range, nothing to emit");
        return Ok(());
    };

    match tip.parents.len() {
        // A root commit heading the range: deliberately unsupported (see
        // DESIGN.md) rather than guessed as no-op or copy.
        0 => Err(LinearizeError::UnsupportedTopology {
            commit: tip.id.clone(),
            parents: 0,
        }),

        1 => {
            // Non-merge tip: split the range at the most recent merge.
            match revs.iter().find(|r| r.parents.len() >= 2) {
                Some(merge) if merge.parents.len() > 2 => {
                    Err(LinearizeError::UnsupportedTopology {
                        commit: merge.id.clone(),
                        parents: merge.parents.len(),
                    })
                }
                Some(merge) => {
                    out.push(Instruction::Compensate {
                        base: Some(merge.id.clone()),
                        tip: head.clone(),
                    });
                    walk(repo, &merge.id.clone(), limits, path, depth + 1, cfg, out)
                }
                None => {
                    // Merge-free range: one compensate covers it all. The
                    // base is the parent below the range, absent when the
                    // range reaches a root commit.
                    let base = revs
                        .last()
                        .and_then(|oldest| oldest.parents.first())
                        .cloned();
                    out.push(Instruction::Compensate {
                        base,
                        tip: head.clone(),
                    });
                    Ok(())
                }
            }
        }

        2 => {
            let merge = tip.id.clone();
            let left = tip.parents[0].clone();
            let right = tip.parents[1].clone();
            visit_merge(repo, &merge, &left, &right, limits, path, depth, cfg, out)
        }

        n => Err(LinearizeError::UnsupportedTopology {
            commit: tip.id.clone(),
            parents: n,
        }),
    }
}

/// Visit one merge: classify it, recurse into both subtrees, and bracket
/// the emitted block with `pop` (first) and `push` (last).
#[allow(clippy::too_many_arguments)]
fn visit_merge(
    repo: &GitRepo,
    merge: &CommitId,
    left: &CommitId,
    right: &CommitId,
    limits: &[CommitId],
    path: WalkPath,
    depth: usize,
    cfg: &Config,
    out: &mut Vec<Instruction>,
) -> Result<(), LinearizeError> {
    out.push(Instruction::Pop {
        merge: merge.clone(),
        path: path.clone(),
    });

    let merge_tree = repo.tree_of(merge.as_str())?;
    let left_tree = repo.tree_of(left.as_str())?;

    let empty = left_tree == merge_tree;
    if empty {
        // The merge contributes nothing over its first parent; the right
        // branch is skipped entirely.
        diag::info(format!(
            "merge {} is empty (tree equals first parent), eliding right branch",
            merge.short()
        ));
    } else {
        let candidate = repo.merge_tree(left, right)?;
        let broken = !candidate.clean || candidate.tree != merge_tree;
        if broken {
            debug!(merge = %merge.short(), clean = candidate.clean, "merge is not reproducible by the default strategy");
            diag::debug(
                cfg.debug,
                format!("merge {} needs manual-resolution replay", merge.short()),
            );
            out.push(Instruction::ResolveMergeConflict {
                merge: merge.clone(),
            });
        }

        let mut right_limits = limits.to_vec();
        right_limits.push(left.clone());
        walk(repo, right, &right_limits, path.right(), depth + 1, cfg, out)?;
    }

    walk(repo, left, limits, path.left(), depth + 1, cfg, out)?;

    let boundary = repo.boundary(merge, limits)?;
    let bases = reduce::reduce(repo, boundary)?;
    out.push(Instruction::Base { bases });
    out.push(Instruction::Push {
        merge: merge.clone(),
        path,
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
