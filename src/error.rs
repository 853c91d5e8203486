//! Engine error types.
//!
//! Every failure aborts the run; the Atomic guard is the only recovery
//! authority. Each variant is self-contained: the message says what went
//! wrong and what the user can do next.

use std::fmt;

use crate::model::{CommitId, TreeId};
use crate::repo::GitError;

/// Unified error type for the linearization engine.
#[derive(Debug)]
pub enum LinearizeError {
    /// A commit with an unsupported parent arity headed a walk range:
    /// octopus merges (more than two parents) and root commits (zero
    /// parents, whose intent is deliberately left undefined).
    UnsupportedTopology { commit: CommitId, parents: usize },

    /// Both the standard and the compensating cherry-pick strategies
    /// failed for a commit.
    CherryPick { commit: CommitId },

    /// The ours-strategy merge inside resolve-merge-conflict itself failed.
    MergeReplay { merge: CommitId },

    /// A synthesized compensation patch did not apply cleanly.
    Apply { context: String },

    /// After processing a merge subgraph, the rebuilt tree did not match
    /// the merge's recorded tree.
    PopInvariant {
        merge: CommitId,
        expected: TreeId,
        actual: TreeId,
    },

    /// The Atomic guard could not restore the pre-run state.
    Restore { detail: String },

    /// The planner recursed past its safety limit.
    WalkDepthExceeded { depth: usize },

    /// The instruction stream violated an executor invariant. Always an
    /// engine bug, never a user state.
    MalformedPlan { detail: &'static str },

    /// A git invocation failed outside the expected-conflict paths.
    Git(GitError),
}

impl fmt::Display for LinearizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedTopology { commit, parents } => match parents {
                0 => write!(
                    f,
                    "commit {commit} is a root commit heading a walk range; linearizing a range whose tip has no parents is not supported.\n  Bound the walk above the root, e.g.: linearize <head> ^{commit}"
                ),
                n => write!(
                    f,
                    "commit {commit} is an octopus merge ({n} parents); only two-parent merges are supported.\n  Split the octopus merge into pairwise merges first."
                ),
            },
            Self::CherryPick { commit } => write!(
                f,
                "could not replay commit {commit}: both the standard and the compensating cherry-pick strategies failed.\n  The repository has been restored; inspect the commit with: git show {commit}"
            ),
            Self::MergeReplay { merge } => write!(
                f,
                "could not reproduce merge {merge}: the ours-strategy replay of its side branch failed.\n  The repository has been restored; inspect the merge with: git show {merge}"
            ),
            Self::Apply { context } => write!(
                f,
                "a synthesized compensation patch did not apply cleanly while {context}.\n  The repository has been restored."
            ),
            Self::PopInvariant {
                merge,
                expected,
                actual,
            } => write!(
                f,
                "tree mismatch after rebuilding the subgraph of merge {merge}: expected tree {expected}, got {actual}.\n  This indicates an engine bug or a merge that cannot be reproduced; please report it with the output of: git log --graph --oneline {merge}"
            ),
            Self::Restore { detail } => write!(
                f,
                "failed to restore the repository to its pre-run state: {detail}\n  The repository may be in a non-canonical state. Snapshots of your working tree, if any, are recoverable via: git stash list"
            ),
            Self::WalkDepthExceeded { depth } => write!(
                f,
                "merge nesting exceeded the walk depth limit ({depth}).\n  Bound the walk with ^<limit> revisions to linearize a smaller range."
            ),
            Self::MalformedPlan { detail } => write!(
                f,
                "internal error: malformed instruction stream ({detail}).\n  This is an engine bug; please report it."
            ),
            Self::Git(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LinearizeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Git(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GitError> for LinearizeError {
    fn from(e: GitError) -> Self {
        Self::Git(e)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
