//! The instruction stream bridging Plan and Build.
//!
//! The planner emits instructions in reverse chronological intent; the
//! orchestrator reverses the stream before execution so that the executor
//! sees the starting point first. `Display` produces the one-line text form
//! used by `-- plan` and debug output; serde produces the JSON form.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::path::WalkPath;
use super::types::CommitId;

/// One step of the linear reconstruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Instruction {
    /// The starting commit(s) of a merge subgraph. After reversal the
    /// outermost `Base` is the first instruction the executor acts on.
    Base { bases: Vec<CommitId> },

    /// Rebase the range `(base, tip]` onto the current HEAD with
    /// compensation. `base = None` encodes a merge-free range that reaches
    /// a root commit.
    Compensate {
        base: Option<CommitId>,
        tip: CommitId,
    },

    /// Reproduce a merge whose recorded resolution differs from the
    /// standard three-way result.
    ResolveMergeConflict { merge: CommitId },

    /// Entering the subgraph of `merge` (first edge after reversal).
    Push { merge: CommitId, path: WalkPath },

    /// Leaving the subgraph of `merge`; tree equivalence is asserted.
    Pop { merge: CommitId, path: WalkPath },

    /// Finalize: repair any tree drift against the input head.
    End { head: CommitId },
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base { bases } => {
                f.write_str("base")?;
                for b in bases {
                    write!(f, " {b}")?;
                }
                Ok(())
            }
            Self::Compensate { base, tip } => match base {
                Some(b) => write!(f, "compensate {b} {tip}"),
                None => write!(f, "compensate - {tip}"),
            },
            Self::ResolveMergeConflict { merge } => {
                write!(f, "resolve-merge-conflict {merge}")
            }
            Self::Push { merge, path } => write!(f, "push {merge} {path}"),
            Self::Pop { merge, path } => write!(f, "pop {merge} {path}"),
            Self::End { head } => write!(f, "end {head}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
