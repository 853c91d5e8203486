//! Orchestration: plan, reverse, build under the Atomic guard.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, instrument};

use crate::error::LinearizeError;
use crate::model::CommitId;
use crate::repo::GitRepo;
use crate::{atomic, build, diag, plan};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How a conflicted cherry-pick is materialized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConflictMode {
    /// A single ours-strategy commit.
    #[default]
    Merge,
    /// A theirs-strategy commit followed by a compensation commit that
    /// restores the ours result.
    Split,
}

impl FromStr for ConflictMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(Self::Merge),
            "split" => Ok(Self::Split),
            other => Err(format!(
                "invalid conflict mode '{other}', expected 'merge' or 'split'"
            )),
        }
    }
}

impl fmt::Display for ConflictMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Merge => "merge",
            Self::Split => "split",
        })
    }
}

/// Immutable engine configuration, constructed once and passed by
/// reference through every component.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Recursively linearize right subgraphs before folding them in.
    pub recursive: bool,
    /// Conflict materialization mode.
    pub on_conflict: ConflictMode,
    /// Emit `debug:` diagnostics.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recursive: true,
            on_conflict: ConflictMode::Merge,
            debug: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// The result of a linearization: the commit the chain was started from
/// and the linear tip. The tip's tree equals the input head's tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Linearized {
    pub base: CommitId,
    pub tip: CommitId,
}

/// Linearize the history of `head`, bounded by `limits`, into a chain of
/// non-merge commits. On success the chain's tip is returned dangling —
/// the repository itself is restored to its pre-run state by the Atomic
/// guard; pointing a ref at the tip is the caller's decision.
///
/// # Errors
/// Any planning or build failure aborts the run; the guard restores the
/// starting branch, HEAD, index, and working tree first.
#[instrument(skip(repo, cfg), fields(head = %head.short()))]
pub fn run(
    repo: &GitRepo,
    head: &CommitId,
    limits: &[CommitId],
    cfg: &Config,
) -> Result<Linearized, LinearizeError> {
    let instructions = plan::plan(repo, head, limits, cfg)?;
    debug!(count = instructions.len(), "planned instruction stream");

    // A stream with only the `end` sentinel means the range is empty:
    // nothing to rebuild, nothing to touch.
    if instructions.len() <= 1 {
        diag::info(format!("nothing to linearize for {}", head.short()));
        return Ok(Linearized {
            base: head.clone(),
            tip: head.clone(),
        });
    }

    let reversed: Vec<_> = instructions.into_iter().rev().collect();
    atomic::run(repo, cfg, || build::execute(repo, &reversed, head, cfg))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
