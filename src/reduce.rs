//! Base reduction: collapse a boundary set to its minimal covering subset.
//!
//! A boundary commit that is an ancestor of another boundary commit adds no
//! content beyond its descendant, so it is dropped. Survivor order is input
//! order, which keeps the `base` instruction deterministic.

use crate::model::CommitId;
use crate::repo::{GitError, GitRepo};

/// Remove every commit that is an ancestor of another commit in the set.
///
/// Duplicates count as ancestors of each other; the first occurrence wins.
///
/// # Errors
/// Propagates ancestry-query failures from git.
pub fn reduce(repo: &GitRepo, bases: Vec<CommitId>) -> Result<Vec<CommitId>, GitError> {
    let mut kept: Vec<CommitId> = Vec::with_capacity(bases.len());

    'candidate: for (i, candidate) in bases.iter().enumerate() {
        for (j, other) in bases.iter().enumerate() {
            if i == j {
                continue;
            }
            if candidate == other {
                // Duplicate: keep only the first occurrence.
                if j < i {
                    continue 'candidate;
                }
                continue;
            }
            if repo.is_ancestor(candidate, other)? {
                continue 'candidate;
            }
        }
        kept.push(candidate.clone());
    }

    Ok(kept)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
