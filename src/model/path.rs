//! Walk paths: the `{L, R}` descent history of a planner visit.
//!
//! Each planner recursion appends `L` when descending into a merge's first
//! parent and `R` when descending into its second parent. The executor only
//! ever asks two questions of a path: is it pure-left (strict pop
//! assertion), and does it end in a right descent (recursive subgraph
//! entry).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::types::{ErrorKind, ValidationError};

/// A descent path over `{L, R}`. The empty path is the traversal root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalkPath(String);

impl WalkPath {
    /// The root path (top of the traversal).
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Parse a path, validating that it only contains `L` and `R`.
    ///
    /// # Errors
    /// Returns an error on any other character.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        if let Some(bad) = s.chars().find(|c| *c != 'L' && *c != 'R') {
            return Err(ValidationError {
                kind: ErrorKind::WalkPath,
                value: s.to_owned(),
                reason: format!("unexpected character '{bad}', expected only 'L' or 'R'"),
            });
        }
        Ok(Self(s.to_owned()))
    }

    /// The path of a first-parent (mainline) descent from `self`.
    #[must_use]
    pub fn left(&self) -> Self {
        Self(format!("{}L", self.0))
    }

    /// The path of a second-parent (side-branch) descent from `self`.
    #[must_use]
    pub fn right(&self) -> Self {
        Self(format!("{}R", self.0))
    }

    /// Whether the path never descended into a right subtree.
    ///
    /// The empty path is pure-left: a merge visited on the mainline spine
    /// must reproduce its tree exactly.
    #[must_use]
    pub fn is_pure_left(&self) -> bool {
        !self.0.contains('R')
    }

    /// Whether the last descent entered a right subtree. Such a path marks
    /// the top merge of a side branch — the entry point for recursive
    /// linearization.
    #[must_use]
    pub fn ends_right(&self) -> bool {
        self.0.ends_with('R')
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for WalkPath {
    /// The root path renders as `-` so instruction lines keep a fixed
    /// field count.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("-")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl FromStr for WalkPath {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "-" {
            return Ok(Self::root());
        }
        Self::new(s)
    }
}

impl TryFrom<String> for WalkPath {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<WalkPath> for String {
    fn from(p: WalkPath) -> Self {
        p.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
