//! Validated object-id newtypes.
//!
//! Instruction payloads carry [`CommitId`] and [`TreeId`] instead of bare
//! strings so that a commit can never end up in a tree slot (and vice
//! versa), and so that anything parsed out of git output is checked once,
//! at the boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Which kind of value failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    CommitId,
    TreeId,
    WalkPath,
}

/// A value that failed newtype validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: ErrorKind,
    pub value: String,
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            ErrorKind::CommitId => "commit id",
            ErrorKind::TreeId => "tree id",
            ErrorKind::WalkPath => "walk path",
        };
        write!(f, "invalid {what} '{}': {}", self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

fn validate_hex(s: &str, kind: ErrorKind) -> Result<(), ValidationError> {
    if s.len() != 40 {
        return Err(ValidationError {
            kind,
            value: s.to_owned(),
            reason: format!("expected 40 hex characters, got {}", s.len()),
        });
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    {
        return Err(ValidationError {
            kind,
            value: s.to_owned(),
            reason: "must contain only lowercase hex characters (0-9, a-f)".to_owned(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CommitId
// ---------------------------------------------------------------------------

/// A validated 40-character lowercase hex git commit id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitId(String);

impl CommitId {
    /// Create a new `CommitId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is not exactly 40 lowercase hex
    /// characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        validate_hex(s, ErrorKind::CommitId)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the inner hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for diagnostics (first 12 characters).
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CommitId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CommitId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_hex(&s, ErrorKind::CommitId)?;
        Ok(Self(s))
    }
}

impl From<CommitId> for String {
    fn from(id: CommitId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// TreeId
// ---------------------------------------------------------------------------

/// A validated 40-character lowercase hex git tree id.
///
/// Tree equality is the engine's notion of "same content" — every pop
/// assertion and the final fixup compare `TreeId`s, never commit ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TreeId(String);

impl TreeId {
    /// Create a new `TreeId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is not exactly 40 lowercase hex
    /// characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        validate_hex(s, ErrorKind::TreeId)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the inner hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for diagnostics (first 12 characters).
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TreeId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TreeId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_hex(&s, ErrorKind::TreeId)?;
        Ok(Self(s))
    }
}

impl From<TreeId> for String {
    fn from(id: TreeId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
