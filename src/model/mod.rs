//! Core data model: validated object ids, walk paths, and the instruction
//! stream bridging the Plan and Build phases.

pub mod instruction;
pub mod path;
pub mod types;

pub use instruction::Instruction;
pub use path::WalkPath;
pub use types::{CommitId, TreeId, ValidationError};
