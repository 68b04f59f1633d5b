//! Structure reconciliation
//!
//! The two backends describe the mirrored library differently: backend A as
//! flat folder/note lists linked by parent ids, backend B as a ready-made
//! tree of notebooks, sections and pages. Both are turned into the same
//! `TreeNode` forest through the `StructureSource` trait, so callers never
//! branch on backend identity.
//!
//! Building is pure; fetching and keeping the current snapshot is the job of
//! `StructureService`.

mod flat;
mod nested;
mod service;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MirrorResult;
use crate::models::TreeNode;

pub use flat::FlatStructure;
pub use nested::NestedStructure;
pub use service::StructureService;

/// Anything that can be turned into the unified tree
pub trait StructureSource {
    /// Build the tree. Pure and deterministic; the source is not modified.
    fn build(&self) -> MirrorResult<Vec<TreeNode>>;
}

/// Which backend shape the remote API serves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Parallel folder and note lists
    #[default]
    Flat,
    /// Notebook / section / page tree
    Nested,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Flat => f.write_str("flat"),
            Backend::Nested => f.write_str("nested"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(Backend::Flat),
            "nested" => Ok(Backend::Nested),
            other => Err(format!(
                "Unknown backend '{}'. Expected 'flat' or 'nested'",
                other
            )),
        }
    }
}

/// A fetched snapshot from either backend
#[derive(Debug, Clone, PartialEq)]
pub enum Structure {
    Flat(FlatStructure),
    Nested(NestedStructure),
}

impl StructureSource for Structure {
    fn build(&self) -> MirrorResult<Vec<TreeNode>> {
        match self {
            Structure::Flat(flat) => flat.build(),
            Structure::Nested(nested) => nested.build(),
        }
    }
}
