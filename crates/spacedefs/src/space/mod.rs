//! Space Discovery
//!
//! Walks a space root, loads one unit per slot directory, and exposes the
//! resulting definitions by slot name.

pub mod namespace;
pub mod registry;
pub mod walker;
pub mod watcher;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::definition::Definition;

pub use namespace::Namespace;
pub use registry::{source_registry, ReloadSummary, SpaceRegistry};
pub use walker::{SlotEntry, SpaceWalker, DEFAULT_RESERVED_PREFIX};
pub use watcher::SpaceWatcher;

/// What discovery recorded for a slot
#[derive(Debug, Clone)]
pub enum SlotValue {
    /// Loaded definition
    Definition(Definition),
    /// Candidate source path (path-only discovery)
    Path(PathBuf),
}

impl SlotValue {
    pub fn as_definition(&self) -> Option<&Definition> {
        match self {
            SlotValue::Definition(definition) => Some(definition),
            SlotValue::Path(_) => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            SlotValue::Path(path) => Some(path),
            SlotValue::Definition(_) => None,
        }
    }

    /// `function`, `object` or `path`
    pub fn kind(&self) -> &'static str {
        match self {
            SlotValue::Definition(definition) => definition.kind(),
            SlotValue::Path(_) => "path",
        }
    }

    /// Identity for definitions, equality for paths
    pub fn same(&self, other: &SlotValue) -> bool {
        match (self, other) {
            (SlotValue::Definition(a), SlotValue::Definition(b)) => a.same(b),
            (SlotValue::Path(a), SlotValue::Path(b)) => a == b,
            _ => false,
        }
    }
}

/// Slot name → discovered value
pub type SpaceDefs = HashMap<String, SlotValue>;
