//! Space Registry
//!
//! Owns the result of discovering one space root and keeps it current across
//! reloads. Function definitions keep their identity over a reload: the new
//! implementation is swapped into the handle callers already hold.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::{Namespace, SlotValue, SpaceDefs, SpaceWalker};
use crate::builtins::Builtins;
use crate::common::{CallError, ConfigError, SpaceResult};
use crate::config::SpaceConfig;
use crate::definition::{Definition, Function};

/// What changed during a reload; names are sorted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    /// Slots that were not present before
    pub added: Vec<String>,
    /// Function slots whose implementation was swapped in place
    pub swapped: Vec<String>,
    /// Slots whose value was replaced by a new one
    pub replaced: Vec<String>,
    /// Slots that disappeared
    pub removed: Vec<String>,
}

impl ReloadSummary {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.swapped.is_empty()
            && self.replaced.is_empty()
            && self.removed.is_empty()
    }

    fn sort(&mut self) {
        self.added.sort();
        self.swapped.sort();
        self.replaced.sort();
        self.removed.sort();
    }
}

pub struct SpaceRegistry {
    walker: SpaceWalker,
    root: PathBuf,
    load_defs: bool,
    defs: SpaceDefs,
    namespace: Namespace,
}

impl SpaceRegistry {
    pub fn new(walker: SpaceWalker, root: impl Into<PathBuf>) -> Self {
        Self {
            walker,
            root: root.into(),
            load_defs: true,
            defs: SpaceDefs::new(),
            namespace: Namespace::new(),
        }
    }

    /// Registry for the root, loader and options named in `config`
    pub fn from_config(config: &SpaceConfig, builtins: Builtins) -> Result<Self, ConfigError> {
        let root = config.root()?;
        Ok(Self::new(config.walker(builtins), root).with_load_defs(config.load_defs))
    }

    /// Record candidate source paths instead of loading units
    pub fn with_load_defs(mut self, load_defs: bool) -> Self {
        self.load_defs = load_defs;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn walker(&self) -> &SpaceWalker {
        &self.walker
    }

    /// Discover the space from scratch, discarding previous state
    pub fn load(&mut self) -> SpaceResult<usize> {
        let mut namespace = Namespace::new();
        let defs = self
            .walker
            .discover(&self.root, self.load_defs, None, &mut namespace)?;

        self.defs = defs;
        self.namespace = namespace;

        info!("Space registry loaded: {} definitions", self.defs.len());
        Ok(self.defs.len())
    }

    /// Discover again and merge the result into the current state
    ///
    /// On failure the current state is kept untouched.
    pub fn reload(&mut self) -> SpaceResult<ReloadSummary> {
        let mut scratch = Namespace::new();
        let fresh = match self
            .walker
            .discover(&self.root, self.load_defs, None, &mut scratch)
        {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!("Failed to reload space {:?}: {}", self.root, e);
                return Err(e);
            }
        };

        let mut summary = ReloadSummary::default();
        let mut next = SpaceDefs::with_capacity(fresh.len());

        for (name, value) in fresh {
            let merged = match (self.defs.remove(&name), value) {
                (
                    Some(SlotValue::Definition(Definition::Function(current))),
                    SlotValue::Definition(Definition::Function(incoming)),
                ) => {
                    current.swap_from(&incoming);
                    summary.swapped.push(name.clone());
                    SlotValue::Definition(Definition::Function(current))
                }
                (Some(_), value) => {
                    summary.replaced.push(name.clone());
                    value
                }
                (None, value) => {
                    summary.added.push(name.clone());
                    value
                }
            };
            next.insert(name, merged);
        }

        summary.removed = self.defs.drain().map(|(name, _)| name).collect();
        summary.sort();

        self.namespace.clear();
        for (name, value) in &next {
            self.namespace.publish(name.clone(), value.clone());
        }
        self.defs = next;

        info!(
            "Space registry reloaded: {} added, {} swapped, {} replaced, {} removed",
            summary.added.len(),
            summary.swapped.len(),
            summary.replaced.len(),
            summary.removed.len()
        );
        Ok(summary)
    }

    pub fn defs(&self) -> &SpaceDefs {
        &self.defs
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn get(&self, name: &str) -> Option<&SlotValue> {
        self.defs.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.namespace.function(name)
    }

    pub fn object(&self, name: &str) -> Option<&Value> {
        self.namespace.object(name)
    }

    /// Call the function definition `name`
    pub fn call(&self, name: &str, input: Value) -> Result<Value, CallError> {
        match self.get(name) {
            Some(SlotValue::Definition(definition)) => definition.call(name, input),
            Some(SlotValue::Path(_)) => Err(CallError::NotCallable(name.to_string())),
            None => Err(CallError::UnknownDefinition(name.to_string())),
        }
    }

    /// Slot names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.defs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

impl std::fmt::Debug for SpaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceRegistry")
            .field("root", &self.root)
            .field("load_defs", &self.load_defs)
            .field("names", &self.names())
            .finish()
    }
}

/// Shorthand for a registry over JSON unit sources with the standard builtins
pub fn source_registry(root: impl Into<PathBuf>) -> SpaceRegistry {
    let loader = crate::unit::SourceLoader::new(Builtins::standard());
    SpaceRegistry::new(SpaceWalker::new(Arc::new(loader)), root)
}
