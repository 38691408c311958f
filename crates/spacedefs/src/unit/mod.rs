//! Unit Loading
//!
//! A unit is the isolated namespace produced by loading one slot's source
//! file. Loaders never share state between units: every load starts from a
//! fresh [`Registrar`], and the unit's exports are whatever was registered on
//! it.
//!
//! Units declare the other slots they depend on. A dependency on the unit's
//! own name is reported as [`LoadError::SelfDependency`]; a dependency on a
//! slot that does not exist in the space is [`LoadError::MissingDependency`].

pub mod dylib;
pub mod source;

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::common::{CallError, LoadError};
use crate::definition::Definition;

pub use dylib::{DylibLoader, RegisterFn, ENTRY_POINT};
pub use source::{ExportSource, SourceLoader, UnitSource, MAX_SOURCE_SIZE};

/// Loads one unit from a source path
pub trait UnitLoader: Send + Sync {
    /// File extension of unit sources handled by this loader (without the dot)
    fn extension(&self) -> &str;

    /// Load the unit at `path` into a fresh namespace
    ///
    /// A missing file must be reported as [`LoadError::NotFound`].
    fn load(&self, path: &Path, ctx: &LoadContext) -> Result<Unit, LoadError>;
}

/// Derive a unit name from its source path (file name without extension)
pub fn unit_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// What a loader may know about the surrounding space
#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    known_slots: Option<HashSet<String>>,
}

impl LoadContext {
    /// Context without slot knowledge; declared dependencies are not checked
    /// for existence
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a space containing exactly `slots`
    pub fn with_slots<I, S>(slots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_slots: Some(slots.into_iter().map(Into::into).collect()),
        }
    }

    /// Whether `name` is a slot of the space. Always true without slot knowledge.
    pub fn has_slot(&self, name: &str) -> bool {
        self.known_slots
            .as_ref()
            .map_or(true, |slots| slots.contains(name))
    }
}

/// Registration handle handed to a unit while it loads
pub struct Registrar {
    unit: String,
    requires: Vec<String>,
    exports: HashMap<String, Definition>,
}

impl Registrar {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            requires: Vec::new(),
            exports: HashMap::new(),
        }
    }

    /// Name of the unit being loaded
    pub fn unit_name(&self) -> &str {
        &self.unit
    }

    /// Declare a dependency on another slot
    pub fn require(&mut self, slot: impl Into<String>) {
        let slot = slot.into();
        if !self.requires.contains(&slot) {
            self.requires.push(slot);
        }
    }

    /// Export a definition; a later export with the same name replaces it
    pub fn export(&mut self, name: impl Into<String>, definition: Definition) {
        self.exports.insert(name.into(), definition);
    }

    pub fn export_function<F>(&mut self, name: impl Into<String>, implementation: F)
    where
        F: Fn(Value) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        self.export(name, Definition::function(implementation));
    }

    pub fn export_object(&mut self, name: impl Into<String>, value: Value) {
        self.export(name, Definition::object(value));
    }

    /// Validate the registration and seal it into a [`Unit`]
    pub fn finish(self, origin: PathBuf, ctx: &LoadContext) -> Result<Unit, LoadError> {
        if self.requires.iter().any(|dep| *dep == self.unit) {
            return Err(LoadError::SelfDependency(self.unit));
        }

        if let Some(missing) = self.requires.iter().find(|dep| !ctx.has_slot(dep)) {
            return Err(LoadError::MissingDependency {
                unit: self.unit.clone(),
                dependency: missing.clone(),
            });
        }

        if self.exports.keys().any(|name| name.trim().is_empty()) {
            return Err(LoadError::InvalidExport {
                unit: self.unit,
                reason: "export names must not be empty".to_string(),
            });
        }

        Ok(Unit {
            package: self.unit.clone(),
            name: self.unit,
            origin,
            requires: self.requires,
            exports: self.exports,
        })
    }

    /// Rewrap every function export so that it keeps `owner` alive
    pub(crate) fn pin_functions<T>(&mut self, owner: &std::sync::Arc<T>)
    where
        T: Send + Sync + 'static,
    {
        for definition in self.exports.values_mut() {
            if let Definition::Function(function) = definition {
                let pinned = Pinned {
                    implementation: function.get(),
                    _owner: std::sync::Arc::clone(owner),
                };
                *definition = Definition::function(move |input| pinned.call(input));
            }
        }
    }
}

/// Implementation bundled with the resource it lives in. Fields drop in
/// order, so the implementation goes before its owner.
struct Pinned<T> {
    implementation: std::sync::Arc<dyn Fn(Value) -> Result<Value, CallError> + Send + Sync>,
    _owner: std::sync::Arc<T>,
}

impl<T> Pinned<T> {
    fn call(&self, input: Value) -> Result<Value, CallError> {
        (self.implementation)(input)
    }
}

/// A loaded unit
#[derive(Debug)]
pub struct Unit {
    name: String,
    origin: PathBuf,
    package: String,
    requires: Vec<String>,
    exports: HashMap<String, Definition>,
}

impl Unit {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source path the unit was loaded from
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn requires(&self) -> &[String] {
        &self.requires
    }

    pub fn export(&self, name: &str) -> Option<&Definition> {
        self.exports.get(name)
    }

    /// Export names, sorted
    pub fn export_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.exports.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
