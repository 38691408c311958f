//! Shared Namespace
//!
//! Name-keyed bindings that discovery publishes into alongside the mapping it
//! returns. The namespace is an ordinary value owned by the caller; the last
//! publication for a name wins.

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use super::SlotValue;
use crate::definition::{Definition, Function};

#[derive(Debug, Clone, Default)]
pub struct Namespace {
    bindings: HashMap<String, SlotValue>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, returning the value it replaced
    pub fn publish(&mut self, name: impl Into<String>, value: SlotValue) -> Option<SlotValue> {
        self.bindings.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<SlotValue> {
        self.bindings.remove(name)
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    pub fn get(&self, name: &str) -> Option<&SlotValue> {
        self.bindings.get(name)
    }

    pub fn definition(&self, name: &str) -> Option<&Definition> {
        self.get(name).and_then(SlotValue::as_definition)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.definition(name).and_then(Definition::as_function)
    }

    pub fn object(&self, name: &str) -> Option<&Value> {
        self.definition(name).and_then(Definition::as_object)
    }

    pub fn path(&self, name: &str) -> Option<&Path> {
        self.get(name).and_then(SlotValue::as_path)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bound names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SlotValue)> {
        self.bindings.iter().map(|(name, value)| (name.as_str(), value))
    }
}
