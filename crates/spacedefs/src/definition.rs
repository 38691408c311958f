//! Definitions
//!
//! The value a unit surfaces to the registry, and the extractor that picks it
//! out of a loaded unit.

use serde_json::Value;
use std::sync::Arc;

use crate::common::CallError;
use crate::swap::Swappable;
use crate::unit::Unit;

/// Function definition: JSON in, JSON out, hot-swappable
pub type Function = Swappable<Value, Result<Value, CallError>>;

/// A function or object exported by a unit
#[derive(Debug, Clone)]
pub enum Definition {
    Function(Function),
    Object(Arc<Value>),
}

impl Definition {
    pub fn function<F>(implementation: F) -> Self
    where
        F: Fn(Value) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Definition::Function(Swappable::new(implementation))
    }

    pub fn object(value: Value) -> Self {
        Definition::Object(Arc::new(value))
    }

    /// Short label for listings
    pub fn kind(&self) -> &'static str {
        match self {
            Definition::Function(_) => "function",
            Definition::Object(_) => "object",
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Definition::Function(function) => Some(function),
            Definition::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&Value> {
        match self {
            Definition::Object(value) => Some(value),
            Definition::Function(_) => None,
        }
    }

    /// Call a function definition; objects are not callable
    pub fn call(&self, name: &str, input: Value) -> Result<Value, CallError> {
        match self {
            Definition::Function(function) => function.call(input),
            Definition::Object(_) => Err(CallError::NotCallable(name.to_string())),
        }
    }

    /// Identity comparison: true when both handles refer to the same definition
    pub fn same(&self, other: &Definition) -> bool {
        match (self, other) {
            (Definition::Function(a), Definition::Function(b)) => a.ptr_eq(b),
            (Definition::Object(a), Definition::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Return the export of `unit` whose name equals the unit's own name
///
/// An absent unit or a missing export yields `None`; this never fails.
pub fn extract(unit: Option<&Unit>) -> Option<Definition> {
    let unit = unit?;
    unit.export(unit.name()).cloned()
}
