//! Builtin Functions
//!
//! Native functions the host makes available to units. A unit exports one by
//! name (`{"type": "builtin", "function": "upper"}`); every export gets its
//! own swappable handle around the shared implementation.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::common::CallError;

/// Native implementation shared by every unit that exports it
pub type NativeFn = Arc<dyn Fn(Value) -> Result<Value, CallError> + Send + Sync>;

/// Table of host-provided functions
#[derive(Clone, Default)]
pub struct Builtins {
    functions: HashMap<String, NativeFn>,
}

impl Builtins {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the standard functions: `identity`, `length`, `upper`,
    /// `lower`, `sum`
    pub fn standard() -> Self {
        let mut builtins = Self::new();
        builtins.register("identity", Ok);
        builtins.register("length", length);
        builtins.register("upper", |input| map_string(input, str::to_uppercase));
        builtins.register("lower", |input| map_string(input, str::to_lowercase));
        builtins.register("sum", sum);
        builtins
    }

    /// Register a function, replacing any previous one with the same name
    pub fn register<F>(&mut self, name: impl Into<String>, implementation: F)
    where
        F: Fn(Value) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(implementation));
    }

    pub fn get(&self, name: &str) -> Option<NativeFn> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Builtins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtins").field("functions", &self.names()).finish()
    }
}

fn length(input: Value) -> Result<Value, CallError> {
    let len = match &input {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => {
            return Err(CallError::InvalidArguments(format!(
                "length expects a string, array or object, got {}",
                other
            )))
        }
    };
    Ok(json!(len))
}

fn map_string(input: Value, f: fn(&str) -> String) -> Result<Value, CallError> {
    match input {
        Value::String(s) => Ok(Value::String(f(&s))),
        other => Err(CallError::InvalidArguments(format!(
            "expected a string, got {}",
            other
        ))),
    }
}

fn sum(input: Value) -> Result<Value, CallError> {
    let Value::Array(items) = input else {
        return Err(CallError::InvalidArguments(
            "sum expects an array of numbers".to_string(),
        ));
    };

    let mut total = 0.0;
    for item in &items {
        total += item.as_f64().ok_or_else(|| {
            CallError::InvalidArguments(format!("sum expects numbers, got {}", item))
        })?;
    }

    if total.fract() == 0.0 && total.abs() < i64::MAX as f64 {
        Ok(json!(total as i64))
    } else {
        Ok(json!(total))
    }
}
