//! JSON Unit Sources
//!
//! The default unit format. A slot `greet` is loaded from
//! `greet/greet.json`:
//!
//! ```json
//! {
//!   "description": "Greets people",
//!   "requires": ["format"],
//!   "exports": {
//!     "greet":    { "type": "script", "runtime": "sh", "entrypoint": "greet.sh", "timeout_ms": 5000 },
//!     "defaults": { "type": "object", "value": { "greeting": "hello" } },
//!     "shout":    { "type": "builtin", "function": "upper" }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::{unit_name, LoadContext, Registrar, Unit, UnitLoader};
use crate::builtins::Builtins;
use crate::common::LoadError;
use crate::definition::Definition;
use crate::script::{Runtime, ScriptFunction};

/// Largest unit source accepted (1 MB)
pub const MAX_SOURCE_SIZE: u64 = 1_000_000;

/// Parsed unit source file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitSource {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub exports: HashMap<String, ExportSource>,
}

/// One export declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExportSource {
    Object {
        value: Value,
    },
    Builtin {
        function: String,
    },
    Script {
        runtime: String,
        entrypoint: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        /// Per-call limit; defaults to `DEFAULT_SCRIPT_TIMEOUT`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
}

/// Loader for JSON unit sources
#[derive(Debug, Clone, Default)]
pub struct SourceLoader {
    builtins: Builtins,
}

impl SourceLoader {
    pub fn new(builtins: Builtins) -> Self {
        Self { builtins }
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    /// Read and parse a unit source without building its exports
    pub fn read_source(path: &Path) -> Result<UnitSource, LoadError> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LoadError::NotFound(path.to_path_buf()))
            }
            Err(source) => {
                return Err(LoadError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if !metadata.is_file() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        if metadata.len() > MAX_SOURCE_SIZE {
            return Err(LoadError::TooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                max: MAX_SOURCE_SIZE,
            });
        }

        let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| LoadError::Parse {
            unit: unit_name(path),
            source,
        })
    }

    fn build_export(
        &self,
        unit: &str,
        unit_dir: &Path,
        export: ExportSource,
    ) -> Result<Definition, LoadError> {
        match export {
            ExportSource::Object { value } => Ok(Definition::object(value)),
            ExportSource::Builtin { function } => {
                let implementation =
                    self.builtins
                        .get(&function)
                        .ok_or_else(|| LoadError::UnknownBuiltin {
                            unit: unit.to_string(),
                            builtin: function.clone(),
                        })?;
                Ok(Definition::function(move |input| implementation(input)))
            }
            ExportSource::Script {
                runtime,
                entrypoint,
                args,
                env,
                timeout_ms,
            } => {
                let runtime: Runtime =
                    runtime
                        .parse()
                        .map_err(|reason| LoadError::InvalidExport {
                            unit: unit.to_string(),
                            reason,
                        })?;
                if entrypoint.trim().is_empty() {
                    return Err(LoadError::InvalidExport {
                        unit: unit.to_string(),
                        reason: "script entrypoint must not be empty".to_string(),
                    });
                }
                let mut script =
                    ScriptFunction::new(unit, unit_dir, runtime, &entrypoint, args, &env);
                if let Some(ms) = timeout_ms {
                    if ms == 0 {
                        return Err(LoadError::InvalidExport {
                            unit: unit.to_string(),
                            reason: "script timeout_ms must be positive".to_string(),
                        });
                    }
                    script = script.with_timeout(Duration::from_millis(ms));
                }
                Ok(script.into_definition())
            }
        }
    }
}

impl UnitLoader for SourceLoader {
    fn extension(&self) -> &str {
        "json"
    }

    fn load(&self, path: &Path, ctx: &LoadContext) -> Result<Unit, LoadError> {
        let source = Self::read_source(path)?;
        let name = unit_name(path);
        let unit_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut registrar = Registrar::new(name.as_str());
        for dependency in source.requires {
            registrar.require(dependency);
        }

        for (export_name, export) in source.exports {
            let definition = self.build_export(&name, unit_dir, export)?;
            registrar.export(export_name, definition);
        }

        let unit = registrar.finish(path.to_path_buf(), ctx)?;
        debug!(
            "Loaded unit {} from {:?} (exports: {:?})",
            unit.name(),
            path,
            unit.export_names()
        );
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::CallError;
    use crate::definition::extract;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_unit(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let slot = dir.path().join(name);
        fs::create_dir_all(&slot).unwrap();
        let path = slot.join(format!("{}.json", name));
        fs::write(&path, content).unwrap();
        path
    }

    fn loader() -> SourceLoader {
        SourceLoader::new(Builtins::standard())
    }

    #[test]
    fn test_load_object_export() {
        let dir = TempDir::new().unwrap();
        let path = write_unit(
            &dir,
            "settings",
            r#"{"exports": {"settings": {"type": "object", "value": {"retries": 3}}}}"#,
        );

        let unit = loader().load(&path, &LoadContext::new()).unwrap();
        assert_eq!(unit.name(), "settings");
        assert_eq!(unit.origin(), path.as_path());

        let definition = extract(Some(&unit)).unwrap();
        assert_eq!(definition.as_object(), Some(&json!({"retries": 3})));
    }

    #[test]
    fn test_load_builtin_export() {
        let dir = TempDir::new().unwrap();
        let path = write_unit(
            &dir,
            "shout",
            r#"{"exports": {"shout": {"type": "builtin", "function": "upper"}}}"#,
        );

        let unit = loader().load(&path, &LoadContext::new()).unwrap();
        let shout = extract(Some(&unit)).unwrap();
        assert_eq!(shout.call("shout", json!("hey")), Ok(json!("HEY")));
    }

    #[test]
    fn test_builtin_exports_get_independent_handles() {
        let dir = TempDir::new().unwrap();
        let path = write_unit(
            &dir,
            "pair",
            r#"{"exports": {
                "pair": {"type": "builtin", "function": "identity"},
                "other": {"type": "builtin", "function": "identity"}
            }}"#,
        );

        let unit = loader().load(&path, &LoadContext::new()).unwrap();
        let pair = unit.export("pair").unwrap().as_function().unwrap();
        let other = unit.export("other").unwrap().as_function().unwrap();
        pair.set(|_| Ok(json!("swapped")));
        assert_eq!(pair.call(json!(1)), Ok(json!("swapped")));
        assert_eq!(other.call(json!(1)), Ok(json!(1)));
    }

    #[test]
    fn test_unknown_builtin() {
        let dir = TempDir::new().unwrap();
        let path = write_unit(
            &dir,
            "bad",
            r#"{"exports": {"bad": {"type": "builtin", "function": "nope"}}}"#,
        );
        let err = loader().load(&path, &LoadContext::new()).unwrap_err();
        assert!(matches!(err, LoadError::UnknownBuiltin { ref builtin, .. } if builtin == "nope"));
    }

    #[test]
    fn test_unsupported_runtime() {
        let dir = TempDir::new().unwrap();
        let path = write_unit(
            &dir,
            "bad",
            r#"{"exports": {"bad": {"type": "script", "runtime": "perl", "entrypoint": "x.pl"}}}"#,
        );
        let err = loader().load(&path, &LoadContext::new()).unwrap_err();
        assert!(matches!(err, LoadError::InvalidExport { .. }));
    }

    #[test]
    fn test_zero_script_timeout_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_unit(
            &dir,
            "bad",
            r#"{"exports": {"bad": {"type": "script", "runtime": "sh", "entrypoint": "x.sh", "timeout_ms": 0}}}"#,
        );
        let err = loader().load(&path, &LoadContext::new()).unwrap_err();
        assert!(matches!(err, LoadError::InvalidExport { ref reason, .. } if reason.contains("timeout_ms")));
    }

    #[cfg(unix)]
    #[test]
    fn test_script_timeout_from_source() {
        let dir = TempDir::new().unwrap();
        let path = write_unit(
            &dir,
            "slow",
            r#"{"exports": {"slow": {"type": "script", "runtime": "sh", "entrypoint": "slow.sh", "timeout_ms": 150}}}"#,
        );
        fs::write(dir.path().join("slow").join("slow.sh"), "sleep 10\n").unwrap();

        let unit = loader().load(&path, &LoadContext::new()).unwrap();
        let slow = extract(Some(&unit)).unwrap();
        assert!(matches!(
            slow.call("slow", Value::Null),
            Err(CallError::Timeout { timeout_ms: 150, .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = loader()
            .load(&dir.path().join("ghost/ghost.json"), &LoadContext::new())
            .unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
    }

    #[test]
    fn test_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_unit(&dir, "broken", "{ not json");
        let err = loader().load(&path, &LoadContext::new()).unwrap_err();
        assert!(matches!(err, LoadError::Parse { ref unit, .. } if unit == "broken"));
    }

    #[test]
    fn test_too_large() {
        let dir = TempDir::new().unwrap();
        let big = format!(
            r#"{{"description": "{}"}}"#,
            "x".repeat(MAX_SOURCE_SIZE as usize)
        );
        let path = write_unit(&dir, "big", &big);
        let err = loader().load(&path, &LoadContext::new()).unwrap_err();
        assert!(matches!(err, LoadError::TooLarge { .. }));
    }

    #[test]
    fn test_self_requirement() {
        let dir = TempDir::new().unwrap();
        let path = write_unit(&dir, "loop", r#"{"requires": ["loop"]}"#);
        let err = loader().load(&path, &LoadContext::new()).unwrap_err();
        assert!(matches!(err, LoadError::SelfDependency(ref name) if name == "loop"));
    }

    #[test]
    fn test_empty_source_has_no_definition() {
        let dir = TempDir::new().unwrap();
        let path = write_unit(&dir, "empty", "{}");
        let unit = loader().load(&path, &LoadContext::new()).unwrap();
        assert!(extract(Some(&unit)).is_none());
    }

    #[test]
    fn test_extension() {
        assert_eq!(loader().extension(), "json");
    }
}
