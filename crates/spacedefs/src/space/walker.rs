//! Space Walker
//!
//! Traverses a space root top-down. At each directory the immediate
//! subdirectories are listed in name order; each one that does not start with
//! the reserved prefix is a slot, processed before the walker descends. The
//! walker still descends into reserved directories, so slots nested below
//! them are found. Directories that cannot be read are skipped.

use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Namespace, SlotValue, SpaceDefs};
use crate::common::{LoadError, SpaceError, SpaceResult};
use crate::definition::{extract, Definition};
use crate::unit::{LoadContext, UnitLoader};

/// Names starting with this prefix are internal (`__pycache__`, `_drafts`)
pub const DEFAULT_RESERVED_PREFIX: &str = "_";

/// A slot directory found during traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotEntry {
    pub name: String,
    pub dir: PathBuf,
    /// Expected unit source, `<dir>/<name>.<ext>`
    pub source: PathBuf,
}

/// Immediate contents of one directory
#[derive(Debug, Default)]
struct Level {
    slots: Vec<SlotEntry>,
    subdirs: Vec<PathBuf>,
}

pub struct SpaceWalker {
    loader: Arc<dyn UnitLoader>,
    reserved_prefix: String,
}

impl SpaceWalker {
    pub fn new(loader: Arc<dyn UnitLoader>) -> Self {
        Self {
            loader,
            reserved_prefix: DEFAULT_RESERVED_PREFIX.to_string(),
        }
    }

    /// Use a different reserved prefix; an empty prefix reserves nothing
    pub fn with_reserved_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reserved_prefix = prefix.into();
        self
    }

    pub fn loader(&self) -> &dyn UnitLoader {
        self.loader.as_ref()
    }

    pub fn reserved_prefix(&self) -> &str {
        &self.reserved_prefix
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        !self.reserved_prefix.is_empty() && name.starts_with(&self.reserved_prefix)
    }

    /// Expected unit source for slot `name` inside `parent`
    pub fn source_path(&self, parent: &Path, name: &str) -> PathBuf {
        parent
            .join(name)
            .join(format!("{}.{}", name, self.loader.extension()))
    }

    /// List every slot under `root` in traversal order
    pub fn slots(&self, root: &Path) -> SpaceResult<Vec<SlotEntry>> {
        if !root.is_dir() {
            return Err(SpaceError::RootNotFound(root.to_path_buf()));
        }

        let mut slots = Vec::new();
        self.walk(root, &mut |slot: SlotEntry| -> SpaceResult<ControlFlow<()>> {
            slots.push(slot);
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(slots)
    }

    /// Hand each slot under `dir` to `visit` in traversal order until it
    /// breaks. Directories are only listed once the walk reaches them.
    fn walk<F>(&self, dir: &Path, visit: &mut F) -> SpaceResult<ControlFlow<()>>
    where
        F: FnMut(SlotEntry) -> SpaceResult<ControlFlow<()>>,
    {
        let level = self.read_level(dir);

        for slot in level.slots {
            if visit(slot)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }

        for subdir in level.subdirs {
            if self.walk(&subdir, visit)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    fn read_level(&self, dir: &Path) -> Level {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping unreadable directory {:?}: {}", dir, e);
                return Level::default();
            }
        };

        let mut level = Level::default();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry in {:?}: {}", dir, e);
                    continue;
                }
            };
            let path = entry.path();

            // Symlinked directories are slots but are never descended into
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!("Skipping {:?}: {}", path, e);
                    continue;
                }
            };
            let descend = file_type.is_dir();
            if !descend && !(file_type.is_symlink() && path.is_dir()) {
                continue;
            }
            if descend {
                level.subdirs.push(path.clone());
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                debug!("Non UTF-8 directory {:?} is not a slot", path);
                continue;
            };

            if self.is_reserved(name) {
                debug!("Reserved directory {:?} is not a slot", path);
                continue;
            }

            level.slots.push(SlotEntry {
                name: name.to_string(),
                source: self.source_path(dir, name),
                dir: path,
            });
        }

        level.slots.sort_by(|a, b| a.name.cmp(&b.name));
        level.subdirs.sort();
        level
    }

    /// Discover the definitions of the space at `root`
    ///
    /// With `load_defs` each slot's unit is loaded and its same-named export
    /// recorded; otherwise the candidate source path is recorded without
    /// touching the file. Every recorded value is also published into
    /// `namespace` under the slot name. The walk ends right after the slot
    /// named `stop_at`, if one is given and found.
    ///
    /// A slot without a source, whose unit depends on itself, or whose unit
    /// lacks the same-named export is left out. Any other load failure aborts
    /// discovery; bindings already published stay in `namespace`.
    pub fn discover(
        &self,
        root: &Path,
        load_defs: bool,
        stop_at: Option<&str>,
        namespace: &mut Namespace,
    ) -> SpaceResult<SpaceDefs> {
        info!("Discovering definitions in {:?}", root);

        if !root.is_dir() {
            return Err(SpaceError::RootNotFound(root.to_path_buf()));
        }

        // Declared dependencies are checked against every slot with a source
        let ctx = if load_defs {
            LoadContext::with_slots(
                self.slots(root)?
                    .into_iter()
                    .filter(|slot| slot.source.is_file())
                    .map(|slot| slot.name),
            )
        } else {
            LoadContext::new()
        };

        let mut defs = SpaceDefs::new();
        let mut visited = 0usize;
        self.walk(root, &mut |slot: SlotEntry| -> SpaceResult<ControlFlow<()>> {
            visited += 1;
            let value = if load_defs {
                self.load_slot(&slot, &ctx)?.map(SlotValue::Definition)
            } else {
                Some(SlotValue::Path(slot.source.clone()))
            };

            if let Some(value) = value {
                namespace.publish(slot.name.clone(), value.clone());
                defs.insert(slot.name.clone(), value);
            }

            if stop_at == Some(slot.name.as_str()) {
                debug!("Found {}, stopping discovery", slot.name);
                return Ok(ControlFlow::Break(()));
            }
            Ok(ControlFlow::Continue(()))
        })?;

        info!(
            "Discovered {} definitions from {} slots in {:?}",
            defs.len(),
            visited,
            root
        );
        Ok(defs)
    }

    fn load_slot(&self, slot: &SlotEntry, ctx: &LoadContext) -> SpaceResult<Option<Definition>> {
        match self.loader.load(&slot.source, ctx) {
            Ok(unit) => {
                let definition = extract(Some(&unit));
                if definition.is_none() {
                    debug!(
                        "Unit {} exports no {} (exports: {:?})",
                        unit.name(),
                        slot.name,
                        unit.export_names()
                    );
                }
                Ok(definition)
            }
            Err(LoadError::NotFound(path)) => {
                debug!("No unit source for slot {} at {:?}", slot.name, path);
                Ok(None)
            }
            Err(err @ LoadError::SelfDependency(_)) => {
                warn!("Skipping slot {}: {}", slot.name, err);
                Ok(None)
            }
            Err(source) => Err(SpaceError::Load {
                slot: slot.name.clone(),
                path: slot.source.clone(),
                source,
            }),
        }
    }
}

impl std::fmt::Debug for SpaceWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceWalker")
            .field("extension", &self.loader.extension())
            .field("reserved_prefix", &self.reserved_prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::Builtins;
    use crate::unit::SourceLoader;
    use serde_json::json;
    use tempfile::TempDir;

    fn walker() -> SpaceWalker {
        SpaceWalker::new(Arc::new(SourceLoader::new(Builtins::standard())))
    }

    fn slot_dir(root: &Path, rel: &str) -> PathBuf {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_unit(root: &Path, rel: &str, content: &str) {
        let dir = slot_dir(root, rel);
        let name = dir.file_name().unwrap().to_str().unwrap().to_string();
        fs::write(dir.join(format!("{}.json", name)), content).unwrap();
    }

    fn object_unit(name: &str, value: serde_json::Value) -> String {
        json!({"exports": {name: {"type": "object", "value": value}}}).to_string()
    }

    #[test]
    fn test_empty_root() {
        let dir = TempDir::new().unwrap();
        let mut ns = Namespace::new();
        ns.publish("existing", SlotValue::Path(PathBuf::from("/kept")));

        let defs = walker().discover(dir.path(), true, None, &mut ns).unwrap();
        assert!(defs.is_empty());
        assert_eq!(ns.names(), vec!["existing"]);
    }

    #[test]
    fn test_definition_published_to_namespace() {
        let dir = TempDir::new().unwrap();
        write_unit(dir.path(), "foo", &object_unit("foo", json!({"n": 1})));

        let mut ns = Namespace::new();
        let defs = walker().discover(dir.path(), true, None, &mut ns).unwrap();

        assert_eq!(defs.len(), 1);
        let foo = defs.get("foo").unwrap();
        assert_eq!(foo.as_definition().unwrap().as_object(), Some(&json!({"n": 1})));
        assert!(ns.get("foo").unwrap().same(foo));
    }

    #[test]
    fn test_missing_export_omitted() {
        let dir = TempDir::new().unwrap();
        write_unit(dir.path(), "bar", &object_unit("helper", json!(1)));

        let mut ns = Namespace::new();
        let defs = walker().discover(dir.path(), true, None, &mut ns).unwrap();
        assert!(!defs.contains_key("bar"));
        assert!(!ns.contains("bar"));
    }

    #[test]
    fn test_missing_source_omitted() {
        let dir = TempDir::new().unwrap();
        slot_dir(dir.path(), "baz");
        fs::write(dir.path().join("baz").join("other.json"), "{}").unwrap();

        let defs = walker()
            .discover(dir.path(), true, None, &mut Namespace::new())
            .unwrap();
        assert!(defs.is_empty());
    }

    #[test]
    fn test_path_only_mode() {
        let dir = TempDir::new().unwrap();
        write_unit(dir.path(), "good", &object_unit("good", json!(1)));
        write_unit(dir.path(), "broken", "{ not json");

        let mut ns = Namespace::new();
        let defs = walker().discover(dir.path(), false, None, &mut ns).unwrap();

        assert_eq!(
            defs.get("good").unwrap().as_path(),
            Some(dir.path().join("good/good.json").as_path())
        );
        assert_eq!(
            defs.get("broken").unwrap().as_path(),
            Some(dir.path().join("broken/broken.json").as_path())
        );
        assert_eq!(ns.path("good"), Some(dir.path().join("good/good.json").as_path()));
    }

    #[test]
    fn test_reserved_directories_are_not_slots() {
        let dir = TempDir::new().unwrap();
        write_unit(dir.path(), "_private", &object_unit("_private", json!(1)));
        write_unit(dir.path(), "__cache__", &object_unit("__cache__", json!(1)));
        write_unit(dir.path(), "visible", &object_unit("visible", json!(1)));

        for load_defs in [true, false] {
            let defs = walker()
                .discover(dir.path(), load_defs, None, &mut Namespace::new())
                .unwrap();
            let mut names: Vec<&String> = defs.keys().collect();
            names.sort();
            assert_eq!(names, vec!["visible"]);
        }
    }

    #[test]
    fn test_slots_below_reserved_directories_found() {
        let dir = TempDir::new().unwrap();
        write_unit(dir.path(), "_private", &object_unit("_private", json!(1)));
        write_unit(dir.path(), "_private/inner", &object_unit("inner", json!("i")));
        write_unit(dir.path(), "_a/_b/deep", &object_unit("deep", json!("d")));

        let mut ns = Namespace::new();
        let defs = walker().discover(dir.path(), true, None, &mut ns).unwrap();

        let mut names: Vec<&String> = defs.keys().collect();
        names.sort();
        assert_eq!(names, vec!["deep", "inner"]);
        assert_eq!(ns.object("inner"), Some(&json!("i")));
    }

    #[test]
    fn test_custom_reserved_prefix() {
        let dir = TempDir::new().unwrap();
        write_unit(dir.path(), "_visible", &object_unit("_visible", json!(1)));
        write_unit(dir.path(), ".hidden", &object_unit(".hidden", json!(1)));

        let defs = walker()
            .with_reserved_prefix(".")
            .discover(dir.path(), true, None, &mut Namespace::new())
            .unwrap();
        assert!(defs.contains_key("_visible"));
        assert!(!defs.contains_key(".hidden"));
    }

    #[test]
    fn test_nested_slots_discovered() {
        let dir = TempDir::new().unwrap();
        write_unit(dir.path(), "group", "{}");
        write_unit(dir.path(), "group/child", &object_unit("child", json!("c")));

        let defs = walker()
            .discover(dir.path(), true, None, &mut Namespace::new())
            .unwrap();
        assert!(!defs.contains_key("group"));
        assert!(defs.contains_key("child"));
    }

    #[test]
    fn test_traversal_order() {
        let dir = TempDir::new().unwrap();
        slot_dir(dir.path(), "b/d");
        slot_dir(dir.path(), "a/c");

        let names: Vec<String> = walker()
            .slots(dir.path())
            .unwrap()
            .into_iter()
            .map(|slot| slot.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_stop_at() {
        let dir = TempDir::new().unwrap();
        write_unit(dir.path(), "a", &object_unit("a", json!(1)));
        write_unit(dir.path(), "b", &object_unit("b", json!(2)));
        write_unit(dir.path(), "c", &object_unit("c", json!(3)));

        let defs = walker()
            .discover(dir.path(), true, Some("b"), &mut Namespace::new())
            .unwrap();
        assert!(defs.contains_key("b"));
        assert!(!defs.contains_key("c"));
    }

    #[test]
    fn test_stop_at_ends_walk_early() {
        let dir = TempDir::new().unwrap();
        slot_dir(dir.path(), "a");
        slot_dir(dir.path(), "b/c");
        slot_dir(dir.path(), "b/d");

        let mut visited = Vec::new();
        let flow = walker()
            .walk(dir.path(), &mut |slot: SlotEntry| -> SpaceResult<ControlFlow<()>> {
                let stop = slot.name == "b";
                visited.push(slot.name);
                Ok(if stop {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                })
            })
            .unwrap();

        assert!(flow.is_break());
        assert_eq!(visited, vec!["a", "b"]);
    }

    #[test]
    fn test_stop_at_in_path_only_mode() {
        let dir = TempDir::new().unwrap();
        slot_dir(dir.path(), "a");
        slot_dir(dir.path(), "a/nested");
        slot_dir(dir.path(), "b");

        let defs = walker()
            .discover(dir.path(), false, Some("a"), &mut Namespace::new())
            .unwrap();
        assert_eq!(defs.len(), 1);
        assert!(defs.contains_key("a"));
    }

    #[test]
    fn test_unreadable_level_is_empty() {
        let dir = TempDir::new().unwrap();
        let level = walker().read_level(&dir.path().join("vanished"));
        assert!(level.slots.is_empty());
        assert!(level.subdirs.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        write_unit(dir.path(), "a", &object_unit("a", json!(1)));
        write_unit(dir.path(), "z/later", &object_unit("later", json!(2)));
        let locked = dir.path().join("z");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let full = walker().discover(dir.path(), true, None, &mut Namespace::new());
        let stopped = walker().discover(dir.path(), true, Some("a"), &mut Namespace::new());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        // Privileged users can still read the locked directory
        assert!(full.unwrap().contains_key("a"));
        assert_eq!(stopped.unwrap().len(), 1);
    }

    #[test]
    fn test_fatal_error_aborts() {
        let dir = TempDir::new().unwrap();
        write_unit(dir.path(), "a", &object_unit("a", json!(1)));
        write_unit(dir.path(), "b", "{ not json");
        write_unit(dir.path(), "c", &object_unit("c", json!(3)));

        let mut ns = Namespace::new();
        let err = walker().discover(dir.path(), true, None, &mut ns).unwrap_err();

        match err {
            SpaceError::Load { slot, source, .. } => {
                assert_eq!(slot, "b");
                assert!(matches!(source, LoadError::Parse { .. }));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(ns.contains("a"));
        assert!(!ns.contains("c"));
    }

    #[test]
    fn test_self_dependency_skipped() {
        let dir = TempDir::new().unwrap();
        write_unit(
            dir.path(),
            "loop",
            &json!({
                "requires": ["loop"],
                "exports": {"loop": {"type": "object", "value": 1}}
            })
            .to_string(),
        );
        write_unit(dir.path(), "ok", &object_unit("ok", json!(2)));

        let defs = walker()
            .discover(dir.path(), true, None, &mut Namespace::new())
            .unwrap();
        assert!(!defs.contains_key("loop"));
        assert!(defs.contains_key("ok"));
    }

    #[test]
    fn test_dependencies_checked_against_space() {
        let dir = TempDir::new().unwrap();
        let with_dep = |dep: &str| {
            json!({
                "requires": [dep],
                "exports": {"app": {"type": "object", "value": 1}}
            })
            .to_string()
        };

        write_unit(dir.path(), "app", &with_dep("lib"));
        write_unit(dir.path(), "nested/lib", &object_unit("lib", json!(0)));
        let defs = walker()
            .discover(dir.path(), true, None, &mut Namespace::new())
            .unwrap();
        assert!(defs.contains_key("app"));

        write_unit(dir.path(), "app", &with_dep("missing"));
        let err = walker()
            .discover(dir.path(), true, None, &mut Namespace::new())
            .unwrap_err();
        assert!(matches!(
            err.load_error(),
            Some(LoadError::MissingDependency { dependency, .. }) if dependency == "missing"
        ));
    }

    #[test]
    fn test_root_not_found() {
        let dir = TempDir::new().unwrap();
        let err = walker()
            .discover(&dir.path().join("nope"), true, None, &mut Namespace::new())
            .unwrap_err();
        assert!(matches!(err, SpaceError::RootNotFound(_)));
    }

    #[test]
    fn test_repeated_discovery_overwrites_bindings() {
        let dir = TempDir::new().unwrap();
        write_unit(dir.path(), "foo", &object_unit("foo", json!(1)));

        let mut ns = Namespace::new();
        let first = walker().discover(dir.path(), true, None, &mut ns).unwrap();
        let second = walker().discover(dir.path(), true, None, &mut ns).unwrap();

        assert!(!first["foo"].same(&second["foo"]));
        assert!(ns.get("foo").unwrap().same(&second["foo"]));
    }
}
