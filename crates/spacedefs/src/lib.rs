//! spacedefs
//!
//! Directory-driven definition registry. Every subdirectory of a space root
//! is a slot; the slot's unit source (`<slot>/<slot>.json`, or a compiled
//! library) is loaded into its own namespace and the export named after the
//! slot becomes the slot's definition. Function definitions are hot-swappable
//! so a reload reaches callers that already hold them.

pub mod builtins;
pub mod common;
pub mod config;
pub mod definition;
pub mod script;
pub mod space;
pub mod swap;
pub mod unit;

pub use builtins::Builtins;
pub use common::{CallError, ConfigError, LoadError, SpaceError, SpaceResult};
pub use config::{LoaderKind, SpaceConfig};
pub use definition::{extract, Definition, Function};
pub use space::{
    source_registry, Namespace, ReloadSummary, SlotValue, SpaceDefs, SpaceRegistry, SpaceWalker,
    SpaceWatcher,
};
pub use swap::{make_swappable, Swappable};
pub use unit::{DylibLoader, LoadContext, Registrar, SourceLoader, Unit, UnitLoader};
