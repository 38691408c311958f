//! Compiled Units
//!
//! Loads units built as dynamic libraries. A slot `greet` is loaded from
//! `greet/greet.<dll ext>`, which must export the registration entry point:
//!
//! ```ignore
//! #[no_mangle]
//! pub fn spacedefs_register(registrar: &mut spacedefs::unit::Registrar) {
//!     registrar.export_function("greet", |input| Ok(input));
//! }
//! ```
//!
//! The entry point uses the Rust ABI, so the library must be built with the
//! same toolchain and `spacedefs` version as the host.

use std::path::Path;
use std::sync::Arc;

use libloading::{Library, Symbol};
use tracing::debug;

use super::{unit_name, LoadContext, Registrar, Unit, UnitLoader};
use crate::common::LoadError;

/// Symbol every compiled unit exports
pub const ENTRY_POINT: &str = "spacedefs_register";

/// Signature of [`ENTRY_POINT`]
pub type RegisterFn = unsafe extern "Rust" fn(&mut Registrar);

/// Loader for compiled units
#[derive(Debug, Clone, Copy, Default)]
pub struct DylibLoader;

impl DylibLoader {
    pub fn new() -> Self {
        Self
    }
}

impl UnitLoader for DylibLoader {
    fn extension(&self) -> &str {
        std::env::consts::DLL_EXTENSION
    }

    fn load(&self, path: &Path, ctx: &LoadContext) -> Result<Unit, LoadError> {
        if !path.is_file() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        // SAFETY: loading a library runs its initializers; units are trusted
        // code placed in the space by the host.
        let library = unsafe { Library::new(path) }.map_err(|source| LoadError::Library {
            path: path.to_path_buf(),
            source,
        })?;
        let library = Arc::new(library);

        let register: RegisterFn = {
            // SAFETY: the symbol type matches the documented entry point.
            let symbol: Symbol<'_, RegisterFn> = unsafe { library.get(ENTRY_POINT.as_bytes()) }
                .map_err(|_| LoadError::MissingEntryPoint {
                    path: path.to_path_buf(),
                    symbol: ENTRY_POINT,
                })?;
            *symbol
        };

        // SAFETY: `library` is kept loaded by `register_unit` for the call and
        // by every function handle afterwards.
        register_unit(path, &library, |registrar| unsafe { register(registrar) }, ctx)
    }
}

/// Run a unit's registration and tie its functions to `owner`
///
/// Function code lives in the library; every handle must keep it loaded.
fn register_unit<T, F>(
    path: &Path,
    owner: &Arc<T>,
    register: F,
    ctx: &LoadContext,
) -> Result<Unit, LoadError>
where
    T: Send + Sync + 'static,
    F: FnOnce(&mut Registrar),
{
    let mut registrar = Registrar::new(unit_name(path));
    register(&mut registrar);
    registrar.pin_functions(owner);

    debug!("Loaded compiled unit {} from {:?}", registrar.unit_name(), path);
    registrar.finish(path.to_path_buf(), ctx)
}
