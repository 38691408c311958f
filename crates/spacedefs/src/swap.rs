//! Swappable Functions
//!
//! A callable whose implementation lives in a shared cell. Every clone of a
//! [`Swappable`] points at the same cell, so replacing the implementation
//! through one handle changes behavior for all of them.
//!
//! `set` exchanges the implementation under a lock and is atomic with respect
//! to `call`: a call observes either the old or the new implementation, never
//! a mix. The lock is released before the implementation runs, so an
//! implementation may itself call `set` on its own handle.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

type Implementation<A, R> = Arc<dyn Fn(A) -> R + Send + Sync>;

/// Hot-swappable function from `A` to `R`
///
/// Functions of several arguments take a tuple.
pub struct Swappable<A, R> {
    current: Arc<RwLock<Implementation<A, R>>>,
}

impl<A, R> Swappable<A, R> {
    pub fn new<F>(implementation: F) -> Self
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        Self {
            current: Arc::new(RwLock::new(Arc::new(implementation))),
        }
    }

    /// Invoke the current implementation
    pub fn call(&self, args: A) -> R {
        let implementation = self.get();
        implementation(args)
    }

    /// Snapshot of the current implementation
    pub fn get(&self) -> Implementation<A, R> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replace the implementation for every holder of this function
    pub fn set<F>(&self, implementation: F)
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        self.replace(implementation);
    }

    /// Replace the implementation, returning the previous one
    pub fn replace<F>(&self, implementation: F) -> Implementation<A, R>
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        self.replace_shared(Arc::new(implementation))
    }

    /// Install another swappable's current implementation into this one
    pub fn swap_from(&self, other: &Swappable<A, R>) {
        if !self.ptr_eq(other) {
            self.replace_shared(other.get());
        }
    }

    /// Whether both handles share the same implementation cell
    pub fn ptr_eq(&self, other: &Swappable<A, R>) -> bool {
        Arc::ptr_eq(&self.current, &other.current)
    }

    fn replace_shared(&self, implementation: Implementation<A, R>) -> Implementation<A, R> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, implementation)
    }
}

impl<A, R> Clone for Swappable<A, R> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
        }
    }
}

impl<A, R> fmt::Debug for Swappable<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Swappable")
            .field("cell", &Arc::as_ptr(&self.current))
            .finish()
    }
}

/// Wrap `implementation` in a [`Swappable`]
pub fn make_swappable<A, R, F>(implementation: F) -> Swappable<A, R>
where
    F: Fn(A) -> R + Send + Sync + 'static,
{
    Swappable::new(implementation)
}
