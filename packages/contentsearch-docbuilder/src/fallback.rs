//! Ambient language-fallback scopes.
//!
//! Reading a field value may substitute a different language variant when
//! the requested one is absent. Whether that substitution applies is an
//! ambient, per-thread setting with two independent scopes: one covering a
//! whole source item, one covering a single field operation. Scopes are
//! established with an RAII guard that restores the immediately enclosing
//! value on every exit path, including unwind.
//!
//! The ambient state is per execution context. It does not flow into worker
//! threads on its own; parallel passes capture the current value before
//! fan-out and re-enter it inside each worker (see
//! `DocumentBuilder::add_computed_fields`).

use std::cell::Cell;
use std::marker::PhantomData;
use std::thread::LocalKey;

/// Which ambient flag a guard overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackScope {
    /// Item-level fallback, scoped around a whole indexable.
    Item,
    /// Field-level fallback, scoped around one field operation.
    Field,
}

thread_local! {
    static ITEM_FALLBACK: Cell<Option<bool>> = const { Cell::new(None) };
    static FIELD_FALLBACK: Cell<Option<bool>> = const { Cell::new(None) };
}

fn cell_of(scope: FallbackScope) -> &'static LocalKey<Cell<Option<bool>>> {
    match scope {
        FallbackScope::Item => &ITEM_FALLBACK,
        FallbackScope::Field => &FIELD_FALLBACK,
    }
}

/// Current ambient value for `scope` on this thread. `None` means no
/// enclosing scope has set the flag.
pub fn current(scope: FallbackScope) -> Option<bool> {
    cell_of(scope).with(Cell::get)
}

/// Scoped override of one ambient fallback flag.
///
/// Dropping the guard restores the value that was ambient when it was
/// entered, so nested guards unwind to the immediately enclosing value,
/// not to a global default.
#[derive(Debug)]
pub struct FallbackGuard {
    scope: FallbackScope,
    previous: Option<bool>,
    // restore must happen on the thread that entered the scope
    _not_send: PhantomData<*const ()>,
}

impl FallbackGuard {
    pub fn enter(scope: FallbackScope, enabled: Option<bool>) -> Self {
        let previous = cell_of(scope).with(|cell| cell.replace(enabled));
        Self {
            scope,
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Drop for FallbackGuard {
    fn drop(&mut self) {
        cell_of(self.scope).with(|cell| cell.set(self.previous));
    }
}

/// Run `body` under a scoped override of `scope`. The override is removed
/// on return and on unwind; failures propagate unchanged.
pub fn with_scope<T>(scope: FallbackScope, enabled: Option<bool>, body: impl FnOnce() -> T) -> T {
    let _guard = FallbackGuard::enter(scope, enabled);
    body()
}
