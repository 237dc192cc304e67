//! Cooperative cancellation primitives shared by every asynchronous cycle.
//!
//! One `AbortController` is created per navigation and per fetcher cycle; all
//! loaders and actions belonging to that cycle observe the same `AbortSignal`.
//! Aborting never unwinds user code: handlers keep running, and the engine
//! discards their results after the next await point.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Owns the aborted flag for one unit of asynchronous work.
///
/// Dropping the controller does not abort; cancellation is always an explicit
/// `abort()` call by the superseding cycle.
pub struct AbortController {
    flag: Rc<Cell<bool>>,
}

impl AbortController {
    /// Creates a controller in the non-aborted state.
    pub fn new() -> AbortController {
        AbortController {
            flag: Rc::new(Cell::new(false)),
        }
    }

    /// Returns a signal observing this controller.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            flag: self.flag.clone(),
        }
    }

    /// Marks the controller as aborted. Idempotent.
    pub fn abort(&self) {
        self.flag.set(true);
    }

    /// Whether `abort` has been called.
    pub fn aborted(&self) -> bool {
        self.flag.get()
    }
}

impl Default for AbortController {
    fn default() -> AbortController {
        AbortController::new()
    }
}

impl fmt::Debug for AbortController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortController")
            .field("aborted", &self.flag.get())
            .finish()
    }
}

/// A read-only view of an `AbortController`, handed to loaders and actions.
#[derive(Clone)]
pub struct AbortSignal {
    flag: Rc<Cell<bool>>,
}

impl AbortSignal {
    /// Whether the owning controller has been aborted.
    pub fn aborted(&self) -> bool {
        self.flag.get()
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.flag.get())
            .finish()
    }
}
