//! An in-memory history stack.

use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use super::{History, HistoryAction, HistoryListener, ListenerId, Location};

struct Inner {
    entries: Vec<Location>,
    index: usize,
    action: HistoryAction,
    listeners: Vec<(ListenerId, Rc<HistoryListener>)>,
    next_listener: u64,
}

/// A `History` implementation backed by an in-memory entry stack.
///
/// Useful for tests and for embeddings without a real URL bar. `go` clamps
/// to the stack bounds and notifies listeners with a `Pop` action; `push`
/// truncates any forward entries, as a browser would.
#[derive(Clone)]
pub struct MemoryHistory {
    inner: Rc<RefCell<Inner>>,
}

impl MemoryHistory {
    /// Creates a history whose single entry is `initial`.
    pub fn new(initial: &str) -> MemoryHistory {
        MemoryHistory::with_entries(&[initial], 0)
    }

    /// Creates a history preloaded with `entries`, positioned at `index`.
    ///
    /// `index` is clamped to the entry range; an empty slice produces a
    /// single `/` entry.
    pub fn with_entries(entries: &[&str], index: usize) -> MemoryHistory {
        let mut locations: Vec<Location> = entries
            .iter()
            .map(|href| Location::from_href(href, None))
            .collect();
        if locations.is_empty() {
            locations.push(Location::from_href("/", None));
        }
        let index = index.min(locations.len() - 1);
        MemoryHistory {
            inner: Rc::new(RefCell::new(Inner {
                entries: locations,
                index,
                action: HistoryAction::Pop,
                listeners: Vec::new(),
                next_listener: 0,
            })),
        }
    }

    /// Number of entries currently on the stack.
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Whether the stack is empty. Never true in practice; present for
    /// completeness of the collection-like surface.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    /// The current position within the stack.
    pub fn index(&self) -> usize {
        self.inner.borrow().index
    }
}

impl History for MemoryHistory {
    fn action(&self) -> HistoryAction {
        self.inner.borrow().action
    }

    fn location(&self) -> Location {
        let inner = self.inner.borrow();
        inner.entries[inner.index].clone()
    }

    fn push(&self, location: &Location) {
        let mut inner = self.inner.borrow_mut();
        trace!("memory history push {}", location.href());
        let next = inner.index + 1;
        inner.entries.truncate(next);
        inner.entries.push(location.clone());
        inner.index = next;
        inner.action = HistoryAction::Push;
    }

    fn replace(&self, location: &Location) {
        let mut inner = self.inner.borrow_mut();
        trace!("memory history replace {}", location.href());
        let index = inner.index;
        inner.entries[index] = location.clone();
        inner.action = HistoryAction::Replace;
    }

    fn go(&self, delta: isize) {
        let (location, listeners) = {
            let mut inner = self.inner.borrow_mut();
            let target = inner.index as isize + delta;
            let target = target.max(0).min(inner.entries.len() as isize - 1) as usize;
            trace!("memory history go {} -> index {}", delta, target);
            inner.index = target;
            inner.action = HistoryAction::Pop;
            let listeners: Vec<_> = inner
                .listeners
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect();
            (inner.entries[target].clone(), listeners)
        };
        for listener in listeners {
            listener(location.clone(), HistoryAction::Pop);
        }
    }

    fn create_href(&self, location: &Location) -> String {
        location.href()
    }

    fn listen(&self, listener: HistoryListener) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = ListenerId(inner.next_listener);
        inner.next_listener += 1;
        inner.listeners.push((id, Rc::new(listener)));
        id
    }

    fn unlisten(&self, id: ListenerId) {
        let mut inner = self.inner.borrow_mut();
        inner.listeners.retain(|(listener_id, _)| *listener_id != id);
    }
}
