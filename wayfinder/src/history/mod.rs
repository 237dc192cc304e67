//! The history abstraction consumed by the router.
//!
//! The router never touches a browser API directly: it talks to a `History`
//! adapter through `push`/`replace`/`go`/`location`/`create_href`/`listen`
//! only. An in-memory implementation suitable for tests and headless
//! embeddings is provided in [`memory`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::helpers::http::{join_href, split_href};

mod memory;

pub use self::memory::MemoryHistory;

/// How the current location was reached, mirroring the history adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryAction {
    /// An entry was restored from the stack (back/forward/`go`).
    Pop,
    /// A new entry was pushed.
    Push,
    /// The current entry was replaced.
    Replace,
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryAction::Pop => f.write_str("POP"),
            HistoryAction::Push => f.write_str("PUSH"),
            HistoryAction::Replace => f.write_str("REPLACE"),
        }
    }
}

/// A parsed location record.
///
/// `key` is an opaque string assigned when the location is created and kept
/// stable across the transition that lands it, so subscribers can tell two
/// visits to the same URL apart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// The path component, always beginning with `/`.
    pub pathname: String,
    /// The query string, without the leading `?`.
    pub search: String,
    /// The fragment, without the leading `#`.
    pub hash: String,
    /// Arbitrary state attached by the caller that pushed the entry.
    pub state: Option<Value>,
    /// Stable identity of this entry.
    pub key: String,
}

impl Location {
    /// Parses an href into a location with a freshly assigned key.
    pub fn from_href(href: &str, state: Option<Value>) -> Location {
        let split = split_href(href);
        Location {
            pathname: split.pathname,
            search: split.search,
            hash: split.hash,
            state,
            key: Uuid::new_v4().to_string(),
        }
    }

    /// The `pathname?search#hash` rendering of this location.
    pub fn href(&self) -> String {
        join_href(&self.pathname, &self.search, &self.hash)
    }

    /// Whether `other` names the same URL, ignoring key and state.
    pub fn same_url(&self, other: &Location) -> bool {
        self.pathname == other.pathname && self.search == other.search && self.hash == other.hash
    }
}

/// Identifies a registered history listener, for removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// The callback invoked when the history stack moves on its own (POP).
pub type HistoryListener = Box<dyn Fn(Location, HistoryAction)>;

/// The adapter interface between the router and a history implementation.
///
/// Implementations notify listeners only for externally initiated movement
/// (`go`, browser back/forward); `push` and `replace` are silent because the
/// router performs them itself at commit time.
pub trait History {
    /// The action that produced the current location.
    fn action(&self) -> HistoryAction;

    /// The current location.
    fn location(&self) -> Location;

    /// Pushes a new entry.
    fn push(&self, location: &Location);

    /// Replaces the current entry.
    fn replace(&self, location: &Location);

    /// Moves `delta` entries through the stack and notifies listeners.
    fn go(&self, delta: isize);

    /// Renders a location as an href string.
    fn create_href(&self, location: &Location) -> String;

    /// Registers a POP listener.
    fn listen(&self, listener: HistoryListener) -> ListenerId;

    /// Removes a previously registered listener.
    fn unlisten(&self, id: ListenerId);
}
