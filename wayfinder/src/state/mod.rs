//! The router's single atomic state snapshot and its store.
//!
//! Every observable fact about the router lives in [`RouterState`]: location,
//! matches, the in-flight transition, revalidation status, loader/action
//! data, exceptions and fetchers. The [`Store`] owns the snapshot; the engine
//! installs complete new states and subscribers are notified synchronously
//! after each commit, so no partial update is ever observable.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use http::StatusCode;
use log::trace;
use serde_json::Value;

use crate::handler::{DataResponse, Submission};
use crate::history::{HistoryAction, Location};
use crate::router::matcher::RouteMatch;

/// Whether a navigation is idle, running loaders, or running an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionState {
    /// No navigation in flight.
    Idle,
    /// Loaders are running.
    Loading,
    /// An action or loader-submission is running.
    Submitting,
}

/// What kind of navigation is in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionKind {
    /// No navigation in flight.
    Idle,
    /// A plain GET navigation.
    NormalLoad,
    /// A navigation started by a redirect from a plain load.
    NormalRedirect,
    /// A GET submission: form data serialized into the search string.
    LoaderSubmission,
    /// A mutation submission dispatching to an action.
    ActionSubmission,
    /// The loader pass that follows a completed action.
    ActionReload,
    /// A navigation started by a redirect out of a submission flow.
    SubmissionRedirect,
}

/// The in-flight navigation's status.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    /// Coarse state: idle, loading or submitting.
    pub state: TransitionState,
    /// Fine-grained kind of the transition.
    pub kind: TransitionKind,
    /// The destination, absent when idle.
    pub location: Option<Location>,
    /// The submission driving the transition, when there is one.
    pub submission: Option<Submission>,
}

impl Transition {
    /// The resting transition.
    pub fn idle() -> Transition {
        Transition {
            state: TransitionState::Idle,
            kind: TransitionKind::Idle,
            location: None,
            submission: None,
        }
    }

    /// Whether no navigation is in flight.
    pub fn is_idle(&self) -> bool {
        self.state == TransitionState::Idle
    }
}

/// Whether an explicit `revalidate()` cycle is in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevalidationState {
    /// No revalidation requested.
    Idle,
    /// Loaders are rerunning for the current location.
    Loading,
}

/// Coarse state of a fetcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetcherState {
    /// At rest.
    Idle,
    /// A loader call or post-action revalidation is in flight.
    Loading,
    /// A submission is in flight.
    Submitting,
}

/// Fine-grained state of a fetcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetcherKind {
    /// Never used; the sentinel returned for unknown keys.
    Init,
    /// A plain loader call.
    NormalLoad,
    /// A GET submission to a loader.
    LoaderSubmission,
    /// A mutation submission to an action.
    ActionSubmission,
    /// The current page's loaders are revalidating after a completed action.
    ActionReload,
    /// The action redirected; a navigation is landing it.
    ActionRedirect,
    /// The last cycle completed.
    Done,
}

/// An out-of-band, keyed loader/action call, decoupled from navigation.
#[derive(Clone, Debug, PartialEq)]
pub struct Fetcher {
    /// Coarse state.
    pub state: FetcherState,
    /// Fine-grained state.
    pub kind: FetcherKind,
    /// The submission driving the cycle, when there is one.
    pub submission: Option<Submission>,
    /// The most recently committed data for this key.
    pub data: Option<Value>,
}

impl Fetcher {
    /// The sentinel returned for unknown fetcher keys.
    pub fn idle() -> Fetcher {
        Fetcher {
            state: FetcherState::Idle,
            kind: FetcherKind::Init,
            submission: None,
            data: None,
        }
    }
}

/// An exception routed to a boundary: either a thrown/returned response with
/// status ≥ 400, or any other thrown value.
#[derive(Clone)]
pub enum RouteException {
    /// A response-shaped exception (404/405 synthesis, thrown responses).
    Response(Rc<DataResponse>),
    /// Any other thrown value.
    Error(Rc<anyhow::Error>),
}

impl RouteException {
    /// The HTTP status, for response-shaped exceptions.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RouteException::Response(response) => Some(response.status()),
            RouteException::Error(_) => None,
        }
    }

    /// The response, for response-shaped exceptions.
    pub fn response(&self) -> Option<&DataResponse> {
        match self {
            RouteException::Response(response) => Some(response),
            RouteException::Error(_) => None,
        }
    }
}

impl fmt::Display for RouteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteException::Response(response) => {
                write!(f, "response with status {}", response.status())
            }
            RouteException::Error(error) => write!(f, "{}", error),
        }
    }
}

impl fmt::Debug for RouteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteException::Response(response) => f
                .debug_tuple("RouteException::Response")
                .field(&response.status())
                .finish(),
            RouteException::Error(error) => {
                f.debug_tuple("RouteException::Error").field(error).finish()
            }
        }
    }
}

/// The atomic state snapshot published to subscribers.
#[derive(Clone, Debug)]
pub struct RouterState {
    /// How the current location was reached.
    pub history_action: HistoryAction,
    /// The current location.
    pub location: Location,
    /// Matches for the current location; `None` on a 404, in which case a
    /// synthesized root-level 404 exception is present.
    pub matches: Option<Vec<RouteMatch>>,
    /// False only while the initial hydration load is still running.
    pub initialized: bool,
    /// The in-flight navigation.
    pub transition: Transition,
    /// Whether an explicit revalidation is in flight.
    pub revalidation: RevalidationState,
    /// Committed loader data, keyed by route id.
    pub loader_data: HashMap<String, Value>,
    /// The most recent action's data, keyed by the route id it ran on.
    pub action_data: Option<HashMap<String, Value>>,
    /// Exceptions keyed by the boundary route id that caught them.
    pub exceptions: Option<HashMap<String, RouteException>>,
    /// All known fetchers, keyed by caller-supplied key.
    pub fetchers: HashMap<String, Fetcher>,
}

impl RouterState {
    /// The exception recorded at `route_id`, if any.
    pub fn exception(&self, route_id: &str) -> Option<&RouteException> {
        self.exceptions.as_ref()?.get(route_id)
    }
}

/// Identifies a subscriber, for removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Subscriber = Rc<dyn Fn(&RouterState)>;

/// Owns the snapshot and the subscriber list.
pub(crate) struct Store {
    state: RefCell<RouterState>,
    subscribers: RefCell<Vec<(SubscriberId, Subscriber)>>,
    next_subscriber: Cell<u64>,
}

impl Store {
    pub(crate) fn new(initial: RouterState) -> Store {
        Store {
            state: RefCell::new(initial),
            subscribers: RefCell::new(Vec::new()),
            next_subscriber: Cell::new(0),
        }
    }

    /// Clones the current snapshot.
    pub(crate) fn snapshot(&self) -> RouterState {
        self.state.borrow().clone()
    }

    /// Reads from the current snapshot without cloning it.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&RouterState) -> R) -> R {
        f(&self.state.borrow())
    }

    /// Installs a state change and notifies subscribers synchronously.
    ///
    /// The borrow is released before callbacks run, so subscribers may
    /// re-enter the router (navigate, read state) from inside the callback.
    pub(crate) fn update(&self, f: impl FnOnce(&mut RouterState)) {
        let snapshot = {
            let mut state = self.state.borrow_mut();
            f(&mut state);
            state.clone()
        };
        trace!(
            "state committed: {} {} (transition {:?})",
            snapshot.history_action,
            snapshot.location.pathname,
            snapshot.transition.state
        );
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, subscriber)| subscriber.clone())
            .collect();
        for subscriber in subscribers {
            subscriber(&snapshot);
        }
    }

    pub(crate) fn subscribe(&self, subscriber: impl Fn(&RouterState) + 'static) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber.get());
        self.next_subscriber.set(id.0 + 1);
        self.subscribers.borrow_mut().push((id, Rc::new(subscriber)));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers
            .borrow_mut()
            .retain(|(subscriber_id, _)| *subscriber_id != id);
    }

    pub(crate) fn clear_subscribers(&self) {
        self.subscribers.borrow_mut().clear();
    }
}
