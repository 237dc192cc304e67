//! Defines the `Router` and supporting types.
//!
//! The router couples URL navigation with per-route data fetching: it owns
//! the single state snapshot, plans which loaders and actions run for each
//! transition, executes them under a shared abort signal, routes redirects
//! and exceptions, and keeps independent fetchers consistent with it all.

pub mod matcher;
pub mod tree;

pub(crate) mod engine;
pub(crate) mod fetch;
pub(crate) mod planner;
pub(crate) mod redirect;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::channel::oneshot;
use futures::task::{LocalSpawn, LocalSpawnExt};
use http::Method;
use log::{error, trace, warn};
use mime::Mime;
use serde_json::Value;

use crate::handler::Submission;
use crate::helpers::http::{join_href, join_paths, FormData};
use crate::history::{History, ListenerId, Location};
use crate::signal::AbortController;
use crate::state::{Fetcher, RouteException, RouterState, Store, SubscriberId, Transition};

use self::engine::{HistoryOp, NavKind, Navigation};
use self::matcher::{flatten_branches, match_routes, Branch, RouteMatch};
use self::tree::{normalize_routes, DataRoute, InvalidRoutes, RouteDefinition};

pub use self::redirect::REVALIDATE_HEADER;

/// State seeded into the router at construction, typically produced by a
/// server render of the same routes.
#[derive(Default)]
pub struct HydrationData {
    /// Loader data keyed by route id.
    pub loader_data: HashMap<String, Value>,
    /// Action data keyed by route id.
    pub action_data: Option<HashMap<String, Value>>,
    /// Exceptions keyed by boundary route id.
    pub exceptions: Option<HashMap<String, RouteException>>,
}

/// Everything needed to construct a [`Router`].
pub struct RouterConfig {
    routes: Vec<RouteDefinition>,
    history: Rc<dyn History>,
    spawner: Rc<dyn LocalSpawn>,
    basename: String,
    hydration_data: Option<HydrationData>,
}

impl RouterConfig {
    /// Builds a config from the required pieces: the route tree, the history
    /// adapter, and the single-threaded spawner the router schedules its
    /// asynchronous work on.
    pub fn new(
        routes: Vec<RouteDefinition>,
        history: Rc<dyn History>,
        spawner: Rc<dyn LocalSpawn>,
    ) -> RouterConfig {
        RouterConfig {
            routes,
            history,
            spawner,
            basename: String::new(),
            hydration_data: None,
        }
    }

    /// Sets the path prefix the router lives under.
    pub fn basename(mut self, basename: &str) -> RouterConfig {
        self.basename = basename.trim_end_matches('/').to_string();
        self
    }

    /// Seeds initial loader/action data and exceptions.
    pub fn hydration_data(mut self, hydration_data: HydrationData) -> RouterConfig {
        self.hydration_data = Some(hydration_data);
        self
    }
}

/// Options for [`Router::navigate`].
#[derive(Clone, Debug, Default)]
pub struct NavigateOptions {
    /// Replace the current history entry instead of pushing.
    pub replace: bool,
    /// Arbitrary state to attach to the new location.
    pub state: Option<Value>,
    /// Present for submissions. `GET` submits to loaders, anything else to
    /// the matched action.
    pub form_method: Option<Method>,
    /// The declared form encoding; defaults to urlencoded.
    pub form_enc_type: Option<Mime>,
    /// The submitted fields.
    pub form_data: Option<FormData>,
}

/// Options for [`Router::fetch`].
#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    /// Present for submissions, as in [`NavigateOptions`].
    pub form_method: Option<Method>,
    /// The declared form encoding; defaults to urlencoded.
    pub form_enc_type: Option<Mime>,
    /// The submitted fields.
    pub form_data: Option<FormData>,
}

fn submission_from(
    form_method: Option<Method>,
    form_enc_type: Option<Mime>,
    form_data: Option<FormData>,
) -> Option<Submission> {
    let form_method = match (form_method, &form_data) {
        (Some(method), _) => method,
        (None, Some(_)) => Method::GET,
        (None, None) => return None,
    };
    Some(Submission::new(
        form_method,
        form_enc_type,
        form_data.unwrap_or_default(),
    ))
}

pub(crate) struct RouterInner {
    pub(crate) routes: Vec<Rc<DataRoute>>,
    pub(crate) branches: Vec<Branch>,
    pub(crate) basename: String,
    pub(crate) history: Rc<dyn History>,
    pub(crate) spawner: Rc<dyn LocalSpawn>,
    pub(crate) store: Store,
    /// The one navigation controller slot: installing a new controller
    /// aborts the previous occupant, so at most one navigation is live.
    pub(crate) nav_controller: RefCell<Option<AbortController>>,
    /// One controller per fetcher key.
    pub(crate) fetch_controllers: RefCell<HashMap<String, AbortController>>,
    /// Controllers for in-flight post-action fetcher revalidations; a new
    /// navigation aborts these and completes the fetchers at its commit.
    pub(crate) reval_controllers: RefCell<HashMap<String, AbortController>>,
    /// Fetcher keys to flip to `done` at the next navigation commit, with a
    /// flag for whether their data is cleared.
    pub(crate) deferred_fetchers: RefCell<Vec<(String, bool)>>,
    /// The pathname of the submission whose action data is currently held.
    pub(crate) action_pathname: RefCell<Option<String>>,
    pub(crate) history_listener: Cell<Option<ListenerId>>,
    pub(crate) disposed: Cell<bool>,
}

impl RouterInner {
    pub(crate) fn spawn(&self, future: impl Future<Output = ()> + 'static) {
        if let Err(spawn_error) = self.spawner.spawn_local(future) {
            error!("failed to spawn router task: {}", spawn_error);
        }
    }

    pub(crate) fn match_location(&self, pathname: &str) -> Option<Vec<RouteMatch>> {
        let relative = crate::helpers::http::strip_basename(pathname, &self.basename)?;
        match_routes(&self.branches, relative)
    }
}

/// The data-aware client-side router.
///
/// Cheap to clone; all clones share one state machine. The router is
/// single-threaded: state changes happen on the caller's thread and
/// asynchronous work is cooperatively scheduled through the configured
/// spawner.
#[derive(Clone)]
pub struct Router {
    inner: Rc<RouterInner>,
}

impl Router {
    /// Validates the route tree and builds the router.
    ///
    /// If hydration data leaves any matched loader without data and no
    /// exception covers the gap, an initial load is started and the snapshot
    /// reports `initialized: false` until it commits.
    pub fn new(config: RouterConfig) -> Result<Router, InvalidRoutes> {
        let RouterConfig {
            routes,
            history,
            spawner,
            basename,
            hydration_data,
        } = config;

        let routes = normalize_routes(&routes)?;
        let branches = flatten_branches(&routes);

        let location = history.location();
        let history_action = history.action();

        let relative = crate::helpers::http::strip_basename(&location.pathname, &basename);
        let matches = relative.and_then(|pathname| match_routes(&branches, pathname));

        let hydration = hydration_data.unwrap_or_default();
        let had_hydration_loader_data = !hydration.loader_data.is_empty();
        let mut loader_data = hydration.loader_data;
        let action_data = hydration.action_data;
        let mut exceptions = hydration.exceptions;

        let initialized;
        match &matches {
            None => {
                // Nothing matched the initial URL: synthesize the root 404.
                let mut synthesized = HashMap::new();
                synthesized.insert(
                    routes[0].id.clone(),
                    RouteException::Response(Rc::new(engine::not_found_response())),
                );
                exceptions = Some(synthesized);
                loader_data.clear();
                initialized = true;
            }
            Some(matches) => {
                let missing = matches.iter().any(|m| {
                    m.route.has_loader() && !loader_data.contains_key(&m.route.id)
                });
                let covered = exceptions
                    .as_ref()
                    .map(|exceptions| {
                        matches.iter().any(|m| exceptions.contains_key(&m.route.id))
                    })
                    .unwrap_or(false);
                initialized = !missing || covered;
                if !initialized && had_hydration_loader_data {
                    warn!(
                        "hydration data does not cover every matched loader and no \
                         exception fills the gap; running an initial load"
                    );
                }
            }
        }

        let store = Store::new(RouterState {
            history_action,
            location: location.clone(),
            matches,
            initialized,
            transition: Transition::idle(),
            revalidation: crate::state::RevalidationState::Idle,
            loader_data,
            action_data,
            exceptions,
            fetchers: HashMap::new(),
        });

        let inner = Rc::new(RouterInner {
            routes,
            branches,
            basename,
            history,
            spawner,
            store,
            nav_controller: RefCell::new(None),
            fetch_controllers: RefCell::new(HashMap::new()),
            reval_controllers: RefCell::new(HashMap::new()),
            deferred_fetchers: RefCell::new(Vec::new()),
            action_pathname: RefCell::new(None),
            history_listener: Cell::new(None),
            disposed: Cell::new(false),
        });

        // POP events flow through the same engine path as `navigate`.
        let weak: Weak<RouterInner> = Rc::downgrade(&inner);
        let listener_id = inner.history.listen(Box::new(move |location, _action| {
            if let Some(inner) = weak.upgrade() {
                trace!("history popped to {}", location.href());
                inner.begin_navigation(Navigation {
                    location,
                    kind: NavKind::Load,
                    op: HistoryOp::Pop,
                    submission: None,
                    force_reload: false,
                    done: None,
                });
            }
        }));
        inner.history_listener.set(Some(listener_id));

        if !initialized {
            inner.begin_navigation(Navigation {
                location,
                kind: NavKind::Initial,
                op: HistoryOp::None,
                submission: None,
                force_reload: false,
                done: None,
            });
        }

        Ok(Router { inner })
    }

    /// The current snapshot.
    pub fn state(&self) -> RouterState {
        self.inner.store.snapshot()
    }

    /// Registers a listener invoked synchronously after every committed
    /// state change. Listeners must not mutate the snapshot.
    pub fn subscribe(&self, subscriber: impl Fn(&RouterState) + 'static) -> SubscriberId {
        self.inner.store.subscribe(subscriber)
    }

    /// Removes a listener registered with [`Router::subscribe`].
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.store.unsubscribe(id);
    }

    /// Navigates to an href, optionally carrying a submission.
    ///
    /// Returns a future resolving once the navigation (including any
    /// redirects it chains into) commits or is superseded. Exceptions never
    /// surface here; they are routed to boundaries in the snapshot.
    pub fn navigate(&self, to: &str, options: NavigateOptions) -> impl Future<Output = ()> {
        let submission = submission_from(
            options.form_method,
            options.form_enc_type,
            options.form_data,
        );

        let mut split = crate::helpers::http::split_href(to);
        if let Some(submission) = &submission {
            if !submission.is_action() {
                // GET submissions serialize their form data as the search
                // string, so loaders observe the submitted values.
                split.search = submission.form_data.to_urlencoded();
            }
        }
        let href = join_href(&split.pathname, &split.search, &split.hash);
        let location = Location::from_href(&href, options.state);

        let kind = match &submission {
            Some(submission) if submission.is_action() => NavKind::ActionSubmission,
            Some(_) => NavKind::LoaderSubmission,
            None => NavKind::Load,
        };
        let op = if options.replace {
            HistoryOp::Replace
        } else {
            HistoryOp::Push
        };

        let (tx, rx) = oneshot::channel();
        self.inner.begin_navigation(Navigation {
            location,
            kind,
            op,
            submission,
            force_reload: false,
            done: Some(tx),
        });
        async move {
            let _ = rx.await;
        }
    }

    /// Moves through the history stack; the resulting POP drives a
    /// navigation. This is the numeric arm of `navigate`.
    pub fn go(&self, delta: isize) {
        self.inner.history.go(delta);
    }

    /// Reruns the current location's loaders without a location change.
    pub fn revalidate(&self) {
        let (location, has_matches) = self
            .inner
            .store
            .with(|state| (state.location.clone(), state.matches.is_some()));
        if !has_matches {
            trace!("revalidate ignored: nothing is matched");
            return;
        }
        self.inner.begin_navigation(Navigation {
            location,
            kind: NavKind::Revalidate,
            op: HistoryOp::None,
            submission: None,
            force_reload: false,
            done: None,
        });
    }

    /// Starts (or restarts) the keyed fetcher against `href`.
    pub fn fetch(&self, key: &str, href: &str, options: FetchOptions) {
        let submission = submission_from(
            options.form_method,
            options.form_enc_type,
            options.form_data,
        );
        self.inner.begin_fetch(key.to_string(), href, submission);
    }

    /// The fetcher for `key`; the idle sentinel for unknown keys.
    pub fn get_fetcher(&self, key: &str) -> Fetcher {
        self.inner
            .store
            .with(|state| state.fetchers.get(key).cloned())
            .unwrap_or_else(Fetcher::idle)
    }

    /// Removes the keyed fetcher, aborting any in-flight cycle it owns.
    pub fn delete_fetcher(&self, key: &str) {
        self.inner.delete_fetcher(key);
    }

    /// Renders a location as an href, with the basename applied.
    pub fn create_href(&self, location: &Location) -> String {
        if self.inner.basename.is_empty() {
            self.inner.history.create_href(location)
        } else {
            let mut prefixed = location.clone();
            prefixed.pathname = join_paths(&self.inner.basename, &location.pathname);
            self.inner.history.create_href(&prefixed)
        }
    }

    /// Shuts the router down: removes the history listener, aborts every
    /// live controller and drops all subscribers. The router is inert
    /// afterwards.
    pub fn dispose(&self) {
        let inner = &self.inner;
        inner.disposed.set(true);
        if let Some(listener_id) = inner.history_listener.take() {
            inner.history.unlisten(listener_id);
        }
        if let Some(controller) = inner.nav_controller.borrow_mut().take() {
            controller.abort();
        }
        for (_, controller) in inner.fetch_controllers.borrow_mut().drain() {
            controller.abort();
        }
        for (_, controller) in inner.reval_controllers.borrow_mut().drain() {
            controller.abort();
        }
        inner.store.clear_subscribers();
    }

    /// Signals of the live fetcher controllers, keyed by fetcher key.
    /// Test-only observability.
    #[cfg(feature = "testing")]
    pub fn fetch_controller_signals(&self) -> HashMap<String, crate::signal::AbortSignal> {
        self.inner
            .fetch_controllers
            .borrow()
            .iter()
            .map(|(key, controller)| (key.clone(), controller.signal()))
            .collect()
    }
}
