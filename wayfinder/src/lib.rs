//! Wayfinder &ndash; a data-aware client-side router core.
//!
//! Wayfinder couples URL navigation with per-route data fetching: given a
//! tree of routes (each optionally declaring a loader and/or an action), a
//! history adapter and user-initiated navigations, it maintains one atomic
//! state snapshot (location, matched routes, transition, revalidation
//! status, loader data, action data, exceptions, fetchers) and drives all
//! asynchronous work to keep that snapshot consistent.
//!
//! The router is deterministic and single-threaded: state changes happen on
//! the caller's thread, asynchronous work is scheduled cooperatively through
//! a caller-supplied spawner, and overlapping navigations resolve to exactly
//! one winner via abort signals. Redirects thrown or returned by user code
//! divert the navigation; any other thrown value is routed to the nearest
//! ancestor route declaring an exception boundary.
//!
//! ```
//! use std::rc::Rc;
//! use futures::executor::LocalPool;
//! use serde_json::json;
//! use wayfinder::{
//!     HandlerArgs, HandlerOutcome, MemoryHistory, NavigateOptions, RouteDefinition, Router,
//!     RouterConfig,
//! };
//!
//! let mut pool = LocalPool::new();
//! let routes = vec![RouteDefinition::new("/")
//!     .id("root")
//!     .loader(|_args: HandlerArgs| async { Ok(HandlerOutcome::Data(json!("ROOT"))) })
//!     .child(RouteDefinition::new("tasks").id("tasks").loader(|_args: HandlerArgs| async {
//!         Ok(HandlerOutcome::Data(json!(["first", "second"])))
//!     }))];
//!
//! let router = Router::new(RouterConfig::new(
//!     routes,
//!     Rc::new(MemoryHistory::new("/")),
//!     Rc::new(pool.spawner()),
//! ))
//! .unwrap();
//!
//! pool.run_until_stalled();
//! assert_eq!(router.state().loader_data["root"], json!("ROOT"));
//!
//! let _done = router.navigate("/tasks", NavigateOptions::default());
//! pool.run_until_stalled();
//! assert_eq!(router.state().location.pathname, "/tasks");
//! assert_eq!(router.state().loader_data["tasks"], json!(["first", "second"]));
//! ```
#![warn(missing_docs)]
#![doc(test(no_crate_inject))]

pub mod handler;
pub mod helpers;
pub mod history;
pub mod router;
pub mod signal;
pub mod state;

pub use crate::handler::{
    DataHandler, DataRequest, DataResponse, HandlerArgs, HandlerError, HandlerFuture,
    HandlerOutcome, HandlerResult, Params, ReloadArgs, ShouldReload, Submission,
};
pub use crate::helpers::http::FormData;
pub use crate::history::{
    History, HistoryAction, HistoryListener, ListenerId, Location, MemoryHistory,
};
pub use crate::router::matcher::RouteMatch;
pub use crate::router::tree::{DataRoute, InvalidRoutes, RouteDefinition};
pub use crate::router::{
    FetchOptions, HydrationData, NavigateOptions, Router, RouterConfig, REVALIDATE_HEADER,
};
pub use crate::signal::{AbortController, AbortSignal};
pub use crate::state::{
    Fetcher, FetcherKind, FetcherState, RevalidationState, RouteException, RouterState,
    SubscriberId, Transition, TransitionKind, TransitionState,
};
