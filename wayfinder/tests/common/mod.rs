//! Shared harness for the end-to-end router tests.
//!
//! Everything is driven deterministically: the router runs on a `LocalPool`
//! advanced with `run_until_stalled`, and every loader/action is a [`Stub`]
//! that parks on a oneshot channel until the test resolves it, recording its
//! call count, the signals and requests it received.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use http::header::LOCATION;
use http::{Response, StatusCode};
use serde_json::Value;
use wayfinder::{
    AbortSignal, DataHandler, DataResponse, FormData, HandlerArgs, HandlerOutcome, HandlerResult,
    HydrationData, MemoryHistory, RouteDefinition, Router, RouterConfig,
};

/// A controllable loader/action.
#[derive(Clone, Default)]
pub struct Stub {
    calls: Rc<Cell<usize>>,
    pending: Rc<RefCell<Vec<oneshot::Sender<HandlerResult>>>>,
    signals: Rc<RefCell<Vec<AbortSignal>>>,
    requests: Rc<RefCell<Vec<(String, String)>>>,
}

impl Stub {
    pub fn new() -> Stub {
        Stub::default()
    }

    /// The handler to install on a route. Each call parks until the test
    /// resolves it.
    pub fn handler(&self) -> DataHandler {
        let stub = self.clone();
        DataHandler::from(move |args: HandlerArgs| {
            let stub = stub.clone();
            async move {
                stub.calls.set(stub.calls.get() + 1);
                stub.signals.borrow_mut().push(args.signal.clone());
                stub.requests.borrow_mut().push((
                    args.request.method().to_string(),
                    args.request.uri().to_string(),
                ));
                let (tx, rx) = oneshot::channel();
                stub.pending.borrow_mut().push(tx);
                match rx.await {
                    Ok(result) => result,
                    Err(_) => Ok(HandlerOutcome::Data(Value::Null)),
                }
            }
        })
    }

    /// How many times the handler has been called.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// How many calls are parked awaiting resolution.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Resolves the oldest parked call with plain data.
    pub fn resolve(&self, value: Value) {
        self.resolve_with(Ok(HandlerOutcome::Data(value)));
    }

    /// Resolves the oldest parked call with an explicit result.
    pub fn resolve_with(&self, result: HandlerResult) {
        let sender = self.pending.borrow_mut().remove(0);
        let _ = sender.send(result);
    }

    /// Rejects the oldest parked call with a thrown error.
    pub fn reject(&self, message: &str) {
        self.resolve_with(Err(anyhow::anyhow!("{}", message).into()));
    }

    /// Resolves the oldest parked call by returning a redirect.
    pub fn redirect(&self, to: &str) {
        self.resolve_with(Ok(HandlerOutcome::Response(redirect_response(to))));
    }

    /// The signal the `index`th call received.
    pub fn signal(&self, index: usize) -> AbortSignal {
        self.signals.borrow()[index].clone()
    }

    /// The `(method, uri)` of the `index`th call's request.
    pub fn request(&self, index: usize) -> (String, String) {
        self.requests.borrow()[index].clone()
    }
}

/// A 302 response redirecting to `to`.
pub fn redirect_response(to: &str) -> DataResponse {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(LOCATION, to)
        .body(None)
        .unwrap()
}

/// Builds a `FormData` from pairs.
pub fn form(pairs: &[(&str, &str)]) -> FormData {
    pairs.iter().map(|(k, v)| (*k, *v)).collect()
}

/// The shared route fixture:
/// `root` (loader) with children `index` (loader), `foo` (loader + action),
/// `bar` (loader + action), `baz` (loader, exception boundary), `p/:param`
/// (loader) and `tasks` (nothing).
pub struct Fixture {
    pub pool: LocalPool,
    pub spawner: LocalSpawner,
    pub router: Router,
    pub history: MemoryHistory,
    pub root: Stub,
    pub index: Stub,
    pub foo: Stub,
    pub foo_action: Stub,
    pub bar: Stub,
    pub bar_action: Stub,
    pub baz: Stub,
    pub param: Stub,
}

impl Fixture {
    /// Starts the fixture at `href` with the given loader data hydrated.
    pub fn at(href: &str, hydrate: &[(&str, Value)]) -> Fixture {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        let root = Stub::new();
        let index = Stub::new();
        let foo = Stub::new();
        let foo_action = Stub::new();
        let bar = Stub::new();
        let bar_action = Stub::new();
        let baz = Stub::new();
        let param = Stub::new();

        let routes = vec![RouteDefinition::new("/")
            .id("root")
            .loader(root.handler())
            .child(RouteDefinition::index().id("index").loader(index.handler()))
            .child(
                RouteDefinition::new("foo")
                    .id("foo")
                    .loader(foo.handler())
                    .action(foo_action.handler()),
            )
            .child(
                RouteDefinition::new("bar")
                    .id("bar")
                    .loader(bar.handler())
                    .action(bar_action.handler()),
            )
            .child(
                RouteDefinition::new("baz")
                    .id("baz")
                    .loader(baz.handler())
                    .exception_boundary(),
            )
            .child(RouteDefinition::new("p/:param").id("param").loader(param.handler()))
            .child(RouteDefinition::new("tasks").id("tasks"))];

        let history = MemoryHistory::new(href);
        let mut config = RouterConfig::new(
            routes,
            Rc::new(history.clone()),
            Rc::new(spawner.clone()),
        );
        if !hydrate.is_empty() {
            config = config.hydration_data(HydrationData {
                loader_data: hydrate
                    .iter()
                    .map(|(id, value)| (id.to_string(), value.clone()))
                    .collect(),
                ..HydrationData::default()
            });
        }
        let router = Router::new(config).unwrap();

        Fixture {
            pool,
            spawner,
            router,
            history,
            root,
            index,
            foo,
            foo_action,
            bar,
            bar_action,
            baz,
            param,
        }
    }

    /// Drives all spawned work as far as it can go without resolving stubs.
    pub fn run(&mut self) {
        self.pool.run_until_stalled();
    }
}
