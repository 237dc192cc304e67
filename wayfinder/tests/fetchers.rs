//! Fetcher behavior: keyed state machines, isolation from navigation
//! loader data, post-action revalidation, and interleaving with navigation.

mod common;

use http::Method;
use serde_json::json;
use wayfinder::{FetchOptions, FetcherKind, FetcherState, HistoryAction, NavigateOptions};

use common::{form, Fixture};

fn post(pairs: &[(&str, &str)]) -> FetchOptions {
    FetchOptions {
        form_method: Some(Method::POST),
        form_data: Some(form(pairs)),
        ..FetchOptions::default()
    }
}

#[test]
fn unknown_keys_return_the_idle_sentinel() {
    let fixture = Fixture::at("/", &[("root", json!("ROOT")), ("index", json!("INDEX"))]);
    let fetcher = fixture.router.get_fetcher("nobody");
    assert_eq!(fetcher.state, FetcherState::Idle);
    assert_eq!(fetcher.kind, FetcherKind::Init);
    assert!(fetcher.data.is_none());
}

#[test]
fn fetcher_load_never_touches_navigation_loader_data() {
    let mut fixture = Fixture::at("/foo", &[("root", json!("ROOT")), ("foo", json!("FOO"))]);
    fixture.run();

    fixture.router.fetch("k", "/bar", FetchOptions::default());
    fixture.run();

    let fetcher = fixture.router.get_fetcher("k");
    assert_eq!(fetcher.state, FetcherState::Loading);
    assert_eq!(fetcher.kind, FetcherKind::NormalLoad);
    assert_eq!(fixture.bar.calls(), 1);
    assert!(fixture.router.fetch_controller_signals().contains_key("k"));

    fixture.bar.resolve(json!("BAR"));
    fixture.run();

    let fetcher = fixture.router.get_fetcher("k");
    assert_eq!(fetcher.state, FetcherState::Idle);
    assert_eq!(fetcher.kind, FetcherKind::Done);
    assert_eq!(fetcher.data, Some(json!("BAR")));
    assert!(fixture.router.fetch_controller_signals().is_empty());

    // Navigation loader data is untouched by the fetcher's loader.
    let state = fixture.router.state();
    assert!(!state.loader_data.contains_key("bar"));
    assert_eq!(state.loader_data["foo"], json!("FOO"));
}

#[test]
fn fetcher_action_revalidates_the_current_page() {
    let mut fixture = Fixture::at("/foo", &[("root", json!("ROOT")), ("foo", json!("FOO"))]);
    fixture.run();

    fixture.router.fetch("k", "/bar", post(&[("key", "value")]));
    fixture.run();

    let fetcher = fixture.router.get_fetcher("k");
    assert_eq!(fetcher.state, FetcherState::Submitting);
    assert_eq!(fetcher.kind, FetcherKind::ActionSubmission);
    assert_eq!(fixture.bar_action.calls(), 1);
    assert_eq!(
        fixture.bar_action.request(0),
        ("POST".to_string(), "/bar".to_string())
    );

    fixture.bar_action.resolve(json!("A ACTION"));
    fixture.run();

    let fetcher = fixture.router.get_fetcher("k");
    assert_eq!(fetcher.state, FetcherState::Loading);
    assert_eq!(fetcher.kind, FetcherKind::ActionReload);
    assert_eq!(fetcher.data, Some(json!("A ACTION")));
    // The current page's loaders rerun, not the fetcher's href's.
    assert_eq!(fixture.root.calls(), 1);
    assert_eq!(fixture.foo.calls(), 1);
    assert_eq!(fixture.bar.calls(), 0);

    fixture.root.resolve(json!("ROOT*"));
    fixture.foo.resolve(json!("FOO*"));
    fixture.run();

    let fetcher = fixture.router.get_fetcher("k");
    assert_eq!(fetcher.state, FetcherState::Idle);
    assert_eq!(fetcher.kind, FetcherKind::Done);
    assert_eq!(fetcher.data, Some(json!("A ACTION")));

    let state = fixture.router.state();
    assert_eq!(state.location.pathname, "/foo");
    assert_eq!(state.loader_data["root"], json!("ROOT*"));
    assert_eq!(state.loader_data["foo"], json!("FOO*"));
}

#[test]
fn same_key_refetch_aborts_the_previous_cycle() {
    let mut fixture = Fixture::at("/", &[("root", json!("ROOT")), ("index", json!("INDEX"))]);
    fixture.run();

    fixture.router.fetch("k", "/bar", FetchOptions::default());
    fixture.run();
    assert_eq!(fixture.bar.calls(), 1);
    let first_signal = fixture.bar.signal(0);
    assert!(!first_signal.aborted());

    fixture.router.fetch("k", "/baz", FetchOptions::default());
    fixture.run();
    assert!(first_signal.aborted());
    assert_eq!(fixture.baz.calls(), 1);

    // The superseded cycle resolving late changes nothing.
    fixture.bar.resolve(json!("STALE"));
    fixture.run();
    assert_eq!(fixture.router.get_fetcher("k").state, FetcherState::Loading);

    fixture.baz.resolve(json!("BAZ"));
    fixture.run();

    let fetcher = fixture.router.get_fetcher("k");
    assert_eq!(fetcher.state, FetcherState::Idle);
    assert_eq!(fetcher.data, Some(json!("BAZ")));
}

#[test]
fn fetcher_action_redirect_navigates_and_clears_fetcher_data() {
    let mut fixture = Fixture::at("/foo", &[("root", json!("ROOT")), ("foo", json!("FOO"))]);
    fixture.run();

    fixture.router.fetch("k", "/bar", post(&[]));
    fixture.run();
    fixture.bar_action.redirect("/baz");
    fixture.run();

    let fetcher = fixture.router.get_fetcher("k");
    assert_eq!(fetcher.state, FetcherState::Loading);
    assert_eq!(fetcher.kind, FetcherKind::ActionRedirect);
    assert!(fetcher.data.is_none());

    // The redirect navigation is a submission flow: kept loaders rerun.
    assert_eq!(fixture.root.calls(), 1);
    assert_eq!(fixture.baz.calls(), 1);
    fixture.root.resolve(json!("ROOT*"));
    fixture.baz.resolve(json!("BAZ"));
    fixture.run();

    let state = fixture.router.state();
    assert_eq!(state.location.pathname, "/baz");
    assert_eq!(state.history_action, HistoryAction::Replace);

    let fetcher = fixture.router.get_fetcher("k");
    assert_eq!(fetcher.state, FetcherState::Idle);
    assert_eq!(fetcher.kind, FetcherKind::Done);
    assert!(fetcher.data.is_none());
}

#[test]
fn navigation_subsumes_fetcher_revalidation() {
    let mut fixture = Fixture::at("/foo", &[("root", json!("ROOT")), ("foo", json!("FOO"))]);
    fixture.run();

    fixture.router.fetch("k", "/bar", post(&[]));
    fixture.run();
    fixture.bar_action.resolve(json!("A ACTION"));
    fixture.run();

    // Revalidation of the current page is in flight.
    assert_eq!(fixture.root.calls(), 1);
    assert_eq!(fixture.foo.calls(), 1);
    assert_eq!(fixture.router.get_fetcher("k").kind, FetcherKind::ActionReload);

    let _done = fixture
        .router
        .navigate("/tasks", NavigateOptions::default());
    fixture.run();

    // The navigation aborted the revalidation's loaders...
    assert!(fixture.root.signal(0).aborted());
    assert!(fixture.foo.signal(0).aborted());

    // ...and its commit completed the fetcher with the action data intact.
    let state = fixture.router.state();
    assert_eq!(state.location.pathname, "/tasks");
    let fetcher = fixture.router.get_fetcher("k");
    assert_eq!(fetcher.state, FetcherState::Idle);
    assert_eq!(fetcher.kind, FetcherKind::Done);
    assert_eq!(fetcher.data, Some(json!("A ACTION")));
}

#[test]
fn concurrent_fetchers_are_independent() {
    let mut fixture = Fixture::at("/", &[("root", json!("ROOT")), ("index", json!("INDEX"))]);
    fixture.run();

    fixture.router.fetch("a", "/bar", FetchOptions::default());
    fixture.router.fetch("b", "/baz", FetchOptions::default());
    fixture.run();
    assert_eq!(fixture.router.fetch_controller_signals().len(), 2);

    fixture.baz.resolve(json!("BAZ"));
    fixture.run();
    assert_eq!(fixture.router.get_fetcher("b").data, Some(json!("BAZ")));
    assert_eq!(fixture.router.get_fetcher("a").state, FetcherState::Loading);

    fixture.bar.resolve(json!("BAR"));
    fixture.run();
    assert_eq!(fixture.router.get_fetcher("a").data, Some(json!("BAR")));
}

#[test]
fn delete_fetcher_aborts_and_forgets() {
    let mut fixture = Fixture::at("/", &[("root", json!("ROOT")), ("index", json!("INDEX"))]);
    fixture.run();

    fixture.router.fetch("k", "/bar", FetchOptions::default());
    fixture.run();
    let signal = fixture.bar.signal(0);

    fixture.router.delete_fetcher("k");
    assert!(signal.aborted());
    assert_eq!(fixture.router.get_fetcher("k").kind, FetcherKind::Init);
    assert!(fixture.router.fetch_controller_signals().is_empty());

    // A late resolution is discarded.
    fixture.bar.resolve(json!("STALE"));
    fixture.run();
    assert_eq!(fixture.router.get_fetcher("k").kind, FetcherKind::Init);
}

#[test]
fn fetcher_loader_exception_routes_to_the_page_boundary() {
    let mut fixture = Fixture::at("/foo", &[("root", json!("ROOT")), ("foo", json!("FOO"))]);
    fixture.run();

    fixture.router.fetch("k", "/bar", FetchOptions::default());
    fixture.run();
    fixture.bar.reject("fetch failed");
    fixture.run();

    let state = fixture.router.state();
    assert_eq!(
        state.exception("root").map(|e| e.to_string()),
        Some("fetch failed".to_string())
    );
    let fetcher = fixture.router.get_fetcher("k");
    assert_eq!(fetcher.state, FetcherState::Idle);
    assert_eq!(fetcher.kind, FetcherKind::Done);
    assert!(fetcher.data.is_none());
}
