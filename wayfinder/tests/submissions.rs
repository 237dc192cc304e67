//! Submission flows: actions, action reloads, redirects, loader
//! submissions, and the 405 synthesis.

mod common;

use http::{Method, StatusCode};
use serde_json::json;
use wayfinder::{HandlerError, HistoryAction, NavigateOptions, TransitionKind, TransitionState};

use common::{form, redirect_response, Fixture};

fn post(pairs: &[(&str, &str)]) -> NavigateOptions {
    NavigateOptions {
        form_method: Some(Method::POST),
        form_data: Some(form(pairs)),
        ..NavigateOptions::default()
    }
}

#[test]
fn action_submission_commits_action_data_then_reloads() {
    let mut fixture = Fixture::at("/", &[("root", json!("ROOT")), ("index", json!("INDEX"))]);
    fixture.run();

    let _done = fixture.router.navigate("/foo", post(&[("task", "new")]));
    fixture.run();

    let state = fixture.router.state();
    assert_eq!(state.transition.state, TransitionState::Submitting);
    assert_eq!(state.transition.kind, TransitionKind::ActionSubmission);
    assert_eq!(fixture.foo_action.calls(), 1);
    assert_eq!(fixture.foo.calls(), 0);
    // The action request carries the submission.
    assert_eq!(fixture.foo_action.request(0), ("POST".to_string(), "/foo".to_string()));

    fixture.foo_action.resolve(json!("CREATED"));
    fixture.run();

    let state = fixture.router.state();
    assert_eq!(state.transition.state, TransitionState::Loading);
    assert_eq!(state.transition.kind, TransitionKind::ActionReload);
    assert_eq!(state.action_data.as_ref().unwrap()["foo"], json!("CREATED"));
    // The action invalidates everything: kept loaders rerun too.
    assert_eq!(fixture.root.calls(), 1);
    assert_eq!(fixture.foo.calls(), 1);
    // Loaders get a fresh GET request for the same destination.
    assert_eq!(fixture.foo.request(0), ("GET".to_string(), "/foo".to_string()));

    fixture.root.resolve(json!("ROOT*"));
    fixture.foo.resolve(json!("FOO"));
    fixture.run();

    let state = fixture.router.state();
    assert!(state.transition.is_idle());
    assert_eq!(state.location.pathname, "/foo");
    assert_eq!(state.history_action, HistoryAction::Push);
    assert_eq!(state.loader_data["root"], json!("ROOT*"));
    assert_eq!(state.loader_data["foo"], json!("FOO"));
    // Destination equals the submission location, so action data survives.
    assert_eq!(state.action_data.as_ref().unwrap()["foo"], json!("CREATED"));
}

#[test]
fn action_redirect_skips_the_reload_and_replaces_history() {
    let mut fixture = Fixture::at("/", &[("root", json!("ROOT")), ("index", json!("INDEX"))]);
    fixture.run();

    let _done = fixture.router.navigate("/foo", post(&[("gosh", "dang")]));
    fixture.run();
    assert_eq!(fixture.foo_action.calls(), 1);

    fixture.foo_action.redirect("/bar");
    fixture.run();

    let state = fixture.router.state();
    assert_eq!(state.transition.state, TransitionState::Loading);
    assert_eq!(state.transition.kind, TransitionKind::SubmissionRedirect);
    assert_eq!(
        state.transition.location.as_ref().unwrap().pathname,
        "/bar"
    );
    // The submission rides along on the redirect transition.
    assert_eq!(
        state
            .transition
            .submission
            .as_ref()
            .unwrap()
            .form_data
            .get("gosh"),
        Some("dang")
    );
    // The submission invalidates kept loaders; foo's loader never runs.
    assert_eq!(fixture.foo.calls(), 0);
    assert_eq!(fixture.root.calls(), 1);
    assert_eq!(fixture.bar.calls(), 1);

    fixture.root.resolve(json!("ROOT"));
    fixture.bar.resolve(json!("BAR"));
    fixture.run();

    let state = fixture.router.state();
    assert!(state.transition.is_idle());
    assert_eq!(state.location.pathname, "/bar");
    assert_eq!(state.history_action, HistoryAction::Replace);
    assert_eq!(state.loader_data.len(), 2);
    assert_eq!(state.loader_data["root"], json!("ROOT"));
    assert_eq!(state.loader_data["bar"], json!("BAR"));
    assert!(state.action_data.is_none());
}

#[test]
fn thrown_and_returned_redirects_land_identically() {
    for thrown in [false, true] {
        let mut fixture =
            Fixture::at("/", &[("root", json!("ROOT")), ("index", json!("INDEX"))]);
        fixture.run();

        let _done = fixture.router.navigate("/foo", post(&[]));
        fixture.run();
        if thrown {
            fixture
                .foo_action
                .resolve_with(Err(HandlerError::Response(redirect_response("/bar"))));
        } else {
            fixture.foo_action.redirect("/bar");
        }
        fixture.run();
        fixture.root.resolve(json!("ROOT"));
        fixture.bar.resolve(json!("BAR"));
        fixture.run();

        let state = fixture.router.state();
        assert_eq!(state.location.pathname, "/bar", "thrown: {}", thrown);
        assert_eq!(state.history_action, HistoryAction::Replace);
        assert_eq!(state.loader_data["bar"], json!("BAR"));
        assert!(state.exceptions.is_none());
    }
}

#[test]
fn post_without_action_synthesizes_405_at_the_boundary() {
    let mut fixture = Fixture::at("/", &[("root", json!("ROOT")), ("index", json!("INDEX"))]);
    fixture.run();

    // `baz` declares a boundary but no action.
    let _done = fixture.router.navigate("/baz", post(&[]));
    fixture.run();

    // Ancestor loaders still revalidate; the boundary route's own loader
    // runs too, but the exception wins at commit.
    assert_eq!(fixture.root.calls(), 1);
    assert_eq!(fixture.baz.calls(), 1);

    fixture.root.resolve(json!("ROOT*"));
    fixture.baz.resolve(json!("BAZ"));
    fixture.run();

    let state = fixture.router.state();
    assert_eq!(
        state.exception("baz").and_then(|e| e.status()),
        Some(StatusCode::METHOD_NOT_ALLOWED)
    );
    assert_eq!(state.loader_data["root"], json!("ROOT*"));
    assert!(!state.loader_data.contains_key("baz"));
    assert!(state.action_data.is_none());
}

#[test]
fn action_exception_routes_to_root_and_skips_descendant_loaders() {
    let mut fixture = Fixture::at("/", &[("root", json!("ROOT")), ("index", json!("INDEX"))]);
    fixture.run();

    let _done = fixture.router.navigate("/foo", post(&[]));
    fixture.run();
    fixture.foo_action.reject("Kaboom!");
    fixture.run();

    // No boundary between foo and the root: the root catches, and loaders
    // below it (foo) are skipped.
    assert_eq!(fixture.foo.calls(), 0);
    assert_eq!(fixture.root.calls(), 1);

    fixture.root.resolve(json!("ROOT*"));
    fixture.run();

    let state = fixture.router.state();
    assert_eq!(state.exception("root").map(|e| e.to_string()), Some("Kaboom!".to_string()));
    // The boundary's own fresh data is dropped in favor of the exception.
    assert!(!state.loader_data.contains_key("root"));
    assert!(state.action_data.is_none());
}

#[test]
fn get_submission_serializes_form_data_into_the_search_string() {
    let mut fixture = Fixture::at("/", &[("root", json!("ROOT")), ("index", json!("INDEX"))]);
    fixture.run();

    let _done = fixture.router.navigate(
        "/foo",
        NavigateOptions {
            form_method: Some(Method::GET),
            form_data: Some(form(&[("q", "search term")])),
            ..NavigateOptions::default()
        },
    );
    fixture.run();

    let state = fixture.router.state();
    assert_eq!(state.transition.state, TransitionState::Submitting);
    assert_eq!(state.transition.kind, TransitionKind::LoaderSubmission);
    // foo is new; root reloads because the search changed.
    assert_eq!(fixture.foo.calls(), 1);
    assert_eq!(fixture.root.calls(), 1);
    assert_eq!(
        fixture.foo.request(0),
        ("GET".to_string(), "/foo?q=search+term".to_string())
    );

    fixture.root.resolve(json!("ROOT"));
    fixture.foo.resolve(json!("RESULTS"));
    fixture.run();

    let state = fixture.router.state();
    assert!(state.transition.is_idle());
    assert_eq!(state.location.search, "q=search+term");
    assert_eq!(state.loader_data["foo"], json!("RESULTS"));
}

#[test]
fn action_data_clears_when_leaving_the_submission_location() {
    let mut fixture = Fixture::at("/", &[("root", json!("ROOT")), ("index", json!("INDEX"))]);
    fixture.run();

    let _submit = fixture.router.navigate("/foo", post(&[]));
    fixture.run();
    fixture.foo_action.resolve(json!("CREATED"));
    fixture.run();
    fixture.root.resolve(json!("ROOT"));
    fixture.foo.resolve(json!("FOO"));
    fixture.run();
    assert!(fixture.router.state().action_data.is_some());

    let _leave = fixture.router.navigate("/bar", NavigateOptions::default());
    fixture.run();
    fixture.bar.resolve(json!("BAR"));
    fixture.run();

    let state = fixture.router.state();
    assert_eq!(state.location.pathname, "/bar");
    assert!(state.action_data.is_none());
}
