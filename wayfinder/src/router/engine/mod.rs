//! The execution engine: one navigation from start to committed snapshot.
//!
//! Every navigation owns a fresh `AbortController`; installing it aborts the
//! previous occupant of the slot, so at most one navigation is ever live.
//! The engine runs the action (if the navigation is an action submission),
//! commits the action data, runs the planned loaders under the shared
//! signal, interprets every result, and installs the complete new snapshot
//! in one state update. Results arriving after an abort are discarded at the
//! first post-await check.

use std::collections::HashMap;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::join_all;
use http::{header, Method, Request, Response, StatusCode};
use log::trace;
use serde_json::Value;

use crate::handler::{DataResponse, HandlerArgs, Submission};
use crate::helpers::http::join_href;
use crate::history::{HistoryAction, Location};
use crate::router::matcher::{action_target_index, RouteMatch};
use crate::router::planner::{plan_loaders, LoaderPlan, PlannerInput};
use crate::router::redirect::{boundary_for, interpret, Outcome, Redirect};
use crate::router::RouterInner;
use crate::signal::{AbortController, AbortSignal};
use crate::state::{
    FetcherKind, FetcherState, RevalidationState, RouteException, Transition, TransitionKind,
    TransitionState,
};

/// What started a navigation; decides transition kinds and planner behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NavKind {
    /// The hydration load kicked off at construction.
    Initial,
    /// A plain GET navigation (including POPs).
    Load,
    /// An explicit `revalidate()`; the location does not change.
    Revalidate,
    /// A GET submission.
    LoaderSubmission,
    /// A mutation submission.
    ActionSubmission,
    /// Chained from a redirect out of a plain load.
    NormalRedirect,
    /// Chained from a redirect out of a submission flow.
    SubmissionRedirect,
}

/// The history write performed at commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HistoryOp {
    Push,
    Replace,
    /// The history already moved (back/forward); nothing to write.
    Pop,
    /// No history involvement (revalidation, initial load).
    None,
}

/// One navigation request handed to the engine.
pub(crate) struct Navigation {
    pub location: Location,
    pub kind: NavKind,
    pub op: HistoryOp,
    pub submission: Option<Submission>,
    /// A redirect demanded that every loader run, bypassing `should_reload`.
    pub force_reload: bool,
    /// Resolved when this navigation (or a redirect it chains into) commits.
    pub done: Option<oneshot::Sender<()>>,
}

pub(crate) fn not_found_response() -> DataResponse {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(None)
        .expect("static response builds")
}

pub(crate) fn method_not_allowed_response() -> DataResponse {
    Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header(header::ALLOW, "GET")
        .body(None)
        .expect("static response builds")
}

impl RouterInner {
    /// Starts a navigation, aborting whichever navigation currently holds
    /// the controller slot.
    pub(crate) fn begin_navigation(self: &Rc<Self>, navigation: Navigation) {
        self.begin_navigation_inner(navigation, true);
    }

    /// Starts a navigation. When chaining out of a redirect the previous
    /// occupant of the slot is this navigation's own predecessor, which
    /// resolved by redirecting: its signal must stay un-aborted, so the new
    /// controller is installed without an abort.
    pub(crate) fn begin_navigation_inner(
        self: &Rc<Self>,
        navigation: Navigation,
        abort_previous: bool,
    ) {
        if self.disposed.get() {
            return;
        }
        let signal = {
            let mut slot = self.nav_controller.borrow_mut();
            if abort_previous {
                if let Some(previous) = slot.take() {
                    trace!("aborting superseded navigation");
                    previous.abort();
                }
            }
            let controller = AbortController::new();
            let signal = controller.signal();
            *slot = Some(controller);
            signal
        };
        self.subsume_fetcher_revalidations();
        let inner = self.clone();
        self.spawn(async move { inner.run_navigation(navigation, signal).await });
    }

    /// A navigation's loader run subsumes any in-flight post-action fetcher
    /// revalidation: the revalidation is aborted and the fetcher completes
    /// (keeping its action data) when the navigation commits.
    fn subsume_fetcher_revalidations(&self) {
        let aborted: Vec<String> = {
            let mut controllers = self.reval_controllers.borrow_mut();
            controllers
                .drain()
                .map(|(key, controller)| {
                    controller.abort();
                    key
                })
                .collect()
        };
        if !aborted.is_empty() {
            let mut deferred = self.deferred_fetchers.borrow_mut();
            for key in aborted {
                trace!("navigation subsumes revalidation of fetcher `{}`", key);
                deferred.push((key, false));
            }
        }
    }

    async fn run_navigation(self: Rc<Self>, navigation: Navigation, signal: AbortSignal) {
        if signal.aborted() {
            return;
        }

        let next_matches = match self.match_location(&navigation.location.pathname) {
            Some(next_matches) => next_matches,
            None => {
                self.commit_not_found(navigation, &signal);
                return;
            }
        };

        // A hash-only change commits synchronously: no loaders, no
        // transition, only a new location key.
        if navigation.kind == NavKind::Load && navigation.submission.is_none() {
            let current = self.store.with(|state| state.location.clone());
            if current.pathname == navigation.location.pathname
                && current.search == navigation.location.search
                && current.hash != navigation.location.hash
            {
                trace!("hash-only change to {}", navigation.location.href());
                let plan = LoaderPlan {
                    to_load: Vec::new(),
                    preserved: next_matches.iter().map(|m| m.route.id.clone()).collect(),
                    cleared: Vec::new(),
                };
                self.commit(
                    navigation,
                    Some(next_matches),
                    plan,
                    HashMap::new(),
                    HashMap::new(),
                    &signal,
                );
                return;
            }
        }

        let mut pending_exception: Option<(String, RouteException)> = None;

        // Only a fresh action submission dispatches to an action; redirect
        // navigations carry the submission for context but run loaders only.
        let action_submission = if navigation.kind == NavKind::ActionSubmission {
            navigation.submission.clone().filter(|s| s.is_action())
        } else {
            None
        };
        if let Some(submission) = action_submission {
            let pending_location = navigation.location.clone();
            let pending_submission = submission.clone();
            self.store.update(move |state| {
                state.transition = Transition {
                    state: TransitionState::Submitting,
                    kind: TransitionKind::ActionSubmission,
                    location: Some(pending_location),
                    submission: Some(pending_submission),
                };
            });
            if signal.aborted() {
                return;
            }

            let target_index = action_target_index(&next_matches, &navigation.location.search);
            let target = next_matches[target_index].clone();
            let mut action_data_entry: Option<(String, Value)> = None;

            match target.route.action.clone() {
                None => {
                    trace!(
                        "submission to `{}` which has no action, synthesizing 405",
                        target.route.id
                    );
                    pending_exception = Some((
                        boundary_for(&next_matches, target_index),
                        RouteException::Response(Rc::new(method_not_allowed_response())),
                    ));
                }
                Some(action) => {
                    let args = self.action_args(
                        &target,
                        &navigation.location,
                        submission.clone(),
                        signal.clone(),
                    );
                    let result = action.call(args).await;
                    if signal.aborted() {
                        trace!("discarding action result of superseded navigation");
                        return;
                    }
                    match interpret(result) {
                        Outcome::Redirect(redirect) => {
                            self.begin_redirect(navigation, redirect, true);
                            return;
                        }
                        Outcome::Exception(exception) => {
                            pending_exception =
                                Some((boundary_for(&next_matches, target_index), exception));
                        }
                        Outcome::Data(value) => {
                            action_data_entry = Some((target.route.id.clone(), value));
                        }
                    }
                }
            }

            // The action settled: commit its data together with the move
            // into the reload phase, as one observable update.
            let committed = action_data_entry.clone();
            let reload_location = navigation.location.clone();
            let reload_submission = submission.clone();
            self.store.update(move |state| {
                if let Some((id, value)) = committed {
                    let mut action_data = HashMap::new();
                    action_data.insert(id, value);
                    state.action_data = Some(action_data);
                }
                state.transition = Transition {
                    state: TransitionState::Loading,
                    kind: TransitionKind::ActionReload,
                    location: Some(reload_location),
                    submission: Some(reload_submission),
                };
            });
            if action_data_entry.is_some() {
                *self.action_pathname.borrow_mut() = Some(navigation.location.pathname.clone());
            }
        } else {
            match navigation.kind {
                NavKind::Initial => {}
                NavKind::Revalidate => {
                    self.store
                        .update(|state| state.revalidation = RevalidationState::Loading);
                }
                _ => {
                    let (transition_state, transition_kind) = match navigation.kind {
                        NavKind::LoaderSubmission => {
                            (TransitionState::Submitting, TransitionKind::LoaderSubmission)
                        }
                        NavKind::NormalRedirect => {
                            (TransitionState::Loading, TransitionKind::NormalRedirect)
                        }
                        NavKind::SubmissionRedirect => {
                            (TransitionState::Loading, TransitionKind::SubmissionRedirect)
                        }
                        _ => (TransitionState::Loading, TransitionKind::NormalLoad),
                    };
                    let pending_location = navigation.location.clone();
                    let pending_submission = navigation.submission.clone();
                    self.store.update(move |state| {
                        state.transition = Transition {
                            state: transition_state,
                            kind: transition_kind,
                            location: Some(pending_location),
                            submission: pending_submission,
                        };
                    });
                }
            }
        }

        // Subscribers may have re-entered the router during the emits above.
        if signal.aborted() {
            return;
        }

        let (current_location, current_matches, loader_data) = self.store.with(|state| {
            (
                state.location.clone(),
                state.matches.clone(),
                state.loader_data.clone(),
            )
        });
        let is_revalidation = navigation.kind == NavKind::Revalidate
            || navigation
                .submission
                .as_ref()
                .map(|s| s.is_action())
                .unwrap_or(false);
        let plan = plan_loaders(&PlannerInput {
            current_location: &current_location,
            next_location: &navigation.location,
            current_matches: current_matches.as_deref(),
            next_matches: &next_matches,
            loader_data: &loader_data,
            submission: navigation.submission.as_ref(),
            is_revalidation,
            force_reload: navigation.force_reload,
            pending_boundary: pending_exception.as_ref().map(|(boundary, _)| boundary.as_str()),
        });

        let mut fresh: HashMap<String, Value> = HashMap::new();
        let mut exceptions: HashMap<String, RouteException> = HashMap::new();
        if let Some((boundary, exception)) = pending_exception {
            exceptions.insert(boundary, exception);
        }

        if !plan.to_load.is_empty() {
            let futures: Vec<_> = plan
                .to_load
                .iter()
                .filter_map(|m| {
                    let loader = m.route.loader.clone()?;
                    Some(loader.call(self.handler_args(
                        m,
                        &navigation.location,
                        navigation.submission.clone(),
                        signal.clone(),
                    )))
                })
                .collect();
            let results = join_all(futures).await;
            if signal.aborted() {
                trace!("discarding loader results of superseded navigation");
                return;
            }

            let outcomes: Vec<Outcome> = results.into_iter().map(interpret).collect();
            for outcome in &outcomes {
                if let Outcome::Redirect(redirect) = outcome {
                    let from_submission = navigation.submission.is_some();
                    self.begin_redirect(navigation, redirect.clone(), from_submission);
                    return;
                }
            }
            for (loaded, outcome) in plan.to_load.iter().zip(outcomes) {
                match outcome {
                    Outcome::Data(value) => {
                        fresh.insert(loaded.route.id.clone(), value);
                    }
                    Outcome::Exception(exception) => {
                        let thrown_at = next_matches
                            .iter()
                            .position(|m| m.route.id == loaded.route.id)
                            .unwrap_or(0);
                        let boundary = boundary_for(&next_matches, thrown_at);
                        exceptions.entry(boundary).or_insert(exception);
                    }
                    Outcome::Redirect(_) => {}
                }
            }
        }

        self.commit(navigation, Some(next_matches), plan, fresh, exceptions, &signal);
    }

    /// Chains into the navigation a redirect demanded. The predecessor's
    /// signal stays un-aborted: it resolved by redirecting.
    fn begin_redirect(
        self: &Rc<Self>,
        navigation: Navigation,
        redirect: Redirect,
        from_submission: bool,
    ) {
        trace!("redirect to {}", redirect.location);
        let location = Location::from_href(&redirect.location, None);
        let kind = if from_submission {
            NavKind::SubmissionRedirect
        } else {
            NavKind::NormalRedirect
        };
        // Submission- and load-produced redirects replace the in-flight
        // push; a POP stays a POP.
        let op = match navigation.op {
            HistoryOp::Pop => HistoryOp::Pop,
            _ => HistoryOp::Replace,
        };
        let submission = if from_submission {
            navigation.submission
        } else {
            None
        };
        self.begin_navigation_inner(
            Navigation {
                location,
                kind,
                op,
                submission,
                force_reload: redirect.revalidate,
                done: navigation.done,
            },
            false,
        );
    }

    /// Installs the complete post-navigation snapshot in one update, after
    /// writing history.
    fn commit(
        &self,
        mut navigation: Navigation,
        next_matches: Option<Vec<RouteMatch>>,
        plan: LoaderPlan,
        fresh: HashMap<String, Value>,
        exceptions: HashMap<String, RouteException>,
        signal: &AbortSignal,
    ) {
        if signal.aborted() {
            return;
        }

        match navigation.op {
            HistoryOp::Push => self.history.push(&navigation.location),
            HistoryOp::Replace => self.history.replace(&navigation.location),
            HistoryOp::Pop | HistoryOp::None => {}
        }

        let deferred: Vec<(String, bool)> = self.deferred_fetchers.borrow_mut().drain(..).collect();
        let action_pathname = self.action_pathname.borrow().clone();
        let op = navigation.op;
        let kind = navigation.kind;
        let location = navigation.location.clone();

        self.store.update(move |state| {
            state.history_action = match op {
                HistoryOp::Push => HistoryAction::Push,
                HistoryOp::Replace => HistoryAction::Replace,
                HistoryOp::Pop => HistoryAction::Pop,
                HistoryOp::None => state.history_action,
            };
            state.location = location.clone();
            state.matches = next_matches;
            state.initialized = true;
            state.transition = Transition::idle();
            state.revalidation = RevalidationState::Idle;

            let mut merged: HashMap<String, Value> = HashMap::new();
            for id in &plan.preserved {
                if let Some(value) = state.loader_data.get(id) {
                    merged.insert(id.clone(), value.clone());
                }
            }
            for (id, value) in fresh {
                merged.insert(id, value);
            }
            // An exception and loader data never coexist on the same route.
            for boundary in exceptions.keys() {
                merged.remove(boundary);
            }
            state.loader_data = merged;

            if state.action_data.is_some()
                && action_pathname.as_deref() != Some(location.pathname.as_str())
            {
                state.action_data = None;
            }

            if exceptions.is_empty() {
                if kind != NavKind::Revalidate {
                    state.exceptions = None;
                }
            } else {
                state.exceptions = Some(exceptions);
            }

            for (key, clear_data) in &deferred {
                if let Some(fetcher) = state.fetchers.get_mut(key) {
                    fetcher.state = FetcherState::Idle;
                    fetcher.kind = FetcherKind::Done;
                    fetcher.submission = None;
                    if *clear_data {
                        fetcher.data = None;
                    }
                }
            }
        });

        if self.store.with(|state| state.action_data.is_none()) {
            *self.action_pathname.borrow_mut() = None;
        }

        self.release_controller(signal);
        if let Some(done) = navigation.done.take() {
            let _ = done.send(());
        }
    }

    fn commit_not_found(&self, mut navigation: Navigation, signal: &AbortSignal) {
        if signal.aborted() {
            return;
        }
        trace!(
            "no route matches {}, committing 404",
            navigation.location.pathname
        );

        match navigation.op {
            HistoryOp::Push => self.history.push(&navigation.location),
            HistoryOp::Replace => self.history.replace(&navigation.location),
            HistoryOp::Pop | HistoryOp::None => {}
        }

        let root_id = self.routes[0].id.clone();
        let deferred: Vec<(String, bool)> = self.deferred_fetchers.borrow_mut().drain(..).collect();
        let op = navigation.op;
        let location = navigation.location.clone();
        self.store.update(move |state| {
            state.history_action = match op {
                HistoryOp::Push => HistoryAction::Push,
                HistoryOp::Replace => HistoryAction::Replace,
                HistoryOp::Pop => HistoryAction::Pop,
                HistoryOp::None => state.history_action,
            };
            state.location = location;
            state.matches = None;
            state.initialized = true;
            state.transition = Transition::idle();
            state.revalidation = RevalidationState::Idle;
            state.loader_data = HashMap::new();
            state.action_data = None;
            let mut exceptions = HashMap::new();
            exceptions.insert(
                root_id,
                RouteException::Response(Rc::new(not_found_response())),
            );
            state.exceptions = Some(exceptions);
            for (key, clear_data) in &deferred {
                if let Some(fetcher) = state.fetchers.get_mut(key) {
                    fetcher.state = FetcherState::Idle;
                    fetcher.kind = FetcherKind::Done;
                    fetcher.submission = None;
                    if *clear_data {
                        fetcher.data = None;
                    }
                }
            }
        });

        self.release_controller(signal);
        if let Some(done) = navigation.done.take() {
            let _ = done.send(());
        }
    }

    /// Clears the controller slot after a commit. Our signal is un-aborted
    /// here, so the slot still holds our controller: a superseder would have
    /// aborted us before installing its own.
    fn release_controller(&self, signal: &AbortSignal) {
        if signal.aborted() {
            return;
        }
        let mut slot = self.nav_controller.borrow_mut();
        if slot.as_ref().map(|c| !c.aborted()).unwrap_or(false) {
            *slot = None;
        }
    }

    /// Builds the args for one loader call: a fresh GET request naming the
    /// destination (search included, hash excluded), the cycle's signal, and
    /// the submission metadata when the cycle carries one.
    pub(crate) fn handler_args(
        &self,
        route_match: &RouteMatch,
        location: &Location,
        submission: Option<Submission>,
        signal: AbortSignal,
    ) -> HandlerArgs {
        self.build_args(route_match, location, submission, signal, false)
    }

    /// Builds the args for the action call itself: the request carries the
    /// submission's method and form data.
    pub(crate) fn action_args(
        &self,
        route_match: &RouteMatch,
        location: &Location,
        submission: Submission,
        signal: AbortSignal,
    ) -> HandlerArgs {
        self.build_args(route_match, location, Some(submission), signal, true)
    }

    fn build_args(
        &self,
        route_match: &RouteMatch,
        location: &Location,
        submission: Option<Submission>,
        signal: AbortSignal,
        for_action: bool,
    ) -> HandlerArgs {
        let uri = join_href(&location.pathname, &location.search, "");
        let (method, body) = match (&submission, for_action) {
            (Some(submission), true) => (
                submission.form_method.clone(),
                Some(submission.form_data.clone()),
            ),
            _ => (Method::GET, None),
        };
        let request = Request::builder()
            .method(method)
            .uri(uri.as_str())
            .body(body)
            .expect("destination href is a valid request target");
        HandlerArgs {
            params: route_match.params.clone(),
            request,
            signal,
            submission,
        }
    }
}
