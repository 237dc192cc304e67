//! The fetcher manager: keyed, out-of-band loader/action calls.
//!
//! Each key owns an independent state machine and at most one controller; a
//! new call on the same key aborts the previous cycle. Fetcher loads never
//! touch navigation loader data. A fetcher action, once it succeeds,
//! revalidates the current page's loaders; if a navigation begins while that
//! revalidation is in flight, the navigation subsumes it and the fetcher
//! completes at the navigation's commit.

use std::collections::HashMap;
use std::rc::Rc;

use log::trace;
use serde_json::Value;

use crate::handler::Submission;
use crate::history::Location;
use crate::router::engine::{not_found_response, HistoryOp, NavKind, Navigation};
use crate::router::matcher::{action_target_index, RouteMatch};
use crate::router::planner::{plan_loaders, PlannerInput};
use crate::router::redirect::{boundary_for, interpret, Outcome, Redirect};
use crate::router::RouterInner;
use crate::signal::{AbortController, AbortSignal};
use crate::state::{Fetcher, FetcherKind, FetcherState, RouteException};

impl RouterInner {
    /// Starts (or restarts) the keyed fetcher against a resolved href.
    pub(crate) fn begin_fetch(self: &Rc<Self>, key: String, href: &str, submission: Option<Submission>) {
        if self.disposed.get() {
            return;
        }

        // A new call on the same key always supersedes the previous cycle.
        if let Some(previous) = self.fetch_controllers.borrow_mut().remove(&key) {
            trace!("fetcher `{}` restarted, aborting previous cycle", key);
            previous.abort();
        }
        if let Some(previous) = self.reval_controllers.borrow_mut().remove(&key) {
            previous.abort();
        }
        self.deferred_fetchers.borrow_mut().retain(|(k, _)| k != &key);

        let mut split = crate::helpers::http::split_href(href);
        if let Some(submission) = &submission {
            if !submission.is_action() {
                split.search = submission.form_data.to_urlencoded();
            }
        }
        let href = crate::helpers::http::join_href(&split.pathname, &split.search, &split.hash);
        let location = Location::from_href(&href, None);

        let matches = match self.match_location(&location.pathname) {
            Some(matches) => matches,
            None => {
                trace!("fetcher `{}` href {} matches nothing", key, href);
                let root_id = self.routes[0].id.clone();
                let fetcher_key = key;
                self.store.update(move |state| {
                    let exceptions = state.exceptions.get_or_insert_with(HashMap::new);
                    exceptions.entry(root_id).or_insert_with(|| {
                        RouteException::Response(Rc::new(not_found_response()))
                    });
                    let fetcher = state
                        .fetchers
                        .entry(fetcher_key)
                        .or_insert_with(Fetcher::idle);
                    fetcher.state = FetcherState::Idle;
                    fetcher.kind = FetcherKind::Done;
                    fetcher.submission = None;
                    fetcher.data = None;
                });
                return;
            }
        };

        let controller = AbortController::new();
        let signal = controller.signal();
        self.fetch_controllers
            .borrow_mut()
            .insert(key.clone(), controller);

        let inner = self.clone();
        self.spawn(async move {
            inner.run_fetch(key, location, matches, submission, signal).await;
        });
    }

    async fn run_fetch(
        self: Rc<Self>,
        key: String,
        location: Location,
        matches: Vec<RouteMatch>,
        submission: Option<Submission>,
        signal: AbortSignal,
    ) {
        let target_index = action_target_index(&matches, &location.search);
        match submission {
            Some(submission) if submission.is_action() => {
                self.run_fetch_action(key, location, matches, target_index, submission, signal)
                    .await;
            }
            submission => {
                self.run_fetch_load(key, location, matches, target_index, submission, signal)
                    .await;
            }
        }
    }

    async fn run_fetch_load(
        self: Rc<Self>,
        key: String,
        location: Location,
        matches: Vec<RouteMatch>,
        target_index: usize,
        submission: Option<Submission>,
        signal: AbortSignal,
    ) {
        let target = matches[target_index].clone();
        let (state, kind) = match &submission {
            Some(_) => (FetcherState::Submitting, FetcherKind::LoaderSubmission),
            None => (FetcherState::Loading, FetcherKind::NormalLoad),
        };
        // Previous data is retained until the new cycle replaces it.
        let pending_submission = submission.clone();
        self.update_fetcher(&key, move |fetcher| {
            fetcher.state = state;
            fetcher.kind = kind;
            fetcher.submission = pending_submission;
        });
        if signal.aborted() {
            return;
        }

        let loader = match target.route.loader.clone() {
            Some(loader) => loader,
            None => {
                trace!("fetcher `{}` targets `{}` which has no loader", key, target.route.id);
                self.fail_fetcher(
                    &key,
                    boundary_for(&matches, target_index),
                    RouteException::Response(Rc::new(not_found_response())),
                );
                return;
            }
        };

        let args = self.handler_args(&target, &location, submission.clone(), signal.clone());
        let result = loader.call(args).await;
        if signal.aborted() {
            trace!("discarding result of superseded fetcher `{}`", key);
            return;
        }

        match interpret(result) {
            Outcome::Data(value) => {
                self.fetch_controllers.borrow_mut().remove(&key);
                self.update_fetcher(&key, move |fetcher| {
                    fetcher.state = FetcherState::Idle;
                    fetcher.kind = FetcherKind::Done;
                    fetcher.submission = None;
                    fetcher.data = Some(value);
                });
            }
            Outcome::Redirect(redirect) => {
                self.fetch_controllers.borrow_mut().remove(&key);
                self.update_fetcher(&key, |fetcher| {
                    fetcher.state = FetcherState::Idle;
                    fetcher.kind = FetcherKind::Done;
                    fetcher.submission = None;
                });
                self.begin_fetch_redirect(redirect, submission);
            }
            Outcome::Exception(exception) => {
                self.fail_fetcher(&key, boundary_for(&matches, target_index), exception);
            }
        }
    }

    async fn run_fetch_action(
        self: Rc<Self>,
        key: String,
        location: Location,
        matches: Vec<RouteMatch>,
        target_index: usize,
        submission: Submission,
        signal: AbortSignal,
    ) {
        let target = matches[target_index].clone();
        let pending_submission = submission.clone();
        self.update_fetcher(&key, move |fetcher| {
            fetcher.state = FetcherState::Submitting;
            fetcher.kind = FetcherKind::ActionSubmission;
            fetcher.submission = Some(pending_submission);
        });
        if signal.aborted() {
            return;
        }

        let action = match target.route.action.clone() {
            Some(action) => action,
            None => {
                trace!("fetcher `{}` submits to `{}` which has no action", key, target.route.id);
                self.fail_fetcher(
                    &key,
                    boundary_for(&matches, target_index),
                    RouteException::Response(Rc::new(
                        crate::router::engine::method_not_allowed_response(),
                    )),
                );
                return;
            }
        };

        let args = self.action_args(&target, &location, submission.clone(), signal.clone());
        let result = action.call(args).await;
        if signal.aborted() {
            trace!("discarding action result of superseded fetcher `{}`", key);
            return;
        }

        let action_data = match interpret(result) {
            Outcome::Redirect(redirect) => {
                // The navigation lands the redirect and completes the
                // fetcher with no data at its commit.
                self.fetch_controllers.borrow_mut().remove(&key);
                let redirect_submission = submission.clone();
                self.update_fetcher(&key, move |fetcher| {
                    fetcher.state = FetcherState::Loading;
                    fetcher.kind = FetcherKind::ActionRedirect;
                    fetcher.submission = Some(redirect_submission);
                    fetcher.data = None;
                });
                self.deferred_fetchers.borrow_mut().push((key, true));
                self.begin_fetch_redirect(redirect, Some(submission));
                return;
            }
            Outcome::Exception(exception) => {
                self.fail_fetcher(&key, boundary_for(&matches, target_index), exception);
                return;
            }
            Outcome::Data(value) => value,
        };

        let reload_submission = submission.clone();
        let reload_data = action_data.clone();
        self.update_fetcher(&key, move |fetcher| {
            fetcher.state = FetcherState::Loading;
            fetcher.kind = FetcherKind::ActionReload;
            fetcher.submission = Some(reload_submission);
            fetcher.data = Some(reload_data);
        });
        if signal.aborted() {
            return;
        }

        self.revalidate_after_fetch_action(key, submission, signal).await;
    }

    /// Reruns the current page's loaders after a fetcher action succeeded.
    /// The fetcher's href targeted only the action; revalidation uses the
    /// current location and matches.
    async fn revalidate_after_fetch_action(
        self: Rc<Self>,
        key: String,
        submission: Submission,
        fetch_signal: AbortSignal,
    ) {
        let (current_location, current_matches, loader_data) = self.store.with(|state| {
            (
                state.location.clone(),
                state.matches.clone(),
                state.loader_data.clone(),
            )
        });
        let current_matches = match current_matches {
            Some(matches) => matches,
            None => {
                self.complete_fetcher(&key);
                return;
            }
        };

        let plan = plan_loaders(&PlannerInput {
            current_location: &current_location,
            next_location: &current_location,
            current_matches: Some(&current_matches),
            next_matches: &current_matches,
            loader_data: &loader_data,
            submission: Some(&submission),
            is_revalidation: true,
            force_reload: false,
            pending_boundary: None,
        });
        if plan.to_load.is_empty() {
            self.complete_fetcher(&key);
            return;
        }

        let reval_controller = AbortController::new();
        let reval_signal = reval_controller.signal();
        self.reval_controllers
            .borrow_mut()
            .insert(key.clone(), reval_controller);

        let futures: Vec<_> = plan
            .to_load
            .iter()
            .filter_map(|m| {
                let loader = m.route.loader.clone()?;
                Some(loader.call(self.handler_args(
                    m,
                    &current_location,
                    None,
                    reval_signal.clone(),
                )))
            })
            .collect();
        let results = futures::future::join_all(futures).await;

        if reval_signal.aborted() {
            // A navigation subsumed this revalidation; it completes the
            // fetcher at its commit. A same-key refetch owns the state now.
            trace!("revalidation for fetcher `{}` subsumed", key);
            return;
        }
        if fetch_signal.aborted() {
            return;
        }
        self.reval_controllers.borrow_mut().remove(&key);

        let outcomes: Vec<Outcome> = results.into_iter().map(interpret).collect();
        for outcome in &outcomes {
            if let Outcome::Redirect(redirect) = outcome {
                self.deferred_fetchers.borrow_mut().push((key, false));
                self.begin_fetch_redirect(redirect.clone(), Some(submission));
                return;
            }
        }

        let mut fresh: HashMap<String, Value> = HashMap::new();
        let mut thrown: HashMap<String, RouteException> = HashMap::new();
        for (loaded, outcome) in plan.to_load.iter().zip(outcomes) {
            match outcome {
                Outcome::Data(value) => {
                    fresh.insert(loaded.route.id.clone(), value);
                }
                Outcome::Exception(exception) => {
                    let thrown_at = current_matches
                        .iter()
                        .position(|m| m.route.id == loaded.route.id)
                        .unwrap_or(0);
                    thrown
                        .entry(boundary_for(&current_matches, thrown_at))
                        .or_insert(exception);
                }
                Outcome::Redirect(_) => {}
            }
        }

        self.fetch_controllers.borrow_mut().remove(&key);
        let fetcher_key = key;
        self.store.update(move |state| {
            let mut merged: HashMap<String, Value> = HashMap::new();
            for id in &plan.preserved {
                if let Some(value) = state.loader_data.get(id) {
                    merged.insert(id.clone(), value.clone());
                }
            }
            for (id, value) in fresh {
                merged.insert(id, value);
            }
            for boundary in thrown.keys() {
                merged.remove(boundary);
            }
            state.loader_data = merged;

            if !thrown.is_empty() {
                let exceptions = state.exceptions.get_or_insert_with(HashMap::new);
                for (boundary, exception) in thrown {
                    exceptions.entry(boundary).or_insert(exception);
                }
            }

            if let Some(fetcher) = state.fetchers.get_mut(&fetcher_key) {
                fetcher.state = FetcherState::Idle;
                fetcher.kind = FetcherKind::Done;
                fetcher.submission = None;
            }
        });
    }

    /// Starts the navigation a fetcher redirect demands.
    fn begin_fetch_redirect(self: &Rc<Self>, redirect: Redirect, submission: Option<Submission>) {
        let kind = if submission.is_some() {
            NavKind::SubmissionRedirect
        } else {
            NavKind::NormalRedirect
        };
        self.begin_navigation(Navigation {
            location: Location::from_href(&redirect.location, None),
            kind,
            op: HistoryOp::Replace,
            submission,
            force_reload: redirect.revalidate,
            done: None,
        });
    }

    /// Parks the fetcher with an exception routed to `boundary`.
    fn fail_fetcher(&self, key: &str, boundary: String, exception: RouteException) {
        self.fetch_controllers.borrow_mut().remove(key);
        let fetcher_key = key.to_string();
        self.store.update(move |state| {
            state
                .exceptions
                .get_or_insert_with(HashMap::new)
                .insert(boundary, exception);
            let fetcher = state
                .fetchers
                .entry(fetcher_key)
                .or_insert_with(Fetcher::idle);
            fetcher.state = FetcherState::Idle;
            fetcher.kind = FetcherKind::Done;
            fetcher.submission = None;
            fetcher.data = None;
        });
    }

    fn complete_fetcher(&self, key: &str) {
        self.fetch_controllers.borrow_mut().remove(key);
        self.update_fetcher(key, |fetcher| {
            fetcher.state = FetcherState::Idle;
            fetcher.kind = FetcherKind::Done;
            fetcher.submission = None;
        });
    }

    fn update_fetcher(&self, key: &str, f: impl FnOnce(&mut Fetcher)) {
        let fetcher_key = key.to_string();
        self.store.update(move |state| {
            let fetcher = state
                .fetchers
                .entry(fetcher_key)
                .or_insert_with(Fetcher::idle);
            f(fetcher);
        });
    }

    /// Removes the keyed fetcher entirely, aborting anything it owns.
    pub(crate) fn delete_fetcher(&self, key: &str) {
        if let Some(controller) = self.fetch_controllers.borrow_mut().remove(key) {
            controller.abort();
        }
        if let Some(controller) = self.reval_controllers.borrow_mut().remove(key) {
            controller.abort();
        }
        self.deferred_fetchers.borrow_mut().retain(|(k, _)| k != key);
        let known = self.store.with(|state| state.fetchers.contains_key(key));
        if known {
            let fetcher_key = key.to_string();
            self.store.update(move |state| {
                state.fetchers.remove(&fetcher_key);
            });
        }
    }
}
