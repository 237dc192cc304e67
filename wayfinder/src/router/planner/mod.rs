//! The transition planner: which loaders run, which data survives.
//!
//! Given the current snapshot and the matches for the destination, the
//! planner produces a [`LoaderPlan`]: the ordered loaders to run, the ids
//! whose data is preserved untouched, and the ids below an exception
//! boundary whose data must be dropped. The engine executes the plan; the
//! planner never awaits anything.

use std::collections::HashMap;

use log::trace;
use serde_json::Value;

use crate::handler::{ReloadArgs, Submission};
use crate::history::Location;
use crate::router::matcher::RouteMatch;

/// What the planner decided for one loader pass.
#[derive(Default)]
pub(crate) struct LoaderPlan {
    /// Matches whose loaders run, ordered root to leaf.
    pub to_load: Vec<RouteMatch>,
    /// Route ids whose existing loader data is carried forward.
    pub preserved: Vec<String>,
    /// Route ids below the pending exception boundary: loaders skipped and
    /// data dropped.
    pub cleared: Vec<String>,
}

/// Everything the planner consults. All borrows; the planner is pure.
pub(crate) struct PlannerInput<'a> {
    pub current_location: &'a Location,
    pub next_location: &'a Location,
    pub current_matches: Option<&'a [RouteMatch]>,
    pub next_matches: &'a [RouteMatch],
    pub loader_data: &'a HashMap<String, Value>,
    pub submission: Option<&'a Submission>,
    /// An explicit revalidation or the loader pass after an action.
    pub is_revalidation: bool,
    /// A redirect demanded full revalidation: every loader runs, no veto.
    pub force_reload: bool,
    /// The boundary id of an exception thrown before loaders run (action
    /// throw, 405 synthesis). Loaders strictly below it are skipped.
    pub pending_boundary: Option<&'a str>,
}

/// Applies the loader selection rules.
pub(crate) fn plan_loaders(input: &PlannerInput<'_>) -> LoaderPlan {
    let mut plan = LoaderPlan::default();

    let boundary_index = input.pending_boundary.and_then(|boundary| {
        input
            .next_matches
            .iter()
            .position(|m| m.route.id == boundary)
    });

    let search_changed = input.current_location.search != input.next_location.search;

    for (index, next_match) in input.next_matches.iter().enumerate() {
        let id = &next_match.route.id;

        if let Some(boundary_index) = boundary_index {
            if index > boundary_index {
                plan.cleared.push(id.clone());
                continue;
            }
        }

        if !next_match.route.has_loader() {
            continue;
        }

        let current_match = input
            .current_matches
            .and_then(|matches| matches.iter().find(|m| &m.route.id == id));

        // A route new to this URL, or one matched without data yet (partial
        // hydration), or one whose params changed, always loads: the opt-out
        // hook is not consulted for any of these.
        let is_new = current_match.is_none();
        let first_load = !input.loader_data.contains_key(id);
        let params_changed = current_match
            .map(|current| current.params != next_match.params)
            .unwrap_or(false);

        if is_new || first_load || params_changed {
            plan.to_load.push(next_match.clone());
            continue;
        }

        if input.force_reload {
            plan.to_load.push(next_match.clone());
            continue;
        }

        let default_reload = search_changed || input.is_revalidation;
        if !default_reload {
            plan.preserved.push(id.clone());
            continue;
        }

        let reload = match &next_match.route.should_reload {
            Some(should_reload) => {
                let args = ReloadArgs {
                    current_location: input.current_location.clone(),
                    next_location: input.next_location.clone(),
                    current_params: current_match
                        .map(|m| m.params.clone())
                        .unwrap_or_default(),
                    next_params: next_match.params.clone(),
                    submission: input.submission.cloned(),
                    default_reload,
                };
                should_reload(&args)
            }
            None => true,
        };
        if reload {
            plan.to_load.push(next_match.clone());
        } else {
            trace!("loader for `{}` vetoed by should_reload", id);
            plan.preserved.push(id.clone());
        }
    }

    trace!(
        "planned {} loader(s), {} preserved, {} cleared",
        plan.to_load.len(),
        plan.preserved.len(),
        plan.cleared.len()
    );
    plan
}
