//! Interpretation of handler results: data, redirect, or exception.
//!
//! Thrown and returned values are normalized into one tagged [`Outcome`]
//! before any state is reduced, so the engine has a single vocabulary for
//! "what did this loader/action produce". Redirects divert the navigation;
//! exceptions are routed to the nearest boundary.

use std::rc::Rc;

use http::header::LOCATION;
use serde_json::Value;

use crate::handler::{DataResponse, HandlerError, HandlerOutcome, HandlerResult};
use crate::router::matcher::RouteMatch;
use crate::state::RouteException;

/// A redirect response header requesting that the follow-up loader run
/// include every matched loader, bypassing `should_reload`.
pub const REVALIDATE_HEADER: &str = "x-remix-revalidate";

/// A parsed redirect directive.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Redirect {
    /// The `location` header value: where to navigate next.
    pub location: String,
    /// Whether the response forced full revalidation.
    pub revalidate: bool,
}

/// The normalized result of one loader/action call.
#[derive(Debug)]
pub(crate) enum Outcome {
    Data(Value),
    Redirect(Redirect),
    Exception(RouteException),
}

/// Normalizes a handler result. Thrown and returned redirects are
/// equivalent; a returned non-redirect response is data below status 400 and
/// an exception at or above it; every thrown non-redirect is an exception.
pub(crate) fn interpret(result: HandlerResult) -> Outcome {
    match result {
        Ok(HandlerOutcome::Data(value)) => Outcome::Data(value),
        Ok(HandlerOutcome::Response(response)) => match as_redirect(&response) {
            Some(redirect) => Outcome::Redirect(redirect),
            None if response.status().as_u16() >= 400 => {
                Outcome::Exception(RouteException::Response(Rc::new(response)))
            }
            None => Outcome::Data(response.into_body().unwrap_or(Value::Null)),
        },
        Err(HandlerError::Response(response)) => match as_redirect(&response) {
            Some(redirect) => Outcome::Redirect(redirect),
            None => Outcome::Exception(RouteException::Response(Rc::new(response))),
        },
        Err(HandlerError::Error(error)) => Outcome::Exception(RouteException::Error(Rc::new(error))),
    }
}

fn as_redirect(response: &DataResponse) -> Option<Redirect> {
    if !response.status().is_redirection() {
        return None;
    }
    let location = response.headers().get(LOCATION)?.to_str().ok()?.to_string();
    let revalidate = response
        .headers()
        .get(REVALIDATE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("yes"))
        .unwrap_or(false);
    Some(Redirect {
        location,
        revalidate,
    })
}

/// The id of the boundary that catches an exception thrown at
/// `matches[thrown_at]`: the deepest match at or above it whose route
/// declares an exception boundary, falling back to the root match.
pub(crate) fn boundary_for(matches: &[RouteMatch], thrown_at: usize) -> String {
    let thrown_at = thrown_at.min(matches.len().saturating_sub(1));
    matches[..=thrown_at]
        .iter()
        .rev()
        .find(|m| m.route.exception_boundary)
        .unwrap_or(&matches[0])
        .route
        .id
        .clone()
}
