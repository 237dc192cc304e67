//! Defines types for route loaders and actions.
//!
//! A loader or action is an asynchronous function over [`HandlerArgs`]. It can
//! be used directly as a closure via the `From` implementation on
//! [`DataHandler`], which boxes the returned future. Handlers express their
//! outcome through [`HandlerResult`]: the `Ok` arm is a returned value, the
//! `Err` arm a thrown one, and both arms can carry an HTTP response, which is
//! how redirects travel.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use http::{Method, Request, Response};
use mime::Mime;
use serde_json::Value;

use crate::helpers::http::FormData;
use crate::history::Location;
use crate::signal::AbortSignal;

/// Path parameters extracted by the matcher, accumulated root to leaf.
pub type Params = HashMap<String, String>;

/// The request shape delivered to loaders and actions. The body carries the
/// submission's form data, when there is one; no network I/O is implied.
pub type DataRequest = Request<Option<FormData>>;

/// The response shape handlers may return or throw. Redirects are responses
/// with a 3xx status and a `location` header.
pub type DataResponse = Response<Option<Value>>;

/// A submission attached to a navigation or fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    /// The form method. `GET` marks a loader-submission, anything else an
    /// action-submission.
    pub form_method: Method,
    /// The declared encoding of the form data.
    pub form_enc_type: Mime,
    /// The submitted fields.
    pub form_data: FormData,
}

impl Submission {
    /// Builds a submission, defaulting the encoding to
    /// `application/x-www-form-urlencoded`.
    pub fn new(form_method: Method, form_enc_type: Option<Mime>, form_data: FormData) -> Submission {
        Submission {
            form_method,
            form_enc_type: form_enc_type.unwrap_or(mime::APPLICATION_WWW_FORM_URLENCODED),
            form_data,
        }
    }

    /// Whether this submission dispatches to an action rather than loaders.
    pub fn is_action(&self) -> bool {
        self.form_method != Method::GET
    }
}

/// The arguments delivered to a loader or action call.
pub struct HandlerArgs {
    /// Path parameters for the matched route, including ancestors'.
    pub params: Params,
    /// A fresh request naming the destination URL. For submissions the form
    /// data rides along as the body.
    pub request: DataRequest,
    /// The cycle's abort signal. Checked by the router after every await;
    /// handlers may also observe it to cut their own work short.
    pub signal: AbortSignal,
    /// Present when the call belongs to a submission.
    pub submission: Option<Submission>,
}

/// A value returned from a handler.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// Plain data, committed to `loader_data`/`action_data`.
    Data(Value),
    /// An HTTP response: a redirect when 3xx with a `location` header, an
    /// exception when the status is 400 or above, otherwise data.
    Response(DataResponse),
}

impl From<Value> for HandlerOutcome {
    fn from(value: Value) -> HandlerOutcome {
        HandlerOutcome::Data(value)
    }
}

impl From<DataResponse> for HandlerOutcome {
    fn from(response: DataResponse) -> HandlerOutcome {
        HandlerOutcome::Response(response)
    }
}

/// A value thrown from a handler.
#[derive(Debug)]
pub enum HandlerError {
    /// A thrown response. Thrown and returned redirects are equivalent;
    /// any other thrown response is an exception.
    Response(DataResponse),
    /// Any other thrown value.
    Error(anyhow::Error),
}

impl From<anyhow::Error> for HandlerError {
    fn from(error: anyhow::Error) -> HandlerError {
        HandlerError::Error(error)
    }
}

impl From<DataResponse> for HandlerError {
    fn from(response: DataResponse) -> HandlerError {
        HandlerError::Response(response)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Response(response) => {
                write!(f, "thrown response with status {}", response.status())
            }
            HandlerError::Error(error) => write!(f, "{}", error),
        }
    }
}

/// What a loader or action resolves to.
pub type HandlerResult = Result<HandlerOutcome, HandlerError>;

/// A type alias for the boxed futures produced by handlers. Futures are
/// local: the router is single-threaded by design.
pub type HandlerFuture = LocalBoxFuture<'static, HandlerResult>;

/// A cheaply clonable loader or action.
///
/// Built from any `Fn(HandlerArgs) -> impl Future<Output = HandlerResult>`
/// closure; the route tree holds these as capability-bearing optional values,
/// so presence of a loader/action is a data question, not a type one.
#[derive(Clone)]
pub struct DataHandler {
    inner: Rc<dyn Fn(HandlerArgs) -> HandlerFuture>,
}

impl DataHandler {
    /// Wraps an already-boxing handler function.
    pub fn new(f: impl Fn(HandlerArgs) -> HandlerFuture + 'static) -> DataHandler {
        DataHandler { inner: Rc::new(f) }
    }

    pub(crate) fn call(&self, args: HandlerArgs) -> HandlerFuture {
        (self.inner)(args)
    }
}

impl<F, Fut> From<F> for DataHandler
where
    F: Fn(HandlerArgs) -> Fut + 'static,
    Fut: Future<Output = HandlerResult> + 'static,
{
    fn from(f: F) -> DataHandler {
        DataHandler {
            inner: Rc::new(move |args| Box::pin(f(args))),
        }
    }
}

impl fmt::Debug for DataHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataHandler").finish()
    }
}

/// The arguments handed to a route's `should_reload` callback when the
/// planner asks whether a kept route's loader needs to rerun.
#[derive(Clone, Debug)]
pub struct ReloadArgs {
    /// Where the router currently is.
    pub current_location: Location,
    /// Where the transition is headed.
    pub next_location: Location,
    /// The route's params at the current location.
    pub current_params: Params,
    /// The route's params at the next location.
    pub next_params: Params,
    /// The submission driving the transition, when there is one.
    pub submission: Option<Submission>,
    /// What the planner would decide on its own.
    pub default_reload: bool,
}

/// A route's revalidation opt-out hook.
pub type ShouldReload = Rc<dyn Fn(&ReloadArgs) -> bool>;
