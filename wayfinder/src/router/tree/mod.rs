//! Route definitions and the normalized data-route tree.
//!
//! Callers describe their routes with the chained [`RouteDefinition`] builder.
//! At router construction the definition tree is walked depth-first and turned
//! into a parallel tree of [`DataRoute`] values: every route gets a stable id
//! (the caller's, or its tree position such as `"0-0-1"`), duplicates are
//! rejected, and the input is left untouched.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::handler::{DataHandler, ReloadArgs, ShouldReload};

/// The error produced by an unusable route configuration.
#[derive(Debug, Error)]
pub enum InvalidRoutes {
    /// The top-level route list was empty.
    #[error("route configuration is empty")]
    Empty,
    /// Two routes carry the same id.
    #[error("duplicate route id `{0}`")]
    DuplicateId(String),
}

/// A single route as described by the caller.
///
/// Built by chaining:
///
/// ```
/// # use wayfinder::RouteDefinition;
/// let routes = vec![RouteDefinition::new("/")
///     .id("root")
///     .child(RouteDefinition::index().id("index"))
///     .child(RouteDefinition::new("tasks").id("tasks"))];
/// # assert_eq!(routes.len(), 1);
/// ```
#[derive(Clone)]
pub struct RouteDefinition {
    pub(crate) id: Option<String>,
    pub(crate) path: Option<String>,
    pub(crate) index: bool,
    pub(crate) children: Vec<RouteDefinition>,
    pub(crate) loader: Option<DataHandler>,
    pub(crate) action: Option<DataHandler>,
    pub(crate) should_reload: Option<ShouldReload>,
    pub(crate) exception_boundary: bool,
}

impl RouteDefinition {
    /// A route matching the given path pattern. Patterns are `/`-separated
    /// segments; `:name` segments capture a param and `*` captures the rest
    /// of the pathname.
    pub fn new(path: &str) -> RouteDefinition {
        RouteDefinition {
            id: None,
            path: Some(path.to_string()),
            index: false,
            children: Vec::new(),
            loader: None,
            action: None,
            should_reload: None,
            exception_boundary: false,
        }
    }

    /// An index route: matches when no child segment of its parent remains.
    pub fn index() -> RouteDefinition {
        RouteDefinition {
            id: None,
            path: None,
            index: true,
            children: Vec::new(),
            loader: None,
            action: None,
            should_reload: None,
            exception_boundary: false,
        }
    }

    /// Sets an explicit id. Ids must be unique within the tree.
    pub fn id(mut self, id: &str) -> RouteDefinition {
        self.id = Some(id.to_string());
        self
    }

    /// Attaches a loader.
    pub fn loader<H: Into<DataHandler>>(mut self, loader: H) -> RouteDefinition {
        self.loader = Some(loader.into());
        self
    }

    /// Attaches an action.
    pub fn action<H: Into<DataHandler>>(mut self, action: H) -> RouteDefinition {
        self.action = Some(action.into());
        self
    }

    /// Attaches a revalidation opt-out hook.
    pub fn should_reload(mut self, f: impl Fn(&ReloadArgs) -> bool + 'static) -> RouteDefinition {
        self.should_reload = Some(Rc::new(f));
        self
    }

    /// Marks this route as able to catch exceptions thrown by itself or its
    /// descendants.
    pub fn exception_boundary(mut self) -> RouteDefinition {
        self.exception_boundary = true;
        self
    }

    /// Appends a child route.
    pub fn child(mut self, child: RouteDefinition) -> RouteDefinition {
        self.children.push(child);
        self
    }

    /// Appends several child routes.
    pub fn children(mut self, children: Vec<RouteDefinition>) -> RouteDefinition {
        self.children.extend(children);
        self
    }
}

impl fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("index", &self.index)
            .field("children", &self.children.len())
            .finish()
    }
}

/// A normalized route: stable id assigned, handlers shared by reference.
/// This is the shape the matcher, planner and engine work with, and the one
/// exposed through match lists in snapshots.
pub struct DataRoute {
    /// Unique id within the tree.
    pub id: String,
    /// The path pattern, relative to the parent.
    pub path: Option<String>,
    /// Whether this is an index route.
    pub index: bool,
    /// Whether this route catches exceptions from itself or descendants.
    pub exception_boundary: bool,
    pub(crate) loader: Option<DataHandler>,
    pub(crate) action: Option<DataHandler>,
    pub(crate) should_reload: Option<ShouldReload>,
    pub(crate) children: Vec<Rc<DataRoute>>,
}

impl DataRoute {
    /// Whether the route declares a loader.
    pub fn has_loader(&self) -> bool {
        self.loader.is_some()
    }

    /// Whether the route declares an action.
    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }
}

impl fmt::Debug for DataRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataRoute")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("index", &self.index)
            .field("loader", &self.loader.is_some())
            .field("action", &self.action.is_some())
            .field("exception_boundary", &self.exception_boundary)
            .field("children", &self.children.len())
            .finish()
    }
}

/// Walks the definition tree and produces the parallel data-route tree,
/// assigning tree-position ids where the caller supplied none.
pub(crate) fn normalize_routes(
    definitions: &[RouteDefinition],
) -> Result<Vec<Rc<DataRoute>>, InvalidRoutes> {
    if definitions.is_empty() {
        return Err(InvalidRoutes::Empty);
    }
    let mut seen = HashSet::new();
    definitions
        .iter()
        .enumerate()
        .map(|(index, definition)| build_route(definition, &index.to_string(), &mut seen))
        .collect()
}

fn build_route(
    definition: &RouteDefinition,
    position: &str,
    seen: &mut HashSet<String>,
) -> Result<Rc<DataRoute>, InvalidRoutes> {
    let id = definition
        .id
        .clone()
        .unwrap_or_else(|| position.to_string());
    if !seen.insert(id.clone()) {
        return Err(InvalidRoutes::DuplicateId(id));
    }
    let children = definition
        .children
        .iter()
        .enumerate()
        .map(|(index, child)| build_route(child, &format!("{}-{}", position, index), seen))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Rc::new(DataRoute {
        id,
        path: definition.path.clone(),
        index: definition.index,
        exception_boundary: definition.exception_boundary,
        loader: definition.loader.clone(),
        action: definition.action.clone(),
        should_reload: definition.should_reload.clone(),
        children,
    }))
}
