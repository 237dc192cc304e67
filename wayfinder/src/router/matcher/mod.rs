//! The built-in ranked path matcher.
//!
//! At construction the data-route tree is flattened into branches (one per
//! matchable route, root to leaf) and scored: static segments beat dynamic
//! `:param` segments, which beat `*` splats, and index routes edge out their
//! layout parents at the same URL. Matching walks branches best-first and
//! returns the first full match.

use std::rc::Rc;

use log::trace;
use percent_encoding::percent_decode;

use crate::handler::Params;
use crate::helpers::http::has_bare_index_param;
use crate::router::tree::DataRoute;

/// A matched route with its accumulated params and resolved pathnames.
/// Ordered root to leaf in a match list.
#[derive(Clone, Debug)]
pub struct RouteMatch {
    /// The matched route.
    pub route: Rc<DataRoute>,
    /// Params accumulated from the root down to this route.
    pub params: Params,
    /// The portion of the URL consumed through this route.
    pub pathname: String,
    /// Same as `pathname`, excluding any trailing splat capture.
    pub pathname_base: String,
}

impl PartialEq for RouteMatch {
    fn eq(&self, other: &RouteMatch) -> bool {
        self.route.id == other.route.id
            && self.params == other.params
            && self.pathname == other.pathname
    }
}

pub(crate) struct Branch {
    score: usize,
    routes: Vec<Rc<DataRoute>>,
}

/// Flattens the route tree into scored branches, best score first.
pub(crate) fn flatten_branches(routes: &[Rc<DataRoute>]) -> Vec<Branch> {
    let mut branches = Vec::new();
    let mut stack = Vec::new();
    flatten_into(routes, &mut stack, &mut branches);
    // Definition order breaks score ties: earlier routes win.
    for (order, branch) in branches.iter_mut().enumerate() {
        branch.score = branch.score * 10_000 + 9_999usize.saturating_sub(order);
    }
    branches.sort_by(|a, b| b.score.cmp(&a.score));
    branches
}

fn flatten_into(
    routes: &[Rc<DataRoute>],
    stack: &mut Vec<Rc<DataRoute>>,
    branches: &mut Vec<Branch>,
) {
    for route in routes {
        stack.push(route.clone());
        if route.index || route.path.is_some() {
            branches.push(Branch {
                score: score_branch(stack),
                routes: stack.clone(),
            });
        }
        if !route.children.is_empty() {
            flatten_into(&route.children, stack, branches);
        }
        stack.pop();
    }
}

fn score_branch(routes: &[Rc<DataRoute>]) -> usize {
    let mut score = 0;
    let mut has_splat = false;
    for route in routes {
        if route.index {
            score += 1;
        }
        if let Some(path) = &route.path {
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                if segment == "*" {
                    has_splat = true;
                } else if segment.starts_with(':') {
                    score += 3;
                } else {
                    score += 4;
                }
            }
        }
    }
    if has_splat {
        score
    } else {
        score + 1
    }
}

/// Matches a pathname against the branches; `None` is a 404.
pub(crate) fn match_routes(branches: &[Branch], pathname: &str) -> Option<Vec<RouteMatch>> {
    for branch in branches {
        if let Some(matches) = match_branch(branch, pathname) {
            trace!(
                "matched {} across {} route(s)",
                pathname,
                matches.len()
            );
            return Some(matches);
        }
    }
    trace!("no branch matched {}", pathname);
    None
}

fn match_branch(branch: &Branch, pathname: &str) -> Option<Vec<RouteMatch>> {
    let segments: Vec<&str> = pathname.split('/').filter(|s| !s.is_empty()).collect();
    let mut index = 0;
    let mut params = Params::new();
    let mut consumed = String::new();
    let mut matches = Vec::with_capacity(branch.routes.len());

    for route in &branch.routes {
        let base_before_splat = consumed.clone();
        let mut saw_splat = false;

        if route.index {
            if index != segments.len() {
                return None;
            }
        } else if let Some(path) = &route.path {
            for pattern in path.split('/').filter(|s| !s.is_empty()) {
                if pattern == "*" {
                    params.insert("*".to_string(), segments[index..].join("/"));
                    for segment in &segments[index..] {
                        consumed.push('/');
                        consumed.push_str(segment);
                    }
                    index = segments.len();
                    saw_splat = true;
                    break;
                } else if let Some(name) = pattern.strip_prefix(':') {
                    let segment = segments.get(index)?;
                    params.insert(name.to_string(), decode_segment(segment));
                    consumed.push('/');
                    consumed.push_str(segment);
                    index += 1;
                } else {
                    let segment = segments.get(index)?;
                    if !pattern.eq_ignore_ascii_case(segment) {
                        return None;
                    }
                    consumed.push('/');
                    consumed.push_str(segment);
                    index += 1;
                }
            }
        }

        let pathname_now = if consumed.is_empty() {
            "/".to_string()
        } else {
            consumed.clone()
        };
        let pathname_base = if saw_splat {
            if base_before_splat.is_empty() {
                "/".to_string()
            } else {
                base_before_splat
            }
        } else {
            pathname_now.clone()
        };
        matches.push(RouteMatch {
            route: route.clone(),
            params: params.clone(),
            pathname: pathname_now,
            pathname_base,
        });
    }

    if index == segments.len() {
        Some(matches)
    } else {
        None
    }
}

fn decode_segment(raw: &str) -> String {
    percent_decode(raw.as_bytes())
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// The index of the match a submission dispatches to: the leaf, except that
/// an index route only receives the submission when the URL carries a bare
/// `index` query parameter; otherwise its layout parent is the target.
pub(crate) fn action_target_index(matches: &[RouteMatch], search: &str) -> usize {
    let leaf = matches.len() - 1;
    if matches[leaf].route.index && !has_bare_index_param(search) && leaf > 0 {
        leaf - 1
    } else {
        leaf
    }
}
