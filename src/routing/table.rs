//! Route table module
//!
//! Ordered (method, pattern, handler) entries. Entries are matched in
//! registration order and the first match wins; nothing is ever reordered
//! or deduplicated.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::handler::{self, Handler};

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("invalid route pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A single routing entry
pub struct Route {
    method: String,
    pattern: Regex,
    handler: Arc<dyn Handler>,
}

impl Route {
    /// Compile `pattern` so that it has to match the whole path
    pub fn new(method: &str, pattern: &str, handler: Arc<dyn Handler>) -> Result<Self, RouteError> {
        let anchored = format!("^(?:{pattern})$");
        let pattern_re = Regex::new(&anchored).map_err(|source| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            method: method.to_string(),
            pattern: pattern_re,
            handler,
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Captured groups when both method and path match
    ///
    /// A group that takes no part in the match is reported as an empty
    /// string so later parameters keep their position.
    pub fn matches(&self, method: &str, path: &str) -> Option<Vec<String>> {
        if self.method != method {
            return None;
        }
        let captures = self.pattern.captures(path)?;
        Some(
            captures
                .iter()
                .skip(1)
                .map(|group| group.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect(),
        )
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}

/// Immutable-after-startup list of routes plus the not-found fallback
pub struct RouteTable {
    routes: Vec<Route>,
    not_found: Arc<dyn Handler>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            not_found: Arc::new(handler::not_found),
        }
    }

    /// Append a route; registration order is match priority
    pub fn add_route(
        &mut self,
        method: &str,
        pattern: &str,
        handler: impl Handler,
    ) -> Result<&mut Self, RouteError> {
        self.routes.push(Route::new(method, pattern, Arc::new(handler))?);
        Ok(self)
    }

    /// Find the handler for a request
    ///
    /// Falls back to the not-found handler with no parameters; never fails.
    pub fn resolve(&self, method: &str, path: &str) -> (Arc<dyn Handler>, Vec<String>) {
        self.routes
            .iter()
            .find_map(|route| {
                route
                    .matches(method, path)
                    .map(|params| (Arc::clone(&route.handler), params))
            })
            .unwrap_or_else(|| (Arc::clone(&self.not_found), Vec::new()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}
