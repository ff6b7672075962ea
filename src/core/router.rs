//! Method + path resolution against the static route table.
//!
//! The table is compiled once into a `matchit` radix tree. Lookups borrow it
//! immutably, so concurrent requests resolve routes without synchronization.
use http::Method;
use thiserror::Error;

use crate::config::models::{RouteAccess, RouteConfig, ServiceTarget};

/// Resolution failures surfaced to clients.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    #[error("Not found")]
    NotFound,

    #[error("Method not allowed")]
    MethodNotAllowed,
}

/// Failures while compiling the route table.
#[derive(Error, Debug)]
pub enum RouteTableError {
    #[error("route '{path}' names an invalid method '{method}'")]
    InvalidMethod { path: String, method: String },

    #[error("route '{path}' names no methods")]
    NoMethods { path: String },

    #[error("route '{path}' cannot be registered: {source}")]
    Conflict {
        path: String,
        #[source]
        source: matchit::InsertError,
    },
}

#[derive(Debug)]
struct RouteEntry {
    template: String,
    methods: Vec<Method>,
    access: RouteAccess,
    target: ServiceTarget,
}

/// Outcome of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    /// The matched template, e.g. `/api/stocks/{symbol}`.
    pub template: String,
    pub access: RouteAccess,
    pub target: ServiceTarget,
    /// Request path with the API prefix removed.
    pub upstream_path: String,
}

impl ResolvedRoute {
    pub fn is_protected(&self) -> bool {
        self.access == RouteAccess::Protected
    }
}

pub struct RouteTable {
    tree: matchit::Router<Vec<usize>>,
    entries: Vec<RouteEntry>,
    api_prefix: String,
}

impl RouteTable {
    /// Compile configured routes. Rows sharing a template are merged, so a
    /// path may be split across rows with different access classes per method.
    pub fn from_config(routes: &[RouteConfig], api_prefix: &str) -> Result<Self, RouteTableError> {
        let mut entries = Vec::with_capacity(routes.len());
        let mut by_template: Vec<(String, Vec<usize>)> = Vec::new();

        for route in routes {
            if route.methods.is_empty() {
                return Err(RouteTableError::NoMethods {
                    path: route.path.clone(),
                });
            }
            let methods = route
                .methods
                .iter()
                .map(|m| {
                    Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).map_err(|_| {
                        RouteTableError::InvalidMethod {
                            path: route.path.clone(),
                            method: m.clone(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let index = entries.len();
            entries.push(RouteEntry {
                template: route.path.clone(),
                methods,
                access: route.access,
                target: route.target,
            });

            match by_template.iter_mut().find(|(t, _)| *t == route.path) {
                Some((_, indices)) => indices.push(index),
                None => by_template.push((route.path.clone(), vec![index])),
            }
        }

        let mut tree = matchit::Router::new();
        for (template, indices) in by_template {
            tree.insert(template.clone(), indices)
                .map_err(|source| RouteTableError::Conflict {
                    path: template,
                    source,
                })?;
        }

        tracing::debug!(routes = entries.len(), "Route table compiled");

        Ok(Self {
            tree,
            entries,
            api_prefix: api_prefix.trim_end_matches('/').to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the route serving `method` on `path`.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<ResolvedRoute, RouteError> {
        let matched = self.tree.at(path).map_err(|_| RouteError::NotFound)?;

        let entry = matched
            .value
            .iter()
            .map(|&i| &self.entries[i])
            .find(|entry| entry.methods.contains(method))
            .ok_or(RouteError::MethodNotAllowed)?;

        Ok(ResolvedRoute {
            template: entry.template.clone(),
            access: entry.access,
            target: entry.target,
            upstream_path: self.strip_prefix(path),
        })
    }

    /// Remove the API prefix on a segment boundary. Paths outside the prefix
    /// are forwarded unchanged.
    pub fn strip_prefix(&self, path: &str) -> String {
        if self.api_prefix.is_empty() {
            return path.to_string();
        }
        match path.strip_prefix(&self.api_prefix) {
            Some("") => "/".to_string(),
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => path.to_string(),
        }
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("entries", &self.entries)
            .field("api_prefix", &self.api_prefix)
            .finish()
    }
}
