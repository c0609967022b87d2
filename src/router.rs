//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. A path that exists only
//! under another verb is simply not found.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Error;
use crate::handler::BoxedEndpoint;
use crate::method::Method;

/// A registered endpoint as stored in the tree.
pub(crate) struct Route<C> {
    pub id: String,
    pub endpoint: BoxedEndpoint<C>,
}

/// One row of the route table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteInfo {
    pub id: String,
    pub method: Method,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
}

pub(crate) struct Router<C> {
    routes: HashMap<Method, MatchitRouter<Arc<Route<C>>>>,
    table: Vec<RouteInfo>,
}

impl<C> Router<C> {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), table: Vec::new() }
    }

    /// Registers `route` under `info.method` + `info.path`.
    ///
    /// Path parameters use `{name}` syntax. Conflicting or malformed paths are
    /// rejected and leave the router unchanged.
    pub fn add(&mut self, route: Route<C>, info: RouteInfo) -> Result<(), Error> {
        self.routes
            .entry(info.method)
            .or_default()
            .insert(info.path.as_str(), Arc::new(route))
            .map_err(|source| Error::InvalidRoute { path: info.path.clone(), source })?;
        self.table.push(info);
        Ok(())
    }

    /// Finds the route for `method` + `path` and its params as an object of
    /// strings.
    pub fn lookup(&self, method: Method, path: &str) -> Option<(Arc<Route<C>>, Value)> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok()?;
        let route = Arc::clone(matched.value);
        let params: Map<String, Value> = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), Value::String(v.to_owned())))
            .collect();
        Some((route, Value::Object(params)))
    }

    pub fn table(&self) -> &[RouteInfo] {
        &self.table
    }
}

impl<C> Default for Router<C> {
    fn default() -> Self { Self::new() }
}
