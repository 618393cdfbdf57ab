mod pattern;

pub use pattern::{split_path, RoutePattern, Segment, Specificity};

use crate::controller::IntoController;
use crate::error::{PatternError, ServerError, ServerResult};
use crate::handler::Handler;
use crate::http::Method;
use crate::pipeline::BodyMode;
use std::collections::HashMap;
use std::fmt;

/// Method filter of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Methods {
    Any,
    Only(Vec<Method>),
}

impl Methods {
    pub const ANY: Methods = Methods::Any;

    pub fn only<I: IntoIterator<Item = Method>>(methods: I) -> Self {
        Methods::Only(methods.into_iter().collect())
    }

    pub fn allows(&self, method: Method) -> bool {
        match self {
            Methods::Any => true,
            Methods::Only(methods) => methods.contains(&method),
        }
    }
}

impl Default for Methods {
    fn default() -> Self {
        Methods::Any
    }
}

impl From<Method> for Methods {
    fn from(method: Method) -> Self {
        Methods::Only(vec![method])
    }
}

impl<const N: usize> From<[Method; N]> for Methods {
    fn from(methods: [Method; N]) -> Self {
        Methods::only(methods)
    }
}

impl From<&[Method]> for Methods {
    fn from(methods: &[Method]) -> Self {
        Methods::only(methods.iter().copied())
    }
}

/// Parameters bound while matching a path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    named: Vec<(String, String)>,
    wildcard: Option<String>,
    wildcard_segments: Vec<String>,
}

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.named
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Remainder matched by a trailing wildcard, joined with `/`.
    pub fn wildcard(&self) -> Option<&str> {
        self.wildcard.as_deref()
    }

    /// Decoded segments of the wildcard remainder. Unlike [`Params::wildcard`]
    /// this keeps an encoded `%2F` inside its segment.
    pub fn wildcard_segments(&self) -> &[String] {
        &self.wildcard_segments
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.named.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty()
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        self.named.iter().cloned().collect()
    }

    pub(crate) fn insert(&mut self, name: String, value: String) {
        self.named.push((name, value));
    }

    pub(crate) fn set_wildcard(&mut self, segments: Vec<String>) {
        self.wildcard = Some(segments.join("/"));
        self.wildcard_segments = segments;
    }
}

pub struct Route {
    base_path: String,
    pattern: RoutePattern,
    methods: Methods,
    body_mode: BodyMode,
    handler: Box<dyn Handler>,
}

impl Route {
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn methods(&self) -> &Methods {
        &self.methods
    }

    pub fn body_mode(&self) -> BodyMode {
        self.body_mode
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern.template())
            .field("methods", &self.methods)
            .field("body_mode", &self.body_mode)
            .finish()
    }
}

#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: Params,
}

/// The route table, filled during setup and read-only while serving.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Compiles and appends every route of a controller, prefixing the base path verbatim.
    ///
    /// Routes of a controller that fails to compile are not added.
    pub fn register<C: IntoController>(&mut self, controller: C) -> Result<&mut Self, PatternError> {
        let controller = controller.into_controller();
        let base_path = controller.base_path().to_string();
        let mut compiled = Vec::with_capacity(controller.len());

        for def in controller.into_routes() {
            let template = format!("{}{}", base_path, def.pattern);
            let pattern = RoutePattern::compile(&template)?;
            tracing::debug!(
                pattern = %pattern,
                methods = ?def.methods,
                body_mode = ?def.body_mode,
                "route registered"
            );
            compiled.push(Route {
                base_path: base_path.clone(),
                pattern,
                methods: def.methods,
                body_mode: def.body_mode,
                handler: def.handler,
            });
        }

        self.routes.append(&mut compiled);
        Ok(self)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Resolves a request line to the most specific method-compatible route.
    ///
    /// Exact literal routes beat routes with named segments, which beat
    /// trailing wildcards; within a class the first registered wins.
    pub fn dispatch(&self, method: Method, path: &str) -> ServerResult<RouteMatch<'_>> {
        let path = path.split('?').next().unwrap_or(path);
        let segments = split_path(path);

        let mut path_matched = false;
        let mut allowed: Vec<Method> = Vec::new();
        let mut best: Option<(Specificity, RouteMatch<'_>)> = None;

        for route in &self.routes {
            let params = match route.pattern.match_segments(&segments) {
                Some(params) => params,
                None => continue,
            };
            path_matched = true;

            if !route.methods.allows(method) {
                if let Methods::Only(methods) = &route.methods {
                    for m in methods {
                        if !allowed.contains(m) {
                            allowed.push(*m);
                        }
                    }
                }
                continue;
            }

            let specificity = route.pattern.specificity();
            let better = match &best {
                Some((current, _)) => specificity < *current,
                None => true,
            };
            if better {
                best = Some((specificity, RouteMatch { route, params }));
                if specificity == Specificity::Exact {
                    break;
                }
            }
        }

        match best {
            Some((_, found)) => Ok(found),
            None if path_matched => Err(ServerError::MethodNotAllowed { allowed }),
            None => Err(ServerError::NotFound),
        }
    }
}
