//! Controllers group routes under a common base path.
//!
//! ```rust
//! use snake_http::{Controller, Methods, Response};
//!
//! let mut news = Controller::new("/news");
//! news.get("/{query}", |req: snake_http::Request| async move {
//!     let query = req.param("query").unwrap_or_default().to_string();
//!     Ok(Response::json(vec![query]))
//! });
//! news.add_route("/c", Methods::Any, |_req| async { Ok(Response::json(Vec::<u8>::new())) });
//! ```

use crate::handler::{Handler, IntoResponse};
use crate::http::{Method, Request};
use crate::pipeline::BodyMode;
use crate::router::Methods;

/// A route as declared by a controller, before its template is compiled.
pub struct RouteDef {
    pub(crate) pattern: String,
    pub(crate) methods: Methods,
    pub(crate) body_mode: BodyMode,
    pub(crate) handler: Box<dyn Handler>,
}

impl RouteDef {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn methods(&self) -> &Methods {
        &self.methods
    }
}

pub struct Controller {
    base_path: String,
    routes: Vec<RouteDef>,
}

impl Controller {
    pub fn new<P: Into<String>>(base_path: P) -> Self {
        Self {
            base_path: base_path.into(),
            routes: Vec::new(),
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn routes(&self) -> &[RouteDef] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub(crate) fn into_routes(self) -> Vec<RouteDef> {
        self.routes
    }

    /// Declares a route whose request body is buffered before the handler runs.
    pub fn add_route<M, F, R>(&mut self, pattern: &str, methods: M, handler: F) -> &mut Self
    where
        M: Into<Methods>,
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.push(pattern, methods.into(), BodyMode::Buffered, handler)
    }

    /// Declares a route whose handler receives the request body as a live `ByteStream`.
    pub fn add_streaming_route<M, F, R>(&mut self, pattern: &str, methods: M, handler: F) -> &mut Self
    where
        M: Into<Methods>,
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.push(pattern, methods.into(), BodyMode::Streaming, handler)
    }

    /// Declares a route served by a type implementing [`Handler`].
    pub fn add_handler<M, H>(&mut self, pattern: &str, methods: M, body_mode: BodyMode, handler: H) -> &mut Self
    where
        M: Into<Methods>,
        H: Handler,
    {
        self.push(pattern, methods.into(), body_mode, handler)
    }

    pub fn any<F, R>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.add_route(pattern, Methods::Any, handler)
    }

    pub fn get<F, R>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.add_route(pattern, Method::GET, handler)
    }

    pub fn post<F, R>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.add_route(pattern, Method::POST, handler)
    }

    pub fn put<F, R>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.add_route(pattern, Method::PUT, handler)
    }

    pub fn patch<F, R>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.add_route(pattern, Method::PATCH, handler)
    }

    pub fn delete<F, R>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.add_route(pattern, Method::DELETE, handler)
    }

    fn push<H: Handler>(
        &mut self,
        pattern: &str,
        methods: Methods,
        body_mode: BodyMode,
        handler: H,
    ) -> &mut Self {
        self.routes.push(RouteDef {
            pattern: pattern.to_string(),
            methods,
            body_mode,
            handler: Box::new(handler),
        });
        self
    }
}

/// Anything that can describe its routes as a [`Controller`].
pub trait IntoController {
    fn into_controller(self) -> Controller;
}

impl IntoController for Controller {
    fn into_controller(self) -> Controller {
        self
    }
}
