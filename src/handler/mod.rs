use crate::error::ServerResult;
use crate::http::Request;
use crate::http::Response;
use futures::future::{self, BoxFuture, Ready};
use std::future::Future;

pub type HttpResponse = ServerResult<Response>;

pub trait IntoResponse {
    fn into_response_future(self) -> BoxFuture<'static, HttpResponse>;
}

impl<F: Future<Output = HttpResponse> + Send + 'static> IntoResponse for F {
    fn into_response_future(self) -> BoxFuture<'static, HttpResponse> {
        Box::pin(self)
    }
}

/// Produces the response for a dispatched request.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, req: Request) -> BoxFuture<'static, HttpResponse>;
}

impl<F, R> Handler for F
where
    F: Fn(Request) -> R + Send + Sync + 'static,
    R: IntoResponse,
{
    fn handle(&self, req: Request) -> BoxFuture<'static, HttpResponse> {
        (self)(req).into_response_future()
    }
}

/// Wraps a handler that computes its response without awaiting anything.
pub fn sync<F>(handler: F) -> impl Fn(Request) -> Ready<HttpResponse> + Send + Sync + 'static
where
    F: Fn(Request) -> HttpResponse + Send + Sync + 'static,
{
    move |req| future::ready(handler(req))
}
