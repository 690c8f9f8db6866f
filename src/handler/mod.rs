use crate::error::ServerResult;
use crate::http::Request;
use crate::http::Response;
use futures::future::BoxFuture;
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

/// Answers requests for a server instance. One handler is shared by every
/// listener of a set.
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

pub fn hello_body(path: &str) -> String {
    format!("Hello World ! '{}'", path)
}

/// The one handler every listener runs: echoes the raw path back as HTML.
pub async fn hello_world(req: Request) -> HttpResponse {
    Ok(Response::html(hello_body(&req.path)))
}
