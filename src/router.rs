//! Exact-match route table.
//!
//! One map per HTTP method plus a catch-all bucket. A path matches only when
//! it is byte-for-byte equal to the registered one: no parameters, no
//! wildcards, no trailing-slash or case folding.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use tracing::debug;

use crate::handler::{contain, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::{ContentType, Response};

/// The route table.
///
/// Built once while the [`App`](crate::App) is assembled, then frozen and
/// shared read-only by every request.
#[derive(Default)]
pub(crate) struct Router {
    routes: HashMap<Method, HashMap<String, BoxedHandler>>,
    any: HashMap<String, BoxedHandler>,
}

impl Router {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stores `handler` for `method` + `path`, replacing any earlier one.
    pub(crate) fn on(&mut self, method: Method, path: &str, handler: impl Handler) {
        self.insert(Some(method), path, handler.into_boxed_handler());
    }

    /// Stores `handler` in the catch-all bucket, consulted for every method.
    pub(crate) fn all(&mut self, path: &str, handler: impl Handler) {
        self.insert(None, path, handler.into_boxed_handler());
    }

    fn insert(&mut self, method: Option<Method>, path: &str, handler: BoxedHandler) {
        let bucket = match method {
            Some(method) => self.routes.entry(method).or_default(),
            None => &mut self.any,
        };
        if bucket.insert(path.to_owned(), handler).is_some() {
            debug!(path, "route handler replaced");
        }
    }

    /// Method-specific match first, then the catch-all bucket.
    pub(crate) fn resolve(&self, method: &Method, path: &str) -> Option<BoxedHandler> {
        self.routes
            .get(method)
            .and_then(|paths| paths.get(path))
            .or_else(|| self.any.get(path))
            .map(Arc::clone)
    }

    /// Runs the resolved handler, or answers `404 Cannot {METHOD} {path}`.
    pub(crate) async fn dispatch(&self, req: Request, res: Response) {
        match self.resolve(req.method(), req.path()) {
            Some(handler) => contain("handler", handler.call(req, res.clone()), &res).await,
            None => {
                let method = req.method().as_str().to_ascii_uppercase();
                let body = format!("Cannot {method} {}", req.path());
                // Only fails when an earlier stage already ended the response.
                let _ = res
                    .status(404)
                    .set_header(http::header::CONTENT_TYPE, ContentType::Text.as_str())
                    .end(body);
            }
        }
    }
}
