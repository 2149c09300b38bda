//! Middleware pipeline.
//!
//! Middleware runs before route dispatch and is the right place for
//! cross-cutting concerns: tracing, CORS, static files, authentication.
//!
//! # The contract
//!
//! A middleware receives the request, the response handle and a [`Next`]
//! cursor, and must do exactly one of:
//!
//! - end the response (short-circuit; later stages never run), or
//! - call [`Next::run`] once to hand the request on.
//!
//! `Next` is consumed by `run`, so it cannot be called twice. Calling it after
//! the response was ended is reported and stops the traversal.
//!
//! ```rust,no_run
//! use xpress::{App, Next, Request, Response};
//!
//! async fn seen(req: Request, res: Response, next: Next) {
//!     res.set_header("x-seen", "1");
//!     next.run(req, res).await;
//! }
//!
//! let app = App::new()
//!     .middleware(seen)
//!     .middleware_at("/admin", |_req: Request, res: Response, _next: Next| async move {
//!         res.status(403).send("forbidden")
//!     });
//! ```
//!
//! # Ordering
//!
//! Entries run strictly in registration order. The entry list is shared and
//! never mutated while serving; each request walks it with its own cursor.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error};

use crate::app::Chain;
use crate::handler::{contain, BoxFuture, IntoOutcome};
use crate::request::Request;
use crate::response::Response;

mod cors;
mod static_files;
mod trace;

pub use cors::{cors, CorsOptions};
pub use static_files::serve_static;
pub use trace::trace;

// ── Erasure ───────────────────────────────────────────────────────────────────

#[doc(hidden)]
pub trait ErasedMiddleware {
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedMiddleware = Arc<dyn ErasedMiddleware + Send + Sync + 'static>;

/// Implemented for every valid middleware function:
///
/// ```text
/// async fn name(req: Request, res: Response, next: Next) -> impl IntoOutcome
/// ```
pub trait Middleware: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_middleware(self) -> BoxedMiddleware;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut> private::Sealed for F
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoOutcome,
{
}

impl<F, Fut> Middleware for F
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoOutcome,
{
    fn into_boxed_middleware(self) -> BoxedMiddleware {
        Arc::new(FnMiddleware(self))
    }
}

struct FnMiddleware<F>(F);

impl<F, Fut> ErasedMiddleware for FnMiddleware<F>
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync,
    Fut: Future + Send + 'static,
    Fut::Output: IntoOutcome,
{
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture {
        let fut = (self.0)(req, res, next);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

// ── Entries ───────────────────────────────────────────────────────────────────

/// Where an entry applies.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Scope {
    Global,
    /// Literal string prefix. `/` and `*` match every path.
    Prefix(String),
}

impl Scope {
    pub(crate) fn applies_to(&self, path: &str) -> bool {
        match self {
            Self::Global => true,
            Self::Prefix(prefix) => prefix == "/" || prefix == "*" || path.starts_with(prefix.as_str()),
        }
    }
}

pub(crate) struct Entry {
    pub(crate) scope: Scope,
    pub(crate) middleware: BoxedMiddleware,
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// The request-local cursor into the middleware list.
///
/// Holds the position of the next entry to consider. Every request gets its
/// own cursor starting at zero; the list itself is shared and immutable.
pub struct Next {
    chain: Arc<Chain>,
    cursor: usize,
}

impl Next {
    pub(crate) fn start(chain: Arc<Chain>) -> Self {
        Self { chain, cursor: 0 }
    }

    /// Continues the pipeline with the next applicable entry, or dispatches
    /// to the route table once the list is exhausted.
    ///
    /// Resolves when the downstream stages have finished.
    pub async fn run(mut self, req: Request, res: Response) {
        if res.is_ended() {
            error!(
                method = %req.method(),
                path = req.path(),
                position = self.cursor,
                "contract violation: next called after the response was ended"
            );
            return;
        }
        if res.is_aborted() {
            debug!(path = req.path(), "client went away; pipeline stopped");
            return;
        }

        while let Some(entry) = self.chain.middleware.get(self.cursor) {
            self.cursor += 1;
            if !entry.scope.applies_to(req.path()) {
                continue;
            }
            let next = Next { chain: Arc::clone(&self.chain), cursor: self.cursor };
            let fut = entry.middleware.call(req, res.clone(), next);
            contain("middleware", fut, &res).await;
            return;
        }

        self.chain.router.dispatch(req, res).await;
    }
}
