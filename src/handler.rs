//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The route table holds handlers of *different* types in a single
//! `HashMap<Method, HashMap<String, _>>`. Rust collections can only hold one
//! concrete type, so handlers are hidden behind a trait object
//! (`dyn ErasedHandler`) and stored uniformly.
//!
//! ```text
//! async fn hello(req: Request, res: Response) { … }   ← user writes this
//!        ↓ app.get("/", hello)
//! hello.into_boxed_handler()                          ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                          ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req, res)  at request time             ← one vtable dispatch
//! ```
//!
//! Middleware goes through the same erasure in [`crate::middleware`].

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::error;

use crate::request::Request;
use crate::response::Response;

// ── Internal types ────────────────────────────────────────────────────────────

/// Boxed error returned by a failed handler or middleware.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A heap-allocated, type-erased future for one pipeline stage.
///
/// `Send + 'static` let tokio move the future across threads.
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request, res: Response) -> BoxFuture;
}

/// A type-erased route handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Outcome ───────────────────────────────────────────────────────────────────

/// What a handler or middleware future may resolve to.
///
/// `()` means the stage finished. `Err(e)` means it failed: the engine logs
/// `e` and, if the response has not been ended yet, answers
/// `500 Internal Server Error`. The error text never reaches the client.
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<(), BoxError>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<(), BoxError> { Ok(()) }
}

impl<E> IntoOutcome for Result<(), E>
where
    E: Into<BoxError>,
{
    fn into_outcome(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any function of the
/// shape:
///
/// ```text
/// async fn name(req: Request, res: Response) -> impl IntoOutcome
/// ```
///
/// The handler owns writing the full response through `res`.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut> private::Sealed for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoOutcome,
{
}

impl<F, Fut> Handler for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoOutcome,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype bridging a concrete handler `F` to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut> ErasedHandler for FnHandler<F>
where
    F: Fn(Request, Response) -> Fut + Send + Sync,
    Fut: Future + Send + 'static,
    Fut::Output: IntoOutcome,
{
    fn call(&self, req: Request, res: Response) -> BoxFuture {
        let fut = (self.0)(req, res);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

// ── Fault containment ─────────────────────────────────────────────────────────

/// Runs one pipeline stage, containing its failures to this request.
///
/// A returned error or a panic is logged and turned into a generic 500 when
/// the response is still open. Once the response is ended there is nothing
/// left to repair; the fault is only logged.
pub(crate) async fn contain(stage: &'static str, fut: BoxFuture, res: &Response) {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(stage, error = %e, "request stage failed");
            res.fail();
        }
        Err(panic) => {
            error!(stage, panic = %panic_message(&*panic), "request stage panicked");
            res.fail();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
