//! # xpress
//!
//! A minimal HTTP dispatch layer: a route table keyed by method and exact
//! path, and an ordered middleware pipeline that runs before dispatch.
//!
//! ## How a request flows
//!
//! ```text
//! transport ─▶ middleware[0] ─▶ middleware[1] ─▶ … ─▶ route table ─▶ handler
//!                   │                 │                    │
//!                   └─ may end the response here           └─ 404 Cannot GET /path
//! ```
//!
//! - Routes match the exact path, case-sensitively. A method-specific route
//!   wins over one registered with [`App::all`].
//! - Middleware runs in registration order. Scoped middleware
//!   ([`App::middleware_at`]) runs only when the path starts with its prefix.
//! - Registrations are frozen before the first request. Each request walks
//!   the shared list with its own cursor ([`Next`]).
//! - A failing or panicking stage is contained to its request and answered
//!   with a generic `500`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use xpress::middleware::{cors, CorsOptions};
//! use xpress::{App, Next, Request, Response};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), xpress::Error> {
//!     App::new()
//!         .middleware(cors(CorsOptions::default())?)
//!         .middleware_at("/admin", require_token)
//!         .get("/hello", hello)
//!         .listen(3000, |addr| println!("listening on {addr}"))
//!         .await
//! }
//!
//! async fn hello(_req: Request, res: Response) -> Result<(), xpress::Error> {
//!     res.send("Hi")
//! }
//!
//! async fn require_token(req: Request, res: Response, next: Next) -> Result<(), xpress::Error> {
//!     if req.header("authorization").is_none() {
//!         return res.status(401).send("missing token");
//!     }
//!     next.run(req, res).await;
//!     Ok(())
//! }
//! ```

mod app;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;

pub use app::{App, Dispatcher};
pub use error::Error;
pub use handler::{BoxError, Handler, IntoOutcome};
pub use middleware::{Middleware, Next};
pub use request::Request;
pub use response::{Body, ContentType, HttpResponse, Response};
pub use server::Server;

pub use http::{Method, StatusCode};
