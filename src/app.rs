//! Application builder and the frozen dispatcher.
//!
//! [`App`] collects routes and middleware. [`App::build`] freezes them into a
//! [`Dispatcher`]: from then on the route table and the entry list are shared,
//! read-only, and registration is no longer possible.

use std::net::SocketAddr;
use std::sync::Arc;

use http::Method;
use tracing::error;

use crate::error::Error;
use crate::handler::Handler;
use crate::middleware::{Entry, Middleware, Next, Scope};
use crate::request::Request;
use crate::response::{self, HttpResponse, Response};
use crate::router::Router;
use crate::server::Server;

/// Everything a request traverses: middleware in registration order, then
/// the route table.
pub(crate) struct Chain {
    pub(crate) middleware: Vec<Entry>,
    pub(crate) router: Router,
}

/// The application builder.
///
/// Each registration call returns `self` so registrations chain naturally.
///
/// ```rust,no_run
/// use xpress::{App, Request, Response};
///
/// #[tokio::main]
/// async fn main() -> Result<(), xpress::Error> {
///     App::new()
///         .get("/hello", |_req: Request, res: Response| async move { res.send("Hi") })
///         .listen(3000, |addr| println!("listening on {addr}"))
///         .await
/// }
/// ```
pub struct App {
    middleware: Vec<Entry>,
    router: Router,
}

impl App {
    pub fn new() -> Self {
        Self { middleware: Vec::new(), router: Router::new() }
    }

    /// Registers a handler for a method + exact path. A second registration
    /// of the same pair replaces the first.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.router.on(method, path, handler);
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Registers a handler for every method. Method-specific routes on the
    /// same path take precedence.
    pub fn all(mut self, path: &str, handler: impl Handler) -> Self {
        self.router.all(path, handler);
        self
    }

    /// Appends a middleware that runs for every request.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Entry {
            scope: Scope::Global,
            middleware: middleware.into_boxed_middleware(),
        });
        self
    }

    /// Appends a middleware that runs only when the request path starts with
    /// `prefix`. The prefixes `/` and `*` match every path.
    pub fn middleware_at(mut self, prefix: &str, middleware: impl Middleware) -> Self {
        self.middleware.push(Entry {
            scope: Scope::Prefix(prefix.to_owned()),
            middleware: middleware.into_boxed_middleware(),
        });
        self
    }

    /// Freezes the registrations.
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            chain: Arc::new(Chain { middleware: self.middleware, router: self.router }),
        }
    }

    /// Serves on `0.0.0.0:port`. `on_ready` is called with the bound address
    /// once the socket is listening.
    ///
    /// Returns after a graceful shutdown (SIGTERM or Ctrl-C).
    pub async fn listen<F>(self, port: u16, on_ready: F) -> Result<(), Error>
    where
        F: FnOnce(SocketAddr) + Send + 'static,
    {
        Server::bind(SocketAddr::from(([0, 0, 0, 0], port)))
            .on_ready(on_ready)
            .serve(self)
            .await
    }
}

impl Default for App {
    fn default() -> Self { Self::new() }
}

/// A frozen application, cheap to clone and shared by every connection.
#[derive(Clone)]
pub struct Dispatcher {
    chain: Arc<Chain>,
}

impl Dispatcher {
    /// Runs one request through the pipeline and returns the response as
    /// soon as a stage ends it.
    ///
    /// The traversal runs on its own task, so code a stage runs after ending
    /// the response does not delay it. A traversal that finishes without
    /// ending the response is answered with `500`.
    pub async fn handle(&self, req: Request) -> HttpResponse {
        let (res, rx) = Response::channel();
        let method = req.method().clone();
        let path = req.path().to_owned();

        tokio::spawn(Next::start(Arc::clone(&self.chain)).run(req, res));

        match rx.await {
            Ok(response) => response,
            Err(_) => {
                error!(
                    %method,
                    path,
                    "contract violation: request finished without a response \
                     (a stage neither ended it nor called next)"
                );
                response::internal_error()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::header::{HeaderName, HeaderValue};
    use http_body_util::BodyExt;
    use serde::Serialize;

    use super::*;

    async fn body(response: HttpResponse) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    async fn hello(_req: Request, res: Response) -> Result<(), Error> {
        res.send("Hi")
    }

    async fn boom(_req: Request, _res: Response) {
        panic!("boom");
    }

    async fn end_then_panic(_req: Request, res: Response, _next: Next) {
        res.send("done").unwrap();
        panic!("late failure");
    }

    #[derive(Serialize)]
    struct User {
        id: u32,
        name: &'static str,
    }

    #[tokio::test]
    async fn hello_and_missing() {
        let app = App::new().get("/hello", hello).build();

        let ok = app.handle(Request::new(Method::GET, "/hello")).await;
        assert_eq!(ok.status(), 200);
        assert_eq!(body(ok).await, "Hi");

        let missing = app.handle(Request::new(Method::GET, "/missing")).await;
        assert_eq!(missing.status(), 404);
        assert_eq!(body(missing).await, "Cannot GET /missing");
    }

    #[tokio::test]
    async fn global_header_survives_404() {
        let app = App::new()
            .middleware(|req: Request, res: Response, next: Next| async move {
                res.set_header("x-seen", "1");
                next.run(req, res).await;
            })
            .build();

        let response = app.handle(Request::new(Method::GET, "/x")).await;
        assert_eq!(response.status(), 404);
        assert_eq!(response.headers()["x-seen"], "1");
        assert_eq!(body(response).await, "Cannot GET /x");
    }

    #[tokio::test]
    async fn query_string_is_not_part_of_the_route() {
        let app = App::new().get("/hello", hello).build();

        let ok = app.handle(Request::new(Method::GET, "/hello?lang=en")).await;
        assert_eq!(body(ok).await, "Hi");
    }

    #[tokio::test]
    async fn json_route() {
        let app = App::new()
            .post("/users", |_req: Request, res: Response| async move {
                res.status(201).json(&User { id: 7, name: "alice" })
            })
            .build();

        let response = app.handle(Request::new(Method::POST, "/users")).await;
        assert_eq!(response.status(), 201);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(body(response).await, r#"{"id":7,"name":"alice"}"#);
    }

    #[tokio::test]
    async fn middleware_can_rewrite_the_request() {
        #[derive(Clone)]
        struct User(&'static str);

        let app = App::new()
            .middleware(|mut req: Request, res: Response, next: Next| async move {
                req.extensions_mut().insert(User("alice"));
                req.headers_mut()
                    .insert(HeaderName::from_static("x-user"), HeaderValue::from_static("alice"));
                next.run(req, res).await;
            })
            .get("/me", |req: Request, res: Response| async move {
                let name = req.extensions().get::<User>().map_or("nobody", |u| u.0);
                assert_eq!(req.header("x-user"), Some("alice"));
                res.send(name)
            })
            .build();

        let response = app.handle(Request::new(Method::GET, "/me")).await;
        assert_eq!(body(response).await, "alice");
    }

    #[tokio::test]
    async fn handler_error_becomes_generic_500() {
        let app = App::new()
            .get("/fail", |_req: Request, _res: Response| async move {
                Err::<(), _>(std::io::Error::other("database password is hunter2"))
            })
            .build();

        let response = app.handle(Request::new(Method::GET, "/fail")).await;
        assert_eq!(response.status(), 500);
        assert_eq!(body(response).await, "Internal Server Error");
    }

    #[tokio::test]
    async fn handler_panic_becomes_500_and_server_keeps_going() {
        let app = App::new()
            .get("/panic", boom)
            .get("/hello", hello)
            .build();

        let response = app.handle(Request::new(Method::GET, "/panic")).await;
        assert_eq!(response.status(), 500);
        assert_eq!(body(response).await, "Internal Server Error");

        let response = app.handle(Request::new(Method::GET, "/hello")).await;
        assert_eq!(body(response).await, "Hi");
    }

    #[tokio::test]
    async fn middleware_panic_after_end_keeps_the_response() {
        let app = App::new()
            .middleware(end_then_panic)
            .build();

        let response = app.handle(Request::new(Method::GET, "/")).await;
        assert_eq!(response.status(), 200);
        assert_eq!(body(response).await, "done");
    }

    #[tokio::test]
    async fn stalled_middleware_is_answered_with_500() {
        let app = App::new()
            .middleware(|_req: Request, _res: Response, _next: Next| async move {})
            .get("/x", hello)
            .build();

        let response = app.handle(Request::new(Method::GET, "/x")).await;
        assert_eq!(response.status(), 500);
    }

    #[tokio::test]
    async fn all_routes_accept_any_method() {
        let app = App::new()
            .all("/any", |req: Request, res: Response| async move {
                res.send(req.method().as_str())
            })
            .delete("/any", |_req: Request, res: Response| async move { res.send("deleted") })
            .build();

        let put = app.handle(Request::new(Method::PUT, "/any")).await;
        assert_eq!(body(put).await, "PUT");
        let delete = app.handle(Request::new(Method::DELETE, "/any")).await;
        assert_eq!(body(delete).await, "deleted");
    }
}
