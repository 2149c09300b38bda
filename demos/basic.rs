//! Minimal xpress example: CORS, static files, JSON and text routes.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/hello
//!   curl http://localhost:3000/users/me
//!   curl -X POST http://localhost:3000/users -d '{"name":"alice"}'
//!   curl -X OPTIONS -i http://localhost:3000/users
//!   curl -H 'authorization: token' http://localhost:3000/admin/stats
//!   curl http://localhost:3000/missing

use serde::Serialize;
use xpress::middleware::{cors, serve_static, trace, CorsOptions};
use xpress::{App, Next, Request, Response, Server};

#[derive(Serialize)]
struct User {
    id: u32,
    name: &'static str,
}

#[tokio::main]
async fn main() -> Result<(), xpress::Error> {
    tracing_subscriber::fmt::init();

    let app = App::new()
        .middleware(trace())
        .middleware(cors(CorsOptions::default())?)
        .middleware_at("/admin", require_token)
        .middleware(serve_static("public"))
        .get("/hello", hello)
        .get("/users/me", current_user)
        .post("/users", create_user)
        .get("/admin/stats", stats);

    Server::bind_str("0.0.0.0:3000")?
        .on_ready(|addr| tracing::info!(%addr, "demo ready"))
        .serve(app)
        .await
}

// GET /hello → text/plain "Hi"
async fn hello(_req: Request, res: Response) -> Result<(), xpress::Error> {
    res.send("Hi")
}

// GET /users/me → application/json
async fn current_user(_req: Request, res: Response) -> Result<(), xpress::Error> {
    res.send(&User { id: 42, name: "alice" })
}

// POST /users
//
// req.body() is the raw request body; xpress does not parse it.
async fn create_user(req: Request, res: Response) -> Result<(), xpress::Error> {
    if req.body().is_empty() {
        return res.status(400).send("empty body");
    }
    res.status(201)
        .set_header("location", "/users/99")
        .json(&User { id: 99, name: "new_user" })
}

async fn require_token(req: Request, res: Response, next: Next) -> Result<(), xpress::Error> {
    if req.header("authorization").is_none() {
        return res.status(401).send("missing token");
    }
    next.run(req, res).await;
    Ok(())
}

async fn stats(_req: Request, res: Response) -> Result<(), xpress::Error> {
    res.json(&serde_json::json!({ "uptime_secs": 1, "requests": 7 }))
}
