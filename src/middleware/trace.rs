//! Per-request log line.

use std::time::Instant;

use tracing::info;

use super::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Logs method, path, final status and latency once every later stage has
/// finished. Register it first so it measures the whole pipeline.
pub fn trace() -> impl Middleware {
    |req: Request, res: Response, next: Next| async move {
        let started = Instant::now();
        let method = req.method().clone();
        let path = req.path().to_owned();

        next.run(req, res.clone()).await;

        info!(
            %method,
            path,
            status = res.status_code().as_u16(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "request"
        );
    }
}
