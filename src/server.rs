//! HTTP transport and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or **Ctrl-C** (or when a custom shutdown future set with
//! [`Server::with_shutdown`] resolves) the server:
//! 1. Immediately stops `listener.accept()`; no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`].

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use http::StatusCode;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::app::{App, Dispatcher};
use crate::error::Error;
use crate::request::Request;
use crate::response::{self, HttpResponse};

type ReadyCallback = Box<dyn FnOnce(SocketAddr) + Send>;
type ShutdownSignal = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The HTTP server.
///
/// ```rust,no_run
/// use xpress::{App, Server};
///
/// # async fn run() -> Result<(), xpress::Error> {
/// Server::bind("127.0.0.1:3000".parse().unwrap())
///     .on_ready(|addr| println!("listening on {addr}"))
///     .serve(App::new())
///     .await
/// # }
/// ```
pub struct Server {
    addr: SocketAddr,
    on_ready: Option<ReadyCallback>,
    shutdown: Option<ShutdownSignal>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called. Port `0` picks a free port; the real address is passed to
    /// the [`on_ready`](Server::on_ready) callback.
    pub fn bind(addr: SocketAddr) -> Self {
        Self { addr, on_ready: None, shutdown: None }
    }

    /// Parses `host:port` and binds to it.
    pub fn bind_str(addr: &str) -> Result<Self, Error> {
        addr.parse()
            .map(Self::bind)
            .map_err(|_| Error::InvalidAddress(addr.to_owned()))
    }

    /// Called once, with the bound address, before the first accept.
    pub fn on_ready(mut self, f: impl FnOnce(SocketAddr) + Send + 'static) -> Self {
        self.on_ready = Some(Box::new(f));
        self
    }

    /// Replaces the SIGTERM / Ctrl-C trigger with `signal`.
    pub fn with_shutdown(mut self, signal: impl Future<Output = ()> + Send + 'static) -> Self {
        self.shutdown = Some(Box::pin(signal));
        self
    }

    /// Freezes `app`, then accepts connections and dispatches every request
    /// through it.
    ///
    /// Returns only after a full graceful shutdown.
    pub async fn serve(self, app: App) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        let dispatcher = app.build();

        info!(addr = %local_addr, "xpress listening");
        if let Some(on_ready) = self.on_ready {
            on_ready(local_addr);
        }

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        let mut shutdown: ShutdownSignal = match self.shutdown {
            Some(signal) => signal,
            None => Box::pin(shutdown_signal()),
        };

        loop {
            tokio::select! {
                // Check shutdown first so a signal immediately stops
                // accepting, even if more connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let dispatcher = dispatcher.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let dispatcher = dispatcher.clone();
                            async move { Ok::<_, Infallible>(dispatch(dispatcher, req).await) }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("xpress stopped");
        Ok(())
    }
}

/// Converts one hyper request and runs it through the pipeline.
///
/// Failures are answered here (400 for an unreadable body); hyper never sees
/// an error.
async fn dispatch(dispatcher: Dispatcher, req: hyper::Request<Incoming>) -> HttpResponse {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(path = parts.uri.path(), "failed to read request body: {e}");
            return response::plain(StatusCode::BAD_REQUEST, "Bad Request");
        }
    };

    dispatcher.handle(Request::from_parts(parts, body)).await
}

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On other platforms only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
