//! End-to-end tests over a real socket.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use xpress::middleware::{cors, serve_static, CorsOptions};
use xpress::{App, Next, Request, Response, Server};

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<Result<(), xpress::Error>>,
}

async fn start(app: App) -> Running {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (stop, stop_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(
        Server::bind("127.0.0.1:0".parse().unwrap())
            .on_ready(move |addr| {
                let _ = ready_tx.send(addr);
            })
            .with_shutdown(async move {
                let _ = stop_rx.await;
            })
            .serve(app),
    );

    let addr = ready_rx.await.unwrap();
    Running { addr, stop, task }
}

/// Sends one raw HTTP/1.1 request and returns the whole raw response.
async fn raw(addr: SocketAddr, method: &str, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("{method} {path} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("response timed out")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

fn status_line(response: &str) -> &str {
    response.lines().next().unwrap_or_default()
}

fn body(response: &str) -> &str {
    response.split_once("\r\n\r\n").map_or("", |(_, body)| body)
}

fn has_header(response: &str, name: &str, value: &str) -> bool {
    let head = response.split_once("\r\n\r\n").map_or(response, |(head, _)| head);
    head.lines().any(|line| {
        line.split_once(':').is_some_and(|(n, v)| n.eq_ignore_ascii_case(name) && v.trim() == value)
    })
}

async fn hello(_req: Request, res: Response) -> Result<(), xpress::Error> {
    res.send("Hi")
}

#[tokio::test]
async fn hello_and_not_found() {
    let server = start(App::new().get("/hello", hello)).await;

    let ok = raw(server.addr, "GET", "/hello").await;
    assert_eq!(status_line(&ok), "HTTP/1.1 200 OK");
    assert!(has_header(&ok, "content-type", "text/plain; charset=utf-8"));
    assert_eq!(body(&ok), "Hi");

    let missing = raw(server.addr, "GET", "/missing").await;
    assert_eq!(status_line(&missing), "HTTP/1.1 404 Not Found");
    assert_eq!(body(&missing), "Cannot GET /missing");

    let _ = server.stop.send(());
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn middleware_headers_reach_the_wire() {
    let app = App::new()
        .middleware(|req: Request, res: Response, next: Next| async move {
            res.set_header("x-seen", "1");
            next.run(req, res).await;
        })
        .middleware(cors(CorsOptions::default()).unwrap());
    let server = start(app).await;

    let response = raw(server.addr, "GET", "/x").await;
    assert_eq!(status_line(&response), "HTTP/1.1 404 Not Found");
    assert!(has_header(&response, "x-seen", "1"));
    assert!(has_header(&response, "access-control-allow-origin", "*"));

    let preflight = raw(server.addr, "OPTIONS", "/x").await;
    assert_eq!(status_line(&preflight), "HTTP/1.1 204 No Content");
    assert!(has_header(&preflight, "access-control-max-age", "86400"));
    assert_eq!(body(&preflight), "");

    let _ = server.stop.send(());
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn static_file_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("data.json"), r#"{"ok":true}"#).unwrap();

    let app = App::new()
        .middleware_at("/", serve_static(dir.path()))
        .get("/hello", hello);
    let server = start(app).await;

    let file = raw(server.addr, "GET", "/data.json").await;
    assert_eq!(status_line(&file), "HTTP/1.1 200 OK");
    assert!(has_header(&file, "content-type", "application/json"));
    assert!(file.contains(r#"{"ok":true}"#));

    let fallthrough = raw(server.addr, "GET", "/hello").await;
    assert_eq!(body(&fallthrough), "Hi");

    let _ = server.stop.send(());
    server.task.await.unwrap().unwrap();
}

async fn explode(_req: Request, _res: Response) {
    panic!("handler exploded");
}

#[tokio::test]
async fn handler_panic_is_contained() {
    let app = App::new()
        .get("/panic", explode)
        .get("/hello", hello);
    let server = start(app).await;

    let failed = raw(server.addr, "GET", "/panic").await;
    assert_eq!(status_line(&failed), "HTTP/1.1 500 Internal Server Error");
    assert_eq!(body(&failed), "Internal Server Error");
    assert!(!failed.contains("exploded"));

    let ok = raw(server.addr, "GET", "/hello").await;
    assert_eq!(body(&ok), "Hi");

    let _ = server.stop.send(());
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn invalid_bind_address_is_an_error() {
    assert!(matches!(
        Server::bind_str("not an address"),
        Err(xpress::Error::InvalidAddress(_)),
    ));
}
