//! Static file serving.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use futures_util::stream::{self, Stream};
use http::header::CONTENT_TYPE;
use http::Method;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{error, warn};

use super::{Middleware, Next};
use crate::request::Request;
use crate::response::{ContentType, Response};

const CHUNK_SIZE: usize = 64 * 1024;

/// Opens a resolved file for reading.
type Opener = fn(PathBuf) -> BoxFuture<'static, io::Result<File>>;

fn open(path: PathBuf) -> BoxFuture<'static, io::Result<File>> {
    Box::pin(File::open(path))
}

/// Serves files under `root` for `GET` and `HEAD` requests.
///
/// The request path is joined onto `root`. When no regular file exists there
/// the request falls through to the next stage; this middleware never answers
/// 404 itself. Paths with `..` segments never leave `root`: they fall through.
///
/// The body is read in chunks as the client consumes it. A file that cannot
/// be opened yields `500`; a read error mid-body aborts the connection.
pub fn serve_static(root: impl Into<PathBuf>) -> impl Middleware + 'static {
    serve_with(root.into(), open)
}

fn serve_with(root: PathBuf, open: Opener) -> impl Middleware {
    let root = Arc::new(root);

    move |req: Request, res: Response, next: Next| {
        let root = Arc::clone(&root);
        async move {
            let target = match *req.method() {
                Method::GET | Method::HEAD => resolve(&root, req.path()),
                _ => None,
            };
            let Some(file) = target else {
                return next.run(req, res).await;
            };
            if !is_file(&file).await {
                return next.run(req, res).await;
            }

            let content_type = file
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(ContentType::OctetStream, ContentType::from_extension);

            let handle = match open(file.clone()).await {
                Ok(handle) => handle,
                Err(e) => {
                    error!(path = %file.display(), "failed to open static file: {e}");
                    res.fail();
                    return;
                }
            };

            res.status(200).set_header(CONTENT_TYPE, content_type.as_str());
            let sent = if req.method() == Method::HEAD {
                res.end(Bytes::new())
            } else {
                res.stream(chunks(handle, file))
            };
            if let Err(e) = sent {
                warn!("static file not sent: {e}");
            }
        }
    }
}

/// Joins a request path onto `root`, refusing `..`, roots and prefixes.
fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = Path::new(request_path.trim_start_matches('/'));
    if relative.as_os_str().is_empty() {
        return None;
    }
    relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        .then(|| root.join(relative))
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|meta| meta.is_file())
}

/// Reads the file one chunk per poll, so a slow client slows the reader.
fn chunks(file: File, path: PathBuf) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    stream::try_unfold((file, path), |(mut file, path)| async move {
        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        match file.read_buf(&mut buf).await {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some((buf.freeze(), (file, path)))),
            Err(e) => {
                error!(path = %path.display(), "static file read failed mid-body: {e}");
                Err(e)
            }
        }
    })
}
