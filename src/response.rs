//! The per-request response capability.
//!
//! A [`Response`] is a cheap handle over one request's outgoing response. The
//! transport creates it before the pipeline starts; every middleware and the
//! final handler receive a clone of the same handle. Ending it (with
//! [`end`](Response::end), [`json`](Response::json), [`send`](Response::send)
//! or [`stream`](Response::stream)) hands the finished response to the
//! transport at once, even if the stage keeps running afterwards.

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::error::Error;

/// Body type handed to hyper: either buffered bytes or a pulled stream.
pub type Body = UnsyncBoxBody<Bytes, io::Error>;

/// The finished response, as the transport sends it.
pub type HttpResponse = http::Response<Body>;

const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Css,          // text/css; charset=utf-8
    Csv,          // text/csv
    Gif,          // image/gif
    Html,         // text/html; charset=utf-8
    Ico,          // image/x-icon
    Javascript,   // text/javascript; charset=utf-8
    Jpeg,         // image/jpeg
    Json,         // application/json
    OctetStream,  // application/octet-stream  (unknown / binary)
    Pdf,          // application/pdf
    Png,          // image/png
    Svg,          // image/svg+xml
    Text,         // text/plain; charset=utf-8
    Wasm,         // application/wasm
    Webp,         // image/webp
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Css         => "text/css; charset=utf-8",
            Self::Csv         => "text/csv",
            Self::Gif         => "image/gif",
            Self::Html        => "text/html; charset=utf-8",
            Self::Ico         => "image/x-icon",
            Self::Javascript  => "text/javascript; charset=utf-8",
            Self::Jpeg        => "image/jpeg",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Pdf         => "application/pdf",
            Self::Png         => "image/png",
            Self::Svg         => "image/svg+xml",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Wasm        => "application/wasm",
            Self::Webp        => "image/webp",
            Self::Xml         => "application/xml",
        }
    }

    /// Maps a file extension (without the dot, any case) to a content type.
    /// Unknown extensions are served as `application/octet-stream`.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "css"          => Self::Css,
            "csv"          => Self::Csv,
            "gif"          => Self::Gif,
            "htm" | "html" => Self::Html,
            "ico"          => Self::Ico,
            "js" | "mjs"   => Self::Javascript,
            "jpeg" | "jpg" => Self::Jpeg,
            "json"         => Self::Json,
            "pdf"          => Self::Pdf,
            "png"          => Self::Png,
            "svg"          => Self::Svg,
            "txt"          => Self::Text,
            "wasm"         => Self::Wasm,
            "webp"         => Self::Webp,
            "xml"          => Self::Xml,
            _              => Self::OctetStream,
        }
    }

    fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// Handle to one request's outgoing response.
///
/// Clones share state. Status and headers may be changed until the response
/// is ended; ending it twice is a contract violation and returns
/// [`Error::AlreadyEnded`].
///
/// ```rust,no_run
/// use xpress::{Request, Response};
///
/// async fn created(_req: Request, res: Response) -> Result<(), xpress::Error> {
///     res.status(201)
///         .set_header("location", "/users/42")
///         .json(&serde_json::json!({ "id": 42 }))
/// }
/// ```
#[derive(Clone)]
pub struct Response {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    status: StatusCode,
    headers: HeaderMap,
    ended: bool,
    sender: Option<oneshot::Sender<HttpResponse>>,
}

impl Response {
    /// Creates the handle and the receiving end the transport waits on.
    pub(crate) fn channel() -> (Self, oneshot::Receiver<HttpResponse>) {
        let (tx, rx) = oneshot::channel();
        let inner = Inner {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            ended: false,
            sender: Some(tx),
        };
        (Self { inner: Arc::new(Mutex::new(inner)) }, rx)
    }

    // Critical sections never await, so a poisoned lock still holds
    // consistent state.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the numeric status code; returns `self` for chaining.
    pub fn status(&self, code: u16) -> &Self {
        let Ok(code) = StatusCode::from_u16(code) else {
            error!(code, "invalid status code ignored");
            return self;
        };
        let mut inner = self.lock();
        if inner.ended {
            warn!(status = code.as_u16(), "status set after the response was ended; ignored");
        } else {
            inner.status = code;
        }
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.lock().status
    }

    /// Sets (replaces) a header. Invalid names or values are logged and
    /// ignored.
    pub fn set_header<K, V>(&self, name: K, value: V) -> &Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let name: Result<HeaderName, _> = name.try_into();
        let value: Result<HeaderValue, _> = value.try_into();
        let (Ok(name), Ok(value)) = (name, value) else {
            error!("invalid header ignored");
            return self;
        };
        let mut inner = self.lock();
        if inner.ended {
            warn!(header = %name, "header set after the response was ended; ignored");
        } else {
            inner.headers.insert(name, value);
        }
        self
    }

    /// Current value of a response header, if set and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<String> {
        self.lock()
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    /// `true` once the client is gone: writes become no-ops and the pipeline
    /// stops advancing.
    pub fn is_aborted(&self) -> bool {
        self.lock().sender.as_ref().is_some_and(oneshot::Sender::is_closed)
    }

    /// Ends the response with `body` as-is.
    pub fn end(&self, body: impl Into<Bytes>) -> Result<(), Error> {
        self.finish(None, full(body.into()))
    }

    /// Ends the response with a streamed body.
    ///
    /// The stream is polled only as fast as the client consumes the body. An
    /// `Err` item aborts the connection.
    pub fn stream<S>(&self, body: S) -> Result<(), Error>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.finish(None, StreamBody::new(body.map_ok(Frame::data)).boxed_unsync())
    }

    /// Serializes `data` as JSON and ends the response with it.
    ///
    /// If serialization fails the response is ended with a generic 500 and
    /// the error is returned.
    pub fn json<T>(&self, data: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_vec(data) {
            Ok(bytes) => self.finish(Some(ContentType::Json), full(bytes.into())),
            Err(e) => {
                self.fail();
                Err(Error::Serialize(e))
            }
        }
    }

    /// Ends the response, choosing the encoding from the value's shape.
    ///
    /// A value that serializes to a string (`&str`, `String`, …) is written
    /// verbatim as `text/plain`; anything else goes through
    /// [`json`](Response::json).
    pub fn send<T>(&self, body: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_value(body) {
            Ok(serde_json::Value::String(text)) => {
                self.finish(Some(ContentType::Text), full(text.into()))
            }
            _ => self.json(body),
        }
    }

    /// Ends an open response with a generic 500. No-op once ended.
    pub(crate) fn fail(&self) {
        let mut inner = self.lock();
        if inner.ended {
            return;
        }
        inner.status = StatusCode::INTERNAL_SERVER_ERROR;
        inner.headers.remove(header::CONTENT_LENGTH);
        let body = full(Bytes::from_static(INTERNAL_ERROR_BODY.as_bytes()));
        Self::commit(&mut inner, Some(ContentType::Text), body);
    }

    fn finish(&self, content_type: Option<ContentType>, body: Body) -> Result<(), Error> {
        let mut inner = self.lock();
        if inner.ended {
            error!("contract violation: response ended twice");
            return Err(Error::AlreadyEnded);
        }
        Self::commit(&mut inner, content_type, body);
        Ok(())
    }

    fn commit(inner: &mut Inner, content_type: Option<ContentType>, body: Body) {
        inner.ended = true;
        if let Some(ct) = content_type {
            inner.headers.insert(header::CONTENT_TYPE, ct.header_value());
        }

        let mut response = http::Response::new(body);
        *response.status_mut() = inner.status;
        *response.headers_mut() = inner.headers.clone();

        let Some(sender) = inner.sender.take() else { return };
        if sender.send(response).is_err() {
            debug!("client went away before the response was sent");
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Response")
            .field("status", &inner.status)
            .field("headers", &inner.headers)
            .field("ended", &inner.ended)
            .finish()
    }
}

fn full(bytes: Bytes) -> Body {
    Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
}

/// Builds a response outside the pipeline (transport-level failures).
pub(crate) fn plain(status: StatusCode, body: &'static str) -> HttpResponse {
    let mut response = http::Response::new(full(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, ContentType::Text.header_value());
    response
}

pub(crate) fn internal_error() -> HttpResponse {
    plain(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY)
}
