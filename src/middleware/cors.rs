//! Cross-origin resource sharing headers.

use http::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
};
use http::Method;
use serde::Deserialize;

use super::{Middleware, Next};
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// Preflight results may be cached by the browser for one day.
const MAX_AGE_SECS: &str = "86400";

/// Options for [`cors`]. Every field has a default, so partial configs
/// deserialize fine:
///
/// ```rust
/// let opts: xpress::middleware::CorsOptions =
///     serde_json::from_str(r#"{ "allowedOrigins": "https://example.com" }"#).unwrap();
/// assert_eq!(opts.allowed_methods, "GET, POST, PUT, DELETE, OPTIONS");
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CorsOptions {
    /// `Access-Control-Allow-Origin`; default `*`.
    pub allowed_origins: String,
    /// `Access-Control-Allow-Methods`; default `GET, POST, PUT, DELETE, OPTIONS`.
    pub allowed_methods: String,
    /// `Access-Control-Allow-Headers`; default `Content-Type, Authorization`.
    pub allowed_headers: String,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            allowed_origins: "*".to_owned(),
            allowed_methods: "GET, POST, PUT, DELETE, OPTIONS".to_owned(),
            allowed_headers: "Content-Type, Authorization".to_owned(),
        }
    }
}

/// Builds a middleware that stamps the CORS headers on every response and
/// answers `OPTIONS` preflights with `204 No Content`.
///
/// Fails if an option is not valid header text.
pub fn cors(options: CorsOptions) -> Result<impl Middleware, Error> {
    let origins = header_value(&options.allowed_origins, "access-control-allow-origin")?;
    let methods = header_value(&options.allowed_methods, "access-control-allow-methods")?;
    let headers = header_value(&options.allowed_headers, "access-control-allow-headers")?;

    Ok(move |req: Request, res: Response, next: Next| {
        res.set_header(ACCESS_CONTROL_ALLOW_ORIGIN, origins.clone())
            .set_header(ACCESS_CONTROL_ALLOW_METHODS, methods.clone())
            .set_header(ACCESS_CONTROL_ALLOW_HEADERS, headers.clone())
            .set_header(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE_SECS));

        async move {
            if req.method() == Method::OPTIONS {
                res.status(204).end("")
            } else {
                next.run(req, res).await;
                Ok(())
            }
        }
    })
}

fn header_value(value: &str, header: &'static str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader(header))
}
