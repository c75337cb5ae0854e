//! Response construction and request body parsing shared by all routes

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE, SET_COOKIE};
use hyper::{Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, warn};

use crate::types::{ApiErrorBody, ApiResponse, AppError, Result};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

/// Serialize `body` as the JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    let mut response = Response::new(full_body(json));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// `{statusCode, data, message, success}`
pub fn success<T: Serialize>(
    status: StatusCode,
    data: T,
    message: &str,
) -> Response<BoxBody> {
    json_response(status, &ApiResponse::new(status.as_u16(), data, message))
}

/// Error envelope. Server-side detail goes to the log only.
pub fn error_response(err: &AppError) -> Response<BoxBody> {
    let status = err.status_code();
    if status.is_server_error() {
        error!(error = %err, status = status.as_u16(), "Request failed");
    } else {
        warn!(error = %err, status = status.as_u16(), "Request rejected");
    }
    json_response(status, &ApiErrorBody::from(err))
}

/// Append `Set-Cookie` headers
pub fn with_cookies<I>(mut response: Response<BoxBody>, cookies: I) -> Response<BoxBody>
where
    I: IntoIterator<Item = String>,
{
    for cookie in cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => error!("Dropping unencodable Set-Cookie header: {}", e),
        }
    }
    response
}

/// Add CORS headers for `origin`. Credentials are only allowed for an
/// explicit origin, never for `*`.
pub fn with_cors(mut response: Response<BoxBody>, origin: &str) -> Response<BoxBody> {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(HeaderName::from_static("access-control-allow-origin"), value);
    }
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET, POST, PATCH, OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    if origin != "*" {
        headers.insert(
            HeaderName::from_static("access-control-allow-credentials"),
            HeaderValue::from_static("true"),
        );
    }
    response
}

pub fn cors_preflight(origin: &str) -> Response<BoxBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response.headers_mut().insert(
        HeaderName::from_static("access-control-max-age"),
        HeaderValue::from_static("86400"),
    );
    with_cors(response, origin)
}

/// Read the whole body, refusing more than `limit` bytes
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(AppError::bad_request("Request body too large"))
        }
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            Err(AppError::bad_request("Failed to read request body"))
        }
    }
}

/// Decode a JSON body into `T`
pub async fn parse_json_body<T, B>(body: B, limit: usize) -> Result<T>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<BoxError>,
{
    let bytes = read_body(body, limit).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Like `parse_json_body`, but an empty body yields `T::default()`
pub async fn parse_optional_json_body<T, B>(body: B, limit: usize) -> Result<T>
where
    T: DeserializeOwned + Default,
    B: Body,
    B::Error: Into<BoxError>,
{
    let bytes = read_body(body, limit).await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(&bytes)?)
}
