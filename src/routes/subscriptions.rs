//! `/api/v1/subscriptions` routes

use hyper::body::Body;
use hyper::{Method, Request, Response, StatusCode};

use super::respond::{error_response, success, BoxBody, BoxError};
use crate::server::AppState;
use crate::types::{AppError, Result};

pub const SUBSCRIPTIONS_PREFIX: &str = "/api/v1/subscriptions";

/// Dispatch a request under `/api/v1/subscriptions`
pub async fn handle_subscriptions_request<B>(
    req: Request<B>,
    state: &AppState,
    path: &str,
) -> Response<BoxBody>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let rest = path
        .strip_prefix(SUBSCRIPTIONS_PREFIX)
        .unwrap_or(path)
        .trim_end_matches('/');

    let result = match rest.strip_prefix("/c/") {
        Some(channel_id) if req.method() == Method::POST => {
            handle_toggle(req, state, channel_id).await
        }
        Some(_) => Err(AppError::MethodNotAllowed),
        None => Err(AppError::not_found("Route not found")),
    };

    result.unwrap_or_else(|e| error_response(&e))
}

/// Subscribe when not subscribed, unsubscribe otherwise
async fn handle_toggle<B>(
    req: Request<B>,
    state: &AppState,
    channel_id: &str,
) -> Result<Response<BoxBody>> {
    let subscriber = state.session.authenticate(req.headers()).await?;
    let outcome = state.social.toggle_subscription(&subscriber, channel_id).await?;
    let message = if outcome.subscribed {
        "Subscribed successfully"
    } else {
        "Unsubscribed successfully"
    };
    Ok(success(StatusCode::OK, outcome, message))
}
