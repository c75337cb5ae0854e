//! `/api/v1/users` routes
//!
//! Public: register, login, refresh-token. Everything else goes through the
//! session gate first and acts on the authenticated identity.

use hyper::body::Body;
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::respond::{
    error_response, parse_json_body, parse_optional_json_body, success, with_cookies, BoxBody,
    BoxError,
};
use crate::auth::{read_cookie, REFRESH_COOKIE};
use crate::server::AppState;
use crate::services::{
    ChangePasswordRequest, LoginRequest, MediaPayload, RefreshRequest, RegisterRequest,
    UpdateAccountRequest,
};
use crate::store::ProfileImage;
use crate::types::{AppError, Result};

pub const USERS_PREFIX: &str = "/api/v1/users";

#[derive(Debug, Default, Deserialize)]
struct AvatarBody {
    avatar: Option<MediaPayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoverImageBody {
    cover_image: Option<MediaPayload>,
}

/// Dispatch a request under `/api/v1/users`
pub async fn handle_users_request<B>(
    req: Request<B>,
    state: &AppState,
    path: &str,
) -> Response<BoxBody>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let rest = path.strip_prefix(USERS_PREFIX).unwrap_or(path);
    let rest = rest.trim_end_matches('/');
    let method = req.method().clone();

    let result = match (&method, rest) {
        (&Method::POST, "/register") => handle_register(req, state).await,
        (&Method::POST, "/login") => handle_login(req, state).await,
        (&Method::POST, "/logout") => handle_logout(req, state).await,
        (&Method::POST, "/refresh-token") => handle_refresh(req, state).await,
        (&Method::POST, "/change-password") => handle_change_password(req, state).await,
        (&Method::GET, "/current-user") => handle_current_user(req, state).await,
        (&Method::PATCH, "/update-account") => handle_update_account(req, state).await,
        (&Method::PATCH, "/avatar") => handle_avatar(req, state).await,
        (&Method::PATCH, "/cover-image") => handle_cover_image(req, state).await,
        (&Method::GET, "/history") => handle_watch_history(req, state).await,
        (&Method::GET, "/c") => handle_channel_profile(req, state, "").await,
        (&Method::GET, r) if r.starts_with("/c/") => {
            handle_channel_profile(req, state, &r["/c/".len()..]).await
        }
        (&Method::POST, r) if r.starts_with("/history/") => {
            handle_record_watch(req, state, &r["/history/".len()..]).await
        }

        // Method not allowed
        (_, "/register")
        | (_, "/login")
        | (_, "/logout")
        | (_, "/refresh-token")
        | (_, "/change-password")
        | (_, "/current-user")
        | (_, "/update-account")
        | (_, "/avatar")
        | (_, "/cover-image")
        | (_, "/history")
        | (_, "/c") => Err(AppError::MethodNotAllowed),
        (_, r) if r.starts_with("/c/") || r.starts_with("/history/") => {
            Err(AppError::MethodNotAllowed)
        }

        _ => Err(AppError::not_found("Route not found")),
    };

    result.unwrap_or_else(|e| error_response(&e))
}

async fn handle_register<B>(req: Request<B>, state: &AppState) -> Result<Response<BoxBody>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let body: RegisterRequest = parse_json_body(req.into_body(), state.args.max_body_bytes).await?;
    let user = state.accounts.register(body).await?;
    Ok(success(
        StatusCode::CREATED,
        &user,
        "User registered successfully",
    ))
}

async fn handle_login<B>(req: Request<B>, state: &AppState) -> Result<Response<BoxBody>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let body: LoginRequest = parse_json_body(req.into_body(), state.args.max_body_bytes).await?;
    let session = state.accounts.login(body).await?;
    let cookies = state.cookies.session(&session.tokens);
    Ok(with_cookies(
        success(StatusCode::OK, &session, "User logged in successfully"),
        cookies,
    ))
}

async fn handle_logout<B>(req: Request<B>, state: &AppState) -> Result<Response<BoxBody>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let user = state.session.authenticate(req.headers()).await?;
    state.accounts.logout(&user).await?;
    Ok(with_cookies(
        success(StatusCode::OK, json!({}), "User logged out"),
        state.cookies.cleared(),
    ))
}

/// Refresh token comes from the cookie, else from the JSON body
async fn handle_refresh<B>(req: Request<B>, state: &AppState) -> Result<Response<BoxBody>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let token = match read_cookie(req.headers(), REFRESH_COOKIE) {
        Some(token) => Some(token),
        None => {
            let body: RefreshRequest =
                parse_optional_json_body(req.into_body(), state.args.max_body_bytes).await?;
            body.refresh_token
        }
    };

    let pair = state.accounts.refresh(token.as_deref()).await?;
    let cookies = state.cookies.session(&pair);
    Ok(with_cookies(
        success(StatusCode::OK, &pair, "Access token refreshed"),
        cookies,
    ))
}

async fn handle_change_password<B>(req: Request<B>, state: &AppState) -> Result<Response<BoxBody>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let user = state.session.authenticate(req.headers()).await?;
    let body: ChangePasswordRequest =
        parse_json_body(req.into_body(), state.args.max_body_bytes).await?;
    state.accounts.change_password(&user, body).await?;
    Ok(success(
        StatusCode::OK,
        json!({}),
        "Password changed successfully",
    ))
}

async fn handle_current_user<B>(req: Request<B>, state: &AppState) -> Result<Response<BoxBody>> {
    let user = state.session.authenticate(req.headers()).await?;
    Ok(success(StatusCode::OK, &user, "User fetched successfully"))
}

async fn handle_update_account<B>(req: Request<B>, state: &AppState) -> Result<Response<BoxBody>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let user = state.session.authenticate(req.headers()).await?;
    let body: UpdateAccountRequest =
        parse_json_body(req.into_body(), state.args.max_body_bytes).await?;
    let updated = state.accounts.update_account(&user, body).await?;
    Ok(success(
        StatusCode::OK,
        &updated,
        "Account details updated successfully",
    ))
}

async fn handle_avatar<B>(req: Request<B>, state: &AppState) -> Result<Response<BoxBody>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let user = state.session.authenticate(req.headers()).await?;
    let body: AvatarBody =
        parse_optional_json_body(req.into_body(), state.args.max_body_bytes).await?;
    let updated = state
        .accounts
        .update_profile_image(&user, ProfileImage::Avatar, body.avatar.as_ref())
        .await?;
    Ok(success(StatusCode::OK, &updated, "Avatar updated successfully"))
}

async fn handle_cover_image<B>(req: Request<B>, state: &AppState) -> Result<Response<BoxBody>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let user = state.session.authenticate(req.headers()).await?;
    let body: CoverImageBody =
        parse_optional_json_body(req.into_body(), state.args.max_body_bytes).await?;
    let updated = state
        .accounts
        .update_profile_image(&user, ProfileImage::CoverImage, body.cover_image.as_ref())
        .await?;
    Ok(success(
        StatusCode::OK,
        &updated,
        "Cover image updated successfully",
    ))
}

async fn handle_channel_profile<B>(
    req: Request<B>,
    state: &AppState,
    raw_username: &str,
) -> Result<Response<BoxBody>> {
    let viewer = state.session.authenticate(req.headers()).await?;
    let username = urlencoding::decode(raw_username)
        .map_err(|_| AppError::bad_request("username is not valid UTF-8"))?;
    let profile = state.graph.channel_profile(&viewer.id, &username).await?;
    Ok(success(
        StatusCode::OK,
        &profile,
        "User channel fetched successfully",
    ))
}

async fn handle_watch_history<B>(req: Request<B>, state: &AppState) -> Result<Response<BoxBody>> {
    let viewer = state.session.authenticate(req.headers()).await?;
    let history = state.graph.watch_history(&viewer.id).await?;
    Ok(success(
        StatusCode::OK,
        &history,
        "Watch history fetched successfully",
    ))
}

async fn handle_record_watch<B>(
    req: Request<B>,
    state: &AppState,
    video_id: &str,
) -> Result<Response<BoxBody>> {
    let viewer = state.session.authenticate(req.headers()).await?;
    state.social.record_watch(&viewer, video_id).await?;
    Ok(success(StatusCode::OK, json!({}), "Added to watch history"))
}
