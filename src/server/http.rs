//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo; one task per connection, no shared lock
//! on the request path.

use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::{CookiePolicy, SessionGate, TokenService};
use crate::config::Args;
use crate::graph::SocialGraphResolver;
use crate::logging::AuthEventLog;
use crate::routes::{
    self, cors_preflight, error_response, with_cors, BoxBody, BoxError, SUBSCRIPTIONS_PREFIX,
    USERS_PREFIX,
};
use crate::services::{AccountService, MediaService, MediaUploader, SocialService};
use crate::store::{CredentialStore, GraphStore, MemoryStore, MongoStore};
use crate::types::AppError;

/// Store backends handed to the services
#[derive(Clone)]
pub struct StoreHandles {
    pub credentials: Arc<dyn CredentialStore>,
    pub graph: Arc<dyn GraphStore>,
    /// `mongodb` or `memory`, reported by the health endpoints
    pub backend: &'static str,
}

impl StoreHandles {
    pub fn mongo(store: MongoStore) -> Self {
        let store = Arc::new(store);
        Self {
            credentials: store.clone(),
            graph: store,
            backend: "mongodb",
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            credentials: store.clone(),
            graph: store,
            backend: "memory",
        }
    }
}

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub accounts: AccountService,
    pub social: SocialService,
    pub graph: SocialGraphResolver,
    pub session: SessionGate,
    pub cookies: CookiePolicy,
    pub stores: StoreHandles,
    pub started_at: Instant,
}

impl AppState {
    /// Wire services over the given stores. Token secrets are read from
    /// `args` here and never change afterwards.
    pub fn new(
        args: Args,
        stores: StoreHandles,
        uploader: Arc<dyn MediaUploader>,
        audit: AuthEventLog,
    ) -> Result<Self, AppError> {
        let token_config = args.token_config()?;
        let tokens = Arc::new(TokenService::new(&token_config, stores.credentials.clone()));

        let media = Arc::new(MediaService::new(
            uploader,
            args.upload_staging_dir.clone(),
        ));

        let cookies = CookiePolicy {
            secure: args.secure_cookies(),
            access_max_age: token_config.access_expiry_seconds,
            refresh_max_age: token_config.refresh_expiry_seconds,
        };

        Ok(Self {
            accounts: AccountService::new(
                stores.credentials.clone(),
                tokens.clone(),
                media,
                audit,
            ),
            social: SocialService::new(stores.credentials.clone(), stores.graph.clone()),
            graph: SocialGraphResolver::new(stores.graph.clone()),
            session: SessionGate::new(tokens, stores.credentials.clone()),
            cookies,
            stores,
            args,
            started_at: Instant::now(),
        })
    }
}

/// Accept connections until the listener fails
pub async fn run(state: Arc<AppState>) -> Result<(), AppError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("vidtube listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - dev token secrets may be in use");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_request<B>(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<B>,
) -> Result<Response<BoxBody>, hyper::Error>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    info!("[{}] {} {}", addr, req.method(), req.uri().path());
    Ok(route(state, req).await)
}

/// Dispatch one request. Every response carries CORS headers.
pub async fn route<B>(state: Arc<AppState>, req: Request<B>) -> Response<BoxBody>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let origin = state.args.cors_origin.clone();
    if req.method() == Method::OPTIONS {
        return cors_preflight(&origin);
    }

    let path = req.uri().path().to_string();
    let response = match (req.method().clone(), path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => routes::health_check(&state),

        // Readiness probe - pings the store
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            routes::readiness_check(&state).await
        }

        (Method::GET, "/version") => routes::version_info(),

        (_, p) if p.starts_with(USERS_PREFIX) => {
            routes::handle_users_request(req, &state, &path).await
        }

        (_, p) if p.starts_with(SUBSCRIPTIONS_PREFIX) => {
            routes::handle_subscriptions_request(req, &state, &path).await
        }

        _ => error_response(&AppError::not_found("Route not found")),
    };

    with_cors(response, &origin)
}
