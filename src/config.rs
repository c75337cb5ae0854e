//! Configuration for vidtube
//!
//! CLI arguments and environment variable handling using clap.
//! Everything here is read once at startup and never mutated afterwards.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::TokenConfig;
use crate::types::AppError;

/// Secret used for both token kinds when dev mode runs without explicit secrets
const DEV_ACCESS_SECRET: &str = "dev-only-access-secret-not-for-production-use";
const DEV_REFRESH_SECRET: &str = "dev-only-refresh-secret-not-for-production-use";

/// Minimum secret length accepted outside dev mode
pub const MIN_SECRET_LEN: usize = 32;

/// vidtube - video platform API
#[derive(Parser, Debug, Clone)]
#[command(name = "vidtube")]
#[command(about = "Video platform API: accounts, sessions, subscriptions and watch history")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Enable development mode (insecure cookies, default secrets, in-memory store fallback)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "vidtube")]
    pub mongodb_db: String,

    /// Upper bound on any single store call, in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "5000")]
    pub store_timeout_ms: u64,

    /// HMAC secret for access tokens (required in production)
    #[arg(long, env = "ACCESS_TOKEN_SECRET")]
    pub access_token_secret: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TOKEN_EXPIRY_SECONDS", default_value = "86400")]
    pub access_token_expiry_seconds: u64,

    /// HMAC secret for refresh tokens (required in production, must differ from the access secret)
    #[arg(long, env = "REFRESH_TOKEN_SECRET")]
    pub refresh_token_secret: Option<String>,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "REFRESH_TOKEN_EXPIRY_SECONDS", default_value = "864000")]
    pub refresh_token_expiry_seconds: u64,

    /// Base URL of the media upload service
    /// (e.g., "http://localhost:8091")
    #[arg(long, env = "STORAGE_URL")]
    pub storage_url: Option<String>,

    /// Directory where uploaded files are staged before being forwarded
    #[arg(long, env = "UPLOAD_STAGING_DIR", default_value = "./public/temp")]
    pub upload_staging_dir: PathBuf,

    /// Maximum accepted request body in bytes (registration carries media)
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "16777216")]
    pub max_body_bytes: usize,

    /// Set the Secure attribute on auth cookies (can only be disabled in dev mode)
    #[arg(long, env = "COOKIE_SECURE", default_value = "true", action = clap::ArgAction::Set)]
    pub cookie_secure: bool,

    /// Value for Access-Control-Allow-Origin
    #[arg(long, env = "CORS_ORIGIN", default_value = "*")]
    pub cors_origin: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Append session lifecycle events as JSONL to this file
    #[arg(long, env = "AUDIT_LOG_PATH")]
    pub audit_log_path: Option<PathBuf>,
}

impl Args {
    /// Store call timeout as a Duration
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Whether auth cookies carry the Secure attribute
    pub fn secure_cookies(&self) -> bool {
        self.cookie_secure || !self.dev_mode
    }

    /// Build the token configuration (uses fixed secrets in dev mode when unset)
    pub fn token_config(&self) -> Result<TokenConfig, AppError> {
        let access_secret = match (&self.access_token_secret, self.dev_mode) {
            (Some(secret), _) => secret.clone(),
            (None, true) => DEV_ACCESS_SECRET.to_string(),
            (None, false) => {
                return Err(AppError::Config(
                    "ACCESS_TOKEN_SECRET is required in production mode".into(),
                ))
            }
        };
        let refresh_secret = match (&self.refresh_token_secret, self.dev_mode) {
            (Some(secret), _) => secret.clone(),
            (None, true) => DEV_REFRESH_SECRET.to_string(),
            (None, false) => {
                return Err(AppError::Config(
                    "REFRESH_TOKEN_SECRET is required in production mode".into(),
                ))
            }
        };

        Ok(TokenConfig {
            access_secret,
            access_expiry_seconds: self.access_token_expiry_seconds,
            refresh_secret,
            refresh_expiry_seconds: self.refresh_token_expiry_seconds,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            let access = self
                .access_token_secret
                .as_deref()
                .ok_or("ACCESS_TOKEN_SECRET is required in production mode")?;
            let refresh = self
                .refresh_token_secret
                .as_deref()
                .ok_or("REFRESH_TOKEN_SECRET is required in production mode")?;

            if access.len() < MIN_SECRET_LEN || refresh.len() < MIN_SECRET_LEN {
                return Err(format!(
                    "token secrets must be at least {MIN_SECRET_LEN} characters"
                ));
            }
            if access == refresh {
                return Err("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ".into());
            }
            if !self.cookie_secure {
                return Err("COOKIE_SECURE=false is only allowed in dev mode".into());
            }
            if self.storage_url.is_none() {
                return Err("STORAGE_URL is required in production mode".into());
            }
        }

        if self.access_token_expiry_seconds == 0 || self.refresh_token_expiry_seconds == 0 {
            return Err("token expiry must be greater than zero".into());
        }

        if self.access_token_expiry_seconds > self.refresh_token_expiry_seconds {
            return Err("access token must not outlive the refresh token".into());
        }

        if self.store_timeout_ms == 0 {
            return Err("STORE_TIMEOUT_MS must be greater than zero".into());
        }

        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(format!("LOG_FORMAT must be 'text' or 'json', got '{}'", self.log_format));
        }

        Ok(())
    }
}
