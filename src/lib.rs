//! vidtube - video platform API
//!
//! Accounts, token-based sessions, channel subscriptions and watch history
//! over MongoDB.
//!
//! ## Components
//!
//! - **Credential store**: identity records with hashed passwords and the
//!   single persisted refresh token
//! - **Token service**: access/refresh JWT issuance, verification and rotation
//! - **Session gate**: resolves the authenticated identity for a request
//! - **Social graph resolver**: channel profiles and watch history built by
//!   joining identities, subscriptions and videos

pub mod auth;
pub mod config;
pub mod db;
pub mod graph;
pub mod logging;
pub mod routes;
pub mod server;
pub mod services;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{AppError, Result};
