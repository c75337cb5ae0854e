//! vidtube - video platform API server

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use vidtube::{
    config::Args,
    db::{redact_uri, MongoClient},
    logging::{self, AuthEventLog},
    server::{self, AppState, StoreHandles},
    services::{HttpMediaUploader, MediaUploader, UnconfiguredUploader},
    store::{MemoryStore, MongoStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    logging::init(&args.log_level, &args.log_format);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  vidtube - video platform API");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} (db '{}')", redact_uri(&args.mongodb_uri), args.mongodb_db);
    info!(
        "Token lifetimes: access {}s, refresh {}s",
        args.access_token_expiry_seconds, args.refresh_token_expiry_seconds
    );
    info!(
        "Media storage: {}",
        args.storage_url.as_deref().unwrap_or("(not configured)")
    );
    info!("======================================");

    // Connect to MongoDB (in-memory fallback in dev mode)
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db, args.store_timeout())
        .await
    {
        Ok(client) => Some(client),
        Err(e) if args.dev_mode => {
            warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
            None
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let stores = match &mongo {
        Some(client) => StoreHandles::mongo(MongoStore::new(client.clone()).await?),
        None => StoreHandles::memory(Arc::new(MemoryStore::new())),
    };

    let uploader: Arc<dyn MediaUploader> = match &args.storage_url {
        Some(url) => Arc::new(HttpMediaUploader::new(url, args.store_timeout())?),
        None => {
            warn!("STORAGE_URL not set - media uploads will be rejected");
            Arc::new(UnconfiguredUploader)
        }
    };

    let audit = AuthEventLog::new();
    if let Some(path) = &args.audit_log_path {
        if let Err(e) = audit.init_file(path.clone()).await {
            warn!("Failed to open audit log {}: {}", path.display(), e);
        }
    }

    let state = Arc::new(AppState::new(args, stores, uploader, audit)?);

    tokio::select! {
        result = server::run(state) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    if let Some(client) = mongo {
        client.shutdown().await;
    }

    info!("vidtube stopped");
    Ok(())
}
