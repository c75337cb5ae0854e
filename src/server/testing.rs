//! In-memory server harness shared by route tests

use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use hyper::{Request, Response};
use tempfile::TempDir;

use super::{route, AppState, StoreHandles};
use crate::config::Args;
use crate::logging::AuthEventLog;
use crate::routes::BoxBody;
use crate::services::media::testing::FakeUploader;
use crate::store::MemoryStore;

pub struct Harness {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub uploader: Arc<FakeUploader>,
    _staging: TempDir,
}

pub fn memory_state() -> Harness {
    let staging = TempDir::new().unwrap();
    let args = Args::parse_from([
        "vidtube",
        "--dev-mode",
        "--cookie-secure",
        "false",
        "--upload-staging-dir",
        staging.path().to_str().unwrap(),
    ]);
    let store = Arc::new(MemoryStore::new());
    let uploader = Arc::new(FakeUploader::default());
    let state = AppState::new(
        args,
        StoreHandles::memory(store.clone()),
        uploader.clone(),
        AuthEventLog::new(),
    )
    .unwrap();

    Harness {
        state: Arc::new(state),
        store,
        uploader,
        _staging: staging,
    }
}

/// Send one request; `cookie` is a `name=value` pair
pub async fn call(
    state: &Arc<AppState>,
    method: &str,
    path: &str,
    cookie: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response<BoxBody> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Bytes::from(json.to_string())
        }
        None => Bytes::new(),
    };
    route(state.clone(), builder.body(Full::new(body)).unwrap()).await
}

pub async fn body_json(response: Response<BoxBody>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// The `name=value` part of a non-empty `Set-Cookie` for `name`
pub fn cookie_pair(response: &Response<BoxBody>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&format!("{name}=")) && pair.len() > name.len() + 1)
        .map(str::to_string)
}
