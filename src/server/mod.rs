//! HTTP server for vidtube

pub mod http;

#[cfg(test)]
pub(crate) mod testing;

pub use http::{route, run, AppState, StoreHandles};
