//! Session lifecycle audit trail
//!
//! Every login, logout, refresh and rejected refresh is emitted as a tracing
//! event on the `vidtube::audit` target and, when a path is configured,
//! appended to a JSONL file. Events never carry tokens or passwords.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Audit event types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthEventKind {
    Registered,
    LoginSucceeded,
    LoginFailed,
    LoggedOut,
    Refreshed,
    RefreshRejected,
    PasswordChanged,
}

/// One audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: AuthEventKind,
    /// Identity id (hex), when known
    pub user_id: Option<String>,
    /// Short machine-readable cause for failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuthEvent {
    pub fn new(kind: AuthEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            user_id: None,
            reason: None,
        }
    }

    pub fn with_user(mut self, user_id: impl ToString) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    /// Convert to JSONL line
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Audit sink shared by the account service
#[derive(Clone, Default)]
pub struct AuthEventLog {
    inner: Arc<Mutex<Option<BufWriter<File>>>>,
}

impl AuthEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append events to `path`
    pub async fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        *self.inner.lock().await = Some(BufWriter::new(file));

        info!("Audit logging initialized to {}", path.display());
        Ok(())
    }

    pub async fn log(&self, event: AuthEvent) {
        info!(
            target: "vidtube::audit",
            kind = ?event.kind,
            user_id = event.user_id.as_deref().unwrap_or("-"),
            reason = event.reason.as_deref().unwrap_or("-"),
            "auth event"
        );

        let mut inner = self.inner.lock().await;
        let Some(writer) = inner.as_mut() else {
            return;
        };

        let jsonl = match event.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };
        if let Err(e) = writeln!(writer, "{}", jsonl) {
            error!("Failed to write audit event: {}", e);
        }
        if let Err(e) = writer.flush() {
            error!("Failed to flush audit log: {}", e);
        }
    }
}
