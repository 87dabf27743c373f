use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::api_client::{server_error_message, ApiClient};
use crate::error::{Error, Result};

/// Session state reported by the backend on bootstrap.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub api_key_set: bool,
    pub playht_api_key: Option<String>,
    pub playht_user_id: Option<String>,
}

/// Bootstraps and tracks the backend session.
///
/// The "session established" flag is shared with the uploader so a 401 on
/// upload can clear it and force the caller back through key setup.
pub struct SessionManager {
    api: ApiClient,
    established: Arc<AtomicBool>,
}

impl SessionManager {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            established: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared handle to the session flag.
    pub fn established(&self) -> Arc<AtomicBool> {
        self.established.clone()
    }

    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Relaxed)
    }

    /// Checks whether the backend already holds an API key for this session.
    /// Bounded: an unreachable backend degrades to a connectivity error
    /// instead of hanging.
    pub async fn check(&self, timeout: Duration) -> Result<SessionInfo> {
        let response = self
            .api
            .get("/check_session", Some(timeout))
            .await
            .map_err(|_| Error::Connectivity)?;
        if !response.status().is_success() {
            return Err(Error::Connectivity);
        }
        let info: SessionInfo = response.json().await.map_err(|_| Error::Connectivity)?;
        debug!(api_key_set = info.api_key_set, "session checked");
        self.established.store(info.api_key_set, Ordering::Relaxed);
        Ok(info)
    }

    /// Stores the OpenAI API key in the backend session.
    pub async fn setup_api_key(&self, api_key: &str) -> Result<()> {
        let response = self
            .api
            .post_json("/setup_api", &json!({ "api_key": api_key }))
            .await?;
        if !response.status().is_success() {
            return Err(Error::Validation(server_error_message(response).await));
        }
        let body: serde_json::Value = response.json().await?;
        if body.get("success").and_then(|v| v.as_bool()) != Some(true) {
            let message = body
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("Failed to set API key")
                .to_string();
            return Err(Error::Validation(message));
        }
        self.established.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Invalidates the server-side session and resets local state.
    pub async fn clear(&self) -> Result<()> {
        self.established.store(false, Ordering::Relaxed);
        let response = self.api.post_empty("/clear_session").await?;
        if !response.status().is_success() {
            return Err(Error::ProtocolViolation(
                server_error_message(response).await,
            ));
        }
        Ok(())
    }
}
