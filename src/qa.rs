use reqwest::StatusCode;
use serde_json::json;
use tracing::debug;

use crate::api_client::{server_error_message, ApiClient};
use crate::config::DEFAULT_SAFETY_INSTRUCTIONS;
use crate::error::{Error, Result};

/// Follow-up question client over the generated lecture content.
///
/// One exchange is live at a time; issuing a second `ask` while one is
/// pending is the caller's responsibility to prevent.
pub struct QaClient {
    api: ApiClient,
}

impl QaClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Asks a question about the generated content. A blank question fails
    /// locally with `EmptyQuestion`; no request is sent.
    pub async fn ask(&self, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::EmptyQuestion);
        }

        debug!(question, "asking");
        let response = self
            .api
            .post_json("/ask", &json!({ "question": question }))
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::SessionExpired);
        }
        if !response.status().is_success() {
            return Err(Error::AnswerError(server_error_message(response).await));
        }

        let body: serde_json::Value = response.json().await?;
        body.get("answer")
            .and_then(|a| a.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::ProtocolViolation("response carried no answer".to_string()))
    }
}

/// Q&A tuning parameters. The threshold bounds come from the backend and are
/// enforced locally before a save request is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct QaSettings {
    pub threshold: f64,
    pub safety_instructions: String,
}

impl QaSettings {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            safety_instructions: DEFAULT_SAFETY_INSTRUCTIONS.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.01..=0.10).contains(&self.threshold) {
            return Err(Error::SettingsRejected(
                "Threshold must be between 0.01 and 0.10".to_string(),
            ));
        }
        Ok(())
    }
}

/// Committed/draft settings sync.
///
/// `committed` is the last value the backend acknowledged. `save` validates
/// the draft, sends a single request, and promotes the draft atomically from
/// the caller's perspective: on any failure the committed copy is untouched.
pub struct SettingsStore {
    api: ApiClient,
    committed: QaSettings,
}

impl SettingsStore {
    pub fn new(api: ApiClient, initial: QaSettings) -> Self {
        Self {
            api,
            committed: initial,
        }
    }

    pub fn committed(&self) -> &QaSettings {
        &self.committed
    }

    pub async fn save(&mut self, draft: QaSettings) -> Result<()> {
        draft.validate()?;

        let response = self
            .api
            .post_json(
                "/update_qa_settings",
                &json!({
                    "threshold": draft.threshold,
                    "safety_instructions": draft.safety_instructions,
                }),
            )
            .await?;

        if !response.status().is_success() {
            return Err(Error::SettingsRejected(
                server_error_message(response).await,
            ));
        }
        self.committed = draft;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> ApiClient {
        // Never contacted by these tests: every path under test fails
        // local validation before a request is built.
        ApiClient::new("http://localhost:1/api").unwrap()
    }

    #[tokio::test]
    async fn empty_question_fails_locally() {
        let qa = QaClient::new(api());
        assert!(matches!(qa.ask("").await, Err(Error::EmptyQuestion)));
        assert!(matches!(qa.ask("   ").await, Err(Error::EmptyQuestion)));
    }

    #[test]
    fn threshold_bounds_are_enforced() {
        assert!(QaSettings::new(0.04).validate().is_ok());
        assert!(QaSettings::new(0.01).validate().is_ok());
        assert!(QaSettings::new(0.10).validate().is_ok());
        assert!(matches!(
            QaSettings::new(0.2).validate(),
            Err(Error::SettingsRejected(_))
        ));
        assert!(matches!(
            QaSettings::new(0.001).validate(),
            Err(Error::SettingsRejected(_))
        ));
    }

    #[tokio::test]
    async fn rejected_draft_leaves_committed_unchanged() {
        let mut store = SettingsStore::new(api(), QaSettings::new(0.04));
        let err = store.save(QaSettings::new(0.2)).await.unwrap_err();
        assert!(matches!(err, Error::SettingsRejected(_)));
        assert_eq!(store.committed().threshold, 0.04);
    }
}
