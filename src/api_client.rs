use std::time::Duration;

use reqwest::{Client, Response};
use serde::Serialize;

use crate::error::Result;

/// HTTP client for the video-generation backend.
///
/// The backend identifies callers by a session cookie, so the client keeps a
/// cookie store and every request carries it. Bodies are JSON except for the
/// multipart upload, which must leave the content type to reqwest so the
/// boundary header is set correctly.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET request; an optional per-request timeout bounds the whole
    /// round-trip (used by session bootstrap).
    pub async fn get(&self, path: &str, timeout: Option<Duration>) -> Result<Response> {
        let mut request = self.client.get(self.build_url(path));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        Ok(request.send().await?)
    }

    /// POST with a JSON body.
    pub async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<Response> {
        let request = self.client.post(self.build_url(path)).json(body);
        Ok(request.send().await?)
    }

    /// POST without a body (e.g. `/clear_session`).
    pub async fn post_empty(&self, path: &str) -> Result<Response> {
        Ok(self.client.post(self.build_url(path)).send().await?)
    }

    /// POST a multipart form. No JSON content-type header; reqwest sets the
    /// multipart boundary itself.
    pub async fn post_multipart(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<Response> {
        let request = self.client.post(self.build_url(path)).multipart(form);
        Ok(request.send().await?)
    }

    /// Raw client for streaming requests (progress channel, video download).
    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Extracts the server-reported error message from a failed response:
/// `{"error": "..."}` when the body parses, otherwise a generic status line.
pub async fn server_error_message(response: Response) -> String {
    let status = response.status();
    match response.json::<serde_json::Value>().await {
        Ok(body) => body
            .get("error")
            .and_then(|e| e.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("Request failed with status {}", status)),
        Err(_) => format!("Request failed with status {}", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let api = ApiClient::new("http://localhost:8080/api/").unwrap();
        assert_eq!(api.build_url("/upload_file"), "http://localhost:8080/api/upload_file");
    }
}
