use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::SinkError;

const RESUME_PATH: &str = "/api/resume";

/// Destination of debounced saves.
#[async_trait]
pub trait SaveSink<T: Sync>: Send + Sync {
    async fn save(&self, state: &T) -> Result<(), SinkError>;
}

#[derive(Deserialize)]
struct ResumeEnvelope<T> {
    resume: Option<T>,
}

/// Thin client for the resume endpoints, authenticated with the session JWT.
///
/// Clones share the token, so the editor can keep one handle to refresh the
/// JWT while another is owned by the [`Debouncer`](crate::Debouncer).
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Arc<RwLock<String>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, SinkError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(15)).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(token.into())),
        })
    }

    /// Replaces the session token after the identity provider refreshes it.
    /// Every clone of this client uses the new token from its next request.
    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = token.into();
    }

    async fn bearer(&self) -> String {
        self.token.read().await.clone()
    }

    fn url(&self) -> String {
        format!("{}{RESUME_PATH}", self.base_url)
    }

    /// Loads the stored resume; `None` before the first save.
    pub async fn load<T: DeserializeOwned>(&self) -> Result<Option<T>, SinkError> {
        let response = self
            .client
            .get(self.url())
            .bearer_auth(self.bearer().await)
            .send()
            .await?;
        let response = check_status(response).await?;
        let envelope: ResumeEnvelope<T> = response.json().await?;
        Ok(envelope.resume)
    }
}

#[async_trait]
impl<T: Serialize + Sync> SaveSink<T> for ApiClient {
    async fn save(&self, state: &T) -> Result<(), SinkError> {
        let response = self
            .client
            .post(self.url())
            .bearer_auth(self.bearer().await)
            .json(state)
            .send()
            .await?;
        check_status(response).await?;
        debug!("Resume saved to {}", self.base_url);
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SinkError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn header_value(head: &str, name: &str) -> Option<String> {
        head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }

    /// Answers `count` requests with `{"resume": null}` and returns the
    /// `Authorization` header each one carried.
    async fn record_auth_headers(count: usize) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..count {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                let head_len = loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    assert!(n > 0, "connection closed before the request head");
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                };
                let head = String::from_utf8_lossy(&buf[..head_len]).to_string();
                let body_len = header_value(&head, "content-length")
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(0);
                while buf.len() < head_len + body_len {
                    let n = socket.read(&mut chunk).await.unwrap();
                    assert!(n > 0, "connection closed before the request body");
                    buf.extend_from_slice(&chunk[..n]);
                }
                seen.push(header_value(&head, "authorization").unwrap_or_default());

                let body = r#"{"resume":null}"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
            }
            seen
        });
        (base_url, server)
    }

    #[tokio::test]
    async fn test_refreshed_token_used_by_next_save() {
        let (base_url, server) = record_auth_headers(3).await;
        let editor = ApiClient::new(base_url, "jwt-1").unwrap();
        let sink = editor.clone();

        sink.save(&json!({ "personal": {} })).await.unwrap();
        editor.set_token("jwt-2").await;
        sink.save(&json!({ "personal": {} })).await.unwrap();
        let loaded: Option<serde_json::Value> = sink.load().await.unwrap();

        assert!(loaded.is_none());
        assert_eq!(
            server.await.unwrap(),
            vec!["Bearer jwt-1", "Bearer jwt-2", "Bearer jwt-2"]
        );
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("https://resume.example.com/", "jwt").unwrap();
        assert_eq!(client.url(), "https://resume.example.com/api/resume");
    }

    #[test]
    fn test_envelope_null_resume() {
        let envelope: ResumeEnvelope<serde_json::Value> =
            serde_json::from_str(r#"{"resume": null}"#).unwrap();
        assert!(envelope.resume.is_none());
    }
}
