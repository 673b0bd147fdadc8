//! Bearer-authenticated JSON REST client shared by the Jira and Confluence clients.

use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;

/// Failures talking to an upstream system.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("Invalid base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unreadable response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// One upstream system, one credential. Built per request and dropped with it.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl RestClient {
    pub fn new(http: Client, base_url: &str, token: &str) -> ClientResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "not a hierarchical URL".to_string(),
            });
        }
        Ok(Self {
            http,
            base_url,
            token: token.to_string(),
        })
    }

    /// Base URL with `segments` appended, each percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn get(&self, segments: &[&str], query: &[(&str, String)]) -> ClientResult<Value> {
        let request = self.http.get(self.endpoint(segments)).query(query);
        self.send(request).await
    }

    pub async fn post(&self, segments: &[&str], body: &Value) -> ClientResult<Value> {
        let request = self.http.post(self.endpoint(segments)).json(body);
        self.send(request).await
    }

    pub async fn put(&self, segments: &[&str], body: &Value) -> ClientResult<Value> {
        let request = self.http.put(self.endpoint(segments)).json(body);
        self.send(request).await
    }

    pub async fn delete(&self, segments: &[&str]) -> ClientResult<Value> {
        let request = self.http.delete(self.endpoint(segments));
        self.send(request).await
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Value> {
        let response = request
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!("Upstream returned {status}");
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}
