//! HTTP caller for a PostgREST-compatible RPC endpoint.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::RemoteCaller;
use crate::error::RemoteError;

/// Calls `POST {base_url}/rest/v1/rpc/{function}` with the parameters as the
/// JSON body.
#[derive(Clone)]
pub struct HttpRemoteCaller {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRemoteCaller {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn function_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, function)
    }
}

#[async_trait]
impl RemoteCaller for HttpRemoteCaller {
    async fn call(&self, function: &str, params: &Map<String, Value>) -> Result<Value, RemoteError> {
        let url = self.function_url(function);
        let mut request = self.client.post(&url).json(params);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RemoteError::Server {
                status: status.as_u16(),
                message: server_message(&text),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|e| RemoteError::Server {
            status: status.as_u16(),
            message: format!("response is not JSON: {e}"),
        })
    }
}

/// Prefer the `message` field of a JSON error body, else the raw text.
fn server_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
