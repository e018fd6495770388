//! HTTP transport for the registry RPC endpoint.
//!
//! Each call is a `POST {base_url}/rpc` carrying `{"call": .., "args": ..}`
//! with a bearer credential. Responses arrive either as plain JSON or wrapped
//! in a streamed event envelope; [`unwrap_response`] normalises both.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::client::RegistryClient;
use crate::error::RegistryError;
use crate::record::{DependentRef, PackageStatus, RegistryRecord, RegistryUpdate, StatusMatch};
use crate::RegistryResult;

/// Registry endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the registry service
    pub base_url: String,
    /// Bearer credential (supplied out of band)
    pub token: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            base_url: std::env::var("SUITE_REGISTRY_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:7400".to_string()),
            token: std::env::var("SUITE_REGISTRY_TOKEN").ok(),
            timeout_secs: std::env::var("SUITE_REGISTRY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}

impl RegistryConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific endpoint
    pub fn new(base_url: &str) -> Self {
        RegistryConfig {
            base_url: base_url.to_string(),
            token: None,
            timeout_secs: 30,
        }
    }

    /// Set the bearer credential
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

/// Registry client over HTTP
pub struct HttpRegistryClient {
    config: RegistryConfig,
    http_client: reqwest::Client,
}

impl HttpRegistryClient {
    /// Create a new client
    pub fn new(config: RegistryConfig) -> RegistryResult<Self> {
        if config.base_url.trim().is_empty() {
            return Err(RegistryError::NotConfigured("base_url is empty".to_string()));
        }
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("suite-registry/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(HttpRegistryClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> RegistryResult<Self> {
        Self::new(RegistryConfig::from_env())
    }

    fn endpoint(&self) -> String {
        format!("{}/rpc", self.config.base_url.trim_end_matches('/'))
    }

    /// Issue one call and return the unwrapped result payload.
    async fn call(&self, call: &str, args: Value) -> RegistryResult<Value> {
        debug!(call, "registry rpc");
        let mut request = self
            .http_client
            .post(self.endpoint())
            .json(&json!({ "call": call, "args": args }));
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RegistryError::Rpc {
                call: call.to_string(),
                message: format!("HTTP {}: {}", status, body.trim()),
            });
        }

        unwrap_response(call, &body)
    }

    async fn call_as<T: DeserializeOwned>(&self, call: &str, args: Value) -> RegistryResult<T> {
        let value = self.call(call, args).await?;
        serde_json::from_value(value).map_err(RegistryError::from)
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn get(&self, name: &str) -> RegistryResult<Option<RegistryRecord>> {
        self.call_as("get", json!({ "name": name })).await
    }

    async fn get_dependents(&self, name: &str) -> RegistryResult<Vec<DependentRef>> {
        let deps: Option<Vec<DependentRef>> =
            self.call_as("getDependents", json!({ "name": name })).await?;
        Ok(deps.unwrap_or_default())
    }

    async fn update(&self, name: &str, fields: &RegistryUpdate) -> RegistryResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        self.call("update", json!({ "name": name, "fields": fields }))
            .await
            .map(|_| ())
    }

    async fn query_by_status(
        &self,
        status: PackageStatus,
        limit: usize,
    ) -> RegistryResult<Vec<StatusMatch>> {
        let matches: Option<Vec<StatusMatch>> = self
            .call_as(
                "queryByStatus",
                json!({ "status": status.as_str(), "limit": limit }),
            )
            .await?;
        Ok(matches.unwrap_or_default())
    }
}

/// Normalise a registry response body into the call's result value.
///
/// Accepted shapes:
/// - plain JSON: the value itself
/// - `{"result": ..}` envelope
/// - `{"type": .., "data": ..}` event wrapper (nested wrappers are unwrapped too)
/// - a server-sent event stream of `data:` lines; the last JSON payload wins
///
/// `{"error": ..}` in any of these positions becomes [`RegistryError::Rpc`].
pub fn unwrap_response(call: &str, body: &str) -> RegistryResult<Value> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }

    let value = if is_event_stream(trimmed) {
        last_stream_payload(trimmed)?
    } else {
        serde_json::from_str::<Value>(trimmed)?
    };

    unwrap_value(call, value)
}

fn is_event_stream(body: &str) -> bool {
    body.lines()
        .map(str::trim_start)
        .any(|l| l.starts_with("data:") || l.starts_with("event:"))
}

fn last_stream_payload(body: &str) -> RegistryResult<Value> {
    let mut last = None;
    for line in body.lines() {
        let Some(data) = line.trim_start().strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }
        last = Some(serde_json::from_str::<Value>(data)?);
    }
    last.ok_or_else(|| RegistryError::Decode("event stream carried no data payload".to_string()))
}

fn unwrap_value(call: &str, mut value: Value) -> RegistryResult<Value> {
    // Bounded so a pathological self-similar envelope cannot spin forever.
    for _ in 0..8 {
        let Value::Object(map) = &value else {
            return Ok(value);
        };

        if let Some(err) = map.get("error").filter(|e| !e.is_null()) {
            let message = match err {
                Value::String(s) => s.clone(),
                Value::Object(o) => o
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string()),
                other => other.to_string(),
            };
            return Err(RegistryError::Rpc {
                call: call.to_string(),
                message,
            });
        }

        let next = if map.contains_key("result") {
            map.get("result").cloned()
        } else if map.contains_key("type") && map.contains_key("data") {
            map.get("data").cloned()
        } else {
            None
        };

        match next {
            Some(inner) => value = inner,
            None => return Ok(value),
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json_passes_through() {
        let v = unwrap_response("get", r#"{"name":"@suite/a","isPublished":false}"#).unwrap();
        assert_eq!(v["name"], "@suite/a");
    }

    #[test]
    fn test_result_envelope_is_unwrapped() {
        let v = unwrap_response("get", r#"{"result":{"name":"@suite/a"}}"#).unwrap();
        assert_eq!(v["name"], "@suite/a");
    }

    #[test]
    fn test_event_wrapper_is_unwrapped() {
        let body = r#"{"type":"result","data":{"result":[{"name":"x"}]}}"#;
        let v = unwrap_response("getDependents", body).unwrap();
        assert_eq!(v[0]["name"], "x");
    }

    #[test]
    fn test_event_stream_takes_last_payload() {
        let body = "event: progress\ndata: {\"type\":\"progress\",\"data\":1}\n\nevent: result\ndata: {\"result\":{\"name\":\"b\"}}\n\ndata: [DONE]\n";
        let v = unwrap_response("get", body).unwrap();
        assert_eq!(v["name"], "b");
    }

    #[test]
    fn test_error_field_becomes_rpc_error() {
        let err = unwrap_response("update", r#"{"error":{"message":"forbidden"}}"#).unwrap_err();
        match err {
            RegistryError::Rpc { call, message } => {
                assert_eq!(call, "update");
                assert_eq!(message, "forbidden");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_null_result_and_empty_body() {
        assert!(unwrap_response("get", r#"{"result":null}"#).unwrap().is_null());
        assert!(unwrap_response("get", "  ").unwrap().is_null());
    }

    #[test]
    fn test_stream_without_data_is_decode_error() {
        let err = unwrap_response("get", "event: ping\n\n").unwrap_err();
        assert!(matches!(err, RegistryError::Decode(_)));
    }

    #[test]
    fn test_empty_base_url_is_rejected() {
        let err = HttpRegistryClient::new(RegistryConfig::new("")).err();
        assert!(matches!(err, Some(RegistryError::NotConfigured(_))));
    }
}
