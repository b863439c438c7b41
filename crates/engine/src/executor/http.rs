//! HTTP action executor.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` to avoid
//! blocking the async runtime. Each action maps to one request, see
//! [`crate::route::route_for`].

use async_trait::async_trait;
use remedy_interchange::ActionSpec;
use serde_json::Value;

use super::{ActionError, ActionExecutor, ActionOutcome};
use crate::route::{request_body, route_for};

/// Executor that applies actions through a REST API.
///
/// - `base_url` is the API root, e.g. `https://api.example.com/v1`
/// - `auth_token` is sent as a bearer token when present
/// - every request carries an `Idempotency-Key` of `<entity>:<action id>`
///
/// 5xx, 429 and transport errors are retryable; other 4xx are fatal.
pub struct HttpExecutor {
    base_url: String,
    auth_token: Option<String>,
    agent: ureq::Agent,
}

impl HttpExecutor {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Self {
        HttpExecutor {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn classify(err: ureq::Error) -> ActionError {
    match err {
        ureq::Error::StatusCode(code) if code == 429 || code >= 500 => {
            ActionError::Retryable(format!("HTTP {}", code))
        }
        ureq::Error::StatusCode(code) => ActionError::Fatal(format!("HTTP {}", code)),
        other => ActionError::Retryable(other.to_string()),
    }
}

fn with_headers<B>(
    request: ureq::RequestBuilder<B>,
    token: Option<&str>,
    idempotency_key: &str,
) -> ureq::RequestBuilder<B> {
    let request = request.header("Idempotency-Key", idempotency_key);
    match token {
        Some(token) => request.header("Authorization", &format!("Bearer {}", token)),
        None => request,
    }
}

#[async_trait]
impl ActionExecutor for HttpExecutor {
    async fn execute_action(&self, action: &ActionSpec) -> Result<ActionOutcome, ActionError> {
        let route = route_for(action);
        let url = format!("{}{}", self.base_url, route.path);
        let body = request_body(action);
        let key = format!("{}:{}", action.target.entity_id, action.id);
        let token = self.auth_token.clone();
        let agent = self.agent.clone();

        tracing::debug!(action = %action.id, method = route.method, %url, "sending request");

        tokio::task::spawn_blocking(move || {
            let token = token.as_deref();
            let response = match (route.method, body) {
                ("DELETE", _) => with_headers(agent.delete(&url), token, &key).call(),
                ("PATCH", Some(body)) => with_headers(agent.patch(&url), token, &key).send_json(body),
                ("PATCH", None) => with_headers(agent.patch(&url), token, &key).send_empty(),
                (_, Some(body)) => with_headers(agent.post(&url), token, &key).send_json(body),
                (_, None) => with_headers(agent.post(&url), token, &key).send_empty(),
            }
            .map_err(classify)?;

            let text = response
                .into_body()
                .read_to_string()
                .map_err(|e| ActionError::Retryable(format!("failed to read response: {}", e)))?;
            let detail = if text.trim().is_empty() {
                None
            } else {
                Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
            };
            Ok(ActionOutcome { detail })
        })
        .await
        .map_err(|e| ActionError::Retryable(format!("task join error: {}", e)))?
    }
}
