//! # Messaging Gateway Client
//!
//! Submits one text message to the external gateway over HTTPS and classifies
//! the response. The gateway is reached through `POST <base_url><send_path>`
//! with a bearer token and a `{ "number", "message" }` JSON body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use url::Url;

use crate::config::GatewayConfig;
use crate::error::snippet;

const BODY_SNIPPET_CHARS: usize = 200;

/// Payload accepted by the gateway's send-text endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub number: String,
    pub message: String,
}

/// Result of a send that reached the gateway and produced an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Accepted { status: u16, body: String },
    Rejected { status: u16, body: String },
}

impl SendOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SendOutcome::Accepted { .. })
    }

    pub fn status(&self) -> u16 {
        match self {
            SendOutcome::Accepted { status, .. } | SendOutcome::Rejected { status, .. } => *status,
        }
    }
}

/// Faults where no usable response was obtained.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway is not configured: {0}")]
    Misconfigured(String),
    #[error("gateway request timed out after {0}ms")]
    Timeout(u64),
    #[error("gateway transport error: {0}")]
    Transport(String),
    #[error("gateway returned a malformed response (status {status}): {body}")]
    MalformedResponse { status: u16, body: String },
}

impl GatewayError {
    /// Short label used in delivery records and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Misconfigured(_) => "misconfigured",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::Transport(_) => "transport",
            GatewayError::MalformedResponse { .. } => "malformed_response",
        }
    }
}

/// Outbound messaging seam. The dispatch engine only talks to this trait.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Fails with `Misconfigured` when endpoint or credentials are missing.
    fn ensure_configured(&self) -> Result<(), GatewayError>;

    async fn send_text(&self, message: &OutboundMessage) -> Result<SendOutcome, GatewayError>;
}

/// reqwest-backed gateway client. The HTTP client is built once and reused.
pub struct HttpGateway {
    client: Client,
    endpoint: Result<Url, String>,
    api_token: Option<String>,
    timeout_ms: u64,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| GatewayError::Transport(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            endpoint: build_endpoint(config),
            api_token: config
                .api_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
            timeout_ms: config.timeout_ms,
        })
    }

    /// Resolved send endpoint, when the base URL is usable.
    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref().ok()
    }

    fn credentials(&self) -> Result<(&Url, &str), GatewayError> {
        let endpoint = self
            .endpoint
            .as_ref()
            .map_err(|reason| GatewayError::Misconfigured(reason.clone()))?;
        let token = self
            .api_token
            .as_deref()
            .ok_or_else(|| GatewayError::Misconfigured("API token is missing".to_string()))?;
        Ok((endpoint, token))
    }

    fn classify_send_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.timeout_ms)
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl MessageGateway for HttpGateway {
    fn ensure_configured(&self) -> Result<(), GatewayError> {
        self.credentials().map(|_| ())
    }

    async fn send_text(&self, message: &OutboundMessage) -> Result<SendOutcome, GatewayError> {
        let (endpoint, token) = self.credentials()?;

        let response = self
            .client
            .post(endpoint.clone())
            .bearer_auth(token)
            .json(message)
            .send()
            .await
            .map_err(|err| self.classify_send_error(err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| self.classify_send_error(err))?;

        let outcome = classify_response(status, body)?;
        tracing::debug!(
            status = outcome.status(),
            accepted = outcome.is_accepted(),
            "Gateway responded"
        );
        Ok(outcome)
    }
}

fn build_endpoint(config: &GatewayConfig) -> Result<Url, String> {
    let base = config
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| "base URL is missing".to_string())?;

    let path = config.send_path.trim();
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );

    Url::parse(&joined).map_err(|err| format!("invalid base URL '{base}': {err}"))
}

/// Map an HTTP response to an outcome.
///
/// 2xx is accepted unless the JSON body says `"success": false`. An empty 2xx
/// body is accepted; a non-empty one that is not JSON is malformed.
fn classify_response(status: StatusCode, body: String) -> Result<SendOutcome, GatewayError> {
    let code = status.as_u16();
    let body_snippet = snippet(&body, BODY_SNIPPET_CHARS);

    if !status.is_success() {
        return Ok(SendOutcome::Rejected {
            status: code,
            body: body_snippet,
        });
    }

    if body.trim().is_empty() {
        return Ok(SendOutcome::Accepted {
            status: code,
            body: body_snippet,
        });
    }

    let parsed: JsonValue =
        serde_json::from_str(&body).map_err(|_| GatewayError::MalformedResponse {
            status: code,
            body: body_snippet.clone(),
        })?;

    if parsed.get("success").and_then(JsonValue::as_bool) == Some(false) {
        Ok(SendOutcome::Rejected {
            status: code,
            body: body_snippet,
        })
    } else {
        Ok(SendOutcome::Accepted {
            status: code,
            body: body_snippet,
        })
    }
}
