//! REST client for the WhatsApp gateway.
//!
//! # Endpoints
//!
//! | Operation            | Request                                   | Success body                       |
//! |----------------------|-------------------------------------------|------------------------------------|
//! | `create_session`     | `POST   {base}/whatsapp/sessions`         | `{"sessionId": "..", "qrCode": ".."}` |
//! | `session_status`     | `GET    {base}/whatsapp/sessions/{id}/status` | `{"connected": true}`          |
//! | `disconnect_session` | `DELETE {base}/whatsapp/sessions/{id}`    | any 2xx                            |
//!
//! Non-2xx responses become [`GatewayError::Status`].  The message is taken
//! from a JSON `message` or `error` field when the gateway sends one, and
//! from the raw body otherwise.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use wa_pairing_core::{
    CreatedSession, GatewayError, PairingGateway, PairingImage, SessionId, SessionStatus,
};

use crate::infrastructure::storage::config::GatewayConfig;

/// Errors building an [`HttpGateway`].
#[derive(Debug, Error)]
pub enum HttpGatewayError {
    #[error("invalid gateway base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    session_id: String,
    qr_code: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    connected: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// [`PairingGateway`] over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpGateway {
    /// Builds a gateway client from the `[gateway]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`HttpGatewayError::InvalidBaseUrl`] if `base_url` is not an
    /// absolute http(s) URL, or [`HttpGatewayError::Client`] if the TLS
    /// backend fails to initialise.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, HttpGatewayError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Self::with_client(client, &config.base_url, config.api_token.clone())
    }

    /// Builds a gateway client around an existing `reqwest::Client`.
    pub fn with_client(
        client: Client,
        base_url: &str,
        api_token: Option<String>,
    ) -> Result<Self, HttpGatewayError> {
        let invalid = |reason: String| HttpGatewayError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };
        let parsed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(invalid("expected an http:// or https:// URL".to_string()));
        }

        Ok(Self {
            client,
            base_url: parsed,
            api_token,
        })
    }

    /// Appends `segments` to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Infallible: `with_client` rejects cannot-be-a-base URLs.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends `request` and turns transport failures and non-2xx statuses into
    /// [`GatewayError`]s.
    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Status {
            status: status.as_u16(),
            message: error_message(&body, status.canonical_reason()),
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

/// Picks the most useful human-readable message out of an error body.
fn error_message(body: &str, reason: Option<&str>) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .message
        .or(parsed.error)
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .or_else(|| reason.map(str::to_string))
        .unwrap_or_else(|| "no details".to_string())
}

#[async_trait]
impl PairingGateway for HttpGateway {
    async fn create_session(&self) -> Result<CreatedSession, GatewayError> {
        let url = self.endpoint(&["whatsapp", "sessions"]);
        debug!(%url, "creating pairing session");
        let body: CreateSessionResponse = self.send_json(self.client.post(url)).await?;

        if body.session_id.is_empty() {
            return Err(GatewayError::InvalidResponse("empty sessionId".to_string()));
        }
        Ok(CreatedSession {
            session_id: SessionId::new(body.session_id),
            pairing_image: PairingImage::new(body.qr_code),
        })
    }

    async fn session_status(&self, session_id: &SessionId) -> Result<SessionStatus, GatewayError> {
        let url = self.endpoint(&["whatsapp", "sessions", session_id.as_str(), "status"]);
        let body: StatusResponse = self.send_json(self.client.get(url)).await?;
        Ok(SessionStatus {
            connected: body.connected,
        })
    }

    async fn disconnect_session(&self, session_id: &SessionId) -> Result<(), GatewayError> {
        let url = self.endpoint(&["whatsapp", "sessions", session_id.as_str()]);
        debug!(%url, "disconnecting session");
        self.send(self.client.delete(url)).await?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
