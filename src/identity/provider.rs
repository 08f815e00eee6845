use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{SessionError, SessionResult};

pub const LOGIN_PATH: &str = "/login";
pub const REFRESH_PATH: &str = "/refresh-token";
pub const LOGOUT_PATH: &str = "/logout";

const DEFAULT_LOGIN_FAILURE: &str = "Login failed!";

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new<S: Into<String>>(username: S, password: S) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Successful `/login` and `/refresh-token` body. Older backends name the field `jwt`.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(alias = "jwt")]
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// The three auth endpoints the guard consumes. Implementations return the raw
/// token string; decoding and storage belong to the guard.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, req: &LoginRequest) -> SessionResult<String>;
    async fn refresh(&self, token: &str) -> SessionResult<String>;
    async fn logout(&self, token: &str) -> SessionResult<()>;
}

/// reqwest-backed client for the InvenQuity REST API.
#[derive(Clone)]
pub struct HttpAuthBackend {
    client: reqwest::Client,
    base_url: Arc<str>,
}

impl HttpAuthBackend {
    pub fn new(base_url: &str) -> SessionResult<Self> {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> SessionResult<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| SessionError::config(format!("invalid API base URL '{}': {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SessionError::config(format!("API base URL must be http(s): {}", base_url)));
        }
        Ok(Self { client, base_url: Arc::from(base_url.trim_end_matches('/')) })
    }

    pub fn base_url(&self) -> &str { &self.base_url }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_token(resp: reqwest::Response, what: &str) -> SessionResult<String> {
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| SessionError::decode(format!("{} response carried no token: {}", what, e)))?;
        Ok(body.token)
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    #[tracing::instrument(skip(self, req), fields(username = %req.username))]
    async fn login(&self, req: &LoginRequest) -> SessionResult<String> {
        let resp = self
            .client
            .post(self.endpoint(LOGIN_PATH))
            .json(req)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body: ErrorBody = resp.json().await.unwrap_or_default();
            let message = body.message.filter(|m| !m.trim().is_empty()).unwrap_or_else(|| DEFAULT_LOGIN_FAILURE.to_string());
            debug!(target: "invenquity::backend", "login rejected: HTTP {}", status);
            return Err(SessionError::login_failed(message));
        }
        Self::read_token(resp, "login")
            .await
            .map_err(|e| SessionError::login_failed(e.to_string()))
    }

    #[tracing::instrument(skip_all)]
    async fn refresh(&self, token: &str) -> SessionResult<String> {
        let resp = self
            .client
            .post(self.endpoint(REFRESH_PATH))
            .bearer_auth(token)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_else(|_| "Failed to read body".to_string());
            warn!(target: "invenquity::backend", "refresh-token rejected: HTTP {}", status);
            return Err(SessionError::Rejected { status: status.as_u16(), message });
        }
        Self::read_token(resp, "refresh-token").await
    }

    #[tracing::instrument(skip_all)]
    async fn logout(&self, token: &str) -> SessionResult<()> {
        let resp = self
            .client
            .post(self.endpoint(LOGOUT_PATH))
            .bearer_auth(token)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SessionError::Rejected { status: status.as_u16(), message });
        }
        Ok(())
    }
}
