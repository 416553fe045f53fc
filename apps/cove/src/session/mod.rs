use crate::auth::IdentityCookies;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const REFRESH_PATH: &str = "api/refresh";
const SIGNUP_PATH: &str = "api/signup";
const LOGIN_PATH: &str = "api/login";
const CHANNEL_PATH: &str = "api/chat";

#[derive(Clone, Debug)]
pub struct SessionConfig {
    base_url: Url,
}

impl SessionConfig {
    pub fn new(server_base_url: impl AsRef<str>) -> Result<Self, SessionError> {
        let mut base = server_base_url.as_ref().trim().to_string();
        if base.is_empty() {
            return Err(SessionError::InvalidConfig(
                "chat server base url cannot be empty".into(),
            ));
        }
        if !base.contains("://") {
            let inferred_scheme = infer_scheme(&base);
            base = format!("{inferred_scheme}{base}");
        }
        let parsed = Url::parse(&base)
            .map_err(|err| SessionError::InvalidConfig(format!("invalid chat server url: {err}")))?;
        Ok(Self { base_url: parsed })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn refresh_url(&self) -> Result<Url, SessionError> {
        self.join(REFRESH_PATH)
    }

    pub fn signup_url(&self) -> Result<Url, SessionError> {
        self.join(SIGNUP_PATH)
    }

    pub fn login_url(&self) -> Result<Url, SessionError> {
        self.join(LOGIN_PATH)
    }

    /// The realtime channel endpoint: the chat path with the scheme flipped
    /// to its websocket counterpart.
    pub fn channel_url(&self) -> Result<Url, SessionError> {
        let mut url = self.join(CHANNEL_PATH)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|_| {
            SessionError::InvalidConfig(format!(
                "cannot derive a websocket url from {}",
                self.base_url
            ))
        })?;
        Ok(url)
    }

    fn join(&self, path: &str) -> Result<Url, SessionError> {
        self.base_url
            .join(path)
            .map_err(|err| SessionError::InvalidConfig(format!("invalid {path} endpoint: {err}")))
    }
}

fn infer_scheme(base: &str) -> &'static str {
    let host = base
        .split('/')
        .next()
        .unwrap_or(base)
        .trim_start_matches('[')
        .split(']')
        .next()
        .unwrap_or(base)
        .to_ascii_lowercase();
    let rfc1918_172 = host
        .strip_prefix("172.")
        .and_then(|rest| rest.split('.').next())
        .and_then(|octet| octet.parse::<u8>().ok())
        .map(|octet| (16..32).contains(&octet))
        .unwrap_or(false);
    if host.starts_with("localhost")
        || host == "0.0.0.0"
        || host.starts_with("127.")
        || host == "::1"
        || host.starts_with("10.")
        || host.starts_with("192.168.")
        || rfc1918_172
    {
        "http://"
    } else {
        "https://"
    }
}

/// Where the activation's session handshake stands. `Denied` and `Failed`
/// are terminal for the activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unknown,
    Refreshing,
    Established,
    Denied,
    Failed,
}

impl SessionState {
    pub fn from_outcome(outcome: &SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Established { .. } => SessionState::Established,
            SessionOutcome::Denied => SessionState::Denied,
            SessionOutcome::Failed(_) => SessionState::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The session is usable. `renewed` carries the identity cookies from a
    /// refresh round-trip, and is `None` on the optimistic fast path.
    Established { renewed: Option<IdentityCookies> },
    Denied,
    Failed(FailureReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    ServerFault,
    /// Network failures and any status the refresh contract does not name.
    Transport,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected http status {0}")]
    HttpStatus(StatusCode),
    #[error("server rejected request: {0}")]
    Server(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid username: {0}")]
    InvalidUsername(&'static str),
    #[error("invalid password: {0}")]
    InvalidPassword(&'static str),
}

impl From<reqwest::Error> for SessionError {
    fn from(value: reqwest::Error) -> Self {
        SessionError::Network(value.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// What a refresh round-trip produced: the status the server answered with
/// and whatever identity cookies rode along. No body is consumed.
#[derive(Debug, Clone)]
pub struct RefreshExchange {
    pub status: StatusCode,
    pub cookies: IdentityCookies,
}

#[derive(Debug, Clone)]
pub struct CredentialsExchange {
    pub status: StatusCode,
    pub error: Option<String>,
    pub cookies: IdentityCookies,
}

#[async_trait]
trait SessionBackend: Send + Sync {
    async fn refresh_session(
        &self,
        endpoint: &Url,
        refresh_token: Option<&str>,
    ) -> Result<RefreshExchange, SessionError>;

    async fn submit_credentials(
        &self,
        endpoint: &Url,
        request: &CredentialsRequest,
    ) -> Result<CredentialsExchange, SessionError>;
}

struct ReqwestSessionBackend {
    client: reqwest::Client,
}

impl ReqwestSessionBackend {
    fn new() -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(8))
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SessionBackend for ReqwestSessionBackend {
    async fn refresh_session(
        &self,
        endpoint: &Url,
        refresh_token: Option<&str>,
    ) -> Result<RefreshExchange, SessionError> {
        let mut builder = self.client.post(endpoint.clone());
        if let Some(token) = refresh_token {
            builder = builder.header(header::COOKIE, format!("refreshToken={token}"));
        }
        let response = builder.send().await?;
        Ok(RefreshExchange {
            status: response.status(),
            cookies: collect_identity_cookies(response.headers()),
        })
    }

    async fn submit_credentials(
        &self,
        endpoint: &Url,
        request: &CredentialsRequest,
    ) -> Result<CredentialsExchange, SessionError> {
        let response = self.client.post(endpoint.clone()).json(request).send().await?;
        let status = response.status();
        let cookies = collect_identity_cookies(response.headers());
        let error = if status.is_success() {
            None
        } else {
            response
                .json::<ErrorResponse>()
                .await
                .ok()
                .map(|body| body.error)
        };
        Ok(CredentialsExchange {
            status,
            error,
            cookies,
        })
    }
}

fn collect_identity_cookies(headers: &HeaderMap) -> IdentityCookies {
    let mut cookies = IdentityCookies::default();
    for value in headers.get_all(header::SET_COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        let Some((name, rest)) = raw.split_once('=') else {
            continue;
        };
        let value = rest.split(';').next().unwrap_or("").trim().to_string();
        match name.trim() {
            "username" => cookies.username = Some(value),
            "accessToken" => cookies.access_token = Some(value),
            "refreshToken" => cookies.refresh_token = Some(value),
            _ => {}
        }
    }
    cookies
}

#[derive(Clone)]
pub struct SessionManager {
    config: Arc<SessionConfig>,
    backend: Arc<dyn SessionBackend>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        let backend = Arc::new(ReqwestSessionBackend::new()?);
        Ok(Self {
            config: Arc::new(config),
            backend,
        })
    }

    #[cfg(test)]
    fn with_backend(config: SessionConfig, backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The activation handshake. A present identity marker is trusted
    /// optimistically and no refresh request is issued; otherwise exactly
    /// one refresh round-trip decides the outcome.
    pub async fn establish(
        &self,
        identity: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<SessionOutcome, SessionError> {
        if let Some(name) = identity {
            debug!(
                target: "cove::session",
                identity = %name,
                "identity marker present; skipping session refresh"
            );
            return Ok(SessionOutcome::Established { renewed: None });
        }
        debug!(target: "cove::session", state = ?SessionState::Refreshing, "no identity marker");
        self.refresh(refresh_token).await
    }

    /// One refresh round-trip against `api/refresh`. Status mapping: 2xx is
    /// established, 401 is denied, 500 is a server fault, and anything
    /// else (including a transport failure) is a generic failure. Never
    /// retried.
    pub async fn refresh(
        &self,
        refresh_token: Option<&str>,
    ) -> Result<SessionOutcome, SessionError> {
        let endpoint = self.config.refresh_url()?;
        let exchange = match self.backend.refresh_session(&endpoint, refresh_token).await {
            Ok(exchange) => exchange,
            Err(SessionError::Network(reason)) => {
                warn!(target: "cove::session", error = %reason, "session refresh transport failure");
                return Ok(SessionOutcome::Failed(FailureReason::Transport));
            }
            Err(err) => return Err(err),
        };

        let outcome = if exchange.status.is_success() {
            SessionOutcome::Established {
                renewed: Some(exchange.cookies),
            }
        } else if exchange.status == StatusCode::UNAUTHORIZED {
            SessionOutcome::Denied
        } else if exchange.status == StatusCode::INTERNAL_SERVER_ERROR {
            SessionOutcome::Failed(FailureReason::ServerFault)
        } else {
            warn!(
                target: "cove::session",
                status = %exchange.status,
                "unexpected session refresh status"
            );
            SessionOutcome::Failed(FailureReason::Transport)
        };
        debug!(
            target: "cove::session",
            state = ?SessionState::from_outcome(&outcome),
            "session refresh settled"
        );
        Ok(outcome)
    }

    pub async fn signup(
        &self,
        username: &str,
        password: &str,
    ) -> Result<IdentityCookies, SessionError> {
        let endpoint = self.config.signup_url()?;
        self.submit_account(endpoint, username, password).await
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<IdentityCookies, SessionError> {
        let endpoint = self.config.login_url()?;
        self.submit_account(endpoint, username, password).await
    }

    async fn submit_account(
        &self,
        endpoint: Url,
        username: &str,
        password: &str,
    ) -> Result<IdentityCookies, SessionError> {
        validate_username(username).map_err(SessionError::InvalidUsername)?;
        validate_password(password).map_err(SessionError::InvalidPassword)?;

        let request = CredentialsRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let exchange = self.backend.submit_credentials(&endpoint, &request).await?;
        if exchange.status.is_success() {
            if exchange.cookies.username.is_none() {
                return Err(SessionError::InvalidResponse(
                    "account response carried no identity cookie".into(),
                ));
            }
            debug!(
                target: "cove::session",
                username = %username,
                endpoint = %endpoint,
                "account request accepted"
            );
            Ok(exchange.cookies)
        } else if let Some(message) = exchange.error {
            // The server's error string is surfaced to the user verbatim.
            Err(SessionError::Server(message))
        } else {
            Err(SessionError::HttpStatus(exchange.status))
        }
    }
}

pub fn validate_username(username: &str) -> Result<(), &'static str> {
    if username.len() < 4 {
        return Err("username must be at least 4 characters");
    }
    if username.len() > 64 {
        return Err("username must be at most 64 characters");
    }
    let mut chars = username.chars();
    let leading_alphabetic = chars
        .next()
        .map(|c| c.is_ascii_alphabetic())
        .unwrap_or(false);
    if !leading_alphabetic || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(
            "username must contain only alphabets, digits and underscore, and must start with an alphabet",
        );
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("password must be at least 8 characters");
    }
    if password.len() > 64 {
        return Err("password must be at most 64 characters");
    }
    if !password
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_!@#$%&*^.".contains(c))
    {
        return Err(
            "invalid character in password; only alphabets, digits, and _!@#$%&*^. are allowed",
        );
    }
    Ok(())
}
