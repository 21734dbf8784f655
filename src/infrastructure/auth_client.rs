use crate::domain::models::AuthUser;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::remote_client::{
    api_endpoint, build_http_client, http_status_error, network_error, parse_base_url,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthGrant {
    pub token: String,
    pub user: AuthUser,
}

#[async_trait]
pub trait AuthHttpClient: Send + Sync {
    async fn login(&self, request: LoginRequest) -> Result<AuthGrant, InfraError>;

    async fn register(&self, request: RegisterRequest) -> Result<AuthGrant, InfraError>;

    async fn verify(&self, token: &str) -> Result<AuthUser, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestAuthClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, serde::Serialize)]
struct LoginPayload<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, serde::Serialize)]
struct RegisterPayload<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct AuthResponsePayload {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<AuthUser>,
    #[serde(default)]
    error: Option<String>,
}

impl ReqwestAuthClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InfraError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: parse_base_url(base_url)?,
        })
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::Validation(format!("{field} must not be empty")));
        }
        Ok(())
    }

    async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        segments: &[&str],
        payload: &T,
        context: &str,
    ) -> Result<AuthGrant, InfraError> {
        let url = api_endpoint(&self.base_url, segments)?;
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|error| network_error(context, error))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| network_error(context, error))?;

        parse_grant_body(status, &body, context)
    }
}

fn parse_auth_payload(
    status: StatusCode,
    body: &str,
    context: &str,
) -> Result<AuthResponsePayload, InfraError> {
    let parsed = match serde_json::from_str::<AuthResponsePayload>(body) {
        Ok(parsed) => parsed,
        Err(_) if !status.is_success() => return Err(http_status_error(status, body, context)),
        Err(error) => {
            return Err(InfraError::Transient(format!(
                "invalid {context} payload: {error}; body={body}"
            )));
        }
    };

    if !status.is_success() || !parsed.success {
        let detail = parsed
            .error
            .clone()
            .unwrap_or_else(|| format!("http {}", status.as_u16()));
        // The server answers bad credentials with a body, not always with 401.
        if status.is_success() || status.is_client_error() {
            return Err(InfraError::Auth(format!("{context} rejected: {detail}")));
        }
        return Err(InfraError::Transient(format!("{context} failed: {detail}")));
    }
    Ok(parsed)
}

pub(crate) fn parse_grant_body(
    status: StatusCode,
    body: &str,
    context: &str,
) -> Result<AuthGrant, InfraError> {
    let parsed = parse_auth_payload(status, body, context)?;
    let token = parsed
        .token
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| InfraError::Transient(format!("{context} response is missing token")))?;
    let user = parsed
        .user
        .ok_or_else(|| InfraError::Transient(format!("{context} response is missing user")))?;
    Ok(AuthGrant { token, user })
}

pub(crate) fn parse_verify_body(status: StatusCode, body: &str) -> Result<AuthUser, InfraError> {
    parse_auth_payload(status, body, "verifying session")?
        .user
        .ok_or_else(|| InfraError::Transient("verify response is missing user".to_string()))
}

#[async_trait]
impl AuthHttpClient for ReqwestAuthClient {
    async fn login(&self, request: LoginRequest) -> Result<AuthGrant, InfraError> {
        Self::ensure_non_empty(&request.username, "username")?;
        Self::ensure_non_empty(&request.password, "password")?;
        let payload = LoginPayload {
            username: request.username.trim(),
            password: &request.password,
        };
        self.post_json(&["auth", "login"], &payload, "logging in").await
    }

    async fn register(&self, request: RegisterRequest) -> Result<AuthGrant, InfraError> {
        Self::ensure_non_empty(&request.username, "username")?;
        Self::ensure_non_empty(&request.email, "email")?;
        Self::ensure_non_empty(&request.password, "password")?;
        let payload = RegisterPayload {
            username: request.username.trim(),
            email: request.email.trim(),
            password: &request.password,
        };
        self.post_json(&["auth", "register"], &payload, "registering")
            .await
    }

    async fn verify(&self, token: &str) -> Result<AuthUser, InfraError> {
        if token.trim().is_empty() {
            return Err(InfraError::Auth("bearer token must not be empty".to_string()));
        }
        let url = api_endpoint(&self.base_url, &["auth", "verify"])?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token.trim())
            .send()
            .await
            .map_err(|error| network_error("verifying session", error))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| network_error("reading verify response", error))?;

        parse_verify_body(status, &body)
    }
}
