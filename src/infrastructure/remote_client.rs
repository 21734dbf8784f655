use crate::domain::models::ReviewItem;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::review_codec::{ReviewItemRecord, decode_snapshot, encode_snapshot};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSnapshot {
    pub items: Vec<ReviewItem>,
    pub server_timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceReceipt {
    pub count: usize,
    pub server_timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub completion_rate: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[async_trait]
pub trait RemoteReviewClient: Send + Sync {
    async fn fetch_reviews(&self, token: &str) -> Result<RemoteSnapshot, InfraError>;

    async fn replace_reviews(
        &self,
        token: &str,
        items: &[ReviewItem],
    ) -> Result<ReplaceReceipt, InfraError>;

    async fn user_stats(&self, token: &str) -> Result<UserStats, InfraError>;

    async fn health(&self) -> Result<HealthReport, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestRemoteReviewClient {
    client: Client,
    base_url: Url,
}

impl ReqwestRemoteReviewClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InfraError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: parse_base_url(base_url)?,
        })
    }

    fn ensure_token(token: &str) -> Result<(), InfraError> {
        if token.trim().is_empty() {
            return Err(InfraError::Auth("bearer token must not be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, serde::Deserialize)]
struct ReviewsEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<Vec<ReviewItemRecord>>,
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct ReplaceReviewsRequest {
    reviews: Vec<ReviewItemRecord>,
}

#[derive(Debug, serde::Deserialize)]
struct UserStatsEnvelope {
    success: bool,
    #[serde(default)]
    stats: Option<UserStats>,
    #[serde(default)]
    error: Option<String>,
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<Client, InfraError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| InfraError::InvalidConfig(format!("failed to build http client: {error}")))
}

pub(crate) fn parse_base_url(raw: &str) -> Result<Url, InfraError> {
    let url = Url::parse(raw.trim())
        .map_err(|error| InfraError::InvalidConfig(format!("invalid api base url '{raw}': {error}")))?;
    if url.cannot_be_a_base() {
        return Err(InfraError::InvalidConfig(format!(
            "api base url cannot be a base: {raw}"
        )));
    }
    Ok(url)
}

pub(crate) fn api_endpoint(base: &Url, segments: &[&str]) -> Result<Url, InfraError> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| InfraError::InvalidConfig("api base url cannot be a base".to_string()))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

pub(crate) fn http_status_error(status: StatusCode, body: &str, context: &str) -> InfraError {
    let message = if body.trim().is_empty() {
        format!("{context}: http {}", status.as_u16())
    } else {
        format!("{context}: http {}; body={body}", status.as_u16())
    };
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        InfraError::Auth(message)
    } else {
        InfraError::Transient(message)
    }
}

pub(crate) fn network_error(context: &str, error: reqwest::Error) -> InfraError {
    InfraError::Transient(format!("network error while {context}: {error}"))
}

pub(crate) fn parse_reviews_body(
    status: StatusCode,
    body: &str,
) -> Result<RemoteSnapshot, InfraError> {
    if !status.is_success() {
        return Err(http_status_error(status, body, "fetching reviews"));
    }
    let parsed: ReviewsEnvelope = serde_json::from_str(body).map_err(|error| {
        InfraError::Transient(format!("invalid reviews payload: {error}; body={body}"))
    })?;
    if !parsed.success {
        return Err(InfraError::Transient(format!(
            "server refused reviews read: {}",
            parsed.error.unwrap_or_else(|| "unknown error".to_string())
        )));
    }

    let records = parsed.data.unwrap_or_default();
    if let Some(count) = parsed.count.filter(|count| *count != records.len()) {
        tracing::warn!(count, received = records.len(), "reviews envelope count mismatch");
    }
    let items = decode_snapshot(&records)
        .map_err(|error| InfraError::Transient(format!("remote snapshot rejected: {error}")))?;
    Ok(RemoteSnapshot {
        items,
        server_timestamp: parsed.timestamp,
    })
}

pub(crate) fn parse_replace_body(
    status: StatusCode,
    body: &str,
    sent: usize,
) -> Result<ReplaceReceipt, InfraError> {
    if !status.is_success() {
        return Err(http_status_error(status, body, "saving reviews"));
    }
    let parsed: ReviewsEnvelope = serde_json::from_str(body).map_err(|error| {
        InfraError::Transient(format!("invalid save payload: {error}; body={body}"))
    })?;
    if !parsed.success {
        return Err(InfraError::Transient(format!(
            "server refused reviews write: {}",
            parsed.error.unwrap_or_else(|| "unknown error".to_string())
        )));
    }
    Ok(ReplaceReceipt {
        count: parsed.count.unwrap_or(sent),
        server_timestamp: parsed.timestamp,
    })
}

pub(crate) fn parse_user_stats_body(status: StatusCode, body: &str) -> Result<UserStats, InfraError> {
    if !status.is_success() {
        return Err(http_status_error(status, body, "fetching user stats"));
    }
    let parsed: UserStatsEnvelope = serde_json::from_str(body).map_err(|error| {
        InfraError::Transient(format!("invalid user stats payload: {error}; body={body}"))
    })?;
    match (parsed.success, parsed.stats) {
        (true, Some(stats)) => Ok(stats),
        (true, None) => Err(InfraError::Transient(
            "user stats payload is missing stats".to_string(),
        )),
        (false, _) => Err(InfraError::Transient(format!(
            "server refused user stats: {}",
            parsed.error.unwrap_or_else(|| "unknown error".to_string())
        ))),
    }
}

#[async_trait]
impl RemoteReviewClient for ReqwestRemoteReviewClient {
    async fn fetch_reviews(&self, token: &str) -> Result<RemoteSnapshot, InfraError> {
        Self::ensure_token(token)?;
        let url = api_endpoint(&self.base_url, &["reviews"])?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token.trim())
            .send()
            .await
            .map_err(|error| network_error("fetching reviews", error))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| network_error("reading reviews response", error))?;

        parse_reviews_body(status, &body)
    }

    async fn replace_reviews(
        &self,
        token: &str,
        items: &[ReviewItem],
    ) -> Result<ReplaceReceipt, InfraError> {
        Self::ensure_token(token)?;
        let url = api_endpoint(&self.base_url, &["reviews"])?;
        let request = ReplaceReviewsRequest {
            reviews: encode_snapshot(items),
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(token.trim())
            .json(&request)
            .send()
            .await
            .map_err(|error| network_error("saving reviews", error))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| network_error("reading save response", error))?;

        parse_replace_body(status, &body, items.len())
    }

    async fn user_stats(&self, token: &str) -> Result<UserStats, InfraError> {
        Self::ensure_token(token)?;
        let url = api_endpoint(&self.base_url, &["user", "stats"])?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token.trim())
            .send()
            .await
            .map_err(|error| network_error("fetching user stats", error))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| network_error("reading user stats response", error))?;

        parse_user_stats_body(status, &body)
    }

    async fn health(&self) -> Result<HealthReport, InfraError> {
        let url = api_endpoint(&self.base_url, &["health"])?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| network_error("probing health", error))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| network_error("reading health response", error))?;

        if !status.is_success() {
            return Err(http_status_error(status, &body, "probing health"));
        }
        serde_json::from_str(&body).map_err(|error| {
            InfraError::Transient(format!("invalid health payload: {error}; body={body}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_endpoint_keeps_base_prefix() {
        let base = parse_base_url("http://localhost:3000/api").expect("base url");
        let slashed = parse_base_url("http://localhost:3000/api/").expect("base url");

        assert_eq!(
            api_endpoint(&base, &["reviews"]).expect("endpoint").as_str(),
            "http://localhost:3000/api/reviews"
        );
        assert_eq!(
            api_endpoint(&slashed, &["user", "stats"]).expect("endpoint").as_str(),
            "http://localhost:3000/api/user/stats"
        );
        assert!(matches!(
            parse_base_url("not a url"),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn status_errors_split_auth_from_transient() {
        assert!(http_status_error(StatusCode::UNAUTHORIZED, "", "x").is_auth_rejection());
        assert!(http_status_error(StatusCode::FORBIDDEN, "{}", "x").is_auth_rejection());
        assert!(matches!(
            http_status_error(StatusCode::INTERNAL_SERVER_ERROR, "", "x"),
            InfraError::Transient(_)
        ));
        assert!(matches!(
            http_status_error(StatusCode::NOT_FOUND, "", "x"),
            InfraError::Transient(_)
        ));
    }

    #[test]
    fn parse_reviews_body_decodes_envelope() {
        let body = serde_json::json!({
            "success": true,
            "count": 1,
            "timestamp": "2024-01-01T00:00:05.000Z",
            "data": [{
                "id": 1704067200000i64,
                "content": "X",
                "addTime": "2024-01-01T00:00:00.000Z",
                "reviewDates": [
                    "2024-01-01T00:20:00.000Z", "2024-01-01T01:00:00.000Z",
                    "2024-01-02T00:00:00.000Z", "2024-01-03T00:00:00.000Z",
                    "2024-01-05T00:00:00.000Z", "2024-01-08T00:00:00.000Z",
                    "2024-01-16T00:00:00.000Z", "2024-01-31T00:00:00.000Z"
                ],
                "status": [2, 0, 0, 0, 0, 0, 0, 0]
            }]
        })
        .to_string();

        let snapshot = parse_reviews_body(StatusCode::OK, &body).expect("parse");
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].content, "X");
        assert_eq!(
            snapshot.server_timestamp.as_deref(),
            Some("2024-01-01T00:00:05.000Z")
        );

        let empty = parse_reviews_body(StatusCode::OK, r#"{"success":true,"data":null}"#)
            .expect("parse empty");
        assert!(empty.items.is_empty());
    }

    #[test]
    fn parse_reviews_body_rejects_failures() {
        assert!(matches!(
            parse_reviews_body(StatusCode::OK, r#"{"success":false,"error":"boom"}"#),
            Err(InfraError::Transient(_))
        ));
        assert!(matches!(
            parse_reviews_body(StatusCode::OK, "<html>"),
            Err(InfraError::Transient(_))
        ));
        assert!(matches!(
            parse_reviews_body(
                StatusCode::OK,
                r#"{"success":true,"data":[{"id":1,"content":"x","addTime":"bad","reviewDates":[],"status":[]}]}"#
            ),
            Err(InfraError::Transient(_))
        ));
        assert!(matches!(
            parse_reviews_body(StatusCode::UNAUTHORIZED, r#"{"error":"expired"}"#),
            Err(InfraError::Auth(_))
        ));
    }

    #[test]
    fn parse_replace_and_stats_bodies() {
        let receipt = parse_replace_body(
            StatusCode::OK,
            r#"{"success":true,"count":3,"timestamp":"2024-01-01T00:00:00.000Z"}"#,
            3,
        )
        .expect("receipt");
        assert_eq!(receipt.count, 3);

        let fallback_count =
            parse_replace_body(StatusCode::OK, r#"{"success":true}"#, 5).expect("receipt");
        assert_eq!(fallback_count.count, 5);
        assert!(matches!(
            parse_replace_body(StatusCode::BAD_REQUEST, r#"{"success":false}"#, 1),
            Err(InfraError::Transient(_))
        ));

        let stats = parse_user_stats_body(
            StatusCode::OK,
            r#"{"success":true,"stats":{"totalItems":4,"completionRate":62.5,"streak":3}}"#,
        )
        .expect("stats");
        assert_eq!(stats.total_items, 4);
        assert_eq!(stats.completion_rate, 62.5);
        assert_eq!(stats.extra.get("streak"), Some(&serde_json::json!(3)));
        assert!(parse_user_stats_body(StatusCode::OK, r#"{"success":true}"#).is_err());
    }
}
