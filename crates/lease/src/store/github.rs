//! # GitHub Label Store
//!
//! [`LabelStore`] over the GitHub REST API. Open-item queries go through the
//! search API, which is eventually consistent: a label attached moments ago
//! may not be visible to a concurrent search yet.

use super::{LabelStore, MANAGED_PREFIX};
use crate::error::LabelStoreError;
use async_trait::async_trait;
use reqwest::{header, Client as HttpClient, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "prenv-database-lease/1.0";
const LABEL_COLOR: &str = "0E8A16";
const PAGE_SIZE: usize = 100;

/// GitHub-backed label store for one repository.
pub struct GitHubLabelStore {
    http_client: HttpClient,
    base_url: String,
    token: String,
    owner: String,
    repo: String,
    rate_limit: Mutex<RateLimit>,
}

#[derive(Debug, Default)]
struct RateLimit {
    remaining: Option<i64>,
    reset: Option<Instant>,
}

#[derive(Debug, Deserialize)]
struct GitHubError {
    message: String,
    #[serde(default)]
    errors: Vec<GitHubErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GitHubErrorDetail {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    total_count: u64,
}

#[derive(Debug, Serialize)]
struct CreateLabelRequest<'a> {
    name: &'a str,
    color: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateLabelsRequest {
    labels: Vec<String>,
}

impl GitHubLabelStore {
    /// Create a store for `owner/repo` authenticated with `token`.
    ///
    /// # Errors
    /// Returns `LabelStoreError::Http` if the HTTP client cannot be built.
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Result<Self, LabelStoreError> {
        let token = token.into();
        if token.is_empty() {
            return Err(LabelStoreError::AuthenticationFailed);
        }

        let http_client = HttpClient::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            base_url: DEFAULT_BASE_URL.to_string(),
            token,
            owner: owner.into(),
            repo: repo.into(),
            rate_limit: Mutex::new(RateLimit::default()),
        })
    }

    /// Point the store at a different API root (GitHub Enterprise, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}{path}", self.base_url, self.owner, self.repo)
    }

    /// Count open items carrying `label`.
    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn count_open_items(&self, label: &str) -> Result<u64, LabelStoreError> {
        let query = format!(
            "repo:{}/{} state:open label:\"{label}\"",
            self.owner, self.repo
        );
        let url = format!("{}/search/issues", self.base_url);

        let response = self
            .make_request(Method::GET, &url, &[("q", query)], None)
            .await?;
        let response = Self::ensure_success(response).await?;
        let result: SearchResult = response.json().await?;

        debug!(label, count = result.total_count, "Counted open items");
        Ok(result.total_count)
    }

    /// Make an HTTP request with rate limit tracking.
    async fn make_request(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<Response, LabelStoreError> {
        self.check_rate_limit()?;

        let mut request = self
            .http_client
            .request(method, url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/vnd.github+json");

        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        self.update_rate_limit(&response);

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(LabelStoreError::AuthenticationFailed),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
                if Self::is_rate_limited(&response) =>
            {
                Err(LabelStoreError::RateLimitExceeded {
                    reset_in: Self::get_rate_limit_reset(&response)
                        .unwrap_or(Duration::from_secs(60)),
                })
            }
            _ => Ok(response),
        }
    }

    /// Turn a non-2xx response into an API error.
    async fn ensure_success(response: Response) -> Result<Response, LabelStoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(Self::api_error(status, response).await)
    }

    async fn api_error(status: StatusCode, response: Response) -> LabelStoreError {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GitHubError>(&text)
            .map(|e| e.message)
            .unwrap_or(text);
        LabelStoreError::Api {
            status: status.as_u16(),
            message,
        }
    }

    fn check_rate_limit(&self) -> Result<(), LabelStoreError> {
        let limit = self
            .rate_limit
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if limit.remaining == Some(0) {
            if let Some(reset) = limit.reset {
                let now = Instant::now();
                if now < reset {
                    return Err(LabelStoreError::RateLimitExceeded {
                        reset_in: reset - now,
                    });
                }
            }
        }
        Ok(())
    }

    fn update_rate_limit(&self, response: &Response) {
        let mut limit = self
            .rate_limit
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(remaining) = header_i64(response, "x-ratelimit-remaining") {
            limit.remaining = Some(remaining);
        }
        if let Some(reset_in) = Self::get_rate_limit_reset(response) {
            limit.reset = Some(Instant::now() + reset_in);
        }
    }

    fn is_rate_limited(response: &Response) -> bool {
        header_i64(response, "x-ratelimit-remaining") == Some(0)
    }

    fn get_rate_limit_reset(response: &Response) -> Option<Duration> {
        header_i64(response, "x-ratelimit-reset").map(|reset_timestamp| {
            let now = chrono::Utc::now().timestamp();
            #[allow(clippy::cast_sign_loss)]
            let seconds_until_reset = (reset_timestamp - now).max(0) as u64;
            Duration::from_secs(seconds_until_reset)
        })
    }
}

fn header_i64(response: &Response, name: &str) -> Option<i64> {
    response
        .headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())
}

#[async_trait]
impl LabelStore for GitHubLabelStore {
    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn list_managed_labels(&self) -> Result<BTreeSet<String>, LabelStoreError> {
        let url = self.repo_url("/labels");
        let mut managed = BTreeSet::new();

        for page in 1.. {
            let response = self
                .make_request(
                    Method::GET,
                    &url,
                    &[("per_page", PAGE_SIZE.to_string()), ("page", page.to_string())],
                    None,
                )
                .await?;
            let labels: Vec<GitHubLabel> = Self::ensure_success(response).await?.json().await?;
            let exhausted = labels.len() < PAGE_SIZE;

            managed.extend(
                labels
                    .into_iter()
                    .map(|label| label.name)
                    .filter(|name| name.starts_with(MANAGED_PREFIX)),
            );

            if exhausted {
                break;
            }
        }

        debug!("Found {} managed labels", managed.len());
        Ok(managed)
    }

    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn create_label(&self, label: &str) -> Result<(), LabelStoreError> {
        let body = serde_json::to_value(CreateLabelRequest {
            name: label,
            color: LABEL_COLOR,
        })?;
        let response = self
            .make_request(Method::POST, &self.repo_url("/labels"), &[], Some(body))
            .await?;

        let status = response.status();
        if status.is_success() {
            info!("Created label {label}");
            return Ok(());
        }

        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let text = response.text().await.unwrap_or_default();
            let already_exists = serde_json::from_str::<GitHubError>(&text).is_ok_and(|e| {
                e.errors
                    .iter()
                    .any(|d| d.code.as_deref() == Some("already_exists"))
            });
            if already_exists {
                debug!("Label {label} already exists");
                return Ok(());
            }
            return Err(LabelStoreError::Api {
                status: status.as_u16(),
                message: format!("Label validation failed: {text}"),
            });
        }

        Err(Self::api_error(status, response).await)
    }

    async fn is_attached_to_any_open_item(&self, label: &str) -> Result<bool, LabelStoreError> {
        Ok(self.count_open_items(label).await? > 0)
    }

    async fn is_attached_to_exactly_one_open_item(
        &self,
        label: &str,
    ) -> Result<bool, LabelStoreError> {
        Ok(self.count_open_items(label).await? <= 1)
    }

    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn set_label(&self, item: u64, label: &str) -> Result<(), LabelStoreError> {
        let mut labels: Vec<String> = self
            .item_labels(item)
            .await?
            .into_iter()
            .filter(|name| !name.starts_with(MANAGED_PREFIX))
            .collect();
        labels.push(label.to_string());

        let body = serde_json::to_value(UpdateLabelsRequest { labels })?;
        let response = self
            .make_request(
                Method::PUT,
                &self.repo_url(&format!("/issues/{item}/labels")),
                &[],
                Some(body),
            )
            .await?;
        Self::ensure_success(response).await?;

        info!("Attached label {label} to #{item}");
        Ok(())
    }

    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn remove_label(&self, item: u64, label: &str) -> Result<(), LabelStoreError> {
        let url = self.repo_url(&format!(
            "/issues/{item}/labels/{}",
            urlencoding::encode(label)
        ));
        let response = self.make_request(Method::DELETE, &url, &[], None).await?;

        match response.status() {
            status if status.is_success() => {
                info!("Removed label {label} from #{item}");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                debug!("Label {label} not found on #{item} (already removed)");
                Ok(())
            }
            status => Err(Self::api_error(status, response).await),
        }
    }

    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn item_labels(&self, item: u64) -> Result<Vec<String>, LabelStoreError> {
        let response = self
            .make_request(
                Method::GET,
                &self.repo_url(&format!("/issues/{item}/labels")),
                &[("per_page", PAGE_SIZE.to_string())],
                None,
            )
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LabelStoreError::ItemNotFound(item));
        }

        let labels: Vec<GitHubLabel> = Self::ensure_success(response).await?.json().await?;
        let labels: Vec<String> = labels.into_iter().map(|label| label.name).collect();

        debug!("Retrieved {} labels for #{}", labels.len(), item);
        Ok(labels)
    }
}
