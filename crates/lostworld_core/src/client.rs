use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::errors::TrackerError;
use crate::models::{
    CredentialSet, FavoriteGroupRecord, FavoriteLimits, FavoriteRecord, FavoritedWorld,
    LogoutResponse, WorldDetail, SECOND_FACTOR_MARKER, WORLD_TYPE,
};

pub const DEFAULT_BASE_URL: &str = "https://api.vrchat.cloud/api/1";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36 Edg/136.0.0.0";
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub request_delay: Duration,
    pub extra_headers: HashMap<String, String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            extra_headers: HashMap::new(),
        }
    }
}

/// Keeps a fixed minimum spacing between the starts of consecutive calls.
/// The first call never waits.
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_call: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let ready_at = previous + self.delay;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

/// Outcome of the "who am I" call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCheck {
    Authenticated(crate::models::CurrentUser),
    RequiresSecondFactor,
}

/// VRChat API client bound to one credential set. Data calls share a
/// [`RateLimiter`]; the session check and logout are not throttled.
#[derive(Clone)]
pub struct VrcClient {
    client: Client,
    base_url: Url,
    limiter: Arc<RateLimiter>,
}

impl VrcClient {
    pub fn new(options: ClientOptions, credentials: &CredentialSet) -> Result<Self, TrackerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("user-agent"),
            HeaderValue::from_str(&options.user_agent)
                .map_err(|err| TrackerError::InvalidConfig(format!("invalid user agent: {err}")))?,
        );
        if !credentials.is_empty() {
            headers.insert(
                HeaderName::from_static("cookie"),
                HeaderValue::from_str(&credentials.to_header_value()).map_err(|err| {
                    TrackerError::InvalidConfig(format!("invalid cookie value: {err}"))
                })?,
            );
        }
        for (key, value) in &options.extra_headers {
            let header_name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|err| TrackerError::InvalidConfig(format!("invalid header name: {err}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|err| TrackerError::InvalidConfig(format!("invalid header value: {err}")))?;
            headers.insert(header_name, header_value);
        }

        let client = Client::builder()
            .timeout(options.timeout)
            .default_headers(headers)
            .build()
            .map_err(TrackerError::Request)?;

        let base = options.base_url.trim_end_matches('/');
        let base_url = Url::parse(&format!("{base}/"))
            .map_err(|err| TrackerError::InvalidConfig(format!("invalid API base URL: {err}")))?;

        Ok(Self {
            client,
            base_url,
            limiter: Arc::new(RateLimiter::new(options.request_delay)),
        })
    }

    /// Checks the session without throttling. A 401 comes back as
    /// [`TrackerError::Unauthorized`].
    pub async fn check_auth(&self) -> Result<AuthCheck, TrackerError> {
        let url = self.endpoint(&["auth", "user"])?;
        let body = self.send(Method::GET, url.clone()).await?;
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|err| TrackerError::InvalidJson(err.to_string()))?;
        if value.get(SECOND_FACTOR_MARKER).is_some() {
            return Ok(AuthCheck::RequiresSecondFactor);
        }
        let user = serde_json::from_value(value)
            .map_err(|err| TrackerError::InvalidJson(format!("{url}: {err}")))?;
        Ok(AuthCheck::Authenticated(user))
    }

    pub async fn favorite_limits(&self) -> Result<FavoriteLimits, TrackerError> {
        let url = self.endpoint(&["auth", "user", "favoritelimits"])?;
        self.throttled_json(url).await
    }

    pub async fn favorites_page(
        &self,
        offset: usize,
        n: usize,
    ) -> Result<Vec<FavoriteRecord>, TrackerError> {
        let mut url = self.endpoint(&["favorites"])?;
        url.query_pairs_mut()
            .append_pair("n", &n.to_string())
            .append_pair("offset", &offset.to_string())
            .append_pair("type", WORLD_TYPE);
        self.throttled_json(url).await
    }

    pub async fn favorite_groups(&self, n: usize) -> Result<Vec<FavoriteGroupRecord>, TrackerError> {
        let mut url = self.endpoint(&["favorite", "groups"])?;
        url.query_pairs_mut().append_pair("n", &n.to_string());
        self.throttled_json(url).await
    }

    pub async fn favorited_worlds_page(
        &self,
        user_id: &str,
        group_name: &str,
        offset: usize,
        n: usize,
    ) -> Result<Vec<FavoritedWorld>, TrackerError> {
        let mut url = self.endpoint(&["worlds", "favorites"])?;
        url.query_pairs_mut()
            .append_pair("n", &n.to_string())
            .append_pair("offset", &offset.to_string())
            .append_pair("userId", user_id)
            .append_pair("tag", group_name);
        self.throttled_json(url).await
    }

    pub async fn world(&self, world_id: &str) -> Result<WorldDetail, TrackerError> {
        let url = self.endpoint(&["worlds", world_id])?;
        self.throttled_json(url).await
    }

    pub async fn logout(&self) -> Result<LogoutResponse, TrackerError> {
        let url = self.endpoint(&["logout"])?;
        let body = self.send(Method::PUT, url).await?;
        serde_json::from_slice(&body).map_err(|err| TrackerError::InvalidJson(err.to_string()))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TrackerError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TrackerError::InvalidConfig("API base URL cannot have a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn throttled_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, TrackerError> {
        self.limiter.acquire().await;
        let body = self.send(Method::GET, url.clone()).await?;
        serde_json::from_slice(&body)
            .map_err(|err| TrackerError::InvalidJson(format!("{url}: {err}")))
    }

    async fn send(&self, method: Method, url: Url) -> Result<Vec<u8>, TrackerError> {
        debug!(%method, %url, "calling VRChat API");
        let response = self
            .client
            .request(method, url.clone())
            .send()
            .await
            .map_err(TrackerError::Request)?;
        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => Err(TrackerError::NotFound {
                url: url.to_string(),
            }),
            StatusCode::UNAUTHORIZED => {
                let body = response.text().await.unwrap_or_default();
                Err(TrackerError::Unauthorized {
                    url: url.to_string(),
                    body,
                })
            }
            status if !status.is_success() => Err(TrackerError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            }),
            _ => {
                let bytes = response.bytes().await.map_err(TrackerError::Request)?;
                Ok(bytes.to_vec())
            }
        }
    }
}
