//! # Usage API Module
//!
//! Client for the OAuth usage endpoint that reports plan utilization.
//!
//! [`UsageClient`] performs the request: one retry on a 5xx response, no
//! retry on 401/403. [`CachedUsageClient`] puts a short disk cache in front
//! of it and falls back to the last good response for a grace period when
//! the endpoint starts failing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};

use crate::cache::CacheStore;
use crate::http::{HttpTransport, TransportError};
use crate::utils::null_as_default;

pub const USAGE_ENDPOINT: &str = "https://api.anthropic.com/api/oauth/usage";
const ANTHROPIC_BETA: &str = "oauth-2025-04-20";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
const RETRY_DELAY: Duration = Duration::from_millis(500);

const USAGE_CACHE_KEY: &str = "usage";
const USAGE_CACHE_TTL: Duration = Duration::from_secs(30);
const USAGE_GRACE_PERIOD: Duration = Duration::from_secs(5 * 60);
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

static USER_AGENT: &str = concat!("cc-statusline/", env!("CARGO_PKG_VERSION"));

/// One rate-limit window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageWindow {
    /// Percent of the window used. The endpoint is assumed to send a
    /// percentage in 0-100, not a 0-1 fraction, and it is displayed as is.
    #[serde(default, deserialize_with = "null_as_default")]
    pub utilization: f64,
    #[serde(default)]
    pub resets_at: Option<String>,
}

impl UsageWindow {
    /// `resets_at` as a timestamp; `None` when absent or unparseable
    pub fn resets_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.resets_at.as_deref()?.trim();
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Paid overage beyond the plan limits. Amounts are in cents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraUsage {
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(rename = "monthly_limit", default)]
    pub monthly_limit_cents: Option<i64>,
    #[serde(rename = "used_credits", default)]
    pub used_credits_cents: Option<i64>,
    #[serde(default)]
    pub utilization: Option<f64>,
}

impl ExtraUsage {
    pub fn monthly_limit_usd(&self) -> Option<f64> {
        self.monthly_limit_cents.map(|c| c as f64 / 100.0)
    }

    pub fn used_credits_usd(&self) -> Option<f64> {
        self.used_credits_cents.map(|c| c as f64 / 100.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageResponse {
    #[serde(default)]
    pub five_hour: Option<UsageWindow>,
    #[serde(default)]
    pub seven_day: Option<UsageWindow>,
    #[serde(default)]
    pub seven_day_sonnet: Option<UsageWindow>,
    #[serde(default)]
    pub seven_day_opus: Option<UsageWindow>,
    #[serde(default)]
    pub extra_usage: Option<ExtraUsage>,
}

#[derive(Debug, thiserror::Error)]
pub enum UsageApiError {
    #[error("usage API request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("usage API: unauthorized (HTTP {0}); run 'cc-statusline auth'")]
    Unauthorized(u16),
    #[error("usage API: HTTP {0}")]
    Status(u16),
    #[error("usage API: parse response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("usage API: {0}")]
    Credentials(String),
}

/// Anything that can produce a fresh usage snapshot
pub trait FetchUsage {
    fn fetch(&self) -> Result<UsageResponse, UsageApiError>;
}

pub struct UsageClient<T: HttpTransport> {
    transport: T,
    token: String,
    endpoint: String,
    retry_delay: Duration,
}

impl<T: HttpTransport> UsageClient<T> {
    pub fn new(transport: T, token: impl Into<String>) -> Self {
        Self {
            transport,
            token: token.into(),
            endpoint: USAGE_ENDPOINT.to_string(),
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn request(&self) -> Result<crate::http::HttpReply, TransportError> {
        let auth = format!("Bearer {}", self.token);
        let headers = [
            ("Authorization", auth.as_str()),
            ("anthropic-beta", ANTHROPIC_BETA),
            ("Accept", "application/json"),
            ("User-Agent", USER_AGENT),
        ];
        self.transport.get(&self.endpoint, &headers, REQUEST_TIMEOUT)
    }

    /// Response body of a successful request, unparsed. At most two attempts.
    pub fn fetch_raw(&self) -> Result<String, UsageApiError> {
        let mut reply = self.request()?;
        if reply.status >= 500 {
            tracing::debug!(status = reply.status, "usage API server error, retrying once");
            thread::sleep(self.retry_delay);
            reply = self.request()?;
        }

        match reply.status {
            200 => Ok(reply.body),
            401 | 403 => {
                tracing::warn!(
                    status = reply.status,
                    "usage API rejected the token; run 'cc-statusline auth' to re-authenticate"
                );
                Err(UsageApiError::Unauthorized(reply.status))
            }
            status => {
                tracing::warn!(status, "usage API: unexpected status");
                Err(UsageApiError::Status(status))
            }
        }
    }
}

impl<T: HttpTransport> FetchUsage for UsageClient<T> {
    fn fetch(&self) -> Result<UsageResponse, UsageApiError> {
        let body = self.fetch_raw()?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Disk cache plus in-memory grace period over a [`FetchUsage`].
///
/// The failure counter and last good response live on the instance, so one
/// instance should serve every usage query of a process.
pub struct CachedUsageClient<C: FetchUsage> {
    client: C,
    cache: CacheStore,
    ttl: Duration,
    grace_period: Duration,
    consecutive_failures: u32,
    last_good: Option<(UsageResponse, Instant)>,
}

impl<C: FetchUsage> CachedUsageClient<C> {
    pub fn new(client: C, cache: CacheStore) -> Self {
        Self {
            client,
            cache,
            ttl: USAGE_CACHE_TTL,
            grace_period: USAGE_GRACE_PERIOD,
            consecutive_failures: 0,
            last_good: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn fetch(&mut self) -> Result<UsageResponse, UsageApiError> {
        if let Some(cached) = self.cache.get_as::<UsageResponse>(USAGE_CACHE_KEY, None) {
            tracing::debug!("usage cache hit");
            return Ok(cached);
        }

        match self.client.fetch() {
            Ok(usage) => {
                self.consecutive_failures = 0;
                self.last_good = Some((usage.clone(), Instant::now()));
                if let Err(err) = self.cache.set_as(USAGE_CACHE_KEY, &usage, self.ttl, None) {
                    tracing::warn!(error = %err, "usage cache write failed");
                }
                Ok(usage)
            }
            Err(err) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    tracing::warn!(
                        failures = self.consecutive_failures,
                        "usage API keeps failing; run 'cc-statusline auth --status'"
                    );
                }
                match &self.last_good {
                    Some((usage, at)) if at.elapsed() < self.grace_period => {
                        tracing::warn!(error = %err, "usage API: using stale data (grace period)");
                        Ok(usage.clone())
                    }
                    _ => Err(err),
                }
            }
        }
    }
}
