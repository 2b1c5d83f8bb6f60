//! # Telemetry Module
//!
//! Pull-style entry point used by the renderer. A [`Telemetry`] owns one
//! cache store, one set of transcript sources and at most one cached usage
//! client for the whole invocation. Credentials are resolved lazily, on the
//! first usage-cache miss, and at most once.

use once_cell::unsync::OnceCell;
use serde::Serialize;

use crate::cache::CacheStore;
use crate::credentials::{self, AuthConfig, TokenRefresher};
use crate::http::{HttpTransport, UreqTransport};
use crate::transcript::TranscriptSources;
use crate::usage::{AnalyticsError, BurnRate, ModelCost, UsageAnalytics};
use crate::usage_api::{CachedUsageClient, FetchUsage, UsageApiError, UsageClient, UsageResponse};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("{0} disabled")]
    Disabled(&'static str),
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
    #[error(transparent)]
    Usage(#[from] UsageApiError),
}

/// [`FetchUsage`] that resolves (and if needed refreshes) the OAuth token
/// the first time it is asked to fetch.
pub struct CredentialedClient<T: HttpTransport + Clone> {
    transport: T,
    auth: AuthConfig,
    client: OnceCell<Result<UsageClient<T>, String>>,
}

impl<T: HttpTransport + Clone> CredentialedClient<T> {
    pub fn new(transport: T, auth: AuthConfig) -> Self {
        Self {
            transport,
            auth,
            client: OnceCell::new(),
        }
    }

    fn client(&self) -> Result<&UsageClient<T>, UsageApiError> {
        self.client
            .get_or_init(|| {
                let token = credentials::resolve(&self.auth).map_err(|err| {
                    tracing::warn!(error = %err, "usage API credentials unavailable");
                    err.to_string()
                })?;
                let refresher = TokenRefresher::new(
                    self.transport.clone(),
                    self.auth.manual_credentials_path.clone(),
                );
                let token = credentials::ensure_fresh(token, &refresher);
                Ok(UsageClient::new(self.transport.clone(), token.access_token))
            })
            .as_ref()
            .map_err(|msg| UsageApiError::Credentials(msg.clone()))
    }
}

impl<T: HttpTransport + Clone> FetchUsage for CredentialedClient<T> {
    fn fetch(&self) -> Result<UsageResponse, UsageApiError> {
        self.client()?.fetch()
    }
}

/// Everything one render needs; `None` marks a query that failed or is off
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub daily_cost: Option<f64>,
    pub burn_rate: Option<BurnRate>,
    pub model_breakdown: Option<Vec<ModelCost>>,
    pub usage: Option<UsageResponse>,
}

pub struct Telemetry<T: HttpTransport + Clone = UreqTransport> {
    analytics: Option<UsageAnalytics>,
    usage: Option<CachedUsageClient<CredentialedClient<T>>>,
}

impl Telemetry {
    pub fn new(cache: CacheStore, sources: TranscriptSources, auth: AuthConfig) -> Self {
        Self::with_transport(cache, sources, auth, UreqTransport)
    }
}

impl<T: HttpTransport + Clone> Telemetry<T> {
    pub fn with_transport(
        cache: CacheStore,
        sources: TranscriptSources,
        auth: AuthConfig,
        transport: T,
    ) -> Self {
        let usage = CachedUsageClient::new(CredentialedClient::new(transport, auth), cache.clone());
        Self {
            analytics: Some(UsageAnalytics::new(cache, sources)),
            usage: Some(usage),
        }
    }

    pub fn with_cost_estimation(mut self, enabled: bool) -> Self {
        self.analytics = self
            .analytics
            .map(|a| a.with_cost_estimation(enabled));
        self
    }

    /// Turn off the usage API; `usage()` then reports it as disabled
    pub fn without_usage_api(mut self) -> Self {
        self.usage = None;
        self
    }

    pub fn without_transcripts(mut self) -> Self {
        self.analytics = None;
        self
    }

    fn analytics(&self) -> Result<&UsageAnalytics, TelemetryError> {
        self.analytics
            .as_ref()
            .ok_or(TelemetryError::Disabled("transcript analytics"))
    }

    pub fn daily_cost(&self) -> Result<f64, TelemetryError> {
        Ok(self.analytics()?.daily_cost()?)
    }

    pub fn burn_rate(&self) -> Result<BurnRate, TelemetryError> {
        Ok(self.analytics()?.burn_rate()?)
    }

    pub fn model_breakdown(&self) -> Result<Vec<ModelCost>, TelemetryError> {
        Ok(self.analytics()?.model_breakdown()?)
    }

    pub fn usage(&mut self) -> Result<UsageResponse, TelemetryError> {
        let client = self
            .usage
            .as_mut()
            .ok_or(TelemetryError::Disabled("usage API"))?;
        Ok(client.fetch()?)
    }

    /// Run every query, keeping what succeeded
    pub fn snapshot(&mut self) -> Snapshot {
        fn keep<V>(what: &str, result: Result<V, TelemetryError>) -> Option<V> {
            match result {
                Ok(v) => Some(v),
                Err(TelemetryError::Disabled(_)) => None,
                Err(err) => {
                    tracing::debug!(query = what, error = %err, "segment omitted");
                    None
                }
            }
        }

        Snapshot {
            daily_cost: keep("daily_cost", self.daily_cost()),
            burn_rate: keep("burn_rate", self.burn_rate()),
            model_breakdown: keep("model_breakdown", self.model_breakdown()),
            usage: keep("usage", self.usage()),
        }
    }
}
