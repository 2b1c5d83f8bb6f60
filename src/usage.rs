//! # Usage Module
//!
//! Cost analytics derived from transcript records.
//!
//! ## Key Functions
//!
//! - `daily_cost_for`: sum of today's (UTC) record costs
//! - `identify_block` / `burn_rate_for`: cost per hour of the current activity block
//! - `model_breakdown_for`: cost grouped by model, most expensive first
//!
//! [`UsageAnalytics`] wraps each of these with a short-lived cache entry
//! tied to the session transcript's mtime, so repeated renders inside the
//! TTL never re-read transcript files.

use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::{self, CacheStore};
use crate::models::{ActivityBlock, TranscriptRecord};
use crate::pricing::{record_cost, short_model_name};
use crate::transcript::TranscriptSources;

/// Largest gap, in hours, between records that still counts as one activity block
pub const BLOCK_GAP_HOURS: i64 = 5;

const DAILY_COST_KEY: &str = "daily_cost";
const BURN_RATE_KEY: &str = "burn_rate";
const MODEL_BREAKDOWN_KEY: &str = "model_breakdown";
const ANALYTICS_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("no transcript files found")]
    NoTranscripts,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyCost {
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurnRate {
    /// USD per hour; the raw block cost when the block has no duration
    pub rate: f64,
    pub block: Option<ActivityBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCost {
    pub model: String,
    pub display_name: String,
    pub cost: f64,
}

/// Sum of costs for records whose UTC calendar day is `now`'s UTC day.
pub fn daily_cost_for(records: &[TranscriptRecord], now: DateTime<Utc>, estimate: bool) -> f64 {
    let today = now.date_naive();
    records
        .iter()
        .filter(|r| r.timestamp.is_some_and(|ts| ts.date_naive() == today))
        .map(|r| record_cost(r, estimate))
        .sum()
}

/// The trailing activity block.
///
/// Walks back from the last record and starts the block after the first gap
/// longer than [`BLOCK_GAP_HOURS`]. Records are taken in the order given, so
/// out-of-order input produces negative gaps that never split a block.
pub fn identify_block(records: &[TranscriptRecord], estimate: bool) -> Option<ActivityBlock> {
    let stamps: Vec<(DateTime<Utc>, &TranscriptRecord)> = records
        .iter()
        .filter_map(|r| r.timestamp.map(|ts| (ts, r)))
        .collect();
    let (last_ts, _) = *stamps.last()?;
    let gap = TimeDelta::hours(BLOCK_GAP_HOURS);

    let mut start = 0;
    for i in (1..stamps.len()).rev() {
        if stamps[i].0 - stamps[i - 1].0 > gap {
            start = i;
            break;
        }
    }

    let block = &stamps[start..];
    Some(ActivityBlock {
        start: block[0].0,
        end: last_ts,
        entries: block.len(),
        cost: block.iter().map(|(_, r)| record_cost(r, estimate)).sum(),
    })
}

pub fn burn_rate_for(records: &[TranscriptRecord], estimate: bool) -> BurnRate {
    let Some(block) = identify_block(records, estimate) else {
        return BurnRate { rate: 0.0, block: None };
    };
    let hours = block.duration_hours();
    let rate = if hours <= 0.0 { block.cost } else { block.cost / hours };
    BurnRate {
        rate,
        block: Some(block),
    }
}

/// Costs grouped by `message.model`, sorted by cost descending. Ties keep
/// first-seen order. Records without a model are ignored.
pub fn model_breakdown_for(records: &[TranscriptRecord], estimate: bool) -> Vec<ModelCost> {
    let mut breakdown: Vec<ModelCost> = Vec::new();
    for r in records {
        let Some(model) = r.model() else { continue };
        let cost = record_cost(r, estimate);
        match breakdown.iter_mut().find(|m| m.model == model) {
            Some(existing) => existing.cost += cost,
            None => breakdown.push(ModelCost {
                model: model.to_string(),
                display_name: short_model_name(model),
                cost,
            }),
        }
    }
    breakdown.sort_by(|a, b| b.cost.total_cmp(&a.cost));
    breakdown
}

/// Cache-backed analytics over one set of transcript sources
#[derive(Debug, Clone)]
pub struct UsageAnalytics {
    cache: CacheStore,
    sources: TranscriptSources,
    estimate_costs: bool,
    ttl: Duration,
}

impl UsageAnalytics {
    pub fn new(cache: CacheStore, sources: TranscriptSources) -> Self {
        Self {
            cache,
            sources,
            estimate_costs: false,
            ttl: ANALYTICS_TTL,
        }
    }

    /// Price records that lack `costUSD` from their token usage
    pub fn with_cost_estimation(mut self, enabled: bool) -> Self {
        self.estimate_costs = enabled;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn daily_cost(&self) -> Result<f64, AnalyticsError> {
        let estimate = self.estimate_costs;
        self.cached(DAILY_COST_KEY, |records| DailyCost {
            cost: daily_cost_for(records, Utc::now(), estimate),
        })
        .map(|d| d.cost)
    }

    pub fn burn_rate(&self) -> Result<BurnRate, AnalyticsError> {
        let estimate = self.estimate_costs;
        self.cached(BURN_RATE_KEY, |records| burn_rate_for(records, estimate))
    }

    pub fn model_breakdown(&self) -> Result<Vec<ModelCost>, AnalyticsError> {
        let estimate = self.estimate_costs;
        self.cached(MODEL_BREAKDOWN_KEY, |records| {
            model_breakdown_for(records, estimate)
        })
    }

    fn cached<T, F>(&self, key: &str, compute: F) -> Result<T, AnalyticsError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&[TranscriptRecord]) -> T,
    {
        let current = self.sources.current();
        if let Some(hit) = self.cache.get_as::<T>(key, current) {
            tracing::debug!(key, "analytics cache hit");
            return Ok(hit);
        }

        let records = self
            .sources
            .read_all()
            .ok_or(AnalyticsError::NoTranscripts)?;
        let value = compute(&records);

        let mtime = current.and_then(cache::source_mtime);
        if let Err(err) = self.cache.set_as(key, &value, self.ttl, mtime) {
            tracing::warn!(key, error = %err, "analytics cache write failed");
        }
        Ok(value)
    }
}
