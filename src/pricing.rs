//! # Pricing Module
//!
//! Model naming and per-token pricing for Claude models.
//!
//! - [`short_model_name`] turns `claude-opus-4-6-20260101` into `opus4.6`
//! - [`lookup`] finds per-token prices for a model id
//! - [`record_cost`] costs a transcript record, optionally estimating from
//!   tokens when the record carries no `costUSD`
//!
//! Prices can be overridden via environment variables (all four required):
//! - `CLAUDE_PRICE_INPUT`
//! - `CLAUDE_PRICE_OUTPUT`
//! - `CLAUDE_PRICE_CACHE_CREATE`
//! - `CLAUDE_PRICE_CACHE_READ`

use once_cell::sync::Lazy;
use regex::Regex;
use std::env;

use crate::models::{TokenUsage, TranscriptRecord};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pricing {
    pub in_per_tok: f64,
    pub out_per_tok: f64,
    pub cache_create_per_tok: f64,
    pub cache_read_per_tok: f64,
}

impl Pricing {
    /// Cache writes ≈ 1.25× input, cache reads ≈ 0.1× input.
    const fn per_million(input: f64, output: f64) -> Self {
        let in_pt = input / 1e6;
        Pricing {
            in_per_tok: in_pt,
            out_per_tok: output / 1e6,
            cache_create_per_tok: in_pt * 1.25,
            cache_read_per_tok: in_pt * 0.1,
        }
    }

    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        usage.input_tokens as f64 * self.in_per_tok
            + usage.output_tokens as f64 * self.out_per_tok
            + usage.cache_creation_input_tokens as f64 * self.cache_create_per_tok
            + usage.cache_read_input_tokens as f64 * self.cache_read_per_tok
    }
}

/// Known models, most specific first. Order is significant for prefix
/// matching in [`lookup`].
static PRICING_TABLE: &[(&str, Pricing)] = &[
    ("claude-opus-4-6", Pricing::per_million(5.0, 25.0)),
    ("claude-opus-4-5", Pricing::per_million(5.0, 25.0)),
    ("claude-opus-4-1", Pricing::per_million(15.0, 75.0)),
    ("claude-opus-4", Pricing::per_million(15.0, 75.0)),
    ("claude-sonnet-4-6", Pricing::per_million(3.0, 15.0)),
    ("claude-sonnet-4-5", Pricing::per_million(3.0, 15.0)),
    ("claude-sonnet-4", Pricing::per_million(3.0, 15.0)),
    ("claude-3-7-sonnet", Pricing::per_million(3.0, 15.0)),
    ("claude-3-5-sonnet", Pricing::per_million(3.0, 15.0)),
    ("claude-haiku-4-5", Pricing::per_million(1.0, 5.0)),
    ("claude-3-5-haiku", Pricing::per_million(0.8, 4.0)),
    ("claude-3-opus", Pricing::per_million(15.0, 75.0)),
    ("claude-3-haiku", Pricing::per_million(0.25, 1.25)),
];

/// Full-id prefix → display name, most specific first.
static SHORT_NAMES: &[(&str, &str)] = &[
    ("claude-opus-4-6", "opus4.6"),
    ("claude-opus-4-5", "opus4.5"),
    ("claude-opus-4-1", "opus4.1"),
    ("claude-opus-4", "opus4"),
    ("claude-sonnet-4-6", "sonnet4.6"),
    ("claude-sonnet-4-5", "sonnet4.5"),
    ("claude-sonnet-4", "sonnet4"),
    ("claude-3-7-sonnet", "sonnet3.7"),
    ("claude-3-5-sonnet", "sonnet3.5"),
    ("claude-3-sonnet", "sonnet3"),
    ("claude-haiku-4-5", "haiku4.5"),
    ("claude-3-5-haiku", "haiku3.5"),
    ("claude-3-haiku", "haiku3"),
    ("claude-3-opus", "opus3"),
];

static DATE_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-\d{8}$").unwrap());
static VERSION_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-v\d+(:\d+)?$").unwrap());

/// Short display name for a model id.
///
/// Known families map through a prefix table; anything else loses a leading
/// `claude-` and a trailing `-YYYYMMDD`.
pub fn short_model_name(model_id: &str) -> String {
    if let Some((_, short)) = SHORT_NAMES
        .iter()
        .find(|(prefix, _)| model_id.starts_with(prefix))
    {
        return (*short).to_string();
    }
    let name = model_id.strip_prefix("claude-").unwrap_or(model_id);
    DATE_SUFFIX_RE.replace(name, "").into_owned()
}

/// Reduce a provider-qualified id to the bare model name:
///
/// - `us.anthropic.claude-opus-4-6-v1` → `claude-opus-4-6`
/// - `azure_ai/claude-haiku-4-5` → `claude-haiku-4-5`
/// - `claude-sonnet-4-5@20250929` → `claude-sonnet-4-5`
pub fn normalize_model_key(key: &str) -> String {
    let mut k = key.trim().to_lowercase();
    if let Some(idx) = k.rfind("anthropic.") {
        k = k[idx + "anthropic.".len()..].to_string();
    }
    if let Some(idx) = k.rfind('/') {
        k = k[idx + 1..].to_string();
    }
    if let Some(idx) = k.find('@') {
        k.truncate(idx);
    }
    VERSION_SUFFIX_RE.replace(&k, "").into_owned()
}

fn env_pricing() -> Option<Pricing> {
    let read = |k: &str| env::var(k).ok()?.trim().parse::<f64>().ok();
    Some(Pricing {
        in_per_tok: read("CLAUDE_PRICE_INPUT")?,
        out_per_tok: read("CLAUDE_PRICE_OUTPUT")?,
        cache_create_per_tok: read("CLAUDE_PRICE_CACHE_CREATE")?,
        cache_read_per_tok: read("CLAUDE_PRICE_CACHE_READ")?,
    })
}

/// Prices for `model_id`.
///
/// Exact match first, then the first table key that is a prefix of the id or
/// that the id is a prefix of, in table order. A bare id such as `claude`
/// therefore resolves to the first table entry; that tie-break is positional,
/// not semantic. Family keywords are the last resort.
pub fn lookup(model_id: &str) -> Option<Pricing> {
    if let Some(p) = env_pricing() {
        return Some(p);
    }
    let m = normalize_model_key(model_id);
    if m.is_empty() {
        return None;
    }
    if let Some((_, p)) = PRICING_TABLE.iter().find(|(key, _)| *key == m) {
        return Some(*p);
    }
    if let Some((_, p)) = PRICING_TABLE
        .iter()
        .find(|(key, _)| m.starts_with(key) || key.starts_with(m.as_str()))
    {
        return Some(*p);
    }
    if m.contains("opus") {
        Some(Pricing::per_million(15.0, 75.0))
    } else if m.contains("sonnet") {
        Some(Pricing::per_million(3.0, 15.0))
    } else if m.contains("haiku") {
        Some(Pricing::per_million(1.0, 5.0))
    } else {
        None
    }
}

/// Cost of one record. Recorded `costUSD` always wins; without it the cost is
/// zero unless `estimate` is set, in which case token usage is priced.
pub fn record_cost(record: &TranscriptRecord, estimate: bool) -> f64 {
    if let Some(cost) = record.cost_usd {
        return cost;
    }
    if !estimate {
        return 0.0;
    }
    match (record.model(), record.usage()) {
        (Some(model), Some(usage)) => lookup(model).map(|p| p.cost(usage)).unwrap_or(0.0),
        _ => 0.0,
    }
}
