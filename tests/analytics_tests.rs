use chrono::{DateTime, TimeDelta, Utc};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use cc_statusline::cache::CacheStore;
use cc_statusline::transcript::TranscriptSources;
use cc_statusline::usage::{AnalyticsError, UsageAnalytics};

fn record(ts: DateTime<Utc>, id: &str, model: &str, cost: f64) -> String {
    format!(
        r#"{{"timestamp":"{}","sessionId":"s","costUSD":{cost},"requestId":"req-{id}","message":{{"id":"msg-{id}","model":"{model}","usage":{{"input_tokens":10,"output_tokens":5,"cache_creation_input_tokens":null,"cache_read_input_tokens":0}}}}}}"#,
        ts.to_rfc3339()
    )
}

fn write_transcript(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

fn append(path: &Path, line: &str) {
    let mut f = File::options().append(true).open(path).unwrap();
    writeln!(f, "{line}").unwrap();
    // Make the mtime change unmistakable on coarse-grained filesystems.
    f.set_modified(SystemTime::now() + Duration::from_secs(10)).unwrap();
}

struct Fixture {
    _dir: TempDir,
    base: PathBuf,
    cache: PathBuf,
    current: PathBuf,
    other: PathBuf,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("claude");
    let cache = dir.path().join("cache");
    let current = base.join("projects").join("-home-me-app").join("current.jsonl");
    let other = base.join("projects").join("-home-me-lib").join("other.jsonl");
    Fixture {
        base,
        cache,
        current,
        other,
        _dir: dir,
    }
}

impl Fixture {
    fn analytics(&self) -> UsageAnalytics {
        UsageAnalytics::new(
            CacheStore::new(&self.cache),
            TranscriptSources::new(vec![self.base.clone()], Some(self.current.clone())),
        )
    }
}

#[test]
fn test_daily_cost_sums_today_across_projects() {
    let fx = fixture();
    let now = Utc::now();
    write_transcript(
        &fx.current,
        &[
            record(now - TimeDelta::days(2), "old", "claude-opus-4-6", 9.0),
            record(now, "a", "claude-opus-4-6", 1.25),
        ],
    );
    write_transcript(&fx.other, &[record(now, "b", "claude-haiku-4-5", 0.5)]);

    let cost = fx.analytics().daily_cost().unwrap();
    assert!((cost - 1.75).abs() < 1e-9);
}

#[test]
fn test_cached_result_tracks_current_transcript_mtime() {
    let fx = fixture();
    let now = Utc::now();
    write_transcript(&fx.current, &[record(now, "a", "claude-opus-4-6", 1.0)]);
    write_transcript(&fx.other, &[record(now, "b", "claude-opus-4-6", 1.0)]);
    let analytics = fx.analytics().with_ttl(Duration::from_secs(60));

    assert!((analytics.daily_cost().unwrap() - 2.0).abs() < 1e-9);

    // Other files are not tracked: the cached value is still served.
    append(&fx.other, &record(now, "c", "claude-opus-4-6", 5.0));
    assert!((analytics.daily_cost().unwrap() - 2.0).abs() < 1e-9);

    // Touching the session transcript invalidates the entry.
    append(&fx.current, &record(now, "d", "claude-opus-4-6", 0.5));
    assert!((analytics.daily_cost().unwrap() - 7.5).abs() < 1e-9);
}

#[test]
fn test_each_aggregate_has_its_own_cache_entry() {
    let fx = fixture();
    let now = Utc::now();
    write_transcript(
        &fx.current,
        &[
            record(now - TimeDelta::hours(2), "a", "claude-sonnet-4-5-20250929", 0.5),
            record(now - TimeDelta::hours(1), "b", "claude-opus-4-6", 0.0),
            record(now, "c", "claude-sonnet-4-5-20250929", 0.5),
        ],
    );
    let analytics = fx.analytics();

    let burn = analytics.burn_rate().unwrap();
    assert!((burn.rate - 0.5).abs() < 1e-6);
    assert_eq!(burn.block.as_ref().unwrap().entries, 3);

    let breakdown = analytics.model_breakdown().unwrap();
    assert_eq!(breakdown[0].display_name, "sonnet4.5");
    assert!((breakdown[0].cost - 1.0).abs() < 1e-9);
    assert_eq!(breakdown[1].display_name, "opus4.6");

    for key in ["burn_rate", "model_breakdown"] {
        assert!(fx.cache.join(format!("{key}.json")).exists(), "{key} not cached");
    }
    assert!(!fx.cache.join("daily_cost.json").exists());
}

#[test]
fn test_duplicate_records_count_once() {
    let fx = fixture();
    let now = Utc::now();
    let line = record(now, "dup", "claude-opus-4-6", 2.0);
    write_transcript(&fx.current, &[line.clone(), line]);
    assert!((fx.analytics().daily_cost().unwrap() - 2.0).abs() < 1e-9);
}

#[test]
fn test_current_transcript_outside_discovery_is_included() {
    let fx = fixture();
    let now = Utc::now();
    let outside = fx.base.parent().unwrap().join("elsewhere").join("session.jsonl");
    write_transcript(&outside, &[record(now, "x", "claude-opus-4-6", 0.25)]);

    let analytics = UsageAnalytics::new(
        CacheStore::new(&fx.cache),
        TranscriptSources::new(vec![fx.base.clone()], Some(outside)),
    );
    assert!((analytics.daily_cost().unwrap() - 0.25).abs() < 1e-9);
}

#[test]
fn test_no_transcripts_is_reported() {
    let fx = fixture();
    let analytics = UsageAnalytics::new(
        CacheStore::new(&fx.cache),
        TranscriptSources::new(vec![fx.base.clone()], None),
    );
    assert!(matches!(analytics.daily_cost(), Err(AnalyticsError::NoTranscripts)));
    assert!(matches!(analytics.burn_rate(), Err(AnalyticsError::NoTranscripts)));
    assert!(matches!(
        analytics.model_breakdown(),
        Err(AnalyticsError::NoTranscripts)
    ));
}

#[test]
fn test_estimated_costs_are_opt_in() {
    let fx = fixture();
    let now = Utc::now();
    let line = format!(
        r#"{{"timestamp":"{}","message":{{"id":"m","model":"claude-sonnet-4-5","usage":{{"input_tokens":1000000,"output_tokens":0}}}}}}"#,
        now.to_rfc3339()
    );
    write_transcript(&fx.current, &[line]);

    assert_eq!(fx.analytics().with_ttl(Duration::ZERO).daily_cost().unwrap(), 0.0);
    let estimated = fx
        .analytics()
        .with_ttl(Duration::ZERO)
        .with_cost_estimation(true)
        .daily_cost()
        .unwrap();
    assert!((estimated - 3.0).abs() < 1e-9);
}
