use chrono::{TimeZone, Utc};
use serde_json::Value;

use cc_statusline::display::build_json_output;
use cc_statusline::models::ActivityBlock;
use cc_statusline::models::hook::{HookJson, HookModel, HookWorkspace};
use cc_statusline::telemetry::Snapshot;
use cc_statusline::usage::{BurnRate, ModelCost};
use cc_statusline::usage_api::{ExtraUsage, UsageResponse, UsageWindow};

fn hook() -> HookJson {
    HookJson {
        session_id: "s1".to_string(),
        transcript_path: "/tmp/transcript.jsonl".to_string(),
        cwd: None,
        model: Some(HookModel {
            id: "claude-sonnet-4-5".to_string(),
            display_name: "Sonnet 4.5".to_string(),
        }),
        workspace: Some(HookWorkspace {
            current_dir: "/tmp/project".to_string(),
        }),
    }
}

#[test]
fn json_output_shape_full() {
    let start = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
    let snapshot = Snapshot {
        daily_cost: Some(3.13),
        burn_rate: Some(BurnRate {
            rate: 0.5,
            block: Some(ActivityBlock {
                start,
                end: start + chrono::TimeDelta::hours(2),
                entries: 3,
                cost: 1.0,
            }),
        }),
        model_breakdown: Some(vec![ModelCost {
            model: "claude-sonnet-4-5".into(),
            display_name: "sonnet4.5".into(),
            cost: 3.13,
        }]),
        usage: Some(UsageResponse {
            five_hour: Some(UsageWindow {
                utilization: 12.34,
                resets_at: Some("2025-06-01T15:00:00Z".into()),
            }),
            extra_usage: Some(ExtraUsage {
                is_enabled: true,
                monthly_limit_cents: Some(2000),
                used_credits_cents: Some(150),
                utilization: Some(7.5),
            }),
            ..Default::default()
        }),
    };

    let json: Value = build_json_output(&hook(), &snapshot);

    for key in [
        "session_id",
        "transcript_path",
        "model",
        "daily_cost",
        "burn_rate",
        "model_breakdown",
        "usage",
    ] {
        assert!(json.get(key).is_some(), "missing key {key}");
    }

    assert_eq!(json["model"]["id"], "claude-sonnet-4-5");
    assert_eq!(json["daily_cost"], 3.13);
    assert_eq!(json["burn_rate"]["rate_per_hour"], 0.5);
    assert_eq!(json["burn_rate"]["block"]["entries"], 3);
    assert_eq!(json["model_breakdown"][0]["display_name"], "sonnet4.5");
    assert_eq!(json["usage"]["five_hour"]["utilization"], 12.3);
    assert_eq!(
        json["usage"]["five_hour"]["resets_at"],
        "2025-06-01T15:00:00+00:00"
    );
    assert!(json["usage"]["seven_day"].is_null());
    assert_eq!(json["usage"]["extra_usage"]["used_credits_usd"], 1.5);
    assert_eq!(json["usage"]["extra_usage"]["monthly_limit_usd"], 20.0);
}

#[test]
fn json_output_failed_queries_are_null() {
    let json = build_json_output(&hook(), &Snapshot::default());
    assert!(json["daily_cost"].is_null());
    assert!(json["burn_rate"].is_null());
    assert!(json["model_breakdown"].is_null());
    assert!(json["usage"].is_null());
    assert_eq!(json["session_id"], "s1");
}
