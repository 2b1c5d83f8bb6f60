use chrono::{DateTime, Local, Utc};
use std::env;

#[cfg(feature = "colors")]
use owo_colors::OwoColorize;

// Provide a no-op color shim when "colors" feature is disabled
#[cfg(not(feature = "colors"))]
pub mod color_shim {
    use std::fmt::{self, Display, Formatter};

    #[derive(Clone)]
    pub struct Plain(pub String);

    impl Display for Plain {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    pub trait ColorizeShim {
        fn as_str(&self) -> &str;

        fn bright_black(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn bright_white(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn bright_cyan(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn bright_magenta(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn bright_yellow(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn red(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn yellow(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn green(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn bold(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn dimmed(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn cyan(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
    }

    impl ColorizeShim for &str {
        fn as_str(&self) -> &str {
            self
        }
    }
    impl ColorizeShim for String {
        fn as_str(&self) -> &str {
            self.as_str()
        }
    }
    impl ColorizeShim for Plain {
        fn as_str(&self) -> &str {
            &self.0
        }
    }
}

#[cfg(not(feature = "colors"))]
use color_shim::ColorizeShim as OwoColorize;

use crate::models::HookJson;
use crate::telemetry::Snapshot;
use crate::usage::{BurnRate, ModelCost};
use crate::usage_api::{ExtraUsage, UsageResponse, UsageWindow};
use crate::utils::{format_currency, format_path};

/// Which piece of the line a segment is; drives coloring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Model,
    Cwd,
    DailyCost,
    BurnRate,
    ModelBreakdown,
    FiveHour,
    Weekly,
    ExtraUsage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
    /// Highest utilization shown in the segment, for warning colors
    pub percent: Option<f64>,
}

impl Segment {
    fn new(kind: SegmentKind, text: String) -> Self {
        Self {
            kind,
            text,
            percent: None,
        }
    }

    fn with_percent(mut self, pct: f64) -> Self {
        self.percent = Some(pct);
        self
    }
}

pub fn daily_cost_segment(cost: f64) -> Segment {
    Segment::new(
        SegmentKind::DailyCost,
        format!("${} today", format_currency(cost)),
    )
}

pub fn burn_rate_segment(burn: &BurnRate) -> Segment {
    Segment::new(
        SegmentKind::BurnRate,
        format!("${}/hr", format_currency(burn.rate)),
    )
}

/// `None` when no model has any cost yet
pub fn model_breakdown_segment(models: &[ModelCost]) -> Option<Segment> {
    if models.is_empty() {
        return None;
    }
    let parts: Vec<String> = models
        .iter()
        .map(|m| format!("{}:${}", m.display_name, format_currency(m.cost)))
        .collect();
    Some(Segment::new(SegmentKind::ModelBreakdown, parts.join(" ")))
}

/// `XhYm left`, `Ym left`, `0m left` once past, `--` when unknown
pub fn format_time_remaining(resets_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(reset) = resets_at else {
        return "--".to_string();
    };
    let remaining = (reset - now).num_minutes();
    if remaining <= 0 {
        return "0m left".to_string();
    }
    let (hours, mins) = (remaining / 60, remaining % 60);
    if hours > 0 {
        format!("{hours}h{mins}m left")
    } else {
        format!("{mins}m left")
    }
}

/// `resets Mon 3pm` in local time
pub fn format_reset_time(resets_at: Option<DateTime<Utc>>) -> String {
    match resets_at {
        Some(reset) => {
            let local = reset.with_timezone(&Local);
            format!("resets {}", local.format("%a %-I%P"))
        }
        None => "--".to_string(),
    }
}

pub fn five_hour_segment(window: &UsageWindow, now: DateTime<Utc>) -> Segment {
    let text = format!(
        "5h: {} ({:.0}%)",
        format_time_remaining(window.resets_at_utc(), now),
        window.utilization
    );
    Segment::new(SegmentKind::FiveHour, text).with_percent(window.utilization)
}

/// Sonnet and overall weekly windows; `None` when the response has neither
pub fn weekly_segment(usage: &UsageResponse) -> Option<Segment> {
    let windows = [
        ("sonnet", usage.seven_day_sonnet.as_ref()),
        ("all", usage.seven_day.as_ref()),
    ];
    let mut parts = Vec::new();
    let mut peak: f64 = 0.0;
    for (label, window) in windows {
        let Some(w) = window else { continue };
        peak = peak.max(w.utilization);
        parts.push(format!(
            "{label} {:.0}% ({})",
            w.utilization,
            format_reset_time(w.resets_at_utc())
        ));
    }
    if parts.is_empty() {
        return None;
    }
    Some(Segment::new(SegmentKind::Weekly, format!("wk: {}", parts.join(" / "))).with_percent(peak))
}

pub fn extra_usage_segment(extra: &ExtraUsage) -> Option<Segment> {
    if !extra.is_enabled {
        return None;
    }
    let used = extra.used_credits_usd().unwrap_or(0.0);
    let limit = extra.monthly_limit_usd().unwrap_or(0.0);
    let seg = Segment::new(
        SegmentKind::ExtraUsage,
        format!("extra: ${} / ${}", format_currency(used), format_currency(limit)),
    );
    Some(match extra.utilization {
        Some(pct) => seg.with_percent(pct),
        None => seg,
    })
}

/// Every segment the hook payload and snapshot can fill, in display order.
/// Queries that failed simply contribute nothing.
pub fn text_segments(hook: &HookJson, snapshot: &Snapshot, now: DateTime<Utc>) -> Vec<Segment> {
    let mut segments = Vec::new();

    if let Some(model) = hook.model.as_ref().filter(|m| !m.display_name.is_empty()) {
        segments.push(Segment::new(SegmentKind::Model, model.display_name.clone()));
    }
    let cwd = hook
        .workspace
        .as_ref()
        .map(|w| w.current_dir.as_str())
        .or(hook.cwd.as_deref())
        .filter(|d| !d.is_empty());
    if let Some(cwd) = cwd {
        segments.push(Segment::new(SegmentKind::Cwd, format_path(cwd)));
    }

    if let Some(cost) = snapshot.daily_cost {
        segments.push(daily_cost_segment(cost));
    }
    if let Some(burn) = &snapshot.burn_rate {
        segments.push(burn_rate_segment(burn));
    }
    if let Some(seg) = snapshot
        .model_breakdown
        .as_deref()
        .and_then(model_breakdown_segment)
    {
        segments.push(seg);
    }

    if let Some(usage) = &snapshot.usage {
        if let Some(window) = &usage.five_hour {
            segments.push(five_hour_segment(window, now));
        }
        segments.extend(weekly_segment(usage));
        segments.extend(usage.extra_usage.as_ref().and_then(extra_usage_segment));
    }

    segments
}

fn colorize_percent(text: &str, pct: f64) -> String {
    if pct >= 95.0 {
        text.red().bold().to_string()
    } else if pct >= 80.0 {
        text.yellow().bold().to_string()
    } else {
        text.green().to_string()
    }
}

fn colorize(seg: &Segment, model_id: &str) -> String {
    if env::var("NO_COLOR").is_ok() {
        return seg.text.clone();
    }
    match seg.kind {
        SegmentKind::Model => {
            let lower = model_id.to_lowercase();
            if lower.contains("opus") {
                seg.text.bright_magenta().to_string()
            } else if lower.contains("sonnet") {
                seg.text.bright_yellow().to_string()
            } else if lower.contains("haiku") {
                seg.text.bright_cyan().to_string()
            } else {
                seg.text.bright_white().to_string()
            }
        }
        SegmentKind::Cwd => seg.text.cyan().to_string(),
        SegmentKind::DailyCost | SegmentKind::BurnRate => {
            seg.text.bold().bright_white().to_string()
        }
        SegmentKind::ModelBreakdown => seg.text.bright_black().to_string(),
        SegmentKind::FiveHour | SegmentKind::Weekly | SegmentKind::ExtraUsage => {
            match seg.percent {
                Some(pct) => colorize_percent(&seg.text, pct),
                None => seg.text.clone(),
            }
        }
    }
}

pub fn render_text(hook: &HookJson, snapshot: &Snapshot, now: DateTime<Utc>) -> String {
    let model_id = hook.model.as_ref().map(|m| m.id.as_str()).unwrap_or("");
    let sep = format!(" {} ", "·".bright_black().dimmed());
    text_segments(hook, snapshot, now)
        .iter()
        .map(|s| colorize(s, model_id))
        .collect::<Vec<_>>()
        .join(&sep)
}

pub fn print_text_output(hook: &HookJson, snapshot: &Snapshot) {
    println!("{}", render_text(hook, snapshot, Utc::now()));
}

/// Shown when Claude Code starts the command before it has a payload
pub fn print_waiting() {
    println!(
        "Claude Code\n{} {}",
        "❯".cyan(),
        "[waiting for valid input]".dimmed()
    );
}

fn window_json(window: Option<&UsageWindow>) -> serde_json::Value {
    match window {
        Some(w) => serde_json::json!({
            "utilization": (w.utilization * 10.0).round() / 10.0,
            "resets_at": w.resets_at_utc().map(|d| d.to_rfc3339()),
        }),
        None => serde_json::Value::Null,
    }
}

/// Machine-readable counterpart of [`render_text`]. Keys are always present;
/// failed queries are `null`.
pub fn build_json_output(hook: &HookJson, snapshot: &Snapshot) -> serde_json::Value {
    let usage = snapshot.usage.as_ref().map(|u| {
        serde_json::json!({
            "five_hour": window_json(u.five_hour.as_ref()),
            "seven_day": window_json(u.seven_day.as_ref()),
            "seven_day_sonnet": window_json(u.seven_day_sonnet.as_ref()),
            "seven_day_opus": window_json(u.seven_day_opus.as_ref()),
            "extra_usage": u.extra_usage.as_ref().map(|e| serde_json::json!({
                "is_enabled": e.is_enabled,
                "monthly_limit_usd": e.monthly_limit_usd(),
                "used_credits_usd": e.used_credits_usd(),
                "utilization": e.utilization,
            })),
        })
    });

    let burn_rate = snapshot.burn_rate.as_ref().map(|b| {
        serde_json::json!({
            "rate_per_hour": b.rate,
            "block": b.block.as_ref().map(|blk| serde_json::json!({
                "start": blk.start.to_rfc3339(),
                "end": blk.end.to_rfc3339(),
                "entries": blk.entries,
                "cost": blk.cost,
            })),
        })
    });

    serde_json::json!({
        "session_id": hook.session_id,
        "transcript_path": hook.transcript_path,
        "model": hook.model.as_ref().map(|m| serde_json::json!({
            "id": m.id,
            "display_name": m.display_name,
        })),
        "daily_cost": snapshot.daily_cost,
        "burn_rate": burn_rate,
        "model_breakdown": snapshot.model_breakdown.as_ref().map(|models| {
            models
                .iter()
                .map(|m| serde_json::json!({
                    "model": m.model,
                    "display_name": m.display_name,
                    "cost": m.cost,
                }))
                .collect::<Vec<_>>()
        }),
        "usage": usage,
    })
}

pub fn print_json_output(hook: &HookJson, snapshot: &Snapshot) -> anyhow::Result<()> {
    let json = build_json_output(hook, snapshot);
    println!("{}", serde_json::to_string(&json)?);
    Ok(())
}
