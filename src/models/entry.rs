use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::null_as_default;

/// Token counts reported for one API response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub input_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub output_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cache_creation_input_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cache_read_input_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

/// One line of a Claude Code JSONL transcript
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "sessionId", default, deserialize_with = "null_as_default")]
    pub session_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
    /// Absent on most modern transcripts; see `pricing::record_cost`.
    #[serde(rename = "costUSD", default)]
    pub cost_usd: Option<f64>,
    #[serde(rename = "requestId", default, deserialize_with = "null_as_default")]
    pub request_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cwd: String,
    #[serde(default)]
    pub message: Option<Message>,
}

impl TranscriptRecord {
    /// A record needs a real timestamp and a message carrying usage.
    pub fn is_valid(&self) -> bool {
        let has_time = self.timestamp.is_some_and(|ts| !is_zero_time(ts));
        let has_usage = self.message.as_ref().is_some_and(|m| m.usage.is_some());
        has_time && has_usage
    }

    /// `message.id|requestId`, or `None` when both parts are empty.
    pub fn dedup_key(&self) -> Option<String> {
        let msg_id = self.message.as_ref().map(|m| m.id.as_str()).unwrap_or("");
        if msg_id.is_empty() && self.request_id.is_empty() {
            return None;
        }
        Some(format!("{}|{}", msg_id, self.request_id))
    }

    pub fn model(&self) -> Option<&str> {
        self.message
            .as_ref()
            .map(|m| m.model.as_str())
            .filter(|m| !m.is_empty())
    }

    pub fn usage(&self) -> Option<&TokenUsage> {
        self.message.as_ref().and_then(|m| m.usage.as_ref())
    }
}

fn is_zero_time(ts: DateTime<Utc>) -> bool {
    ts.timestamp() == 0 || ts.year() <= 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> TranscriptRecord {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn test_parse_full_record() {
        let r = parse(
            r#"{"timestamp":"2025-06-01T12:00:00Z","sessionId":"s1","costUSD":0.25,"requestId":"req_1",
                "message":{"model":"claude-opus-4-6","id":"msg_1","usage":{"input_tokens":10,"output_tokens":20,
                "cache_creation_input_tokens":3,"cache_read_input_tokens":null}}}"#,
        );
        assert!(r.is_valid());
        assert_eq!(r.session_id, "s1");
        assert_eq!(r.cost_usd, Some(0.25));
        assert_eq!(r.model(), Some("claude-opus-4-6"));
        assert_eq!(r.usage().unwrap().input_tokens, 10);
        assert_eq!(r.usage().unwrap().cache_read_input_tokens, 0);
        assert_eq!(r.dedup_key().as_deref(), Some("msg_1|req_1"));
    }

    #[test]
    fn test_invalid_without_usage_or_time() {
        let no_usage = parse(r#"{"timestamp":"2025-06-01T12:00:00Z","message":{"id":"m"}}"#);
        assert!(!no_usage.is_valid());

        let no_message = parse(r#"{"timestamp":"2025-06-01T12:00:00Z"}"#);
        assert!(!no_message.is_valid());

        let no_time = parse(r#"{"message":{"usage":{}}}"#);
        assert!(!no_time.is_valid());

        let zero_time = parse(r#"{"timestamp":"0001-01-01T00:00:00Z","message":{"usage":{}}}"#);
        assert!(!zero_time.is_valid());
    }

    #[test]
    fn test_dedup_key_partial_components() {
        let only_req = parse(r#"{"requestId":"r"}"#);
        assert_eq!(only_req.dedup_key().as_deref(), Some("|r"));

        let only_msg = parse(r#"{"message":{"id":"m"}}"#);
        assert_eq!(only_msg.dedup_key().as_deref(), Some("m|"));

        let neither = parse(r#"{"message":{"id":""}}"#);
        assert_eq!(neither.dedup_key(), None);
    }
}
