//! # Credentials Module
//!
//! Resolves the OAuth token used by the usage API. Sources are tried in a
//! fixed order and the first one that yields a non-empty access token wins:
//!
//! 1. `CC_STATUSLINE_TOKEN` environment variable
//! 2. macOS Keychain (`security find-generic-password`), only when a
//!    [`CommandRunner`] is configured
//! 3. `~/.claude/.credentials.json`
//! 4. `~/.config/cc-statusline/auth.json`
//!
//! When every source fails, [`AuthError::NoCredentials`] lists each one with
//! the reason it was rejected.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::http::{HttpTransport, TransportError};
use crate::utils;

pub const TOKEN_ENV_VAR: &str = "CC_STATUSLINE_TOKEN";
pub const REFRESH_ENDPOINT: &str = "https://console.anthropic.com/v1/oauth/token";

const KEYCHAIN_SERVICE: &str = "Claude Code-credentials";
const KEYCHAIN_TIMEOUT: Duration = Duration::from_secs(2);
const REFRESH_TIMEOUT: Duration = Duration::from_secs(5);
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A resolved OAuth token
#[derive(Debug, Clone, PartialEq)]
pub struct TokenResult {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// `None` when the source carried no expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Which source produced the token
    pub source: String,
    pub expired: bool,
}

impl TokenResult {
    fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        source: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let expired = expires_at.is_some_and(|exp| now > exp);
        Self {
            access_token,
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            expires_at,
            source: source.into(),
            expired,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no credentials found: tried {}", .tried.join("; "))]
    NoCredentials { tried: Vec<String> },
    #[error("no refresh token available; run 'claude auth' to re-authenticate")]
    MissingRefreshToken,
    #[error("token refresh failed (HTTP {0}); run 'claude auth' to re-authenticate")]
    RefreshRejected(u16),
    #[error("token refresh request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),
    #[error("credential store error: {0}")]
    Store(#[from] io::Error),
    #[error("credential encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("{program} exited unsuccessfully (code {code:?})")]
    Failed { program: String, code: Option<i32> },
}

/// Runs an external program and captures its stdout
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<Vec<u8>, CommandError>;
}

/// [`CommandRunner`] backed by `std::process`. The child is killed once
/// `timeout` elapses.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Vec<u8>, CommandError> {
        let io_err = |source| CommandError::Io {
            program: program.to_string(),
            source,
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(io_err)?;

        // Drain stdout while the child runs so a full pipe can't stall it.
        let (tx, rx) = mpsc::channel();
        if let Some(mut stdout) = child.stdout.take() {
            thread::spawn(move || {
                let mut out = Vec::new();
                let _ = tx.send(stdout.read_to_end(&mut out).map(|_| out));
            });
        } else {
            let _ = tx.send(Ok(Vec::new()));
        }

        let deadline = Instant::now() + timeout;
        let timed_out = || CommandError::Timeout {
            program: program.to_string(),
            timeout,
        };
        let status = loop {
            match child.try_wait().map_err(io_err)? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(timed_out());
                }
                None => thread::sleep(COMMAND_POLL_INTERVAL),
            }
        };

        // A grandchild may still hold the pipe open; don't wait past the deadline.
        let remaining = deadline.saturating_duration_since(Instant::now());
        let out = match rx.recv_timeout(remaining.max(COMMAND_POLL_INTERVAL)) {
            Ok(read) => read.map_err(io_err)?,
            Err(_) => return Err(timed_out()),
        };
        if !status.success() {
            return Err(CommandError::Failed {
                program: program.to_string(),
                code: status.code(),
            });
        }
        Ok(out)
    }
}

/// Where to look for credentials
pub struct AuthConfig {
    pub token_env_var: String,
    /// `None` skips the keychain step entirely
    pub keychain: Option<Box<dyn CommandRunner>>,
    pub claude_credentials_path: Option<PathBuf>,
    pub manual_credentials_path: Option<PathBuf>,
}

impl AuthConfig {
    /// Standard locations; the keychain is only consulted on macOS.
    pub fn from_env() -> Self {
        let keychain: Option<Box<dyn CommandRunner>> = if cfg!(target_os = "macos") {
            Some(Box::new(SystemCommandRunner))
        } else {
            None
        };
        Self {
            token_env_var: TOKEN_ENV_VAR.to_string(),
            keychain,
            claude_credentials_path: utils::claude_credentials_path(),
            manual_credentials_path: utils::manual_credentials_path(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(rename = "claudeAiOauth", default, skip_serializing_if = "Option::is_none")]
    claude_ai_oauth: Option<OAuthToken>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OAuthToken {
    #[serde(default)]
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    /// Epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
}

/// Outcome of one credential source
enum Attempt {
    Resolved(TokenResult),
    Skipped,
    Unavailable(String),
}

#[derive(Debug, Clone, Copy)]
enum CredentialSource {
    EnvVar,
    Keychain,
    ClaudeCredentialsFile,
    ManualFile,
}

impl CredentialSource {
    const ORDER: [CredentialSource; 4] = [
        CredentialSource::EnvVar,
        CredentialSource::Keychain,
        CredentialSource::ClaudeCredentialsFile,
        CredentialSource::ManualFile,
    ];

    fn label(self, config: &AuthConfig) -> String {
        match self {
            CredentialSource::EnvVar => format!("{} env var", config.token_env_var),
            CredentialSource::Keychain => "macOS Keychain".to_string(),
            CredentialSource::ClaudeCredentialsFile => {
                path_label(config.claude_credentials_path.as_deref(), "~/.claude/.credentials.json")
            }
            CredentialSource::ManualFile => path_label(
                config.manual_credentials_path.as_deref(),
                "~/.config/cc-statusline/auth.json",
            ),
        }
    }

    fn attempt(self, config: &AuthConfig, now: DateTime<Utc>) -> Attempt {
        match self {
            CredentialSource::EnvVar => match env::var(&config.token_env_var) {
                Ok(t) if !t.trim().is_empty() => Attempt::Resolved(TokenResult::new(
                    t.trim().to_string(),
                    None,
                    None,
                    config.token_env_var.clone(),
                    now,
                )),
                _ => Attempt::Unavailable("not set".to_string()),
            },
            CredentialSource::Keychain => match &config.keychain {
                None => Attempt::Skipped,
                Some(runner) => read_keychain(runner.as_ref(), now),
            },
            CredentialSource::ClaudeCredentialsFile | CredentialSource::ManualFile => {
                let path = match self {
                    CredentialSource::ClaudeCredentialsFile => &config.claude_credentials_path,
                    _ => &config.manual_credentials_path,
                };
                match path {
                    None => Attempt::Unavailable("home directory unknown".to_string()),
                    Some(p) => read_credentials_file(p, &self.label(config), now),
                }
            }
        }
    }
}

fn path_label(path: Option<&Path>, fallback: &str) -> String {
    path.map(|p| utils::format_path(&p.to_string_lossy()))
        .unwrap_or_else(|| fallback.to_string())
}

/// Resolve a token from the first source that has one.
pub fn resolve(config: &AuthConfig) -> Result<TokenResult, AuthError> {
    resolve_at(config, Utc::now())
}

pub fn resolve_at(config: &AuthConfig, now: DateTime<Utc>) -> Result<TokenResult, AuthError> {
    let mut tried = Vec::new();
    for source in CredentialSource::ORDER {
        match source.attempt(config, now) {
            Attempt::Resolved(token) => {
                tracing::debug!(
                    source = %token.source,
                    expired = token.expired,
                    "resolved OAuth token"
                );
                return Ok(token);
            }
            Attempt::Skipped => {}
            Attempt::Unavailable(reason) => {
                tried.push(format!("{}: {}", source.label(config), reason));
            }
        }
    }
    Err(AuthError::NoCredentials { tried })
}

/// Keychain service name; Claude Code suffixes it with a hash of a custom
/// config dir.
pub fn keychain_service_name(config_dir: Option<&str>) -> String {
    match config_dir.map(str::trim).filter(|d| !d.is_empty()) {
        Some(dir) => {
            let hash = Sha256::digest(dir.as_bytes());
            let hex = format!("{hash:x}");
            format!("{KEYCHAIN_SERVICE}-{}", &hex[..8])
        }
        None => KEYCHAIN_SERVICE.to_string(),
    }
}

fn read_keychain(runner: &dyn CommandRunner, now: DateTime<Utc>) -> Attempt {
    let service = keychain_service_name(env::var("CLAUDE_CONFIG_DIR").ok().as_deref());
    let user = env::var("USER").ok().filter(|u| !u.is_empty());

    let mut args = vec!["find-generic-password", "-s", service.as_str()];
    if let Some(user) = user.as_deref() {
        args.extend(["-a", user]);
    }
    args.push("-w");

    match runner.run("security", &args, KEYCHAIN_TIMEOUT) {
        Ok(out) => {
            let raw = String::from_utf8_lossy(&out);
            match parse_credentials(raw.trim(), "macOS Keychain", now) {
                Ok(token) => Attempt::Resolved(token),
                Err(reason) => Attempt::Unavailable(reason),
            }
        }
        Err(err) => Attempt::Unavailable(format!("keychain read: {err}")),
    }
}

fn read_credentials_file(path: &Path, source: &str, now: DateTime<Utc>) -> Attempt {
    match fs::read_to_string(path) {
        Ok(raw) => match parse_credentials(&raw, source, now) {
            Ok(token) => Attempt::Resolved(token),
            Err(reason) => Attempt::Unavailable(reason),
        },
        Err(err) => Attempt::Unavailable(err.to_string()),
    }
}

/// Parse a `{"claudeAiOauth": {...}}` document.
fn parse_credentials(raw: &str, source: &str, now: DateTime<Utc>) -> Result<TokenResult, String> {
    let creds: StoredCredentials =
        serde_json::from_str(raw).map_err(|e| format!("parse: {e}"))?;
    let oauth = creds
        .claude_ai_oauth
        .filter(|o| !o.access_token.trim().is_empty())
        .ok_or_else(|| "no OAuth token found".to_string())?;

    let expires_at = oauth
        .expires_at
        .filter(|ms| *ms > 0)
        .and_then(DateTime::from_timestamp_millis);
    Ok(TokenResult::new(
        oauth.access_token.trim().to_string(),
        oauth.refresh_token,
        expires_at,
        source,
        now,
    ))
}

/// Write a token to a credential file in the `claudeAiOauth` layout
/// (0600, atomic replace).
pub fn store_credentials(path: &Path, token: &TokenResult) -> Result<(), AuthError> {
    let creds = StoredCredentials {
        claude_ai_oauth: Some(OAuthToken {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token.expires_at.map(|t| t.timestamp_millis()),
        }),
    };
    let data = serde_json::to_vec_pretty(&creds)?;
    utils::write_private_file(path, &data)?;
    Ok(())
}

/// Save a pasted access token with no refresh token or expiry
pub fn store_manual_token(path: &Path, access_token: &str) -> Result<(), AuthError> {
    let token = TokenResult::new(
        access_token.trim().to_string(),
        None,
        None,
        "manual",
        Utc::now(),
    );
    store_credentials(path, &token)
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Exchanges a refresh token for a new access token and caches the result
/// in the manual credential file. Claude Code's own stores are never written.
pub struct TokenRefresher<T: HttpTransport> {
    transport: T,
    endpoint: String,
    store_path: Option<PathBuf>,
}

impl<T: HttpTransport> TokenRefresher<T> {
    pub fn new(transport: T, store_path: Option<PathBuf>) -> Self {
        Self {
            transport,
            endpoint: REFRESH_ENDPOINT.to_string(),
            store_path,
        }
    }

    pub fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenResult, AuthError> {
        let refresh_token = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingRefreshToken)?;
        let body = json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        });
        let reply = self
            .transport
            .post_json(&self.endpoint, &body, REFRESH_TIMEOUT)?;
        if reply.status != 200 {
            tracing::warn!(
                status = reply.status,
                "token refresh failed; run 'claude auth' to re-authenticate"
            );
            return Err(AuthError::RefreshRejected(reply.status));
        }

        let parsed: RefreshResponse = serde_json::from_str(&reply.body)
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        if parsed.access_token.is_empty() {
            return Err(AuthError::InvalidResponse(
                "empty access token in refresh response".to_string(),
            ));
        }

        let now = Utc::now();
        let expires_at = parsed
            .expires_in
            .filter(|secs| *secs > 0)
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl));
        let token = TokenResult::new(
            parsed.access_token,
            parsed.refresh_token,
            expires_at,
            "token refresh",
            now,
        );

        if let Some(path) = &self.store_path {
            if let Err(err) = store_credentials(path, &token) {
                tracing::warn!(error = %err, "failed to cache refreshed token");
            }
        }
        Ok(token)
    }
}

/// Swap an expired token for a refreshed one when possible. Refresh failures
/// are logged and the original token is kept.
pub fn ensure_fresh<T: HttpTransport>(
    token: TokenResult,
    refresher: &TokenRefresher<T>,
) -> TokenResult {
    if !token.expired || !token.can_refresh() {
        return token;
    }
    match refresher.refresh(token.refresh_token.as_deref()) {
        Ok(fresh) => fresh,
        Err(err) => {
            tracing::warn!(error = %err, "usage API token refresh failed");
            token
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credentials_with_expiry() {
        let now = Utc::now();
        let future = (now + TimeDelta::hours(1)).timestamp_millis();
        let raw = format!(
            r#"{{"claudeAiOauth":{{"accessToken":"tok","refreshToken":"ref","expiresAt":{future},"scopes":["user:inference"]}}}}"#
        );
        let t = parse_credentials(&raw, "test", now).unwrap();
        assert_eq!(t.access_token, "tok");
        assert_eq!(t.refresh_token.as_deref(), Some("ref"));
        assert!(!t.expired);
        assert_eq!(t.expires_at.unwrap().timestamp_millis(), future);
    }

    #[test]
    fn test_parse_credentials_expired() {
        let now = Utc::now();
        let past = (now - TimeDelta::minutes(1)).timestamp_millis();
        let raw = format!(r#"{{"claudeAiOauth":{{"accessToken":"tok","expiresAt":{past}}}}}"#);
        let t = parse_credentials(&raw, "test", now).unwrap();
        assert!(t.expired);
        assert!(!t.can_refresh());
    }

    #[test]
    fn test_parse_credentials_zero_expiry_never_expires() {
        let raw = r#"{"claudeAiOauth":{"accessToken":"tok","expiresAt":0}}"#;
        let t = parse_credentials(raw, "test", Utc::now()).unwrap();
        assert!(t.expires_at.is_none());
        assert!(!t.expired);
    }

    #[test]
    fn test_parse_credentials_rejects_empty_token() {
        let empty = r#"{"claudeAiOauth":{"accessToken":""}}"#;
        assert!(parse_credentials(empty, "t", Utc::now()).is_err());
        assert!(parse_credentials(r#"{}"#, "t", Utc::now()).is_err());
        let err = parse_credentials("nope", "t", Utc::now()).unwrap_err();
        assert!(err.starts_with("parse:"));
    }

    #[test]
    fn test_keychain_service_name() {
        assert_eq!(keychain_service_name(None), "Claude Code-credentials");
        assert_eq!(keychain_service_name(Some("  ")), "Claude Code-credentials");
        let hashed = keychain_service_name(Some("/home/me/.claude-work"));
        assert!(hashed.starts_with("Claude Code-credentials-"));
        assert_eq!(hashed.len(), "Claude Code-credentials-".len() + 8);
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_stdout() {
        let out = SystemCommandRunner
            .run("sh", &["-c", "printf hello"], Duration::from_secs(5))
            .unwrap();
        assert_eq!(out, b"hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_reports_failure_and_timeout() {
        let err = SystemCommandRunner
            .run("sh", &["-c", "exit 3"], Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, CommandError::Failed { code: Some(3), .. }));

        let err = SystemCommandRunner
            .run("sleep", &["5"], Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_reads_output_larger_than_pipe_buffer() {
        let out = SystemCommandRunner
            .run("sh", &["-c", "head -c 262144 /dev/zero"], Duration::from_secs(5))
            .unwrap();
        assert_eq!(out.len(), 262_144);
    }
}
