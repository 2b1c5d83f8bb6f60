//! Diagnostics go to `error.log` in the cache directory, never to stdout,
//! which belongs to the status line. `--debug` mirrors events to stderr.
//!
//! Filtering follows `CC_STATUSLINE_LOG` (an `EnvFilter` directive string),
//! defaulting to `warn`.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::utils;

pub const LOG_ENV_VAR: &str = "CC_STATUSLINE_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";
const LOG_FILE_NAME: &str = "error.log";
/// Logs past this size are truncated before the next run appends
const MAX_LOG_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    /// `None` disables the file log
    pub path: Option<PathBuf>,
    pub debug: bool,
}

impl LogSettings {
    pub fn new(cache_dir: &Path, debug: bool) -> Self {
        Self {
            path: Some(log_path(cache_dir)),
            debug,
        }
    }
}

pub fn log_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(LOG_FILE_NAME)
}

/// Install the global subscriber. Best effort: a log file that can't be
/// opened, or a subscriber already installed, leaves logging off.
pub fn init(settings: &LogSettings) {
    let file_layer = settings
        .path
        .as_deref()
        .and_then(|p| open_log_file(p).ok())
        .map(|file| {
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false)
                .with_filter(env_filter())
        });

    let stderr_layer = settings.debug.then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .with_filter(LevelFilter::DEBUG)
    });

    let _ = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Open for append, 0600, truncating first if the file grew past
/// [`MAX_LOG_BYTES`].
fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        utils::ensure_private_dir(dir)?;
    }
    let oversized = fs::metadata(path)
        .map(|m| m.len() > MAX_LOG_BYTES)
        .unwrap_or(false);

    let mut opts = OpenOptions::new();
    opts.create(true);
    if oversized {
        opts.write(true).truncate(true);
    } else {
        opts.append(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    opts.open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_open_log_file_appends() {
        let dir = TempDir::new().unwrap();
        let path = log_path(&dir.path().join("nested"));
        writeln!(open_log_file(&path).unwrap(), "one").unwrap();
        writeln!(open_log_file(&path).unwrap(), "two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_open_log_file_truncates_oversized() {
        let dir = TempDir::new().unwrap();
        let path = log_path(dir.path());
        fs::write(&path, vec![b'x'; MAX_LOG_BYTES as usize + 1]).unwrap();
        writeln!(open_log_file(&path).unwrap(), "fresh").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_log_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = log_path(dir.path());
        drop(open_log_file(&path).unwrap());
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
