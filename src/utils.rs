use serde::{Deserialize, Deserializer};
use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

pub const APP_DIR_NAME: &str = "cc-statusline";

#[cfg(unix)]
const PRIVATE_DIR_MODE: u32 = 0o700;
#[cfg(unix)]
const PRIVATE_FILE_MODE: u32 = 0o600;

fn base_dirs() -> Option<directories::BaseDirs> {
    directories::BaseDirs::new()
}

pub fn home_dir() -> Option<PathBuf> {
    base_dirs().map(|b| b.home_dir().to_path_buf())
}

/// Candidate Claude data directories, in discovery priority order.
///
/// `CLAUDE_CONFIG_DIR` may hold a comma-separated list. Duplicates are dropped
/// so a directory reachable through two variables is only scanned once.
pub fn claude_config_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    let mut push = |p: PathBuf| {
        if !dirs.contains(&p) {
            dirs.push(p);
        }
    };

    if let Ok(list) = env::var("CLAUDE_CONFIG_DIR") {
        for p in parse_dir_list(&list) {
            push(p);
        }
    }
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let xdg = xdg.trim();
        if !xdg.is_empty() {
            push(PathBuf::from(xdg).join("claude"));
        }
    }
    if let Some(home) = home_dir() {
        push(home.join(".claude"));
    }
    dirs
}

/// Split a comma-separated directory list, dropping empty items.
pub fn parse_dir_list(list: &str) -> Vec<PathBuf> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Process-wide cache directory. `CC_STATUSLINE_CACHE_DIR` wins, then the
/// platform cache dir, then the temp dir.
pub fn cache_dir() -> PathBuf {
    if let Ok(custom) = env::var("CC_STATUSLINE_CACHE_DIR") {
        let custom = custom.trim();
        if !custom.is_empty() {
            return PathBuf::from(custom);
        }
    }
    match base_dirs() {
        Some(b) => b.cache_dir().join(APP_DIR_NAME),
        None => env::temp_dir().join(APP_DIR_NAME),
    }
}

/// `~/.config/cc-statusline/auth.json` (platform config dir).
pub fn manual_credentials_path() -> Option<PathBuf> {
    base_dirs().map(|b| b.config_dir().join(APP_DIR_NAME).join("auth.json"))
}

/// `~/.claude/.credentials.json`
pub fn claude_credentials_path() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".claude").join(".credentials.json"))
}

pub fn read_stdin() -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    io::stdin().read_to_end(&mut buf)?;
    Ok(buf)
}

pub fn format_path(p: &str) -> String {
    if let Some(home) = home_dir() {
        let home_s = home.to_string_lossy();
        if p.starts_with(&*home_s) {
            return format!("~{}", &p[home_s.len()..]);
        }
    }
    p.to_owned()
}

pub fn format_currency(v: f64) -> String {
    format!("{v:.2}")
}

/// Create `dir` (and parents) readable only by the owning user.
pub fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(PRIVATE_DIR_MODE);
    }
    builder.create(dir)
}

/// Write `bytes` to `dst` through a temp file in the same directory and an
/// atomic rename. Readers see either the old file or the complete new one.
/// The temp file is removed if any step fails.
pub fn write_private_file(dst: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match dst.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    ensure_private_dir(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".cache-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(PRIVATE_FILE_MODE))?;
    }
    tmp.as_file().sync_all()?;
    // PersistError hands the temp file back; dropping it deletes it.
    tmp.persist(dst).map_err(|e| e.error)?;
    Ok(())
}

/// Deserialize `null` the same as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
