use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct HookModel {
    pub id: String,
    pub display_name: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct HookWorkspace {
    pub current_dir: String,
}

/// Statusline payload Claude Code pipes to stdin. Only the fields the
/// telemetry needs are modelled; the rest are ignored.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct HookJson {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub transcript_path: String,
    pub cwd: Option<String>,
    pub model: Option<HookModel>,
    pub workspace: Option<HookWorkspace>,
}

impl HookJson {
    /// The current session's transcript, if Claude Code reported one
    pub fn transcript(&self) -> Option<&std::path::Path> {
        let p = self.transcript_path.trim();
        (!p.is_empty()).then(|| std::path::Path::new(p))
    }
}
