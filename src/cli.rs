use clap::ArgAction;
use clap::builder::BoolishValueParser;
use std::path::PathBuf;

#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Save an OAuth token for the usage API, or report the active one
    Auth {
        /// Show which credential source is in use and whether it has expired
        #[arg(long)]
        status: bool,
        /// Token to store; read from stdin when omitted
        #[arg(long, conflicts_with = "status")]
        token: Option<String>,
    },
    /// Fetch the usage API once, bypassing the cache, and print the raw JSON
    Probe,
}

#[derive(clap::Parser, Debug)]
#[command(
    name = "cc-statusline",
    version,
    about = "Cost and usage telemetry for the Claude Code status line"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Claude data path(s), comma-separated, scanned before $XDG_CONFIG_HOME/claude and ~/.claude
    #[arg(long, env = "CLAUDE_CONFIG_DIR", global = true)]
    pub claude_config_dir: Option<String>,

    /// Cache directory (default: platform cache dir + /cc-statusline)
    #[arg(long, env = "CC_STATUSLINE_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Emit JSON instead of colored text
    #[arg(long)]
    pub json: bool,

    /// Skip the usage API (5h / weekly / extra usage segments)
    #[arg(long)]
    pub no_usage_api: bool,

    /// Skip transcript analytics (daily cost, burn rate, model breakdown)
    #[arg(long)]
    pub no_transcripts: bool,

    /// Price records without costUSD from their token counts
    #[arg(
        long,
        env = "CC_STATUSLINE_ESTIMATE_COSTS",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub estimate_costs: bool,

    /// Debug mode: mirror diagnostics to stderr
    #[arg(
        long,
        env = "CC_STATUSLINE_DEBUG",
        global = true,
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub debug: bool,
}

impl Args {
    pub fn parse() -> Self {
        <Args as clap::Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    #[test]
    fn test_default_is_render() {
        let args = Args::try_parse_from(["cc-statusline", "--json"]).unwrap();
        assert!(args.command.is_none());
        assert!(args.json);
        assert!(!args.no_usage_api);
    }

    #[test]
    fn test_auth_subcommand() {
        let args = Args::try_parse_from(["cc-statusline", "auth", "--status"]).unwrap();
        assert_eq!(
            args.command,
            Some(Command::Auth {
                status: true,
                token: None
            })
        );
        let both = ["cc-statusline", "auth", "--status", "--token", "x"];
        assert!(Args::try_parse_from(both).is_err());
    }

    #[test]
    fn test_probe_subcommand() {
        let args = Args::try_parse_from(["cc-statusline", "probe", "--debug"]).unwrap();
        assert_eq!(args.command, Some(Command::Probe));
        assert!(args.debug);
    }

    #[test]
    #[serial]
    fn test_env_flags_accept_boolish_values() {
        let cases = [("1", true), ("yes", true), ("on", true), ("0", false), ("off", false)];
        for (raw, expected) in cases {
            unsafe {
                std::env::set_var("CC_STATUSLINE_DEBUG", raw);
                std::env::set_var("CC_STATUSLINE_ESTIMATE_COSTS", raw);
            }
            let parsed = Args::try_parse_from(["cc-statusline"]);
            unsafe {
                std::env::remove_var("CC_STATUSLINE_DEBUG");
                std::env::remove_var("CC_STATUSLINE_ESTIMATE_COSTS");
            }
            let args = parsed.unwrap();
            assert_eq!(args.debug, expected, "CC_STATUSLINE_DEBUG={raw}");
            assert_eq!(args.estimate_costs, expected, "CC_STATUSLINE_ESTIMATE_COSTS={raw}");
        }
    }
}
