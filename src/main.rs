use anyhow::{Context, Result, bail};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use cc_statusline::cache::CacheStore;
use cc_statusline::cli::{Args, Command};
use cc_statusline::credentials::{self, AuthConfig};
use cc_statusline::display::{print_json_output, print_text_output, print_waiting};
use cc_statusline::http::UreqTransport;
use cc_statusline::logging::{self, LogSettings};
use cc_statusline::models::HookJson;
use cc_statusline::telemetry::Telemetry;
use cc_statusline::transcript::TranscriptSources;
use cc_statusline::usage_api::UsageClient;
use cc_statusline::utils::{self, read_stdin};

fn main() -> Result<()> {
    let args = Args::parse();
    let cache = args
        .cache_dir
        .clone()
        .map(CacheStore::new)
        .unwrap_or_else(CacheStore::from_env);
    logging::init(&LogSettings::new(cache.dir(), args.debug));

    match &args.command {
        Some(Command::Auth { status: true, .. }) => auth_status(),
        Some(Command::Auth { token, .. }) => auth_store(token.as_deref()),
        Some(Command::Probe) => probe(),
        None => {
            render(&args, cache);
            Ok(())
        }
    }
}

/// The status line itself. Nothing in here may fail the process.
fn render(args: &Args, cache: CacheStore) {
    let stdin = match read_stdin() {
        Ok(buf) => buf,
        Err(err) => {
            tracing::warn!(error = %err, "failed to read stdin");
            Vec::new()
        }
    };
    if stdin.iter().all(u8::is_ascii_whitespace) {
        print_waiting();
        return;
    }
    let hook: HookJson = match serde_json::from_slice(&stdin) {
        Ok(hook) => hook,
        Err(err) => {
            tracing::warn!(error = %err, "invalid hook payload");
            print_waiting();
            return;
        }
    };

    let mut bases = args
        .claude_config_dir
        .as_deref()
        .map(utils::parse_dir_list)
        .unwrap_or_default();
    for dir in utils::claude_config_dirs() {
        if !bases.contains(&dir) {
            bases.push(dir);
        }
    }
    let sources = TranscriptSources::new(bases, hook.transcript().map(PathBuf::from));

    let mut telemetry = Telemetry::new(cache, sources, AuthConfig::from_env())
        .with_cost_estimation(args.estimate_costs);
    if args.no_usage_api {
        telemetry = telemetry.without_usage_api();
    }
    if args.no_transcripts {
        telemetry = telemetry.without_transcripts();
    }

    let snapshot = telemetry.snapshot();
    if args.debug {
        eprintln!("snapshot: {snapshot:#?}");
    }

    if args.json {
        if let Err(err) = print_json_output(&hook, &snapshot) {
            tracing::warn!(error = %err, "failed to write JSON output");
        }
    } else {
        print_text_output(&hook, &snapshot);
    }
}

fn auth_status() -> Result<()> {
    let token = match credentials::resolve(&AuthConfig::from_env()) {
        Ok(token) => token,
        Err(err) => {
            println!("No credentials found.\nDetails: {err}");
            println!("\nTo authenticate, run: cc-statusline auth");
            return Ok(());
        }
    };

    println!("Source: {}", token.source);
    let Some(expires) = token.expires_at else {
        println!("Status: valid (no expiry info)");
        return Ok(());
    };
    println!(
        "Expires: {}",
        expires
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    if !token.expired {
        println!("Status: valid");
    } else if token.can_refresh() {
        println!("Status: EXPIRED");
        println!("A refresh token is available. The token will be refreshed on next use.");
    } else {
        println!("Status: EXPIRED");
        println!("No refresh token available. Run 'claude auth' to re-authenticate.");
    }
    Ok(())
}

fn auth_store(token: Option<&str>) -> Result<()> {
    let token = match token {
        Some(t) => t.trim().to_string(),
        None => {
            println!("Paste your OAuth access token (press Enter when done):");
            io::stdout().flush().ok();
            let mut line = String::new();
            io::stdin()
                .lock()
                .read_line(&mut line)
                .context("read token from stdin")?;
            line.trim().to_string()
        }
    };
    if token.is_empty() {
        bail!("empty token");
    }

    let path = utils::manual_credentials_path().context("determine config directory")?;
    credentials::store_manual_token(&path, &token).context("write credentials")?;
    println!("Token saved to {}", utils::format_path(&path.to_string_lossy()));
    Ok(())
}

fn probe() -> Result<()> {
    let token = credentials::resolve(&AuthConfig::from_env()).context("finding token")?;
    eprintln!("Using token from: {}", token.source);

    let body = UsageClient::new(UreqTransport, token.access_token)
        .fetch_raw()
        .context("usage API request")?;
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}
