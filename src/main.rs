use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use gatekeeper::config::{GatekeeperConfig, LogFormat, LoggingConfig};
use gatekeeper::ratelimit::RateLimiter;

/// Answer admission requests read as JSON lines from stdin.
#[derive(Parser, Debug)]
#[command(name = "gatekeeper", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, overriding the configured level
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

/// A command read from one input line.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command {
    Register {
        client: String,
        region: String,
    },
    Check {
        client: String,
        resource: String,
        #[serde(default)]
        time: Option<DateTime<Utc>>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => GatekeeperConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => GatekeeperConfig::default(),
    };

    init_tracing(&config.logging, &cli);

    info!("Starting Gatekeeper");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let limiter = config
        .build_limiter()
        .context("failed to build rate limiter")?;

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let reply = handle_line(&limiter, &line);
        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;
    }

    info!("Input closed, Gatekeeper stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig, cli: &Cli) {
    let level = cli.log_level.as_deref().unwrap_or(&logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(true);

    if cli.json_logs || logging.format == LogFormat::Json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Execute one input line and render the reply.
fn handle_line(limiter: &RateLimiter, line: &str) -> Value {
    let command = match serde_json::from_str::<Command>(line) {
        Ok(command) => command,
        Err(e) => {
            debug!(error = %e, "Rejected malformed command");
            return json!({ "error": format!("invalid command: {}", e) });
        }
    };

    match command {
        Command::Register { client, region } => {
            limiter.register_client_region(&client, &region);
            json!({ "op": "register", "client": client, "region": region })
        }
        Command::Check {
            client,
            resource,
            time,
        } => {
            let time = time.unwrap_or_else(Utc::now);
            match limiter.can_proceed(&client, &resource, time) {
                Ok(allowed) => json!({ "client": client, "resource": resource, "allowed": allowed }),
                Err(e) => json!({ "client": client, "resource": resource, "error": e.to_string() }),
            }
        }
    }
}
