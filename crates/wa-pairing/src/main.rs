//! WhatsApp pairing command-line front end.
//!
//! Links a WhatsApp account to the dashboard's gateway from a terminal: it
//! starts a pairing session, saves or prints the QR code, and reports the
//! outcome once the phone has scanned it (or the code has expired).
//!
//! # Usage
//!
//! ```text
//! wa-pairing [OPTIONS] <COMMAND>
//!
//! Commands:
//!   pair        Start a pairing session and wait for the phone to scan it
//!   status      Print whether a session is linked
//!   disconnect  Unlink a session
//!
//! Options:
//!   --config <FILE>          Config file [default: platform config dir]
//!   --gateway-url <URL>      Gateway REST base URL
//!   --gateway-token <TOKEN>  Bearer token for the gateway
//!   --poll-interval <SECS>   Seconds between status checks
//!   --max-attempts <N>       Status checks before the code expires
//!   --demo                   Use an offline scripted gateway
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable            | Flag              |
//! |---------------------|-------------------|
//! | `WA_CONFIG`         | `--config`        |
//! | `WA_GATEWAY_URL`    | `--gateway-url`   |
//! | `WA_GATEWAY_TOKEN`  | `--gateway-token` |
//! | `WA_POLL_INTERVAL`  | `--poll-interval` |
//! | `WA_MAX_ATTEMPTS`   | `--max-attempts`  |
//!
//! Flags win over environment variables, which win over the config file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wa_pairing::application::{ConnectionController, ConnectionStatusService};
use wa_pairing::infrastructure::gateway::{HttpGateway, ScriptedGateway};
use wa_pairing::infrastructure::storage::config::{load_config, load_config_from, AppConfig};
use wa_pairing::infrastructure::storage::qr_file::write_pairing_image;
use wa_pairing_core::{
    ConnectionSession, PairingError, PairingGateway, PollingPolicy, SessionId, SessionState,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Link a WhatsApp account through the dashboard's gateway.
#[derive(Debug, Parser)]
#[command(name = "wa-pairing", about = "WhatsApp QR pairing client", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "WA_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Base URL of the gateway REST API (e.g. https://crm.example.com/api).
    #[arg(long, env = "WA_GATEWAY_URL", global = true)]
    gateway_url: Option<String>,

    /// Bearer token sent to the gateway.
    #[arg(long, env = "WA_GATEWAY_TOKEN", hide_env_values = true, global = true)]
    gateway_token: Option<String>,

    /// Seconds between two status checks.
    #[arg(long, env = "WA_POLL_INTERVAL", global = true)]
    poll_interval: Option<u64>,

    /// Status checks before the pairing code expires.
    #[arg(long, env = "WA_MAX_ATTEMPTS", global = true)]
    max_attempts: Option<u32>,

    /// Run against an offline scripted gateway that links on the third check.
    #[arg(long, global = true)]
    demo: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a pairing session and wait until it is linked or expires.
    Pair {
        /// Write the pairing image to this file (PNG for data URLs).
        #[arg(long)]
        qr_out: Option<PathBuf>,

        /// Automatically retry this many times after a timeout or error.
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },
    /// Print whether a session is linked.
    Status { session_id: String },
    /// Unlink a session.
    Disconnect { session_id: String },
}

impl Cli {
    /// Loads the config file and applies flag/env overrides on top.
    fn resolve_config(&self) -> anyhow::Result<AppConfig> {
        let config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => load_config().context("failed to load config")?,
        };
        Ok(self.apply_overrides(config))
    }

    fn apply_overrides(&self, mut config: AppConfig) -> AppConfig {
        if let Some(url) = &self.gateway_url {
            config.gateway.base_url = url.clone();
        }
        if let Some(token) = &self.gateway_token {
            config.gateway.api_token = Some(token.clone());
        }
        if let Some(secs) = self.poll_interval {
            config.polling.interval_secs = secs;
        }
        if let Some(n) = self.max_attempts {
            config.polling.max_attempts = n;
        }
        config
    }

    fn build_gateway(&self, config: &AppConfig) -> anyhow::Result<Arc<dyn PairingGateway>> {
        if self.demo {
            info!("using the offline demo gateway");
            return Ok(Arc::new(ScriptedGateway::new().connect_on_call(3)));
        }
        let gateway = HttpGateway::from_config(&config.gateway)
            .context("failed to initialise the gateway client")?;
        Ok(Arc::new(gateway))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    // `RUST_LOG` wins; otherwise use the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level)),
        )
        .init();

    let gateway = cli.build_gateway(&config)?;

    match cli.command {
        Command::Pair { qr_out, retries } => {
            let policy = config.polling.policy();
            let controller = ConnectionController::new(gateway, policy);
            if !run_pair(controller, qr_out, retries).await? {
                anyhow::bail!("WhatsApp pairing did not complete");
            }
        }
        Command::Status { session_id } => {
            let service = ConnectionStatusService::new(gateway);
            let status = service
                .check(&SessionId::new(session_id))
                .await
                .context("status check failed")?;
            println!("{}", serde_json::to_string(&status)?);
        }
        Command::Disconnect { session_id } => {
            let service = ConnectionStatusService::new(gateway);
            service
                .disconnect(&SessionId::new(session_id))
                .await
                .context("disconnect failed")?;
            println!("disconnected");
        }
    }
    Ok(())
}

// ── Pair command ──────────────────────────────────────────────────────────────

/// Runs the pairing flow, retrying up to `retries` times.  Returns whether
/// the account ended up linked.
async fn run_pair(
    controller: ConnectionController,
    qr_out: Option<PathBuf>,
    retries: u32,
) -> anyhow::Result<bool> {
    let renderer = tokio::spawn(render_snapshots(controller.subscribe(), controller.policy()));

    // Every Ctrl+C closes the current session; the flag also blocks retries.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let closer = controller.clone();
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for Ctrl+C signal: {e}");
                break;
            }
            info!("received Ctrl+C, closing pairing session");
            cancel_tx.send_replace(true);
            closer.close();
        }
    });

    let mut retries_left = retries;
    let mut started = controller.start_session().await;
    let linked = loop {
        let outcome = match &started {
            Ok(session) => {
                if let (Some(path), Some(image)) = (&qr_out, session.pairing_image()) {
                    write_pairing_image(image, path)?;
                    println!("pairing image written to {}", path.display());
                }
                controller.wait_for_terminal().await
            }
            Err(PairingError::Superseded) => None,
            Err(_) => controller.snapshot(),
        };
        println!("{}", outcome_line(outcome.as_ref()));

        let cancelled = *cancel_rx.borrow();
        match next_step(outcome.map(|s| s.state()), retries_left, cancelled) {
            NextStep::Finish(linked) => break linked,
            NextStep::Retry => {
                retries_left -= 1;
                started = controller.retry().await;
            }
        }
    };

    controller.close();
    renderer.abort();
    Ok(linked)
}

/// What `run_pair` does after an attempt ends.
#[derive(Debug, PartialEq, Eq)]
enum NextStep {
    /// Stop; `true` if the account is linked.
    Finish(bool),
    Retry,
}

fn next_step(outcome: Option<SessionState>, retries_left: u32, cancelled: bool) -> NextStep {
    match outcome {
        Some(SessionState::Connected) => NextStep::Finish(true),
        Some(SessionState::Timeout | SessionState::Error) if retries_left > 0 && !cancelled => {
            NextStep::Retry
        }
        _ => NextStep::Finish(false),
    }
}

/// Prints one line per observable change of a session still in progress.
/// The final outcome is printed by `run_pair`, which owns the terminal
/// snapshot.
async fn render_snapshots(
    mut rx: watch::Receiver<Option<ConnectionSession>>,
    policy: PollingPolicy,
) {
    let mut last_state = None;
    while rx.changed().await.is_ok() {
        let Some(session) = rx.borrow_and_update().clone() else {
            continue;
        };
        if let Some(line) = describe(&session, last_state, policy) {
            println!("{line}");
        }
        last_state = Some(session.state());
    }
}

/// Progress line for a snapshot, or `None` if nothing worth printing changed
/// since `previous` or the session has already ended.
fn describe(
    session: &ConnectionSession,
    previous: Option<SessionState>,
    policy: PollingPolicy,
) -> Option<String> {
    let line = match session.state() {
        SessionState::Loading if previous != Some(SessionState::Loading) => {
            "requesting a pairing code...".to_string()
        }
        SessionState::PairingReady if previous != Some(SessionState::PairingReady) => {
            let image = session.pairing_image()?;
            if image.is_data_url() {
                format!(
                    "pairing code ready (image, {} chars); scan it in WhatsApp > Linked devices",
                    image.as_str().len()
                )
            } else {
                format!("pairing code: {image}")
            }
        }
        SessionState::PairingReady => format!(
            "waiting for scan... {}s left",
            policy.remaining(session.attempt()).as_secs()
        ),
        SessionState::Loading
        | SessionState::Connected
        | SessionState::Timeout
        | SessionState::Error => return None,
    };
    Some(line)
}

/// Final line for an attempt.  `None` means the session was closed first.
fn outcome_line(outcome: Option<&ConnectionSession>) -> String {
    match outcome {
        None => "pairing cancelled".to_string(),
        Some(session) => match session.state() {
            SessionState::Connected => "WhatsApp linked".to_string(),
            SessionState::Timeout | SessionState::Error => format!(
                "pairing failed: {}",
                session.last_error().unwrap_or("unknown error")
            ),
            SessionState::Loading | SessionState::PairingReady => {
                format!("pairing stopped while {:?}", session.state())
            }
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
