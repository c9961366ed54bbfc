//! ARS team chat terminal client.
//!
//! # Usage
//!
//! ```bash
//! export ARS_BACKEND=https://chat.example.com
//! export ARS_USERNAME=alice ARS_ACCESS_TOKEN=... ARS_REFRESH_TOKEN=...
//! ars-chat --team 42
//! ```
//!
//! Chat goes to stdout and logs to stderr, so `2>ars.log` keeps the screen
//! readable.

use std::{io::Write, sync::Arc};

use ars_cli::{Input, TerminalView, input};
use ars_client::{
    AuthClient, Command, HttpConfig, HttpHistory, Runtime, RuntimeConfig, Services, SystemEnv,
    Tokens, WebSocketTransport,
};
use ars_core::ReconnectPolicy;
use ars_proto::{Endpoints, TeamId};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// ARS team chat client
#[derive(Parser, Debug)]
#[command(name = "ars-chat")]
#[command(about = "Terminal client for ARS team chat channels")]
#[command(version)]
struct Args {
    /// Backend base URL (http or https)
    #[arg(long, env = "ARS_BACKEND")]
    backend: String,

    /// Team to open
    #[arg(long)]
    team: String,

    /// Your username, used to mark own messages
    #[arg(long, env = "ARS_USERNAME")]
    username: String,

    /// Access token
    #[arg(long, env = "ARS_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,

    /// Refresh token, used when the backend rejects the access token
    #[arg(long, env = "ARS_REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,

    /// Reconnect attempts after an unexpected close
    #[arg(long)]
    max_reconnect_attempts: Option<u32>,

    /// Stay disconnected after the first close
    #[arg(long, conflicts_with = "max_reconnect_attempts")]
    no_reconnect: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn runtime_config(&self) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        if self.no_reconnect {
            config.session.connection.reconnect = ReconnectPolicy::disabled();
        } else if let Some(attempts) = self.max_reconnect_attempts {
            config.session.connection.reconnect.max_attempts = attempts;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let endpoints = Endpoints::parse(&args.backend)?;
    let tokens = Tokens { access: args.access_token.clone(), refresh: args.refresh_token.clone() };
    let client = Arc::new(AuthClient::new(endpoints.clone(), tokens, &HttpConfig::default())?);

    let services = Services {
        transport: WebSocketTransport::new(),
        history: HttpHistory::new(Arc::clone(&client)),
        tokens: client,
    };
    let view = TerminalView::new(std::io::stdout());

    let (runtime, handle) = Runtime::new(
        SystemEnv::new(),
        services,
        view,
        endpoints,
        args.username.clone(),
        args.runtime_config(),
    );

    tracing::info!(team = %args.team, backend = %args.backend, "ars-chat starting");
    let task = tokio::spawn(runtime.run(TeamId::new(args.team.as_str())));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match input::parse(&line) {
            Input::Command(Command::Shutdown) => break,
            Input::Command(command) => {
                if handle.command(command).await.is_err() {
                    break;
                }
            },
            Input::Hint(hint) => writeln!(std::io::stdout().lock(), "-- {hint}")?,
            Input::Nothing => {},
        }
    }

    // The loop may already be gone if mounting failed; the join reports why
    let _ = handle.shutdown().await;
    task.await??;

    tracing::info!("ars-chat stopped");
    Ok(())
}
