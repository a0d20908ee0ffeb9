//! Demo bot: wires a few commands and a service into a terrapin session.
//!
//! The session engine lives in terrapin-sdk; this binary only supplies
//! connection parameters and registers extensions before starting the loop.
//!
//!   terrapin-bots --server irc.example.net:6667 --nick shelly \
//!     --channel "#bots" --admin-password sekrit

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rand::Rng;
use terrapin_sdk::{ConnectConfig, Session};

#[derive(Parser)]
#[command(name = "terrapin-bots", about = "Demo IRC bot on terrapin-sdk")]
struct Args {
    /// IRC server address (host:port)
    #[arg(long, default_value = "127.0.0.1:6667")]
    server: String,

    /// Bot nick
    #[arg(long, default_value = "shelly")]
    nick: String,

    /// Channel to join after registration
    #[arg(long)]
    channel: Option<String>,

    /// Password gating admin commands (or set TERRAPIN_ADMIN_PASSWORD)
    #[arg(long, env = "TERRAPIN_ADMIN_PASSWORD", default_value = "r00t")]
    admin_password: String,

    /// Transcript log for raw inbound lines
    #[arg(long)]
    log: Option<PathBuf>,

    /// Echo all traffic at debug level
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "terrapin_bots=info,terrapin_sdk=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut session = Session::new(ConnectConfig {
        server_addr: args.server.clone(),
        nick: args.nick.clone(),
        realname: "terrapin demo bot".to_string(),
        admin_password: args.admin_password,
        default_channel: args.channel.clone(),
        log_path: args.log,
        verbose: args.verbose,
        ..Default::default()
    });

    session.register_command("echo", |args| {
        if args.is_empty() {
            None
        } else {
            Some(args.join(" "))
        }
    });

    session.register_command("roll", |args| {
        let sides: u32 = args
            .first()
            .and_then(|s| s.parse().ok())
            .filter(|&n| n >= 2)
            .unwrap_or(6);
        let roll = rand::thread_rng().gen_range(1..=sides);
        Some(format!("rolled {roll} (d{sides})"))
    });

    // Reports roughly every thousand loop iterations; slot 0 carries the
    // iteration count across ticks.
    session.register_service("uptime", 1, |state| {
        state.slots[0] += 1;
        if state.slots[0] % 1000 == 0 {
            let secs = chrono::Utc::now().timestamp() - state.created_at;
            Some(format!("up for {secs}s"))
        } else {
            None
        }
    });

    tracing::info!(
        server = %args.server,
        nick = %args.nick,
        channel = args.channel.as_deref().unwrap_or("-"),
        "starting terrapin session"
    );

    session.run().await?;
    tracing::info!("session ended");
    Ok(())
}
