mod config;
mod logger;
mod replay;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use config::AppConfig;
use replay::CallDump;

/// Replays a recorded call and explains why its connectivity checks
/// succeeded or failed.
#[derive(Parser, Debug)]
#[command(name = "peerlink", version)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long, default_value = "peerlink.toml")]
    config: PathBuf,

    /// Print the full session snapshot as JSON instead of the event log.
    #[arg(long)]
    json: bool,

    /// Recorded call dump (JSON).
    dump: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match AppConfig::load(&args.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{}, using default configuration", err);
            AppConfig::default()
        }
    };
    logger::init(&config)?;

    let dump = CallDump::load(&args.dump)?;
    let snapshot = replay::replay(dump, &config)
        .await
        .with_context(|| format!("replay of {} failed", args.dump.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        for event in &snapshot.events {
            println!("[{:<5}] {}", event.category, event.text);
        }
    }

    Ok(())
}
