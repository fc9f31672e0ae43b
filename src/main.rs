use anyhow::{Context, Result};
use clap::Parser;
use eve_chatmon::chatlog::ChatMessage;
use eve_chatmon::config::Config;
use eve_chatmon::directory::ChatDirectory;
use eve_chatmon::Monitor;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "eve_chatmon=info";

#[derive(Parser)]
#[command(name = "eve-chatmon")]
#[command(about = "Tail EVE Online chat logs and print new messages")]
struct Cli {
    /// Channels to monitor (default: channels from the config file)
    channels: Vec<String>,

    /// Chat log directory (default: Documents/EVE/logs/Chatlogs)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Seconds between polls
    #[arg(short, long)]
    poll_interval: Option<u64>,

    /// Print one JSON object per message
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("eve_chatmon=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_message(channel: &str, message: &ChatMessage, json: bool) {
    if json {
        let line = serde_json::json!({ "channel": channel, "message": message });
        println!("{}", line);
    } else {
        println!(
            "[{}] {} | {} > {}",
            message.timestamp, channel, message.author, message.body
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("{:#}", e);
        Config::default()
    });

    let dir = cli
        .dir
        .or_else(|| config.chat_dir())
        .context("No chat log directory given and no default could be determined")?;
    let channels = if cli.channels.is_empty() {
        config.channels().to_vec()
    } else {
        cli.channels
    };
    let poll_interval = cli
        .poll_interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.poll_interval());

    if channels.is_empty() {
        let directory = ChatDirectory::open(&dir)
            .with_context(|| format!("Failed to open chat directory: {}", dir.display()))?;
        println!("No channels given. Channels in {}:", dir.display());
        for channel in directory.channels() {
            println!("  {}", channel);
        }
        return Ok(());
    }

    let json = cli.json;
    let mut monitor = Monitor::new(
        channels,
        &dir,
        move |channel: &str, message: &ChatMessage| print_message(channel, message, json),
        poll_interval,
    )
    .with_context(|| format!("Failed to monitor chat directory: {}", dir.display()))?;

    monitor.start()?;
    eprintln!("Monitoring {}. Press Ctrl+C to stop.", monitor.channels().join(", "));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    monitor.stop().await?;
    Ok(())
}
