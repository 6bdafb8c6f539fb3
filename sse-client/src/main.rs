use anyhow::Result;
use clap::Parser;
use colored::*;
use sse_client::{ReconnectPolicy, Subscriber, SubscriberConfig};

#[derive(Parser)]
#[command(name = "sse-client")]
#[command(about = "Interactive SSE subscriber for manual testing")]
struct Cli {
    /// Base URL of the backend (e.g., http://localhost:4000)
    #[arg(long)]
    base_url: String,

    /// Identity to connect as
    #[arg(long)]
    user_id: Option<String>,

    /// Optional session grouping key
    #[arg(long)]
    session_id: Option<String>,

    /// Event names to print
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "connected,ping,notification,progress,success,error,update"
    )]
    events: Vec<String>,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    let mut config = SubscriberConfig::new(cli.base_url.clone());
    config.user_id = cli.user_id;
    config.session_id = cli.session_id;
    config.reconnect = Some(ReconnectPolicy::default());

    println!("{} Connecting to {}...", "→".blue(), cli.base_url);
    let subscriber = Subscriber::connect(config)?;

    for event in &cli.events {
        let name = event.clone();
        subscriber.on(event, move |data| {
            println!("{} {}: {}", "←".green(), name.bright_white().bold(), data);
        });
    }

    println!("{} Waiting for events (ctrl-c to exit)...", "→".blue());
    tokio::signal::ctrl_c().await?;

    subscriber.close();
    println!("{}", "Disconnected.".bright_green());
    Ok(())
}
