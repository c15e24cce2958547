use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use courier_gateway::{ApiServerBuilder, Config, ViewerClient};

/// Courier - WhatsApp relay gateway with AI auto-replies
#[derive(Parser)]
#[command(name = "courier", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "COURIER_PORT", default_value = "3000")]
    port: u16,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Follow a gateway's conversation in the terminal
    Watch {
        /// Gateway API URL
        #[arg(default_value = "http://localhost:3000")]
        url: String,

        /// Snapshot poll interval in seconds
        #[arg(short, long, default_value = "3")]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Seed environment from .env when present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,courier_gateway=info",
        1 => "info,courier_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(Command::Watch { url, interval }) = cli.command {
        tracing::info!(url = %url, interval, "watching gateway");
        let viewer = ViewerClient::new(&url, Duration::from_secs(interval));
        viewer.run().await?;
        return Ok(());
    }

    let mut config = Config::from_env()?;
    config.port = cli.port;

    let server = ApiServerBuilder::from_config(&config).build();

    tracing::info!(
        port = config.port,
        dispatch = config.twilio.is_some(),
        completion = config.openai.is_some(),
        streaming = config.streaming_replies,
        "starting Courier gateway"
    );
    if let Some(url) = &config.public_webhook_url {
        tracing::info!(webhook = %format!("{url}/webhook/whatsapp"), "configure this URL in the Twilio console");
    }

    server.run().await?;
    Ok(())
}
