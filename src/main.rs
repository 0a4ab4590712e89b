//! feedcrawl: keyword feed crawler with a live control surface.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use feedcrawl::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.prints_events());

    cli::run(cli).await
}

fn init_logging(verbose: u8, prints_events: bool) {
    let default = match verbose {
        0 => "feedcrawl=info",
        1 => "feedcrawl=debug",
        _ => "feedcrawl=trace",
    };
    // Commands that print the event stream themselves keep it out of the log
    let default = if prints_events {
        format!("{},feedcrawl::events=off", default)
    } else {
        default.to_string()
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
