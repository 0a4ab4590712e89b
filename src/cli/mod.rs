//! Command-line interface.

mod commands;
mod helpers;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Debug, Parser)]
#[command(name = "feedcrawl")]
#[command(about = "Collect posts matching a keyword from the live search feed")]
#[command(version)]
pub struct Cli {
    /// Config file (JSON or TOML); discovered automatically when omitted
    #[arg(long, global = true, env = "FEEDCRAWL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Resolve relative paths against the current directory instead of the
    /// config file's directory
    #[arg(long, global = true)]
    pub cwd: bool,

    /// Directory for tweets.csv and tweets.json
    #[arg(long, global = true, env = "FEEDCRAWL_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Increase log verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP control surface
    Serve {
        /// Bind address (defaults to the configured host)
        #[arg(long)]
        host: Option<String>,

        /// Port (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Crawl once in the foreground and exit
    Scrape {
        /// Search keyword
        #[arg(short, long)]
        keyword: String,

        /// Number of posts to collect
        #[arg(short, long)]
        max: Option<usize>,

        /// Cookie file to inject (defaults to the configured cookie file)
        #[arg(short, long)]
        cookies: Option<PathBuf>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },

    /// Print the effective settings as JSON
    Config,
}

impl Cli {
    /// Whether event lines are printed by the command itself rather than
    /// through the log output.
    pub fn prints_events(&self) -> bool {
        matches!(self.command, Commands::Scrape { .. })
    }
}

/// Run the parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings_with_options(LoadOptions {
        config_path: cli.config.clone(),
        use_cwd: cli.cwd,
        output_dir: cli.output_dir.clone(),
    })
    .await?;

    match cli.command {
        Commands::Serve { host, port } => commands::serve::cmd_serve(&settings, host, port).await,
        Commands::Scrape {
            keyword,
            max,
            cookies,
            headed,
        } => commands::scrape::cmd_scrape(&settings, keyword, max, cookies, headed).await,
        Commands::Config => commands::config::cmd_config(&settings),
    }
}
