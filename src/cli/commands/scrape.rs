//! One-shot crawl in the foreground.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use super::super::helpers::{format_event, truncate};
use crate::browser::default_launcher;
use crate::config::Settings;
use crate::events::{Delivery, EventBus, Level};
use crate::models::load_cookie_file;
use crate::repository::{csv_path, json_path};
use crate::services::{ControlPlane, RunState, StartRequest};

/// Poll timeout used to flush events left after the run ends.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

pub async fn cmd_scrape(
    settings: &Settings,
    keyword: String,
    max: Option<usize>,
    cookies: Option<PathBuf>,
    headed: bool,
) -> anyhow::Result<()> {
    let mut settings = settings.clone();
    if headed {
        settings.headless = false;
    }

    let cookies = match cookies {
        Some(path) => Some(
            load_cookie_file(&path)
                .ok_or_else(|| anyhow!("Could not load cookies from {}", path.display()))?,
        ),
        None => None,
    };

    let events = EventBus::new(settings.event_buffer);
    let control = ControlPlane::new(settings.worker_config(), default_launcher(), events.clone());
    let mut subscription = events.subscribe();
    let mut state_rx = control.watch();

    let run = control.start(StartRequest {
        keyword,
        max_tweets: max,
        cookies,
    })?;

    let progress = ProgressBar::new(run.target_count as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    progress.set_message(truncate(&run.keyword, 30));
    progress.enable_steady_tick(Duration::from_millis(120));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stop_requested = false;

    loop {
        tokio::select! {
            delivery = subscription.poll(settings.heartbeat) => match delivery {
                Some(Delivery::Event(event)) => {
                    if event.level != Level::Debug {
                        progress.println(format_event(&event));
                    }
                    progress.set_position(run.collected() as u64);
                }
                Some(Delivery::Heartbeat) => {}
                None => break,
            },
            _ = &mut ctrl_c, if !stop_requested => {
                stop_requested = true;
                progress.println(format!("{} Stopping...", style("!").yellow()));
                control.stop().ok();
            }
            changed = state_rx.changed() => {
                if changed.is_err() || !state_rx.borrow().is_active() {
                    break;
                }
            }
        }
    }

    while let Some(Delivery::Event(event)) = subscription.poll(DRAIN_TIMEOUT).await {
        if event.level != Level::Debug {
            progress.println(format_event(&event));
        }
    }
    progress.set_position(run.collected() as u64);
    progress.finish_and_clear();

    let state = control.status().state;
    println!(
        "\n{} {} posts collected for '{}' ({})",
        match state {
            RunState::Completed => style("✓").green(),
            RunState::Stopped => style("■").yellow(),
            _ => style("✗").red(),
        },
        run.collected(),
        run.keyword,
        state.as_str()
    );
    println!("  CSV:  {}", csv_path(&settings.output_dir).display());
    println!("  JSON: {}", json_path(&settings.output_dir).display());

    if state == RunState::Failed {
        bail!("Scrape failed");
    }
    Ok(())
}
