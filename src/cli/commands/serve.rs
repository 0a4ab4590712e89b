//! Run the HTTP control surface.

use std::time::Duration;

use anyhow::Context;
use console::style;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::browser::default_launcher;
use crate::config::Settings;
use crate::events::EventBus;
use crate::server::{self, AppState};
use crate::services::ControlPlane;

/// How long shutdown waits for an active run to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub async fn cmd_serve(
    settings: &Settings,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let addr = format!(
        "{}:{}",
        host.as_deref().unwrap_or(&settings.host),
        port.unwrap_or(settings.port)
    );

    let events = EventBus::new(settings.event_buffer);
    let control = ControlPlane::new(settings.worker_config(), default_launcher(), events);
    let state = AppState::new(control.clone()).with_heartbeat(settings.heartbeat);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!(
        "{} Control surface on http://{}",
        style("→").cyan(),
        listener.local_addr().map(|a| a.to_string()).unwrap_or(addr)
    );
    println!("  Output: {}", settings.output_dir.display());

    tokio::select! {
        result = server::serve(listener, state) => {
            result.context("HTTP server error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            if control.stop().is_ok() {
                let mut state_rx = control.watch();
                let finished = tokio::time::timeout(
                    SHUTDOWN_GRACE,
                    state_rx.wait_for(|s| !s.is_active()),
                )
                .await
                .is_ok();
                if !finished {
                    warn!("Run did not stop within {:?}", SHUTDOWN_GRACE);
                }
            }
        }
    }

    Ok(())
}
