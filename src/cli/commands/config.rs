//! Print the effective settings.

use crate::config::Settings;

pub fn cmd_config(settings: &Settings) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&settings.to_config())?);
    Ok(())
}
