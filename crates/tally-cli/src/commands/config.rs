//! Config command - inspect and initialize configuration

use anyhow::Result;
use clap::Subcommand;

use tally_core::AppConfig;

use super::Context;
use crate::output::print_info;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file if none exists
    Init,
}

pub async fn run(ctx: &Context, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            // Never print the api key in full
            let mut shown = ctx.config.clone();
            if !shown.api_key.is_empty() {
                let prefix: String = shown.api_key.chars().take(6).collect();
                shown.api_key = format!("{}...", prefix);
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        ConfigAction::Path => {
            println!("{}", AppConfig::config_path()?.display());
        }
        ConfigAction::Init => {
            let path = AppConfig::config_path()?;
            if path.exists() {
                print_info(&format!("Config already exists at {}", path.display()), ctx.quiet);
            } else {
                AppConfig::default().save()?;
                print_info(&format!("Wrote default config to {}", path.display()), ctx.quiet);
            }
        }
    }
    Ok(())
}
