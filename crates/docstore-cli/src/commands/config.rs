//! Config command handlers

use anyhow::Result;

use docstore_core::Config;

use crate::output::{Output, OutputFormat};

/// Show the effective configuration
pub fn show(config: &Config, output: &Output) -> Result<()> {
    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "database": config.sqlite_path(),
                    "author": config.author,
                    "log_level": config.log_level,
                    "config_file": Config::config_file_path(),
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.sqlite_path().display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  data_dir:  {}", config.data_dir.display());
            println!(
                "  author:    {}",
                config.author.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  log_level: {}",
                config.log_level.as_deref().unwrap_or("(not set)")
            );
            println!();
            println!("Database:    {}", config.sqlite_path().display());
            println!("Config file: {}", Config::config_file_path().display());
        }
    }

    Ok(())
}
