//! CLI argument definitions for the Sakhi terminal assistant.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sakhi: a farming assistant you can chat with from the terminal.
#[derive(Parser, Debug)]
#[command(name = "sakhi", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Simulated reply delay in milliseconds.
    #[arg(short = 'd', long = "delay-ms", global = true)]
    pub delay_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Interactive chat session (default).
    Chat,
    /// Print the reply to a single question and exit.
    Ask {
        /// The question; multiple words are joined with spaces.
        #[arg(required = true)]
        text: Vec<String>,
    },
}

impl CliArgs {
    /// The subcommand to run, defaulting to `chat`.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Chat)
    }

    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SAKHI_CONFIG env var > platform default (~/.sakhi/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SAKHI_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the reply delay.
    ///
    /// Priority: --delay-ms flag > SAKHI_REPLY_DELAY_MS env var > config file value.
    pub fn resolve_delay_ms(&self, config_delay_ms: u64) -> u64 {
        if let Some(ms) = self.delay_ms {
            return ms;
        }
        if let Ok(val) = std::env::var("SAKHI_REPLY_DELAY_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                return ms;
            }
        }
        config_delay_ms
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".sakhi").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".sakhi").join("config.toml");
    }
    PathBuf::from("config.toml")
}
