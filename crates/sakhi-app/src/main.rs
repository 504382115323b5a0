mod cli;
mod repl;

use clap::Parser;

use sakhi_chat::ResponseEngine;
use sakhi_core::config::SakhiConfig;

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = SakhiConfig::load_or_default(&config_file);
    config.chat.reply_delay_ms = args.resolve_delay_ms(config.chat.reply_delay_ms);
    let log_level = args.resolve_log_level(&config.general.log_level);

    // Tracing. Logs go to stderr so the transcript on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Sakhi v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    match args.command() {
        Command::Ask { text } => {
            let question = text.join(" ");
            let engine = ResponseEngine::new();
            tracing::debug!(topic = ?engine.classify(&question), "Answering one-shot question");
            println!("{}", engine.generate_reply(&question));
        }
        Command::Chat => repl::run(&config).await?,
    }

    Ok(())
}
