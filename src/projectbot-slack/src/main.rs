//! projectbot - Slack bot binary.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use projectbot_github::{ChannelDirectory, GitHubClient, RequestLimiter};
use projectbot_slack::{
    BotConfig, DispatchOptions, Dispatcher, ProjectBot, SlackWebClient, spawn_channel_refresh,
};

/// GitHub Projects task bot for Slack
#[derive(Parser)]
#[command(name = "projectbot")]
#[command(about = "Answers Slack slash commands with GitHub Projects tasks")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "PROJECTBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    setup_logging(&args.log_level, args.json_logs);

    let config = match BotConfig::from_env(args.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let github = match GitHubClient::with_endpoint(config.github_token(), config.graphql_url.clone()) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create GitHub client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let channels = match config.channel_mapping() {
        Ok(mapping) => Arc::new(ChannelDirectory::new(mapping)),
        Err(e) => {
            error!("Invalid channel mapping: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let web = match SlackWebClient::new(&config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create Slack client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let limiter = Arc::new(RequestLimiter::new(config.rate_limit.clone()));
    let dispatcher = Dispatcher::new(
        Arc::new(github),
        limiter,
        channels.clone(),
        DispatchOptions::from(&config),
    );

    let refresh = match (config.channel_refresh, config.config_path.clone()) {
        (Some(every), Some(path)) => Some(spawn_channel_refresh(
            channels,
            path,
            config.org.clone(),
            every,
        )),
        (Some(_), None) => {
            warn!("Channel refresh requested without a config file, ignoring");
            None
        }
        _ => None,
    };

    info!(org = %config.org, "Starting projectbot");

    let bot = ProjectBot::new(web, dispatcher);
    let outcome = tokio::select! {
        result = bot.start() => result,
        _ = shutdown_signal() => {
            bot.shutdown();
            Ok(())
        }
    };

    if let Some(handle) = refresh {
        handle.abort();
    }

    if let Err(e) = outcome {
        error!("Bot error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Bot stopped");
    ExitCode::SUCCESS
}
