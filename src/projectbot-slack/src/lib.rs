//! Slack front end for projectbot.
//!
//! This crate answers slash commands with task listings pulled from
//! GitHub Projects:
//! - `/project_tasks <number> [status]` lists one project's tasks
//! - `/tasks [status]` lists the project linked to the current channel
//! - `/projects` lists the organization's projects
//! - `/help` explains the commands
//!
//! # Architecture
//!
//! The `ProjectBot` holds a Socket Mode connection, acknowledges every
//! envelope and hands slash commands to a [`Dispatcher`]. The dispatcher
//! resolves the project, fetches and normalizes its items through
//! `projectbot_github`, and renders Slack-sized pages, all under a
//! per-invocation timeout.
//!
//! # Example
//!
//! ```rust,ignore
//! use projectbot_slack::{BotConfig, ProjectBot, SlackWebClient};
//!
//! let config = BotConfig::from_env(None)?;
//! let web = SlackWebClient::new(&config)?;
//! let bot = ProjectBot::new(web, dispatcher);
//! bot.start().await?;
//! ```
//!
//! # Configuration
//!
//! Required environment variables:
//! - `SLACK_BOT_TOKEN` - Bot OAuth token (xoxb-...)
//! - `SLACK_APP_TOKEN` - App-level token for Socket Mode (xapp-...)
//! - `GITHUB_TOKEN` - Token with read access to organization projects
//! - `GITHUB_ORG` - Organization login (or `org` in the config file)
//!
//! Optional:
//! - `PROJECTBOT_CONFIG` - TOML file with channel links and limits
//! - `GITHUB_GRAPHQL_URL` - GraphQL endpoint override

pub mod bot;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod messages;

// Re-export main types
pub use bot::{BotOptions, ProjectBot, SlackWebClient, handle_slash_command};
pub use commands::{BotCommand, InvocationContext, SlashCommandPayload, parse_command};
pub use config::{BotConfig, FileConfig, spawn_channel_refresh};
pub use dispatch::{DispatchOptions, Dispatcher};
pub use error::{BotError, SlackError, SlackResult};
pub use events::{SocketEvent, SocketModeEnvelope};
pub use messages::{PageContext, PageLimits, RenderedPage, SlackMessageBuilder, format_task_pages};
