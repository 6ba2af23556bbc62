//! Slack slash command handling.
//!
//! Supports the following slash commands:
//! - `/project_tasks <number> [status]` - Tasks of a project by number
//! - `/tasks [status]` - Tasks of the project mapped to the channel
//! - `/projects` - The organization's projects
//! - `/help` - Usage
//!
//! Commands arrive over Socket Mode; results go back through the
//! command's `response_url` as delayed responses.

use projectbot_github::{ProjectsError, StatusFilter};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{BotError, SlackError, SlackResult};
use crate::messages::{SlackBlock, SlackMessageContent};

/// Slack slash command payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlashCommandPayload {
    /// Team ID.
    #[serde(default)]
    pub team_id: String,
    /// Channel ID where command was invoked.
    pub channel_id: String,
    /// Channel name.
    #[serde(default)]
    pub channel_name: String,
    /// User ID who invoked the command.
    pub user_id: String,
    /// Username.
    #[serde(default)]
    pub user_name: String,
    /// The command (e.g., "/tasks").
    pub command: String,
    /// Text after the command.
    #[serde(default)]
    pub text: String,
    /// URL for delayed responses.
    pub response_url: String,
    /// Trigger ID for opening modals.
    #[serde(default)]
    pub trigger_id: String,
}

/// Response type for slash command responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Only visible to the user who invoked the command.
    #[default]
    Ephemeral,
    /// Visible to everyone in the channel.
    InChannel,
}

/// Delayed response sent via response_url.
///
/// Can be sent up to 30 minutes after the original command, at most
/// five times per command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelayedResponse {
    /// Response type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
    /// Text content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Block Kit blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<SlackBlock>>,
}

impl DelayedResponse {
    /// Carry a formatted message.
    pub fn from_message(content: SlackMessageContent) -> Self {
        Self {
            text: content.text,
            blocks: content.blocks,
            ..Default::default()
        }
    }

    /// Set response type to in_channel.
    pub fn in_channel(mut self) -> Self {
        self.response_type = Some(ResponseType::InChannel);
        self
    }

    /// Set response type to ephemeral.
    pub fn ephemeral(mut self) -> Self {
        self.response_type = Some(ResponseType::Ephemeral);
        self
    }
}

/// Send a delayed response to the response_url.
pub async fn send_delayed_response(
    client: &reqwest::Client,
    response_url: &str,
    response: &DelayedResponse,
) -> SlackResult<()> {
    debug!("Sending delayed response to: {}", response_url);

    let resp = client.post(response_url).json(response).send().await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        error!("Failed to send delayed response: {} - {}", status, body);
        return Err(SlackError::Api(format!(
            "Failed to send delayed response: {} - {}",
            status, body
        )));
    }

    debug!("Delayed response sent successfully");
    Ok(())
}

/// Who ran a command, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    /// Channel ID where command was invoked.
    pub channel_id: String,
    /// User ID who invoked the command.
    pub user_id: String,
    /// Team ID.
    pub team_id: String,
    /// URL for delayed responses.
    pub response_url: String,
}

impl InvocationContext {
    /// Context for a channel and user, without a response URL.
    pub fn new(channel_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            team_id: String::new(),
            response_url: String::new(),
        }
    }
}

impl From<&SlashCommandPayload> for InvocationContext {
    fn from(payload: &SlashCommandPayload) -> Self {
        Self {
            channel_id: payload.channel_id.clone(),
            user_id: payload.user_id.clone(),
            team_id: payload.team_id.clone(),
            response_url: payload.response_url.clone(),
        }
    }
}

/// A parsed bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Tasks of a project given by number.
    ProjectTasks {
        /// Project number as typed; validated when the reference is built.
        number: i64,
        /// Status filter, if any.
        status: Option<StatusFilter>,
    },
    /// Tasks of the project mapped to the invoking channel.
    Tasks {
        /// Status filter, if any.
        status: Option<StatusFilter>,
    },
    /// The organization's projects.
    Projects,
    /// Usage.
    Help,
}

impl BotCommand {
    /// Command name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            BotCommand::ProjectTasks { .. } => "project_tasks",
            BotCommand::Tasks { .. } => "tasks",
            BotCommand::Projects => "projects",
            BotCommand::Help => "help",
        }
    }
}

const PROJECT_TASKS_USAGE: &str = "Usage: `/project_tasks <number> [status]`, e.g. `/project_tasks 7 in progress`";

/// Quote pairs accepted around a status.
const QUOTES: [(char, char); 4] = [('"', '"'), ('\'', '\''), ('“', '”'), ('‘', '’')];

/// Strip a case-insensitive `prefix` (e.g. `status:`) from `text`.
fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

fn strip_quotes(text: &str) -> &str {
    for (open, close) in QUOTES {
        if let Some(inner) = text.strip_prefix(open).and_then(|t| t.strip_suffix(close)) {
            return inner.trim();
        }
    }
    text
}

/// Parse the optional status argument.
///
/// Accepts a bare status (`in progress`), a quoted one (`"In Progress"`)
/// or a prefixed one (`status:done`, `status="In Review"`).
pub fn parse_status(text: &str) -> Result<Option<StatusFilter>, BotError> {
    let mut text = text.trim();
    for prefix in ["status:", "status="] {
        if let Some(rest) = strip_prefix_ci(text, prefix) {
            text = rest.trim();
            break;
        }
    }
    let text = strip_quotes(text);

    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(text.parse::<StatusFilter>()?))
}

fn parse_project_number(token: &str) -> Result<i64, BotError> {
    let token = strip_prefix_ci(token, "number:").unwrap_or(token);
    let token = token.trim_start_matches('#');
    token.parse::<i64>().map_err(|_| {
        BotError::Projects(ProjectsError::InvalidProjectReference(format!(
            "'{}' is not a project number",
            token
        )))
    })
}

/// Parse a slash command into a [`BotCommand`].
///
/// `command` may be given with or without the leading slash.
pub fn parse_command(command: &str, text: &str) -> Result<BotCommand, BotError> {
    let name = command.trim().trim_start_matches('/').to_lowercase().replace('-', "_");
    let text = text.trim();

    match name.as_str() {
        "project_tasks" => {
            let (first, rest) = match text.split_once(char::is_whitespace) {
                Some((first, rest)) => (first, rest),
                None => (text, ""),
            };
            if first.is_empty() {
                return Err(BotError::InvalidCommand(PROJECT_TASKS_USAGE.to_string()));
            }
            let number = parse_project_number(first)?;
            let status = parse_status(rest)?;
            Ok(BotCommand::ProjectTasks { number, status })
        }
        "tasks" => Ok(BotCommand::Tasks {
            status: parse_status(text)?,
        }),
        "projects" => Ok(BotCommand::Projects),
        "help" => Ok(BotCommand::Help),
        _ => Err(BotError::InvalidCommand(format!(
            "Unknown command `{}`. Try `/help`.",
            command.trim()
        ))),
    }
}
