//! Error types for the Slack front end.
//!
//! [`SlackError`] covers the Slack transport (Web API, Socket Mode).
//! [`BotError`] is what a command invocation fails with, and knows how to
//! phrase itself for the person who ran the command.

use std::time::Duration;

use projectbot_github::ProjectsError;
use thiserror::Error;
use tracing::error;

/// Errors that can occur during Slack operations.
#[derive(Error, Debug)]
pub enum SlackError {
    /// Configuration error (missing or invalid config).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication error (invalid token, expired, etc.).
    #[error("Authentication error: {0}")]
    Auth(String),

    /// API request failed.
    #[error("Slack API error: {0}")]
    Api(String),

    /// API rate limited.
    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// WebSocket connection error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Channel not found or bot not in channel.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Invalid payload received from Slack.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for SlackError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SlackError::Timeout(err.to_string())
        } else if err.is_connect() {
            SlackError::Network(format!("Connection failed: {}", err))
        } else {
            SlackError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SlackError {
    fn from(err: serde_json::Error) -> Self {
        SlackError::Json(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SlackError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SlackError::WebSocket(err.to_string())
    }
}

impl From<ProjectsError> for SlackError {
    fn from(err: ProjectsError) -> Self {
        SlackError::Config(err.to_string())
    }
}

/// Result type for Slack operations.
pub type SlackResult<T> = std::result::Result<T, SlackError>;

/// Represents a Slack API response error.
#[derive(Debug, Clone)]
pub struct SlackApiError {
    /// Error code from Slack (e.g., "channel_not_found").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl SlackApiError {
    /// Create a new API error.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<SlackApiError> for SlackError {
    fn from(err: SlackApiError) -> Self {
        match err.code.as_str() {
            "ratelimited" | "rate_limited" => SlackError::RateLimited {
                retry_after_secs: 30,
            },
            "invalid_auth" | "account_inactive" | "not_authed" => SlackError::Auth(err.message),
            "channel_not_found" | "not_in_channel" => SlackError::Channel(err.message),
            _ => SlackError::Api(format!("{}: {}", err.code, err.message)),
        }
    }
}

/// Why a command invocation failed.
#[derive(Error, Debug)]
pub enum BotError {
    /// Failure from the project pipeline.
    #[error(transparent)]
    Projects(#[from] ProjectsError),

    /// The command text could not be understood.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// The invocation exceeded its time budget.
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),
}

impl BotError {
    /// Whether the invoking user caused the failure (bad input, unlinked
    /// channel). No upstream request was made for these.
    pub fn is_user_error(&self) -> bool {
        match self {
            BotError::Projects(err) => err.is_validation(),
            BotError::InvalidCommand(_) => true,
            BotError::Timeout(_) => false,
        }
    }

    /// The single message shown to the person who ran the command.
    ///
    /// Upstream and internal detail is logged here and replaced by a
    /// generic message.
    pub fn user_message(&self) -> String {
        match self {
            BotError::Projects(ProjectsError::UnmappedChannel { .. }) => {
                "This channel isn't linked to a project. Use `/project_tasks <number>` instead, \
                 or ask an admin to map this channel."
                    .to_string()
            }
            BotError::Projects(ProjectsError::InvalidProjectReference(detail)) => {
                format!("That isn't a valid project number: {}", detail)
            }
            BotError::Projects(ProjectsError::InvalidStatus(status)) => format!(
                "Unknown status `{}`. Try one of: todo, in progress, in review, done, no status.",
                status
            ),
            BotError::Projects(ProjectsError::ProjectNotFound { org, number }) => format!(
                "Project #{} wasn't found in {} (or the bot can't see it).",
                number, org
            ),
            BotError::Projects(ProjectsError::RateLimited { retry_after_secs }) => format!(
                "GitHub is rate limiting the bot. Please try again in about {} seconds.",
                retry_after_secs
            ),
            BotError::Projects(
                err @ (ProjectsError::Upstream(_)
                | ProjectsError::Normalization(_)
                | ProjectsError::Config(_)),
            ) => {
                error!("Command failed: {}", err);
                "Something went wrong while talking to GitHub. Please try again.".to_string()
            }
            BotError::InvalidCommand(reason) => reason.clone(),
            BotError::Timeout(limit) => format!(
                "GitHub took too long to answer (over {}s). Please try again.",
                limit.as_secs()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SlackError::Config("missing token".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing token");

        let err = SlackError::RateLimited {
            retry_after_secs: 60,
        };
        assert_eq!(err.to_string(), "Rate limited: retry after 60 seconds");
    }

    #[test]
    fn test_api_error_conversion() {
        let slack_err: SlackError = SlackApiError::new("invalid_auth", "Token revoked").into();
        assert!(matches!(slack_err, SlackError::Auth(_)));

        let slack_err: SlackError = SlackApiError::new("not_in_channel", "Not in channel").into();
        assert!(matches!(slack_err, SlackError::Channel(_)));

        let slack_err: SlackError = SlackApiError::new("ratelimited", "slow down").into();
        assert!(matches!(slack_err, SlackError::RateLimited { .. }));
    }

    #[test]
    fn test_user_messages_are_specific() {
        let err = BotError::from(ProjectsError::UnmappedChannel {
            channel_id: "C1".to_string(),
        });
        assert!(err.user_message().contains("isn't linked to a project"));

        let err = BotError::from(ProjectsError::ProjectNotFound {
            org: "acme".to_string(),
            number: 99,
        });
        assert!(err.user_message().contains("#99"));

        let err = BotError::from(ProjectsError::InvalidStatus("blocked".to_string()));
        assert!(err.user_message().contains("`blocked`"));

        let err = BotError::Timeout(Duration::from_secs(20));
        assert!(err.user_message().contains("20s"));
    }

    #[test]
    fn test_user_errors() {
        assert!(BotError::InvalidCommand("usage".to_string()).is_user_error());
        assert!(
            BotError::from(ProjectsError::InvalidStatus("later".to_string())).is_user_error()
        );
        assert!(!BotError::from(ProjectsError::Upstream("boom".to_string())).is_user_error());
        assert!(!BotError::Timeout(Duration::from_secs(20)).is_user_error());
    }

    #[test]
    fn test_upstream_detail_is_not_shown() {
        let err = BotError::from(ProjectsError::Upstream(
            "GitHub API error (502): <html>secret stack</html>".to_string(),
        ));
        let message = err.user_message();
        assert!(!message.contains("502"));
        assert!(message.contains("try again"));
    }
}
