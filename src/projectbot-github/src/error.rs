//! Error types for GitHub Projects access.
//!
//! Separates user-input failures (unmapped channel, bad project number,
//! unknown status) from upstream failures so the chat layer can decide
//! what is safe to show.

use thiserror::Error;

/// Errors that can occur while resolving, fetching or normalizing tasks.
#[derive(Error, Debug)]
pub enum ProjectsError {
    /// The channel has no project mapped to it.
    #[error("Channel {channel_id} is not mapped to a project")]
    UnmappedChannel {
        /// The channel that failed to resolve.
        channel_id: String,
    },

    /// Project number or organization is not usable.
    #[error("Invalid project reference: {0}")]
    InvalidProjectReference(String),

    /// Status text did not match any recognized status.
    #[error("Unrecognized status: {0}")]
    InvalidStatus(String),

    /// The organization or project does not exist or is not visible.
    #[error("Project #{number} not found in organization {org}")]
    ProjectNotFound {
        /// Organization login.
        org: String,
        /// Project number.
        number: u32,
    },

    /// Transport failure, non-2xx response or GraphQL errors.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Request budget exhausted.
    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Upstream payload did not have the expected shape.
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// Invalid channel mapping or limiter configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProjectsError {
    /// Whether the error was caused by user input (no network call was made).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ProjectsError::UnmappedChannel { .. }
                | ProjectsError::InvalidProjectReference(_)
                | ProjectsError::InvalidStatus(_)
        )
    }
}

impl From<reqwest::Error> for ProjectsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProjectsError::Upstream(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            ProjectsError::Upstream(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            ProjectsError::Normalization(format!("Undecodable response body: {}", err))
        } else {
            ProjectsError::Upstream(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProjectsError {
    fn from(err: serde_json::Error) -> Self {
        ProjectsError::Normalization(err.to_string())
    }
}

/// Result type for GitHub Projects operations.
pub type ProjectsResult<T> = std::result::Result<T, ProjectsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProjectsError::UnmappedChannel {
            channel_id: "C123".to_string(),
        };
        assert_eq!(err.to_string(), "Channel C123 is not mapped to a project");

        let err = ProjectsError::ProjectNotFound {
            org: "acme".to_string(),
            number: 7,
        };
        assert_eq!(err.to_string(), "Project #7 not found in organization acme");

        let err = ProjectsError::RateLimited {
            retry_after_secs: 60,
        };
        assert_eq!(err.to_string(), "Rate limited: retry after 60 seconds");
    }

    #[test]
    fn test_validation_errors() {
        assert!(ProjectsError::InvalidStatus("later".to_string()).is_validation());
        assert!(ProjectsError::InvalidProjectReference("0".to_string()).is_validation());
        assert!(!ProjectsError::Upstream("boom".to_string()).is_validation());
        assert!(
            !ProjectsError::RateLimited {
                retry_after_secs: 1
            }
            .is_validation()
        );
    }

    #[test]
    fn test_json_error_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let projects_err: ProjectsError = err.into();
        assert!(matches!(projects_err, ProjectsError::Normalization(_)));
    }
}
