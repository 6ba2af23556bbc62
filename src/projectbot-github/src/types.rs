//! Core data types shared by the query, normalization and formatting stages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProjectsError, ProjectsResult};

/// Identifies a GitHub Projects board: organization login + project number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectReference {
    org: String,
    number: u32,
}

impl ProjectReference {
    /// Create a project reference.
    ///
    /// Fails with [`ProjectsError::InvalidProjectReference`] when the number
    /// is not a positive GraphQL `Int` or the organization is blank.
    pub fn new(org: impl Into<String>, number: i64) -> ProjectsResult<Self> {
        let org = org.into();
        if org.trim().is_empty() {
            return Err(ProjectsError::InvalidProjectReference(
                "organization must not be empty".to_string(),
            ));
        }
        if number <= 0 {
            return Err(ProjectsError::InvalidProjectReference(format!(
                "project number must be positive, got {}",
                number
            )));
        }
        let number = i32::try_from(number).map_err(|_| {
            ProjectsError::InvalidProjectReference(format!(
                "project number {} is out of range",
                number
            ))
        })?;

        Ok(Self {
            org,
            number: number.unsigned_abs(),
        })
    }

    /// Organization login.
    pub fn org(&self) -> &str {
        &self.org
    }

    /// Project number within the organization.
    pub fn number(&self) -> u32 {
        self.number
    }
}

impl fmt::Display for ProjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.org, self.number)
    }
}

/// Work-state category a user may filter tasks by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StatusFilter {
    /// Not started.
    Todo,
    /// Being worked on.
    InProgress,
    /// Awaiting review.
    InReview,
    /// Finished.
    Done,
    /// No status set, or a status outside the four above.
    NoStatus,
}

impl StatusFilter {
    /// Every filter, in board order.
    pub const ALL: [StatusFilter; 5] = [
        StatusFilter::Todo,
        StatusFilter::InProgress,
        StatusFilter::InReview,
        StatusFilter::Done,
        StatusFilter::NoStatus,
    ];

    /// Human-readable label shown in messages.
    pub fn label(&self) -> &'static str {
        match self {
            StatusFilter::Todo => "To Do",
            StatusFilter::InProgress => "In Progress",
            StatusFilter::InReview => "In Review",
            StatusFilter::Done => "Done",
            StatusFilter::NoStatus => "No Status",
        }
    }

    /// Whether a normalized status falls under this filter.
    pub fn matches(&self, status: &TaskStatus) -> bool {
        match (self, status) {
            (StatusFilter::Todo, TaskStatus::Todo)
            | (StatusFilter::InProgress, TaskStatus::InProgress)
            | (StatusFilter::InReview, TaskStatus::InReview)
            | (StatusFilter::Done, TaskStatus::Done) => true,
            (StatusFilter::NoStatus, TaskStatus::Unset | TaskStatus::Other(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for StatusFilter {
    type Err = ProjectsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        match key.as_str() {
            "todo" | "to do" | "to-do" => Ok(StatusFilter::Todo),
            "in progress" | "in-progress" | "inprogress" | "doing" => Ok(StatusFilter::InProgress),
            "in review" | "in-review" | "inreview" | "review" => Ok(StatusFilter::InReview),
            "done" | "complete" | "completed" => Ok(StatusFilter::Done),
            "no status" | "none" | "unset" | "other" => Ok(StatusFilter::NoStatus),
            _ => Err(ProjectsError::InvalidStatus(s.trim().to_string())),
        }
    }
}

impl TryFrom<String> for StatusFilter {
    type Error = ProjectsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StatusFilter> for String {
    fn from(filter: StatusFilter) -> Self {
        filter.label().to_string()
    }
}

/// Normalized status of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Not started.
    Todo,
    /// Being worked on.
    InProgress,
    /// Awaiting review.
    InReview,
    /// Finished.
    Done,
    /// An option name outside the recognized set, kept verbatim.
    Other(String),
    /// The item has no status value.
    Unset,
}

impl TaskStatus {
    /// Map an upstream single-select option name to a status.
    ///
    /// Matching is case-insensitive and exact; anything unrecognized is
    /// preserved as [`TaskStatus::Other`].
    pub fn from_option_name(name: &str) -> Self {
        let trimmed = name.trim();
        match trimmed.to_lowercase().as_str() {
            "todo" | "to do" => TaskStatus::Todo,
            "in progress" => TaskStatus::InProgress,
            "in review" => TaskStatus::InReview,
            "done" => TaskStatus::Done,
            "" => TaskStatus::Unset,
            _ => TaskStatus::Other(trimmed.to_string()),
        }
    }

    /// Label shown in messages.
    pub fn label(&self) -> &str {
        match self {
            TaskStatus::Todo => "To Do",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::InReview => "In Review",
            TaskStatus::Done => "Done",
            TaskStatus::Other(name) => name,
            TaskStatus::Unset => "No Status",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What kind of content a project item wraps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Repository issue.
    Issue {
        /// Issue number.
        number: u64,
    },
    /// Repository pull request.
    PullRequest {
        /// Pull request number.
        number: u64,
    },
    /// Draft issue living only on the board.
    DraftIssue,
}

impl TaskKind {
    /// Issue or pull request number, if any.
    pub fn number(&self) -> Option<u64> {
        match self {
            TaskKind::Issue { number } | TaskKind::PullRequest { number } => Some(*number),
            TaskKind::DraftIssue => None,
        }
    }
}

/// A normalized project item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    /// Upstream project item node id.
    pub id: String,
    /// Item title.
    pub title: String,
    /// Issue, pull request or draft.
    pub kind: TaskKind,
    /// Normalized status.
    pub status: TaskStatus,
    /// Assignee display names, in upstream order.
    pub assignees: Vec<String>,
    /// Link to the issue or pull request (drafts have none).
    pub url: Option<String>,
    /// Short extra line: iteration and labels.
    pub metadata: Option<String>,
}

/// Identity of a project as reported by the upstream API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
    /// Project number.
    pub number: u32,
    /// Project title.
    pub title: String,
    /// Link to the board.
    pub url: String,
    /// Whether the project is closed.
    pub closed: bool,
}

/// All tasks of one project, fully paginated and filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectTasks {
    /// The project the tasks belong to.
    pub project: ProjectSummary,
    /// Filter that was applied, if any.
    pub filter: Option<StatusFilter>,
    /// Whether the project has a single-select `Status` field.
    pub has_status_field: bool,
    /// Distinct items seen before filtering.
    pub total_items: usize,
    /// Tasks that survived filtering, in upstream order.
    pub tasks: Vec<TaskRecord>,
}
