//! GitHub Projects (v2) access for projectbot.
//!
//! This crate turns "show me the tasks of project N" into GraphQL requests
//! against the GitHub API and flattens the answers into uniform task
//! records:
//! - Channel resolution (chat channel id to project number)
//! - GraphQL query construction for project items and project listings
//! - Response normalization (status, assignees, iteration and labels)
//! - Cursor pagination with de-duplication and a hard fetch cap
//! - A process-wide sliding-window request limiter
//!
//! # Example
//!
//! ```rust,ignore
//! use projectbot_github::{GitHubClient, ProjectReference, RequestLimiter, collect_project_tasks};
//!
//! let client = GitHubClient::new(std::env::var("GITHUB_TOKEN")?)?;
//! let limiter = RequestLimiter::default();
//! let project = ProjectReference::new("my-org", 7)?;
//! let tasks = collect_project_tasks(&client, &limiter, &project, None).await?;
//! println!("{} tasks", tasks.tasks.len());
//! ```

pub mod client;
pub mod error;
pub mod fetch;
pub mod mapping;
pub mod normalize;
pub mod query;
pub mod ratelimit;
pub mod types;

// Re-export main types
pub use client::{GITHUB_GRAPHQL_ENDPOINT, GitHubClient, GraphQLError, GraphQLResponse, ProjectsApi};
pub use error::{ProjectsError, ProjectsResult};
pub use fetch::{MAX_PAGE_FETCHES, collect_project_tasks, list_projects};
pub use mapping::{ChannelDirectory, ChannelProjectMapping};
pub use normalize::{PageInfo, ProjectListPage, ProjectPage, normalize, normalize_projects};
pub use query::{GraphQLRequest, build_items_query, build_projects_query};
pub use ratelimit::{RateLimitConfig, RequestLimiter};
pub use types::{
    ProjectReference, ProjectSummary, ProjectTasks, StatusFilter, TaskKind, TaskRecord,
    TaskStatus,
};
