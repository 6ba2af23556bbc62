//! Command dispatch.
//!
//! [`Dispatcher::dispatch`] turns a parsed command into rendered pages.
//! It knows nothing about Slack transport, so the whole pipeline can be
//! exercised with an in-memory [`ProjectsApi`].

use std::sync::Arc;
use std::time::Duration;

use projectbot_github::{
    ChannelDirectory, ProjectReference, ProjectsApi, RequestLimiter, StatusFilter,
    collect_project_tasks, list_projects,
};
use tracing::{debug, info, warn};

use crate::commands::{BotCommand, InvocationContext};
use crate::config::{BotConfig, DEFAULT_INVOCATION_TIMEOUT};
use crate::error::BotError;
use crate::messages::{
    PageContext, PageLimits, RenderedPage, format_project_list, format_task_pages, help_message,
};

/// Per-process dispatch settings.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Organization owning the projects.
    pub org: String,
    /// Time budget for one invocation.
    pub timeout: Duration,
    /// Page limits for rendered output.
    pub page_limits: PageLimits,
    /// Status applied when a command names none.
    pub default_status: Option<StatusFilter>,
}

impl DispatchOptions {
    /// Options with defaults for `org`.
    pub fn new(org: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            timeout: DEFAULT_INVOCATION_TIMEOUT,
            page_limits: PageLimits::default(),
            default_status: None,
        }
    }
}

impl From<&BotConfig> for DispatchOptions {
    fn from(config: &BotConfig) -> Self {
        Self {
            org: config.org.clone(),
            timeout: config.invocation_timeout,
            page_limits: config.page_limits,
            default_status: config.default_status,
        }
    }
}

/// Runs commands against shared, read-mostly state.
#[derive(Clone)]
pub struct Dispatcher {
    api: Arc<dyn ProjectsApi>,
    limiter: Arc<RequestLimiter>,
    channels: Arc<ChannelDirectory>,
    options: DispatchOptions,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(
        api: Arc<dyn ProjectsApi>,
        limiter: Arc<RequestLimiter>,
        channels: Arc<ChannelDirectory>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            api,
            limiter,
            channels,
            options,
        }
    }

    /// Dispatch settings.
    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Run one command to completion or until the time budget runs out.
    ///
    /// On timeout the in-flight work is dropped and nothing partial is
    /// returned.
    pub async fn dispatch(
        &self,
        command: BotCommand,
        ctx: &InvocationContext,
    ) -> Result<Vec<RenderedPage>, BotError> {
        let name = command.name();
        debug!(command = name, channel = %ctx.channel_id, user = %ctx.user_id, "Dispatching command");

        match tokio::time::timeout(self.options.timeout, self.run(command, ctx)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    command = name,
                    channel = %ctx.channel_id,
                    "Command exceeded {:?}",
                    self.options.timeout
                );
                Err(BotError::Timeout(self.options.timeout))
            }
        }
    }

    async fn run(
        &self,
        command: BotCommand,
        ctx: &InvocationContext,
    ) -> Result<Vec<RenderedPage>, BotError> {
        match command {
            BotCommand::ProjectTasks { number, status } => {
                let project = ProjectReference::new(self.options.org.clone(), number)?;
                self.project_tasks(&project, status).await
            }
            BotCommand::Tasks { status } => {
                let project = self.channels.resolve(&ctx.channel_id)?;
                self.project_tasks(&project, status).await
            }
            BotCommand::Projects => {
                let projects =
                    list_projects(self.api.as_ref(), &self.limiter, &self.options.org).await?;
                Ok(format_project_list(
                    &projects,
                    &self.options.org,
                    &self.options.page_limits,
                ))
            }
            BotCommand::Help => Ok(vec![help_message()]),
        }
    }

    async fn project_tasks(
        &self,
        project: &ProjectReference,
        status: Option<StatusFilter>,
    ) -> Result<Vec<RenderedPage>, BotError> {
        let filter = status.or(self.options.default_status);
        let tasks = collect_project_tasks(self.api.as_ref(), &self.limiter, project, filter).await?;

        info!(
            project = %project,
            filter = ?filter,
            matched = tasks.tasks.len(),
            total = tasks.total_items,
            "Rendering project tasks"
        );
        Ok(format_task_pages(
            &tasks.tasks,
            &PageContext::from(&tasks),
            &self.options.page_limits,
        ))
    }
}
