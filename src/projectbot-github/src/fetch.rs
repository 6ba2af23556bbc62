//! Paginated collection.
//!
//! Walks a connection page by page until `hasNextPage` is false. Every
//! page passes through the shared [`RequestLimiter`]. A failure on any
//! page discards what was collected so far.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::client::ProjectsApi;
use crate::error::{ProjectsError, ProjectsResult};
use crate::normalize::{PageInfo, normalize, normalize_projects};
use crate::query::{build_items_query, build_projects_query};
use crate::ratelimit::RequestLimiter;
use crate::types::{ProjectReference, ProjectSummary, ProjectTasks, StatusFilter};

/// Upper bound on pages fetched for a single invocation.
pub const MAX_PAGE_FETCHES: usize = 50;

/// Next cursor to request, or `None` when the connection is exhausted.
fn next_cursor(page_info: &PageInfo, previous: Option<&str>) -> ProjectsResult<Option<String>> {
    if !page_info.has_next_page {
        return Ok(None);
    }

    match page_info.end_cursor.as_deref() {
        None | Some("") => Err(ProjectsError::Upstream(
            "GitHub reported another page without a cursor".to_string(),
        )),
        Some(cursor) if Some(cursor) == previous => Err(ProjectsError::Upstream(
            "GitHub returned the same page cursor twice".to_string(),
        )),
        Some(cursor) => Ok(Some(cursor.to_string())),
    }
}

/// Fetch every item of a project, filtered by status.
///
/// Records keep upstream order. An item that reappears on a later page
/// is kept only once.
pub async fn collect_project_tasks(
    api: &dyn ProjectsApi,
    limiter: &RequestLimiter,
    project: &ProjectReference,
    filter: Option<StatusFilter>,
) -> ProjectsResult<ProjectTasks> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut tasks = Vec::new();
    let mut cursor: Option<String> = None;

    for page_number in 1..=MAX_PAGE_FETCHES {
        limiter.acquire().await?;

        let request = build_items_query(project, filter, cursor.as_deref());
        let response = api.execute(&request).await?;
        let page = normalize(&response, project, filter)?;

        debug!(
            project = %project,
            page = page_number,
            items = page.item_ids.len(),
            kept = page.tasks.len(),
            "Fetched project items page"
        );

        // First occurrence wins, within a page as well as across pages.
        let mut new_ids: HashSet<String> = page
            .item_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        tasks.extend(page.tasks.into_iter().filter(|t| new_ids.remove(&t.id)));

        match next_cursor(&page.page_info, cursor.as_deref())? {
            Some(next) => cursor = Some(next),
            None => {
                let budget = limiter.remaining().await;
                info!(
                    project = %project,
                    pages = page_number,
                    total = seen.len(),
                    matched = tasks.len(),
                    budget,
                    "Collected project tasks"
                );
                return Ok(ProjectTasks {
                    project: page.project,
                    filter,
                    has_status_field: page.has_status_field,
                    total_items: seen.len(),
                    tasks,
                });
            }
        }
    }

    warn!(
        project = %project,
        "Project has more than {} pages of items, giving up",
        MAX_PAGE_FETCHES
    );
    Err(ProjectsError::Upstream(format!(
        "Project {} has more than {} pages of items",
        project, MAX_PAGE_FETCHES
    )))
}

/// List the organization's projects in number order.
pub async fn list_projects(
    api: &dyn ProjectsApi,
    limiter: &RequestLimiter,
    org: &str,
) -> ProjectsResult<Vec<ProjectSummary>> {
    let mut projects: Vec<ProjectSummary> = Vec::new();
    let mut cursor: Option<String> = None;

    for _ in 0..MAX_PAGE_FETCHES {
        limiter.acquire().await?;

        let response = api.execute(&build_projects_query(org, cursor.as_deref())).await?;
        let page = normalize_projects(&response, org)?;

        for project in page.projects {
            if !projects.iter().any(|p| p.number == project.number) {
                projects.push(project);
            }
        }

        match next_cursor(&page.page_info, cursor.as_deref())? {
            Some(next) => cursor = Some(next),
            None => {
                debug!(org, count = projects.len(), "Listed projects");
                return Ok(projects);
            }
        }
    }

    Err(ProjectsError::Upstream(format!(
        "Organization {} has more than {} pages of projects",
        org, MAX_PAGE_FETCHES
    )))
}
