//! Response normalization.
//!
//! Flattens one page of a `ProjectItems` response into [`TaskRecord`]s.
//! Field values are decoded as variants tagged by `__typename`: unknown
//! typenames are ignored, while a known typename with an unexpected shape
//! fails the whole page with [`ProjectsError::Normalization`].

use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::client::GraphQLResponse;
use crate::error::{ProjectsError, ProjectsResult};
use crate::query::STATUS_FIELD_NAME;
use crate::types::{
    ProjectReference, ProjectSummary, StatusFilter, TaskKind, TaskRecord, TaskStatus,
};

/// Cursor state of a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Cursor of the last node on this page.
    #[serde(default)]
    pub end_cursor: Option<String>,
    /// Whether more pages follow.
    #[serde(default)]
    pub has_next_page: bool,
}

/// One normalized page of project items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPage {
    /// Project identity.
    pub project: ProjectSummary,
    /// Whether the project has a single-select `Status` field.
    pub has_status_field: bool,
    /// Ids of every usable item on the page, before filtering.
    pub item_ids: Vec<String>,
    /// Records that survived filtering, in upstream order.
    pub tasks: Vec<TaskRecord>,
    /// Pagination state.
    pub page_info: PageInfo,
}

/// One page of the organization's project listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectListPage {
    /// Projects on this page.
    pub projects: Vec<ProjectSummary>,
    /// Pagination state.
    pub page_info: PageInfo,
}

// GraphQL response shapes

#[derive(Debug, Deserialize)]
struct ItemsData {
    organization: Option<OrganizationNode>,
}

#[derive(Debug, Deserialize)]
struct OrganizationNode {
    #[serde(rename = "projectV2")]
    project_v2: Option<ProjectNode>,
}

#[derive(Debug, Deserialize)]
struct ProjectNode {
    number: u32,
    title: String,
    url: String,
    #[serde(default)]
    closed: bool,
    #[serde(default)]
    fields: Option<Connection<FieldNode>>,
    items: ItemsConnection,
}

#[derive(Debug, Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<Option<T>>,
}

impl<T> Connection<T> {
    fn into_nodes(self) -> impl Iterator<Item = T> {
        self.nodes.into_iter().flatten()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemsConnection {
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<Option<ItemNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum FieldNode {
    #[serde(rename = "ProjectV2Field")]
    Field {},
    #[serde(rename = "ProjectV2SingleSelectField")]
    SingleSelect {
        #[serde(default)]
        id: Option<String>,
        name: String,
    },
    #[serde(rename = "ProjectV2IterationField")]
    Iteration {},
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemNode {
    id: String,
    #[serde(default)]
    content: Option<ItemContent>,
    #[serde(default)]
    field_values: Option<Connection<FieldValue>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum ItemContent {
    Issue {
        #[serde(default)]
        title: Option<String>,
        url: String,
        number: u64,
        #[serde(default)]
        assignees: Option<Connection<UserNode>>,
    },
    PullRequest {
        #[serde(default)]
        title: Option<String>,
        url: String,
        number: u64,
        #[serde(default)]
        assignees: Option<Connection<UserNode>>,
    },
    DraftIssue {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        assignees: Option<Connection<UserNode>>,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum FieldValue {
    #[serde(rename = "ProjectV2ItemFieldSingleSelectValue")]
    SingleSelect {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        field: Option<FieldRef>,
    },
    #[serde(rename = "ProjectV2ItemFieldIterationValue")]
    Iteration { title: String },
    #[serde(rename = "ProjectV2ItemFieldLabelValue")]
    Labels {
        #[serde(default)]
        labels: Option<Connection<LabelNode>>,
    },
    #[serde(rename = "ProjectV2ItemFieldUserValue")]
    Users {
        #[serde(default)]
        users: Option<Connection<UserNode>>,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Default, Deserialize)]
struct FieldRef {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserNode {
    login: String,
    #[serde(default)]
    name: Option<String>,
}

impl UserNode {
    fn display_name(&self) -> &str {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => &self.login,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LabelNode {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ProjectsData {
    organization: Option<ProjectsOrganization>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectsOrganization {
    projects_v2: ProjectsConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectsConnection {
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<Option<ProjectListNode>>,
}

#[derive(Debug, Deserialize)]
struct ProjectListNode {
    number: u32,
    title: String,
    url: String,
    #[serde(default)]
    closed: bool,
}

/// The project's status field, as found in its field list.
#[derive(Debug)]
struct StatusField {
    id: Option<String>,
}

impl StatusField {
    fn find(fields: Option<Connection<FieldNode>>) -> Option<Self> {
        fields?.into_nodes().find_map(|field| match field {
            FieldNode::SingleSelect { id, name } if name.eq_ignore_ascii_case(STATUS_FIELD_NAME) => {
                Some(StatusField { id })
            }
            _ => None,
        })
    }

    fn owns(&self, field: Option<&FieldRef>) -> bool {
        let Some(field) = field else {
            return false;
        };
        match (&self.id, &field.id) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => field
                .name
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(STATUS_FIELD_NAME)),
        }
    }
}

/// Reject envelopes carrying GraphQL errors.
///
/// `NOT_FOUND` errors alone mean the project (or organization) is missing;
/// anything else is an upstream failure, even when partial data is present.
fn check_errors(response: &GraphQLResponse, project: Option<&ProjectReference>) -> ProjectsResult<()> {
    let errors = response.errors();
    if errors.is_empty() {
        return Ok(());
    }

    if let Some(project) = project {
        if errors.iter().all(|e| e.is_not_found()) {
            debug!("GitHub reported {} as not found", project);
            return Err(not_found(project));
        }
    }

    let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
    error!("GraphQL errors: {}", messages.join("; "));
    Err(ProjectsError::Upstream(format!(
        "GraphQL errors: {}",
        messages.join("; ")
    )))
}

fn not_found(project: &ProjectReference) -> ProjectsError {
    ProjectsError::ProjectNotFound {
        org: project.org().to_string(),
        number: project.number(),
    }
}

/// Normalize one page of a `ProjectItems` response.
///
/// Items without content or title are skipped with a warning. When
/// `filter` is set, records whose status does not match are dropped.
pub fn normalize(
    response: &GraphQLResponse,
    project: &ProjectReference,
    filter: Option<StatusFilter>,
) -> ProjectsResult<ProjectPage> {
    check_errors(response, Some(project))?;

    let data = response
        .data
        .as_ref()
        .ok_or_else(|| ProjectsError::Upstream("No data in GraphQL response".to_string()))?;
    let data = ItemsData::deserialize(data)
        .map_err(|e| ProjectsError::Normalization(format!("unexpected items payload: {}", e)))?;

    let project_node = data
        .organization
        .and_then(|org| org.project_v2)
        .ok_or_else(|| not_found(project))?;

    let status_field = StatusField::find(project_node.fields);
    if status_field.is_none() {
        debug!("Project {} has no '{}' field", project, STATUS_FIELD_NAME);
    }

    let mut item_ids = Vec::new();
    let mut tasks = Vec::new();

    for item in project_node.items.nodes.into_iter().flatten() {
        let Some(record) = to_record(item, status_field.as_ref()) else {
            continue;
        };
        item_ids.push(record.id.clone());

        let keep = match filter {
            Some(filter) => filter.matches(&record.status),
            None => true,
        };
        if keep {
            tasks.push(record);
        }
    }

    Ok(ProjectPage {
        project: ProjectSummary {
            number: project_node.number,
            title: project_node.title,
            url: project_node.url,
            closed: project_node.closed,
        },
        has_status_field: status_field.is_some(),
        item_ids,
        tasks,
        page_info: project_node.items.page_info,
    })
}

fn to_record(item: ItemNode, status_field: Option<&StatusField>) -> Option<TaskRecord> {
    let (title, kind, url, assignees) = match item.content {
        Some(ItemContent::Issue {
            title,
            url,
            number,
            assignees,
        }) => (title, TaskKind::Issue { number }, Some(url), assignees),
        Some(ItemContent::PullRequest {
            title,
            url,
            number,
            assignees,
        }) => (title, TaskKind::PullRequest { number }, Some(url), assignees),
        Some(ItemContent::DraftIssue { title, assignees }) => {
            (title, TaskKind::DraftIssue, None, assignees)
        }
        Some(ItemContent::Unsupported) => {
            warn!(item = %item.id, "Skipping project item with unsupported content type");
            return None;
        }
        None => {
            warn!(item = %item.id, "Skipping project item without content");
            return None;
        }
    };

    let title = match title.map(|t| t.trim().to_string()) {
        Some(title) if !title.is_empty() => title,
        _ => {
            warn!(item = %item.id, "Skipping project item without a title");
            return None;
        }
    };

    let mut names: Vec<String> = Vec::new();
    let mut push_name = |name: &str| {
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    };
    for user in assignees.into_iter().flat_map(Connection::into_nodes) {
        push_name(user.display_name());
    }

    let mut status = TaskStatus::Unset;
    let mut iteration = None;
    let mut labels = Vec::new();

    for value in item.field_values.into_iter().flat_map(Connection::into_nodes) {
        match value {
            FieldValue::SingleSelect { name, field } => {
                let is_status = status_field.is_some_and(|s| s.owns(field.as_ref()));
                if is_status && status == TaskStatus::Unset {
                    if let Some(name) = name {
                        status = TaskStatus::from_option_name(&name);
                    }
                }
            }
            FieldValue::Iteration { title } => {
                if iteration.is_none() {
                    iteration = Some(title);
                }
            }
            FieldValue::Labels { labels: connection } => {
                labels.extend(connection.into_iter().flat_map(Connection::into_nodes).map(|l| l.name));
            }
            FieldValue::Users { users } => {
                for user in users.into_iter().flat_map(Connection::into_nodes) {
                    push_name(user.display_name());
                }
            }
            FieldValue::Unsupported => {}
        }
    }

    let metadata_parts: Vec<String> = iteration.into_iter().chain(labels).collect();
    let metadata = if metadata_parts.is_empty() {
        None
    } else {
        Some(metadata_parts.join(" · "))
    };

    Some(TaskRecord {
        id: item.id,
        title,
        kind,
        status,
        assignees: names,
        url,
        metadata,
    })
}

/// Normalize one page of an `OrgProjects` response.
pub fn normalize_projects(response: &GraphQLResponse, org: &str) -> ProjectsResult<ProjectListPage> {
    check_errors(response, None)?;

    let data = response
        .data
        .as_ref()
        .ok_or_else(|| ProjectsError::Upstream("No data in GraphQL response".to_string()))?;
    let data = ProjectsData::deserialize(data)
        .map_err(|e| ProjectsError::Normalization(format!("unexpected projects payload: {}", e)))?;

    let organization = data.organization.ok_or_else(|| {
        ProjectsError::Upstream(format!("Organization '{}' not found or not accessible", org))
    })?;

    let projects = organization
        .projects_v2
        .nodes
        .into_iter()
        .flatten()
        .map(|node| ProjectSummary {
            number: node.number,
            title: node.title,
            url: node.url,
            closed: node.closed,
        })
        .collect();

    Ok(ProjectListPage {
        projects,
        page_info: organization.projects_v2.page_info,
    })
}
