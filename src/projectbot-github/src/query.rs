//! GraphQL request construction.
//!
//! Requests are plain data: a static query document plus a variables
//! object. Building one never touches the network or any global state.

use serde::Serialize;
use serde_json::json;

use crate::types::{ProjectReference, StatusFilter};

/// Items fetched per page (GitHub's maximum for project items).
pub const ITEMS_PER_PAGE: u32 = 100;

/// Projects fetched per page for the listing.
pub const PROJECTS_PER_PAGE: u32 = 20;

/// Name of the single-select field holding the status.
pub const STATUS_FIELD_NAME: &str = "Status";

const PROJECT_ITEMS_QUERY: &str = r#"
query ProjectItems($login: String!, $projectNumber: Int!, $itemsPerPage: Int!, $cursor: String) {
  organization(login: $login) {
    projectV2(number: $projectNumber) {
      number
      title
      url
      closed
      fields(first: 30) {
        nodes {
          __typename
          ... on ProjectV2Field { id name }
          ... on ProjectV2SingleSelectField { id name }
          ... on ProjectV2IterationField { id name }
        }
      }
      items(first: $itemsPerPage, after: $cursor, orderBy: {field: POSITION, direction: ASC}) {
        pageInfo {
          endCursor
          hasNextPage
        }
        nodes {
          id
          content {
            __typename
            ... on DraftIssue {
              title
              assignees(first: 10) { nodes { login name } }
            }
            ... on Issue {
              title
              url
              number
              assignees(first: 10) { nodes { login name } }
            }
            ... on PullRequest {
              title
              url
              number
              assignees(first: 10) { nodes { login name } }
            }
          }
          fieldValues(first: 20) {
            nodes {
              __typename
              ... on ProjectV2ItemFieldSingleSelectValue {
                name
                field {
                  ... on ProjectV2SingleSelectField { id name }
                }
              }
              ... on ProjectV2ItemFieldIterationValue {
                title
              }
              ... on ProjectV2ItemFieldLabelValue {
                labels(first: 10) { nodes { name } }
              }
              ... on ProjectV2ItemFieldUserValue {
                users(first: 10) { nodes { login name } }
              }
            }
          }
        }
      }
    }
  }
}
"#;

const ORG_PROJECTS_QUERY: &str = r#"
query OrgProjects($login: String!, $projectsPerPage: Int!, $cursor: String) {
  organization(login: $login) {
    projectsV2(first: $projectsPerPage, after: $cursor, orderBy: {field: NUMBER, direction: ASC}) {
      pageInfo {
        endCursor
        hasNextPage
      }
      nodes {
        number
        title
        url
        closed
      }
    }
  }
}
"#;

/// A GraphQL request body: `{"query": ..., "variables": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphQLRequest {
    /// Query document.
    pub query: &'static str,
    /// Variables object.
    pub variables: serde_json::Value,
    /// Status the caller asked for. The ProjectV2 items connection has no
    /// argument to filter by a single-select value, so it is never sent
    /// and the normalizer filters instead.
    #[serde(skip)]
    pub status_filter: Option<StatusFilter>,
}

impl GraphQLRequest {
    /// Whether the upstream applies the status filter itself.
    pub fn server_filtered(&self) -> bool {
        false
    }
}

/// Build the request for one page of project items.
///
/// `cursor` is `None` for the first page and the previous page's
/// `endCursor` afterwards.
pub fn build_items_query(
    project: &ProjectReference,
    status_filter: Option<StatusFilter>,
    cursor: Option<&str>,
) -> GraphQLRequest {
    GraphQLRequest {
        query: PROJECT_ITEMS_QUERY,
        variables: json!({
            "login": project.org(),
            "projectNumber": project.number(),
            "itemsPerPage": ITEMS_PER_PAGE,
            "cursor": cursor,
        }),
        status_filter,
    }
}

/// Build the request for one page of the organization's projects.
pub fn build_projects_query(org: &str, cursor: Option<&str>) -> GraphQLRequest {
    GraphQLRequest {
        query: ORG_PROJECTS_QUERY,
        variables: json!({
            "login": org,
            "projectsPerPage": PROJECTS_PER_PAGE,
            "cursor": cursor,
        }),
        status_filter: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_query_first_page() {
        let project = ProjectReference::new("acme", 7).unwrap();
        let request = build_items_query(&project, None, None);

        assert_eq!(request.variables["login"], "acme");
        assert_eq!(request.variables["projectNumber"], 7);
        assert_eq!(request.variables["itemsPerPage"], ITEMS_PER_PAGE);
        assert!(request.variables["cursor"].is_null());
        assert!(request.query.contains("projectV2(number: $projectNumber)"));
    }

    #[test]
    fn test_items_query_with_cursor_and_filter() {
        let project = ProjectReference::new("acme", 7).unwrap();
        let request = build_items_query(&project, Some(StatusFilter::InProgress), Some("Y3Vyc29y"));

        assert_eq!(request.variables["cursor"], "Y3Vyc29y");
        assert_eq!(request.status_filter, Some(StatusFilter::InProgress));
        assert!(!request.server_filtered());
    }

    #[test]
    fn test_items_query_is_deterministic() {
        let project = ProjectReference::new("acme", 3).unwrap();
        let a = build_items_query(&project, Some(StatusFilter::Done), Some("abc"));
        let b = build_items_query(&project, Some(StatusFilter::Done), Some("abc"));
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_request_body_shape() {
        let project = ProjectReference::new("acme", 2).unwrap();
        let body = serde_json::to_value(build_items_query(&project, Some(StatusFilter::Done), None))
            .unwrap();

        let object = body.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert!(object.contains_key("query"));
        assert!(object.contains_key("variables"));
    }

    #[test]
    fn test_declared_variables_are_all_sent() {
        let project = ProjectReference::new("acme", 2).unwrap();
        let request = build_items_query(&project, None, None);
        for name in ["login", "projectNumber", "itemsPerPage", "cursor"] {
            assert!(request.query.contains(&format!("${}", name)));
            assert!(request.variables.get(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn test_projects_query() {
        let request = build_projects_query("acme", Some("next"));
        assert_eq!(request.variables["login"], "acme");
        assert_eq!(request.variables["projectsPerPage"], PROJECTS_PER_PAGE);
        assert_eq!(request.variables["cursor"], "next");
        assert!(request.query.contains("projectsV2"));
    }
}
