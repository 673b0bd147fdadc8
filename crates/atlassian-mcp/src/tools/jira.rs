//! Jira tools: issue lookup and search, comments, worklogs, transitions, projects.

use std::sync::Arc;

use atlassian_auth::AuthContext;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::cql::escape_literal;
use super::registry::ToolRegistry;
use super::{
    bind, failure, object_argument, parse_params, require_non_blank, settle, settle_with, text_at,
};
use crate::client::{transition_body, ClientFactory, SearchQuery};
use crate::types::{McpError, McpResult};

const DEFAULT_LIMIT: u32 = 10;
const SEARCH_FIELDS: &str = "summary,status,assignee,created";
const PROJECT_ISSUE_FIELDS: &str = "summary,status,assignee";

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

#[derive(Debug, Deserialize)]
struct IssueKeyParams {
    issue_key: String,
}

#[derive(Debug, Deserialize)]
struct ProjectKeyParams {
    project_key: String,
}

#[derive(Debug, Deserialize)]
struct GetIssueParams {
    issue_key: String,
    #[serde(default)]
    fields: Option<String>,
    #[serde(default)]
    expand: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    jql: String,
    #[serde(default)]
    fields: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    start_at: u32,
    #[serde(default)]
    expand: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectIssuesParams {
    project_key: String,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    start_at: u32,
}

#[derive(Debug, Deserialize)]
struct UserParams {
    user_identifier: String,
}

#[derive(Debug, Deserialize)]
struct CreateIssueParams {
    project_key: String,
    summary: String,
    issue_type: String,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    components: Option<String>,
    #[serde(default)]
    additional_fields: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct UpdateIssueParams {
    issue_key: String,
    fields: Value,
    #[serde(default)]
    additional_fields: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CommentParams {
    issue_key: String,
    comment: String,
}

#[derive(Debug, Deserialize)]
struct WorklogParams {
    issue_key: String,
    time_spent: String,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    started: Option<String>,
    #[serde(default)]
    original_estimate: Option<String>,
    #[serde(default)]
    remaining_estimate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransitionParams {
    issue_key: String,
    transition_id: String,
    #[serde(default)]
    fields: Option<Value>,
    #[serde(default)]
    comment: Option<String>,
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({ "type": "object", "properties": properties, "required": required })
}

fn issue_key_schema() -> Value {
    schema(
        json!({ "issue_key": { "type": "string", "description": "Jira issue key (e.g. 'PROJ-123')" } }),
        &["issue_key"],
    )
}

fn project_key_schema() -> Value {
    schema(
        json!({ "project_key": { "type": "string", "description": "Jira project key (e.g. 'PROJ')" } }),
        &["project_key"],
    )
}

pub fn register(registry: &mut ToolRegistry, clients: &Arc<ClientFactory>) {
    registry.register_read_only(
        "jira_get_issue",
        "Get details of a specific Jira issue",
        schema(
            json!({
                "issue_key": { "type": "string", "description": "Jira issue key (e.g. 'PROJ-123')" },
                "fields": { "type": "string", "description": "Comma-separated fields to return" },
                "expand": { "type": "string", "description": "Fields to expand (e.g. 'renderedFields')" }
            }),
            &["issue_key"],
        ),
        bind(clients, get_issue),
    );
    registry.register_read_only(
        "jira_search",
        "Search Jira issues using JQL",
        schema(
            json!({
                "jql": { "type": "string", "description": "JQL query string" },
                "fields": { "type": "string", "description": "Comma-separated fields to return" },
                "limit": { "type": "integer", "default": DEFAULT_LIMIT, "minimum": 1 },
                "start_at": { "type": "integer", "default": 0, "minimum": 0 },
                "expand": { "type": "string" }
            }),
            &["jql"],
        ),
        bind(clients, search),
    );
    registry.register_read_only(
        "jira_get_project_issues",
        "Get all issues in a Jira project",
        schema(
            json!({
                "project_key": { "type": "string", "description": "Jira project key" },
                "limit": { "type": "integer", "default": DEFAULT_LIMIT, "minimum": 1 },
                "start_at": { "type": "integer", "default": 0, "minimum": 0 }
            }),
            &["project_key"],
        ),
        bind(clients, get_project_issues),
    );
    registry.register_read_only(
        "jira_get_transitions",
        "Get the transitions available for a Jira issue",
        issue_key_schema(),
        bind(clients, get_transitions),
    );
    registry.register_read_only(
        "jira_get_worklog",
        "Get worklog entries for a Jira issue",
        issue_key_schema(),
        bind(clients, get_worklog),
    );
    registry.register_read_only(
        "jira_get_all_projects",
        "List all Jira projects visible to the caller",
        schema(json!({}), &[]),
        bind(clients, get_all_projects),
    );
    registry.register_read_only(
        "jira_get_user_profile",
        "Get a Jira user's profile by username or account id",
        schema(
            json!({ "user_identifier": { "type": "string", "description": "Username or account id" } }),
            &["user_identifier"],
        ),
        bind(clients, get_user_profile),
    );
    registry.register_read_only(
        "jira_get_link_types",
        "List the available issue link types",
        schema(json!({}), &[]),
        bind(clients, get_link_types),
    );
    registry.register_read_only(
        "jira_get_project_versions",
        "List the versions of a Jira project",
        project_key_schema(),
        bind(clients, get_project_versions),
    );

    registry.register(
        "jira_create_issue",
        "Create a new Jira issue",
        schema(
            json!({
                "project_key": { "type": "string" },
                "summary": { "type": "string" },
                "issue_type": { "type": "string", "description": "Task, Bug, Story, Epic or Subtask" },
                "assignee": { "type": "string" },
                "description": { "type": "string" },
                "components": { "type": "string", "description": "Comma-separated component names" },
                "additional_fields": { "type": "object", "description": "Extra fields set verbatim" }
            }),
            &["project_key", "summary", "issue_type"],
        ),
        false,
        bind(clients, create_issue),
    );
    registry.register(
        "jira_update_issue",
        "Update fields of an existing Jira issue",
        schema(
            json!({
                "issue_key": { "type": "string" },
                "fields": { "type": "object", "description": "Fields to update" },
                "additional_fields": { "type": "object" }
            }),
            &["issue_key", "fields"],
        ),
        false,
        bind(clients, update_issue),
    );
    registry.register(
        "jira_delete_issue",
        "Delete a Jira issue",
        issue_key_schema(),
        false,
        bind(clients, delete_issue),
    );
    registry.register(
        "jira_add_comment",
        "Add a comment to a Jira issue",
        schema(
            json!({
                "issue_key": { "type": "string" },
                "comment": { "type": "string" }
            }),
            &["issue_key", "comment"],
        ),
        false,
        bind(clients, add_comment),
    );
    registry.register(
        "jira_add_worklog",
        "Log time against a Jira issue",
        schema(
            json!({
                "issue_key": { "type": "string" },
                "time_spent": { "type": "string", "description": "Jira duration, e.g. '1h 30m'" },
                "comment": { "type": "string" },
                "started": { "type": "string", "description": "Start time (ISO 8601)" },
                "original_estimate": { "type": "string" },
                "remaining_estimate": { "type": "string" }
            }),
            &["issue_key", "time_spent"],
        ),
        false,
        bind(clients, add_worklog),
    );
    registry.register(
        "jira_transition_issue",
        "Move a Jira issue through a workflow transition",
        schema(
            json!({
                "issue_key": { "type": "string" },
                "transition_id": { "type": "string" },
                "fields": { "type": "object" },
                "comment": { "type": "string" }
            }),
            &["issue_key", "transition_id"],
        ),
        false,
        bind(clients, transition_issue),
    );
}

/// Issue reduced to its key, id and the common display fields.
pub fn simplify_issue(issue: &Value) -> Value {
    json!({
        "key": text_at(issue, "/key"),
        "id": text_at(issue, "/id"),
        "fields": {
            "summary": text_at(issue, "/fields/summary"),
            "status": text_at(issue, "/fields/status/name"),
            "assignee": text_at(issue, "/fields/assignee/displayName"),
            "reporter": text_at(issue, "/fields/reporter/displayName"),
            "created": text_at(issue, "/fields/created"),
            "updated": text_at(issue, "/fields/updated"),
        },
        "success": true,
    })
}

pub fn simplify_search(results: &Value) -> Value {
    let issues: Vec<Value> = results["issues"]
        .as_array()
        .map(|issues| issues.iter().map(simplify_issue).collect())
        .unwrap_or_default();
    json!({
        "total": results["total"].as_i64().unwrap_or(0),
        "startAt": results["startAt"].as_i64().unwrap_or(0),
        "maxResults": results["maxResults"].as_i64().unwrap_or(0),
        "issues": issues,
        "success": true,
    })
}

fn summarize_each(list: &Value, shape: impl Fn(&Value) -> Value) -> Vec<Value> {
    list.as_array()
        .map(|items| items.iter().map(shape).collect())
        .unwrap_or_default()
}

async fn get_issue(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: GetIssueParams = parse_params(args)?;
    require_non_blank(&params.issue_key, "issue_key")?;
    let client = clients.jira(&auth)?;
    let result = client
        .get_issue(&params.issue_key, params.fields.as_deref(), params.expand.as_deref())
        .await;
    settle_with(result, ("issue_key", params.issue_key.as_str()), |issue| simplify_issue(&issue))
}

async fn search(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: SearchParams = parse_params(args)?;
    require_non_blank(&params.jql, "jql")?;
    let client = clients.jira(&auth)?;
    let query = SearchQuery {
        jql: &params.jql,
        fields: Some(params.fields.as_deref().unwrap_or(SEARCH_FIELDS)),
        start_at: params.start_at,
        max_results: params.limit,
        expand: params.expand.as_deref(),
    };
    let result = client.search(&query).await;
    settle_with(result, ("jql", params.jql.as_str()), |r| simplify_search(&r))
}

/// JQL selecting one project. The key is always quoted, so it cannot extend the query.
fn project_jql(project_key: &str) -> String {
    format!("project = \"{}\"", escape_literal(project_key.trim()))
}

async fn get_project_issues(
    clients: Arc<ClientFactory>,
    auth: AuthContext,
    args: Value,
) -> McpResult<Value> {
    let params: ProjectIssuesParams = parse_params(args)?;
    require_non_blank(&params.project_key, "project_key")?;
    let client = clients.jira(&auth)?;
    let jql = project_jql(&params.project_key);
    let query = SearchQuery {
        jql: &jql,
        fields: Some(PROJECT_ISSUE_FIELDS),
        start_at: params.start_at,
        max_results: params.limit,
        expand: None,
    };
    settle(client.search(&query).await, |r| simplify_search(&r))
}

async fn get_transitions(
    clients: Arc<ClientFactory>,
    auth: AuthContext,
    args: Value,
) -> McpResult<Value> {
    let params: IssueKeyParams = parse_params(args)?;
    require_non_blank(&params.issue_key, "issue_key")?;
    let client = clients.jira(&auth)?;
    settle(client.get_transitions(&params.issue_key).await, |body| {
        let transitions = summarize_each(&body["transitions"], |t| {
            json!({
                "id": text_at(t, "/id"),
                "name": text_at(t, "/name"),
                "to": { "name": text_at(t, "/to/name") },
            })
        });
        json!({ "success": true, "transitions": transitions })
    })
}

async fn get_worklog(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: IssueKeyParams = parse_params(args)?;
    require_non_blank(&params.issue_key, "issue_key")?;
    let client = clients.jira(&auth)?;
    settle(client.get_worklog(&params.issue_key).await, |mut body| {
        let worklogs = body.get_mut("worklogs").map(Value::take).unwrap_or_default();
        json!({ "success": true, "worklogs": worklogs })
    })
}

async fn get_all_projects(
    clients: Arc<ClientFactory>,
    auth: AuthContext,
    _args: Value,
) -> McpResult<Value> {
    let client = clients.jira(&auth)?;
    settle(client.get_all_projects().await, |body| {
        let projects = summarize_each(&body, |p| {
            json!({
                "id": text_at(p, "/id"),
                "key": text_at(p, "/key"),
                "name": text_at(p, "/name"),
            })
        });
        json!({ "success": true, "projects": projects })
    })
}

async fn get_user_profile(
    clients: Arc<ClientFactory>,
    auth: AuthContext,
    args: Value,
) -> McpResult<Value> {
    let params: UserParams = parse_params(args)?;
    require_non_blank(&params.user_identifier, "user_identifier")?;
    let client = clients.jira(&auth)?;
    settle(client.get_user(&params.user_identifier).await, |user| {
        json!({
            "success": true,
            "accountId": text_at(&user, "/accountId"),
            "displayName": text_at(&user, "/displayName"),
            "emailAddress": text_at(&user, "/emailAddress"),
        })
    })
}

async fn get_link_types(clients: Arc<ClientFactory>, auth: AuthContext, _args: Value) -> McpResult<Value> {
    let client = clients.jira(&auth)?;
    settle(client.get_link_types().await, |body| {
        let link_types = summarize_each(&body["issueLinkTypes"], |lt| {
            json!({
                "id": text_at(lt, "/id"),
                "name": text_at(lt, "/name"),
                "inward": text_at(lt, "/inward"),
                "outward": text_at(lt, "/outward"),
            })
        });
        json!({ "success": true, "linkTypes": link_types })
    })
}

async fn get_project_versions(
    clients: Arc<ClientFactory>,
    auth: AuthContext,
    args: Value,
) -> McpResult<Value> {
    let params: ProjectKeyParams = parse_params(args)?;
    require_non_blank(&params.project_key, "project_key")?;
    let client = clients.jira(&auth)?;
    settle(client.get_project_versions(&params.project_key).await, |versions| {
        json!({ "success": true, "versions": versions })
    })
}

/// `fields` payload for a new issue. Additional fields are applied last and may override.
fn create_fields(params: &CreateIssueParams, additional: Option<Map<String, Value>>) -> Value {
    let mut fields = Map::new();
    fields.insert("project".into(), json!({ "key": params.project_key }));
    fields.insert("summary".into(), json!(params.summary));
    fields.insert("issuetype".into(), json!({ "name": params.issue_type }));
    if let Some(description) = &params.description {
        fields.insert("description".into(), json!(description));
    }
    if let Some(assignee) = params.assignee.as_deref().filter(|a| !a.trim().is_empty()) {
        fields.insert("assignee".into(), json!({ "name": assignee }));
    }
    if let Some(components) = &params.components {
        let names: Vec<Value> = components
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|name| json!({ "name": name }))
            .collect();
        if !names.is_empty() {
            fields.insert("components".into(), Value::Array(names));
        }
    }
    if let Some(additional) = additional {
        fields.extend(additional);
    }
    Value::Object(fields)
}

async fn create_issue(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let mut params: CreateIssueParams = parse_params(args)?;
    require_non_blank(&params.project_key, "project_key")?;
    require_non_blank(&params.summary, "summary")?;
    require_non_blank(&params.issue_type, "issue_type")?;
    let additional = object_argument(params.additional_fields.take(), "additional_fields")?;
    let client = clients.jira(&auth)?;

    let fields = create_fields(&params, additional);
    settle(client.create_issue(fields).await, |created| {
        json!({
            "success": true,
            "key": text_at(&created, "/key"),
            "id": text_at(&created, "/id"),
        })
    })
}

async fn update_issue(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: UpdateIssueParams = parse_params(args)?;
    require_non_blank(&params.issue_key, "issue_key")?;
    let mut fields = object_argument(Some(params.fields), "fields")?.unwrap_or_default();
    if let Some(additional) = object_argument(params.additional_fields, "additional_fields")? {
        fields.extend(additional);
    }
    if fields.is_empty() {
        return Err(McpError::InvalidParams("fields must not be empty".to_string()));
    }
    let client = clients.jira(&auth)?;

    let result = client.update_issue(&params.issue_key, Value::Object(fields)).await;
    settle_with(result, ("issue_key", params.issue_key.as_str()), |_| {
        json!({ "success": true, "key": params.issue_key })
    })
}

async fn delete_issue(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: IssueKeyParams = parse_params(args)?;
    require_non_blank(&params.issue_key, "issue_key")?;
    let client = clients.jira(&auth)?;
    settle(client.delete_issue(&params.issue_key).await, |_| {
        json!({
            "success": true,
            "message": format!("Issue {} deleted successfully", params.issue_key),
        })
    })
}

async fn add_comment(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: CommentParams = parse_params(args)?;
    require_non_blank(&params.issue_key, "issue_key")?;
    require_non_blank(&params.comment, "comment")?;
    let client = clients.jira(&auth)?;
    settle(
        client.add_comment(&params.issue_key, &params.comment).await,
        |comment| json!({ "success": true, "id": text_at(&comment, "/id") }),
    )
}

fn worklog_body(params: &WorklogParams) -> Value {
    let mut body = Map::new();
    body.insert("timeSpent".into(), json!(params.time_spent));
    let optional = [
        ("comment", &params.comment),
        ("started", &params.started),
        ("originalEstimate", &params.original_estimate),
        ("remainingEstimate", &params.remaining_estimate),
    ];
    for (key, value) in optional {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            body.insert(key.into(), json!(value));
        }
    }
    Value::Object(body)
}

async fn add_worklog(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: WorklogParams = parse_params(args)?;
    require_non_blank(&params.issue_key, "issue_key")?;
    require_non_blank(&params.time_spent, "time_spent")?;
    let client = clients.jira(&auth)?;
    settle(
        client.add_worklog(&params.issue_key, &worklog_body(&params)).await,
        |worklog| json!({ "success": true, "id": text_at(&worklog, "/id") }),
    )
}

async fn transition_issue(
    clients: Arc<ClientFactory>,
    auth: AuthContext,
    args: Value,
) -> McpResult<Value> {
    let params: TransitionParams = parse_params(args)?;
    require_non_blank(&params.issue_key, "issue_key")?;
    require_non_blank(&params.transition_id, "transition_id")?;
    let fields = object_argument(params.fields, "fields")?.map(Value::Object);
    let client = clients.jira(&auth)?;

    let comment = params.comment.as_deref().filter(|c| !c.trim().is_empty());
    let body = transition_body(&params.transition_id, comment, fields);
    match client.transition_issue(&params.issue_key, &body).await {
        Ok(_) => Ok(json!({
            "success": true,
            "issue_key": params.issue_key,
            "transition_id": params.transition_id,
        })),
        Err(e) => {
            tracing::warn!("Transition of {} failed: {e}", params.issue_key);
            Ok(failure(e))
        }
    }
}
