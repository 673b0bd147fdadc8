//! Jira REST API v2.

use serde_json::{json, Value};

use super::rest::{ClientError, ClientResult, RestClient};

const API: [&str; 3] = ["rest", "api", "2"];

/// Fields returned by issue lookups when the caller does not choose.
pub const DEFAULT_ISSUE_FIELDS: &str = "summary,status,assignee,reporter,created,updated";

#[derive(Debug, Clone)]
pub struct JiraClient {
    rest: RestClient,
}

/// Parameters for a JQL search.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery<'a> {
    pub jql: &'a str,
    pub fields: Option<&'a str>,
    pub start_at: u32,
    pub max_results: u32,
    pub expand: Option<&'a str>,
}

impl JiraClient {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }

    fn path<'a>(tail: &[&'a str]) -> Vec<&'a str> {
        API.iter().copied().chain(tail.iter().copied()).collect()
    }

    pub async fn get_issue(
        &self,
        issue_key: &str,
        fields: Option<&str>,
        expand: Option<&str>,
    ) -> ClientResult<Value> {
        let mut query = vec![("fields", fields.unwrap_or(DEFAULT_ISSUE_FIELDS).to_string())];
        if let Some(expand) = expand {
            query.push(("expand", expand.to_string()));
        }
        self.rest.get(&Self::path(&["issue", issue_key]), &query).await
    }

    pub async fn search(&self, search: &SearchQuery<'_>) -> ClientResult<Value> {
        let mut body = json!({
            "jql": search.jql,
            "startAt": search.start_at,
            "maxResults": search.max_results,
        });
        if let Some(fields) = search.fields {
            body["fields"] = fields
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .collect::<Vec<_>>()
                .into();
        }
        if let Some(expand) = search.expand {
            body["expand"] = json!([expand]);
        }
        self.rest.post(&Self::path(&["search"]), &body).await
    }

    pub async fn create_issue(&self, fields: Value) -> ClientResult<Value> {
        self.rest
            .post(&Self::path(&["issue"]), &json!({ "fields": fields }))
            .await
    }

    pub async fn update_issue(&self, issue_key: &str, fields: Value) -> ClientResult<Value> {
        self.rest
            .put(&Self::path(&["issue", issue_key]), &json!({ "fields": fields }))
            .await
    }

    pub async fn delete_issue(&self, issue_key: &str) -> ClientResult<Value> {
        self.rest.delete(&Self::path(&["issue", issue_key])).await
    }

    pub async fn add_comment(&self, issue_key: &str, comment: &str) -> ClientResult<Value> {
        self.rest
            .post(
                &Self::path(&["issue", issue_key, "comment"]),
                &json!({ "body": comment }),
            )
            .await
    }

    pub async fn get_worklog(&self, issue_key: &str) -> ClientResult<Value> {
        self.rest
            .get(&Self::path(&["issue", issue_key, "worklog"]), &[])
            .await
    }

    pub async fn add_worklog(&self, issue_key: &str, worklog: &Value) -> ClientResult<Value> {
        self.rest
            .post(&Self::path(&["issue", issue_key, "worklog"]), worklog)
            .await
    }

    pub async fn get_transitions(&self, issue_key: &str) -> ClientResult<Value> {
        self.rest
            .get(&Self::path(&["issue", issue_key, "transitions"]), &[])
            .await
    }

    pub async fn transition_issue(&self, issue_key: &str, body: &Value) -> ClientResult<Value> {
        self.rest
            .post(&Self::path(&["issue", issue_key, "transitions"]), body)
            .await
    }

    pub async fn get_all_projects(&self) -> ClientResult<Value> {
        self.rest.get(&Self::path(&["project"]), &[]).await
    }

    pub async fn get_project_versions(&self, project_key: &str) -> ClientResult<Value> {
        self.rest
            .get(&Self::path(&["project", project_key, "versions"]), &[])
            .await
    }

    pub async fn get_link_types(&self) -> ClientResult<Value> {
        self.rest.get(&Self::path(&["issueLinkType"]), &[]).await
    }

    /// Look a user up by username, falling back to account id.
    pub async fn get_user(&self, identifier: &str) -> ClientResult<Value> {
        let path = Self::path(&["user"]);
        match self
            .rest
            .get(&path, &[("username", identifier.to_string())])
            .await
        {
            Ok(user) if !user.is_null() => Ok(user),
            Ok(_) | Err(ClientError::Status { .. }) => {
                tracing::debug!("User lookup by username failed, trying account id");
                self.rest
                    .get(&path, &[("accountId", identifier.to_string())])
                    .await
            }
            Err(e) => Err(e),
        }
    }
}

/// Request body for a transition, with an optional comment and field updates.
pub fn transition_body(transition_id: &str, comment: Option<&str>, fields: Option<Value>) -> Value {
    let mut body = json!({ "transition": { "id": transition_id } });
    if let Some(fields) = fields {
        body["fields"] = fields;
    }
    if let Some(comment) = comment {
        body["update"] = json!({ "comment": [{ "add": { "body": comment } }] });
    }
    body
}
