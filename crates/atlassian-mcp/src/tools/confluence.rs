//! Confluence tools: search, pages, comments and labels.

use std::sync::Arc;

use atlassian_auth::AuthContext;
use serde::Deserialize;
use serde_json::{json, Value};

use super::cql::{content_query, user_query};
use super::registry::ToolRegistry;
use super::{bind, parse_params, require_non_blank, settle, settle_with, text_at};
use crate::client::{ClientFactory, PAGE_EXPAND};
use crate::types::{McpError, McpResult};

const DEFAULT_SEARCH_LIMIT: u32 = 10;
const DEFAULT_CHILDREN_LIMIT: u32 = 25;
const MAX_LIMIT: u32 = 50;

fn default_search_limit() -> u32 {
    DEFAULT_SEARCH_LIMIT
}

fn default_children_limit() -> u32 {
    DEFAULT_CHILDREN_LIMIT
}

fn default_true() -> bool {
    true
}

fn default_children_expand() -> String {
    "version".to_string()
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    cql: Option<String>,
    #[serde(default = "default_search_limit")]
    limit: u32,
}

impl SearchParams {
    /// `cql` wins over `query` when both are present.
    fn text(&self) -> Option<&str> {
        [self.cql.as_deref(), self.query.as_deref()]
            .into_iter()
            .flatten()
            .find(|q| !q.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct GetPageParams {
    #[serde(default)]
    page_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    space_key: Option<String>,
    #[serde(default = "default_true")]
    include_metadata: bool,
}

#[derive(Debug, Deserialize)]
struct ChildrenParams {
    parent_id: String,
    #[serde(default)]
    start: u32,
    #[serde(default = "default_children_limit")]
    limit: u32,
    #[serde(default = "default_children_expand")]
    expand: String,
}

#[derive(Debug, Deserialize)]
struct PageIdParams {
    page_id: String,
}

#[derive(Debug, Deserialize)]
struct LabelParams {
    page_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreatePageParams {
    space_key: String,
    title: String,
    content: String,
    #[serde(default)]
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdatePageParams {
    page_id: String,
    title: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CommentParams {
    page_id: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct UserSearchParams {
    query: String,
    #[serde(default = "default_search_limit")]
    limit: u32,
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({ "type": "object", "properties": properties, "required": required })
}

fn page_id_schema() -> Value {
    schema(
        json!({ "page_id": { "type": "string", "description": "Confluence page id" } }),
        &["page_id"],
    )
}

pub fn register(registry: &mut ToolRegistry, clients: &Arc<ClientFactory>) {
    registry.register_read_only(
        "confluence_search",
        "Search Confluence content with plain text or CQL",
        schema(
            json!({
                "query": { "type": "string", "description": "Plain text or a CQL query" },
                "cql": { "type": "string", "description": "CQL query, used instead of query when set" },
                "limit": { "type": "integer", "default": DEFAULT_SEARCH_LIMIT, "minimum": 1, "maximum": MAX_LIMIT }
            }),
            &[],
        ),
        bind(clients, search),
    );
    registry.register_read_only(
        "confluence_get_page",
        "Get a Confluence page by id, or by title and space key",
        schema(
            json!({
                "page_id": { "type": "string" },
                "title": { "type": "string" },
                "space_key": { "type": "string" },
                "include_metadata": { "type": "boolean", "default": true }
            }),
            &[],
        ),
        bind(clients, get_page),
    );
    registry.register_read_only(
        "confluence_get_page_children",
        "List the child pages of a Confluence page",
        schema(
            json!({
                "parent_id": { "type": "string" },
                "start": { "type": "integer", "default": 0, "minimum": 0 },
                "limit": { "type": "integer", "default": DEFAULT_CHILDREN_LIMIT, "minimum": 1, "maximum": MAX_LIMIT },
                "expand": { "type": "string", "default": "version" }
            }),
            &["parent_id"],
        ),
        bind(clients, get_page_children),
    );
    registry.register_read_only(
        "confluence_get_comments",
        "List the comments on a Confluence page",
        page_id_schema(),
        bind(clients, get_comments),
    );
    registry.register_read_only(
        "confluence_get_labels",
        "List the labels on a Confluence page",
        page_id_schema(),
        bind(clients, get_labels),
    );
    registry.register_read_only(
        "confluence_search_user",
        "Search Confluence users by name or CQL",
        schema(
            json!({
                "query": { "type": "string" },
                "limit": { "type": "integer", "default": DEFAULT_SEARCH_LIMIT, "minimum": 1, "maximum": MAX_LIMIT }
            }),
            &["query"],
        ),
        bind(clients, search_user),
    );

    registry.register(
        "confluence_add_label",
        "Add a label to a Confluence page",
        schema(
            json!({
                "page_id": { "type": "string" },
                "name": { "type": "string" }
            }),
            &["page_id", "name"],
        ),
        false,
        bind(clients, add_label),
    );
    registry.register(
        "confluence_create_page",
        "Create a Confluence page",
        schema(
            json!({
                "space_key": { "type": "string" },
                "title": { "type": "string" },
                "content": { "type": "string", "description": "Body in storage format" },
                "parent_id": { "type": "string" }
            }),
            &["space_key", "title", "content"],
        ),
        false,
        bind(clients, create_page),
    );
    registry.register(
        "confluence_update_page",
        "Replace the title and body of a Confluence page",
        schema(
            json!({
                "page_id": { "type": "string" },
                "title": { "type": "string" },
                "content": { "type": "string", "description": "Body in storage format" }
            }),
            &["page_id", "title", "content"],
        ),
        false,
        bind(clients, update_page),
    );
    registry.register(
        "confluence_delete_page",
        "Delete a Confluence page",
        page_id_schema(),
        false,
        bind(clients, delete_page),
    );
    registry.register(
        "confluence_add_comment",
        "Add a comment to a Confluence page",
        schema(
            json!({
                "page_id": { "type": "string" },
                "content": { "type": "string" }
            }),
            &["page_id", "content"],
        ),
        false,
        bind(clients, add_comment),
    );
}

fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_LIMIT)
}

fn results(body: &Value) -> impl Iterator<Item = &Value> {
    body["results"].as_array().into_iter().flatten()
}

pub fn simplify_page(page: &Value, include_metadata: bool) -> Value {
    let mut out = json!({
        "content": { "value": text_at(page, "/body/storage/value") },
        "success": true,
    });
    if include_metadata {
        out["metadata"] = json!({
            "id": text_at(page, "/id"),
            "title": text_at(page, "/title"),
            "type": text_at(page, "/type"),
            "space": text_at(page, "/space/key"),
            "version": page.pointer("/version/number").and_then(Value::as_i64).unwrap_or(0),
            "updated": text_at(page, "/version/when"),
            "updatedBy": text_at(page, "/version/by/displayName"),
        });
    }
    out
}

pub fn simplify_search(body: &Value) -> Value {
    let pages: Vec<Value> = results(body)
        .map(|page| {
            json!({
                "id": text_at(page, "/id"),
                "title": text_at(page, "/title"),
                "type": text_at(page, "/type"),
                "space": text_at(page, "/space/key"),
            })
        })
        .collect();
    json!({
        "total": body["totalSize"].as_i64().unwrap_or(pages.len() as i64),
        "results": pages,
        "success": true,
    })
}

fn label_names(body: &Value) -> Vec<String> {
    results(body).map(|label| text_at(label, "/name")).collect()
}

async fn search(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: SearchParams = parse_params(args)?;
    let query = params
        .text()
        .ok_or_else(|| McpError::InvalidParams("cql or query is required".to_string()))?
        .to_string();
    let client = clients.confluence(&auth)?;

    let cql = content_query(&query);
    tracing::debug!("Confluence search: {cql}");
    let result = client.search(&cql, clamp_limit(params.limit)).await;
    settle_with(result, ("query", query.as_str()), |body| simplify_search(&body))
}

async fn get_page(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: GetPageParams = parse_params(args)?;
    let non_blank = |v: &Option<String>| v.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);

    let lookup = match (
        non_blank(&params.page_id),
        non_blank(&params.title),
        non_blank(&params.space_key),
    ) {
        (Some(id), _, _) => PageLookup::Id(id),
        (None, Some(title), Some(space_key)) => PageLookup::Title { title, space_key },
        _ => {
            return Err(McpError::InvalidParams(
                "Either 'page_id' OR both 'title' and 'space_key' must be provided".to_string(),
            ))
        }
    };
    let client = clients.confluence(&auth)?;

    let result = match &lookup {
        PageLookup::Id(id) => client.get_page(id, PAGE_EXPAND).await,
        PageLookup::Title { title, space_key } => {
            client.get_page_by_title(space_key, title, PAGE_EXPAND).await
        }
    };
    settle(result, |page| simplify_page(&page, params.include_metadata))
}

enum PageLookup {
    Id(String),
    Title { title: String, space_key: String },
}

async fn get_page_children(
    clients: Arc<ClientFactory>,
    auth: AuthContext,
    args: Value,
) -> McpResult<Value> {
    let params: ChildrenParams = parse_params(args)?;
    require_non_blank(&params.parent_id, "parent_id")?;
    let client = clients.confluence(&auth)?;

    let result = client
        .get_children(&params.parent_id, params.start, clamp_limit(params.limit), &params.expand)
        .await;
    settle(result, |body| {
        let children: Vec<Value> = results(&body)
            .map(|page| {
                json!({
                    "id": text_at(page, "/id"),
                    "title": text_at(page, "/title"),
                    "type": text_at(page, "/type"),
                })
            })
            .collect();
        json!({
            "success": true,
            "parent_id": params.parent_id,
            "count": children.len(),
            "results": children,
        })
    })
}

async fn get_comments(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: PageIdParams = parse_params(args)?;
    require_non_blank(&params.page_id, "page_id")?;
    let client = clients.confluence(&auth)?;

    settle(client.get_comments(&params.page_id).await, |body| {
        let comments: Vec<Value> = results(&body)
            .map(|comment| {
                json!({
                    "id": text_at(comment, "/id"),
                    "content": text_at(comment, "/body/storage/value"),
                    "author": text_at(comment, "/history/createdBy/displayName"),
                })
            })
            .collect();
        json!({ "success": true, "comments": comments })
    })
}

async fn get_labels(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: PageIdParams = parse_params(args)?;
    require_non_blank(&params.page_id, "page_id")?;
    let client = clients.confluence(&auth)?;
    settle(client.get_labels(&params.page_id).await, |body| {
        json!({ "success": true, "labels": label_names(&body) })
    })
}

async fn search_user(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: UserSearchParams = parse_params(args)?;
    require_non_blank(&params.query, "query")?;
    let client = clients.confluence(&auth)?;

    let cql = user_query(params.query.trim());
    let result = client.search_user(&cql, clamp_limit(params.limit)).await;
    settle_with(result, ("query", params.query.as_str()), |body| {
        let users: Vec<Value> = results(&body)
            .map(|entry| {
                let user = entry.get("user").unwrap_or(entry);
                json!({
                    "accountId": text_at(user, "/accountId"),
                    "displayName": text_at(user, "/displayName"),
                    "email": text_at(user, "/email"),
                })
            })
            .collect();
        json!({ "success": true, "users": users })
    })
}

async fn add_label(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: LabelParams = parse_params(args)?;
    require_non_blank(&params.page_id, "page_id")?;
    require_non_blank(&params.name, "name")?;
    let client = clients.confluence(&auth)?;
    settle(client.add_label(&params.page_id, params.name.trim()).await, |body| {
        json!({ "success": true, "labels": label_names(&body) })
    })
}

async fn create_page(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: CreatePageParams = parse_params(args)?;
    require_non_blank(&params.space_key, "space_key")?;
    require_non_blank(&params.title, "title")?;
    require_non_blank(&params.content, "content")?;
    let parent_id = params.parent_id.as_deref().filter(|p| !p.trim().is_empty());
    let client = clients.confluence(&auth)?;

    let result = client
        .create_page(&params.space_key, &params.title, &params.content, parent_id)
        .await;
    settle(result, |page| {
        json!({
            "success": true,
            "id": text_at(&page, "/id"),
            "title": text_at(&page, "/title"),
            "url": text_at(&page, "/_links/webui"),
        })
    })
}

async fn update_page(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: UpdatePageParams = parse_params(args)?;
    require_non_blank(&params.page_id, "page_id")?;
    require_non_blank(&params.title, "title")?;
    let client = clients.confluence(&auth)?;

    let result = client
        .update_page(&params.page_id, &params.title, &params.content)
        .await;
    settle(result, |page| {
        json!({
            "success": true,
            "id": text_at(&page, "/id"),
            "title": text_at(&page, "/title"),
            "version": page.pointer("/version/number").and_then(Value::as_i64).unwrap_or(0),
        })
    })
}

async fn delete_page(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: PageIdParams = parse_params(args)?;
    require_non_blank(&params.page_id, "page_id")?;
    let client = clients.confluence(&auth)?;
    settle(client.delete_page(&params.page_id).await, |_| {
        json!({ "success": true, "message": "Page deleted successfully" })
    })
}

async fn add_comment(clients: Arc<ClientFactory>, auth: AuthContext, args: Value) -> McpResult<Value> {
    let params: CommentParams = parse_params(args)?;
    require_non_blank(&params.page_id, "page_id")?;
    require_non_blank(&params.content, "content")?;
    let client = clients.confluence(&auth)?;
    settle(client.add_comment(&params.page_id, &params.content).await, |comment| {
        json!({ "success": true, "id": text_at(&comment, "/id") })
    })
}
