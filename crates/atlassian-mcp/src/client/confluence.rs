//! Confluence REST API.

use serde_json::{json, Value};

use super::rest::{ClientError, ClientResult, RestClient};

const API: [&str; 2] = ["rest", "api"];

/// Expansion used when a page is fetched for display.
pub const PAGE_EXPAND: &str = "body.storage,version,space";

#[derive(Debug, Clone)]
pub struct ConfluenceClient {
    rest: RestClient,
}

impl ConfluenceClient {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }

    fn path<'a>(tail: &[&'a str]) -> Vec<&'a str> {
        API.iter().copied().chain(tail.iter().copied()).collect()
    }

    pub async fn get_page(&self, page_id: &str, expand: &str) -> ClientResult<Value> {
        self.rest
            .get(
                &Self::path(&["content", page_id]),
                &[("expand", expand.to_string())],
            )
            .await
    }

    /// First page in `space_key` titled `title`.
    pub async fn get_page_by_title(
        &self,
        space_key: &str,
        title: &str,
        expand: &str,
    ) -> ClientResult<Value> {
        let found = self
            .rest
            .get(
                &Self::path(&["content"]),
                &[
                    ("type", "page".to_string()),
                    ("spaceKey", space_key.to_string()),
                    ("title", title.to_string()),
                    ("expand", expand.to_string()),
                ],
            )
            .await?;
        found["results"]
            .as_array()
            .and_then(|r| r.first())
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("page '{title}' in space {space_key}")))
    }

    pub async fn search(&self, cql: &str, limit: u32) -> ClientResult<Value> {
        self.rest
            .get(
                &Self::path(&["content", "search"]),
                &[("cql", cql.to_string()), ("limit", limit.to_string())],
            )
            .await
    }

    pub async fn get_children(
        &self,
        page_id: &str,
        start: u32,
        limit: u32,
        expand: &str,
    ) -> ClientResult<Value> {
        self.rest
            .get(
                &Self::path(&["content", page_id, "child", "page"]),
                &[
                    ("start", start.to_string()),
                    ("limit", limit.to_string()),
                    ("expand", expand.to_string()),
                ],
            )
            .await
    }

    pub async fn get_comments(&self, page_id: &str) -> ClientResult<Value> {
        self.rest
            .get(
                &Self::path(&["content", page_id, "child", "comment"]),
                &[("expand", "body.storage,history".to_string())],
            )
            .await
    }

    pub async fn get_labels(&self, page_id: &str) -> ClientResult<Value> {
        self.rest
            .get(&Self::path(&["content", page_id, "label"]), &[])
            .await
    }

    pub async fn add_label(&self, page_id: &str, name: &str) -> ClientResult<Value> {
        self.rest
            .post(
                &Self::path(&["content", page_id, "label"]),
                &json!([{ "prefix": "global", "name": name }]),
            )
            .await
    }

    pub async fn create_page(
        &self,
        space_key: &str,
        title: &str,
        content: &str,
        parent_id: Option<&str>,
    ) -> ClientResult<Value> {
        let mut body = json!({
            "type": "page",
            "title": title,
            "space": { "key": space_key },
            "body": storage(content),
        });
        if let Some(parent) = parent_id {
            body["ancestors"] = json!([{ "id": parent }]);
        }
        self.rest.post(&Self::path(&["content"]), &body).await
    }

    /// Replace a page's title and body. Reads the current version first and writes the next one.
    pub async fn update_page(&self, page_id: &str, title: &str, content: &str) -> ClientResult<Value> {
        let current = self.get_page(page_id, "version").await?;
        let version = current["version"]["number"].as_u64().unwrap_or(0) + 1;
        let body = json!({
            "id": page_id,
            "type": "page",
            "title": title,
            "body": storage(content),
            "version": { "number": version },
        });
        self.rest.put(&Self::path(&["content", page_id]), &body).await
    }

    pub async fn delete_page(&self, page_id: &str) -> ClientResult<Value> {
        self.rest.delete(&Self::path(&["content", page_id])).await
    }

    pub async fn add_comment(&self, page_id: &str, content: &str) -> ClientResult<Value> {
        let body = json!({
            "type": "comment",
            "container": { "id": page_id, "type": "page" },
            "body": storage(content),
        });
        self.rest.post(&Self::path(&["content"]), &body).await
    }

    pub async fn search_user(&self, cql: &str, limit: u32) -> ClientResult<Value> {
        self.rest
            .get(
                &Self::path(&["search", "user"]),
                &[("cql", cql.to_string()), ("limit", limit.to_string())],
            )
            .await
    }
}

fn storage(content: &str) -> Value {
    json!({ "storage": { "value": content, "representation": "storage" } })
}
