//! Per-request upstream clients for Jira and Confluence.

mod confluence;
mod jira;
mod rest;

pub use confluence::{ConfluenceClient, PAGE_EXPAND};
pub use jira::{transition_body, JiraClient, SearchQuery, DEFAULT_ISSUE_FIELDS};
pub use rest::{ClientError, ClientResult, RestClient};

use atlassian_auth::{AuthContext, Downstream};

use crate::config::UpstreamConfig;
use crate::types::{McpError, McpResult};

impl From<ClientError> for McpError {
    fn from(e: ClientError) -> Self {
        McpError::Upstream(e.to_string())
    }
}

/// Builds upstream clients from the request's credentials.
///
/// Holds the shared HTTP connection pool and base URLs only. Tokens come from the
/// [`AuthContext`] of each call and live as long as the client built from them.
#[derive(Debug, Clone)]
pub struct ClientFactory {
    http: reqwest::Client,
    jira_base_url: Option<String>,
    confluence_base_url: Option<String>,
}

impl ClientFactory {
    pub fn new(config: &UpstreamConfig) -> McpResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("atlassian-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| McpError::InternalError(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            jira_base_url: config.jira_base_url.clone(),
            confluence_base_url: config.confluence_base_url.clone(),
        })
    }

    pub fn jira(&self, auth: &AuthContext) -> McpResult<JiraClient> {
        let rest = self.rest(auth, Downstream::Jira, self.jira_base_url.as_deref())?;
        Ok(JiraClient::new(rest))
    }

    pub fn confluence(&self, auth: &AuthContext) -> McpResult<ConfluenceClient> {
        let rest = self.rest(
            auth,
            Downstream::Confluence,
            self.confluence_base_url.as_deref(),
        )?;
        Ok(ConfluenceClient::new(rest))
    }

    fn rest(
        &self,
        auth: &AuthContext,
        system: Downstream,
        base_url: Option<&str>,
    ) -> McpResult<RestClient> {
        let token = auth.require_token(system)?;
        let base_url = base_url
            .ok_or_else(|| McpError::InternalError(format!("{system} base URL is not configured")))?;
        Ok(RestClient::new(self.http.clone(), base_url, token)?)
    }
}
