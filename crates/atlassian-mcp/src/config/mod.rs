//! Server configuration: command-line flags with environment fallbacks.

use std::time::Duration;

use atlassian_auth::{AuthError, CredentialResolver, SharedSecret};

pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// How inbound requests are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SecurityMode {
    /// Forward bearer tokens to Jira and Confluence unverified.
    #[default]
    #[value(name = "none")]
    Open,
    /// Require a signed or encrypted bearer token.
    #[value(name = "jwt")]
    Jwt,
}

impl SecurityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityMode::Open => "none",
            SecurityMode::Jwt => "jwt",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("JWT_SECRET is required when the security mode is jwt")]
    MissingSecret,

    #[error("Invalid JWT secret: {0}")]
    InvalidSecret(#[from] AuthError),
}

/// Where the upstream systems live and how long to wait for them.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub jira_base_url: Option<String>,
    pub confluence_base_url: Option<String>,
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            jira_base_url: None,
            confluence_base_url: None,
            timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        }
    }
}

/// Settings for the HTTP server.
#[derive(Debug, Clone, clap::Args)]
pub struct ServerConfig {
    /// Listen address (host:port).
    #[arg(long, env = "MCP_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,

    /// Inbound authentication: none forwards bearer tokens, jwt verifies them.
    #[arg(
        long,
        env = "APP_SECURITY_MODE",
        value_enum,
        default_value_t = SecurityMode::Open
    )]
    pub security_mode: SecurityMode,

    /// Shared secret for jwt mode, at least 32 bytes.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Jira base URL, e.g. https://jira.example.com
    #[arg(long, env = "JIRA_BASE_URL")]
    pub jira_base_url: Option<String>,

    /// Confluence base URL, e.g. https://confluence.example.com
    #[arg(long, env = "CONFLUENCE_BASE_URL")]
    pub confluence_base_url: Option<String>,

    /// Timeout for each upstream request, in seconds.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = DEFAULT_UPSTREAM_TIMEOUT_SECS)]
    pub upstream_timeout_secs: u64,
}

impl ServerConfig {
    pub fn upstream(&self) -> UpstreamConfig {
        let non_blank = |url: &Option<String>| {
            url.as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
        };
        UpstreamConfig {
            jira_base_url: non_blank(&self.jira_base_url),
            confluence_base_url: non_blank(&self.confluence_base_url),
            timeout: Duration::from_secs(self.upstream_timeout_secs.max(1)),
        }
    }

    /// Resolver for the configured security mode. Refuses a missing or short secret.
    pub fn credential_resolver(&self) -> Result<CredentialResolver, ConfigError> {
        match self.security_mode {
            SecurityMode::Open => Ok(CredentialResolver::open()),
            SecurityMode::Jwt => {
                let secret = self
                    .jwt_secret
                    .as_deref()
                    .filter(|s| !s.trim().is_empty())
                    .ok_or(ConfigError::MissingSecret)?;
                let secret = SharedSecret::new(secret.as_bytes())?;
                Ok(CredentialResolver::verified(secret))
            }
        }
    }
}
