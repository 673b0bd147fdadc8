//! Audit logging for tool invocations made with a verified identity.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Longest rendering of the arguments kept in a record.
pub const MAX_ARGUMENT_CHARS: usize = 500;

const MASK: &str = "***";
/// Matched anywhere in an argument name, ignoring case.
const SENSITIVE_WORDS: &[&str] = &["password", "secret", "token"];
/// Matched case-sensitively, so camelCase identifiers like `issueKey` stay readable.
const KEY_FRAGMENT: &str = "key";
/// Tool arguments naming a Jira or Confluence entity, never a credential.
const ENTITY_KEYS: &[&str] = &["issue_key", "project_key", "space_key"];

/// One successful tool call by a verified user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    /// Sanitized, truncated arguments.
    pub arguments: String,
}

impl AuditRecord {
    pub fn new(user_id: &str, tool: &str, arguments: &Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            tool: tool.to_string(),
            arguments: sanitize_arguments(arguments),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AuditError {
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for audit records. Failures are reported but never affect the response.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Writes records as structured events on the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        tracing::info!(
            target: "audit",
            id = %record.id,
            user = %record.user_id,
            time = %record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            tool = %record.tool,
            params = %record.arguments,
            "tool invocation"
        );
        Ok(())
    }
}

/// Keeps records in memory, newest last.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records
            .write()
            .map_err(|e| AuditError::Unavailable(e.to_string()))?
            .push(record.clone());
        Ok(())
    }
}

fn is_sensitive_key(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if SENSITIVE_WORDS.iter().any(|w| lower.contains(w)) {
        return true;
    }
    name.contains(KEY_FRAGMENT) && !ENTITY_KEYS.contains(&name)
}

fn mask(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive_key(k) {
                        Value::String(MASK.to_string())
                    } else {
                        mask(v)
                    };
                    (k.clone(), v)
                })
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(mask).collect()),
        other => other.clone(),
    }
}

/// Render arguments for an audit record: sensitive keys masked at any depth, output
/// capped at [`MAX_ARGUMENT_CHARS`] characters.
pub fn sanitize_arguments(arguments: &Value) -> String {
    if arguments.is_null() {
        return "{}".to_string();
    }
    let rendered = mask(arguments).to_string();
    if rendered.chars().count() <= MAX_ARGUMENT_CHARS {
        return rendered;
    }
    let mut truncated: String = rendered.chars().take(MAX_ARGUMENT_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}
