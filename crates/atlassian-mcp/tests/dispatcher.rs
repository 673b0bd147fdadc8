//! Dispatcher integration tests for atlassian-mcp.
//!
//! Drives `ProtocolHandler` with raw JSON-RPC messages across protocol, read-only,
//! audit and concurrency cases.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use atlassian_auth::AuthContext;
use atlassian_mcp::audit::{AuditError, AuditRecord, AuditSink, MemoryAuditSink};
use atlassian_mcp::client::ClientFactory;
use atlassian_mcp::config::UpstreamConfig;
use atlassian_mcp::protocol::{ProtocolHandler, RequestScope};
use atlassian_mcp::tools::{default_registry, ToolRegistry};
use atlassian_mcp::transport::framing;
use atlassian_mcp::types::McpError;

// ─────────────────────── helpers ───────────────────────

fn schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Registry with an echo tool, a `whoami` tool, a failing tool and a counted write tool.
fn test_registry(writes: Arc<AtomicUsize>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register_read_only("echo", "Echo", schema(), |_auth, args| async move {
        Ok(args)
    });
    registry.register_read_only("whoami", "Caller identity", schema(), |auth: AuthContext, _args| async move {
        tokio::task::yield_now().await;
        Ok(json!({ "user": auth.user_id(), "jira": auth.jira_token() }))
    });
    registry.register_read_only("fails", "Always fails", schema(), |_auth, _args| async {
        Err(McpError::Upstream("HTTP 502: bad gateway".to_string()))
    });
    registry.register("delete_thing", "Delete", schema(), false, move |_auth, _args| {
        writes.fetch_add(1, Ordering::SeqCst);
        async { Ok(json!({ "deleted": true })) }
    });
    registry
}

fn handler_with(audit: Arc<dyn AuditSink>) -> (ProtocolHandler, Arc<AtomicUsize>) {
    let writes = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(test_registry(writes.clone()));
    (ProtocolHandler::with_audit(registry, audit), writes)
}

fn handler() -> (ProtocolHandler, Arc<AtomicUsize>) {
    handler_with(Arc::new(MemoryAuditSink::new()))
}

fn open_scope() -> RequestScope {
    RequestScope::new(AuthContext::open(None, None), false)
}

fn verified_scope(user: &str) -> RequestScope {
    RequestScope::new(AuthContext::verified(user, None, None), false)
}

fn read_only(scope: RequestScope) -> RequestScope {
    RequestScope::new(scope.auth, true)
}

/// Build an MCP JSON-RPC request.
fn mcp_request(id: i64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    })
}

fn tool_call(id: i64, name: &str, arguments: Value) -> Value {
    mcp_request(id, "tools/call", json!({ "name": name, "arguments": arguments }))
}

/// Send a JSON-RPC message through the handler and return the response.
async fn send(handler: &ProtocolHandler, msg: Value, scope: &RequestScope) -> Option<Value> {
    let parsed = framing::parse_message(msg.to_string().as_bytes()).unwrap();
    handler.handle_message(parsed, scope).await
}

/// Send and unwrap the response.
async fn send_unwrap(handler: &ProtocolHandler, msg: Value, scope: &RequestScope) -> Value {
    send(handler, msg, scope).await.expect("expected response")
}

fn error_code(resp: &Value) -> i64 {
    resp["error"]["code"]
        .as_i64()
        .unwrap_or_else(|| panic!("expected error, got {resp}"))
}

/// Decode the JSON text block of a tools/call result.
fn call_payload(resp: &Value) -> Value {
    let text = resp["result"]["content"][0]["text"]
        .as_str()
        .unwrap_or_else(|| panic!("expected text content, got {resp}"));
    serde_json::from_str(text).unwrap()
}

struct BrokenAuditSink;

impl AuditSink for BrokenAuditSink {
    fn record(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        Err(AuditError::Unavailable("disk full".to_string()))
    }
}

// ═══════════════════════════════════════════════════════
// PROTOCOL
// ═══════════════════════════════════════════════════════

/// Test 1: initialize reports the protocol version and server identity.
#[tokio::test]
async fn test_01_initialize() {
    let (handler, _) = handler();
    let resp = send_unwrap(
        &handler,
        mcp_request(
            0,
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "1.0" }
            }),
        ),
        &open_scope(),
    )
    .await;

    assert_eq!(resp["id"], 0);
    assert_eq!(resp["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(resp["result"]["serverInfo"]["name"], "atlassian-mcp");
    assert!(resp["result"]["capabilities"]["tools"].is_object());
}

/// Test 2: echo round trip through tools/call.
#[tokio::test]
async fn test_02_echo_round_trip() {
    let (handler, _) = handler();
    let resp = send_unwrap(&handler, tool_call(7, "echo", json!({"x": 1})), &open_scope()).await;

    assert_eq!(resp["jsonrpc"], "2.0");
    assert_eq!(resp["id"], 7);
    assert_eq!(resp["result"]["isError"], false);
    assert_eq!(resp["result"]["content"][0]["type"], "text");
    assert_eq!(call_payload(&resp), json!({"x": 1}));
}

/// Test 3: a method named after a tool returns the raw result.
#[tokio::test]
async fn test_03_direct_call_returns_raw_result() {
    let (handler, _) = handler();
    let resp = send_unwrap(&handler, mcp_request(3, "echo", json!({"a": [1, 2]})), &open_scope()).await;
    assert_eq!(resp["result"], json!({"a": [1, 2]}));
}

/// Test 4: string ids are echoed back unchanged.
#[tokio::test]
async fn test_04_string_id_echoed() {
    let (handler, _) = handler();
    let msg = json!({ "jsonrpc": "2.0", "id": "req-abc", "method": "ping" });
    let resp = send_unwrap(&handler, msg, &open_scope()).await;
    assert_eq!(resp["id"], "req-abc");
    assert_eq!(resp["result"], json!({}));
}

/// Test 5: notifications never produce a response.
#[tokio::test]
async fn test_05_notifications_are_silent() {
    let (handler, _) = handler();
    let scope = open_scope();

    for msg in [
        json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        json!({ "jsonrpc": "2.0", "method": "initialized" }),
        json!({ "jsonrpc": "2.0", "id": null, "method": "tools/list" }),
        json!({ "jsonrpc": "2.0", "method": "no_such_method" }),
        json!({ "jsonrpc": "2.0", "method": "tools/call", "params": { "name": "fails" } }),
    ] {
        assert!(send(&handler, msg.clone(), &scope).await.is_none(), "{msg}");
    }
}

/// Test 6: tools/call without a tool name is invalid params.
#[tokio::test]
async fn test_06_missing_tool_name() {
    let (handler, _) = handler();
    let scope = open_scope();

    let resp = send_unwrap(&handler, mcp_request(1, "tools/call", json!({"arguments": {}})), &scope).await;
    assert_eq!(error_code(&resp), -32602);
    assert_eq!(resp["id"], 1);

    let resp = send_unwrap(&handler, mcp_request(2, "tools/call", json!({"name": ""})), &scope).await;
    assert_eq!(error_code(&resp), -32602);

    let msg = json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/call" });
    let resp = send_unwrap(&handler, msg, &scope).await;
    assert_eq!(error_code(&resp), -32602);
}

/// Test 7: unknown tools and methods are method-not-found.
#[tokio::test]
async fn test_07_unknown_tool_and_method() {
    let (handler, _) = handler();
    let scope = open_scope();

    let resp = send_unwrap(&handler, tool_call(1, "nope", json!({})), &scope).await;
    assert_eq!(error_code(&resp), -32601);

    let resp = send_unwrap(&handler, mcp_request(2, "resources/list", json!({})), &scope).await;
    assert_eq!(error_code(&resp), -32601);
}

/// Test 8: missing arguments default to an empty object.
#[tokio::test]
async fn test_08_missing_arguments_default_to_empty_object() {
    let (handler, _) = handler();
    let resp = send_unwrap(&handler, mcp_request(1, "tools/call", json!({"name": "echo"})), &open_scope()).await;
    assert_eq!(call_payload(&resp), json!({}));
}

/// Test 9: wrong protocol version is an invalid request.
#[tokio::test]
async fn test_09_wrong_jsonrpc_version() {
    let (handler, _) = handler();
    let msg = json!({ "jsonrpc": "1.0", "id": 9, "method": "ping" });
    let resp = send_unwrap(&handler, msg, &open_scope()).await;
    assert_eq!(error_code(&resp), -32600);
    assert_eq!(resp["id"], 9);
}

/// Test 10: tool failures become error responses with the request id.
#[tokio::test]
async fn test_10_tool_failure_is_internal_error() {
    let (handler, _) = handler();
    let resp = send_unwrap(&handler, tool_call(10, "fails", json!({})), &open_scope()).await;
    assert_eq!(error_code(&resp), -32603);
    assert_eq!(resp["id"], 10);
    assert!(resp.get("result").is_none());
}

// ═══════════════════════════════════════════════════════
// READ-ONLY MODE
// ═══════════════════════════════════════════════════════

/// Test 11: tools/list hides write tools in read-only mode.
#[tokio::test]
async fn test_11_read_only_list() {
    let (handler, _) = handler();

    let resp = send_unwrap(&handler, mcp_request(1, "tools/list", json!({})), &open_scope()).await;
    let all: Vec<&str> = resp["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(all.contains(&"delete_thing"));
    assert!(resp["result"]["tools"][0]["inputSchema"].is_object());

    let resp = send_unwrap(&handler, mcp_request(2, "tools/list", json!({})), &read_only(open_scope())).await;
    let visible: Vec<&str> = resp["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(!visible.contains(&"delete_thing"));
    assert!(visible.contains(&"echo"));
    assert_eq!(visible.len(), all.len() - 1);
}

/// Test 12: a write tool called in read-only mode is refused before it runs.
#[tokio::test]
async fn test_12_read_only_call_never_invokes_handler() {
    let (handler, writes) = handler();
    let scope = read_only(open_scope());

    let resp = send_unwrap(&handler, tool_call(1, "delete_thing", json!({"id": "A-1"})), &scope).await;
    assert_eq!(error_code(&resp), -32000);
    assert_eq!(
        resp["error"]["message"],
        "Write operations not allowed in readonly mode"
    );

    let resp = send_unwrap(&handler, mcp_request(2, "delete_thing", json!({})), &scope).await;
    assert_eq!(error_code(&resp), -32000);
    assert_eq!(writes.load(Ordering::SeqCst), 0);

    let resp = send_unwrap(&handler, tool_call(3, "delete_thing", json!({})), &open_scope()).await;
    assert_eq!(call_payload(&resp), json!({"deleted": true}));
    assert_eq!(writes.load(Ordering::SeqCst), 1);
}

/// Test 13: read tools still run in read-only mode.
#[tokio::test]
async fn test_13_read_only_allows_reads() {
    let (handler, _) = handler();
    let resp = send_unwrap(&handler, tool_call(1, "echo", json!({"q": "x"})), &read_only(open_scope())).await;
    assert_eq!(call_payload(&resp), json!({"q": "x"}));
}

/// Test 14: deleting a Jira issue with X-Readonly is refused without an upstream call.
#[tokio::test]
async fn test_14_jira_delete_in_read_only_mode() {
    let clients = Arc::new(
        ClientFactory::new(&UpstreamConfig {
            jira_base_url: Some("http://127.0.0.1:9".to_string()),
            ..UpstreamConfig::default()
        })
        .unwrap(),
    );
    let audit = Arc::new(MemoryAuditSink::new());
    let handler = ProtocolHandler::with_audit(Arc::new(default_registry(clients)), audit.clone());
    let scope = RequestScope::new(
        AuthContext::verified("alice", Some("jira-token".to_string()), None),
        true,
    );

    let resp = send_unwrap(&handler, tool_call(1, "jira_delete_issue", json!({"issue_key": "PROJ-1"})), &scope).await;
    assert_eq!(error_code(&resp), -32000);
    assert!(audit.is_empty());
}

// ═══════════════════════════════════════════════════════
// AUDIT
// ═══════════════════════════════════════════════════════

/// Test 15: only verified callers are audited, once per successful call.
#[tokio::test]
async fn test_15_audit_only_in_verified_mode() {
    let audit = Arc::new(MemoryAuditSink::new());
    let (handler, _) = handler_with(audit.clone());

    send_unwrap(&handler, tool_call(1, "echo", json!({"x": 1})), &open_scope()).await;
    assert!(audit.is_empty());

    send_unwrap(&handler, tool_call(2, "echo", json!({"x": 1, "password": "hunter2"})), &verified_scope("alice")).await;
    let records = audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_id, "alice");
    assert_eq!(records[0].tool, "echo");
    assert!(!records[0].arguments.contains("hunter2"));

    send_unwrap(&handler, tool_call(3, "fails", json!({})), &verified_scope("alice")).await;
    send_unwrap(&handler, mcp_request(4, "tools/list", json!({})), &verified_scope("alice")).await;
    assert_eq!(audit.len(), 1);

    send_unwrap(&handler, mcp_request(5, "echo", json!({})), &verified_scope("bob")).await;
    assert_eq!(audit.len(), 2);
    assert_eq!(audit.records()[1].user_id, "bob");
}

/// Test 16: a failing audit sink never changes the response.
#[tokio::test]
async fn test_16_audit_failure_is_ignored() {
    let (handler, _) = handler_with(Arc::new(BrokenAuditSink));
    let resp = send_unwrap(&handler, tool_call(1, "echo", json!({"x": 2})), &verified_scope("alice")).await;
    assert!(resp.get("error").is_none(), "{resp}");
    assert_eq!(call_payload(&resp), json!({"x": 2}));
}

// ═══════════════════════════════════════════════════════
// CREDENTIALS & CONCURRENCY
// ═══════════════════════════════════════════════════════

/// Test 17: a Jira tool without a Jira token fails as an internal error naming the header.
#[tokio::test]
async fn test_17_missing_downstream_token() {
    let clients = Arc::new(
        ClientFactory::new(&UpstreamConfig {
            jira_base_url: Some("http://127.0.0.1:9".to_string()),
            ..UpstreamConfig::default()
        })
        .unwrap(),
    );
    let handler = ProtocolHandler::new(Arc::new(default_registry(clients)));

    let resp = send_unwrap(&handler, tool_call(1, "jira_get_issue", json!({"issue_key": "A-1"})), &verified_scope("alice")).await;
    assert_eq!(error_code(&resp), -32603);
    let message = resp["error"]["message"].as_str().unwrap();
    assert!(message.contains("No Jira token"), "{message}");
    assert!(message.contains("JIRA_TOKEN"), "{message}");

    let resp = send_unwrap(&handler, tool_call(2, "jira_get_issue", json!({})), &open_scope()).await;
    assert_eq!(error_code(&resp), -32602);
}

/// Test 18: concurrent requests each see only their own credentials.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_18_concurrent_scopes_are_isolated() {
    let (handler, _) = handler();
    let handler = Arc::new(handler);

    let mut tasks = Vec::new();
    for i in 0..32 {
        let handler = handler.clone();
        tasks.push(tokio::spawn(async move {
            let user = format!("user-{i}");
            let token = format!("jira-{i}");
            let scope = RequestScope::new(AuthContext::verified(&user, Some(token.clone()), None), false);
            let resp = send_unwrap(&handler, tool_call(i, "whoami", json!({})), &scope).await;
            (i, user, token, resp)
        }));
    }

    for task in tasks {
        let (i, user, token, resp) = task.await.unwrap();
        assert_eq!(resp["id"], i);
        let payload = call_payload(&resp);
        assert_eq!(payload["user"], user);
        assert_eq!(payload["jira"], token);
    }
}

/// Test 19: the catalogue lists every tool regardless of read-only state.
#[tokio::test]
async fn test_19_catalogue() {
    let (handler, _) = handler();
    let catalogue = serde_json::to_value(handler.catalogue()).unwrap();
    assert_eq!(catalogue["totalTools"], 4);
    assert_eq!(catalogue["serverInfo"]["name"], "atlassian-mcp");
    assert_eq!(catalogue["serverInfo"]["protocol"], "2024-11-05");
    assert_eq!(catalogue["tools"].as_array().unwrap().len(), 4);
}
