//! Streamable-HTTP MCP client.
//!
//! Every JSON-RPC message is POSTed to the server URL. The server answers
//! with either a JSON body or an SSE stream whose `data:` events carry the
//! response. The `Mcp-Session-Id` header returned by `initialize` is echoed
//! on every later request and used for the closing `DELETE`.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::protocol::{
    CallToolResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult, McpTool,
    MCP_PROTOCOL_VERSION,
};
use super::{SessionConnector, ToolSession};
use crate::domain::McpError;

const SESSION_HEADER: &str = "Mcp-Session-Id";

pub struct HttpToolSession {
    http: reqwest::Client,
    url: String,
    session_id: Mutex<Option<String>>,
    next_id: AtomicI64,
    closed: AtomicBool,
    tools: Vec<McpTool>,
}

impl HttpToolSession {
    /// Handshake, then list tools.
    #[instrument(skip(http))]
    pub async fn connect(http: reqwest::Client, url: &str) -> Result<Self, McpError> {
        let mut session = Self {
            http,
            url: url.to_string(),
            session_id: Mutex::new(None),
            next_id: AtomicI64::new(1),
            closed: AtomicBool::new(false),
            tools: Vec::new(),
        };

        let init = session
            .request(
                "initialize",
                json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "fweval",
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            )
            .await?;
        debug!(
            server = init["serverInfo"]["name"].as_str().unwrap_or("unknown"),
            "mcp session initialized"
        );
        session
            .post(&JsonRpcRequest::notification("notifications/initialized"))
            .await?;

        let listed: ListToolsResult = serde_json::from_value(session.request("tools/list", json!({})).await?)
            .map_err(|e| McpError::Protocol(format!("invalid tools/list result: {e}")))?;
        debug!(count = listed.tools.len(), "discovered mcp tools");
        session.tools = listed.tools;
        Ok(session)
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|id| id.clone())
    }

    fn remember_session_id(&self, response: &reqwest::Response) {
        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if let Ok(mut slot) = self.session_id.lock() {
                *slot = Some(id.to_string());
            }
        }
    }

    async fn post(&self, message: &JsonRpcRequest) -> Result<Vec<JsonRpcResponse>, McpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::Closed);
        }
        let mut req = self
            .http
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(message);
        if let Some(id) = self.session_id() {
            req = req.header(SESSION_HEADER, id);
        }

        let response = req.send().await?;
        self.remember_session_id(&response);
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response.text().await?;
        parse_messages(&body, is_sse)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let messages = self.post(&JsonRpcRequest::call(id, method, params)).await?;
        let response = messages
            .into_iter()
            .find(|m| m.answers(id))
            .ok_or_else(|| McpError::Protocol(format!("no response to {method} (id {id})")))?;
        if let Some(err) = response.error {
            return Err(McpError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or_else(|| McpError::Protocol(format!("{method} response has no result")))
    }
}

/// Decode a POST body into JSON-RPC messages.
///
/// Empty bodies (`202 Accepted` for notifications) yield nothing. JSON bodies
/// may be a single message or a batch.
fn parse_messages(body: &str, is_sse: bool) -> Result<Vec<JsonRpcResponse>, McpError> {
    let payloads = if is_sse {
        sse_data(body)
    } else if body.trim().is_empty() {
        Vec::new()
    } else {
        vec![body.to_string()]
    };

    let mut out = Vec::new();
    for payload in payloads {
        let value: Value = serde_json::from_str(&payload)
            .map_err(|e| McpError::Protocol(format!("invalid json-rpc payload: {e}")))?;
        let batch = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        for item in batch {
            let msg = serde_json::from_value(item)
                .map_err(|e| McpError::Protocol(format!("invalid json-rpc message: {e}")))?;
            out.push(msg);
        }
    }
    Ok(out)
}

/// Data payloads of an SSE stream; multi-line `data:` fields are joined.
fn sse_data(body: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if !current.is_empty() {
                events.push(current.join("\n"));
                current.clear();
            }
        } else if let Some(data) = line.strip_prefix("data:") {
            current.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }
    if !current.is_empty() {
        events.push(current.join("\n"));
    }
    events
}

#[async_trait]
impl ToolSession for HttpToolSession {
    fn tools(&self) -> &[McpTool] {
        &self.tools
    }

    #[instrument(skip(self, arguments))]
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        let result = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("invalid tools/call result: {e}")))
    }

    async fn close(&self) -> Result<(), McpError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(id) = self.session_id() else {
            return Ok(());
        };
        let response = self
            .http
            .delete(&self.url)
            .header(SESSION_HEADER, id)
            .send()
            .await?;
        let status = response.status();
        // Servers without explicit session teardown answer 405.
        if status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED {
            Ok(())
        } else {
            Err(McpError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

/// Connects [`HttpToolSession`]s sharing one HTTP client.
#[derive(Clone, Default)]
pub struct HttpConnector {
    http: reqwest::Client,
}

impl HttpConnector {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SessionConnector for HttpConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn ToolSession>, McpError> {
        let session = HttpToolSession::connect(self.http.clone(), url).await?;
        Ok(Arc::new(session))
    }
}
