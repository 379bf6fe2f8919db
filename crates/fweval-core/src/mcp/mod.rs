//! MCP tool sessions.
//!
//! A [`ToolSession`] is one connected MCP server: the tools it exposes and a
//! way to call them. Sessions are owned by exactly one task and wrapped in a
//! [`SessionGuard`] so they are closed on every exit path.

pub mod http;
pub mod protocol;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::McpError;
use crate::obs;

pub use http::{HttpConnector, HttpToolSession};
pub use protocol::{CallToolResult, McpTool, ToolContent, MCP_PROTOCOL_VERSION};

#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Tools discovered when the session was opened.
    fn tools(&self) -> &[McpTool];

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError>;

    async fn close(&self) -> Result<(), McpError>;
}

/// Opens tool sessions; one per task.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn ToolSession>, McpError>;
}

/// Scoped ownership of a [`ToolSession`].
///
/// Prefer [`SessionGuard::close`]. If the guard is dropped without it (early
/// return, panic, cancelled future) the close is spawned on the current
/// runtime. Close failures are logged, never returned.
pub struct SessionGuard {
    session: Arc<dyn ToolSession>,
    closed: bool,
}

impl SessionGuard {
    pub fn new(session: Arc<dyn ToolSession>) -> Self {
        Self {
            session,
            closed: false,
        }
    }

    pub fn session(&self) -> &dyn ToolSession {
        self.session.as_ref()
    }

    pub async fn close(mut self) {
        self.closed = true;
        if let Err(e) = self.session.close().await {
            obs::emit_cleanup_failed("mcp session", &e);
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let session = Arc::clone(&self.session);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        obs::emit_cleanup_failed("mcp session", &e);
                    }
                });
            }
            Err(_) => obs::emit_cleanup_failed("mcp session", &"dropped outside a runtime"),
        }
    }
}
