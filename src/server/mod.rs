//! MCP surface over the registries.
//!
//! In per-tool mode every registered tool is one MCP tool; in grouped mode
//! every group is one MCP tool that picks a member by method and path. Both
//! modes also expose [`INTROSPECTION_TOOL`].

mod args;
mod handler;
mod http;
mod sessions;

pub use http::serve;

use rmcp::model::{CallToolResult, Content, JsonObject, Tool as McpTool};
use rmcp::{ErrorData as McpError, Peer, RoleServer};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatch::{DispatchError, Reply, SelectError, select_tool};
use crate::model::{Group, Tool};
use crate::registry::RegistryEvent;
use crate::state::AppState;
use args::{GroupCallArgs, NoArgs, ReplayArgs, input_schema};
use sessions::Sessions;

/// Read-only tool describing the current registry.
pub const INTROSPECTION_TOOL: &str = "registry_info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    PerTool,
    Grouped,
}

#[derive(Clone)]
pub struct ProtocolServer {
    inner: Arc<Inner>,
}

struct Inner {
    state: Arc<AppState>,
    mode: DispatchMode,
    name: String,
    /// Connected clients, told when the tool list changes.
    peers: Sessions<Peer<RoleServer>>,
}

impl ProtocolServer {
    pub fn new(state: Arc<AppState>, mode: DispatchMode, name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state,
                mode,
                name: name.into(),
                peers: Sessions::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn mode(&self) -> DispatchMode {
        self.inner.mode
    }

    fn state(&self) -> &AppState {
        &self.inner.state
    }

    /// Current tool listing for this mode.
    pub fn list(&self) -> Vec<McpTool> {
        let mut tools = match self.mode() {
            DispatchMode::PerTool => self
                .state()
                .tools
                .snapshot()
                .into_iter()
                .map(|tool| mcp_tool(tool.name, tool.description, input_schema::<ReplayArgs>()))
                .collect::<Vec<_>>(),
            DispatchMode::Grouped => self
                .state()
                .groups
                .snapshot()
                .into_values()
                .map(|group| {
                    let members = self
                        .state()
                        .groups
                        .members(&group.name, &self.state().tools)
                        .unwrap_or_default();
                    let description = group_description(&group, &members);
                    mcp_tool(group.name, description, input_schema::<GroupCallArgs>())
                })
                .collect::<Vec<_>>(),
        };

        let description = match self.mode() {
            DispatchMode::PerTool => "List every auto-discovered tool with its request template and usage",
            DispatchMode::Grouped => "List every tool group with its members and usage",
        };
        tools.push(mcp_tool(
            INTROSPECTION_TOOL.to_string(),
            description.to_string(),
            input_schema::<NoArgs>(),
        ));
        tools
    }

    /// Snapshot served by the introspection tool and `GET /debug`.
    pub fn introspect(&self) -> Value {
        let state = self.state();
        match self.mode() {
            DispatchMode::PerTool => {
                let tools = state.tools.snapshot();
                json!({
                    "tool_count": tools.len(),
                    "tool_names": tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                    "tools": tools,
                })
            }
            DispatchMode::Grouped => json!({
                "group_count": state.groups.len(),
                "groups": state.groups.snapshot(),
                "tools_count": state.tools.len(),
            }),
        }
    }

    /// Execute one tool call.
    ///
    /// Protocol-level mistakes (unknown tool, bad arguments, missing method)
    /// are MCP errors; selection and outbound failures are error results.
    pub async fn call(&self, name: &str, arguments: JsonObject) -> Result<CallToolResult, McpError> {
        if name == INTROSPECTION_TOOL {
            let body = serde_json::to_string_pretty(&self.introspect())
                .map_err(|e| McpError::internal_error(e.to_string(), None))?;
            return Ok(CallToolResult::success(vec![Content::text(body)]));
        }

        match self.mode() {
            DispatchMode::PerTool => self.call_endpoint(name, arguments).await,
            DispatchMode::Grouped => self.call_group(name, arguments).await,
        }
    }

    async fn call_endpoint(&self, name: &str, arguments: JsonObject) -> Result<CallToolResult, McpError> {
        let tool = self
            .state()
            .tools
            .get(name)
            .ok_or_else(|| McpError::invalid_params(format!("Unknown tool: {name}"), None))?;
        let args: ReplayArgs = decode_args(name, arguments)?;

        log::debug!("Calling tool {name}");
        let result = self
            .state()
            .replay
            .invoke(&tool, args.override_body.as_deref(), None)
            .await;
        Ok(self.finish(&tool, None, result).await)
    }

    async fn call_group(&self, name: &str, arguments: JsonObject) -> Result<CallToolResult, McpError> {
        let members = self
            .state()
            .groups
            .members(name, &self.state().tools)
            .ok_or_else(|| McpError::invalid_params(format!("Unknown tool: {name}"), None))?;
        let args: GroupCallArgs = decode_args(name, arguments)?;
        if args.method.is_empty() {
            return Err(McpError::invalid_params(SelectError::MissingMethod.to_string(), None));
        }

        if members.is_empty() {
            return Ok(error_result(SelectError::EmptyGroup(name.to_string()).to_string()));
        }
        let tool = match select_tool(&members, &args.method, args.path.as_deref()) {
            Ok(tool) => tool,
            Err(e) => return Ok(error_result(format!("tool selection failed: {e}"))),
        };

        log::debug!("Group {name} selected tool {}", tool.name);
        let result = self
            .state()
            .replay
            .invoke(tool, args.request_body.as_deref(), args.headers.as_ref())
            .await;
        Ok(self.finish(tool, Some(name), result).await)
    }

    /// Record usage for attempts that reached the network and shape the result.
    async fn finish(&self, tool: &Tool, group: Option<&str>, result: Result<Reply, DispatchError>) -> CallToolResult {
        let reached_network = match &result {
            Ok(_) => true,
            Err(e) => e.reached_network(),
        };
        if reached_network {
            self.record_usage(&tool.name, group).await;
        }

        match result {
            Ok(reply) => CallToolResult::success(vec![Content::text(reply.to_string())]),
            Err(e) => {
                log::warn!("Tool {} failed: {e}", tool.name);
                error_result(e.to_string())
            }
        }
    }

    /// Usage updates rewrite the config file, so they run on the blocking pool.
    async fn record_usage(&self, tool: &str, group: Option<&str>) {
        let tools = Arc::clone(&self.state().tools);
        let groups = Arc::clone(&self.state().groups);
        let tool = tool.to_string();
        let group = group.map(str::to_string);

        let saved = tokio::task::spawn_blocking(move || {
            if let Err(e) = tools.record_use(&tool) {
                log::debug!("Skipping usage update: {e}");
            }
            if let Some(group) = group
                && let Err(e) = groups.record_use(&group)
            {
                log::debug!("Skipping usage update: {e}");
            }
        })
        .await;
        if let Err(e) = saved {
            log::warn!("Usage update task failed: {e}");
        }
    }

    fn add_peer(&self, peer: Peer<RoleServer>) {
        self.inner.peers.add(peer);
        log::debug!("{} MCP clients connected", self.inner.peers.len());
    }

    async fn notify_tool_list_changed(&self) {
        let mut gone = Vec::new();
        for (id, peer) in self.inner.peers.open() {
            if let Err(e) = peer.notify_tool_list_changed().await {
                log::debug!("Dropping disconnected MCP client: {e}");
                gone.push(id);
            }
        }
        self.inner.peers.remove(&gone);
    }

    /// Push `tools/list_changed` to clients whenever this mode's listing changes.
    pub fn forward_events(
        &self,
        mut events: broadcast::Receiver<RegistryEvent>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let server = self.clone();
        self.state().tasks.spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => event,
                };
                let changed = match (event, server.mode()) {
                    (Ok(RegistryEvent::ToolAdded(_)), DispatchMode::PerTool) => true,
                    (Ok(RegistryEvent::GroupsRebuilt), DispatchMode::Grouped) => true,
                    (Ok(_), _) => false,
                    (Err(RecvError::Lagged(_)), _) => true,
                    (Err(RecvError::Closed), _) => break,
                };
                if changed {
                    server.notify_tool_list_changed().await;
                }
            }
        })
    }
}

fn mcp_tool(name: String, description: String, input_schema: Arc<JsonObject>) -> McpTool {
    McpTool {
        name: name.into(),
        title: None,
        description: Some(description.into()),
        input_schema,
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    }
}

fn group_description(group: &Group, members: &[Tool]) -> String {
    let mut description = format!("{}\n\nAvailable endpoints:\n", group.description);
    for tool in members {
        description.push_str(&format!("- {} {}\n", tool.method, tool.url));
    }
    description.push_str(
        "\nUsage: set 'method' (GET/POST/PUT/DELETE) and optionally 'path' to pick a specific endpoint. \
         Add 'request_body' and 'headers' as needed.",
    );
    description
}

fn decode_args<T: serde::de::DeserializeOwned>(name: &str, arguments: JsonObject) -> Result<T, McpError> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| McpError::invalid_params(format!("Invalid arguments for {name}: {e}"), None))
}

fn error_result(message: String) -> CallToolResult {
    CallToolResult::error(vec![Content::text(message)])
}
