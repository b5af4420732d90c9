use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, Implementation, InitializeRequestParam,
        InitializeResult, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
};

use super::{DispatchMode, ProtocolServer};

impl ServerHandler for ProtocolServer {
    fn get_info(&self) -> ServerInfo {
        let mut server_info = Implementation::from_build_env();
        server_info.name = self.name().to_string();

        let instructions = match self.mode() {
            DispatchMode::PerTool => {
                "Each tool replays an HTTP request observed against the local target service. \
                 Pass override_body to change the request body."
            }
            DispatchMode::Grouped => {
                "Each tool groups related HTTP endpoints of the local target service. \
                 Pass method (and optionally path) to pick the endpoint to call."
            }
        };

        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_tool_list_changed()
                .build(),
            server_info,
            instructions: Some(instructions.to_string()),
        }
    }

    async fn initialize(
        &self,
        request: InitializeRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        log::info!(
            "MCP client connected: {} {}",
            request.client_info.name,
            request.client_info.version
        );
        self.add_peer(context.peer.clone());
        Ok(self.get_info())
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = self.list();
        log::debug!("Serving {} tools", tools.len());
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let arguments = request.arguments.unwrap_or_default();
        self.call(&request.name, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Document, Store};
    use crate::dispatch::ReplayEngine;
    use crate::state::AppState;
    use std::sync::Arc;

    #[test]
    fn test_info_advertises_list_changes() {
        let store = Arc::new(Store::in_memory(Document::default()));
        let state = Arc::new(AppState::new(store, 10, ReplayEngine::new().unwrap()));
        let server = ProtocolServer::new(state, DispatchMode::Grouped, "my-api");

        let info = server.get_info();
        assert_eq!(info.server_info.name, "my-api");
        let tools = info.capabilities.tools.unwrap();
        assert_eq!(tools.list_changed, Some(true));
    }
}
