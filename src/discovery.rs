//! From a captured request to a registered tool.
//!
//! Recording is synchronous so the capture loop never waits on naming; the
//! registration of a first-seen endpoint runs as a tracked background task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::model::{CapturedCall, CapturedRequest, ToolSpec};
use crate::naming::NamingStrategy;
use crate::registry::{EndpointRegistry, Observation, Registration, RegistryError, ToolRegistry};
use crate::target::Target;

pub struct Discovery {
    endpoints: Arc<EndpointRegistry>,
    tools: Arc<ToolRegistry>,
    naming: NamingStrategy,
    target: Target,
    tasks: TaskTracker,
    capacity_logged: Arc<AtomicBool>,
}

impl Discovery {
    pub fn new(
        endpoints: Arc<EndpointRegistry>,
        tools: Arc<ToolRegistry>,
        naming: NamingStrategy,
        target: Target,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            endpoints,
            tools,
            naming,
            target,
            tasks,
            capacity_logged: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Record `request`; on a first sighting, start registering its tool.
    pub fn observe(
        &self,
        request: CapturedRequest,
    ) -> Option<JoinHandle<Result<Registration, RegistryError>>> {
        match self.endpoints.record(request) {
            Observation::Repeat { call_count } => {
                log::trace!("Endpoint seen again ({call_count} calls)");
                None
            }
            Observation::FirstSight(call) => {
                log::info!("New endpoint discovered: {} {}", call.method, call.path);
                Some(self.spawn_registration(call))
            }
        }
    }

    fn spawn_registration(&self, call: CapturedCall) -> JoinHandle<Result<Registration, RegistryError>> {
        let tools = Arc::clone(&self.tools);
        let naming = self.naming.clone();
        let url = self.target.tool_url(&call.request_target());
        let capacity_logged = Arc::clone(&self.capacity_logged);

        self.tasks.spawn(async move {
            if tools.is_full() {
                if !capacity_logged.swap(true, Ordering::SeqCst) {
                    log::warn!(
                        "Tool limit ({}) reached, new endpoints will not be registered",
                        tools.max_tools()
                    );
                }
                return Err(RegistryError::Capacity {
                    max: tools.max_tools(),
                });
            }

            let name = naming.name_for(&call).await;
            let spec = ToolSpec {
                description: format!("Auto-discovered: {} {}", call.method, call.path),
                name,
                method: call.method,
                url,
                headers: call.headers,
                body: call.body,
            };

            let result = tools.register(spec);
            match &result {
                Ok(Registration::Created(tool)) => log::info!("MCP tool registered: {}", tool.name),
                Ok(Registration::AlreadyExists) => log::debug!("Tool name already taken, keeping the existing tool"),
                Err(e) => log::warn!("Failed to register tool: {e}"),
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Document, Store};
    use std::collections::BTreeMap;
    use tokio::sync::broadcast;

    fn request(method: &str, path: &str, query: Option<&str>) -> CapturedRequest {
        CapturedRequest {
            method: method.to_string(),
            path: path.to_string(),
            query: query.map(str::to_string),
            headers: BTreeMap::from([("Accept".to_string(), "application/json".to_string())]),
            body: String::new(),
        }
    }

    fn discovery(max_tools: usize) -> (Discovery, Arc<ToolRegistry>, Arc<EndpointRegistry>) {
        let (events, _) = broadcast::channel(16);
        let store = Arc::new(Store::in_memory(Document::default()));
        let tools = Arc::new(ToolRegistry::new(max_tools, store, events));
        let endpoints = Arc::new(EndpointRegistry::new());
        let discovery = Discovery::new(
            Arc::clone(&endpoints),
            Arc::clone(&tools),
            NamingStrategy::Deterministic,
            Target::parse("http://localhost:3000").unwrap(),
            TaskTracker::new(),
        );
        (discovery, tools, endpoints)
    }

    #[tokio::test]
    async fn test_first_sighting_registers_tool() {
        let (discovery, tools, _) = discovery(10);

        let handle = discovery
            .observe(request("GET", "/users", Some("page=2")))
            .unwrap();
        let Registration::Created(tool) = handle.await.unwrap().unwrap() else {
            panic!("expected a new tool");
        };

        assert_eq!(tool.name, "get_users");
        assert_eq!(tool.url, "http://localhost:3000/users?page=2");
        assert_eq!(tool.description, "Auto-discovered: GET /users");
        assert_eq!(tool.headers.get("Accept").unwrap(), "application/json");
        assert!(tools.contains("get_users"));
    }

    #[tokio::test]
    async fn test_repeats_only_bump_statistics() {
        let (discovery, tools, endpoints) = discovery(10);

        discovery.observe(request("GET", "/users", None)).unwrap().await.unwrap().unwrap();
        assert!(discovery.observe(request("GET", "/users", Some("page=3"))).is_none());

        assert_eq!(tools.len(), 1);
        assert_eq!(endpoints.get("GET", "/users").unwrap().call_count, 2);
        assert_eq!(tools.get("get_users").unwrap().url, "http://localhost:3000/users");
    }

    #[tokio::test]
    async fn test_distinct_methods_are_distinct_tools() {
        let (discovery, tools, _) = discovery(10);

        for method in ["GET", "POST"] {
            discovery.observe(request(method, "/users", None)).unwrap().await.unwrap().unwrap();
        }

        let names: Vec<String> = tools.snapshot().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["get_users", "post_users"]);
    }

    #[tokio::test]
    async fn test_capacity_stops_registration() {
        let (discovery, tools, endpoints) = discovery(1);

        discovery.observe(request("GET", "/a", None)).unwrap().await.unwrap().unwrap();
        let result = discovery.observe(request("GET", "/b", None)).unwrap().await.unwrap();

        assert!(matches!(result, Err(RegistryError::Capacity { max: 1 })));
        assert_eq!(tools.len(), 1);
        assert_eq!(endpoints.len(), 2);
    }
}
