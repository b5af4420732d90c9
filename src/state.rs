use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::task::TaskTracker;

use crate::config::Store;
use crate::dispatch::ReplayEngine;
use crate::registry::{EndpointRegistry, GroupRegistry, RegistryEvent, ToolRegistry};

const EVENT_CAPACITY: usize = 256;

/// Everything the capture side and the protocol side share.
pub struct AppState {
    pub endpoints: Arc<EndpointRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub groups: Arc<GroupRegistry>,
    pub replay: ReplayEngine,
    pub events: broadcast::Sender<RegistryEvent>,
    pub tasks: TaskTracker,
}

impl AppState {
    /// Wire up the registries and load persisted tools from `store`.
    pub fn new(store: Arc<Store>, max_tools: usize, replay: ReplayEngine) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let tools = Arc::new(ToolRegistry::new(max_tools, Arc::clone(&store), events.clone()));
        let groups = Arc::new(GroupRegistry::new(Arc::clone(&store), events.clone()));

        Self {
            endpoints: Arc::new(EndpointRegistry::new()),
            tools,
            groups,
            replay,
            events,
            tasks: TaskTracker::new(),
        }
    }
}
