//! Connected MCP clients that want `tools/list_changed` notifications.

use parking_lot::Mutex;
use rmcp::{Peer, RoleServer};
use std::sync::atomic::{AtomicU64, Ordering};

pub trait Session: Clone {
    fn is_closed(&self) -> bool;
}

impl Session for Peer<RoleServer> {
    fn is_closed(&self) -> bool {
        self.is_transport_closed()
    }
}

/// Client sessions keyed by a local id. Closed transports are pruned on every
/// add and every snapshot, so ended sessions do not pile up between
/// notifications.
pub struct Sessions<S> {
    live: Mutex<Vec<(u64, S)>>,
    next_id: AtomicU64,
}

impl<S: Session> Sessions<S> {
    pub fn new() -> Self {
        Self {
            live: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn add(&self, session: S) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut live = self.live.lock();
        live.retain(|(_, s)| !s.is_closed());
        live.push((id, session));
        id
    }

    /// Open sessions, after dropping the closed ones.
    pub fn open(&self) -> Vec<(u64, S)> {
        let mut live = self.live.lock();
        live.retain(|(_, s)| !s.is_closed());
        live.clone()
    }

    pub fn remove(&self, ids: &[u64]) {
        if ids.is_empty() {
            return;
        }
        self.live.lock().retain(|(id, _)| !ids.contains(id));
    }

    pub fn len(&self) -> usize {
        self.live.lock().len()
    }
}
