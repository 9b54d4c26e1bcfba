//! Cached view of the peers registered under this node's service.
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::Result;
use crate::registry::NodeRegistry;
use crate::settings::ServiceName;

/// Membership cache refreshed from the cluster registry.
///
/// The view deliberately keeps `self_id` in the list; excluding it (or
/// anything else) is a candidate-filter decision, not a membership one.
pub struct MembershipView {
    registry: Arc<dyn NodeRegistry>,
    service: ServiceName,
    peers: RwLock<Vec<SocketAddr>>,
}

impl MembershipView {
    pub fn new(registry: Arc<dyn NodeRegistry>, service: ServiceName) -> Self {
        Self {
            registry,
            service,
            peers: RwLock::new(Vec::new()),
        }
    }

    /// Query the registry and atomically replace the cached list.
    /// Returns the new peer count. Registry failures propagate and leave
    /// the previous cache in place.
    pub async fn refresh(&self) -> Result<usize> {
        let nodes = self.registry.get_all_nodes(&self.service).await?;
        let count = nodes.len();
        *self.peers.write().await = nodes;
        Ok(count)
    }

    /// Consistent copy of the cached peer list.
    pub async fn snapshot(&self) -> Vec<SocketAddr> {
        self.peers.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }
}
