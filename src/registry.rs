//! Cluster registry seam.
//!
//! The registry is an external membership service; the engine only needs
//! one lookup: all live nodes registered under a service identity.
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::settings::ServiceName;

/// Lookup interface against the cluster membership service.
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// Return all live nodes registered under `service`. Blocking on the
    /// backing service is fine; failures propagate to the caller.
    async fn get_all_nodes(&self, service: &ServiceName) -> Result<Vec<SocketAddr>>;
}

/// Registry backed by a fixed operator-supplied node list.
///
/// Serves one deployment, so lookups ignore the service identity. Operators
/// can still grow or shrink the list at runtime.
pub struct StaticRegistry {
    nodes: RwLock<Vec<SocketAddr>>,
}

impl StaticRegistry {
    pub fn new(nodes: Vec<SocketAddr>) -> Self {
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    pub async fn add_node(&self, address: SocketAddr) {
        let mut nodes = self.nodes.write().await;
        if !nodes.contains(&address) {
            nodes.push(address);
        }
    }

    pub async fn remove_node(&self, address: SocketAddr) {
        self.nodes.write().await.retain(|&addr| addr != address);
    }
}

#[async_trait]
impl NodeRegistry for StaticRegistry {
    async fn get_all_nodes(&self, _service: &ServiceName) -> Result<Vec<SocketAddr>> {
        Ok(self.nodes.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_registry_returns_seed_nodes() {
        let addr1: SocketAddr = "127.0.0.1:8631".parse().unwrap();
        let addr2: SocketAddr = "127.0.0.1:8632".parse().unwrap();
        let registry = StaticRegistry::new(vec![addr1, addr2]);

        let service = ServiceName::new("classifier", "default");
        let nodes = registry.get_all_nodes(&service).await.unwrap();
        assert_eq!(nodes, vec![addr1, addr2]);
    }

    #[tokio::test]
    async fn test_static_registry_add_remove() {
        let addr1: SocketAddr = "127.0.0.1:8631".parse().unwrap();
        let addr2: SocketAddr = "127.0.0.1:8632".parse().unwrap();
        let registry = StaticRegistry::new(vec![addr1]);
        let service = ServiceName::new("classifier", "default");

        registry.add_node(addr2).await;
        // Adding an address twice keeps the list deduplicated.
        registry.add_node(addr2).await;
        assert_eq!(
            registry.get_all_nodes(&service).await.unwrap(),
            vec![addr1, addr2]
        );

        registry.remove_node(addr1).await;
        assert_eq!(
            registry.get_all_nodes(&service).await.unwrap(),
            vec![addr2]
        );
    }
}
