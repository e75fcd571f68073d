//! Broker Membership Registry
//!
//! Tracks the broker nodes currently registered with the coordinator.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// Identity and network coordinates of a registered broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerNode {
    /// Cluster-unique identifier, assigned by the caller; election key
    pub unique_id: u32,
    /// Cloud compute instance identifier
    pub instance_id: String,
    /// Private network address
    pub ip_address: String,
    /// Broker service port
    pub port: u16,
    /// When the broker registered
    #[serde(default = "chrono::Utc::now")]
    pub registered_at: chrono::DateTime<chrono::Utc>,
}

impl BrokerNode {
    /// Create a new broker node record
    pub fn new(unique_id: u32, instance_id: String, ip_address: String, port: u16) -> Self {
        Self {
            unique_id,
            instance_id,
            ip_address,
            port,
            registered_at: chrono::Utc::now(),
        }
    }
}

/// In-memory mapping from unique id to broker node.
///
/// Keys are unique; the same instance id under two different unique ids is
/// tolerated but logged by the coordinator on insert.
#[derive(Debug, Default)]
pub struct BrokerRegistry {
    brokers: HashMap<u32, BrokerNode>,
}

impl BrokerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            brokers: HashMap::new(),
        }
    }

    /// Insert or overwrite the entry at the node's unique id.
    /// Returns the previous entry if one was replaced.
    pub fn insert(&mut self, node: BrokerNode) -> Option<BrokerNode> {
        self.brokers.insert(node.unique_id, node)
    }

    /// Remove and return the entry, or `None` if absent
    pub fn remove(&mut self, unique_id: u32) -> Option<BrokerNode> {
        self.brokers.remove(&unique_id)
    }

    /// Get a broker by unique id
    pub fn get(&self, unique_id: u32) -> Option<&BrokerNode> {
        self.brokers.get(&unique_id)
    }

    /// Check whether any registered broker runs on the given instance
    pub fn contains_instance(&self, instance_id: &str) -> bool {
        self.find_by_instance(instance_id).is_some()
    }

    /// The broker running on the given instance, if any
    pub fn find_by_instance(&self, instance_id: &str) -> Option<&BrokerNode> {
        self.brokers.values().find(|b| b.instance_id == instance_id)
    }

    /// Resolve a private address back to a broker record (linear scan)
    pub fn lookup_by_address(&self, ip_address: &str) -> Option<&BrokerNode> {
        self.brokers.values().find(|b| b.ip_address == ip_address)
    }

    /// All member private addresses except the given one, sorted by
    /// unique id for stable fan-out order
    pub fn peer_addresses(&self, exclude_address: &str) -> Vec<String> {
        let mut peers: Vec<&BrokerNode> = self
            .brokers
            .values()
            .filter(|b| b.ip_address != exclude_address)
            .collect();
        peers.sort_by_key(|b| b.unique_id);
        peers.into_iter().map(|b| b.ip_address.clone()).collect()
    }

    /// Like [`peer_addresses`](Self::peer_addresses) but keeps the
    /// registered port alongside each address, for point-to-point delivery
    pub fn peer_endpoints(&self, exclude_address: &str) -> Vec<(String, u16)> {
        let mut peers: Vec<&BrokerNode> = self
            .brokers
            .values()
            .filter(|b| b.ip_address != exclude_address)
            .collect();
        peers.sort_by_key(|b| b.unique_id);
        peers
            .into_iter()
            .map(|b| (b.ip_address.clone(), b.port))
            .collect()
    }

    /// The broker with the numerically maximum unique id, if any
    pub fn max_unique_id(&self) -> Option<&BrokerNode> {
        self.brokers.values().max_by_key(|b| b.unique_id)
    }

    /// Number of registered brokers
    pub fn len(&self) -> usize {
        self.brokers.len()
    }

    /// Whether the registry holds no brokers
    pub fn is_empty(&self) -> bool {
        self.brokers.is_empty()
    }

    /// Snapshot of the full membership map
    pub fn snapshot(&self) -> HashMap<u32, BrokerNode> {
        self.brokers.clone()
    }
}
