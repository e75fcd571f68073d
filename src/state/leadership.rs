//! Cluster Leadership State
//!
//! The coordinator's record of the elastic IP allocation and the broker
//! currently bound to it.

use serde::{Deserialize, Serialize};

/// Elastic IP and leader bookkeeping for the current membership epoch.
///
/// Invariants: `allocation_id` is held exactly while membership is
/// non-empty; `leader_instance_id` is set exactly while an address
/// association exists; all fields clear together when the last broker
/// leaves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadershipState {
    /// Externally advertised elastic IP address
    pub elastic_ip: Option<String>,
    /// Cloud-side handle needed to release the address
    pub allocation_id: Option<String>,
    /// Instance currently associated with the elastic IP
    pub leader_instance_id: Option<String>,
    /// Private address of the current leader
    pub leader_private_ip: Option<String>,
}

impl LeadershipState {
    /// Create an empty leadership state
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an allocation handle is currently held
    pub fn has_allocation(&self) -> bool {
        self.allocation_id.is_some()
    }

    /// Record a fresh allocation
    pub fn set_allocation(&mut self, allocation_id: String, elastic_ip: String) {
        self.allocation_id = Some(allocation_id);
        self.elastic_ip = Some(elastic_ip);
    }

    /// Record a new leader association
    pub fn set_leader(&mut self, instance_id: String, private_ip: Option<String>) {
        self.leader_instance_id = Some(instance_id);
        self.leader_private_ip = private_ip;
    }

    /// Drop the association record, keeping the allocation
    pub fn clear_leader(&mut self) {
        self.leader_instance_id = None;
        self.leader_private_ip = None;
    }

    /// Reset everything; the cluster epoch has ended
    pub fn clear_all(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut state = LeadershipState::new();
        assert!(!state.has_allocation());

        state.set_allocation("eipalloc-1".into(), "52.1.2.3".into());
        state.set_leader("i-abc".into(), Some("10.0.0.1".into()));
        assert!(state.has_allocation());
        assert_eq!(state.leader_private_ip.as_deref(), Some("10.0.0.1"));

        state.clear_leader();
        assert!(state.has_allocation());
        assert!(state.leader_instance_id.is_none());

        state.clear_all();
        assert_eq!(state, LeadershipState::default());
    }
}
