//! Coordination Core
//!
//! Owns the membership registry and leadership state behind one
//! serialization domain and drives the elastic address lifecycle:
//! allocation on the first registration, association with whichever broker
//! holds leadership, disassociation and release as membership drains.
//!
//! Registration, deregistration, election, and failover all lock the same
//! mutex, so a failover's resolve/remove/elect/associate sequence can never
//! interleave with a concurrent registration. Cloud calls are awaited while
//! holding the lock; the probe timeout bounds the critical section.

pub mod election;
pub mod failover;

pub use failover::FailoverOutcome;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cloud::CloudProvider;
use crate::config::FailoverConfig;
use crate::error::Result;
use crate::peers::PeerTransport;
use crate::state::{BrokerNode, BrokerRegistry, LeadershipState};

/// Registry and leadership state, only ever touched under the coordinator's
/// mutex
struct CoordinatorInner {
    registry: BrokerRegistry,
    leadership: LeadershipState,
}

/// The coordination state machine
pub struct Coordinator {
    inner: Mutex<CoordinatorInner>,
    cloud: Arc<dyn CloudProvider>,
    peers: Arc<dyn PeerTransport>,
    failover: FailoverConfig,
}

impl Coordinator {
    /// Create a coordinator with empty membership
    pub fn new(
        cloud: Arc<dyn CloudProvider>,
        peers: Arc<dyn PeerTransport>,
        failover: FailoverConfig,
    ) -> Self {
        Self {
            inner: Mutex::new(CoordinatorInner {
                registry: BrokerRegistry::new(),
                leadership: LeadershipState::new(),
            }),
            cloud,
            peers,
            failover,
        }
    }

    /// Register a broker. The first registrant becomes leader immediately:
    /// the elastic IP is allocated and associated with it, no election.
    pub async fn register(&self, node: BrokerNode) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner.registry.find_by_instance(&node.instance_id) {
            if existing.unique_id != node.unique_id {
                warn!(
                    "Instance {} is already registered as broker {} (now also broker {})",
                    node.instance_id, existing.unique_id, node.unique_id
                );
            }
        }

        let first_member = inner.registry.is_empty();
        let unique_id = node.unique_id;
        let instance_id = node.instance_id.clone();
        if let Some(previous) = inner.registry.insert(node) {
            info!(
                "Broker {} re-registered, replacing instance {}",
                unique_id, previous.instance_id
            );
        }

        if first_member {
            self.ensure_allocated(&mut inner).await?;
            self.associate_with_leader(&mut inner, &instance_id).await?;
        }

        info!("Broker {} registered ({} in cluster)", unique_id, inner.registry.len());
        Ok(())
    }

    /// Deregister a broker. Absent ids are a no-op. Removing the current
    /// leader disassociates the elastic IP first, then elects a successor
    /// from the remaining membership.
    pub async fn deregister(&self, unique_id: u32) -> Result<Option<BrokerNode>> {
        let mut inner = self.inner.lock().await;

        let removed = self.remove_broker(&mut inner, unique_id).await?;
        match removed {
            Some((node, was_leader)) => {
                if was_leader {
                    self.elect_and_associate(&mut inner).await?;
                }
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    /// Remove a broker from membership and tear down its cloud resources:
    /// disassociate the elastic IP if it held leadership, then terminate
    /// the instance. Returns the removed node and whether it was leader.
    async fn remove_broker(
        &self,
        inner: &mut CoordinatorInner,
        unique_id: u32,
    ) -> Result<Option<(BrokerNode, bool)>> {
        let node = match inner.registry.remove(unique_id) {
            Some(node) => node,
            None => {
                debug!("Deregister of unknown broker {} ignored", unique_id);
                return Ok(None);
            }
        };

        let was_leader =
            inner.leadership.leader_instance_id.as_deref() == Some(node.instance_id.as_str());
        if was_leader {
            self.disassociate(inner, &node.instance_id).await?;
        }

        self.cloud.terminate_instance(&node.instance_id).await?;
        info!(
            "Broker {} deregistered, instance {} terminated",
            unique_id, node.instance_id
        );
        Ok(Some((node, was_leader)))
    }

    /// Allocate the cluster's elastic IP if no allocation handle is held.
    /// Idempotent; called on the empty-to-non-empty membership edge.
    async fn ensure_allocated(&self, inner: &mut CoordinatorInner) -> Result<()> {
        if inner.leadership.has_allocation() {
            return Ok(());
        }

        let allocation = self.cloud.allocate_address().await?;
        info!(
            "Allocated elastic IP {} ({})",
            allocation.public_ip, allocation.allocation_id
        );
        inner
            .leadership
            .set_allocation(allocation.allocation_id, allocation.public_ip);
        Ok(())
    }

    /// Bind the elastic IP to a broker instance and record it as leader.
    ///
    /// Skipped (not an error) unless an allocation handle is held and the
    /// instance belongs to a registered broker; the second guard keeps the
    /// advertised address off instances outside the managed cluster.
    async fn associate_with_leader(
        &self,
        inner: &mut CoordinatorInner,
        instance_id: &str,
    ) -> Result<bool> {
        let allocation_id = match &inner.leadership.allocation_id {
            Some(id) => id.clone(),
            None => {
                warn!(
                    "Skipping association of {}: no elastic IP allocation held",
                    instance_id
                );
                return Ok(false);
            }
        };
        if !inner.registry.contains_instance(instance_id) {
            warn!(
                "Skipping association of {}: not a registered broker instance",
                instance_id
            );
            return Ok(false);
        }

        self.cloud
            .associate_address(&allocation_id, instance_id)
            .await?;

        let private_ip = self.cloud.instance_private_ip(instance_id).await?;
        if private_ip.is_none() {
            warn!(
                "Could not resolve a private IP for leader instance {}",
                instance_id
            );
        }
        inner
            .leadership
            .set_leader(instance_id.to_string(), private_ip);

        info!("Elastic IP associated with leader instance {}", instance_id);
        Ok(true)
    }

    /// Undo the elastic IP binding currently held by an instance. The
    /// provider's live bindings are authoritative, not our own record.
    /// Once membership is empty the allocation itself is released and the
    /// leadership state cleared; the next epoch gets a fresh handle.
    async fn disassociate(&self, inner: &mut CoordinatorInner, instance_id: &str) -> Result<()> {
        let associations = self.cloud.describe_associations().await?;
        match associations.iter().find(|a| a.instance_id == instance_id) {
            Some(association) => {
                self.cloud
                    .disassociate_address(&association.association_id)
                    .await?;
                info!("Elastic IP disassociated from instance {}", instance_id);
            }
            None => {
                debug!("No live elastic IP association for instance {}", instance_id);
            }
        }
        inner.leadership.clear_leader();

        if inner.registry.is_empty() {
            if let Some(allocation_id) = inner.leadership.allocation_id.clone() {
                self.cloud.release_address(&allocation_id).await?;
                info!("Cluster empty, released elastic IP allocation {}", allocation_id);
            }
            inner.leadership.clear_all();
        }
        Ok(())
    }

    /// Snapshot of the full membership map
    pub async fn registry_snapshot(&self) -> HashMap<u32, BrokerNode> {
        self.inner.lock().await.registry.snapshot()
    }

    /// Snapshot of the leadership state
    pub async fn leadership_snapshot(&self) -> LeadershipState {
        self.inner.lock().await.leadership.clone()
    }

    /// The currently advertised elastic IP, if any
    pub async fn elastic_ip(&self) -> Option<String> {
        self.inner.lock().await.leadership.elastic_ip.clone()
    }

    /// The current leader's private address, if any
    pub async fn leader_private_ip(&self) -> Option<String> {
        self.inner.lock().await.leadership.leader_private_ip.clone()
    }

    /// Private addresses of all brokers except the current leader
    pub async fn peer_addresses(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let exclude = inner.leadership.leader_private_ip.as_deref().unwrap_or("");
        inner.registry.peer_addresses(exclude)
    }

    /// Number of registered brokers
    pub async fn broker_count(&self) -> usize {
        self.inner.lock().await.registry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::MockCloudProvider;
    use crate::error::Error;

    /// Transport that never probes or notifies; registration and
    /// deregistration paths must not touch peers.
    struct NullTransport;

    #[async_trait::async_trait]
    impl PeerTransport for NullTransport {
        async fn probe_leader(&self, _address: &str, _port: u16) -> bool {
            panic!("unexpected probe");
        }

        async fn notify_leader_change(
            &self,
            _address: &str,
            _port: u16,
            _new_leader_ip: &str,
        ) -> Result<()> {
            panic!("unexpected notification");
        }
    }

    fn coordinator_with(cloud: Arc<MockCloudProvider>) -> Coordinator {
        Coordinator::new(cloud, Arc::new(NullTransport), FailoverConfig::default())
    }

    fn broker(unique_id: u32, instance_id: &str, ip: &str) -> BrokerNode {
        BrokerNode::new(unique_id, instance_id.to_string(), ip.to_string(), 9000)
    }

    #[tokio::test]
    async fn test_first_registration_allocates_and_associates_without_election() {
        let cloud = Arc::new(MockCloudProvider::new());
        cloud.add_instance("i-a", "10.0.0.1");
        let coordinator = coordinator_with(Arc::clone(&cloud));

        coordinator.register(broker(3, "i-a", "10.0.0.1")).await.unwrap();

        let counts = cloud.counts();
        assert_eq!(counts.allocate, 1);
        assert_eq!(counts.associate, 1);

        let leadership = coordinator.leadership_snapshot().await;
        assert_eq!(leadership.leader_instance_id.as_deref(), Some("i-a"));
        assert_eq!(leadership.leader_private_ip.as_deref(), Some("10.0.0.1"));
        assert!(leadership.has_allocation());
    }

    #[tokio::test]
    async fn test_later_registrations_do_not_reallocate_or_reassociate() {
        let cloud = Arc::new(MockCloudProvider::new());
        cloud.add_instance("i-a", "10.0.0.1");
        cloud.add_instance("i-b", "10.0.0.2");
        let coordinator = coordinator_with(Arc::clone(&cloud));

        coordinator.register(broker(3, "i-a", "10.0.0.1")).await.unwrap();
        coordinator.register(broker(7, "i-b", "10.0.0.2")).await.unwrap();

        let counts = cloud.counts();
        assert_eq!(counts.allocate, 1);
        assert_eq!(counts.associate, 1);
        // The first registrant keeps leadership even though 7 > 3.
        assert_eq!(
            coordinator.leadership_snapshot().await.leader_instance_id.as_deref(),
            Some("i-a")
        );
    }

    #[tokio::test]
    async fn test_single_allocation_across_register_deregister_sequences() {
        let cloud = Arc::new(MockCloudProvider::new());
        for (instance, ip) in [("i-a", "10.0.0.1"), ("i-b", "10.0.0.2"), ("i-c", "10.0.0.3")] {
            cloud.add_instance(instance, ip);
        }
        let coordinator = coordinator_with(Arc::clone(&cloud));

        coordinator.register(broker(1, "i-a", "10.0.0.1")).await.unwrap();
        coordinator.register(broker(2, "i-b", "10.0.0.2")).await.unwrap();
        coordinator.deregister(2).await.unwrap();
        coordinator.register(broker(4, "i-c", "10.0.0.3")).await.unwrap();

        assert_eq!(cloud.counts().allocate, 1);
        assert_eq!(cloud.live_allocations().len(), 1);
    }

    #[tokio::test]
    async fn test_deregister_non_leader_leaves_leadership_alone() {
        let cloud = Arc::new(MockCloudProvider::new());
        cloud.add_instance("i-a", "10.0.0.1");
        cloud.add_instance("i-b", "10.0.0.2");
        let coordinator = coordinator_with(Arc::clone(&cloud));

        coordinator.register(broker(3, "i-a", "10.0.0.1")).await.unwrap();
        coordinator.register(broker(7, "i-b", "10.0.0.2")).await.unwrap();

        let before = coordinator.leadership_snapshot().await;
        let removed = coordinator.deregister(7).await.unwrap().unwrap();

        assert_eq!(removed.instance_id, "i-b");
        assert_eq!(cloud.counts().disassociate, 0);
        assert_eq!(cloud.counts().associate, 1);
        assert_eq!(coordinator.leadership_snapshot().await, before);
        assert_eq!(cloud.terminated_instances(), vec!["i-b".to_string()]);
    }

    #[tokio::test]
    async fn test_deregister_leader_disassociates_then_elects() {
        let cloud = Arc::new(MockCloudProvider::new());
        cloud.add_instance("i-a", "10.0.0.1");
        cloud.add_instance("i-b", "10.0.0.2");
        let coordinator = coordinator_with(Arc::clone(&cloud));

        coordinator.register(broker(3, "i-a", "10.0.0.1")).await.unwrap();
        coordinator.register(broker(7, "i-b", "10.0.0.2")).await.unwrap();

        coordinator.deregister(3).await.unwrap();

        let counts = cloud.counts();
        assert_eq!(counts.disassociate, 1);
        assert_eq!(counts.associate, 2);

        let leadership = coordinator.leadership_snapshot().await;
        assert_eq!(leadership.leader_instance_id.as_deref(), Some("i-b"));
        assert_eq!(leadership.leader_private_ip.as_deref(), Some("10.0.0.2"));
    }

    #[tokio::test]
    async fn test_deregister_unknown_id_is_noop() {
        let cloud = Arc::new(MockCloudProvider::new());
        let coordinator = coordinator_with(Arc::clone(&cloud));

        assert!(coordinator.deregister(42).await.unwrap().is_none());
        assert_eq!(cloud.counts(), Default::default());
    }

    #[tokio::test]
    async fn test_last_deregistration_releases_allocation_and_clears_state() {
        let cloud = Arc::new(MockCloudProvider::new());
        cloud.add_instance("i-a", "10.0.0.1");
        cloud.add_instance("i-b", "10.0.0.2");
        let coordinator = coordinator_with(Arc::clone(&cloud));

        coordinator.register(broker(3, "i-a", "10.0.0.1")).await.unwrap();
        let first_allocation = coordinator.leadership_snapshot().await.allocation_id.unwrap();

        coordinator.deregister(3).await.unwrap();
        assert_eq!(coordinator.leadership_snapshot().await, LeadershipState::default());
        assert!(cloud.live_allocations().is_empty());

        // The next epoch gets a fresh handle.
        coordinator.register(broker(5, "i-b", "10.0.0.2")).await.unwrap();
        let second_allocation = coordinator.leadership_snapshot().await.allocation_id.unwrap();
        assert_ne!(first_allocation, second_allocation);
    }

    #[tokio::test]
    async fn test_allocation_failure_propagates() {
        let cloud = Arc::new(MockCloudProvider::new());
        cloud.add_instance("i-a", "10.0.0.1");
        cloud.fail_next_allocate();
        let coordinator = coordinator_with(Arc::clone(&cloud));

        let err = coordinator
            .register(broker(3, "i-a", "10.0.0.1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cloud { .. }));
    }

    #[tokio::test]
    async fn test_unresolvable_private_ip_leaves_leader_ip_unset() {
        let cloud = Arc::new(MockCloudProvider::new());
        // Instance deliberately not seeded, so resolution returns None.
        let coordinator = coordinator_with(Arc::clone(&cloud));

        coordinator.register(broker(3, "i-a", "10.0.0.1")).await.unwrap();

        let leadership = coordinator.leadership_snapshot().await;
        assert_eq!(leadership.leader_instance_id.as_deref(), Some("i-a"));
        assert!(leadership.leader_private_ip.is_none());
    }
}
