//! Failover Protocol
//!
//! Reacts to peer-reported leader-unresponsive events. A report is first
//! checked against the recorded leader address (mismatch = stale, no
//! action), then verified with a direct health probe. Only a confirmed
//! failure tears the leader down: clear the recorded address, deregister
//! the broker (disassociating the elastic IP and terminating its
//! instance), elect a successor, and push the successor's address to the
//! remaining peers.
//!
//! The whole investigation runs under the coordinator mutex, so no
//! registration or rival election can interleave between verification and
//! re-association.

use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use super::Coordinator;
use crate::error::Result;

/// Terminal result of one failure investigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverOutcome {
    /// The reported address no longer matches the recorded leader; a
    /// delayed or duplicate report must not undo a newer election
    StaleReport,
    /// The leader answered the verification probe
    LeaderAlive,
    /// Failure confirmed but the address maps to no registered broker;
    /// leadership stays cleared, no election
    UnresolvedLeader,
    /// Failure confirmed, leader removed, successor handled
    FailedOver {
        /// Private address of the new leader, `None` when the cluster
        /// drained or the address could not be resolved
        new_leader_ip: Option<String>,
        /// Peers that acknowledged the new-leader push
        notified_peers: usize,
    },
}

impl Coordinator {
    /// Run one failure investigation for a peer-reported leader address.
    pub async fn handle_leader_failure_report(&self, reported_ip: &str) -> Result<FailoverOutcome> {
        let investigation = Uuid::new_v4();
        let mut inner = self.inner.lock().await;

        if inner.leadership.leader_private_ip.as_deref() != Some(reported_ip) {
            info!(
                %investigation,
                "Stale failure report for {} (recorded leader: {:?})",
                reported_ip, inner.leadership.leader_private_ip
            );
            return Ok(FailoverOutcome::StaleReport);
        }

        let probe_port = inner
            .registry
            .lookup_by_address(reported_ip)
            .map(|broker| broker.port)
            .unwrap_or(self.failover.default_broker_port);

        info!(%investigation, "Verifying reported leader {} on port {}", reported_ip, probe_port);
        if self.peers.probe_leader(reported_ip, probe_port).await {
            info!(%investigation, "Leader {} answered the probe, dismissing report", reported_ip);
            return Ok(FailoverOutcome::LeaderAlive);
        }

        // Confirmed dead. Clearing the recorded address first stops a
        // second concurrent report from re-verifying a leader that is
        // already being torn down.
        warn!(%investigation, "Leader {} failed verification, starting failover", reported_ip);
        inner.leadership.leader_private_ip = None;

        let failed = match inner.registry.lookup_by_address(reported_ip).cloned() {
            Some(broker) => broker,
            None => {
                warn!(
                    %investigation,
                    "Failed leader {} maps to no registered broker, aborting failover",
                    reported_ip
                );
                return Ok(FailoverOutcome::UnresolvedLeader);
            }
        };

        self.remove_broker(&mut inner, failed.unique_id).await?;
        let new_leader = self.elect_and_associate(&mut inner).await?;

        let new_leader_ip = inner.leadership.leader_private_ip.clone();
        let mut notified_peers = 0;
        if let (Some(winner), Some(leader_ip)) = (&new_leader, &new_leader_ip) {
            let peers = inner.registry.peer_endpoints(&winner.ip_address);
            let deliveries = join_all(peers.iter().map(|(address, port)| {
                self.peers.notify_leader_change(address, *port, leader_ip)
            }))
            .await;

            for ((address, port), delivery) in peers.iter().zip(deliveries) {
                match delivery {
                    Ok(()) => notified_peers += 1,
                    Err(e) => {
                        // Best effort: peers that miss the push rediscover
                        // the leader through their own query path.
                        warn!(%investigation, "Could not notify {}:{}: {}", address, port, e);
                    }
                }
            }
            info!(
                %investigation,
                "Failover complete, new leader {} pushed to {}/{} peers",
                leader_ip,
                notified_peers,
                peers.len()
            );
        } else {
            info!(%investigation, "Failover complete with no successor to advertise");
        }

        Ok(FailoverOutcome::FailedOver {
            new_leader_ip,
            notified_peers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::MockCloudProvider;
    use crate::config::FailoverConfig;
    use crate::peers::PeerTransport;
    use crate::state::BrokerNode;
    use std::sync::{Arc, Mutex};

    /// Transport with a scripted probe answer that records traffic
    struct ScriptedTransport {
        leader_alive: bool,
        probes: Mutex<Vec<String>>,
        notices: Mutex<Vec<(String, u16, String)>>,
        refuse_notifications: bool,
    }

    impl ScriptedTransport {
        fn new(leader_alive: bool) -> Self {
            Self {
                leader_alive,
                probes: Mutex::new(Vec::new()),
                notices: Mutex::new(Vec::new()),
                refuse_notifications: false,
            }
        }

        fn refusing(mut self) -> Self {
            self.refuse_notifications = true;
            self
        }
    }

    #[async_trait::async_trait]
    impl PeerTransport for ScriptedTransport {
        async fn probe_leader(&self, address: &str, _port: u16) -> bool {
            self.probes.lock().unwrap().push(address.to_string());
            self.leader_alive
        }

        async fn notify_leader_change(
            &self,
            address: &str,
            port: u16,
            new_leader_ip: &str,
        ) -> Result<()> {
            if self.refuse_notifications {
                return Err(crate::Error::PeerUnreachable {
                    address: format!("{}:{}", address, port),
                    reason: "connection refused".into(),
                });
            }
            self.notices
                .lock()
                .unwrap()
                .push((address.to_string(), port, new_leader_ip.to_string()));
            Ok(())
        }
    }

    async fn cluster_of_three(
        transport: Arc<ScriptedTransport>,
    ) -> (Coordinator, Arc<MockCloudProvider>) {
        let cloud = Arc::new(MockCloudProvider::new());
        cloud.add_instance("i-a", "10.0.0.3");
        cloud.add_instance("i-b", "10.0.0.7");
        cloud.add_instance("i-c", "10.0.0.5");

        let coordinator = Coordinator::new(
            Arc::clone(&cloud) as Arc<dyn crate::cloud::CloudProvider>,
            transport,
            FailoverConfig::default(),
        );

        // Broker 7 registers first and takes leadership.
        for (id, instance, ip) in [(7u32, "i-b", "10.0.0.7"), (3, "i-a", "10.0.0.3"), (5, "i-c", "10.0.0.5")] {
            coordinator
                .register(BrokerNode::new(id, instance.to_string(), ip.to_string(), 9000))
                .await
                .unwrap();
        }
        (coordinator, cloud)
    }

    #[tokio::test]
    async fn test_stale_report_is_a_noop_twice_over() {
        let transport = Arc::new(ScriptedTransport::new(false));
        let (coordinator, _cloud) = cluster_of_three(Arc::clone(&transport)).await;

        let before = coordinator.leadership_snapshot().await;
        for _ in 0..2 {
            let outcome = coordinator
                .handle_leader_failure_report("10.0.0.99")
                .await
                .unwrap();
            assert_eq!(outcome, FailoverOutcome::StaleReport);
        }
        assert_eq!(coordinator.leadership_snapshot().await, before);
        assert!(transport.probes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_alive_leader_dismisses_the_report() {
        let transport = Arc::new(ScriptedTransport::new(true));
        let (coordinator, cloud) = cluster_of_three(Arc::clone(&transport)).await;

        let before = coordinator.leadership_snapshot().await;
        let outcome = coordinator
            .handle_leader_failure_report("10.0.0.7")
            .await
            .unwrap();

        assert_eq!(outcome, FailoverOutcome::LeaderAlive);
        assert_eq!(coordinator.leadership_snapshot().await, before);
        assert_eq!(*transport.probes.lock().unwrap(), vec!["10.0.0.7".to_string()]);
        assert!(cloud.terminated_instances().is_empty());
    }

    #[tokio::test]
    async fn test_confirmed_failure_removes_elects_and_notifies() {
        let transport = Arc::new(ScriptedTransport::new(false));
        let (coordinator, cloud) = cluster_of_three(Arc::clone(&transport)).await;

        let outcome = coordinator
            .handle_leader_failure_report("10.0.0.7")
            .await
            .unwrap();

        // Broker 5 is the max remaining unique id.
        assert_eq!(
            outcome,
            FailoverOutcome::FailedOver {
                new_leader_ip: Some("10.0.0.5".to_string()),
                notified_peers: 1,
            }
        );
        assert_eq!(cloud.terminated_instances(), vec!["i-b".to_string()]);

        let leadership = coordinator.leadership_snapshot().await;
        assert_eq!(leadership.leader_instance_id.as_deref(), Some("i-c"));
        assert_eq!(leadership.leader_private_ip.as_deref(), Some("10.0.0.5"));

        let notices = transport.notices.lock().unwrap();
        assert_eq!(*notices, vec![("10.0.0.3".to_string(), 9000, "10.0.0.5".to_string())]);

        let registry = coordinator.registry_snapshot().await;
        assert!(!registry.contains_key(&7));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_notifications_do_not_fail_the_failover() {
        let transport = Arc::new(ScriptedTransport::new(false).refusing());
        let (coordinator, _cloud) = cluster_of_three(Arc::clone(&transport)).await;

        let outcome = coordinator
            .handle_leader_failure_report("10.0.0.7")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            FailoverOutcome::FailedOver {
                new_leader_ip: Some("10.0.0.5".to_string()),
                notified_peers: 0,
            }
        );
        // The election still stuck.
        assert_eq!(
            coordinator.leadership_snapshot().await.leader_private_ip.as_deref(),
            Some("10.0.0.5")
        );
    }

    #[tokio::test]
    async fn test_failover_of_last_broker_leaves_empty_cluster() {
        let transport = Arc::new(ScriptedTransport::new(false));
        let cloud = Arc::new(MockCloudProvider::new());
        cloud.add_instance("i-a", "10.0.0.1");

        let coordinator = Coordinator::new(
            Arc::clone(&cloud) as Arc<dyn crate::cloud::CloudProvider>,
            Arc::clone(&transport) as Arc<dyn PeerTransport>,
            FailoverConfig::default(),
        );
        coordinator
            .register(BrokerNode::new(1, "i-a".to_string(), "10.0.0.1".to_string(), 9000))
            .await
            .unwrap();

        let outcome = coordinator
            .handle_leader_failure_report("10.0.0.1")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            FailoverOutcome::FailedOver {
                new_leader_ip: None,
                notified_peers: 0,
            }
        );
        assert_eq!(coordinator.broker_count().await, 0);
        assert!(cloud.live_allocations().is_empty());
        assert_eq!(
            coordinator.leadership_snapshot().await,
            crate::state::LeadershipState::default()
        );
    }

    #[tokio::test]
    async fn test_unresolvable_leader_aborts_without_election() {
        let transport = Arc::new(ScriptedTransport::new(false));
        let cloud = Arc::new(MockCloudProvider::new());
        cloud.add_instance("i-a", "10.0.0.1");

        let coordinator = Coordinator::new(
            Arc::clone(&cloud) as Arc<dyn crate::cloud::CloudProvider>,
            Arc::clone(&transport) as Arc<dyn PeerTransport>,
            FailoverConfig::default(),
        );
        coordinator
            .register(BrokerNode::new(1, "i-a".to_string(), "10.0.0.1".to_string(), 9000))
            .await
            .unwrap();

        // Re-register broker 1 under a different address so the recorded
        // leader address no longer resolves to any member.
        coordinator
            .register(BrokerNode::new(1, "i-a".to_string(), "10.0.0.9".to_string(), 9000))
            .await
            .unwrap();

        let outcome = coordinator
            .handle_leader_failure_report("10.0.0.1")
            .await
            .unwrap();

        assert_eq!(outcome, FailoverOutcome::UnresolvedLeader);
        let leadership = coordinator.leadership_snapshot().await;
        assert!(leadership.leader_private_ip.is_none());
        // The allocation and association record survive until an operator
        // or a later event resolves the situation.
        assert!(leadership.has_allocation());
        assert_eq!(coordinator.broker_count().await, 1);
    }
}
