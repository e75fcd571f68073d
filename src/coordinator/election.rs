//! Leader Election
//!
//! Deterministic selection over current membership: the broker with the
//! numerically maximum unique id wins. Unique ids are cluster-unique, so
//! integer comparison needs no tie-break, and every node computing the
//! rule over the same membership reaches the same answer.

use tracing::info;

use super::{Coordinator, CoordinatorInner};
use crate::error::Result;
use crate::state::{BrokerNode, BrokerRegistry};

/// Apply the selection rule to a registry
pub fn select_leader(registry: &BrokerRegistry) -> Option<&BrokerNode> {
    registry.max_unique_id()
}

impl Coordinator {
    /// Elect a leader from current membership and bind the elastic IP to
    /// it. A no-op when membership is empty: no leader, no association.
    ///
    /// Never runs for the very first registrant (registration handles that
    /// directly); always runs after the current leader leaves membership.
    pub(super) async fn elect_and_associate(
        &self,
        inner: &mut CoordinatorInner,
    ) -> Result<Option<BrokerNode>> {
        let winner = match select_leader(&inner.registry) {
            Some(broker) => broker.clone(),
            None => {
                info!("No brokers left in the cluster, skipping election");
                return Ok(None);
            }
        };

        info!(
            "Broker {} (instance {}) elected as new leader",
            winner.unique_id, winner.instance_id
        );
        self.associate_with_leader(inner, &winner.instance_id).await?;
        Ok(Some(winner))
    }
}
