//! In-Memory Cloud Provider
//!
//! Deterministic provider used for local development and tests. Allocation
//! handles are monotonic, public addresses are randomly generated, and every
//! call is counted so behavior can be asserted against.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::Rng;

use super::{AddressAllocation, AddressAssociation, CloudProvider};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct MockState {
    next_allocation: u64,
    next_association: u64,
    /// allocation_id -> public_ip
    allocations: HashMap<String, String>,
    /// association_id -> (allocation_id, instance_id)
    associations: HashMap<String, (String, String)>,
    /// instance_id -> private_ip
    instances: HashMap<String, String>,
    terminated: Vec<String>,
}

/// Per-operation call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCallCounts {
    pub allocate: usize,
    pub release: usize,
    pub associate: usize,
    pub disassociate: usize,
    pub describe: usize,
    pub resolve: usize,
    pub terminate: usize,
}

/// In-memory [`CloudProvider`] implementation
#[derive(Debug, Default)]
pub struct MockCloudProvider {
    state: Mutex<MockState>,
    counts: Mutex<MockCallCounts>,
    fail_next_allocate: Mutex<bool>,
}

impl MockCloudProvider {
    /// Create an empty mock provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an instance the provider knows about
    pub fn add_instance(&self, instance_id: &str, private_ip: &str) {
        self.state
            .lock()
            .unwrap()
            .instances
            .insert(instance_id.to_string(), private_ip.to_string());
    }

    /// Make the next `allocate_address` call fail
    pub fn fail_next_allocate(&self) {
        *self.fail_next_allocate.lock().unwrap() = true;
    }

    /// Snapshot of the call counters
    pub fn counts(&self) -> MockCallCounts {
        *self.counts.lock().unwrap()
    }

    /// Allocation handles currently held at the provider
    pub fn live_allocations(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().unwrap().allocations.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Instances terminated so far, in order
    pub fn terminated_instances(&self) -> Vec<String> {
        self.state.lock().unwrap().terminated.clone()
    }
}

#[async_trait::async_trait]
impl CloudProvider for MockCloudProvider {
    async fn allocate_address(&self) -> Result<AddressAllocation> {
        self.counts.lock().unwrap().allocate += 1;

        let mut fail = self.fail_next_allocate.lock().unwrap();
        if *fail {
            *fail = false;
            return Err(Error::cloud("allocate_address", "injected failure"));
        }
        drop(fail);

        let mut state = self.state.lock().unwrap();
        state.next_allocation += 1;
        let allocation_id = format!("eipalloc-{}", state.next_allocation);
        let mut rng = rand::thread_rng();
        let public_ip = format!("52.{}.{}.{}", rng.gen_range(1..=254), rng.gen_range(1..=254), rng.gen_range(1..=254));
        state
            .allocations
            .insert(allocation_id.clone(), public_ip.clone());
        Ok(AddressAllocation {
            allocation_id,
            public_ip,
        })
    }

    async fn release_address(&self, allocation_id: &str) -> Result<()> {
        self.counts.lock().unwrap().release += 1;
        let mut state = self.state.lock().unwrap();
        if state.allocations.remove(allocation_id).is_none() {
            return Err(Error::cloud(
                "release_address",
                format!("unknown allocation {}", allocation_id),
            ));
        }
        state
            .associations
            .retain(|_, (alloc, _)| alloc != allocation_id);
        Ok(())
    }

    async fn associate_address(&self, allocation_id: &str, instance_id: &str) -> Result<String> {
        self.counts.lock().unwrap().associate += 1;
        let mut state = self.state.lock().unwrap();
        if !state.allocations.contains_key(allocation_id) {
            return Err(Error::cloud(
                "associate_address",
                format!("unknown allocation {}", allocation_id),
            ));
        }
        // An elastic address holds one binding; re-associating moves it.
        state
            .associations
            .retain(|_, (alloc, _)| alloc != allocation_id);
        state.next_association += 1;
        let association_id = format!("eipassoc-{}", state.next_association);
        state.associations.insert(
            association_id.clone(),
            (allocation_id.to_string(), instance_id.to_string()),
        );
        Ok(association_id)
    }

    async fn describe_associations(&self) -> Result<Vec<AddressAssociation>> {
        self.counts.lock().unwrap().describe += 1;
        let state = self.state.lock().unwrap();
        let mut out: Vec<AddressAssociation> = state
            .associations
            .iter()
            .map(|(assoc_id, (alloc_id, instance_id))| AddressAssociation {
                association_id: assoc_id.clone(),
                allocation_id: alloc_id.clone(),
                instance_id: instance_id.clone(),
                public_ip: state
                    .allocations
                    .get(alloc_id)
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect();
        out.sort_by(|a, b| a.association_id.cmp(&b.association_id));
        Ok(out)
    }

    async fn disassociate_address(&self, association_id: &str) -> Result<()> {
        self.counts.lock().unwrap().disassociate += 1;
        let mut state = self.state.lock().unwrap();
        if state.associations.remove(association_id).is_none() {
            return Err(Error::cloud(
                "disassociate_address",
                format!("unknown association {}", association_id),
            ));
        }
        Ok(())
    }

    async fn instance_private_ip(&self, instance_id: &str) -> Result<Option<String>> {
        self.counts.lock().unwrap().resolve += 1;
        Ok(self.state.lock().unwrap().instances.get(instance_id).cloned())
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        self.counts.lock().unwrap().terminate += 1;
        let mut state = self.state.lock().unwrap();
        state.instances.remove(instance_id);
        state.terminated.push(instance_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allocation_handles_are_monotonic() {
        let cloud = MockCloudProvider::new();
        let first = cloud.allocate_address().await.unwrap();
        cloud.release_address(&first.allocation_id).await.unwrap();
        let second = cloud.allocate_address().await.unwrap();

        assert_ne!(first.allocation_id, second.allocation_id);
        assert_eq!(cloud.counts().allocate, 2);
    }

    #[tokio::test]
    async fn test_reassociation_moves_the_binding() {
        let cloud = MockCloudProvider::new();
        let alloc = cloud.allocate_address().await.unwrap();

        cloud
            .associate_address(&alloc.allocation_id, "i-a")
            .await
            .unwrap();
        cloud
            .associate_address(&alloc.allocation_id, "i-b")
            .await
            .unwrap();

        let associations = cloud.describe_associations().await.unwrap();
        assert_eq!(associations.len(), 1);
        assert_eq!(associations[0].instance_id, "i-b");
    }

    #[tokio::test]
    async fn test_terminate_forgets_the_instance() {
        let cloud = MockCloudProvider::new();
        cloud.add_instance("i-a", "10.0.0.1");

        assert_eq!(
            cloud.instance_private_ip("i-a").await.unwrap().as_deref(),
            Some("10.0.0.1")
        );
        cloud.terminate_instance("i-a").await.unwrap();
        assert!(cloud.instance_private_ip("i-a").await.unwrap().is_none());
        assert_eq!(cloud.terminated_instances(), vec!["i-a".to_string()]);
    }
}
