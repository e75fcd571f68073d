//! Cloud Control Port
//!
//! Narrow interface to the cloud provider's compute and network API:
//! elastic address allocation and (dis)association, instance address
//! resolution, and instance termination. Pure adapter, no policy.

mod http;
mod mock;

pub use http::HttpCloudProvider;
pub use mock::MockCloudProvider;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A floating address allocation held at the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressAllocation {
    /// Provider-side handle needed to release the address
    pub allocation_id: String,
    /// The advertised public address
    pub public_ip: String,
}

/// A live address-to-instance binding at the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressAssociation {
    /// Provider-side handle needed to undo the binding
    pub association_id: String,
    /// Allocation the binding belongs to
    pub allocation_id: String,
    /// Instance the address is bound to
    pub instance_id: String,
    /// Public address of the binding
    pub public_ip: String,
}

/// Interface to the cloud provider's compute and network API.
///
/// Calls are synchronous per operation and may fail; a single failure
/// propagates to the invoking core operation. No retries here.
#[async_trait::async_trait]
pub trait CloudProvider: Send + Sync {
    /// Allocate one floating address
    async fn allocate_address(&self) -> Result<AddressAllocation>;

    /// Release a floating address allocation
    async fn release_address(&self, allocation_id: &str) -> Result<()>;

    /// Bind an allocated address to an instance; returns the association id
    async fn associate_address(&self, allocation_id: &str, instance_id: &str) -> Result<String>;

    /// The provider's current address-to-instance bindings
    async fn describe_associations(&self) -> Result<Vec<AddressAssociation>>;

    /// Undo one address-to-instance binding
    async fn disassociate_address(&self, association_id: &str) -> Result<()>;

    /// Resolve an instance's private address, `None` if the instance is unknown
    async fn instance_private_ip(&self, instance_id: &str) -> Result<Option<String>>;

    /// Terminate a compute instance
    async fn terminate_instance(&self, instance_id: &str) -> Result<()>;
}
