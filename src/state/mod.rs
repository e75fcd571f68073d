//! State Management Module
//!
//! Holds the coordinator's membership registry and leadership state.
//! Both are owned exclusively by the coordination core.

mod leadership;
mod registry;

pub use leadership::LeadershipState;
pub use registry::{BrokerNode, BrokerRegistry};
