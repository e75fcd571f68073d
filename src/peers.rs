//! Peer Transport
//!
//! Point-to-point traffic between the coordinator and broker nodes: the
//! leader health probe and the best-effort push of a newly elected
//! leader's address.

use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};

/// Body of the new-leader push message
#[derive(Debug, Serialize)]
pub struct LeaderChangeNotice<'a> {
    #[serde(rename = "newLeadBrokerPrivateIPAddress")]
    pub new_lead_broker_private_ip: &'a str,
}

/// Transport to individual broker nodes
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    /// Probe a broker's health endpoint. `true` means any successful
    /// response arrived within the bounded timeout; `false` is the
    /// expected leader-down signal, not an error.
    async fn probe_leader(&self, address: &str, port: u16) -> bool;

    /// Deliver the new leader's private address to one peer.
    /// Transport-level failure is the only failure mode.
    async fn notify_leader_change(
        &self,
        address: &str,
        port: u16,
        new_leader_ip: &str,
    ) -> Result<()>;
}

/// HTTP transport to brokers
pub struct HttpPeerTransport {
    client: reqwest::Client,
    probe_path: String,
    notify_path: String,
}

impl HttpPeerTransport {
    /// Create a transport with the given probe timeout and peer paths
    pub fn new(probe_timeout: Duration, probe_path: String, notify_path: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(probe_timeout)
            .build()?;
        Ok(Self {
            client,
            probe_path,
            notify_path,
        })
    }
}

#[async_trait::async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn probe_leader(&self, address: &str, port: u16) -> bool {
        let url = format!("http://{}:{}{}", address, port, self.probe_path);
        match self.client.get(&url).send().await {
            Ok(response) => {
                tracing::debug!("Probe of {} answered {}", url, response.status());
                response.status().is_success()
            }
            Err(e) => {
                tracing::debug!("Probe of {} failed: {}", url, e);
                false
            }
        }
    }

    async fn notify_leader_change(
        &self,
        address: &str,
        port: u16,
        new_leader_ip: &str,
    ) -> Result<()> {
        let url = format!("http://{}:{}{}", address, port, self.notify_path);
        let response = self
            .client
            .post(&url)
            .json(&LeaderChangeNotice {
                new_lead_broker_private_ip: new_leader_ip,
            })
            .send()
            .await
            .map_err(|e| Error::PeerUnreachable {
                address: format!("{}:{}", address, port),
                reason: e.to_string(),
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::PeerUnreachable {
                address: format!("{}:{}", address, port),
                reason: format!("status {}", response.status()),
            })
        }
    }
}
