//! HTTP Cloud Provider Adapter
//!
//! Maps the cloud control port onto an EC2-style REST control endpoint.

use std::time::Duration;

use serde::Deserialize;

use super::{AddressAllocation, AddressAssociation, CloudProvider};
use crate::error::{Error, Result};

/// Cloud provider adapter speaking to a REST control endpoint
pub struct HttpCloudProvider {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AllocateResponse {
    allocation_id: String,
    public_ip: String,
}

#[derive(Debug, Deserialize)]
struct AssociateResponse {
    association_id: String,
}

#[derive(Debug, Deserialize)]
struct DescribeAddressesResponse {
    associations: Vec<AddressAssociation>,
}

#[derive(Debug, Deserialize)]
struct DescribeInstanceResponse {
    private_ip: Option<String>,
}

impl HttpCloudProvider {
    /// Create an adapter for the given control endpoint
    pub fn new(endpoint: String, api_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.endpoint, path));
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn check(op: &'static str, response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::cloud(op, format!("{}: {}", status, body)))
        }
    }
}

#[async_trait::async_trait]
impl CloudProvider for HttpCloudProvider {
    async fn allocate_address(&self) -> Result<AddressAllocation> {
        let response = self
            .request(reqwest::Method::POST, "/addresses")
            .send()
            .await?;
        let body: AllocateResponse = Self::check("allocate_address", response)
            .await?
            .json()
            .await?;
        Ok(AddressAllocation {
            allocation_id: body.allocation_id,
            public_ip: body.public_ip,
        })
    }

    async fn release_address(&self, allocation_id: &str) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/addresses/{}", allocation_id),
            )
            .send()
            .await?;
        Self::check("release_address", response).await?;
        Ok(())
    }

    async fn associate_address(&self, allocation_id: &str, instance_id: &str) -> Result<String> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/addresses/{}/associate", allocation_id),
            )
            .json(&serde_json::json!({ "instance_id": instance_id }))
            .send()
            .await?;
        let body: AssociateResponse = Self::check("associate_address", response)
            .await?
            .json()
            .await?;
        Ok(body.association_id)
    }

    async fn describe_associations(&self) -> Result<Vec<AddressAssociation>> {
        let response = self
            .request(reqwest::Method::GET, "/addresses")
            .send()
            .await?;
        let body: DescribeAddressesResponse = Self::check("describe_associations", response)
            .await?
            .json()
            .await?;
        Ok(body.associations)
    }

    async fn disassociate_address(&self, association_id: &str) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/associations/{}", association_id),
            )
            .send()
            .await?;
        Self::check("disassociate_address", response).await?;
        Ok(())
    }

    async fn instance_private_ip(&self, instance_id: &str) -> Result<Option<String>> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/instances/{}", instance_id),
            )
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: DescribeInstanceResponse = Self::check("instance_private_ip", response)
            .await?
            .json()
            .await?;
        Ok(body.private_ip)
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/instances/{}/terminate", instance_id),
            )
            .send()
            .await?;
        Self::check("terminate_instance", response).await?;
        Ok(())
    }
}
