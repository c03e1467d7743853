//! HTTP client for the federated discovery service.

use crate::{
    config::DirectoryConfig,
    error::{A2aError, Result},
    external::{DirectoryAgent, FederatedDirectory},
    model::DiscoveryFilters,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    agents: Vec<DirectoryAgent>,
}

pub struct DirectoryClient {
    endpoint: String,
    client: Client,
}

impl DirectoryClient {
    pub fn new(config: &DirectoryConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(A2aError::Config(
                "directory endpoint is not configured".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl FederatedDirectory for DirectoryClient {
    async fn discover_agents(&self, filters: &DiscoveryFilters) -> Result<Vec<DirectoryAgent>> {
        let response = self
            .client
            .post(format!("{}/search", self.endpoint))
            .json(filters)
            .send()
            .await?;

        let search: SearchResponse = response.error_for_status()?.json().await?;
        Ok(search.agents)
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<DirectoryAgent>> {
        let response = self
            .client
            .get(format!("{}/agents/{}", self.endpoint, agent_id))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Ok(Some(response.error_for_status()?.json().await?))
    }
}
