//! Read-only façade over the on-chain identity and reputation contracts.
//!
//! Raw chain records are partially typed; this client is the boundary where
//! they are normalized into [`AgentProfile`] / [`AgentReputation`] with
//! explicit per-field defaults. Nothing partially-typed escapes it.

use crate::{
    error::{A2aError, Result},
    external::{ChainIdentity, ChainReputationRecord, ReputationOracle},
    model::{AgentCapabilities, AgentProfile, AgentReputation, DiscoveryFilters},
    TokenId,
};
use std::sync::Arc;
use tracing::warn;

pub struct IdentityRegistryClient {
    chain: Arc<dyn ChainIdentity>,
    reputation: Arc<dyn ReputationOracle>,
}

impl IdentityRegistryClient {
    pub fn new(chain: Arc<dyn ChainIdentity>, reputation: Arc<dyn ReputationOracle>) -> Self {
        Self { chain, reputation }
    }

    /// Join identity fields, owner address, and reputation into one profile.
    pub async fn get_agent_profile(&self, token_id: TokenId) -> Result<AgentProfile> {
        let record = self.chain.get_agent_record(token_id).await?;
        let address = self.chain.owner_of(token_id).await?;
        let reputation = self.reputation.get_reputation(token_id).await?;

        Ok(AgentProfile {
            token_id,
            address,
            name: record.name.unwrap_or_default(),
            endpoint: record.endpoint.unwrap_or_default(),
            capabilities: record
                .metadata
                .as_deref()
                .map(AgentCapabilities::parse)
                .unwrap_or_default(),
            reputation: normalize_reputation(reputation),
            is_active: record.is_active.unwrap_or(false),
        })
    }

    /// Resolve an owner address to its profile. A token id of `0` is the
    /// contract's "unregistered" sentinel.
    pub async fn get_agent_profile_by_address(
        &self,
        address: &str,
    ) -> Result<Option<AgentProfile>> {
        let token_id = self.chain.get_token_id(address).await?;
        if token_id == 0 {
            return Ok(None);
        }
        self.get_agent_profile(token_id).await.map(Some)
    }

    /// Discover active agents matching `filters`.
    ///
    /// Candidates are seeded from the reputation index when `minReputation`
    /// is supplied, otherwise from the full active set, then hydrated into
    /// profiles. A candidate whose hydration fails is skipped, not fatal.
    pub async fn discover_agents(&self, filters: &DiscoveryFilters) -> Result<Vec<AgentProfile>> {
        let candidates = match filters.min_reputation {
            Some(min) => self.reputation.get_agents_by_min_score(min).await?,
            None => self.chain.get_all_active_agents().await?,
        };

        let mut profiles = Vec::with_capacity(candidates.len());
        for token_id in candidates {
            match self.get_agent_profile(token_id).await {
                Ok(profile) => {
                    if matches_filters(&profile, filters) {
                        profiles.push(profile);
                    }
                }
                Err(e) => {
                    warn!(token_id, error = %e, "skipping candidate: profile hydration failed");
                }
            }
        }
        Ok(profiles)
    }

    /// Case-insensitive check that `address` owns `token_id`.
    pub async fn verify_agent(&self, address: &str, token_id: TokenId) -> Result<bool> {
        let owner = self.chain.owner_of(token_id).await?;
        Ok(owner.eq_ignore_ascii_case(address))
    }

    /// On-chain registration is out of scope for this client.
    pub async fn register(&self) -> Result<()> {
        Err(A2aError::RegistryReadOnly(
            "agent registration is not supported".to_string(),
        ))
    }

    /// On-chain deregistration is out of scope for this client.
    pub async fn unregister(&self) -> Result<()> {
        Err(A2aError::RegistryReadOnly(
            "agent deregistration is not supported".to_string(),
        ))
    }
}

fn normalize_reputation(raw: ChainReputationRecord) -> AgentReputation {
    AgentReputation {
        total_bets: raw.total_bets.unwrap_or(0),
        winning_bets: raw.winning_bets.unwrap_or(0),
        total_volume: raw.total_volume.unwrap_or(0.0),
        profit_loss: raw.profit_loss.unwrap_or(0.0),
        accuracy_score: raw.accuracy_score.unwrap_or(0.0),
        trust_score: raw.trust_score.unwrap_or(0.0),
        is_banned: raw.is_banned.unwrap_or(false),
    }
}

/// OR within a category, AND across categories. `minReputation` is re-checked
/// against the hydrated trust score even though the candidate seed already
/// applied it.
fn matches_filters(profile: &AgentProfile, filters: &DiscoveryFilters) -> bool {
    if let Some(strategies) = &filters.strategies {
        if !strategies
            .iter()
            .any(|s| profile.capabilities.strategies.contains(s))
        {
            return false;
        }
    }

    if let Some(markets) = &filters.markets {
        if !markets
            .iter()
            .any(|m| profile.capabilities.markets.contains(m))
        {
            return false;
        }
    }

    if let Some(min) = filters.min_reputation {
        if profile.reputation.trust_score < min {
            return false;
        }
    }

    true
}
