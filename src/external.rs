//! Seams to the collaborators this core consumes but does not own: the
//! on-chain identity/reputation contracts, the market store, the analysis
//! archive, the settlement manager, the federated directory, and the
//! transport's broadcast primitive.
//!
//! Everything here is interface plus the raw record shapes those interfaces
//! return. Raw chain and directory data is partially typed on purpose —
//! slots can be missing — and is normalized with explicit defaults by the
//! registry client before it escapes.

use crate::{error::Result, model::Market, TokenId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw identity record for one token, as the identity contract returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainAgentRecord {
    pub name: Option<String>,
    pub endpoint: Option<String>,
    /// Free-form JSON blob holding the declared capabilities.
    pub metadata: Option<String>,
    pub is_active: Option<bool>,
}

/// Raw reputation tuple. The reputation contract packs these positionally
/// and older deployments omit trailing slots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReputationRecord {
    pub total_bets: Option<u64>,
    pub winning_bets: Option<u64>,
    pub total_volume: Option<f64>,
    pub profit_loss: Option<f64>,
    pub accuracy_score: Option<f64>,
    pub trust_score: Option<f64>,
    pub is_banned: Option<bool>,
}

/// Read-only view of the on-chain identity contract.
#[async_trait]
pub trait ChainIdentity: Send + Sync {
    /// Token owned by `address`; `0` means unregistered.
    async fn get_token_id(&self, address: &str) -> Result<TokenId>;
    async fn owner_of(&self, token_id: TokenId) -> Result<String>;
    async fn get_agent_record(&self, token_id: TokenId) -> Result<ChainAgentRecord>;
    async fn is_registered(&self, address: &str) -> Result<bool>;
    async fn get_all_active_agents(&self) -> Result<Vec<TokenId>>;
    async fn is_endpoint_active(&self, token_id: TokenId) -> Result<bool>;
    async fn get_agents_by_capability(&self, capability: &str) -> Result<Vec<TokenId>>;
}

/// Read-only view of the on-chain reputation contract.
#[async_trait]
pub trait ReputationOracle: Send + Sync {
    async fn get_reputation(&self, token_id: TokenId) -> Result<ChainReputationRecord>;
    async fn get_feedback_count(&self, token_id: TokenId) -> Result<u64>;
    async fn get_feedback(&self, token_id: TokenId, index: u64) -> Result<Value>;
    async fn get_agents_by_min_score(&self, min_score: f64) -> Result<Vec<TokenId>>;
}

/// Agent record served by the federated discovery service / alternate
/// identity provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryAgent {
    pub agent_id: String,
    pub name: Option<String>,
    /// Wallet the directory has on file; used to cross-check claimed
    /// ownership during authentication.
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub strategies: Vec<String>,
    #[serde(default)]
    pub markets: Vec<String>,
    pub endpoint: Option<String>,
    pub reputation: Option<f64>,
}

/// Federated discovery service and alternate identity provider.
#[async_trait]
pub trait FederatedDirectory: Send + Sync {
    async fn discover_agents(
        &self,
        filters: &crate::model::DiscoveryFilters,
    ) -> Result<Vec<DirectoryAgent>>;
    async fn get_agent(&self, agent_id: &str) -> Result<Option<DirectoryAgent>>;
}

/// Relational store holding market state.
#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn find_market(&self, market_id: &str) -> Result<Option<Market>>;
}

/// External archive for shared analyses.
#[async_trait]
pub trait AnalysisArchive: Send + Sync {
    /// Persist an analysis and return its archive id.
    async fn store_analysis(&self, market_id: &str, analysis: Value) -> Result<String>;
    async fn get_analyses(&self, market_id: &str, limit: usize) -> Result<Vec<Value>>;
}

/// Pending micropayment request owned by the settlement manager; the core
/// only shapes and forwards these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub request_id: String,
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Micropayment settlement workflow (x402).
#[async_trait]
pub trait SettlementManager: Send + Sync {
    async fn create_payment_request(
        &self,
        from: &str,
        to: &str,
        amount: f64,
        service: &str,
        metadata: Option<Value>,
    ) -> Result<PaymentRequest>;
    async fn get_payment_request(&self, request_id: &str) -> Result<Option<PaymentRequest>>;
    async fn verify_payment(&self, params: Value) -> Result<VerificationResult>;
}

/// Fan-out primitive exposed by the transport layer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn broadcast(&self, agent_ids: &[String], message: Value) -> Result<()>;
}
