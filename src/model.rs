use crate::TokenId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared capabilities of an agent, parsed from its on-chain metadata blob.
///
/// Chain metadata is free-form JSON written by whichever client registered
/// the agent, so every field gets an explicit default rather than a parse
/// failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    pub strategies: Vec<String>,
    pub markets: Vec<String>,
    pub actions: Vec<String>,
    pub version: String,
}

impl Default for AgentCapabilities {
    fn default() -> Self {
        Self {
            strategies: Vec::new(),
            markets: Vec::new(),
            actions: Vec::new(),
            version: "1.0.0".to_string(),
        }
    }
}

impl AgentCapabilities {
    /// Parse the raw metadata blob, falling back per field on anything
    /// missing or mistyped. A blob that is not JSON at all yields defaults.
    pub fn parse(metadata: &str) -> Self {
        let value: Value = match serde_json::from_str(metadata) {
            Ok(v) => v,
            Err(_) => return Self::default(),
        };
        let string_list = |v: Option<&Value>| -> Vec<String> {
            v.and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|i| i.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };
        Self {
            strategies: string_list(value.get("strategies")),
            markets: string_list(value.get("markets")),
            actions: string_list(value.get("actions")),
            version: value
                .get("version")
                .and_then(Value::as_str)
                .unwrap_or("1.0.0")
                .to_string(),
        }
    }
}

/// Aggregated reputation for an agent. Missing chain slots default to
/// zero / false at the registry-client boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReputation {
    pub total_bets: u64,
    pub winning_bets: u64,
    pub total_volume: f64,
    pub profit_loss: f64,
    pub accuracy_score: f64,
    pub trust_score: f64,
    pub is_banned: bool,
}

/// Fully-hydrated agent profile as served to peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub token_id: TokenId,
    pub address: String,
    pub name: String,
    pub endpoint: String,
    pub capabilities: AgentCapabilities,
    pub reputation: AgentReputation,
    pub is_active: bool,
}

/// Signed authentication envelope presented by a connecting agent.
/// Input only; never persisted. `timestamp` is epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCredentials {
    pub address: String,
    pub token_id: TokenId,
    pub timestamp: i64,
    pub signature: String,
}

/// Time-boxed bearer credential minted after successful authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_token: String,
    pub address: String,
    pub token_id: TokenId,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Connection state owned by the transport. The core only reads
/// `authenticated`; the handshake layer is what flips it.
#[derive(Debug, Clone)]
pub struct Connection {
    pub agent_id: String,
    pub authenticated: bool,
}

/// A named, opt-in group of agents coordinating a shared strategy.
///
/// Created with exactly one member; never deleted, only deactivated once
/// the last member leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coalition {
    pub id: String,
    pub name: String,
    pub members: Vec<String>,
    pub strategy: String,
    pub target_market: String,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

/// Market snapshot as returned by the external store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub id: String,
    pub question: String,
    pub yes_shares: f64,
    pub no_shares: f64,
    pub liquidity: f64,
    pub end_date: DateTime<Utc>,
    pub resolved: bool,
}

impl Market {
    /// Implied prices from the share pools; an empty market (both pools
    /// zero) prices at even odds.
    pub fn prices(&self) -> (f64, f64) {
        let total = self.yes_shares + self.no_shares;
        if total == 0.0 {
            (0.5, 0.5)
        } else {
            (self.yes_shares / total, self.no_shares / total)
        }
    }
}

/// An open request for analysis on a market. Held in memory only; unlike
/// shared analyses these never reach the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub request_id: String,
    pub market_id: String,
    pub requester: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_offer: Option<f64>,
    pub deadline: i64,
    pub timestamp: DateTime<Utc>,
}

/// Filters accepted by agent discovery. All fields optional; an empty
/// filter passes every candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markets: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_reputation: Option<f64>,
}
