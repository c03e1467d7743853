//! JSON-RPC dispatch for authenticated agent connections.
//!
//! The transport hands every inbound request to [`ProtocolRouter::route`]
//! together with the sender's agent id and connection state. The router owns
//! the in-memory subscription, coalition, and analysis-request indexes and
//! fans notifications out through the transport's broadcast primitive.
//!
//! Index mutations are synchronous between await points; compound
//! read-modify-write sequences (member dedup, subscription insert) run under
//! a single lock, and no lock is held across an await.

use crate::{
    error::{A2aError, Result},
    external::{AnalysisArchive, FederatedDirectory, MarketStore, SettlementManager, Transport},
    model::{AnalysisRequest, Coalition, Connection, DiscoveryFilters},
    registry::IdentityRegistryClient,
    rpc::{method, JsonRpcRequest, JsonRpcResponse},
};
use chrono::Utc;
use parking_lot::Mutex;
use rand::{distributions::Alphanumeric, Rng};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_ANALYSES_LIMIT: usize = 50;

/// Fields of an archived analysis that are safe to serve to other agents.
const PUBLIC_ANALYSIS_FIELDS: &[&str] = &[
    "analysisId",
    "agentId",
    "marketId",
    "prediction",
    "confidence",
    "timestamp",
];

/// In-memory protocol state, owned per router instance and injected into it
/// for test isolation. Nothing here survives a restart.
#[derive(Default)]
pub struct ProtocolState {
    /// marketId -> subscribed agent ids. Append-only; the protocol has no
    /// unsubscribe operation.
    subscriptions: Mutex<HashMap<String, BTreeSet<String>>>,
    coalitions: Mutex<HashMap<String, Coalition>>,
    analysis_requests: Mutex<HashMap<String, AnalysisRequest>>,
}

pub struct ProtocolRouter {
    registry: Arc<IdentityRegistryClient>,
    directory: Option<Arc<dyn FederatedDirectory>>,
    markets: Arc<dyn MarketStore>,
    archive: Arc<dyn AnalysisArchive>,
    settlement: Option<Arc<dyn SettlementManager>>,
    transport: Arc<dyn Transport>,
    payments_enabled: bool,
    state: ProtocolState,
}

impl ProtocolRouter {
    pub fn new(
        registry: Arc<IdentityRegistryClient>,
        markets: Arc<dyn MarketStore>,
        archive: Arc<dyn AnalysisArchive>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            registry,
            directory: None,
            markets,
            archive,
            settlement: None,
            transport,
            payments_enabled: false,
            state: ProtocolState::default(),
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn FederatedDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_settlement(mut self, settlement: Arc<dyn SettlementManager>) -> Self {
        self.settlement = Some(settlement);
        self
    }

    pub fn with_payments_enabled(mut self, enabled: bool) -> Self {
        self.payments_enabled = enabled;
        self
    }

    /// Dispatch one request. Always produces a response echoing the request
    /// id verbatim, including `id: null`; collaborator failures become error
    /// objects rather than tearing down the connection.
    pub async fn route(
        &self,
        request: JsonRpcRequest,
        sender: &str,
        connection: &Connection,
    ) -> JsonRpcResponse {
        let id = request.id.clone();

        if !connection.authenticated {
            return JsonRpcResponse::failure(id, &A2aError::NotAuthenticated);
        }

        match self.dispatch(&request, sender).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                debug!(method = %request.method, sender, error = %e, "request failed");
                JsonRpcResponse::failure(id, &e)
            }
        }
    }

    async fn dispatch(&self, request: &JsonRpcRequest, sender: &str) -> Result<Value> {
        let name = request.method.as_str();

        // With the feature flag off, settlement methods are
        // indistinguishable from methods that do not exist.
        if matches!(name, method::PAYMENT_REQUEST | method::PAYMENT_RECEIPT)
            && !self.payments_enabled
        {
            return Err(A2aError::MethodNotFound(name.to_string()));
        }

        let params = require_params_object(&request.params)?;

        match name {
            method::DISCOVER_AGENTS => self.discover_agents(params).await,
            method::GET_AGENT_INFO => self.get_agent_info(params).await,
            method::GET_MARKET_DATA => self.get_market_data(params).await,
            method::GET_MARKET_PRICES => self.get_market_prices(params).await,
            method::SUBSCRIBE_MARKET => self.subscribe_market(params, sender),
            method::PROPOSE_COALITION => self.propose_coalition(params, sender),
            method::JOIN_COALITION => self.join_coalition(params, sender),
            method::COALITION_MESSAGE => self.coalition_message(params, sender).await,
            method::LEAVE_COALITION => self.leave_coalition(params, sender),
            method::SHARE_ANALYSIS => self.share_analysis(params, sender).await,
            method::REQUEST_ANALYSIS => self.request_analysis(params, sender).await,
            method::GET_ANALYSES => self.get_analyses(params).await,
            method::PAYMENT_REQUEST => self.payment_request(params, sender).await,
            method::PAYMENT_RECEIPT => self.payment_receipt(params).await,
            other => Err(A2aError::MethodNotFound(other.to_string())),
        }
    }

    // ── Discovery ───────────────────────────────────────────────────────────

    async fn discover_agents(&self, params: &Map<String, Value>) -> Result<Value> {
        // Filters arrive nested under a `filters` key with `limit` as a
        // sibling; an absent key means no filtering.
        let filters: DiscoveryFilters = match params.get("filters") {
            Some(value) if !value.is_null() => serde_json::from_value(value.clone())
                .map_err(|e| A2aError::InvalidParams(e.to_string()))?,
            _ => DiscoveryFilters::default(),
        };
        let limit = params.get("limit").and_then(Value::as_u64).map(|l| l as usize);

        // Federated directory first; an empty result falls back to the
        // on-chain registry.
        if let Some(directory) = &self.directory {
            let found = directory.discover_agents(&filters).await?;
            if !found.is_empty() {
                let mut agents: Vec<Value> =
                    found.into_iter().map(|a| json!(a)).collect();
                let total = agents.len();
                truncate(&mut agents, limit);
                return Ok(json!({ "agents": agents, "total": total }));
            }
        }

        let profiles = self.registry.discover_agents(&filters).await?;
        let mut agents: Vec<Value> = profiles.into_iter().map(|p| json!(p)).collect();
        let total = agents.len();
        truncate(&mut agents, limit);
        Ok(json!({ "agents": agents, "total": total }))
    }

    async fn get_agent_info(&self, params: &Map<String, Value>) -> Result<Value> {
        let agent_id = require_str(params, "agentId")?;

        if agent_id.starts_with("agent0-") {
            let Some(directory) = &self.directory else {
                return Err(A2aError::AgentNotFound(agent_id.to_string()));
            };
            return match directory.get_agent(agent_id).await? {
                Some(agent) => Ok(json!(agent)),
                None => Err(A2aError::AgentNotFound(agent_id.to_string())),
            };
        }

        // Registry ids follow the "agent-{tokenId}" convention. The prefix
        // is stripped by substring replacement, so ids shaped differently
        // fail the numeric parse and read as not-found.
        let token_id = agent_id
            .replace("agent-", "")
            .parse::<u64>()
            .map_err(|_| A2aError::AgentNotFound(agent_id.to_string()))?;

        let profile = self
            .registry
            .get_agent_profile(token_id)
            .await
            .map_err(|e| {
                debug!(agent_id, error = %e, "registry profile lookup failed");
                A2aError::AgentNotFound(agent_id.to_string())
            })?;
        let mut info = json!(profile);
        info["agentId"] = json!(format!("agent-{}", token_id));
        Ok(info)
    }

    // ── Market reads ────────────────────────────────────────────────────────

    async fn get_market_data(&self, params: &Map<String, Value>) -> Result<Value> {
        let market_id = require_str(params, "marketId")?;
        let market = self
            .markets
            .find_market(market_id)
            .await?
            .ok_or_else(|| A2aError::MarketNotFound(market_id.to_string()))?;
        let (yes_price, no_price) = market.prices();
        Ok(json!({
            "market": market,
            "yesPrice": yes_price,
            "noPrice": no_price,
        }))
    }

    async fn get_market_prices(&self, params: &Map<String, Value>) -> Result<Value> {
        let market_id = require_str(params, "marketId")?;
        let market = self
            .markets
            .find_market(market_id)
            .await?
            .ok_or_else(|| A2aError::MarketNotFound(market_id.to_string()))?;
        let (yes_price, no_price) = market.prices();
        Ok(json!({
            "marketId": market.id,
            "yesPrice": yes_price,
            "noPrice": no_price,
        }))
    }

    fn subscribe_market(&self, params: &Map<String, Value>, sender: &str) -> Result<Value> {
        let market_id = require_str(params, "marketId")?;
        self.state
            .subscriptions
            .lock()
            .entry(market_id.to_string())
            .or_default()
            .insert(sender.to_string());
        Ok(json!({ "subscribed": true, "marketId": market_id }))
    }

    // ── Coalitions ──────────────────────────────────────────────────────────

    fn propose_coalition(&self, params: &Map<String, Value>, sender: &str) -> Result<Value> {
        let name = require_str(params, "name")?;
        let target_market = require_str(params, "targetMarket")?;
        let strategy = require_str(params, "strategy")?;

        let coalition = Coalition {
            id: new_coalition_id(),
            name: name.to_string(),
            members: vec![sender.to_string()],
            strategy: strategy.to_string(),
            target_market: target_market.to_string(),
            created_at: Utc::now(),
            active: true,
        };

        self.state
            .coalitions
            .lock()
            .insert(coalition.id.clone(), coalition.clone());
        Ok(json!(coalition))
    }

    fn join_coalition(&self, params: &Map<String, Value>, sender: &str) -> Result<Value> {
        let coalition_id = require_str(params, "coalitionId")?;

        let mut coalitions = self.state.coalitions.lock();
        let coalition = coalitions
            .get_mut(coalition_id)
            .ok_or_else(|| A2aError::CoalitionNotFound(coalition_id.to_string()))?;

        if !coalition.members.iter().any(|m| m == sender) {
            coalition.members.push(sender.to_string());
        }
        Ok(json!(coalition.clone()))
    }

    async fn coalition_message(&self, params: &Map<String, Value>, sender: &str) -> Result<Value> {
        let coalition_id = require_str(params, "coalitionId")?;
        let message = params
            .get("message")
            .ok_or_else(|| A2aError::InvalidParams("message is required".to_string()))?
            .clone();

        let recipients: Vec<String> = {
            let coalitions = self.state.coalitions.lock();
            let coalition = coalitions
                .get(coalition_id)
                .ok_or_else(|| A2aError::CoalitionNotFound(coalition_id.to_string()))?;
            if !coalition.members.iter().any(|m| m == sender) {
                return Err(A2aError::InvalidParams(
                    "sender is not a coalition member".to_string(),
                ));
            }
            coalition
                .members
                .iter()
                .filter(|m| m.as_str() != sender)
                .cloned()
                .collect()
        };

        let envelope = json!({
            "type": "coalition_message",
            "coalitionId": coalition_id,
            "from": sender,
            "message": message,
            "timestamp": Utc::now(),
        });
        self.transport.broadcast(&recipients, envelope).await?;
        Ok(json!({ "delivered": recipients.len() }))
    }

    fn leave_coalition(&self, params: &Map<String, Value>, sender: &str) -> Result<Value> {
        let coalition_id = require_str(params, "coalitionId")?;

        let mut coalitions = self.state.coalitions.lock();
        let coalition = coalitions
            .get_mut(coalition_id)
            .ok_or_else(|| A2aError::CoalitionNotFound(coalition_id.to_string()))?;

        coalition.members.retain(|m| m != sender);
        if coalition.members.is_empty() {
            // Terminal state; the coalition stays retrievable forever.
            coalition.active = false;
        }
        Ok(json!({
            "left": true,
            "coalitionId": coalition.id,
            "active": coalition.active,
        }))
    }

    // ── Analysis exchange ───────────────────────────────────────────────────

    async fn share_analysis(&self, params: &Map<String, Value>, sender: &str) -> Result<Value> {
        let market_id = require_str(params, "marketId")?.to_string();
        let timestamp = params
            .get("timestamp")
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| A2aError::InvalidParams("timestamp is required".to_string()))?;

        let mut analysis = Value::Object(params.clone());
        analysis["agentId"] = json!(sender);
        let analysis_id = self.archive.store_analysis(&market_id, analysis).await?;

        let recipients = self.subscribers_excluding(&market_id, sender);
        let projection = json!({
            "type": "analysis_shared",
            "analysisId": analysis_id,
            "agentId": sender,
            "marketId": market_id,
            "prediction": params.get("prediction").cloned().unwrap_or(Value::Null),
            "confidence": params.get("confidence").cloned().unwrap_or(Value::Null),
            "timestamp": timestamp,
        });
        self.transport.broadcast(&recipients, projection).await?;

        Ok(json!({
            "analysisId": analysis_id,
            "distributed": recipients.len(),
        }))
    }

    async fn request_analysis(&self, params: &Map<String, Value>, sender: &str) -> Result<Value> {
        let market_id = require_str(params, "marketId")?.to_string();
        let deadline = params
            .get("deadline")
            .and_then(Value::as_i64)
            .ok_or_else(|| A2aError::InvalidParams("deadline is required".to_string()))?;
        let payment_offer = params.get("paymentOffer").and_then(Value::as_f64);

        let request = AnalysisRequest {
            request_id: format!("request-{}", Uuid::new_v4()),
            market_id: market_id.clone(),
            requester: sender.to_string(),
            payment_offer,
            deadline,
            timestamp: Utc::now(),
        };

        // Requests stay in memory only; shared analyses are what hit the
        // archive.
        self.state
            .analysis_requests
            .lock()
            .insert(request.request_id.clone(), request.clone());

        let recipients = self.subscribers_excluding(&market_id, sender);
        let mut envelope = json!(request);
        envelope["type"] = json!("analysis_request");
        self.transport.broadcast(&recipients, envelope).await?;

        Ok(json!({
            "requestId": request.request_id,
            "notified": recipients.len(),
        }))
    }

    async fn get_analyses(&self, params: &Map<String, Value>) -> Result<Value> {
        let market_id = require_str(params, "marketId")?;
        let limit = params
            .get("limit")
            .and_then(Value::as_u64)
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_ANALYSES_LIMIT);

        let stored = self.archive.get_analyses(market_id, limit).await?;
        let analyses: Vec<Value> = stored.into_iter().map(project_public_analysis).collect();
        Ok(json!({ "analyses": analyses, "count": analyses.len() }))
    }

    // ── Payments (x402) ─────────────────────────────────────────────────────

    async fn payment_request(&self, params: &Map<String, Value>, sender: &str) -> Result<Value> {
        let settlement = self.settlement()?;

        let to = require_str(params, "to")?;
        let amount = params
            .get("amount")
            .and_then(Value::as_f64)
            .ok_or_else(|| A2aError::InvalidParams("amount is required".to_string()))?;
        let service = require_str(params, "service")?;
        let metadata = params.get("metadata").cloned();

        let request = settlement
            .create_payment_request(sender, to, amount, service, metadata)
            .await?;
        Ok(json!(request))
    }

    async fn payment_receipt(&self, params: &Map<String, Value>) -> Result<Value> {
        let settlement = self.settlement()?;
        let request_id = require_str(params, "requestId")?;

        let request = settlement
            .get_payment_request(request_id)
            .await?
            .ok_or_else(|| {
                A2aError::PaymentFailed(format!("unknown payment request: {}", request_id))
            })?;
        if Utc::now() > request.expires_at {
            return Err(A2aError::PaymentFailed(format!(
                "payment request expired: {}",
                request_id
            )));
        }

        let verification = settlement
            .verify_payment(Value::Object(params.clone()))
            .await?;
        if !verification.verified {
            return Err(A2aError::PaymentFailed(
                verification
                    .error
                    .unwrap_or_else(|| "payment verification failed".to_string()),
            ));
        }

        Ok(json!({ "verified": true, "requestId": request_id }))
    }

    fn settlement(&self) -> Result<&Arc<dyn SettlementManager>> {
        self.settlement.as_ref().ok_or_else(|| {
            warn!("payment method invoked without a settlement manager");
            A2aError::Internal("settlement manager not configured".to_string())
        })
    }

    fn subscribers_excluding(&self, market_id: &str, excluded: &str) -> Vec<String> {
        self.state
            .subscriptions
            .lock()
            .get(market_id)
            .map(|subscribers| {
                subscribers
                    .iter()
                    .filter(|s| s.as_str() != excluded)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // ── State accessors for the host and tests ──────────────────────────────

    pub fn coalition(&self, coalition_id: &str) -> Option<Coalition> {
        self.state.coalitions.lock().get(coalition_id).cloned()
    }

    pub fn market_subscribers(&self, market_id: &str) -> Vec<String> {
        self.state
            .subscriptions
            .lock()
            .get(market_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn analysis_request(&self, request_id: &str) -> Option<AnalysisRequest> {
        self.state
            .analysis_requests
            .lock()
            .get(request_id)
            .cloned()
    }
}

fn require_params_object(params: &Value) -> Result<&Map<String, Value>> {
    match params {
        Value::Object(map) => Ok(map),
        _ => Err(A2aError::InvalidParams(
            "params must be an object".to_string(),
        )),
    }
}

fn require_str<'a>(params: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| A2aError::InvalidParams(format!("{} is required", key)))
}

fn truncate(agents: &mut Vec<Value>, limit: Option<usize>) {
    if let Some(limit) = limit {
        agents.truncate(limit);
    }
}

fn project_public_analysis(stored: Value) -> Value {
    let Value::Object(map) = stored else {
        return json!({});
    };
    let mut public = Map::new();
    for field in PUBLIC_ANALYSIS_FIELDS {
        if let Some(value) = map.get(*field) {
            public.insert((*field).to_string(), value.clone());
        }
    }
    Value::Object(public)
}

fn new_coalition_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!(
        "coalition-{}-{}",
        Utc::now().timestamp_millis(),
        suffix.to_lowercase()
    )
}
