//! End-to-end router and authentication scenarios over in-memory
//! collaborators.

use a2a_core::{
    auth::{canonical_auth_message, RegistryOwnership, SessionAuthenticator},
    config::AuthConfig,
    error::{A2aError, Result},
    external::{
        AnalysisArchive, ChainAgentRecord, ChainIdentity, ChainReputationRecord, DirectoryAgent,
        FederatedDirectory, MarketStore, PaymentRequest, ReputationOracle, SettlementManager,
        Transport, VerificationResult,
    },
    model::{AgentCredentials, Connection, DiscoveryFilters, Market},
    rpc::{code, method, JsonRpcRequest},
    IdentityRegistryClient, ProtocolRouter,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use ethers::signers::{LocalWallet, Signer};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

// ── In-memory collaborators ─────────────────────────────────────────────────

#[derive(Clone)]
struct ChainAgent {
    owner: String,
    record: ChainAgentRecord,
    reputation: ChainReputationRecord,
}

#[derive(Default)]
struct MockChain {
    agents: HashMap<u64, ChainAgent>,
}

impl MockChain {
    fn with_agent(
        mut self,
        token_id: u64,
        owner: &str,
        metadata: &str,
        trust_score: f64,
    ) -> Self {
        self.agents.insert(
            token_id,
            ChainAgent {
                owner: owner.to_string(),
                record: ChainAgentRecord {
                    name: Some(format!("agent-{}", token_id)),
                    endpoint: Some(format!("https://agent{}.example", token_id)),
                    metadata: Some(metadata.to_string()),
                    is_active: Some(true),
                },
                reputation: ChainReputationRecord {
                    trust_score: Some(trust_score),
                    ..Default::default()
                },
            },
        );
        self
    }
}

#[async_trait]
impl ChainIdentity for MockChain {
    async fn get_token_id(&self, address: &str) -> Result<u64> {
        Ok(self
            .agents
            .iter()
            .find(|(_, a)| a.owner.eq_ignore_ascii_case(address))
            .map(|(id, _)| *id)
            .unwrap_or(0))
    }

    async fn owner_of(&self, token_id: u64) -> Result<String> {
        self.agents
            .get(&token_id)
            .map(|a| a.owner.clone())
            .ok_or_else(|| A2aError::Chain(format!("no owner for token {}", token_id)))
    }

    async fn get_agent_record(&self, token_id: u64) -> Result<ChainAgentRecord> {
        self.agents
            .get(&token_id)
            .map(|a| a.record.clone())
            .ok_or_else(|| A2aError::Chain(format!("no record for token {}", token_id)))
    }

    async fn is_registered(&self, address: &str) -> Result<bool> {
        Ok(self.get_token_id(address).await? != 0)
    }

    async fn get_all_active_agents(&self) -> Result<Vec<u64>> {
        let mut ids: Vec<u64> = self.agents.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn is_endpoint_active(&self, token_id: u64) -> Result<bool> {
        Ok(self.agents.contains_key(&token_id))
    }

    async fn get_agents_by_capability(&self, _capability: &str) -> Result<Vec<u64>> {
        self.get_all_active_agents().await
    }
}

#[async_trait]
impl ReputationOracle for MockChain {
    async fn get_reputation(&self, token_id: u64) -> Result<ChainReputationRecord> {
        Ok(self
            .agents
            .get(&token_id)
            .map(|a| a.reputation.clone())
            .unwrap_or_default())
    }

    async fn get_feedback_count(&self, _token_id: u64) -> Result<u64> {
        Ok(0)
    }

    async fn get_feedback(&self, _token_id: u64, _index: u64) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn get_agents_by_min_score(&self, min_score: f64) -> Result<Vec<u64>> {
        let mut ids: Vec<u64> = self
            .agents
            .iter()
            .filter(|(_, a)| a.reputation.trust_score.unwrap_or(0.0) >= min_score)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[derive(Default)]
struct MockMarkets {
    markets: HashMap<String, Market>,
}

impl MockMarkets {
    fn with_market(mut self, id: &str, yes: f64, no: f64) -> Self {
        self.markets.insert(
            id.to_string(),
            Market {
                id: id.to_string(),
                question: format!("Will {} resolve yes?", id),
                yes_shares: yes,
                no_shares: no,
                liquidity: 1000.0,
                end_date: Utc::now() + Duration::days(7),
                resolved: false,
            },
        );
        self
    }
}

#[async_trait]
impl MarketStore for MockMarkets {
    async fn find_market(&self, market_id: &str) -> Result<Option<Market>> {
        Ok(self.markets.get(market_id).cloned())
    }
}

#[derive(Default)]
struct MockArchive {
    analyses: Mutex<HashMap<String, Vec<Value>>>,
}

#[async_trait]
impl AnalysisArchive for MockArchive {
    async fn store_analysis(&self, market_id: &str, analysis: Value) -> Result<String> {
        let mut analyses = self.analyses.lock();
        let entries = analyses.entry(market_id.to_string()).or_default();
        let id = format!("analysis-{}", entries.len() + 1);
        let mut stored = analysis;
        stored["analysisId"] = json!(id);
        entries.push(stored);
        Ok(id)
    }

    async fn get_analyses(&self, market_id: &str, limit: usize) -> Result<Vec<Value>> {
        Ok(self
            .analyses
            .lock()
            .get(market_id)
            .map(|entries| entries.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// Records each broadcast instead of delivering it anywhere.
#[derive(Default)]
struct MockTransport {
    broadcasts: Mutex<Vec<(Vec<String>, Value)>>,
}

impl MockTransport {
    fn recipients(&self) -> Vec<Vec<String>> {
        self.broadcasts.lock().iter().map(|(r, _)| r.clone()).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn broadcast(&self, agent_ids: &[String], message: Value) -> Result<()> {
        self.broadcasts.lock().push((agent_ids.to_vec(), message));
        Ok(())
    }
}

struct MockDirectory {
    agents: Vec<DirectoryAgent>,
}

#[async_trait]
impl FederatedDirectory for MockDirectory {
    async fn discover_agents(&self, _filters: &DiscoveryFilters) -> Result<Vec<DirectoryAgent>> {
        Ok(self.agents.clone())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<DirectoryAgent>> {
        Ok(self.agents.iter().find(|a| a.agent_id == agent_id).cloned())
    }
}

#[derive(Default)]
struct MockSettlement {
    requests: Mutex<HashMap<String, PaymentRequest>>,
}

#[async_trait]
impl SettlementManager for MockSettlement {
    async fn create_payment_request(
        &self,
        from: &str,
        to: &str,
        amount: f64,
        service: &str,
        metadata: Option<Value>,
    ) -> Result<PaymentRequest> {
        let request = PaymentRequest {
            request_id: format!("pay-{}", self.requests.lock().len() + 1),
            from: from.to_string(),
            to: to.to_string(),
            amount,
            service: service.to_string(),
            metadata,
            expires_at: Utc::now() + Duration::minutes(15),
        };
        self.requests
            .lock()
            .insert(request.request_id.clone(), request.clone());
        Ok(request)
    }

    async fn get_payment_request(&self, request_id: &str) -> Result<Option<PaymentRequest>> {
        Ok(self.requests.lock().get(request_id).cloned())
    }

    async fn verify_payment(&self, _params: Value) -> Result<VerificationResult> {
        Ok(VerificationResult {
            verified: true,
            error: None,
        })
    }
}

// ── Fixtures ────────────────────────────────────────────────────────────────

struct Fixture {
    router: ProtocolRouter,
    transport: Arc<MockTransport>,
}

fn registry_over(chain: MockChain) -> Arc<IdentityRegistryClient> {
    let chain = Arc::new(chain);
    Arc::new(IdentityRegistryClient::new(chain.clone(), chain))
}

fn fixture(chain: MockChain, markets: MockMarkets) -> Fixture {
    let transport = Arc::new(MockTransport::default());
    let router = ProtocolRouter::new(
        registry_over(chain),
        Arc::new(markets),
        Arc::new(MockArchive::default()),
        transport.clone(),
    );
    Fixture { router, transport }
}

fn request(method_name: &str, params: Value) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: json!(1),
        method: method_name.to_string(),
        params,
    }
}

fn connection(agent_id: &str) -> Connection {
    Connection {
        agent_id: agent_id.to_string(),
        authenticated: true,
    }
}

async fn call(fixture: &Fixture, sender: &str, method_name: &str, params: Value) -> Value {
    let response = fixture
        .router
        .route(request(method_name, params), sender, &connection(sender))
        .await;
    serde_json::to_value(response).unwrap()
}

// ── Authentication scenarios ────────────────────────────────────────────────

async fn signed_credentials(wallet: &LocalWallet, token_id: u64) -> AgentCredentials {
    let address = format!("{:?}", wallet.address());
    let timestamp = Utc::now().timestamp_millis();
    let message = canonical_auth_message(&address, token_id, timestamp);
    let signature = wallet.sign_message(message).await.unwrap();
    AgentCredentials {
        address,
        token_id,
        timestamp,
        signature: format!("0x{}", signature),
    }
}

#[tokio::test]
async fn authenticate_against_registry_ownership() {
    let wallet = LocalWallet::new(&mut rand::thread_rng());
    let address = format!("{:?}", wallet.address());
    let registry = registry_over(MockChain::default().with_agent(7, &address, "{}", 0.5));

    let auth = SessionAuthenticator::new(
        &AuthConfig::default(),
        vec![Arc::new(RegistryOwnership::new(registry))],
    )
    .unwrap();

    let outcome = auth.authenticate(&signed_credentials(&wallet, 7).await).await;
    assert!(outcome.is_granted());

    // Validly signed claim over a token the wallet does not own
    let stolen = signed_credentials(&wallet, 8).await;
    let denied = auth.authenticate(&stolen).await;
    assert!(!denied.is_granted());
}

#[tokio::test]
async fn checksummed_and_lowercase_addresses_both_authenticate() {
    let wallet = LocalWallet::new(&mut rand::thread_rng());
    let lowercase = format!("{:?}", wallet.address());
    let checksummed = ethers::utils::to_checksum(&wallet.address(), None);
    let registry = registry_over(MockChain::default().with_agent(3, &lowercase, "{}", 0.5));

    let auth = SessionAuthenticator::new(
        &AuthConfig::default(),
        vec![Arc::new(RegistryOwnership::new(registry))],
    )
    .unwrap();

    // Sign over the checksummed form; ownership compare is case-insensitive
    let timestamp = Utc::now().timestamp_millis();
    let message = canonical_auth_message(&checksummed, 3, timestamp);
    let signature = wallet.sign_message(message).await.unwrap();
    let outcome = auth
        .authenticate(&AgentCredentials {
            address: checksummed,
            token_id: 3,
            timestamp,
            signature: format!("0x{}", signature),
        })
        .await;
    assert!(outcome.is_granted());
}

// ── Router gatekeeping ──────────────────────────────────────────────────────

#[tokio::test]
async fn unauthenticated_connection_never_reaches_a_handler() {
    let fx = fixture(MockChain::default(), MockMarkets::default().with_market("m1", 1.0, 1.0));
    let conn = Connection {
        agent_id: "agent-1".to_string(),
        authenticated: false,
    };
    let response = fx
        .router
        .route(
            request(method::GET_MARKET_DATA, json!({"marketId": "m1"})),
            "agent-1",
            &conn,
        )
        .await;
    let value = serde_json::to_value(response).unwrap();
    assert_eq!(value["error"]["code"], code::NOT_AUTHENTICATED);
}

#[tokio::test]
async fn unknown_method_echoes_null_id() {
    let fx = fixture(MockChain::default(), MockMarkets::default());
    let response = fx
        .router
        .route(
            JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id: Value::Null,
                method: "a2a.doesNotExist".to_string(),
                params: json!({}),
            },
            "agent-1",
            &connection("agent-1"),
        )
        .await;
    let value = serde_json::to_value(response).unwrap();
    assert_eq!(value["error"]["code"], code::METHOD_NOT_FOUND);
    assert_eq!(value["id"], Value::Null);
}

#[tokio::test]
async fn array_params_are_invalid() {
    let fx = fixture(MockChain::default(), MockMarkets::default());
    let value = call(&fx, "agent-1", method::SUBSCRIBE_MARKET, json!(["m1"])).await;
    assert_eq!(value["error"]["code"], code::INVALID_PARAMS);
}

// ── Discovery and market reads ──────────────────────────────────────────────

#[tokio::test]
async fn discover_agents_filters_by_strategy() {
    let chain = MockChain::default()
        .with_agent(1, "0x01", r#"{"strategies":["momentum"],"markets":["crypto"]}"#, 0.9)
        .with_agent(2, "0x02", r#"{"strategies":["arbitrage"],"markets":["crypto"]}"#, 0.8);
    let fx = fixture(chain, MockMarkets::default());

    let value = call(
        &fx,
        "agent-9",
        method::DISCOVER_AGENTS,
        json!({"filters": {"strategies": ["momentum"]}}),
    )
    .await;
    let agents = value["result"]["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0]["tokenId"], 1);
}

#[tokio::test]
async fn discover_agents_requires_both_categories_to_match() {
    let chain = MockChain::default().with_agent(
        1,
        "0x01",
        r#"{"strategies":["momentum"],"markets":["crypto"]}"#,
        0.9,
    );
    let fx = fixture(chain, MockMarkets::default());

    let value = call(
        &fx,
        "agent-9",
        method::DISCOVER_AGENTS,
        json!({"filters": {"strategies": ["momentum"], "markets": ["sports"]}}),
    )
    .await;
    assert_eq!(value["result"]["agents"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn discover_wire_contract_matches_published_methods() {
    let chain = MockChain::default()
        .with_agent(1, "0x01", "{}", 0.5)
        .with_agent(2, "0x02", "{}", 0.5)
        .with_agent(3, "0x03", "{}", 0.5);
    let fx = fixture(chain, MockMarkets::default());

    // Bare discover call: no filters key at all
    let value = call(&fx, "agent-9", "a2a.discover", json!({})).await;
    let agents = value["result"]["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 3);
    assert_eq!(value["result"]["total"], 3);

    // `total` reports the full match count even when `limit` truncates
    let value = call(&fx, "agent-9", "a2a.discover", json!({"limit": 2})).await;
    assert_eq!(value["result"]["agents"].as_array().unwrap().len(), 2);
    assert_eq!(value["result"]["total"], 3);

    let value = call(&fx, "agent-9", "a2a.getInfo", json!({"agentId": "agent-1"})).await;
    assert_eq!(value["result"]["agentId"], "agent-1");
    assert_eq!(value["result"]["tokenId"], 1);
}

#[tokio::test]
async fn federated_discovery_takes_precedence_and_falls_back_when_empty() {
    let chain = MockChain::default().with_agent(1, "0x01", "{}", 0.5);

    // Directory with results wins
    let transport = Arc::new(MockTransport::default());
    let router = ProtocolRouter::new(
        registry_over(MockChain::default().with_agent(1, "0x01", "{}", 0.5)),
        Arc::new(MockMarkets::default()),
        Arc::new(MockArchive::default()),
        transport.clone(),
    )
    .with_directory(Arc::new(MockDirectory {
        agents: vec![DirectoryAgent {
            agent_id: "agent0-55".to_string(),
            name: Some("federated".to_string()),
            ..Default::default()
        }],
    }));
    let fx = Fixture { router, transport };
    let value = call(&fx, "agent-9", method::DISCOVER_AGENTS, json!({})).await;
    let agents = value["result"]["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0]["agentId"], "agent0-55");

    // Empty directory falls back to the registry
    let transport = Arc::new(MockTransport::default());
    let router = ProtocolRouter::new(
        registry_over(chain),
        Arc::new(MockMarkets::default()),
        Arc::new(MockArchive::default()),
        transport.clone(),
    )
    .with_directory(Arc::new(MockDirectory { agents: vec![] }));
    let fx = Fixture { router, transport };
    let value = call(&fx, "agent-9", method::DISCOVER_AGENTS, json!({})).await;
    let agents = value["result"]["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0]["tokenId"], 1);
}

#[tokio::test]
async fn get_agent_info_routes_by_id_prefix() {
    let chain = MockChain::default().with_agent(4, "0x04", "{}", 0.5);
    let transport = Arc::new(MockTransport::default());
    let router = ProtocolRouter::new(
        registry_over(chain),
        Arc::new(MockMarkets::default()),
        Arc::new(MockArchive::default()),
        transport.clone(),
    )
    .with_directory(Arc::new(MockDirectory {
        agents: vec![DirectoryAgent {
            agent_id: "agent0-10".to_string(),
            name: Some("external".to_string()),
            ..Default::default()
        }],
    }));
    let fx = Fixture { router, transport };

    let value = call(&fx, "x", method::GET_AGENT_INFO, json!({"agentId": "agent-4"})).await;
    assert_eq!(value["result"]["tokenId"], 4);

    let value = call(&fx, "x", method::GET_AGENT_INFO, json!({"agentId": "agent0-10"})).await;
    assert_eq!(value["result"]["name"], "external");

    let value = call(&fx, "x", method::GET_AGENT_INFO, json!({"agentId": "agent-999"})).await;
    assert_eq!(value["error"]["code"], code::AGENT_NOT_FOUND);
}

#[tokio::test]
async fn market_prices_default_to_even_odds() {
    let fx = fixture(
        MockChain::default(),
        MockMarkets::default()
            .with_market("m1", 300.0, 100.0)
            .with_market("empty", 0.0, 0.0),
    );

    let value = call(&fx, "a", method::GET_MARKET_PRICES, json!({"marketId": "m1"})).await;
    assert_eq!(value["result"]["yesPrice"], 0.75);
    assert_eq!(value["result"]["noPrice"], 0.25);

    let value = call(&fx, "a", method::GET_MARKET_PRICES, json!({"marketId": "empty"})).await;
    assert_eq!(value["result"]["yesPrice"], 0.5);

    let value = call(&fx, "a", method::GET_MARKET_DATA, json!({"marketId": "nope"})).await;
    assert_eq!(value["error"]["code"], code::MARKET_NOT_FOUND);
}

// ── Coalitions ──────────────────────────────────────────────────────────────

async fn propose(fx: &Fixture, sender: &str) -> String {
    let value = call(
        fx,
        sender,
        method::PROPOSE_COALITION,
        json!({"name": "alpha", "targetMarket": "m1", "strategy": "momentum"}),
    )
    .await;
    value["result"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn propose_requires_all_fields() {
    let fx = fixture(MockChain::default(), MockMarkets::default());
    let value = call(
        &fx,
        "agent-a",
        method::PROPOSE_COALITION,
        json!({"name": "alpha"}),
    )
    .await;
    assert_eq!(value["error"]["code"], code::INVALID_PARAMS);
}

#[tokio::test]
async fn join_twice_yields_no_duplicate_member() {
    let fx = fixture(MockChain::default(), MockMarkets::default());
    let id = propose(&fx, "agent-a").await;

    call(&fx, "agent-b", method::JOIN_COALITION, json!({"coalitionId": id})).await;
    call(&fx, "agent-b", method::JOIN_COALITION, json!({"coalitionId": id})).await;

    let coalition = fx.router.coalition(&id).unwrap();
    assert_eq!(coalition.members, vec!["agent-a", "agent-b"]);
}

#[tokio::test]
async fn join_unknown_coalition_fails() {
    let fx = fixture(MockChain::default(), MockMarkets::default());
    let value = call(
        &fx,
        "agent-b",
        method::JOIN_COALITION,
        json!({"coalitionId": "coalition-0-zzzzzzzzz"}),
    )
    .await;
    assert_eq!(value["error"]["code"], code::COALITION_NOT_FOUND);
}

#[tokio::test]
async fn coalition_message_reaches_other_members_only() {
    let fx = fixture(MockChain::default(), MockMarkets::default());
    let id = propose(&fx, "agent-a").await;
    call(&fx, "agent-b", method::JOIN_COALITION, json!({"coalitionId": id})).await;

    let value = call(
        &fx,
        "agent-a",
        method::COALITION_MESSAGE,
        json!({"coalitionId": id, "message": {"signal": "buy"}}),
    )
    .await;
    assert_eq!(value["result"]["delivered"], 1);
    assert_eq!(fx.transport.recipients(), vec![vec!["agent-b".to_string()]]);

    // Non-members cannot post
    let value = call(
        &fx,
        "agent-z",
        method::COALITION_MESSAGE,
        json!({"coalitionId": id, "message": "hi"}),
    )
    .await;
    assert_eq!(value["error"]["code"], code::INVALID_PARAMS);
}

#[tokio::test]
async fn leaving_last_member_deactivates_but_keeps_coalition() {
    let fx = fixture(MockChain::default(), MockMarkets::default());
    let id = propose(&fx, "agent-a").await;

    let value = call(&fx, "agent-a", method::LEAVE_COALITION, json!({"coalitionId": id})).await;
    assert_eq!(value["result"]["active"], false);

    let coalition = fx.router.coalition(&id).unwrap();
    assert!(coalition.members.is_empty());
    assert!(!coalition.active);
}

// ── Subscriptions and analysis exchange ─────────────────────────────────────

#[tokio::test]
async fn subscribe_is_idempotent() {
    let fx = fixture(MockChain::default(), MockMarkets::default());
    call(&fx, "agent-b", method::SUBSCRIBE_MARKET, json!({"marketId": "m1"})).await;
    call(&fx, "agent-b", method::SUBSCRIBE_MARKET, json!({"marketId": "m1"})).await;
    assert_eq!(fx.router.market_subscribers("m1"), vec!["agent-b"]);
}

#[tokio::test]
async fn share_analysis_distributes_to_subscribers_excluding_author() {
    let fx = fixture(MockChain::default(), MockMarkets::default());
    call(&fx, "B", method::SUBSCRIBE_MARKET, json!({"marketId": "m1"})).await;

    let value = call(
        &fx,
        "A",
        method::SHARE_ANALYSIS,
        json!({
            "marketId": "m1",
            "timestamp": 1700000000000i64,
            "prediction": "yes",
            "confidence": 0.8,
            "reasoning": "private notes",
        }),
    )
    .await;
    assert_eq!(value["result"]["distributed"], 1);
    assert_eq!(fx.transport.recipients(), vec![vec!["B".to_string()]]);

    let (recipients, message) = fx.transport.broadcasts.lock()[0].clone();
    assert_eq!(recipients, vec!["B"]);
    assert_eq!(message["type"], "analysis_shared");
    assert_eq!(message["agentId"], "A");
    // Reduced projection never carries private fields
    assert!(message.get("reasoning").is_none());
}

#[tokio::test]
async fn share_analysis_requires_market_and_timestamp() {
    let fx = fixture(MockChain::default(), MockMarkets::default());
    let value = call(&fx, "A", method::SHARE_ANALYSIS, json!({"marketId": "m1"})).await;
    assert_eq!(value["error"]["code"], code::INVALID_PARAMS);

    // A present-but-null timestamp fails the same gate
    let value = call(
        &fx,
        "A",
        method::SHARE_ANALYSIS,
        json!({"marketId": "m1", "timestamp": null}),
    )
    .await;
    assert_eq!(value["error"]["code"], code::INVALID_PARAMS);
}

#[tokio::test]
async fn request_analysis_stays_in_memory_and_notifies_subscribers() {
    let fx = fixture(MockChain::default(), MockMarkets::default());
    call(&fx, "B", method::SUBSCRIBE_MARKET, json!({"marketId": "m1"})).await;
    call(&fx, "C", method::SUBSCRIBE_MARKET, json!({"marketId": "m1"})).await;

    let deadline = Utc::now().timestamp_millis() + 3_600_000;
    let value = call(
        &fx,
        "B",
        method::REQUEST_ANALYSIS,
        json!({"marketId": "m1", "deadline": deadline, "paymentOffer": 2.5}),
    )
    .await;
    // Requester excluded from its own notification
    assert_eq!(value["result"]["notified"], 1);
    assert_eq!(fx.transport.recipients(), vec![vec!["C".to_string()]]);

    let request_id = value["result"]["requestId"].as_str().unwrap();
    let record = fx.router.analysis_request(request_id).unwrap();
    assert_eq!(record.market_id, "m1");
    assert_eq!(record.requester, "B");
    assert_eq!(record.payment_offer, Some(2.5));

    // Nothing reached the archive
    let value = call(&fx, "B", method::GET_ANALYSES, json!({"marketId": "m1"})).await;
    assert_eq!(value["result"]["count"], 0);
}

#[tokio::test]
async fn get_analyses_projects_public_fields() {
    let fx = fixture(MockChain::default(), MockMarkets::default());
    call(
        &fx,
        "A",
        method::SHARE_ANALYSIS,
        json!({
            "marketId": "m1",
            "timestamp": 1700000000000i64,
            "prediction": "no",
            "confidence": 0.6,
            "reasoning": "internal",
        }),
    )
    .await;

    let value = call(&fx, "B", method::GET_ANALYSES, json!({"marketId": "m1"})).await;
    let analyses = value["result"]["analyses"].as_array().unwrap();
    assert_eq!(analyses.len(), 1);
    assert_eq!(analyses[0]["prediction"], "no");
    assert_eq!(analyses[0]["agentId"], "A");
    assert!(analyses[0].get("reasoning").is_none());
}

// ── Payments ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn payment_methods_hidden_while_flag_is_off() {
    // A wired settlement manager does not matter while the flag is off
    let transport = Arc::new(MockTransport::default());
    let router = ProtocolRouter::new(
        registry_over(MockChain::default()),
        Arc::new(MockMarkets::default()),
        Arc::new(MockArchive::default()),
        transport.clone(),
    )
    .with_settlement(Arc::new(MockSettlement::default()));
    let fx = Fixture { router, transport };

    let value = call(
        &fx,
        "A",
        method::PAYMENT_REQUEST,
        json!({"to": "B", "amount": 1.0, "service": "analysis"}),
    )
    .await;
    assert_eq!(value["error"]["code"], code::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn payment_flag_without_manager_is_internal_error() {
    let transport = Arc::new(MockTransport::default());
    let router = ProtocolRouter::new(
        registry_over(MockChain::default()),
        Arc::new(MockMarkets::default()),
        Arc::new(MockArchive::default()),
        transport.clone(),
    )
    .with_payments_enabled(true);
    let fx = Fixture { router, transport };

    let value = call(
        &fx,
        "A",
        method::PAYMENT_REQUEST,
        json!({"to": "B", "amount": 1.0, "service": "analysis"}),
    )
    .await;
    assert_eq!(value["error"]["code"], code::INTERNAL_ERROR);
}

#[tokio::test]
async fn payment_roundtrip_and_unknown_receipt() {
    let transport = Arc::new(MockTransport::default());
    let router = ProtocolRouter::new(
        registry_over(MockChain::default()),
        Arc::new(MockMarkets::default()),
        Arc::new(MockArchive::default()),
        transport.clone(),
    )
    .with_settlement(Arc::new(MockSettlement::default()))
    .with_payments_enabled(true);
    let fx = Fixture { router, transport };

    let value = call(
        &fx,
        "A",
        method::PAYMENT_REQUEST,
        json!({"to": "B", "amount": 1.5, "service": "analysis"}),
    )
    .await;
    let request_id = value["result"]["requestId"].as_str().unwrap().to_string();
    assert_eq!(value["result"]["from"], "A");

    let value = call(
        &fx,
        "B",
        method::PAYMENT_RECEIPT,
        json!({"requestId": request_id}),
    )
    .await;
    assert_eq!(value["result"]["verified"], true);

    let value = call(
        &fx,
        "B",
        method::PAYMENT_RECEIPT,
        json!({"requestId": "pay-never-issued"}),
    )
    .await;
    assert_eq!(value["error"]["code"], code::PAYMENT_FAILED);
}
