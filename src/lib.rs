//! # A2A Core
//!
//! Trust-and-dispatch layer for an agent-to-agent marketplace protocol.
//! Autonomous trading agents prove control of an on-chain identity token
//! with an Ethereum-style message signature, receive a time-boxed session,
//! and exchange JSON-RPC 2.0 requests for discovery, market reads,
//! subscriptions, coalitions, analysis exchange, and micropayments.
//!
//! ## Architecture
//!
//! - **SessionAuthenticator**: replay-bounded signature verification,
//!   ordered ownership-verifier fallback, session issuance/revocation
//! - **IdentityRegistryClient**: read-only, normalizing façade over the
//!   on-chain identity + reputation contracts
//! - **ProtocolRouter**: dispatches authenticated requests to the `a2a.*`
//!   method handlers and owns the in-memory subscription/coalition state
//!
//! The transport (socket handling, framing, the per-connection
//! `authenticated` flag) and all persistent stores live outside this crate
//! and are reached through the traits in [`external`].

pub mod auth;
pub mod config;
pub mod error;
pub mod external;
pub mod federation;
pub mod model;
pub mod registry;
pub mod router;
pub mod rpc;

pub use auth::{AuthOutcome, DenialReason, OwnershipVerifier, SessionAuthenticator};
pub use config::AppConfig;
pub use error::{A2aError, Result};
pub use federation::DirectoryClient;
pub use model::{AgentCredentials, AgentProfile, Coalition, Connection, Market, Session};
pub use registry::IdentityRegistryClient;
pub use router::ProtocolRouter;
pub use rpc::{JsonRpcRequest, JsonRpcResponse};

/// On-chain identity token id. `0` is the contracts' unregistered sentinel.
pub type TokenId = u64;
