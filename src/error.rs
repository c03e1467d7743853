use thiserror::Error;

pub type Result<T> = std::result::Result<T, A2aError>;

#[derive(Error, Debug)]
pub enum A2aError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Market not found: {0}")]
    MarketNotFound(String),

    #[error("Coalition not found: {0}")]
    CoalitionNotFound(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Registry is read-only: {0}")]
    RegistryReadOnly(String),

    #[error("Chain query failed: {0}")]
    Chain(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl A2aError {
    /// Stable JSON-RPC error code for this error.
    ///
    /// Codes are part of the published protocol contract and must not change
    /// once clients depend on them. Anything without a dedicated code maps
    /// to `INTERNAL_ERROR`.
    pub fn rpc_code(&self) -> i64 {
        use crate::rpc::code;
        match self {
            A2aError::NotAuthenticated => code::NOT_AUTHENTICATED,
            A2aError::MethodNotFound(_) => code::METHOD_NOT_FOUND,
            A2aError::InvalidParams(_) => code::INVALID_PARAMS,
            A2aError::AgentNotFound(_) => code::AGENT_NOT_FOUND,
            A2aError::MarketNotFound(_) => code::MARKET_NOT_FOUND,
            A2aError::CoalitionNotFound(_) => code::COALITION_NOT_FOUND,
            A2aError::PaymentFailed(_) => code::PAYMENT_FAILED,
            _ => code::INTERNAL_ERROR,
        }
    }
}

impl From<serde_json::Error> for A2aError {
    fn from(err: serde_json::Error) -> Self {
        A2aError::Serialization(err.to_string())
    }
}
