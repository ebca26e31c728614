//! # Error Taxonomy
//!
//! Every fallible operation in the kernel returns [`NodeError`]. Each
//! variant maps to a stable wire string (the `error` field of a JSON
//! error envelope) and an HTTP status code; the node's API adapter does
//! nothing but look those up. Unexpected faults — storage corruption,
//! serialization bugs — collapse into `server_error` after being logged,
//! so internals never leak to clients.

use thiserror::Error;

/// Result alias used throughout the kernel.
pub type Result<T> = std::result::Result<T, NodeError>;

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Low-level persistence faults. These always surface to clients as a
/// generic `server_error`; the detail is for the logs.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Encoding(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

// ---------------------------------------------------------------------------
// NodeError
// ---------------------------------------------------------------------------

/// The complete error taxonomy of the node.
///
/// Parameter-shaped variants carry the offending parameter name, which
/// the API envelope echoes back as `parameter`.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("parameter too large: {0}")]
    LargeParameter(String),

    #[error("authentication failed")]
    AuthFailed,

    #[error("address not found")]
    AddressNotFound,

    #[error("name not found")]
    NameNotFound,

    #[error("block not found")]
    BlockNotFound,

    #[error("transaction not found")]
    TransactionNotFound,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("not the owner of this name")]
    NotNameOwner,

    #[error("solution incorrect")]
    SolutionIncorrect,

    #[error("address is not the selected validator")]
    UnselectedValidator,

    #[error("invalid session token")]
    InvalidToken,

    #[error("name already taken")]
    NameTaken,

    #[error("solution already submitted")]
    SolutionDuplicate,

    #[error("block production is disabled")]
    MiningDisabled,

    #[error("rate limit hit")]
    RateLimitHit,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    ServerError(String),
}

impl NodeError {
    /// Stable wire identifier for the JSON error envelope.
    pub fn error_string(&self) -> &'static str {
        match self {
            Self::MissingParameter(_) => "missing_parameter",
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::LargeParameter(_) => "large_parameter",
            Self::AuthFailed => "auth_failed",
            Self::AddressNotFound => "address_not_found",
            Self::NameNotFound => "name_not_found",
            Self::BlockNotFound => "block_not_found",
            Self::TransactionNotFound => "transaction_not_found",
            Self::InsufficientFunds => "insufficient_funds",
            Self::NotNameOwner => "not_name_owner",
            Self::SolutionIncorrect => "solution_incorrect",
            Self::UnselectedValidator => "unselected_validator",
            Self::InvalidToken => "invalid_token",
            Self::NameTaken => "name_taken",
            Self::SolutionDuplicate => "solution_duplicate",
            Self::MiningDisabled => "mining_disabled",
            Self::RateLimitHit => "rate_limit_hit",
            Self::Store(_) | Self::ServerError(_) => "server_error",
        }
    }

    /// HTTP status the API adapter responds with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::MissingParameter(_) | Self::InvalidParameter(_) | Self::LargeParameter(_) => 400,
            Self::AuthFailed => 401,
            Self::AddressNotFound
            | Self::NameNotFound
            | Self::BlockNotFound
            | Self::TransactionNotFound => 404,
            Self::InsufficientFunds
            | Self::NotNameOwner
            | Self::SolutionIncorrect
            | Self::UnselectedValidator
            | Self::InvalidToken => 403,
            Self::NameTaken | Self::SolutionDuplicate => 409,
            Self::MiningDisabled => 423,
            Self::RateLimitHit => 429,
            Self::Store(_) | Self::ServerError(_) => 500,
        }
    }

    /// The offending parameter name, if this is a parameter error.
    pub fn parameter(&self) -> Option<&str> {
        match self {
            Self::MissingParameter(p) | Self::InvalidParameter(p) | Self::LargeParameter(p) => {
                Some(p)
            }
            _ => None,
        }
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Encoding(e.to_string())
    }
}
