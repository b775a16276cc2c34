use relayer_wire::IdentifierError;
use thiserror::Error;

/// Local input problems. Never leave the process.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("address error: {0}")]
    Address(String),
    #[error("range error: {0}")]
    Range(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("key error: {0}")]
    Key(String),
}

/// Which part of the relayer's handle list disagreed with the local computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleMismatch {
    Length { expected: usize, received: usize },
    Value { index: usize, expected: String, received: String },
}

impl std::fmt::Display for HandleMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleMismatch::Length { expected, received } => write!(
                f,
                "Incorrect Handles list sizes: (expected) {expected} != {received} (received)"
            ),
            HandleMismatch::Value {
                index,
                expected,
                received,
            } => write!(
                f,
                "Incorrect Handle {index}: (expected) {expected} != {received} (received)"
            ),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Too many bits in provided values: {total} bits, maximum is {max}")]
    BudgetExceeded { total: u32, max: u32 },

    #[error("Relayer didn't respond correctly on {endpoint}{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    RelayerProtocol {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    #[error("transport error on {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("handle mismatch: {0}")]
    HandleMismatch(HandleMismatch),

    #[error("insufficient shares: accepted {accepted}, required {required}")]
    InsufficientShares { accepted: usize, required: usize },

    #[error("crypto backend error: {0}")]
    CryptoBackend(#[source] anyhow::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<IdentifierError> for Error {
    fn from(value: IdentifierError) -> Self {
        Error::Validation(ValidationError::Type(value.to_string()))
    }
}

impl Error {
    pub(crate) fn relayer(endpoint: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Error::RelayerProtocol {
            endpoint: endpoint.into(),
            status,
            message: message.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reasons a single signer response is left out of aggregation. Never fatal on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("digest does not match the request")]
    DigestMismatch,
    #[error("party id {0} is not part of the signer set")]
    UnknownSigner(u32),
    #[error("verification key {received} does not belong to party {party_id}")]
    SignerKeyMismatch { party_id: u32, received: String },
    #[error("signature does not verify")]
    InvalidSignature,
    #[error("party id {0} already answered")]
    DuplicateSigner(u32),
    #[error("verification key {0} already used by another response")]
    DuplicateKey(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}
