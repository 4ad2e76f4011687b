use thiserror::Error;

use super::code::VCode;
use super::types::ConnectionId;

/// Recoverable outcomes of broker operations.
///
/// None of these are faults: they are reported to the caller as the result of
/// the operation and never retried by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("vCode already exists")]
    AlreadyExists(VCode),

    #[error("vCode does not exist")]
    NoSuchCode(VCode),

    #[error("vCode already has a receiver")]
    AlreadyPaired(VCode),

    #[error("connection {connection_id} is already bound to vCode {vcode}")]
    AlreadyBound {
        connection_id: ConnectionId,
        vcode: VCode,
    },

    #[error("connection {0} is not bound to this session")]
    NotBound(ConnectionId),

    #[error("{0}")]
    InvalidInput(String),
}

impl BrokerError {
    /// Stable machine-readable code used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            BrokerError::AlreadyExists(_) => "ALREADY_EXISTS",
            BrokerError::NoSuchCode(_) => "NO_SUCH_CODE",
            BrokerError::AlreadyPaired(_) => "ALREADY_PAIRED",
            BrokerError::AlreadyBound { .. } => "ALREADY_BOUND",
            BrokerError::NotBound(_) => "NOT_BOUND",
            BrokerError::InvalidInput(_) => "INVALID_INPUT",
        }
    }
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
