// ===============================
// src/error.rs
// ===============================
use thiserror::Error;

use crate::domain::OrderType;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("venue error {code}: {message}")]
    Venue { code: i32, message: String },
    #[error("authentication permanently rejected (code {code}), reconfigure before reconnecting")]
    AuthPermanentlyRejected { code: i32 },
    #[error("request submission failed, code {code}")]
    SubmissionFailed { code: i32 },
    #[error("order request has no open/close offset")]
    MissingOffset,
    #[error("order type {0:?} is not supported by the venue")]
    UnsupportedOrderType(OrderType),
    #[error("unsupported venue order type on update, order id {order_id}")]
    UnsupportedVenueOrderType { order_id: String },
    #[error("unknown venue order status {status:?}, order id {order_id}")]
    UnknownStatus { order_id: String, status: char },
    #[error("unknown venue direction {0:?}")]
    UnknownDirection(char),
    #[error("trade references unbound system id {sys_id}")]
    UnresolvedReference { sys_id: String },
    #[error("malformed local order id {0:?}")]
    InvalidOrderId(String),
    #[error("no contract for symbol {0}")]
    UnknownContract(String),
}

impl SessionError {
    /// Venue numeric code carried by the error, if any.
    pub fn code(&self) -> Option<i32> {
        match self {
            SessionError::Venue { code, .. }
            | SessionError::AuthPermanentlyRejected { code }
            | SessionError::SubmissionFailed { code } => Some(*code),
            _ => None,
        }
    }
}
