//! Error types for broker sessions and the put/get cycle.
//!
//! Broker-side failures are carried as a [`BrokerFault`], which holds the MQ
//! reason code reported by the queue manager and an optional linked cause. The
//! top-level [`MessagingError`] records which operation failed and exposes the
//! fault through [`std::error::Error::source`], so the whole chain can be
//! walked by the error reporter.

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Boxed cause attached to a [`BrokerFault`].
pub type BoxedCause = Box<dyn StdError + Send + Sync + 'static>;

/// Comprehensive error type for all messaging operations
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Connection to queue manager '{queue_manager}' at {address} failed")]
    Connection {
        queue_manager: String,
        address: String,
        #[source]
        fault: BrokerFault,
    },

    #[error("Send to {destination} failed")]
    Send {
        destination: String,
        #[source]
        fault: BrokerFault,
    },

    #[error("Receive from {destination} failed")]
    Receive {
        destination: String,
        #[source]
        fault: BrokerFault,
    },

    #[error("Cannot resolve destination '{name}': {reason}")]
    Resolution { name: String, reason: String },
}

impl MessagingError {
    /// Classify the error for logging and exit-code decisions
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Send { .. } => ErrorKind::Send,
            Self::Receive { .. } => ErrorKind::Receive,
            Self::Resolution { .. } => ErrorKind::Resolution,
        }
    }

    /// Check if the error should abort startup instead of being retried
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Get the broker fault behind this error, if the broker reported one
    pub fn fault(&self) -> Option<&BrokerFault> {
        match self {
            Self::Connection { fault, .. }
            | Self::Send { fault, .. }
            | Self::Receive { fault, .. } => Some(fault),
            Self::Configuration(_) | Self::Resolution { .. } => None,
        }
    }

    /// Get the MQ reason code reported for this error
    pub fn reason(&self) -> Option<ReasonCode> {
        self.fault().and_then(BrokerFault::reason)
    }
}

/// Coarse classification of [`MessagingError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Connection,
    Send,
    Receive,
    Resolution,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Connection => "connection",
            Self::Send => "send",
            Self::Receive => "receive",
            Self::Resolution => "resolution",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Broker Faults
// ============================================================================

/// MQ reason code (`MQRC_*`) reported by a queue manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReasonCode(u32);

impl ReasonCode {
    pub const CONNECTION_BROKEN: Self = Self(2009);
    pub const GET_INHIBITED: Self = Self(2016);
    pub const HCONN_ERROR: Self = Self(2018);
    pub const NOT_AUTHORIZED: Self = Self(2035);
    pub const PUT_INHIBITED: Self = Self(2051);
    pub const Q_FULL: Self = Self(2053);
    pub const Q_MGR_NAME_ERROR: Self = Self(2058);
    pub const Q_MGR_NOT_AVAILABLE: Self = Self(2059);
    pub const UNKNOWN_OBJECT_NAME: Self = Self(2085);
    pub const NOT_CONVERTED: Self = Self(2119);
    pub const UNEXPECTED_ERROR: Self = Self(2195);
    pub const HOST_NOT_AVAILABLE: Self = Self(2538);
    pub const UNKNOWN_CHANNEL_NAME: Self = Self(2540);

    /// Wrap a raw reason code
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    /// Get the numeric reason code
    pub const fn code(&self) -> u32 {
        self.0
    }

    /// Get the `MQRC_*` constant name for well-known codes
    pub fn name(&self) -> Option<&'static str> {
        let name = match self.0 {
            2009 => "MQRC_CONNECTION_BROKEN",
            2016 => "MQRC_GET_INHIBITED",
            2018 => "MQRC_HCONN_ERROR",
            2035 => "MQRC_NOT_AUTHORIZED",
            2051 => "MQRC_PUT_INHIBITED",
            2053 => "MQRC_Q_FULL",
            2058 => "MQRC_Q_MGR_NAME_ERROR",
            2059 => "MQRC_Q_MGR_NOT_AVAILABLE",
            2085 => "MQRC_UNKNOWN_OBJECT_NAME",
            2119 => "MQRC_NOT_CONVERTED",
            2195 => "MQRC_UNEXPECTED_ERROR",
            2538 => "MQRC_HOST_NOT_AVAILABLE",
            2540 => "MQRC_UNKNOWN_CHANNEL_NAME",
            _ => return None,
        };
        Some(name)
    }

    /// Check if the code means the connection handle can no longer be used
    pub fn is_connection_broken(&self) -> bool {
        matches!(
            *self,
            Self::CONNECTION_BROKEN
                | Self::HCONN_ERROR
                | Self::Q_MGR_NOT_AVAILABLE
                | Self::HOST_NOT_AVAILABLE
        )
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "MQRC ({})", self.0),
        }
    }
}

/// A failure reported by the broker or by the transport talking to it.
///
/// Faults form a linked chain: a fault may carry another fault (for example the
/// second entry of a REST error response) or the underlying I/O or HTTP error.
#[derive(Debug)]
pub struct BrokerFault {
    reason: Option<ReasonCode>,
    message: String,
    cause: Option<BoxedCause>,
}

impl BrokerFault {
    /// Create a fault without a reason code
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            reason: None,
            message: message.into(),
            cause: None,
        }
    }

    /// Create a fault with an MQ reason code
    pub fn with_reason(reason: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            reason: Some(reason),
            message: message.into(),
            cause: None,
        }
    }

    /// Fault raised when an operation is attempted on a closed session
    pub fn session_closed() -> Self {
        Self::with_reason(ReasonCode::HCONN_ERROR, "session is not open")
    }

    /// Attach the next link in the cause chain
    pub fn caused_by(mut self, cause: impl Into<BoxedCause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Get the reason code, if the broker reported one
    pub fn reason(&self) -> Option<ReasonCode> {
        self.reason
    }

    /// Get the fault message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check if this fault leaves the connection unusable
    pub fn is_connection_broken(&self) -> bool {
        self.reason
            .map(|reason| reason.is_connection_broken())
            .unwrap_or(false)
    }
}

impl fmt::Display for BrokerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            Some(reason) => write!(f, "{}: {}", reason, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl StdError for BrokerFault {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause.as_ref() as &(dyn StdError + 'static))
    }
}

// ============================================================================
// Configuration and Validation
// ============================================================================

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
