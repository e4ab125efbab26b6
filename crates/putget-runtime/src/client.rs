//! Transport traits implemented by broker backends.
//!
//! A [`BrokerTransport`] performs the connection handshake and hands back a
//! [`BrokerConnection`], which carries the per-session put/get operations.
//! Sessions only ever talk to the broker through these traits.

use crate::endpoint::{BrokerEndpoint, Credentials};
use crate::error::BrokerFault;
use crate::message::{Destination, Message, MessageId, ReceivedMessage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Supported broker transports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// IBM MQ messaging REST gateway
    #[default]
    Rest,
    /// In-process queue manager emulation
    Memory,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rest => f.write_str("rest"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// Interface implemented by broker backends to open connections
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Perform the network handshake and, when credentials are present,
    /// authenticate with the queue manager
    async fn connect(
        &self,
        endpoint: &BrokerEndpoint,
        credentials: &Credentials,
    ) -> Result<Box<dyn BrokerConnection>, BrokerFault>;

    /// Get the transport kind
    fn kind(&self) -> TransportKind;
}

/// An open connection to a queue manager
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Put one text message onto the destination queue
    async fn put(
        &self,
        destination: &Destination,
        message: &Message,
    ) -> Result<MessageId, BrokerFault>;

    /// Destructively get the oldest message, waiting at most `wait`.
    ///
    /// Returns `Ok(None)` when no message arrives in time.
    async fn get(
        &self,
        destination: &Destination,
        wait: Duration,
    ) -> Result<Option<ReceivedMessage>, BrokerFault>;

    /// Release the connection on the broker side
    async fn close(&self) -> Result<(), BrokerFault>;
}
