//! # Put/Get Runtime
//!
//! Session runtime for exchanging text messages with a single point-to-point
//! queue on an IBM MQ queue manager.
//!
//! This library provides:
//! - A validated connection factory producing one fresh session per cycle
//! - Destination resolution using `queue://` addressing
//! - A producer and a timeout-bounded consumer per session
//! - The endless send-then-receive cycle controller with fixed delays
//! - Error chain rendering and the per-cycle status report
//!
//! ## Module Organization
//!
//! - [`error`] - Error taxonomy and MQ reason codes
//! - [`endpoint`] - Broker endpoint and credentials
//! - [`message`] - Queue names, destinations and messages
//! - [`client`] - Transport traits implemented by broker backends
//! - [`providers`] - In-memory and REST gateway transports
//! - [`factory`] - Connection factory and its builder
//! - [`session`] - Session lifecycle, producer and consumer
//! - [`report`] - Error chains and the status report
//! - [`cycle`] - The put/get cycle controller
//! - [`config`] - Application configuration

// Module declarations
pub mod client;
pub mod config;
pub mod cycle;
pub mod endpoint;
pub mod error;
pub mod factory;
pub mod message;
pub mod providers;
pub mod report;
pub mod session;

// Re-export commonly used types at crate root for convenience
pub use client::{BrokerConnection, BrokerTransport, TransportKind};
pub use config::{
    AppConfig, BrokerSettings, CredentialSources, CycleSettings, MessageSettings, QueueSettings,
};
pub use cycle::{
    CycleController, CycleOutcome, CyclePhase, CycleStatus, CycleTimings, ExitStatus,
    LuckyNumber, PayloadSource,
};
pub use endpoint::{BrokerEndpoint, Credentials};
pub use error::{
    BrokerFault, ConfigurationError, ErrorKind, MessagingError, ReasonCode, ValidationError,
};
pub use factory::{ConnectionFactory, ConnectionFactoryBuilder};
pub use message::{Destination, Message, MessageId, QueueName, ReceivedMessage, Timestamp};
pub use providers::{InMemoryBroker, InMemoryBrokerConfig, RestTransport, RestTransportConfig};
pub use report::{ErrorChain, StatusReporter};
pub use session::{Consumer, Producer, Session, SessionState};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
