//! Broker transport implementations.
//!
//! This module contains concrete implementations of the `BrokerTransport` and
//! `BrokerConnection` traits for the supported backends.

pub mod memory;
pub mod rest;

pub use memory::{InMemoryBroker, InMemoryBrokerConfig, InMemoryConnection};
pub use rest::{RestConnection, RestTransport, RestTransportConfig};
