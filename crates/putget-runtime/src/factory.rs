//! Connection factory and its builder.
//!
//! The factory captures everything needed to reach the queue manager and opens
//! a fresh [`Session`] on every call to [`ConnectionFactory::create_context`].

use crate::client::{BrokerTransport, TransportKind};
use crate::config::AppConfig;
use crate::endpoint::{BrokerEndpoint, Credentials};
use crate::error::{ConfigurationError, MessagingError};
use crate::providers::{InMemoryBroker, RestTransport, RestTransportConfig};
use crate::session::Session;
use std::fmt;
use std::sync::Arc;

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;

/// Opens sessions against one endpoint with one set of credentials
#[derive(Clone)]
pub struct ConnectionFactory {
    endpoint: BrokerEndpoint,
    credentials: Credentials,
    transport: Arc<dyn BrokerTransport>,
}

impl ConnectionFactory {
    /// Create a new builder
    pub fn builder() -> ConnectionFactoryBuilder {
        ConnectionFactoryBuilder::default()
    }

    /// Create a factory from application configuration
    pub fn from_config(
        config: &AppConfig,
        credentials: Credentials,
    ) -> Result<Self, ConfigurationError> {
        let endpoint = config.broker.endpoint()?;

        let transport: Arc<dyn BrokerTransport> = match config.transport {
            TransportKind::Rest => Arc::new(RestTransport::new(RestTransportConfig {
                scheme: config.broker.scheme.clone(),
                request_timeout: config.broker.request_timeout(),
            })?),
            TransportKind::Memory => Arc::new(InMemoryBroker::for_endpoint(&endpoint)),
        };

        Self::builder()
            .endpoint(endpoint)
            .credentials(credentials)
            .transport(transport)
            .build()
    }

    /// Get the endpoint sessions are opened against
    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    /// Check if sessions will be opened without authentication
    pub fn is_anonymous(&self) -> bool {
        self.credentials.is_anonymous()
    }

    /// Get the transport kind
    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Open a new session
    pub async fn create_context(&self) -> Result<Session, MessagingError> {
        Session::open(self.transport.as_ref(), &self.endpoint, &self.credentials).await
    }
}

impl fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("endpoint", &self.endpoint)
            .field("credentials", &self.credentials)
            .field("transport", &self.transport.kind())
            .finish()
    }
}

/// Builder for [`ConnectionFactory`].
///
/// Construction is pure; every required field is checked in [`build`](Self::build)
/// so a bad setup fails before any connection is attempted.
#[derive(Default)]
pub struct ConnectionFactoryBuilder {
    host: Option<String>,
    port: Option<u16>,
    channel: Option<String>,
    queue_manager: Option<String>,
    application_name: Option<String>,
    credentials: Credentials,
    transport: Option<Arc<dyn BrokerTransport>>,
}

impl ConnectionFactoryBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn queue_manager(mut self, queue_manager: impl Into<String>) -> Self {
        self.queue_manager = Some(queue_manager.into());
        self
    }

    pub fn application_name(mut self, application_name: impl Into<String>) -> Self {
        self.application_name = Some(application_name.into());
        self
    }

    /// Set every endpoint field from an existing endpoint
    pub fn endpoint(self, endpoint: BrokerEndpoint) -> Self {
        self.host(endpoint.host())
            .port(endpoint.port())
            .channel(endpoint.channel())
            .queue_manager(endpoint.queue_manager())
            .application_name(endpoint.application_name())
    }

    /// Set credentials; defaults to anonymous
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn BrokerTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validate the configuration and build the factory
    pub fn build(self) -> Result<ConnectionFactory, ConfigurationError> {
        fn required<T>(value: Option<T>, key: &str) -> Result<T, ConfigurationError> {
            value.ok_or_else(|| ConfigurationError::Missing {
                key: key.to_string(),
            })
        }

        let endpoint = BrokerEndpoint::new(
            required(self.host, "host")?,
            required(self.port, "port")?,
            required(self.channel, "channel")?,
            required(self.queue_manager, "queue_manager")?,
            required(self.application_name, "application_name")?,
        )?;
        let transport = required(self.transport, "transport")?;

        Ok(ConnectionFactory {
            endpoint,
            credentials: self.credentials,
            transport,
        })
    }
}
