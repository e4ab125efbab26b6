//! Session (context) lifecycle with its producer and consumer.
//!
//! A [`Session`] wraps one broker connection and moves from OPEN to CLOSED
//! either when it is explicitly closed or when the broker reports that the
//! connection is broken. Producers and consumers borrow the session, so they
//! can never outlive it.

use crate::client::{BrokerConnection, BrokerTransport};
use crate::endpoint::{BrokerEndpoint, Credentials};
use crate::error::{BrokerFault, MessagingError};
use crate::message::{Destination, Message, MessageId, ReceivedMessage};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("OPEN"),
            Self::Closed => f.write_str("CLOSED"),
        }
    }
}

/// A single logical connection to the queue manager
pub struct Session {
    id: String,
    endpoint: BrokerEndpoint,
    connection: Box<dyn BrokerConnection>,
    open: AtomicBool,
}

impl Session {
    /// Open a session by handshaking with the broker
    #[instrument(
        name = "session_open",
        skip_all,
        fields(
            queue_manager = %endpoint.queue_manager(),
            connection_name = %endpoint.connection_name(),
            channel = %endpoint.channel(),
            transport = %transport.kind(),
        )
    )]
    pub(crate) async fn open(
        transport: &dyn BrokerTransport,
        endpoint: &BrokerEndpoint,
        credentials: &Credentials,
    ) -> Result<Self, MessagingError> {
        let connection = transport
            .connect(endpoint, credentials)
            .await
            .map_err(|fault| MessagingError::Connection {
                queue_manager: endpoint.queue_manager().to_string(),
                address: endpoint.connection_name(),
                fault,
            })?;

        let session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            endpoint: endpoint.clone(),
            connection,
            open: AtomicBool::new(true),
        };

        debug!(
            session_id = %session.id,
            anonymous = credentials.is_anonymous(),
            "Session opened"
        );

        Ok(session)
    }

    /// Get the session identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the endpoint this session is bound to
    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    /// Get the current lifecycle state
    pub fn state(&self) -> SessionState {
        if self.is_open() {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    /// Check if the session can still be used
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Resolve a queue name into a destination
    pub fn create_queue(&self, name: &str) -> Result<Destination, MessagingError> {
        Destination::resolve(name)
    }

    /// Create the producer for this session
    pub fn create_producer(&self) -> Producer<'_> {
        Producer { session: self }
    }

    /// Create a consumer bound to `destination`
    pub fn create_consumer(&self, destination: &Destination) -> Consumer<'_> {
        Consumer {
            session: self,
            destination: destination.clone(),
        }
    }

    /// Release the session.
    ///
    /// Closing an already closed session is a no-op. The session is CLOSED
    /// afterwards even when the broker reports a failure.
    pub async fn close(&self) -> Result<(), BrokerFault> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let result = self.connection.close().await;
        debug!(session_id = %self.id, "Session closed");
        result
    }

    /// Move to CLOSED when the broker reports the connection is unusable
    fn observe_fault(&self, fault: &BrokerFault) {
        if fault.is_connection_broken() && self.open.swap(false, Ordering::AcqRel) {
            warn!(
                session_id = %self.id,
                fault = %fault,
                "Connection broken; session is now closed"
            );
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_open() {
            warn!(session_id = %self.id, "Session dropped while still open");
        }
    }
}

// ============================================================================
// Producer
// ============================================================================

/// Sends messages within a session
#[derive(Debug)]
pub struct Producer<'a> {
    session: &'a Session,
}

impl Producer<'_> {
    /// Send one message to `destination`.
    ///
    /// Nothing is buffered locally: once this returns the broker has accepted
    /// the message.
    pub async fn send(
        &self,
        destination: &Destination,
        message: &Message,
    ) -> Result<MessageId, MessagingError> {
        let send_error = |fault| MessagingError::Send {
            destination: destination.uri(),
            fault,
        };

        if !self.session.is_open() {
            return Err(send_error(BrokerFault::session_closed()));
        }

        self.session
            .connection
            .put(destination, message)
            .await
            .map_err(|fault| {
                self.session.observe_fault(&fault);
                send_error(fault)
            })
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Receives messages from one destination within a session
#[derive(Debug)]
pub struct Consumer<'a> {
    session: &'a Session,
    destination: Destination,
}

impl Consumer<'_> {
    /// Get the destination this consumer reads from
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Receive the oldest available message, waiting at most `timeout`.
    ///
    /// A timeout is not an error: it yields `Ok(None)`.
    pub async fn receive(
        &self,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, MessagingError> {
        let receive_error = |fault| MessagingError::Receive {
            destination: self.destination.uri(),
            fault,
        };

        if !self.session.is_open() {
            return Err(receive_error(BrokerFault::session_closed()));
        }

        let received = self
            .session
            .connection
            .get(&self.destination, timeout)
            .await
            .map_err(|fault| {
                self.session.observe_fault(&fault);
                receive_error(fault)
            })?;

        if let Some(message) = &received {
            debug!(
                session_id = %self.session.id,
                message_id = %message.message_id,
                put_at = ?message.put_at.as_ref().map(ToString::to_string),
                received_at = %message.received_at,
                "Message received"
            );
        }

        Ok(received)
    }

    /// Receive only the text body of the next message
    pub async fn receive_body(&self, timeout: Duration) -> Result<Option<String>, MessagingError> {
        Ok(self.receive(timeout).await?.map(|message| message.body))
    }
}
