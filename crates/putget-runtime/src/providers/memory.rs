//! In-memory queue manager for development and testing.
//!
//! This module provides a functional emulation of a single queue manager that:
//! - Validates the queue manager name, channel and credentials on connect
//! - Keeps FIFO local queues with optional put/get inhibition and max depth
//! - Wakes waiting getters when a message arrives
//! - Breaks open connections when the broker is switched off
//!
//! Counters for connect attempts and open connections let tests verify that
//! no session is leaked.

use crate::client::{BrokerConnection, BrokerTransport, TransportKind};
use crate::endpoint::{BrokerEndpoint, Credentials};
use crate::error::{BrokerFault, ReasonCode, ValidationError};
use crate::message::{Destination, Message, MessageId, QueueName, ReceivedMessage, Timestamp};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Configuration for the in-memory queue manager
#[derive(Debug, Clone)]
pub struct InMemoryBrokerConfig {
    /// Name of the emulated queue manager
    pub queue_manager: String,
    /// Server-connection channels accepting clients
    pub channels: Vec<String>,
    /// User id and password required on connect; `None` accepts anyone
    pub credentials: Option<(String, String)>,
    /// Create queues on first use instead of failing with an unknown object
    pub auto_define_queues: bool,
    /// Maximum number of messages a queue holds
    pub max_queue_depth: usize,
}

impl Default for InMemoryBrokerConfig {
    fn default() -> Self {
        Self {
            queue_manager: "QM1".to_string(),
            channels: vec!["DEV.APP.SVRCONN".to_string()],
            credentials: None,
            auto_define_queues: true,
            max_queue_depth: 5000,
        }
    }
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

struct BrokerState {
    config: InMemoryBrokerConfig,
    available: bool,
    /// Incremented whenever the broker goes down; connections from an older
    /// epoch are broken
    epoch: u64,
    queues: HashMap<QueueName, LocalQueue>,
    connect_attempts: u64,
    open_connections: usize,
    puts: u64,
    gets: u64,
}

impl BrokerState {
    fn new(config: InMemoryBrokerConfig) -> Self {
        Self {
            config,
            available: true,
            epoch: 0,
            queues: HashMap::new(),
            connect_attempts: 0,
            open_connections: 0,
            puts: 0,
            gets: 0,
        }
    }

    fn define_queue(&mut self, name: &QueueName) -> &mut LocalQueue {
        let max_depth = self.config.max_queue_depth;
        self.queues
            .entry(name.clone())
            .or_insert_with(|| LocalQueue::new(max_depth))
    }

    /// Look up the queue a destination refers to, defining it when allowed
    fn queue_for(&mut self, destination: &Destination) -> Result<&mut LocalQueue, BrokerFault> {
        if let Some(queue_manager) = destination.queue_manager() {
            if queue_manager != self.config.queue_manager {
                return Err(BrokerFault::with_reason(
                    ReasonCode::UNKNOWN_OBJECT_NAME,
                    format!("queue manager '{}' is not known", queue_manager),
                ));
            }
        }

        if !self.queues.contains_key(destination.queue()) && !self.config.auto_define_queues {
            return Err(BrokerFault::with_reason(
                ReasonCode::UNKNOWN_OBJECT_NAME,
                format!("queue '{}' is not defined", destination.queue()),
            ));
        }

        Ok(self.define_queue(destination.queue()))
    }

    /// Check that a connection opened in `epoch` can still be used
    fn check_connection(&self, epoch: u64) -> Result<(), BrokerFault> {
        if !self.available || self.epoch != epoch {
            return Err(BrokerFault::with_reason(
                ReasonCode::CONNECTION_BROKEN,
                "connection to the queue manager was lost",
            ));
        }
        Ok(())
    }
}

struct LocalQueue {
    messages: VecDeque<StoredMessage>,
    put_inhibited: bool,
    get_inhibited: bool,
    max_depth: usize,
}

impl LocalQueue {
    fn new(max_depth: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            put_inhibited: false,
            get_inhibited: false,
            max_depth,
        }
    }
}

struct StoredMessage {
    message_id: MessageId,
    body: Bytes,
    put_at: Timestamp,
}

// ============================================================================
// InMemoryBroker
// ============================================================================

/// In-process queue manager implementing [`BrokerTransport`].
///
/// Clones share the same queues, so a test can keep a handle to inspect and
/// manipulate the broker while a factory owns another.
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<RwLock<BrokerState>>,
    arrivals: Arc<Notify>,
}

impl InMemoryBroker {
    /// Create new in-memory broker with configuration
    pub fn new(config: InMemoryBrokerConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(BrokerState::new(config))),
            arrivals: Arc::new(Notify::new()),
        }
    }

    /// Create a broker that accepts exactly the given endpoint
    pub fn for_endpoint(endpoint: &BrokerEndpoint) -> Self {
        Self::new(InMemoryBrokerConfig {
            queue_manager: endpoint.queue_manager().to_string(),
            channels: vec![endpoint.channel().to_string()],
            ..InMemoryBrokerConfig::default()
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, BrokerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BrokerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Define a local queue
    pub fn define_queue(&self, name: &str) -> Result<(), ValidationError> {
        let name = QueueName::new(name)?;
        self.write().define_queue(&name);
        Ok(())
    }

    /// Start or stop the queue manager.
    ///
    /// Stopping it breaks every open connection, including ones that are
    /// currently waiting for a message.
    pub fn set_available(&self, available: bool) {
        {
            let mut state = self.write();
            if state.available && !available {
                state.epoch += 1;
            }
            state.available = available;
        }
        self.arrivals.notify_waiters();
    }

    /// Enable or disable puts on a queue
    pub fn set_put_inhibited(&self, name: &str, inhibited: bool) -> Result<(), ValidationError> {
        let name = QueueName::new(name)?;
        self.write().define_queue(&name).put_inhibited = inhibited;
        Ok(())
    }

    /// Enable or disable gets on a queue
    pub fn set_get_inhibited(&self, name: &str, inhibited: bool) -> Result<(), ValidationError> {
        let name = QueueName::new(name)?;
        self.write().define_queue(&name).get_inhibited = inhibited;
        Ok(())
    }

    /// Put a raw payload onto a queue, bypassing every check
    pub fn inject_raw(&self, name: &str, body: Bytes) -> Result<MessageId, ValidationError> {
        let name = QueueName::new(name)?;
        let message_id = MessageId::new();
        self.write()
            .define_queue(&name)
            .messages
            .push_back(StoredMessage {
                message_id: message_id.clone(),
                body,
                put_at: Timestamp::now(),
            });
        self.arrivals.notify_waiters();
        Ok(message_id)
    }

    /// Get the number of messages on a queue
    pub fn depth(&self, name: &str) -> usize {
        let Ok(name) = QueueName::new(name) else {
            return 0;
        };
        self.read()
            .queues
            .get(&name)
            .map(|queue| queue.messages.len())
            .unwrap_or(0)
    }

    /// Get the number of connect calls, successful or not
    pub fn connect_attempts(&self) -> u64 {
        self.read().connect_attempts
    }

    /// Get the number of connections not yet closed
    pub fn open_connections(&self) -> usize {
        self.read().open_connections
    }

    /// Get the number of messages accepted by put
    pub fn puts(&self) -> u64 {
        self.read().puts
    }

    /// Get the number of messages removed by get
    pub fn gets(&self) -> u64 {
        self.read().gets
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(InMemoryBrokerConfig::default())
    }
}

#[async_trait]
impl BrokerTransport for InMemoryBroker {
    async fn connect(
        &self,
        endpoint: &BrokerEndpoint,
        credentials: &Credentials,
    ) -> Result<Box<dyn BrokerConnection>, BrokerFault> {
        let mut state = self.write();
        state.connect_attempts += 1;

        if !state.available {
            return Err(BrokerFault::with_reason(
                ReasonCode::HOST_NOT_AVAILABLE,
                format!("no listener at {}", endpoint.connection_name()),
            ));
        }

        if endpoint.queue_manager() != state.config.queue_manager {
            return Err(BrokerFault::with_reason(
                ReasonCode::Q_MGR_NAME_ERROR,
                format!(
                    "queue manager '{}' does not match '{}'",
                    endpoint.queue_manager(),
                    state.config.queue_manager
                ),
            ));
        }

        if !state
            .config
            .channels
            .iter()
            .any(|channel| channel == endpoint.channel())
        {
            return Err(BrokerFault::with_reason(
                ReasonCode::UNKNOWN_CHANNEL_NAME,
                format!("channel '{}' is not defined", endpoint.channel()),
            ));
        }

        if let Some((user_id, password)) = &state.config.credentials {
            let accepted = credentials
                .pair()
                .map(|(u, p)| u == user_id && p == password)
                .unwrap_or(false);
            if !accepted {
                return Err(BrokerFault::with_reason(
                    ReasonCode::NOT_AUTHORIZED,
                    "user is not authorized to connect",
                ));
            }
        }

        state.open_connections += 1;
        let epoch = state.epoch;
        drop(state);

        debug!(
            queue_manager = %endpoint.queue_manager(),
            channel = %endpoint.channel(),
            "In-memory connection opened"
        );

        Ok(Box::new(InMemoryConnection {
            broker: self.clone(),
            epoch,
            closed: AtomicBool::new(false),
        }))
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Memory
    }
}

// ============================================================================
// InMemoryConnection
// ============================================================================

/// Connection handle returned by [`InMemoryBroker`]
pub struct InMemoryConnection {
    broker: InMemoryBroker,
    epoch: u64,
    closed: AtomicBool,
}

impl InMemoryConnection {
    fn check_open(&self, state: &BrokerState) -> Result<(), BrokerFault> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerFault::session_closed());
        }
        state.check_connection(self.epoch)
    }

    /// Take the oldest message if one is available
    fn try_get(&self, destination: &Destination) -> Result<Option<ReceivedMessage>, BrokerFault> {
        let mut state = self.broker.write();
        self.check_open(&state)?;

        let queue = state.queue_for(destination)?;
        if queue.get_inhibited {
            return Err(BrokerFault::with_reason(
                ReasonCode::GET_INHIBITED,
                format!("gets are inhibited for queue '{}'", destination.queue()),
            ));
        }

        let Some(front) = queue.messages.front() else {
            return Ok(None);
        };

        // A message that cannot be converted stays on the queue
        let body = String::from_utf8(front.body.to_vec()).map_err(|e| {
            BrokerFault::with_reason(
                ReasonCode::NOT_CONVERTED,
                format!("message {} is not valid UTF-8 text", front.message_id),
            )
            .caused_by(e)
        })?;

        let Some(stored) = queue.messages.pop_front() else {
            return Ok(None);
        };
        state.gets += 1;

        Ok(Some(ReceivedMessage::new(
            stored.message_id,
            body,
            Some(stored.put_at),
        )))
    }

    fn release(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let mut state = self.broker.write();
            state.open_connections = state.open_connections.saturating_sub(1);
        }
    }
}

#[async_trait]
impl BrokerConnection for InMemoryConnection {
    async fn put(
        &self,
        destination: &Destination,
        message: &Message,
    ) -> Result<MessageId, BrokerFault> {
        let message_id = {
            let mut state = self.broker.write();
            self.check_open(&state)?;

            let queue = state.queue_for(destination)?;
            if queue.put_inhibited {
                return Err(BrokerFault::with_reason(
                    ReasonCode::PUT_INHIBITED,
                    format!("puts are inhibited for queue '{}'", destination.queue()),
                ));
            }
            if queue.messages.len() >= queue.max_depth {
                return Err(BrokerFault::with_reason(
                    ReasonCode::Q_FULL,
                    format!(
                        "queue '{}' is at its maximum depth of {}",
                        destination.queue(),
                        queue.max_depth
                    ),
                ));
            }

            let message_id = MessageId::new();
            queue.messages.push_back(StoredMessage {
                message_id: message_id.clone(),
                body: Bytes::copy_from_slice(message.body().as_bytes()),
                put_at: message.created_at().clone(),
            });
            state.puts += 1;
            message_id
        };

        self.broker.arrivals.notify_waiters();
        debug!(destination = %destination, message_id = %message_id, "Message put");

        Ok(message_id)
    }

    async fn get(
        &self,
        destination: &Destination,
        wait: Duration,
    ) -> Result<Option<ReceivedMessage>, BrokerFault> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            // Register for wake-ups before looking, so a put in between is not missed
            let arrival = self.broker.arrivals.notified();

            if let Some(message) = self.try_get(destination)? {
                debug!(
                    destination = %destination,
                    message_id = %message.message_id,
                    "Message got"
                );
                return Ok(Some(message));
            }

            if tokio::time::timeout_at(deadline, arrival).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn close(&self) -> Result<(), BrokerFault> {
        self.release();
        Ok(())
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}
