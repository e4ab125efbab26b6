//! Message types and destination addressing for queue operations.

use crate::endpoint::{validate_object_name, MAX_OBJECT_NAME_LENGTH};
use crate::error::{MessagingError, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

/// URI scheme used to address point-to-point queues
pub const QUEUE_URI_SCHEME: &str = "queue://";

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated MQ queue name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_object_name("queue_name", &name, MAX_OBJECT_NAME_LENGTH)?;
        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Identifier assigned to a message by the broker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S%.3f UTC"))
    }
}

// ============================================================================
// Destinations
// ============================================================================

/// A resolved point-to-point queue.
///
/// Accepts `queue:///NAME`, `queue://QMGR/NAME` or a bare `NAME`. Resolution is
/// pure: the same input always produces the same destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    queue_manager: Option<String>,
    queue: QueueName,
}

impl Destination {
    /// Resolve a queue name or queue URI into a destination
    pub fn resolve(name: &str) -> Result<Self, MessagingError> {
        let resolution_error = |reason: String| MessagingError::Resolution {
            name: name.to_string(),
            reason,
        };

        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(resolution_error("queue name is empty".to_string()));
        }

        let (queue_manager, queue) = match trimmed.strip_prefix(QUEUE_URI_SCHEME) {
            Some(rest) => {
                if rest.contains('?') {
                    return Err(resolution_error(
                        "destination properties are not supported".to_string(),
                    ));
                }

                let (queue_manager, queue) = rest.split_once('/').ok_or_else(|| {
                    resolution_error("expected queue://[QMGR]/NAME".to_string())
                })?;

                let queue_manager = if queue_manager.is_empty() {
                    None
                } else {
                    validate_object_name("queue_manager", queue_manager, MAX_OBJECT_NAME_LENGTH)
                        .map_err(|e| resolution_error(e.to_string()))?;
                    Some(queue_manager.to_string())
                };

                (queue_manager, queue)
            }
            None if trimmed.contains("://") => {
                return Err(resolution_error(
                    "only queue:// destinations are supported".to_string(),
                ));
            }
            None => (None, trimmed),
        };

        let queue = QueueName::new(queue).map_err(|e| resolution_error(e.to_string()))?;

        Ok(Self {
            queue_manager,
            queue,
        })
    }

    /// Get the queue name
    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    /// Get the explicitly addressed queue manager, if any
    pub fn queue_manager(&self) -> Option<&str> {
        self.queue_manager.as_deref()
    }

    /// Render the destination in `queue://` notation
    pub fn uri(&self) -> String {
        format!(
            "{}{}/{}",
            QUEUE_URI_SCHEME,
            self.queue_manager.as_deref().unwrap_or(""),
            self.queue
        )
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

impl FromStr for Destination {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A text message to be sent to a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    body: String,
    created_at: Timestamp,
}

impl Message {
    /// Create a text message stamped with the current time
    pub fn text(body: impl Into<String>) -> Self {
        Self::text_at(body, Timestamp::now())
    }

    /// Create a text message with an explicit creation time
    pub fn text_at(body: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            body: body.into(),
            created_at,
        }
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn created_at(&self) -> &Timestamp {
        &self.created_at
    }
}

/// A message taken from a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub body: String,
    pub put_at: Option<Timestamp>,
    pub received_at: Timestamp,
}

impl ReceivedMessage {
    /// Create a received message stamped with the current time
    pub fn new(message_id: MessageId, body: String, put_at: Option<Timestamp>) -> Self {
        Self {
            message_id,
            body,
            put_at,
            received_at: Timestamp::now(),
        }
    }
}
