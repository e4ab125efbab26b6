//! Application configuration.
//!
//! Every field carries a default, so an empty configuration source produces a
//! usable setup against a local development queue manager. Secrets are never
//! part of the configuration: only the names of the environment variables that
//! hold them are.

use crate::client::TransportKind;
use crate::cycle::{CycleTimings, DEFAULT_MESSAGE_PREFIX};
use crate::endpoint::{BrokerEndpoint, Credentials};
use crate::error::{ConfigurationError, ValidationError};
use crate::message::Destination;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub transport: TransportKind,
    pub broker: BrokerSettings,
    pub queue: QueueSettings,
    pub cycle: CycleSettings,
    pub message: MessageSettings,
    pub credentials: CredentialSources,
}

impl AppConfig {
    /// Check the whole configuration, failing on the first problem
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.broker.validate()?;

        Destination::resolve(&self.queue.name).map_err(|e| ConfigurationError::Invalid {
            message: e.to_string(),
        })?;

        self.credentials.validate()?;

        Ok(())
    }
}

/// How to reach the queue manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub channel: String,
    pub queue_manager: String,
    pub application_name: String,
    /// URL scheme of the REST gateway
    pub scheme: String,
    /// Per-request timeout of the REST gateway, on top of any get wait
    pub request_timeout_seconds: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9443,
            channel: "DEV.APP.SVRCONN".to_string(),
            queue_manager: "QM1".to_string(),
            application_name: "mq-putget".to_string(),
            scheme: "https".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

impl BrokerSettings {
    /// Build the validated endpoint
    pub fn endpoint(&self) -> Result<BrokerEndpoint, ConfigurationError> {
        Ok(BrokerEndpoint::new(
            self.host.clone(),
            self.port,
            self.channel.clone(),
            self.queue_manager.clone(),
            self.application_name.clone(),
        )?)
    }

    /// Per-request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        self.endpoint()?;

        if !matches!(self.scheme.as_str(), "http" | "https") {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "broker.scheme must be 'http' or 'https', got '{}'",
                    self.scheme
                ),
            });
        }

        if self.request_timeout_seconds == 0 {
            return Err(ValidationError::OutOfRange {
                field: "broker.request_timeout_seconds".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// The queue messages are put to and got from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Queue name or `queue://` URI
    pub name: String,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: "DEV.QUEUE.1".to_string(),
        }
    }
}

/// Cycle delays in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleSettings {
    pub warm_up_ms: u64,
    pub pre_receive_delay_ms: u64,
    pub receive_timeout_ms: u64,
    pub post_receive_delay_ms: u64,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self::from(CycleTimings::default())
    }
}

impl CycleSettings {
    pub fn timings(&self) -> CycleTimings {
        CycleTimings {
            warm_up: Duration::from_millis(self.warm_up_ms),
            pre_receive_delay: Duration::from_millis(self.pre_receive_delay_ms),
            receive_timeout: Duration::from_millis(self.receive_timeout_ms),
            post_receive_delay: Duration::from_millis(self.post_receive_delay_ms),
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl From<CycleTimings> for CycleSettings {
    fn from(timings: CycleTimings) -> Self {
        Self {
            warm_up_ms: saturating_millis(timings.warm_up),
            pre_receive_delay_ms: saturating_millis(timings.pre_receive_delay),
            receive_timeout_ms: saturating_millis(timings.receive_timeout),
            post_receive_delay_ms: saturating_millis(timings.post_receive_delay),
        }
    }
}

/// Payload generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageSettings {
    /// Text placed in front of the generated number
    pub prefix: String,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_MESSAGE_PREFIX.to_string(),
        }
    }
}

/// Names of the environment variables holding the credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSources {
    pub user_env: String,
    pub password_env: String,
}

impl Default for CredentialSources {
    fn default() -> Self {
        Self {
            user_env: "APP_USER".to_string(),
            password_env: "APP_PASSWORD".to_string(),
        }
    }
}

impl CredentialSources {
    /// Read the credentials; a missing variable selects anonymous mode
    pub fn load(&self) -> Credentials {
        Credentials::from_env(&self.user_env, &self.password_env)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("credentials.user_env", &self.user_env),
            ("credentials.password_env", &self.password_env),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::Required {
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}
