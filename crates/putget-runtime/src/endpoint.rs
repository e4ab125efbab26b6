//! Broker endpoint and credential types used to build a connection factory.

use crate::error::ValidationError;
use std::fmt;
use zeroize::Zeroizing;

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod tests;

/// Maximum length of an MQ channel name
pub const MAX_CHANNEL_NAME_LENGTH: usize = 20;

/// Maximum length of an MQ queue manager or queue name
pub const MAX_OBJECT_NAME_LENGTH: usize = 48;

/// Maximum length of the application name recorded by the queue manager
pub const MAX_APPLICATION_NAME_LENGTH: usize = 28;

/// Check that a name only uses the characters MQ allows in object names
pub(crate) fn validate_object_name(
    field: &str,
    value: &str,
    max_length: usize,
) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > max_length {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            message: format!("must be at most {} characters", max_length),
        });
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '/' | '_' | '%'))
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            message: "only ASCII alphanumerics and '.', '/', '_', '%' are allowed".to_string(),
        });
    }

    Ok(())
}

// ============================================================================
// Broker Endpoint
// ============================================================================

/// How to reach a queue manager: network address, channel and identities.
///
/// Constructed once per process and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    host: String,
    port: u16,
    channel: String,
    queue_manager: String,
    application_name: String,
}

impl BrokerEndpoint {
    /// Create a validated endpoint
    pub fn new(
        host: impl Into<String>,
        port: u16,
        channel: impl Into<String>,
        queue_manager: impl Into<String>,
        application_name: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let endpoint = Self {
            host: host.into(),
            port,
            channel: channel.into(),
            queue_manager: queue_manager.into(),
            application_name: application_name.into(),
        };
        endpoint.validate()?;
        Ok(endpoint)
    }

    /// Validate every field of the endpoint
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "host".to_string(),
            });
        }

        if self.host.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidFormat {
                field: "host".to_string(),
                message: "must not contain whitespace".to_string(),
            });
        }

        if self.port == 0 {
            return Err(ValidationError::OutOfRange {
                field: "port".to_string(),
                message: "must be between 1 and 65535".to_string(),
            });
        }

        validate_object_name("channel", &self.channel, MAX_CHANNEL_NAME_LENGTH)?;
        validate_object_name("queue_manager", &self.queue_manager, MAX_OBJECT_NAME_LENGTH)?;

        if self.application_name.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "application_name".to_string(),
            });
        }

        if self.application_name.len() > MAX_APPLICATION_NAME_LENGTH {
            return Err(ValidationError::OutOfRange {
                field: "application_name".to_string(),
                message: format!("must be at most {} characters", MAX_APPLICATION_NAME_LENGTH),
            });
        }

        Ok(())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn queue_manager(&self) -> &str {
        &self.queue_manager
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// Connection name in MQ `host(port)` notation
    pub fn connection_name(&self) -> String {
        format!("{}({})", self.host, self.port)
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} via {}",
            self.queue_manager,
            self.connection_name(),
            self.channel
        )
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// User id and password presented to the queue manager.
///
/// Credentials may be absent, in which case the session is opened anonymously
/// and authentication is skipped. The password is zeroed on drop and never
/// included in `Debug` output.
#[derive(Clone, Default)]
pub struct Credentials {
    inner: Option<UserPassword>,
}

#[derive(Clone)]
struct UserPassword {
    user_id: String,
    password: Zeroizing<String>,
}

impl Credentials {
    /// Credentials for an unauthenticated connection
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Create credentials from a user id and password
    pub fn new(user_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self::from_parts(Some(user_id.into()), Some(password.into()))
    }

    /// Create credentials from optional parts.
    ///
    /// Missing or empty values on either side select anonymous mode.
    pub fn from_parts(user_id: Option<String>, password: Option<String>) -> Self {
        match (user_id, password) {
            (Some(user_id), Some(password)) if !user_id.is_empty() && !password.is_empty() => {
                Self {
                    inner: Some(UserPassword {
                        user_id,
                        password: Zeroizing::new(password),
                    }),
                }
            }
            _ => Self::anonymous(),
        }
    }

    /// Read credentials from the named environment variables
    pub fn from_env(user_var: &str, password_var: &str) -> Self {
        Self::from_parts(std::env::var(user_var).ok(), std::env::var(password_var).ok())
    }

    /// Check if no credentials are present
    pub fn is_anonymous(&self) -> bool {
        self.inner.is_none()
    }

    /// Get the user id, if present
    pub fn user_id(&self) -> Option<&str> {
        self.inner.as_ref().map(|c| c.user_id.as_str())
    }

    /// Get the password for immediate use by a transport
    pub fn expose_password(&self) -> Option<&str> {
        self.inner.as_ref().map(|c| c.password.as_str())
    }

    /// Get user id and password together
    pub fn pair(&self) -> Option<(&str, &str)> {
        self.inner
            .as_ref()
            .map(|c| (c.user_id.as_str(), c.password.as_str()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(c) => f
                .debug_struct("Credentials")
                .field("user_id", &c.user_id)
                .field("password", &"[REDACTED]")
                .finish(),
            None => f.write_str("Credentials(anonymous)"),
        }
    }
}
