//! IBM MQ messaging REST API transport.
//!
//! Messages are put with `POST` and destructively read with `DELETE` on
//! `/ibmmq/rest/v3/messaging/qmgr/{qmgr}/queue/{queue}/message`. The gateway is
//! stateless, so a connection only remembers the endpoint and credentials it
//! was opened with; the handshake is a `GET /login` that checks the broker is
//! reachable and the credentials are accepted.
//!
//! Error responses carry a list of MQ diagnostics. They are turned into a
//! linked [`BrokerFault`] chain with the first entry outermost.

use crate::client::{BrokerConnection, BrokerTransport, TransportKind};
use crate::endpoint::{BrokerEndpoint, Credentials};
use crate::error::{BrokerFault, ConfigurationError, ReasonCode};
use crate::message::{Destination, Message, MessageId, ReceivedMessage};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "rest_tests.rs"]
mod tests;

/// Path prefix of the messaging REST API
pub const API_PATH: &str = "/ibmmq/rest/v3";

/// Header the gateway requires on every state-changing request
pub const CSRF_TOKEN_HEADER: &str = "ibm-mq-rest-csrf-token";

/// Header carrying the identifier of a message that was put
pub const MESSAGE_ID_HEADER: &str = "ibm-mq-md-messageId";

const TEXT_CONTENT_TYPE: &str = "text/plain;charset=utf-8";

/// Configuration for the REST transport
#[derive(Debug, Clone)]
pub struct RestTransportConfig {
    /// `https` or `http`
    pub scheme: String,
    /// Time allowed for a request on top of any get wait interval
    pub request_timeout: Duration,
}

impl Default for RestTransportConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// Error Response Mapping
// ============================================================================

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEntry {
    msg_id: Option<String>,
    reason_code: Option<u32>,
    completion_code: Option<u32>,
    message: Option<String>,
    explanation: Option<String>,
    action: Option<String>,
}

impl ErrorEntry {
    fn into_fault(self, fallback: ReasonCode) -> BrokerFault {
        let text = self.message.unwrap_or_else(|| "no message provided".to_string());
        let message = match self.msg_id {
            Some(msg_id) => format!("{}: {}", msg_id, text),
            None => text,
        };

        debug!(
            completion_code = ?self.completion_code,
            explanation = ?self.explanation,
            action = ?self.action,
            "Gateway diagnostic"
        );

        BrokerFault::with_reason(
            self.reason_code.map(ReasonCode::new).unwrap_or(fallback),
            message,
        )
    }
}

/// Reason code used when the gateway does not report one
fn reason_for_status(status: StatusCode) -> ReasonCode {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ReasonCode::NOT_AUTHORIZED,
        StatusCode::NOT_FOUND => ReasonCode::UNKNOWN_OBJECT_NAME,
        StatusCode::SERVICE_UNAVAILABLE => ReasonCode::Q_MGR_NOT_AVAILABLE,
        _ => ReasonCode::UNEXPECTED_ERROR,
    }
}

/// Build a fault chain from an error response body
fn fault_from_body(status: StatusCode, body: &str) -> BrokerFault {
    let fallback = reason_for_status(status);
    let entries = serde_json::from_str::<ErrorResponse>(body)
        .map(|response| response.error)
        .unwrap_or_default();

    entries
        .into_iter()
        .rev()
        .fold(None, |inner: Option<BrokerFault>, entry| {
            let fault = entry.into_fault(fallback);
            Some(match inner {
                Some(inner) => fault.caused_by(inner),
                None => fault,
            })
        })
        .unwrap_or_else(|| {
            BrokerFault::with_reason(fallback, format!("gateway returned HTTP {}", status))
        })
}

async fn fault_from_response(response: Response) -> BrokerFault {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    fault_from_body(status, &body)
}

/// Fault for a request that never produced a response
fn transport_fault(url: &str, error: reqwest::Error) -> BrokerFault {
    BrokerFault::with_reason(
        ReasonCode::HOST_NOT_AVAILABLE,
        format!("request to {} failed", url),
    )
    .caused_by(error)
}

// ============================================================================
// RestTransport
// ============================================================================

/// Transport talking to the messaging REST API of a queue manager
#[derive(Debug, Clone)]
pub struct RestTransport {
    client: reqwest::Client,
    config: RestTransportConfig,
}

impl RestTransport {
    /// Create the transport and its HTTP client
    pub fn new(config: RestTransportConfig) -> Result<Self, ConfigurationError> {
        if !matches!(config.scheme.as_str(), "http" | "https") {
            return Err(ConfigurationError::Invalid {
                message: format!("unsupported scheme '{}'", config.scheme),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigurationError::Invalid {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    /// Base URL of the REST API for an endpoint
    pub fn base_url(&self, endpoint: &BrokerEndpoint) -> String {
        format!(
            "{}://{}:{}{}",
            self.config.scheme,
            endpoint.host(),
            endpoint.port(),
            API_PATH
        )
    }
}

#[async_trait]
impl BrokerTransport for RestTransport {
    async fn connect(
        &self,
        endpoint: &BrokerEndpoint,
        credentials: &Credentials,
    ) -> Result<Box<dyn BrokerConnection>, BrokerFault> {
        let base_url = self.base_url(endpoint);
        let url = format!("{}/login", base_url);

        let mut request = self
            .client
            .get(&url)
            .header(USER_AGENT, endpoint.application_name());
        if let Some((user_id, password)) = credentials.pair() {
            request = request.basic_auth(user_id, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_fault(&url, e))?;

        let status = response.status();
        let authenticated = match status {
            StatusCode::OK => !credentials.is_anonymous(),
            StatusCode::UNAUTHORIZED if credentials.is_anonymous() => {
                debug!(url = %url, "No credentials configured; skipping authentication");
                false
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let cause = fault_from_response(response).await;
                return Err(BrokerFault::with_reason(
                    ReasonCode::NOT_AUTHORIZED,
                    format!(
                        "user '{}' was not accepted by the gateway",
                        credentials.user_id().unwrap_or_default()
                    ),
                )
                .caused_by(cause));
            }
            _ => return Err(fault_from_response(response).await),
        };

        debug!(
            base_url = %base_url,
            authenticated,
            "REST gateway handshake complete"
        );

        Ok(Box::new(RestConnection {
            client: self.client.clone(),
            base_url,
            queue_manager: endpoint.queue_manager().to_string(),
            application_name: endpoint.application_name().to_string(),
            credentials: credentials.clone(),
            request_timeout: self.config.request_timeout,
            closed: AtomicBool::new(false),
        }))
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Rest
    }
}

// ============================================================================
// RestConnection
// ============================================================================

/// Connection to a queue manager through the REST gateway
pub struct RestConnection {
    client: reqwest::Client,
    base_url: String,
    queue_manager: String,
    application_name: String,
    credentials: Credentials,
    request_timeout: Duration,
    closed: AtomicBool,
}

impl RestConnection {
    /// URL of the message resource for a destination
    fn message_url(&self, destination: &Destination) -> String {
        let queue_manager = destination.queue_manager().unwrap_or(&self.queue_manager);
        format!(
            "{}/messaging/qmgr/{}/queue/{}/message",
            self.base_url,
            urlencoding::encode(queue_manager),
            urlencoding::encode(destination.queue().as_str())
        )
    }

    fn check_open(&self) -> Result<(), BrokerFault> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerFault::session_closed());
        }
        Ok(())
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .request(method, url)
            .header(USER_AGENT, &self.application_name)
            .header(CSRF_TOKEN_HEADER, "");

        match self.credentials.pair() {
            Some((user_id, password)) => request.basic_auth(user_id, Some(password)),
            None => request,
        }
    }
}

#[async_trait]
impl BrokerConnection for RestConnection {
    async fn put(
        &self,
        destination: &Destination,
        message: &Message,
    ) -> Result<MessageId, BrokerFault> {
        self.check_open()?;
        let url = self.message_url(destination);

        let response = self
            .request(reqwest::Method::POST, &url)
            .header(CONTENT_TYPE, TEXT_CONTENT_TYPE)
            .body(message.body().to_string())
            .send()
            .await
            .map_err(|e| transport_fault(&url, e))?;

        if response.status() != StatusCode::CREATED {
            return Err(fault_from_response(response).await);
        }

        let message_id = response
            .headers()
            .get(MESSAGE_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<MessageId>().ok());

        Ok(match message_id {
            Some(message_id) => message_id,
            None => {
                warn!(url = %url, "Gateway did not return a message id");
                MessageId::new()
            }
        })
    }

    async fn get(
        &self,
        destination: &Destination,
        wait: Duration,
    ) -> Result<Option<ReceivedMessage>, BrokerFault> {
        self.check_open()?;
        let url = self.message_url(destination);

        let response = self
            .request(reqwest::Method::DELETE, &url)
            .query(&[("wait", wait.as_millis().to_string())])
            .timeout(wait + self.request_timeout)
            .send()
            .await
            .map_err(|e| transport_fault(&url, e))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NO_CONTENT => return Ok(None),
            _ => return Err(fault_from_response(response).await),
        }

        let message_id = response
            .headers()
            .get(MESSAGE_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<MessageId>().ok())
            .unwrap_or_default();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_fault(&url, e))?;

        let body = String::from_utf8(bytes.to_vec()).map_err(|e| {
            BrokerFault::with_reason(
                ReasonCode::NOT_CONVERTED,
                format!("message {} is not valid UTF-8 text", message_id),
            )
            .caused_by(e)
        })?;

        Ok(Some(ReceivedMessage::new(message_id, body, None)))
    }

    async fn close(&self) -> Result<(), BrokerFault> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
