//! Tests for the REST gateway transport.

use super::*;
use crate::error::BrokerFault;
use wiremock::matchers::{body_string, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOGIN_PATH: &str = "/ibmmq/rest/v3/login";
const MESSAGE_PATH: &str = "/ibmmq/rest/v3/messaging/qmgr/QM1/queue/DEV.QUEUE.1/message";

/// Basic auth header for app / passw0rd
const APP_AUTHORIZATION: &str = "Basic YXBwOnBhc3N3MHJk";

fn transport() -> RestTransport {
    RestTransport::new(RestTransportConfig {
        scheme: "http".to_string(),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn endpoint_for(server: &MockServer) -> BrokerEndpoint {
    let address = server.address();
    BrokerEndpoint::new(
        address.ip().to_string(),
        address.port(),
        "DEV.APP.SVRCONN",
        "QM1",
        "putget-tests",
    )
    .unwrap()
}

fn destination() -> Destination {
    Destination::resolve("queue:///DEV.QUEUE.1").unwrap()
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "user": [{ "name": "app", "role": ["MQWebUser"] }]
        })))
        .mount(server)
        .await;
}

async fn connect(server: &MockServer, credentials: Credentials) -> Box<dyn BrokerConnection> {
    mount_login(server).await;
    transport()
        .connect(&endpoint_for(server), &credentials)
        .await
        .unwrap()
}

fn linked_fault(fault: &BrokerFault) -> Option<&BrokerFault> {
    std::error::Error::source(fault).and_then(|cause| cause.downcast_ref::<BrokerFault>())
}

// ============================================================================
// Construction Tests
// ============================================================================

mod construction {
    use super::*;

    /// Verify the base URL layout.
    #[test]
    fn test_base_url() {
        let transport = RestTransport::new(RestTransportConfig::default()).unwrap();
        let endpoint =
            BrokerEndpoint::new("mq.example.com", 9443, "DEV.APP.SVRCONN", "QM1", "app").unwrap();

        assert_eq!(
            transport.base_url(&endpoint),
            "https://mq.example.com:9443/ibmmq/rest/v3"
        );
        assert_eq!(transport.kind(), TransportKind::Rest);
    }

    /// Verify that only HTTP schemes are accepted.
    #[test]
    fn test_rejects_unknown_scheme() {
        let result = RestTransport::new(RestTransportConfig {
            scheme: "mqtt".to_string(),
            ..RestTransportConfig::default()
        });

        assert!(matches!(result, Err(ConfigurationError::Invalid { .. })));
    }
}

// ============================================================================
// Error Response Mapping Tests
// ============================================================================

mod error_mapping {
    use super::*;

    /// Verify that every diagnostic entry becomes one link, first entry outermost.
    #[test]
    fn test_entries_become_linked_chain() {
        let body = r#"{"error":[
            {"msgId":"MQWB0302E","reasonCode":2085,"completionCode":2,
             "message":"Queue 'DEV.QUEUE.9' could not be found.",
             "explanation":"The queue does not exist.","action":"Define the queue."},
            {"msgId":"AMQ2085E","reasonCode":2085,"message":"Unknown object name."}
        ]}"#;

        let fault = fault_from_body(StatusCode::NOT_FOUND, body);

        assert_eq!(fault.reason(), Some(ReasonCode::UNKNOWN_OBJECT_NAME));
        assert_eq!(
            fault.message(),
            "MQWB0302E: Queue 'DEV.QUEUE.9' could not be found."
        );

        let inner = linked_fault(&fault).unwrap();
        assert_eq!(inner.message(), "AMQ2085E: Unknown object name.");
        assert!(std::error::Error::source(inner).is_none());
    }

    /// Verify that the HTTP status decides the reason when no JSON is returned.
    #[test]
    fn test_status_fallback_without_body() {
        let cases = [
            (StatusCode::UNAUTHORIZED, ReasonCode::NOT_AUTHORIZED),
            (StatusCode::FORBIDDEN, ReasonCode::NOT_AUTHORIZED),
            (StatusCode::NOT_FOUND, ReasonCode::UNKNOWN_OBJECT_NAME),
            (StatusCode::SERVICE_UNAVAILABLE, ReasonCode::Q_MGR_NOT_AVAILABLE),
            (StatusCode::INTERNAL_SERVER_ERROR, ReasonCode::UNEXPECTED_ERROR),
        ];

        for (status, expected) in cases {
            let fault = fault_from_body(status, "<html>gateway error</html>");
            assert_eq!(fault.reason(), Some(expected), "status {}", status);
            assert!(std::error::Error::source(&fault).is_none());
        }
    }

    /// Verify that entries without a reason code use the status fallback.
    #[test]
    fn test_entry_without_reason_code() {
        let fault = fault_from_body(
            StatusCode::FORBIDDEN,
            r#"{"error":[{"message":"Access denied."}]}"#,
        );

        assert_eq!(fault.reason(), Some(ReasonCode::NOT_AUTHORIZED));
        assert_eq!(fault.message(), "Access denied.");
    }
}

// ============================================================================
// Handshake Tests
// ============================================================================

mod handshake {
    use super::*;

    /// Verify that credentials are sent with the login request.
    #[tokio::test]
    async fn test_connect_with_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LOGIN_PATH))
            .and(header("authorization", APP_AUTHORIZATION))
            .and(header("user-agent", "putget-tests"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let result = transport()
            .connect(&endpoint_for(&server), &Credentials::new("app", "passw0rd"))
            .await;

        assert!(result.is_ok());
    }

    /// Verify that an anonymous client proceeds when the gateway asks for credentials.
    #[tokio::test]
    async fn test_connect_anonymous_skips_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = transport()
            .connect(&endpoint_for(&server), &Credentials::anonymous())
            .await;

        assert!(result.is_ok());
    }

    /// Verify that rejected credentials fail the handshake.
    #[tokio::test]
    async fn test_connect_with_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": [{
                    "msgId": "MQWB0104E",
                    "message": "The user ID or password was not valid."
                }]
            })))
            .mount(&server)
            .await;

        let fault = transport()
            .connect(&endpoint_for(&server), &Credentials::new("admin", "wrong"))
            .await
            .err()
            .unwrap();

        assert_eq!(fault.reason(), Some(ReasonCode::NOT_AUTHORIZED));
        assert!(fault.message().contains("admin"));
        assert!(!fault.message().contains("wrong"));

        let cause = linked_fault(&fault).unwrap();
        assert_eq!(
            cause.message(),
            "MQWB0104E: The user ID or password was not valid."
        );
    }

    /// Verify that an unavailable gateway is reported by its error body.
    #[tokio::test]
    async fn test_connect_when_gateway_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fault = transport()
            .connect(&endpoint_for(&server), &Credentials::anonymous())
            .await
            .err()
            .unwrap();

        assert_eq!(fault.reason(), Some(ReasonCode::Q_MGR_NOT_AVAILABLE));
    }

    /// Verify that a refused connection links the HTTP error as the cause.
    #[tokio::test]
    async fn test_connect_to_unreachable_host() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let endpoint =
            BrokerEndpoint::new("127.0.0.1", port, "DEV.APP.SVRCONN", "QM1", "tests").unwrap();

        let fault = transport()
            .connect(&endpoint, &Credentials::anonymous())
            .await
            .err()
            .unwrap();

        assert_eq!(fault.reason(), Some(ReasonCode::HOST_NOT_AVAILABLE));
        assert!(fault.is_connection_broken());
        let cause = std::error::Error::source(&fault).unwrap();
        assert!(cause.downcast_ref::<reqwest::Error>().is_some());
    }
}

// ============================================================================
// Messaging Tests
// ============================================================================

mod messaging {
    use super::*;

    /// Verify the put request and the returned message id.
    #[tokio::test]
    async fn test_put_text_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MESSAGE_PATH))
            .and(header("content-type", "text/plain;charset=utf-8"))
            .and(header_exists("ibm-mq-rest-csrf-token"))
            .and(header("authorization", APP_AUTHORIZATION))
            .and(body_string("lucky number: 42"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("ibm-mq-md-messageId", "414d5120514d31202020"),
            )
            .expect(1)
            .mount(&server)
            .await;
        let connection = connect(&server, Credentials::new("app", "passw0rd")).await;

        let message_id = connection
            .put(&destination(), &Message::text("lucky number: 42"))
            .await
            .unwrap();

        assert_eq!(message_id.as_str(), "414d5120514d31202020");
    }

    /// Verify that an explicit queue manager in the destination is used in the path.
    #[tokio::test]
    async fn test_put_to_explicit_queue_manager() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ibmmq/rest/v3/messaging/qmgr/QM2/queue/DEV.QUEUE.1/message"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        let connection = connect(&server, Credentials::anonymous()).await;

        let result = connection
            .put(
                &Destination::resolve("queue://QM2/DEV.QUEUE.1").unwrap(),
                &Message::text("hello"),
            )
            .await;

        assert!(result.is_ok());
    }

    /// Verify that a rejected put carries the broker diagnostics.
    #[tokio::test]
    async fn test_put_rejected_by_broker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MESSAGE_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": [{
                    "msgId": "MQWB0004E",
                    "reasonCode": 2053,
                    "completionCode": 2,
                    "message": "Queue 'DEV.QUEUE.1' is full."
                }]
            })))
            .mount(&server)
            .await;
        let connection = connect(&server, Credentials::anonymous()).await;

        let fault = connection
            .put(&destination(), &Message::text("overflow"))
            .await
            .err()
            .unwrap();

        assert_eq!(fault.reason(), Some(ReasonCode::Q_FULL));
        assert!(!fault.is_connection_broken());
    }

    /// Verify that a get returns the message body and id.
    #[tokio::test]
    async fn test_get_message() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(MESSAGE_PATH))
            .and(query_param("wait", "15000"))
            .and(header_exists("ibm-mq-rest-csrf-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ibm-mq-md-messageId", "414d5120514d31202021")
                    .set_body_string("lucky number: 42"),
            )
            .expect(1)
            .mount(&server)
            .await;
        let connection = connect(&server, Credentials::anonymous()).await;

        let received = connection
            .get(&destination(), Duration::from_secs(15))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(received.body, "lucky number: 42");
        assert_eq!(received.message_id.as_str(), "414d5120514d31202021");
    }

    /// Verify that an empty queue is not an error.
    #[tokio::test]
    async fn test_get_from_empty_queue() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(MESSAGE_PATH))
            .and(query_param("wait", "250"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        let connection = connect(&server, Credentials::anonymous()).await;

        let received = connection
            .get(&destination(), Duration::from_millis(250))
            .await
            .unwrap();

        assert!(received.is_none());
    }

    /// Verify that a body that is not UTF-8 fails conversion.
    #[tokio::test]
    async fn test_get_non_text_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(MESSAGE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xfe, 0x00]))
            .mount(&server)
            .await;
        let connection = connect(&server, Credentials::anonymous()).await;

        let fault = connection
            .get(&destination(), Duration::ZERO)
            .await
            .err()
            .unwrap();

        assert_eq!(fault.reason(), Some(ReasonCode::NOT_CONVERTED));
    }

    /// Verify that a closed connection sends no requests.
    #[tokio::test]
    async fn test_operations_after_close() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MESSAGE_PATH))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        let connection = connect(&server, Credentials::anonymous()).await;
        connection.close().await.unwrap();

        let fault = connection
            .put(&destination(), &Message::text("late"))
            .await
            .err()
            .unwrap();

        assert_eq!(fault.reason(), Some(ReasonCode::HCONN_ERROR));
    }
}
