//! Integration tests for the put/get cycle
//!
//! These tests verify:
//! - A lucky number payload makes the round trip and is reported as SUCCESS
//! - An unreachable queue manager fails the cycle and the next cycle reconnects
//! - An outage in the middle of the endless loop is survived
//! - The cycle works the same way against a REST messaging gateway

mod common;

use common::{controller, memory_factory, rest_factory, LUCKY, QUEUE};
use putget_runtime::{CyclePhase, CycleStatus, CycleTimings, InMemoryBroker};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOGIN_PATH: &str = "/ibmmq/rest/v3/login";
const MESSAGE_PATH: &str = "/ibmmq/rest/v3/messaging/qmgr/QM1/queue/DEV.QUEUE.1/message";

/// Timings for tests talking to a real socket, where paused time cannot be used
fn short_timings() -> CycleTimings {
    CycleTimings {
        warm_up: Duration::ZERO,
        pre_receive_delay: Duration::ZERO,
        receive_timeout: Duration::from_millis(250),
        post_receive_delay: Duration::ZERO,
    }
}

// ============================================================================
// In-Memory Queue Manager
// ============================================================================

/// Verify the lucky number round trip and the exact status report.
#[tokio::test(start_paused = true)]
async fn test_lucky_number_round_trip() {
    let broker = InMemoryBroker::default();
    let (mut controller, report) = controller(
        memory_factory(&broker),
        CycleTimings::default(),
        CancellationToken::new(),
    );

    let outcome = assert_ok!(controller.run_cycle().await);

    assert_eq!(outcome.status, CycleStatus::Success);
    assert_eq!(outcome.received.as_deref(), Some(LUCKY));
    assert_eq!(
        report.contents(),
        "--> Sent message was:\nlucky number: 42\n\
         \n--> Received message was:\nlucky number: 42\n\
         SUCCESS\n"
    );
    assert_eq!(broker.puts(), 1);
    assert_eq!(broker.gets(), 1);
    assert_eq!(broker.open_connections(), 0);
}

/// Verify that an unreachable queue manager fails the cycle without leaking a
/// session, and that the next cycle opens a brand-new one.
#[tokio::test(start_paused = true)]
async fn test_unreachable_then_recovered() {
    let broker = InMemoryBroker::default();
    broker.set_available(false);
    let (mut controller, report) = controller(
        memory_factory(&broker),
        CycleTimings::default(),
        CancellationToken::new(),
    );

    let failed = assert_ok!(controller.run_cycle().await);

    assert_eq!(failed.status, CycleStatus::Failure);
    assert_eq!(failed.failed_phase, Some(CyclePhase::AwaitConnect));
    assert_eq!(failed.sent, None);
    assert_eq!(broker.puts(), 0);
    assert_eq!(broker.open_connections(), 0);
    assert_eq!(
        report.contents(),
        "Connection to queue manager 'QM1' at localhost(1414) failed\n\
         Caused by: MQRC_HOST_NOT_AVAILABLE (2538): no listener at localhost(1414)\n\
         FAILURE\n"
    );

    broker.set_available(true);
    let recovered = assert_ok!(controller.run_cycle().await);

    assert_eq!(recovered.cycle, 2);
    assert_eq!(recovered.status, CycleStatus::Success);
    assert_eq!(broker.connect_attempts(), 2);
    assert_eq!(broker.open_connections(), 0);
    assert_eq!(controller.exit_status().exit_code(), 0);
}

/// Verify that a receive timing out on an empty queue still counts as success.
#[tokio::test(start_paused = true)]
async fn test_receive_timeout_is_success() {
    let broker = InMemoryBroker::default();
    let (mut controller, report) = controller(
        memory_factory(&broker),
        CycleTimings::default(),
        CancellationToken::new(),
    );

    // Take the message away while the controller waits before receiving
    let thief = tokio::spawn({
        let broker = broker.clone();
        async move {
            sleep(Duration::from_secs(5)).await;
            let session = memory_factory(&broker).create_context().await.unwrap();
            let destination = session.create_queue(QUEUE).unwrap();
            let stolen = session
                .create_consumer(&destination)
                .receive_body(Duration::ZERO)
                .await
                .unwrap();
            session.close().await.unwrap();
            stolen
        }
    });

    let start = Instant::now();
    let outcome = assert_ok!(controller.run_cycle().await);

    assert_eq!(thief.await.unwrap().as_deref(), Some(LUCKY));
    assert_eq!(outcome.status, CycleStatus::Success);
    assert_eq!(outcome.received, None);
    assert_eq!(start.elapsed(), Duration::from_secs(30));
    assert!(report
        .contents()
        .ends_with("\n--> No message received before the timeout\nSUCCESS\n"));
}

/// Verify that the endless loop survives an outage and reports every cycle.
#[tokio::test(start_paused = true)]
async fn test_loop_survives_outage() {
    let broker = InMemoryBroker::default();
    let shutdown = CancellationToken::new();
    let (mut controller, report) = controller(
        memory_factory(&broker),
        CycleTimings::default(),
        shutdown.clone(),
    );

    // Cycles start at 20s, 35s, 50s and 55s:
    //  - cycle 2 loses its connection while waiting to receive
    //  - cycle 3 cannot connect while the queue manager is down
    //  - cycle 4 succeeds and is cut short during its trailing delay
    let driver = async {
        sleep(Duration::from_secs(36)).await;
        broker.set_available(false);
        sleep(Duration::from_secs(16)).await;
        broker.set_available(true);
        sleep(Duration::from_secs(14)).await;
        shutdown.cancel();
    };

    let start = Instant::now();
    let (result, ()) = tokio::join!(controller.run(), driver);
    let exit_status = assert_ok!(result);

    assert_eq!(start.elapsed(), Duration::from_secs(66));
    assert_eq!(controller.cycles(), 4);
    assert_eq!(exit_status.last(), Some(CycleStatus::Success));
    assert_eq!(exit_status.exit_code(), 0);
    assert_eq!(report.count_lines("SUCCESS"), 2);
    assert_eq!(report.count_lines("FAILURE"), 2);
    assert!(report
        .contents()
        .contains("Caused by: MQRC_CONNECTION_BROKEN (2009)"));
    assert!(report
        .contents()
        .contains("Caused by: MQRC_HOST_NOT_AVAILABLE (2538)"));
    assert_eq!(broker.connect_attempts(), 4);
    assert_eq!(broker.open_connections(), 0);
}

// ============================================================================
// REST Messaging Gateway
// ============================================================================

async fn mount_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

/// Verify a full cycle against a mocked REST gateway.
#[tokio::test]
async fn test_rest_gateway_round_trip() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path(MESSAGE_PATH))
        .respond_with(
            ResponseTemplate::new(201).insert_header("ibm-mq-md-messageId", "414d5120514d31202020"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(MESSAGE_PATH))
        .and(query_param("wait", "250"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LUCKY))
        .expect(1)
        .mount(&server)
        .await;

    let (mut controller, report) = controller(
        rest_factory(server.address(), putget_runtime::Credentials::new("app", "passw0rd")),
        short_timings(),
        CancellationToken::new(),
    );

    let outcome = assert_ok!(controller.probe().await);

    assert_eq!(outcome.status, CycleStatus::Success);
    assert_eq!(outcome.received.as_deref(), Some(LUCKY));
    assert!(report.contents().ends_with("lucky number: 42\nSUCCESS\n"));
}

/// Verify that gateway diagnostics end up in the reported error chain.
#[tokio::test]
async fn test_rest_gateway_rejects_put() {
    let server = MockServer::start().await;
    mount_login(&server).await;
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
    Mock::given(method("DELETE"))
        .and(path(MESSAGE_PATH))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let (mut controller, report) = controller(
        rest_factory(server.address(), putget_runtime::Credentials::anonymous()),
        short_timings(),
        CancellationToken::new(),
    );

    let outcome = assert_ok!(controller.probe().await);

    assert_eq!(outcome.status, CycleStatus::Failure);
    assert_eq!(outcome.failed_phase, Some(CyclePhase::Sending));
    let contents = report.contents();
    assert!(contents.starts_with("Send to queue:///DEV.QUEUE.1 failed\n"));
    assert!(contents.contains("Caused by: MQRC_Q_FULL (2053)"));
    assert!(contents.ends_with("FAILURE\n"));
}
