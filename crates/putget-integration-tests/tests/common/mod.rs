//! Common test utilities for putget integration tests
//!
//! This module provides:
//! - A shared in-memory status report sink
//! - Factories wired to the in-memory broker or a mocked REST gateway
//! - Controller builders with the default cycle timings

use putget_runtime::{
    BrokerEndpoint, ConnectionFactory, Credentials, CycleController, CycleTimings,
    InMemoryBroker, RestTransport, RestTransportConfig, StatusReporter,
};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const QUEUE: &str = "DEV.QUEUE.1";
pub const LUCKY: &str = "lucky number: 42";

// ============================================================================
// Report Sink
// ============================================================================

/// Status report sink readable while the controller still owns a clone
#[derive(Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.bytes.lock().unwrap().clone()).unwrap()
    }

    /// Number of report lines equal to `line`
    #[allow(dead_code)]
    pub fn count_lines(&self, line: &str) -> usize {
        self.contents().lines().filter(|l| *l == line).count()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Factories
// ============================================================================

pub fn endpoint(host: &str, port: u16) -> BrokerEndpoint {
    BrokerEndpoint::new(host, port, "DEV.APP.SVRCONN", "QM1", "putget-integration").unwrap()
}

#[allow(dead_code)]
pub fn memory_factory(broker: &InMemoryBroker) -> ConnectionFactory {
    ConnectionFactory::builder()
        .endpoint(endpoint("localhost", 1414))
        .credentials(Credentials::anonymous())
        .transport(Arc::new(broker.clone()))
        .build()
        .unwrap()
}

#[allow(dead_code)]
pub fn rest_factory(address: &std::net::SocketAddr, credentials: Credentials) -> ConnectionFactory {
    let transport = RestTransport::new(RestTransportConfig {
        scheme: "http".to_string(),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap();

    ConnectionFactory::builder()
        .endpoint(endpoint(&address.ip().to_string(), address.port()))
        .credentials(credentials)
        .transport(Arc::new(transport))
        .build()
        .unwrap()
}

// ============================================================================
// Controllers
// ============================================================================

pub fn controller(
    factory: ConnectionFactory,
    timings: CycleTimings,
    shutdown: CancellationToken,
) -> (CycleController<SharedBuffer>, SharedBuffer) {
    let report = SharedBuffer::new();
    let controller = CycleController::new(
        factory,
        QUEUE,
        timings,
        StatusReporter::new(report.clone()),
        shutdown,
    )
    .with_payloads(|| LUCKY.to_string());

    (controller, report)
}
