//! The put/get cycle controller.
//!
//! Every cycle opens a fresh session, sends one message, waits, receives one
//! message with a bounded wait, then releases the session whatever happened.
//! Failures are reported and the next cycle starts after the same fixed delay;
//! there is no backoff and no retry cap.
//!
//! Suspensions end early when the shutdown token is cancelled. An in-flight
//! receive is never interrupted, so the broker never sees a half-finished get.

use crate::error::MessagingError;
use crate::factory::ConnectionFactory;
use crate::message::Message;
use crate::report::{ErrorChain, StatusReporter};
use crate::session::Session;
use chrono::Utc;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "cycle_tests.rs"]
mod tests;

/// Prefix of the generated payload
pub const DEFAULT_MESSAGE_PREFIX: &str = "Your lucky number is: ";

// ============================================================================
// Cycle Types
// ============================================================================

/// Step of the cycle state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    WarmUp,
    AwaitConnect,
    Resolving,
    Sending,
    WaitBeforeReceive,
    Receiving,
    WaitBeforeNextCycle,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WarmUp => "WARM_UP",
            Self::AwaitConnect => "AWAIT_CONNECT",
            Self::Resolving => "RESOLVING",
            Self::Sending => "SENDING",
            Self::WaitBeforeReceive => "WAIT_BEFORE_RECEIVE",
            Self::Receiving => "RECEIVING",
            Self::WaitBeforeNextCycle => "WAIT_BEFORE_NEXT_CYCLE",
        };
        f.write_str(name)
    }
}

/// Fixed delays and the receive wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTimings {
    /// Suspension before the first cycle only
    pub warm_up: Duration,
    /// Suspension between send and receive
    pub pre_receive_delay: Duration,
    /// Longest time a receive waits for a message
    pub receive_timeout: Duration,
    /// Suspension at the end of every cycle
    pub post_receive_delay: Duration,
}

impl Default for CycleTimings {
    fn default() -> Self {
        Self {
            warm_up: Duration::from_secs(20),
            pre_receive_delay: Duration::from_secs(10),
            receive_timeout: Duration::from_secs(15),
            post_receive_delay: Duration::from_secs(5),
        }
    }
}

/// Result of one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    Success,
    Failure,
}

impl CycleStatus {
    /// Process exit code for this status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("SUCCESS"),
            Self::Failure => f.write_str("FAILURE"),
        }
    }
}

/// Everything observed during one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    /// 1-based cycle number
    pub cycle: u64,
    pub status: CycleStatus,
    /// Step that failed, when the status is FAILURE
    pub failed_phase: Option<CyclePhase>,
    /// Rendered error and causes, outermost first; empty on success
    pub error_chain: Vec<String>,
    /// Payload that reached the broker
    pub sent: Option<String>,
    /// Payload received back, if any arrived in time
    pub received: Option<String>,
}

/// Status of the most recent cycle, shared with whoever decides the exit code
#[derive(Debug, Clone)]
pub struct ExitStatus(Arc<AtomicU8>);

const STATUS_UNSET: u8 = 0;
const STATUS_SUCCESS: u8 = 1;
const STATUS_FAILURE: u8 = 2;

impl ExitStatus {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(STATUS_UNSET)))
    }

    /// Overwrite the status with the latest cycle result
    pub fn record(&self, status: CycleStatus) {
        let value = match status {
            CycleStatus::Success => STATUS_SUCCESS,
            CycleStatus::Failure => STATUS_FAILURE,
        };
        self.0.store(value, Ordering::Release);
    }

    /// Status of the last completed cycle
    pub fn last(&self) -> Option<CycleStatus> {
        match self.0.load(Ordering::Acquire) {
            STATUS_SUCCESS => Some(CycleStatus::Success),
            STATUS_FAILURE => Some(CycleStatus::Failure),
            _ => None,
        }
    }

    /// Exit code: 0 after a successful last cycle, otherwise 1
    pub fn exit_code(&self) -> i32 {
        self.last()
            .unwrap_or(CycleStatus::Failure)
            .exit_code()
    }
}

impl Default for ExitStatus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Produces the body of the message sent each cycle
pub trait PayloadSource: Send {
    fn next_payload(&mut self) -> String;
}

/// Prefix followed by the current milliseconds modulo 1000
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuckyNumber {
    prefix: String,
}

impl LuckyNumber {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for LuckyNumber {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_PREFIX)
    }
}

impl PayloadSource for LuckyNumber {
    fn next_payload(&mut self) -> String {
        let number = Utc::now().timestamp_millis().rem_euclid(1000);
        format!("{}{}", self.prefix, number)
    }
}

impl<F> PayloadSource for F
where
    F: FnMut() -> String + Send,
{
    fn next_payload(&mut self) -> String {
        self()
    }
}

// ============================================================================
// Cycle Controller
// ============================================================================

/// Why a cycle did not complete
enum CycleFailure {
    Broker(CyclePhase, MessagingError),
    Output(io::Error),
}

impl From<io::Error> for CycleFailure {
    fn from(error: io::Error) -> Self {
        Self::Output(error)
    }
}

fn failed_at(phase: CyclePhase) -> impl FnOnce(MessagingError) -> CycleFailure {
    move |error| CycleFailure::Broker(phase, error)
}

#[derive(Default)]
struct Progress {
    sent: Option<String>,
    received: Option<String>,
}

/// Drives the endless send-then-receive loop
pub struct CycleController<W: Write> {
    factory: ConnectionFactory,
    queue_name: String,
    timings: CycleTimings,
    reporter: StatusReporter<W>,
    shutdown: CancellationToken,
    payloads: Box<dyn PayloadSource>,
    exit_status: ExitStatus,
    cycles: u64,
}

impl<W: Write> CycleController<W> {
    pub fn new(
        factory: ConnectionFactory,
        queue_name: impl Into<String>,
        timings: CycleTimings,
        reporter: StatusReporter<W>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            factory,
            queue_name: queue_name.into(),
            timings,
            reporter,
            shutdown,
            payloads: Box::new(LuckyNumber::default()),
            exit_status: ExitStatus::new(),
            cycles: 0,
        }
    }

    /// Replace the payload generator
    pub fn with_payloads(mut self, payloads: impl PayloadSource + 'static) -> Self {
        self.payloads = Box::new(payloads);
        self
    }

    /// Record statuses into an existing shared flag
    pub fn with_exit_status(mut self, exit_status: ExitStatus) -> Self {
        self.exit_status = exit_status;
        self
    }

    pub fn exit_status(&self) -> ExitStatus {
        self.exit_status.clone()
    }

    /// Number of cycles started so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn timings(&self) -> &CycleTimings {
        &self.timings
    }

    pub fn reporter(&self) -> &StatusReporter<W> {
        &self.reporter
    }

    pub fn into_reporter(self) -> StatusReporter<W> {
        self.reporter
    }

    /// Warm up once, then run cycles until the shutdown token is cancelled.
    ///
    /// Only a failure to write the status report ends the loop with an error.
    pub async fn run(&mut self) -> io::Result<ExitStatus> {
        info!(
            endpoint = %self.factory.endpoint(),
            queue = %self.queue_name,
            transport = %self.factory.transport_kind(),
            anonymous = self.factory.is_anonymous(),
            "Starting put/get loop"
        );

        self.suspend(self.timings.warm_up, CyclePhase::WarmUp).await;

        while !self.shutdown.is_cancelled() {
            self.run_cycle().await?;
        }

        info!(
            cycles = self.cycles,
            last_status = ?self.exit_status.last(),
            "Put/get loop stopped"
        );

        Ok(self.exit_status.clone())
    }

    /// Run one full cycle including the trailing delay
    pub async fn run_cycle(&mut self) -> io::Result<CycleOutcome> {
        self.execute(self.timings.post_receive_delay).await
    }

    /// Run one cycle without the trailing delay
    pub async fn probe(&mut self) -> io::Result<CycleOutcome> {
        self.execute(Duration::ZERO).await
    }

    async fn execute(&mut self, trailing: Duration) -> io::Result<CycleOutcome> {
        self.cycles += 1;
        let cycle = self.cycles;
        let mut progress = Progress::default();

        debug!(cycle, phase = %CyclePhase::AwaitConnect, "Opening session");
        let result = match self.factory.create_context().await {
            Ok(session) => {
                let result = self.exchange(&session, &mut progress).await;
                self.suspend(trailing, CyclePhase::WaitBeforeNextCycle).await;
                release(&session, cycle).await;
                result
            }
            Err(error) => {
                self.suspend(trailing, CyclePhase::WaitBeforeNextCycle).await;
                Err(failed_at(CyclePhase::AwaitConnect)(error))
            }
        };

        let outcome = match result {
            Ok(()) => {
                self.reporter.success()?;
                info!(cycle, status = %CycleStatus::Success, "Cycle complete");
                CycleOutcome {
                    cycle,
                    status: CycleStatus::Success,
                    failed_phase: None,
                    error_chain: Vec::new(),
                    sent: progress.sent,
                    received: progress.received,
                }
            }
            Err(CycleFailure::Broker(phase, error)) => {
                let chain = ErrorChain::from_error(&error);
                self.reporter.failure(&chain)?;
                warn!(
                    cycle,
                    status = %CycleStatus::Failure,
                    phase = %phase,
                    kind = %error.kind(),
                    reason = ?error.reason().map(|reason| reason.code()),
                    error = %error,
                    "Cycle failed"
                );
                CycleOutcome {
                    cycle,
                    status: CycleStatus::Failure,
                    failed_phase: Some(phase),
                    error_chain: chain.into_lines(),
                    sent: progress.sent,
                    received: progress.received,
                }
            }
            Err(CycleFailure::Output(error)) => return Err(error),
        };

        self.exit_status.record(outcome.status);
        Ok(outcome)
    }

    /// Resolve, send, wait, receive within one open session
    async fn exchange(
        &mut self,
        session: &Session,
        progress: &mut Progress,
    ) -> Result<(), CycleFailure> {
        let destination = session
            .create_queue(&self.queue_name)
            .map_err(failed_at(CyclePhase::Resolving))?;

        let message = Message::text(self.payloads.next_payload());
        let message_id = session
            .create_producer()
            .send(&destination, &message)
            .await
            .map_err(failed_at(CyclePhase::Sending))?;

        debug!(
            destination = %destination,
            message_id = %message_id,
            "Message sent"
        );
        progress.sent = Some(message.body().to_string());
        self.reporter.sent(message.body())?;

        self.suspend(self.timings.pre_receive_delay, CyclePhase::WaitBeforeReceive)
            .await;

        let received = session
            .create_consumer(&destination)
            .receive_body(self.timings.receive_timeout)
            .await
            .map_err(failed_at(CyclePhase::Receiving))?;

        debug!(
            destination = %destination,
            received = received.is_some(),
            "Receive finished"
        );
        self.reporter.received(received.as_deref())?;
        progress.received = received;

        Ok(())
    }

    /// Sleep for a fixed delay, ending early on shutdown
    async fn suspend(&self, duration: Duration, phase: CyclePhase) {
        if duration.is_zero() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.shutdown.cancelled() => {
                debug!(phase = %phase, "Suspension interrupted by shutdown");
            }
        }
    }
}

/// Release the session, logging rather than failing the cycle on error
async fn release(session: &Session, cycle: u64) {
    if let Err(fault) = session.close().await {
        warn!(cycle, session_id = %session.id(), fault = %fault, "Session release failed");
    }
}
