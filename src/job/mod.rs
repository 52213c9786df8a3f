//! # Print Job Dispatcher
//!
//! Runs one print job on a background task so the multi-second filler loop
//! never delays driver callbacks or user intents.
//!
//! ## Job Modes
//!
//! | Mode | Device writes |
//! |------|---------------|
//! | `SampleInvoice` | one buffer built by [`invoice::sample_invoice`] |
//! | `TimedFiller { steps }` | `steps` filler pulses, one `step_interval` apart |
//!
//! ## Cancellation
//!
//! The dispatcher never changes session state. It watches the published
//! [`Snapshot`] and checks that the session is still `Claimed` before every
//! write. Once the session drops out of `Claimed` the job stops without
//! touching the device again and reports [`PrintError::Incomplete`].
//!
//! The outcome is sent back to the session owner as a single message.

pub mod invoice;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::error::PrintError;
use crate::protocol::{commands::FILLER_PULSE, encoder::encode};
use crate::session::observer::Snapshot;
use crate::session::state::SessionStatus;
use crate::transport::{DeviceAddress, Driver};

/// What a print job sends to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    SampleInvoice,
    TimedFiller { steps: u32 },
}

impl JobMode {
    /// Number of device writes the job performs when it runs to completion.
    pub fn writes(&self) -> u32 {
        match self {
            JobMode::SampleInvoice => 1,
            JobMode::TimedFiller { steps } => *steps,
        }
    }
}

/// One print job, owned by the dispatcher task for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    pub mode: JobMode,
    pub device: DeviceAddress,
    pub claim_latency: Duration,
}

/// Result of one job run.
pub type PrintOutcome = Result<(), PrintError>;

/// Spawns and runs print jobs against the shared driver.
///
/// The dispatcher is the only component that calls [`Driver::transmit`].
#[derive(Clone)]
pub struct Dispatcher {
    driver: Arc<dyn Driver>,
    session: watch::Receiver<Snapshot>,
    step_interval: Duration,
    wait_for_ack: bool,
}

impl Dispatcher {
    pub fn new(
        driver: Arc<dyn Driver>,
        session: watch::Receiver<Snapshot>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            driver,
            session,
            step_interval: config.step_interval(),
            wait_for_ack: config.wait_for_ack,
        }
    }

    /// Run `job` on its own task; its outcome is sent on `report` exactly once.
    pub fn spawn(&self, job: PrintJob, report: mpsc::UnboundedSender<PrintOutcome>) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let outcome = dispatcher.run(&job).await;
            let _ = report.send(outcome);
        })
    }

    /// Run a job to completion or cancellation.
    pub async fn run(&self, job: &PrintJob) -> PrintOutcome {
        tracing::info!("printing invoice.");
        let requested = job.mode.writes();

        match job.mode {
            JobMode::SampleInvoice => {
                let buffer = encode(&invoice::sample_invoice(&job.device, job.claim_latency))?;
                if !self.is_claimed() {
                    return Err(PrintError::Incomplete { completed: 0, requested });
                }
                self.driver.transmit(buffer.as_bytes(), self.wait_for_ack).await;
            }
            JobMode::TimedFiller { steps } => {
                for step in 0..steps {
                    if step > 0 {
                        tokio::time::sleep(self.step_interval).await;
                    }
                    if !self.is_claimed() {
                        tracing::debug!("filler job cancelled before step {}", step + 1);
                        return Err(PrintError::Incomplete { completed: step, requested });
                    }
                    self.driver.transmit(&FILLER_PULSE, self.wait_for_ack).await;
                    tracing::debug!("filler step {}/{} sent", step + 1, steps);
                }
            }
        }

        if self.is_claimed() {
            Ok(())
        } else {
            Err(PrintError::Incomplete { completed: requested, requested })
        }
    }

    fn is_claimed(&self) -> bool {
        self.session.borrow().status == SessionStatus::Claimed
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{DriverCall, MockDriver};

    fn claimed_snapshot() -> Snapshot {
        Snapshot {
            status: SessionStatus::Claimed,
            ..Snapshot::default()
        }
    }

    fn job(mode: JobMode) -> PrintJob {
        PrintJob {
            mode,
            device: DeviceAddress::from("00:11:22:33:44:55"),
            claim_latency: Duration::from_millis(87),
        }
    }

    fn setup() -> (Arc<MockDriver>, watch::Sender<Snapshot>, Dispatcher) {
        let (events, _) = mpsc::unbounded_channel();
        let (driver, _calls) = MockDriver::scripted(events);
        let driver = Arc::new(driver);
        let (status_tx, status_rx) = watch::channel(claimed_snapshot());
        let dispatcher = Dispatcher::new(driver.clone(), status_rx, &SessionConfig::default());
        (driver, status_tx, dispatcher)
    }

    #[tokio::test]
    async fn test_sample_invoice_transmits_once() {
        let (driver, _status, dispatcher) = setup();
        assert_eq!(dispatcher.run(&job(JobMode::SampleInvoice)).await, Ok(()));

        let history = driver.history();
        assert_eq!(history.len(), 1);
        match &history[0] {
            DriverCall::Transmit { data, wait_for_ack } => {
                assert!(*wait_for_ack);
                assert_eq!(&data[..2], &[0x1B, 0x40]);
                assert!(data.windows(5).any(|w| w == b"___87"));
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sample_invoice_skipped_when_not_claimed() {
        let (driver, status, dispatcher) = setup();
        status.send_replace(Snapshot::default());

        let outcome = dispatcher.run(&job(JobMode::SampleInvoice)).await;
        assert_eq!(outcome, Err(PrintError::Incomplete { completed: 0, requested: 1 }));
        assert_eq!(driver.transmit_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filler_sends_one_pulse_per_step() {
        let (driver, _status, dispatcher) = setup();
        let started = tokio::time::Instant::now();

        let outcome = dispatcher.run(&job(JobMode::TimedFiller { steps: 3 })).await;

        assert_eq!(outcome, Ok(()));
        assert_eq!(driver.transmit_count(), 3);
        assert!(driver.history().iter().all(|c| matches!(
            c,
            DriverCall::Transmit { data, .. } if data.as_slice() == FILLER_PULSE
        )));
        // Two pauses between three pulses
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_filler_stops_when_session_leaves_claimed() {
        let (driver, status, dispatcher) = setup();
        let handle = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.run(&job(JobMode::TimedFiller { steps: 3 })).await })
        };

        // Let step 1 go out, then drop the session before step 2
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(driver.transmit_count(), 1);
        status.send_replace(Snapshot::default());

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, Err(PrintError::Incomplete { completed: 1, requested: 3 }));
        assert_eq!(driver.transmit_count(), 1);
    }

    #[tokio::test]
    async fn test_zero_step_filler_is_trivially_complete() {
        let (driver, _status, dispatcher) = setup();
        assert_eq!(dispatcher.run(&job(JobMode::TimedFiller { steps: 0 })).await, Ok(()));
        assert_eq!(driver.transmit_count(), 0);
    }
}
