//! # Printer Session
//!
//! The session owner task: the one place where session state changes.
//!
//! ## Inputs
//!
//! The owner processes, strictly one at a time and in arrival order per
//! source:
//!
//! - [`Intent`]s from callers, sent through a [`SessionHandle`]
//! - [`DriverEvent`]s from the driver's callback stream
//! - the single outcome message of each print job
//! - its own timers (release settle delay, discovery expiry)
//!
//! ## Print Cycle
//!
//! ```text
//! request ─► discovery ─► DeviceSetDiscovered ─► StartClaim ─► connect
//!                                                                 │
//!   Idle ◄─ settle ◄─ Disconnected ◄─ disconnect ◄─ job done ◄─ Connected
//! ```
//!
//! Failures along the way ([`NotificationKind`]) are reported to the
//! [`Observer`] and end the cycle; nothing retries on its own.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cajero::config::SessionConfig;
//! use cajero::session::{SessionController, observer::LogObserver};
//! use cajero::transport::RfcommDriver;
//!
//! # async fn example() {
//! let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
//! let driver = Arc::new(RfcommDriver::new(events_tx, 0));
//! let (handle, _task) =
//!     SessionController::spawn(driver, events_rx, Arc::new(LogObserver), SessionConfig::default());
//!
//! handle.request_timed_print(0.5).unwrap();
//! # }
//! ```

pub mod discovery;
pub mod observer;
pub mod state;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::SessionConfig;
use crate::error::CajeroError;
use crate::job::{Dispatcher, JobMode, PrintJob, PrintOutcome};
use crate::transport::{DeviceAddress, Driver, DriverEvent, LinkState};
use discovery::DiscoveryAdapter;
use observer::{Notification, NotificationKind, Observer, Snapshot};
use state::{LinkOutcome, Session, SessionStatus};

/// Caller-initiated requests.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Claim a specific device; ignored unless idle
    StartClaim(DeviceAddress),
    /// Release the claimed device; ignored unless claimed
    StartRelease,
    /// Discover, claim, print the sample invoice and release
    RequestSamplePrint,
    /// Discover, claim, run a timed filler job of `length` and release
    RequestTimedPrint { length: f32 },
    /// Change the filler length while the session is not busy
    SetJobLength(f32),
}

/// Owner-task timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    SettleElapsed,
    DiscoveryExpired(u64),
}

/// Cloneable handle for sending intents and reading the snapshot.
#[derive(Clone)]
pub struct SessionHandle {
    intents: mpsc::UnboundedSender<Intent>,
    snapshot: watch::Receiver<Snapshot>,
}

impl SessionHandle {
    pub fn send(&self, intent: Intent) -> Result<(), CajeroError> {
        self.intents
            .send(intent)
            .map_err(|_| CajeroError::SessionClosed)
    }

    pub fn request_sample_print(&self) -> Result<(), CajeroError> {
        self.send(Intent::RequestSamplePrint)
    }

    pub fn request_timed_print(&self, length: f32) -> Result<(), CajeroError> {
        self.send(Intent::RequestTimedPrint { length })
    }

    pub fn set_job_length(&self, length: f32) -> Result<(), CajeroError> {
        self.send(Intent::SetJobLength(length))
    }

    pub fn start_claim(&self, device: DeviceAddress) -> Result<(), CajeroError> {
        self.send(Intent::StartClaim(device))
    }

    pub fn start_release(&self) -> Result<(), CajeroError> {
        self.send(Intent::StartRelease)
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that wakes on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }
}

/// Sole owner and mutator of the [`Session`].
pub struct SessionController {
    session: Session,
    config: SessionConfig,
    driver: Arc<dyn Driver>,
    discovery: DiscoveryAdapter,
    dispatcher: Dispatcher,
    observer: Arc<dyn Observer>,
    snapshot: watch::Sender<Snapshot>,
    armed: JobMode,
    job_length: f32,
    intents: mpsc::UnboundedReceiver<Intent>,
    jobs_tx: mpsc::UnboundedSender<PrintOutcome>,
    jobs_rx: mpsc::UnboundedReceiver<PrintOutcome>,
    timers_tx: mpsc::UnboundedSender<Timer>,
    timers_rx: mpsc::UnboundedReceiver<Timer>,
}

impl SessionController {
    pub fn new(
        driver: Arc<dyn Driver>,
        observer: Arc<dyn Observer>,
        config: SessionConfig,
    ) -> (Self, SessionHandle) {
        let job_length = config.default_job_length();
        let (snapshot, snapshot_rx) = watch::channel(Snapshot {
            computed_job_length: config.job_steps(job_length),
            job_length,
            ..Snapshot::default()
        });
        let (intents_tx, intents) = mpsc::unbounded_channel();
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (timers_tx, timers_rx) = mpsc::unbounded_channel();

        let controller = Self {
            session: Session::new(),
            discovery: DiscoveryAdapter::new(driver.clone()),
            dispatcher: Dispatcher::new(driver.clone(), snapshot.subscribe(), &config),
            armed: JobMode::TimedFiller {
                steps: config.job_steps(job_length),
            },
            config,
            driver,
            observer,
            snapshot,
            job_length,
            intents,
            jobs_tx,
            jobs_rx,
            timers_tx,
            timers_rx,
        };
        let handle = SessionHandle {
            intents: intents_tx,
            snapshot: snapshot_rx,
        };
        (controller, handle)
    }

    /// Build a controller and run it on a new task.
    pub fn spawn(
        driver: Arc<dyn Driver>,
        events: mpsc::UnboundedReceiver<DriverEvent>,
        observer: Arc<dyn Observer>,
        config: SessionConfig,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (controller, handle) = Self::new(driver, observer, config);
        let task = tokio::spawn(controller.run(events));
        (handle, task)
    }

    /// Process inputs until every handle is dropped or the driver stream ends.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<DriverEvent>) {
        loop {
            tokio::select! {
                intent = self.intents.recv() => match intent {
                    Some(intent) => self.handle_intent(intent).await,
                    None => break,
                },
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                Some(outcome) = self.jobs_rx.recv() => self.handle_job_outcome(outcome).await,
                Some(timer) = self.timers_rx.recv() => self.handle_timer(timer),
            }
        }
        tracing::debug!("session owner stopped");
    }

    // ========================================================================
    // INTENTS
    // ========================================================================

    async fn handle_intent(&mut self, intent: Intent) {
        match intent {
            Intent::StartClaim(device) => self.start_claim(device).await,
            Intent::StartRelease => self.start_release().await,
            Intent::RequestSamplePrint => self.request_print(JobMode::SampleInvoice).await,
            Intent::RequestTimedPrint { length } => {
                if self.is_transitioning() {
                    tracing::debug!("timed print ignored: session busy");
                    return;
                }
                self.set_job_length(length);
                let steps = self.config.job_steps(self.job_length);
                if steps == 0 {
                    tracing::debug!("timed print ignored: zero steps at length {}", length);
                    return;
                }
                self.request_print(JobMode::TimedFiller { steps }).await;
            }
            Intent::SetJobLength(length) => {
                if self.is_transitioning() {
                    tracing::debug!("job length change ignored: session busy");
                    return;
                }
                self.set_job_length(length);
            }
        }
    }

    async fn request_print(&mut self, mode: JobMode) {
        if self.is_transitioning() {
            tracing::debug!("print request ignored: session busy");
            return;
        }
        self.armed = mode;

        if let Some(generation) = self.discovery.request().await {
            self.schedule(self.config.discovery_timeout(), Timer::DiscoveryExpired(generation));
        }
        self.publish();
    }

    async fn start_claim(&mut self, device: DeviceAddress) {
        if !self.session.start_claim(device.clone(), Instant::now()) {
            tracing::debug!("claim of {} ignored in {:?}", device, self.session.status());
            return;
        }
        tracing::info!("claiming device...");
        self.publish();
        self.driver.connect(&device).await;
    }

    async fn start_release(&mut self) {
        if !self.session.start_release() {
            tracing::debug!("release ignored in {:?}", self.session.status());
            return;
        }
        tracing::info!("releasing device...");
        self.publish();
        self.driver.disconnect().await;
    }

    fn set_job_length(&mut self, length: f32) {
        self.job_length = if length.is_nan() { 0.0 } else { length.clamp(0.0, 1.0) };
        self.publish();
    }

    // ========================================================================
    // DRIVER EVENTS
    // ========================================================================

    async fn handle_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::DeviceSetDiscovered(devices) => {
                let resolved = self.discovery.resolve(&devices);
                self.publish();

                if self.session.status() != SessionStatus::Idle {
                    tracing::debug!("device set of {} ignored in {:?}", devices.len(), self.session.status());
                    return;
                }
                match resolved {
                    None => tracing::debug!("unsolicited device set of {} ignored", devices.len()),
                    Some(Ok(device)) => {
                        tracing::info!("{} retrieved.", device);
                        self.start_claim(device).await;
                    }
                    Some(Err(e)) => {
                        tracing::warn!("{}", e);
                        self.notify(NotificationKind::NoDeviceFound, None);
                    }
                }
            }
            DriverEvent::LinkStateChanged(link) => self.handle_link_state(link),
            DriverEvent::Other(message) => tracing::debug!("{}", message),
        }
    }

    fn handle_link_state(&mut self, link: LinkState) {
        let status = self.session.status();
        match self.session.on_link_state(link, Instant::now()) {
            LinkOutcome::Claimed => {
                tracing::info!("device claimed.");
                self.publish();
                self.start_job();
            }
            LinkOutcome::ClaimFailed(e) => {
                tracing::warn!("{}", e);
                self.publish();
                self.notify(NotificationKind::ClaimFailed, None);
            }
            LinkOutcome::ConnectionLost(e) => {
                tracing::error!("{}", e);
                self.publish();
                self.notify(NotificationKind::DeviceLost, None);
            }
            LinkOutcome::ReleaseCompleted => {
                tracing::info!("device released.");
                self.schedule(self.config.settle_delay(), Timer::SettleElapsed);
            }
            LinkOutcome::Uninterested => {
                tracing::debug!("link state {:?} ignored in {:?}", link, status);
            }
        }
    }

    fn start_job(&mut self) {
        let Some(device) = self.session.target_address().cloned() else {
            return;
        };
        if self.armed.writes() == 0 {
            tracing::debug!("zero-step job not started");
            return;
        }
        let job = PrintJob {
            mode: self.armed,
            device,
            claim_latency: self.session.claim_latency().unwrap_or_default(),
        };
        self.dispatcher.spawn(job, self.jobs_tx.clone());
    }

    // ========================================================================
    // JOB OUTCOMES AND TIMERS
    // ========================================================================

    async fn handle_job_outcome(&mut self, outcome: PrintOutcome) {
        match outcome {
            Ok(()) => {
                tracing::info!("invoice printed.");
                self.start_release().await;
            }
            Err(e) => {
                tracing::info!("failed printing invoice: {}", e);
                self.notify(NotificationKind::PrintFailed, None);
            }
        }
    }

    fn handle_timer(&mut self, timer: Timer) {
        match timer {
            Timer::SettleElapsed => {
                if self.session.finish_release() {
                    tracing::debug!("release settled");
                    self.publish();
                }
            }
            Timer::DiscoveryExpired(generation) => {
                if let Some(e) = self.discovery.expire(generation) {
                    tracing::warn!("{}", e);
                    self.publish();
                    self.notify(
                        NotificationKind::NoDeviceFound,
                        Some("Device discovery timed out."),
                    );
                }
            }
        }
    }

    fn schedule(&self, delay: std::time::Duration, timer: Timer) {
        let tx = self.timers_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(timer);
        });
    }

    // ========================================================================
    // OUTPUTS
    // ========================================================================

    /// Busy with a device, or waiting on a discovery answer.
    fn is_transitioning(&self) -> bool {
        self.session.status() != SessionStatus::Idle || self.discovery.is_pending()
    }

    fn notify(&self, kind: NotificationKind, message: Option<&str>) {
        let mut notification = Notification::new(kind);
        if let Some(message) = message {
            notification = notification.with_message(message);
        }
        self.observer.notify(&notification);
    }

    fn publish(&self) {
        let status = self.session.status();
        self.snapshot.send_replace(Snapshot {
            status,
            is_claiming: status == SessionStatus::Claiming,
            is_claimed: matches!(status, SessionStatus::Claimed | SessionStatus::Releasing),
            is_releasing: status == SessionStatus::Releasing,
            computed_job_length: self.config.job_steps(self.job_length),
            job_length: self.job_length,
            target_address: self.session.target_address().map(|a| a.to_string()),
            discovery_pending: self.discovery.is_pending(),
        });
    }
}
