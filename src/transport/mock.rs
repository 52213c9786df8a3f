//! # Mock Driver
//!
//! An in-memory [`Driver`] that records every call. It runs in one of two
//! modes:
//!
//! - **Scripted**: calls are only recorded; the test decides which events to
//!   deliver and when, by sending on the event channel itself.
//! - **Auto-reply**: behaves like a cooperative printer. Discovery returns the
//!   configured paired set, connects and disconnects succeed, and
//!   acknowledged transmissions echo a direct-I/O message. Used by the CLI's
//!   `--dry-run`.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{DeviceAddress, Driver, DriverEvent, LinkState, MESSAGE_DIRECT_IO, Payload, RawMessage};

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Discover,
    Connect(DeviceAddress),
    Disconnect,
    Transmit { data: Vec<u8>, wait_for_ack: bool },
}

pub struct MockDriver {
    events: mpsc::UnboundedSender<DriverEvent>,
    calls: mpsc::UnboundedSender<DriverCall>,
    history: Mutex<Vec<DriverCall>>,
    paired: Option<BTreeSet<DeviceAddress>>,
}

impl MockDriver {
    /// Record calls without answering them.
    ///
    /// Returns the driver and a receiver yielding each call as it happens.
    pub fn scripted(
        events: mpsc::UnboundedSender<DriverEvent>,
    ) -> (Self, mpsc::UnboundedReceiver<DriverCall>) {
        let (calls, rx) = mpsc::unbounded_channel();
        let driver = Self {
            events,
            calls,
            history: Mutex::new(Vec::new()),
            paired: None,
        };
        (driver, rx)
    }

    /// Answer every call the way a healthy printer would.
    pub fn auto_reply(
        events: mpsc::UnboundedSender<DriverEvent>,
        paired: impl IntoIterator<Item = DeviceAddress>,
    ) -> Self {
        let (calls, _) = mpsc::unbounded_channel();
        Self {
            events,
            calls,
            history: Mutex::new(Vec::new()),
            paired: Some(paired.into_iter().collect()),
        }
    }

    /// Every call recorded so far, oldest first.
    pub fn history(&self) -> Vec<DriverCall> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Number of `transmit` calls recorded so far.
    pub fn transmit_count(&self) -> usize {
        self.history()
            .iter()
            .filter(|c| matches!(c, DriverCall::Transmit { .. }))
            .count()
    }

    fn record(&self, call: DriverCall) {
        if let Ok(mut history) = self.history.lock() {
            history.push(call.clone());
        }
        let _ = self.calls.send(call);
    }

    fn reply(&self, event: DriverEvent) {
        if self.paired.is_some() {
            let _ = self.events.send(event);
        }
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn discover_paired_devices(&self) {
        self.record(DriverCall::Discover);
        if let Some(paired) = &self.paired {
            self.reply(DriverEvent::DeviceSetDiscovered(paired.clone()));
        }
    }

    async fn connect(&self, address: &DeviceAddress) {
        self.record(DriverCall::Connect(address.clone()));
        self.reply(DriverEvent::LinkStateChanged(LinkState::Connected));
    }

    async fn disconnect(&self) {
        self.record(DriverCall::Disconnect);
        self.reply(DriverEvent::LinkStateChanged(LinkState::Disconnected));
    }

    async fn transmit(&self, data: &[u8], wait_for_ack: bool) {
        self.record(DriverCall::Transmit {
            data: data.to_vec(),
            wait_for_ack,
        });
        if wait_for_ack {
            self.reply(DriverEvent::Other(RawMessage {
                what: MESSAGE_DIRECT_IO,
                arg1: data.len() as i32,
                payload: Payload::Bytes(data.to_vec()),
            }));
        }
    }
}
