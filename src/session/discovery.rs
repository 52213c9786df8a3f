//! # Device Discovery Adapter
//!
//! Issues one paired-device discovery request at a time and picks the device
//! to claim from the driver's answer.
//!
//! ## Selection Rule
//!
//! Drivers make no promise about the order of the devices they report. The
//! adapter picks the smallest [`DeviceAddress`] (uppercase, byte-wise string
//! order), which is stable across runs and drivers.
//!
//! ## Timeouts
//!
//! Every request carries a generation number. The owner schedules an expiry
//! for that generation; if the request is still pending when it fires, the
//! request is dropped and reported as [`DiscoveryError::Timeout`]. An answer
//! arriving after expiry is unsolicited and ignored. There is no retry.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::DiscoveryError;
use crate::transport::{DeviceAddress, Driver};

pub struct DiscoveryAdapter {
    driver: Arc<dyn Driver>,
    pending: Option<u64>,
    generation: u64,
}

impl DiscoveryAdapter {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            pending: None,
            generation: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Ask the driver for paired devices.
    ///
    /// Returns the request's generation, or `None` without calling the driver
    /// if a request is already outstanding.
    pub async fn request(&mut self) -> Option<u64> {
        if self.pending.is_some() {
            return None;
        }
        self.generation += 1;
        self.pending = Some(self.generation);

        tracing::info!("retrieving device...");
        self.driver.discover_paired_devices().await;
        Some(self.generation)
    }

    /// Consume a discovery answer.
    ///
    /// Returns `None` if no request was outstanding.
    pub fn resolve(&mut self, devices: &BTreeSet<DeviceAddress>) -> Option<Result<DeviceAddress, DiscoveryError>> {
        self.pending.take()?;
        Some(select(devices))
    }

    /// Expire request `generation` if it is still outstanding.
    pub fn expire(&mut self, generation: u64) -> Option<DiscoveryError> {
        if self.pending != Some(generation) {
            return None;
        }
        self.pending = None;
        Some(DiscoveryError::Timeout)
    }
}

/// Pick the device to claim from a discovery answer.
pub fn select(devices: &BTreeSet<DeviceAddress>) -> Result<DeviceAddress, DiscoveryError> {
    devices.first().cloned().ok_or(DiscoveryError::NoDeviceFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{DriverCall, MockDriver};
    use tokio::sync::mpsc;

    fn set(addrs: &[&str]) -> BTreeSet<DeviceAddress> {
        addrs.iter().map(|a| DeviceAddress::from(*a)).collect()
    }

    fn adapter() -> (DiscoveryAdapter, Arc<MockDriver>) {
        let (events, _) = mpsc::unbounded_channel();
        let (driver, _) = MockDriver::scripted(events);
        let driver = Arc::new(driver);
        (DiscoveryAdapter::new(driver.clone()), driver)
    }

    #[test]
    fn test_select_is_order_independent() {
        let a = set(&["cc:00:00:00:00:01", "00:11:22:33:44:55", "AA:00:00:00:00:00"]);
        let b = set(&["AA:00:00:00:00:00", "cc:00:00:00:00:01", "00:11:22:33:44:55"]);
        assert_eq!(select(&a), Ok(DeviceAddress::from("00:11:22:33:44:55")));
        assert_eq!(select(&a), select(&b));
    }

    #[test]
    fn test_select_empty() {
        assert_eq!(select(&BTreeSet::new()), Err(DiscoveryError::NoDeviceFound));
    }

    #[tokio::test]
    async fn test_single_outstanding_request() {
        let (mut adapter, driver) = adapter();
        assert_eq!(adapter.request().await, Some(1));
        assert_eq!(adapter.request().await, None);
        assert_eq!(driver.history(), vec![DriverCall::Discover]);

        let picked = adapter.resolve(&set(&["00:11:22:33:44:55"]));
        assert_eq!(picked, Some(Ok(DeviceAddress::from("00:11:22:33:44:55"))));
        assert!(!adapter.is_pending());
    }

    #[tokio::test]
    async fn test_unsolicited_answer_is_ignored() {
        let (mut adapter, _) = adapter();
        assert_eq!(adapter.resolve(&set(&["00:11:22:33:44:55"])), None);
    }

    #[tokio::test]
    async fn test_expiry_only_hits_current_generation() {
        let (mut adapter, _) = adapter();
        let first = adapter.request().await.unwrap();
        assert_eq!(adapter.resolve(&BTreeSet::new()), Some(Err(DiscoveryError::NoDeviceFound)));

        let second = adapter.request().await.unwrap();
        assert_eq!(adapter.expire(first), None);
        assert!(adapter.is_pending());
        assert_eq!(adapter.expire(second), Some(DiscoveryError::Timeout));
        assert_eq!(adapter.resolve(&set(&["00:11:22:33:44:55"])), None);
    }
}
