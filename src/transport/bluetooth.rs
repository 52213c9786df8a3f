//! # Bluetooth RFCOMM Driver
//!
//! This module drives a paired receipt printer over the Bluetooth Serial Port
//! Profile (SPP) using the BlueZ command-line tools and an RFCOMM TTY.
//!
//! ## How Each Operation Maps to BlueZ
//!
//! | Operation | Mechanism |
//! |-----------|-----------|
//! | discover | `bluetoothctl devices Paired` (or `paired-devices` on older BlueZ) |
//! | connect | reuse `/dev/rfcommN` bound to the MAC, else `rfcomm bind` |
//! | disconnect | close the TTY |
//! | transmit | chunked raw writes to the TTY |
//!
//! Every operation is queued to one worker thread, runs in issue order and
//! reports its outcome on the event channel, so the caller never waits on
//! the radio.
//!
//! ## Bluetooth Setup (Linux)
//!
//! The printer must already be paired:
//!
//! ```bash
//! $ bluetoothctl
//! [bluetooth]# scan on
//! [bluetooth]# pair 00:11:62:XX:XX:XX
//! ```
//!
//! Binding a new RFCOMM device requires root (or `CAP_NET_ADMIN`).
//!
//! ## TTY Configuration
//!
//! The RFCOMM device is opened in raw mode so binary data passes unmodified:
//!
//! - **No input processing**: IGNBRK, BRKINT, PARMRK, ISTRIP, ... disabled
//! - **No output processing**: OPOST disabled (no CR/LF translation)
//! - **8-bit characters**: CS8, no parity
//! - **Non-canonical, no echo**

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{DeviceAddress, Driver, DriverEvent, LinkState, MESSAGE_DIRECT_IO, Payload, RawMessage};
use crate::error::CajeroError;

/// Default chunk size for writes (bytes)
const CHUNK_SIZE: usize = 4096;

/// Delay between chunks (milliseconds)
const CHUNK_DELAY_MS: u64 = 2;

/// An open RFCOMM TTY.
struct RfcommLink {
    file: File,
    device_path: String,
}

impl RfcommLink {
    fn open(device_path: String) -> Result<Self, CajeroError> {
        let file = OpenOptions::new()
            .write(true)
            .open(&device_path)
            .map_err(|e| CajeroError::Transport(format!("Failed to open {}: {}", device_path, e)))?;

        configure_tty_raw(file.as_raw_fd())?;

        Ok(Self { file, device_path })
    }

    /// Write data in chunks to avoid overflowing the Bluetooth buffer.
    fn write_all(&mut self, data: &[u8]) -> Result<(), CajeroError> {
        for chunk in data.chunks(CHUNK_SIZE) {
            self.file
                .write_all(chunk)
                .map_err(|e| CajeroError::Transport(format!("Write failed: {}", e)))?;

            if data.len() > CHUNK_SIZE {
                thread::sleep(Duration::from_millis(CHUNK_DELAY_MS));
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CajeroError> {
        self.file
            .flush()
            .map_err(|e| CajeroError::Transport(format!("Flush failed: {}", e)))
    }
}

/// One driver call, queued for the worker thread.
#[derive(Debug)]
enum Op {
    Discover,
    Connect(DeviceAddress),
    Disconnect,
    Transmit { data: Vec<u8>, wait_for_ack: bool },
}

/// # Bluetooth Printer Driver
///
/// Holds at most one open link. Calls are queued to a single worker thread
/// and run in the order they were issued, so a write always reaches the TTY
/// before a later `disconnect` closes it. All outcomes are delivered as
/// [`DriverEvent`]s on the channel given to [`RfcommDriver::new`].
pub struct RfcommDriver {
    ops: mpsc::UnboundedSender<Op>,
}

impl RfcommDriver {
    /// Create a driver that binds new devices as `/dev/rfcomm<channel>`.
    pub fn new(events: mpsc::UnboundedSender<DriverEvent>, channel: u8) -> Self {
        Self::with_link(events, channel, None)
    }

    fn with_link(
        events: mpsc::UnboundedSender<DriverEvent>,
        channel: u8,
        link: Option<RfcommLink>,
    ) -> Self {
        let (ops, queue) = mpsc::unbounded_channel();
        let worker = Worker {
            events,
            channel,
            link,
        };
        if let Err(e) = thread::Builder::new()
            .name("rfcomm-driver".to_string())
            .spawn(move || worker.run(queue))
        {
            tracing::error!("failed to start rfcomm worker: {}", e);
        }
        Self { ops }
    }

    fn submit(&self, op: Op) {
        if let Err(e) = self.ops.send(op) {
            tracing::error!("rfcomm worker stopped, dropping {:?}", e.0);
        }
    }
}

#[async_trait]
impl Driver for RfcommDriver {
    async fn discover_paired_devices(&self) {
        self.submit(Op::Discover);
    }

    async fn connect(&self, address: &DeviceAddress) {
        self.submit(Op::Connect(address.clone()));
    }

    async fn disconnect(&self) {
        self.submit(Op::Disconnect);
    }

    async fn transmit(&self, data: &[u8], wait_for_ack: bool) {
        self.submit(Op::Transmit {
            data: data.to_vec(),
            wait_for_ack,
        });
    }
}

/// Owns the link and runs queued calls one at a time.
struct Worker {
    events: mpsc::UnboundedSender<DriverEvent>,
    channel: u8,
    link: Option<RfcommLink>,
}

impl Worker {
    /// Runs until the driver is dropped.
    fn run(mut self, mut queue: mpsc::UnboundedReceiver<Op>) {
        while let Some(op) = queue.blocking_recv() {
            match op {
                Op::Discover => self.discover(),
                Op::Connect(address) => self.connect(&address),
                Op::Disconnect => self.disconnect(),
                Op::Transmit { data, wait_for_ack } => self.transmit(data, wait_for_ack),
            }
        }
        tracing::debug!("rfcomm worker stopped");
    }

    fn emit(&self, event: DriverEvent) {
        let _ = self.events.send(event);
    }

    fn discover(&self) {
        let devices = list_paired_devices().unwrap_or_else(|e| {
            tracing::warn!("paired device listing failed: {}", e);
            BTreeSet::new()
        });
        self.emit(DriverEvent::DeviceSetDiscovered(devices));
    }

    fn connect(&mut self, address: &DeviceAddress) {
        let state = match open_link(address, self.channel) {
            Ok(opened) => {
                tracing::debug!("opened {} for {}", opened.device_path, address);
                self.link = Some(opened);
                LinkState::Connected
            }
            Err(e) => {
                tracing::warn!("connect to {} failed: {}", address, e);
                LinkState::Disconnected
            }
        };
        self.emit(DriverEvent::LinkStateChanged(state));
    }

    fn disconnect(&mut self) {
        if let Some(closed) = self.link.take() {
            tracing::debug!("closing {}", closed.device_path);
        }
        self.emit(DriverEvent::LinkStateChanged(LinkState::Disconnected));
    }

    fn transmit(&mut self, data: Vec<u8>, wait_for_ack: bool) {
        let Some(open) = self.link.as_mut() else {
            tracing::warn!("transmit of {} bytes with no open link", data.len());
            return;
        };

        let result = open
            .write_all(&data)
            .and_then(|_| if wait_for_ack { open.flush() } else { Ok(()) });

        match result {
            Ok(()) if wait_for_ack => self.emit(DriverEvent::Other(RawMessage {
                what: MESSAGE_DIRECT_IO,
                arg1: data.len() as i32,
                payload: Payload::Bytes(data),
            })),
            Ok(()) => {}
            Err(e) => {
                tracing::error!("{}", e);
                self.link = None;
                self.emit(DriverEvent::LinkStateChanged(LinkState::Disconnected));
            }
        }
    }
}

fn open_link(address: &DeviceAddress, channel: u8) -> Result<RfcommLink, CajeroError> {
    let mac = address.as_str();
    if !is_valid_mac(mac) {
        return Err(CajeroError::Transport(format!("Invalid MAC address: {}", mac)));
    }

    let device_path = match find_rfcomm_for_mac(mac)? {
        Some(path) => path,
        None => setup_rfcomm(mac, channel)?,
    };
    RfcommLink::open(device_path)
}

/// Configure a file descriptor for raw TTY mode.
///
/// IXON/IXOFF/IXANY are cleared too: 0x11 and 0x13 may appear inside command
/// parameters and must not be eaten as flow control.
#[cfg(unix)]
fn configure_tty_raw(fd: i32) -> Result<(), CajeroError> {
    use std::mem::MaybeUninit;

    let mut termios = MaybeUninit::uninit();
    let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
    if result != 0 {
        return Err(CajeroError::Transport(format!(
            "tcgetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
    if result != 0 {
        return Err(CajeroError::Transport(format!(
            "tcsetattr failed: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

#[cfg(not(unix))]
fn configure_tty_raw(_fd: i32) -> Result<(), CajeroError> {
    Ok(())
}

// ============================================================================
// BLUEZ HELPERS
// ============================================================================

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Parse `bluetoothctl` device listing output.
///
/// Lines look like `Device 00:11:22:33:44:55 Printer-Name`; anything else
/// (prompts, agent chatter, malformed addresses) is skipped.
pub fn parse_paired_devices(output: &str) -> BTreeSet<DeviceAddress> {
    output
        .lines()
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            match (words.next(), words.next()) {
                (Some("Device"), Some(mac)) if is_valid_mac(mac) => Some(DeviceAddress::new(mac)),
                _ => None,
            }
        })
        .collect()
}

/// List paired devices through `bluetoothctl`.
pub fn list_paired_devices() -> Result<BTreeSet<DeviceAddress>, CajeroError> {
    let output = Command::new("bluetoothctl")
        .args(["devices", "Paired"])
        .output()
        .map_err(|e| CajeroError::Transport(format!("Failed to run bluetoothctl: {}", e)))?;

    let devices = parse_paired_devices(&String::from_utf8_lossy(&output.stdout));
    if output.status.success() && !devices.is_empty() {
        return Ok(devices);
    }

    // BlueZ < 5.65 only knows `paired-devices`
    let output = Command::new("bluetoothctl")
        .arg("paired-devices")
        .output()
        .map_err(|e| CajeroError::Transport(format!("Failed to run bluetoothctl: {}", e)))?;

    Ok(parse_paired_devices(&String::from_utf8_lossy(&output.stdout)))
}

/// Find an existing RFCOMM device bound to the given MAC address.
///
/// Checks `/proc/net/rfcomm` and falls back to `rfcomm -a`.
#[cfg(unix)]
pub fn find_rfcomm_for_mac(mac: &str) -> Result<Option<String>, CajeroError> {
    let mac_upper = mac.to_uppercase();

    if let Ok(contents) = fs::read_to_string("/proc/net/rfcomm")
        && let Some(path) = rfcomm_device_in(&contents, &mac_upper)
    {
        return Ok(Some(path));
    }

    let output = Command::new("rfcomm")
        .arg("-a")
        .output()
        .map_err(|e| CajeroError::Transport(format!("Failed to run 'rfcomm -a': {}", e)))?;

    Ok(rfcomm_device_in(&String::from_utf8_lossy(&output.stdout), &mac_upper))
}

#[cfg(not(unix))]
pub fn find_rfcomm_for_mac(_mac: &str) -> Result<Option<String>, CajeroError> {
    Ok(None)
}

/// Find `/dev/rfcommN` for a MAC in `rfcomm0: XX:XX:.. channel N ...` listings.
fn rfcomm_device_in(listing: &str, mac_upper: &str) -> Option<String> {
    listing
        .lines()
        .filter(|line| line.to_uppercase().contains(mac_upper))
        .filter_map(|line| line.split(':').next())
        .map(|dev_name| format!("/dev/{}", dev_name.trim()))
        .find(|path| Path::new(path).exists())
}

/// Bind an RFCOMM device for a Bluetooth MAC address.
///
/// Runs `bluetoothctl connect`, verifies reachability with `l2ping`, then
/// `rfcomm bind <channel> <MAC> 1`. Returns the created device path.
#[cfg(unix)]
pub fn setup_rfcomm(mac: &str, channel: u8) -> Result<String, CajeroError> {
    let mac_upper = mac.to_uppercase();
    let device_path = format!("/dev/rfcomm{}", channel);

    // May fail if already connected; l2ping verifies below
    tracing::info!("connecting to {}", mac_upper);
    let output = Command::new("bluetoothctl")
        .arg("connect")
        .arg(&mac_upper)
        .output()
        .map_err(|e| CajeroError::Transport(format!("Failed to run bluetoothctl: {}", e)))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !(stdout.contains("Connection successful") || stdout.contains("already connected")) {
        tracing::debug!("bluetoothctl returned: {}", stdout.trim());
    }

    thread::sleep(Duration::from_millis(500));

    let output = Command::new("l2ping")
        .arg("-c")
        .arg("1")
        .arg(&mac_upper)
        .output()
        .map_err(|e| CajeroError::Transport(format!("Failed to run l2ping: {}", e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CajeroError::Transport(format!(
            "Device {} not reachable: {}",
            mac_upper,
            stderr.trim()
        )));
    }

    let output = Command::new("rfcomm")
        .arg("bind")
        .arg(channel.to_string())
        .arg(&mac_upper)
        .arg("1") // SPP
        .output()
        .map_err(|e| CajeroError::Transport(format!("Failed to run rfcomm bind: {}", e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CajeroError::Transport(format!(
            "rfcomm bind failed: {}",
            stderr.trim()
        )));
    }

    thread::sleep(Duration::from_millis(500));

    if !Path::new(&device_path).exists() {
        return Err(CajeroError::Transport(format!(
            "Device {} was not created",
            device_path
        )));
    }

    tracing::info!("bound {}", device_path);
    Ok(device_path)
}

#[cfg(not(unix))]
pub fn setup_rfcomm(_mac: &str, _channel: u8) -> Result<String, CajeroError> {
    Err(CajeroError::Transport(
        "RFCOMM setup not supported on this platform".to_string(),
    ))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_mac_addresses() {
        assert!(is_valid_mac("00:11:22:33:44:55"));
        assert!(is_valid_mac("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_mac("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_invalid_mac_addresses() {
        assert!(!is_valid_mac("00:11:22:33:44")); // too short
        assert!(!is_valid_mac("00:11:22:33:44:55:66")); // too long
        assert!(!is_valid_mac("00-11-22-33-44-55")); // wrong separator
        assert!(!is_valid_mac("GG:HH:II:JJ:KK:LL"));
        assert!(!is_valid_mac(""));
    }

    #[test]
    fn test_parse_paired_devices() {
        let output = "\
Device 00:11:62:AA:BB:CC TP-80BT
Agent registered
Device aa:bb:cc:dd:ee:ff Desk Printer
Device not-a-mac Broken
";
        let devices = parse_paired_devices(output);
        let got: Vec<&str> = devices.iter().map(|d| d.as_str()).collect();
        assert_eq!(got, vec!["00:11:62:AA:BB:CC", "AA:BB:CC:DD:EE:FF"]);
    }

    #[test]
    fn test_parse_paired_devices_empty() {
        assert!(parse_paired_devices("").is_empty());
        assert!(parse_paired_devices("No default controller available\n").is_empty());
    }

    #[test]
    fn test_rfcomm_listing_without_match() {
        let listing = "rfcomm0: 00:11:22:33:44:55 channel 1 clean\n";
        assert_eq!(rfcomm_device_in(listing, "AA:BB:CC:DD:EE:FF"), None);
    }

    #[tokio::test]
    async fn test_transmit_without_link_is_silent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let driver = RfcommDriver::new(tx, 0);
        driver.transmit(&[0x1B, 0x40], true).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_write_lands_before_queued_disconnect() {
        let path = std::env::temp_dir().join(format!("cajero-rfcomm-{}", std::process::id()));
        let file = File::create(&path).unwrap();
        let link = RfcommLink {
            file,
            device_path: path.display().to_string(),
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let driver = RfcommDriver::with_link(tx, 0, Some(link));
        driver.transmit(&[0x1B, 0x40, 0x0A], true).await;
        driver.disconnect().await;
        driver.transmit(&[0xFF], false).await;

        match rx.recv().await {
            Some(DriverEvent::Other(message)) => {
                assert_eq!(message.what, MESSAGE_DIRECT_IO);
                assert_eq!(message.arg1, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(
            rx.recv().await,
            Some(DriverEvent::LinkStateChanged(LinkState::Disconnected))
        );

        drop(driver);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fs::read(&path).unwrap(), vec![0x1B, 0x40, 0x0A]);
        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_invalid_address_reports_disconnect() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let driver = RfcommDriver::new(tx, 0);
        driver.connect(&DeviceAddress::from("not-a-mac")).await;
        assert_eq!(
            rx.recv().await,
            Some(DriverEvent::LinkStateChanged(LinkState::Disconnected))
        );
    }
}
