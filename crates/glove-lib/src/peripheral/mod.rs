//! Peripheral discovery, selection and connection
//!
//! A [`PeripheralSession`] owns exactly one connected glove and exposes the
//! blocking raw read primitive. Transports plug in through [`BleAdapter`]
//! and [`PeripheralLink`]: BlueZ over D-Bus for real hardware (feature
//! `bluez`), and the replay/scripted links for recorded data and tests.

#[cfg(feature = "bluez")]
pub mod bluez;
mod codec;
pub mod replay;

pub use codec::decode_capacitance;
pub use replay::{ReplayAdapter, ScriptedAdapter, ScriptedLink};

use crate::error::{GloveError, Result};
use crate::models::SensorFrame;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// GATT service advertised by StretchSense gloves
pub const STRETCHSENSE_SERVICE_UUID: &str = "00001701-7374-7265-7563-6873656e7365";

/// Advertised local name of StretchSense gloves
pub const STRETCHSENSE_NAME: &str = "StretchSense";

/// Configuration for discovery and the connected link
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralConfig {
    /// Host controller to scan with (BlueZ adapter name)
    pub adapter: String,
    /// Service UUID a glove must expose
    pub service_uuid: String,
    /// Advertised name a glove may use instead of listing the service
    pub advertised_name: String,
    /// How long discovery scans for advertisements
    pub scan_timeout_secs: u64,
    /// How long one raw read waits for a notification
    pub read_timeout_ms: u64,
    /// Sampling rate written to the glove on connect
    pub sampling_rate_hz: u8,
    /// ATT value handle of the sampling-rate characteristic
    pub sampling_rate_handle: u16,
    /// Preferred glove address; skips interactive selection when set
    pub address: Option<String>,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            adapter: "hci0".to_string(),
            service_uuid: STRETCHSENSE_SERVICE_UUID.to_string(),
            advertised_name: STRETCHSENSE_NAME.to_string(),
            scan_timeout_secs: 3,
            read_timeout_ms: 1000,
            sampling_rate_hz: 90,
            sampling_rate_handle: 29,
            address: None,
        }
    }
}

impl PeripheralConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// A host radio able to scan for and connect to gloves
pub trait BleAdapter {
    /// Scan for up to `timeout` and return addresses advertising the glove service
    fn discover(&self, timeout: Duration) -> Result<Vec<String>>;

    /// Open a transport connection with notifications enabled and the
    /// sampling rate configured
    fn connect(&self, address: &str) -> Result<Box<dyn PeripheralLink>>;
}

/// One live transport connection to a glove
pub trait PeripheralLink: Send {
    fn address(&self) -> &str;

    /// Block until a notification arrives or `timeout` elapses.
    ///
    /// Returns `Ok(None)` on timeout. Frames are returned exactly as
    /// delivered; validity filtering belongs to the reader.
    fn raw_read(&mut self, timeout: Duration) -> Result<Option<SensorFrame>>;

    /// Tear down the transport connection
    fn close(&mut self) -> Result<()>;
}

/// Chooses one address out of a discovery result
pub trait PeripheralSelector {
    fn select(&self, addresses: &[String]) -> Option<String>;
}

/// Picks the first discovered glove
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstMatch;

impl PeripheralSelector for FirstMatch {
    fn select(&self, addresses: &[String]) -> Option<String> {
        addresses.first().cloned()
    }
}

/// Picks a known address, case-insensitively
#[derive(Debug, Clone)]
pub struct FixedAddress(pub String);

impl PeripheralSelector for FixedAddress {
    fn select(&self, addresses: &[String]) -> Option<String> {
        addresses
            .iter()
            .find(|addr| addr.eq_ignore_ascii_case(&self.0))
            .cloned()
    }
}

impl<F> PeripheralSelector for F
where
    F: Fn(&[String]) -> Option<String>,
{
    fn select(&self, addresses: &[String]) -> Option<String> {
        self(addresses)
    }
}

/// Lifecycle of a peripheral session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Scanning,
    Connected,
    Streaming,
}

/// Scan for gloves, de-duplicating addresses while keeping discovery order.
///
/// An empty result is a normal outcome, not an error.
pub fn discover(adapter: &dyn BleAdapter, config: &PeripheralConfig) -> Result<Vec<String>> {
    debug!(
        timeout_secs = config.scan_timeout_secs,
        service_uuid = %config.service_uuid,
        "Scanning for peripherals"
    );

    let mut addresses: Vec<String> = Vec::new();
    for addr in adapter.discover(config.scan_timeout())? {
        if !addresses.iter().any(|known| known.eq_ignore_ascii_case(&addr)) {
            addresses.push(addr);
        }
    }

    info!(found = addresses.len(), "Peripheral scan complete");
    Ok(addresses)
}

/// Cross-thread handle that closes a session.
///
/// The next raw read on the session fails with [`GloveError::Disconnected`],
/// which is the only way to abort a reader blocked in its retry loop.
#[derive(Debug, Clone)]
pub struct SessionCloser {
    closed: Arc<AtomicBool>,
}

impl SessionCloser {
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Exclusive session with one connected glove
pub struct PeripheralSession {
    address: String,
    sensor_count: usize,
    read_timeout: Duration,
    state: SessionState,
    link: Option<Box<dyn PeripheralLink>>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for PeripheralSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeripheralSession")
            .field("address", &self.address)
            .field("sensor_count", &self.sensor_count)
            .field("state", &self.state)
            .finish()
    }
}

impl PeripheralSession {
    /// Discover gloves, let `selector` choose one, and connect to it.
    ///
    /// Fails with [`GloveError::NoPeripheralFound`] when nothing is
    /// discovered, the selector declines, or the chosen address refuses the
    /// connection. There is no retry or rescan.
    pub fn establish(
        adapter: &dyn BleAdapter,
        selector: &dyn PeripheralSelector,
        config: &PeripheralConfig,
        sensor_count: usize,
    ) -> Result<Self> {
        let addresses = discover(adapter, config)?;
        if addresses.is_empty() {
            warn!("No peripherals found");
            return Err(GloveError::NoPeripheralFound);
        }

        let address = selector.select(&addresses).ok_or_else(|| {
            warn!(candidates = addresses.len(), "No peripheral selected");
            GloveError::NoPeripheralFound
        })?;

        Self::connect(adapter, &address, config, sensor_count)
    }

    /// Connect to a specific address
    pub fn connect(
        adapter: &dyn BleAdapter,
        address: &str,
        config: &PeripheralConfig,
        sensor_count: usize,
    ) -> Result<Self> {
        info!(address = %address, "Connecting to peripheral");

        let link = adapter.connect(address).map_err(|e| {
            warn!(address = %address, error = %e, "Connection to peripheral failed");
            GloveError::NoPeripheralFound
        })?;

        info!(address = %address, sensor_count, "Peripheral connected");
        Ok(Self::from_link(link, sensor_count, config.read_timeout()))
    }

    /// Wrap an already connected link
    pub fn from_link(
        link: Box<dyn PeripheralLink>,
        sensor_count: usize,
        read_timeout: Duration,
    ) -> Self {
        Self {
            address: link.address().to_string(),
            sensor_count,
            read_timeout,
            state: SessionState::Connected,
            link: Some(link),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Declared number of sensors; a valid frame has exactly this length
    pub fn sensor_count(&self) -> usize {
        self.sensor_count
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn closer(&self) -> SessionCloser {
        SessionCloser {
            closed: Arc::clone(&self.closed),
        }
    }

    /// Raw read with the configured timeout (1 s by default)
    pub fn raw_read(&mut self) -> Result<Option<SensorFrame>> {
        self.raw_read_timeout(self.read_timeout)
    }

    /// Wait up to `timeout` for one notification.
    ///
    /// A transport failure moves the session to `Disconnected`; every later
    /// read fails until the caller connects again.
    pub fn raw_read_timeout(&mut self, timeout: Duration) -> Result<Option<SensorFrame>> {
        if self.closed.load(Ordering::SeqCst) {
            self.shutdown_link("closed by handle");
            return Err(GloveError::Disconnected);
        }

        let link = self.link.as_mut().ok_or(GloveError::Disconnected)?;
        match link.raw_read(timeout) {
            Ok(frame) => {
                self.state = SessionState::Streaming;
                Ok(frame)
            }
            Err(e) => {
                warn!(
                    address = %self.address,
                    error = %e,
                    "Peripheral read failed, session disconnected"
                );
                self.shutdown_link("transport error");
                Err(e)
            }
        }
    }

    /// Close the connection. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let result = match self.link.take() {
            Some(mut link) => link.close(),
            None => Ok(()),
        };
        if self.state != SessionState::Disconnected {
            info!(address = %self.address, "Peripheral session closed");
        }
        self.state = SessionState::Disconnected;
        result
    }

    fn shutdown_link(&mut self, reason: &str) {
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.close() {
                debug!(address = %self.address, error = %e, "Error closing peripheral link");
            }
            debug!(address = %self.address, reason, "Peripheral link dropped");
        }
        self.state = SessionState::Disconnected;
    }
}

impl Drop for PeripheralSession {
    fn drop(&mut self) {
        if self.link.is_some() {
            self.shutdown_link("session dropped");
        }
    }
}
