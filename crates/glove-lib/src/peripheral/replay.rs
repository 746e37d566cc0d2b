//! Software peripherals
//!
//! [`ReplayAdapter`] streams recorded frames at the glove's sampling rate so
//! the pipeline can run without hardware. [`ScriptedLink`] plays back an
//! exact sequence of notifications, timeouts included.

use super::{BleAdapter, PeripheralLink};
use crate::error::{GloveError, Result};
use crate::models::SensorFrame;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::debug;

/// Address prefix used by replay peripherals
pub const REPLAY_ADDRESS_PREFIX: &str = "replay:";

enum Script {
    Once(VecDeque<Option<Vec<f32>>>),
    Repeat(Vec<f32>),
}

/// Link that returns a fixed script of reads.
///
/// `Some(values)` is a notification, `None` a timeout. Once a finite script
/// runs out the link behaves as disconnected.
pub struct ScriptedLink {
    address: String,
    script: Script,
    reads: Arc<AtomicUsize>,
}

impl ScriptedLink {
    pub fn new(script: Vec<Option<Vec<f32>>>) -> Self {
        Self {
            address: "scripted".to_string(),
            script: Script::Once(script.into()),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Link that notifies the same values forever
    pub fn repeating(values: Vec<f32>) -> Self {
        Self {
            address: "scripted".to_string(),
            script: Script::Repeat(values),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Shared counter of raw reads served
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }
}

impl PeripheralLink for ScriptedLink {
    fn address(&self) -> &str {
        &self.address
    }

    fn raw_read(&mut self, _timeout: Duration) -> Result<Option<SensorFrame>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        match &mut self.script {
            Script::Once(queue) => match queue.pop_front() {
                Some(read) => Ok(read.map(SensorFrame::new)),
                None => Err(GloveError::Disconnected),
            },
            Script::Repeat(values) => Ok(Some(SensorFrame::new(values.clone()))),
        }
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Adapter whose discovery result and links are set up in advance
#[derive(Default)]
pub struct ScriptedAdapter {
    addresses: Vec<String>,
    links: Mutex<HashMap<String, ScriptedLink>>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise `address` and hand out `link` on connect
    pub fn with_link(mut self, address: &str, link: ScriptedLink) -> Self {
        self.addresses.push(address.to_string());
        self.links
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.to_string(), link.with_address(address));
        self
    }

    /// Advertise `address` but refuse connections to it
    pub fn with_unreachable(mut self, address: &str) -> Self {
        self.addresses.push(address.to_string());
        self
    }
}

impl BleAdapter for ScriptedAdapter {
    fn discover(&self, _timeout: Duration) -> Result<Vec<String>> {
        Ok(self.addresses.clone())
    }

    fn connect(&self, address: &str) -> Result<Box<dyn PeripheralLink>> {
        let mut links = self
            .links
            .lock()
            .map_err(|e| GloveError::Transport(format!("lock poisoned: {}", e)))?;
        links
            .remove(address)
            .map(|link| Box::new(link) as Box<dyn PeripheralLink>)
            .ok_or_else(|| GloveError::Transport(format!("{} refused the connection", address)))
    }
}

/// Adapter that replays recorded frames as a live glove would notify them
pub struct ReplayAdapter {
    name: String,
    frames: Arc<Vec<SensorFrame>>,
    interval: Duration,
}

impl ReplayAdapter {
    /// Replay `frames` in a loop at `sampling_rate_hz`
    pub fn new(name: impl Into<String>, frames: Vec<SensorFrame>, sampling_rate_hz: u8) -> Self {
        let rate = u64::from(sampling_rate_hz.max(1));
        Self {
            name: name.into(),
            frames: Arc::new(frames),
            interval: Duration::from_micros(1_000_000 / rate),
        }
    }

    pub fn address(&self) -> String {
        format!("{}{}", REPLAY_ADDRESS_PREFIX, self.name)
    }
}

impl BleAdapter for ReplayAdapter {
    fn discover(&self, _timeout: Duration) -> Result<Vec<String>> {
        if self.frames.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![self.address()])
    }

    fn connect(&self, address: &str) -> Result<Box<dyn PeripheralLink>> {
        if address != self.address() || self.frames.is_empty() {
            return Err(GloveError::Transport(format!("unknown replay peripheral {}", address)));
        }
        Ok(Box::new(ReplayLink::start(
            address.to_string(),
            Arc::clone(&self.frames),
            self.interval,
        )))
    }
}

/// Link fed by a producer thread; unread notifications queue up like a
/// real glove's backlog.
struct ReplayLink {
    address: String,
    frames: Receiver<SensorFrame>,
    stop: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
}

impl ReplayLink {
    fn start(address: String, frames: Arc<Vec<SensorFrame>>, interval: Duration) -> Self {
        let (tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let producer_stop = Arc::clone(&stop);

        let producer = std::thread::spawn(move || {
            for frame in frames.iter().cycle() {
                if producer_stop.load(Ordering::Relaxed) || tx.send(frame.clone()).is_err() {
                    break;
                }
                std::thread::sleep(interval);
            }
        });

        debug!(address = %address, "Replay peripheral streaming");
        Self {
            address,
            frames: rx,
            stop,
            producer: Some(producer),
        }
    }
}

impl PeripheralLink for ReplayLink {
    fn address(&self) -> &str {
        &self.address
    }

    fn raw_read(&mut self, timeout: Duration) -> Result<Option<SensorFrame>> {
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(GloveError::Disconnected),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(producer) = self.producer.take() {
            let _ = producer.join();
        }
        Ok(())
    }
}

impl Drop for ReplayLink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_link_plays_script_then_disconnects() {
        let mut link = ScriptedLink::new(vec![Some(vec![1.0, 2.0]), None]);
        let counter = link.read_counter();

        assert_eq!(
            link.raw_read(Duration::ZERO).unwrap(),
            Some(SensorFrame::new(vec![1.0, 2.0]))
        );
        assert_eq!(link.raw_read(Duration::ZERO).unwrap(), None);
        assert!(matches!(link.raw_read(Duration::ZERO), Err(GloveError::Disconnected)));
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_scripted_adapter_hands_out_link_once() {
        let adapter = ScriptedAdapter::new().with_link("AA", ScriptedLink::repeating(vec![1.0]));
        assert_eq!(adapter.discover(Duration::ZERO).unwrap(), vec!["AA"]);
        let link = adapter.connect("AA").unwrap();
        assert_eq!(link.address(), "AA");
        assert!(adapter.connect("AA").is_err());
    }

    #[test]
    fn test_scripted_adapter_keeps_every_registered_link() {
        let adapter = ScriptedAdapter::new()
            .with_link("AA", ScriptedLink::repeating(vec![1.0]))
            .with_unreachable("BB")
            .with_link("CC", ScriptedLink::repeating(vec![2.0]));

        assert_eq!(adapter.discover(Duration::ZERO).unwrap(), vec!["AA", "BB", "CC"]);
        assert!(adapter.connect("BB").is_err());

        let mut link = adapter.connect("CC").unwrap();
        assert_eq!(link.address(), "CC");
        let frame = link.raw_read(Duration::ZERO).unwrap().unwrap();
        assert_eq!(frame.values(), &[2.0]);
        assert!(adapter.connect("AA").is_ok());
    }

    #[test]
    fn test_replay_adapter_streams_frames_in_order() {
        let frames = vec![
            SensorFrame::new(vec![1.0]),
            SensorFrame::new(vec![2.0]),
            SensorFrame::new(vec![3.0]),
        ];
        let adapter = ReplayAdapter::new("unit", frames, 200);
        let addresses = adapter.discover(Duration::ZERO).unwrap();
        assert_eq!(addresses, vec!["replay:unit"]);

        let mut link = adapter.connect(&addresses[0]).unwrap();
        let mut seen = Vec::new();
        while seen.len() < 4 {
            if let Some(frame) = link.raw_read(Duration::from_secs(1)).unwrap() {
                seen.push(frame.values()[0]);
            }
        }
        assert_eq!(seen, vec![1.0, 2.0, 3.0, 1.0]);
        link.close().unwrap();
    }

    #[test]
    fn test_replay_adapter_without_frames_finds_nothing() {
        let adapter = ReplayAdapter::new("empty", Vec::new(), 90);
        assert!(adapter.discover(Duration::ZERO).unwrap().is_empty());
        assert!(adapter.connect("replay:empty").is_err());
    }
}
