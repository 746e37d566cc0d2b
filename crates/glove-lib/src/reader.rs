//! Clean sensor frames from a raw notification stream
//!
//! The glove queues notifications while nobody reads them, and the link can
//! hand over frames with the wrong number of channels. [`SensorStreamReader`]
//! flushes the backlog on demand and retries until a frame of exactly the
//! declared sensor count arrives.

use crate::error::{GloveError, Result};
use crate::models::SensorFrame;
use crate::observability::PipelineMetrics;
use crate::peripheral::PeripheralSession;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, trace};

/// Configuration for the read protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Raw reads spent flushing stale notifications before an accurate read
    pub clear_count: usize,
    /// Upper bound on raw reads per `read_valid` call; unbounded when absent
    pub max_attempts: Option<u64>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            clear_count: 300,
            max_attempts: None,
        }
    }
}

/// How fresh a read must be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadPolicy {
    /// Flush the notification backlog, then read
    Accurate,
    /// Read whatever is next, possibly stale
    Fast,
}

impl ReadPolicy {
    fn clears_first(self) -> bool {
        matches!(self, ReadPolicy::Accurate)
    }
}

/// Retrying reader over one peripheral session
#[derive(Debug)]
pub struct SensorStreamReader {
    session: PeripheralSession,
    config: ReaderConfig,
    metrics: PipelineMetrics,
}

impl SensorStreamReader {
    pub fn new(session: PeripheralSession, config: ReaderConfig) -> Self {
        Self {
            session,
            config,
            metrics: PipelineMetrics::new(),
        }
    }

    /// Discard `count` raw reads.
    ///
    /// Each read consumes at most one queued notification, so the cost is
    /// proportional to `count`. Timeouts during the flush are ignored; a
    /// transport error aborts it.
    pub fn clear_buffer(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            self.metrics.inc_raw_reads();
            self.session.raw_read()?;
        }
        self.metrics.add_frames_flushed(count as u64);
        trace!(count, "Notification buffer cleared");
        Ok(())
    }

    /// Flush with the configured `clear_count`
    pub fn clear_buffer_default(&mut self) -> Result<()> {
        self.clear_buffer(self.config.clear_count)
    }

    /// Read until a frame of exactly the declared sensor count arrives.
    ///
    /// Timeouts and wrong-length frames are discarded and retried without
    /// limit unless `max_attempts` is configured. A transport failure ends the
    /// loop with the link error, typically [`GloveError::Disconnected`].
    pub fn read_valid(&mut self, clear_first: bool) -> Result<SensorFrame> {
        if clear_first {
            self.clear_buffer_default()?;
        }

        let started = Instant::now();
        let expected = self.session.sensor_count();
        let mut attempts: u64 = 0;

        loop {
            if let Some(max) = self.config.max_attempts {
                if attempts >= max {
                    return Err(GloveError::ReadExhausted { attempts });
                }
            }
            attempts += 1;
            self.metrics.inc_raw_reads();

            match self.session.raw_read()? {
                Some(frame) if frame.is_valid_for(expected) => {
                    self.metrics
                        .observe_valid_read_latency(started.elapsed().as_secs_f64());
                    return Ok(frame);
                }
                Some(frame) => {
                    self.metrics.inc_malformed_frames();
                    debug!(expected, actual = frame.len(), "Discarding malformed frame");
                }
                None => {
                    self.metrics.inc_read_timeouts();
                    trace!(attempts, "No notification before timeout, retrying");
                }
            }
        }
    }

    /// Read one valid frame under `policy`
    pub fn read(&mut self, policy: ReadPolicy) -> Result<SensorFrame> {
        self.read_valid(policy.clears_first())
    }

    pub fn session(&self) -> &PeripheralSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut PeripheralSession {
        &mut self.session
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Give back the session, e.g. to close it explicitly
    pub fn into_session(self) -> PeripheralSession {
        self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripheral::ScriptedLink;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn reader(script: Vec<Option<Vec<f32>>>, config: ReaderConfig) -> SensorStreamReader {
        let link = ScriptedLink::new(script);
        let session = PeripheralSession::from_link(Box::new(link), 3, Duration::from_millis(1));
        SensorStreamReader::new(session, config)
    }

    #[test]
    fn test_read_valid_skips_malformed_and_timeouts() {
        let mut reader = reader(
            vec![
                None,
                Some(vec![1.0, 2.0]),
                Some(vec![1.0, 2.0, 3.0, 4.0]),
                None,
                Some(vec![7.0, 8.0, 9.0]),
                Some(vec![0.0]),
            ],
            ReaderConfig::default(),
        );

        let frame = reader.read_valid(false).unwrap();
        assert_eq!(frame.values(), &[7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_read_valid_never_returns_wrong_length() {
        let mut script = Vec::new();
        for i in 0..20 {
            script.push(Some(vec![i as f32; (i % 5) + 1]));
        }
        let mut reader = reader(script, ReaderConfig::default());

        let mut frames = Vec::new();
        loop {
            match reader.read_valid(false) {
                Ok(frame) => frames.push(frame),
                Err(GloveError::Disconnected) => break,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|f| f.len() == 3));
    }

    #[test]
    fn test_clear_first_consumes_backlog() {
        let stale = Some(vec![0.0, 0.0, 0.0]);
        let config = ReaderConfig {
            clear_count: 3,
            max_attempts: None,
        };
        let mut reader = reader(
            vec![stale.clone(), stale.clone(), stale, Some(vec![5.0, 5.0, 5.0])],
            config,
        );

        assert_eq!(reader.read(ReadPolicy::Accurate).unwrap().values(), &[5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_fast_policy_does_not_clear() {
        let link = ScriptedLink::repeating(vec![1.0, 2.0, 3.0]);
        let reads = link.read_counter();
        let session = PeripheralSession::from_link(Box::new(link), 3, Duration::from_millis(1));
        let mut reader = SensorStreamReader::new(session, ReaderConfig::default());

        reader.read(ReadPolicy::Fast).unwrap();
        assert_eq!(reads.load(Ordering::Relaxed), 1);

        reader.read(ReadPolicy::Accurate).unwrap();
        assert_eq!(reads.load(Ordering::Relaxed), 1 + 300 + 1);
    }

    #[test]
    fn test_extra_clears_do_not_change_validity() {
        let link = ScriptedLink::repeating(vec![4.0, 5.0, 6.0]);
        let session = PeripheralSession::from_link(Box::new(link), 3, Duration::from_millis(1));
        let mut reader = SensorStreamReader::new(session, ReaderConfig::default());

        for extra in 0..4 {
            for _ in 0..extra {
                reader.clear_buffer(10).unwrap();
            }
            assert!(reader.read_valid(true).unwrap().is_valid_for(3));
        }
    }

    #[test]
    fn test_max_attempts_bounds_the_loop() {
        let config = ReaderConfig {
            clear_count: 0,
            max_attempts: Some(3),
        };
        let mut reader = reader(
            vec![None, Some(vec![1.0]), None, Some(vec![1.0, 2.0, 3.0])],
            config,
        );

        assert!(matches!(
            reader.read_valid(false),
            Err(GloveError::ReadExhausted { attempts: 3 })
        ));
    }

    #[test]
    fn test_closed_session_escapes_retry_loop() {
        let link = ScriptedLink::repeating(vec![1.0]);
        let session = PeripheralSession::from_link(Box::new(link), 3, Duration::from_millis(1));
        let closer = session.closer();
        let mut reader = SensorStreamReader::new(session, ReaderConfig::default());

        let handle = std::thread::spawn(move || reader.read_valid(false));
        std::thread::sleep(Duration::from_millis(20));
        closer.close();

        assert!(matches!(handle.join().unwrap(), Err(GloveError::Disconnected)));
    }
}
