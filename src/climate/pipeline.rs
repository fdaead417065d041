//! Periodic sensor reading, publishing and the last-reading snapshot.

use crate::climate::data::{LastReading, Measurement};
use crate::climate::dewpoint::{calc_dewpoint, round_to};
use crate::climate::publisher::Publisher;
use crate::climate::sensor::ClimateSensor;
use crate::error::{NodeError, Result};
use chrono::{Local, Utc};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Holder of the latest [`LastReading`].
///
/// Every update swaps the whole snapshot, so readers never see a mix of old
/// and new fields. Clones share the same snapshot.
#[derive(Debug, Clone)]
pub struct ReadingStore {
    tx: Arc<watch::Sender<LastReading>>,
}

impl ReadingStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LastReading::default());
        Self { tx: Arc::new(tx) }
    }

    /// Copy of the current snapshot.
    pub fn current(&self) -> LastReading {
        self.tx.borrow().clone()
    }

    /// Replace the snapshot.
    pub fn replace(&self, reading: LastReading) {
        self.tx.send_replace(reading);
    }

    /// Receiver notified on every replacement.
    pub fn subscribe(&self) -> watch::Receiver<LastReading> {
        self.tx.subscribe()
    }
}

impl Default for ReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to the sensor. Reads run on the blocking pool.
pub type SharedSensor = Arc<Mutex<Box<dyn ClimateSensor>>>;

/// Read → dew point → publish → snapshot.
pub struct ReadingPipeline {
    sensor: SharedSensor,
    publisher: Arc<dyn Publisher>,
    topic: String,
    store: ReadingStore,
    sensor_timeout: Duration,
}

impl ReadingPipeline {
    pub fn new(
        sensor: Box<dyn ClimateSensor>,
        publisher: Arc<dyn Publisher>,
        topic: impl Into<String>,
        store: ReadingStore,
    ) -> Self {
        Self {
            sensor: Arc::new(Mutex::new(sensor)),
            publisher,
            topic: topic.into(),
            store,
            sensor_timeout: Duration::from_secs(crate::DEFAULT_SENSOR_TIMEOUT_SECS),
        }
    }

    /// Set the upper bound for one sensor read.
    pub fn with_sensor_timeout(mut self, timeout: Duration) -> Self {
        self.sensor_timeout = timeout;
        self
    }

    pub fn store(&self) -> &ReadingStore {
        &self.store
    }

    /// Read the sensor on the blocking pool, bounded by the sensor timeout.
    ///
    /// A read still stuck from an earlier cycle makes this one fail instead of
    /// queueing behind it.
    pub async fn measure(&self) -> Result<Measurement> {
        let shared = Arc::clone(&self.sensor);
        let read = tokio::task::spawn_blocking(move || {
            let mut sensor = match shared.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    return Err(NodeError::sensor_read("previous read still in progress"))
                }
            };
            sensor.measure()
        });

        match time::timeout(self.sensor_timeout, read).await {
            Ok(Ok(result)) => result.map_err(|e| match e {
                NodeError::SensorReadFailure(_) => e,
                other => NodeError::sensor_read(other.to_string()),
            }),
            Ok(Err(join_error)) => Err(NodeError::sensor_read(join_error.to_string())),
            Err(_) => Err(NodeError::sensor_read(format!(
                "no answer within {:?}",
                self.sensor_timeout
            ))),
        }
    }

    /// Run one full cycle.
    ///
    /// A failed sensor read ends the cycle with the snapshot untouched. A
    /// failed publish only shows up in the snapshot's message.
    pub async fn run_cycle(&self) -> Result<LastReading> {
        let measurement = self.measure().await?;
        let measured_at = Utc::now();

        let temperature = round_to(measurement.temperature, 2);
        let humidity = round_to(measurement.humidity, 1);
        let dewpoint = match calc_dewpoint(temperature, humidity) {
            Ok(dewpoint) => Some(round_to(dewpoint, 1)),
            Err(e) => {
                warn!("No dew point for this reading: {}", e);
                None
            }
        };

        info!(
            "reading HDC1080 {{ temperature: {} C, humidity: {} %, dewpoint: {} }}",
            temperature,
            humidity,
            dewpoint.map_or_else(|| "n/a".to_string(), |d| format!("{:.1}", d))
        );

        let mut reading = LastReading {
            temperature,
            humidity,
            dewpoint,
            message: String::new(),
            measured_at: Some(measured_at),
        };

        reading.message = match self.publish(&reading).await {
            Ok(()) => format!("measured at: {}", Local::now().format("%H:%M:%S")),
            Err(e) => {
                error!("Failed to publish climate data: {}", e);
                format!("failed to send climate data: {}", e)
            }
        };

        self.store.replace(reading.clone());
        Ok(reading)
    }

    async fn publish(&self, reading: &LastReading) -> Result<()> {
        let payload = serde_json::to_vec(&reading.payload())
            .map_err(|e| NodeError::publish(format!("Failed to serialize payload: {}", e)))?;
        self.publisher.publish(&self.topic, &payload).await?;
        debug!("published climate to {}", self.topic);
        Ok(())
    }
}

/// Run the pipeline every `interval` until `stop` flips to `true`.
///
/// The first cycle starts immediately. A cycle that overruns its slot causes
/// the missed ticks to be skipped rather than run back to back. A stop seen
/// together with a due tick wins, so no cycle starts after the stop.
pub fn spawn_schedule(
    pipeline: Arc<ReadingPipeline>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = pipeline.run_cycle().await {
                error!("Reading cycle failed: {}", e);
            }
        }

        info!("Sensor schedule stopped");
    })
}

/// Ask the schedule to stop and wait at most `grace` for it.
///
/// A cycle still running after `grace` is aborted. Returns `true` when the
/// schedule finished on its own.
pub async fn stop_schedule(
    schedule: JoinHandle<()>,
    stop: &watch::Sender<bool>,
    grace: Duration,
) -> bool {
    let _ = stop.send(true);
    let abort = schedule.abort_handle();

    match time::timeout(grace, schedule).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!("Sensor schedule ended abnormally: {}", e);
            false
        }
        Err(_) => {
            warn!("Sensor schedule still busy after {:?}, aborting it", grace);
            abort.abort();
            false
        }
    }
}
