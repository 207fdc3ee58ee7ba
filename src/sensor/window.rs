use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};

/// A single sensor reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

impl Measurement {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            recorded_at: Utc::now(),
        }
    }
}

/// Buffer between the sensor and the averaging stage: readers block until at
/// least one full window of measurements has accumulated, then drain the
/// whole buffer. Single consumer, so `Notify`'s stored permit is enough.
pub struct WindowBuffer {
    min_fill: usize,
    measurements: Mutex<Vec<Measurement>>,
    filled: Notify,
}

impl WindowBuffer {
    pub fn new(min_fill: usize) -> Self {
        Self {
            min_fill,
            measurements: Mutex::new(Vec::new()),
            filled: Notify::new(),
        }
    }

    pub async fn add(&self, measurement: Measurement) {
        let mut measurements = self.measurements.lock().await;
        measurements.push(measurement);
        if measurements.len() >= self.min_fill {
            self.filled.notify_one();
        }
    }

    /// Wait for a full window, then take everything.
    pub async fn read_all_and_clear(&self) -> Vec<Measurement> {
        loop {
            let notified = self.filled.notified();
            {
                let mut measurements = self.measurements.lock().await;
                if measurements.len() >= self.min_fill {
                    return std::mem::take(&mut *measurements);
                }
            }
            notified.await;
        }
    }
}

/// Sliding-window averager: windows of `size` measurements advancing by
/// `step` (50% overlap with the default 8/4). Measurements are kept in
/// timestamp order; a partial window stays buffered for the next batch.
pub struct SlidingWindow {
    size: usize,
    step: usize,
    measurements: Vec<Measurement>,
}

impl SlidingWindow {
    pub fn new(size: usize, step: usize) -> Self {
        Self {
            size,
            step,
            measurements: Vec::new(),
        }
    }

    /// Absorb a batch and return the averages of every full window it
    /// completes.
    pub fn absorb(&mut self, batch: Vec<Measurement>) -> Vec<f64> {
        self.measurements.extend(batch);
        self.measurements.sort_by_key(|m| m.recorded_at);

        let mut averages = Vec::new();
        while self.measurements.len() >= self.size {
            let window = &self.measurements[..self.size];
            let sum: f64 = window.iter().map(|m| m.value).sum();
            averages.push(sum / self.size as f64);
            self.measurements.drain(..self.step);
        }
        averages
    }

    pub fn buffered(&self) -> usize {
        self.measurements.len()
    }
}
