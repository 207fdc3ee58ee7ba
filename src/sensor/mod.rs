pub mod simulator;
pub mod window;

pub use simulator::Co2Sensor;
pub use window::{Measurement, SlidingWindow, WindowBuffer};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::SensorConfig;
use crate::grpc::AdminLink;

/// Wire up the three sensor tasks for one plant: sampler -> window buffer ->
/// averager, plus the periodic telemetry reporter. Everything stops with the
/// node's cancellation token.
pub fn spawn_pipeline(
    config: SensorConfig,
    plant_id: String,
    admin: AdminLink,
    cancel: CancellationToken,
) {
    let buffer = Arc::new(WindowBuffer::new(config.window_size));
    let averages: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));

    // Sampler: one Gaussian reading per interval.
    {
        let buffer = buffer.clone();
        let cancel = cancel.clone();
        let sensor = Co2Sensor::new(config.mean, config.variance);
        let mut interval = tokio::time::interval(Duration::from_millis(config.sample_interval_ms));
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        buffer.add(Measurement::new(sensor.sample())).await;
                    }
                }
            }
        });
    }

    // Averager: drain full windows, accumulate sliding averages.
    {
        let buffer = buffer.clone();
        let averages = averages.clone();
        let cancel = cancel.clone();
        let mut window = SlidingWindow::new(config.window_size, config.window_step);
        tokio::spawn(async move {
            loop {
                let batch = tokio::select! {
                    _ = cancel.cancelled() => break,
                    batch = buffer.read_all_and_clear() => batch,
                };
                let fresh = window.absorb(batch);
                if !fresh.is_empty() {
                    averages.lock().await.extend(fresh);
                }
            }
        });
    }

    // Reporter: ship accumulated averages to the admin, empty batches skipped.
    {
        let cancel = cancel.clone();
        let mut interval =
            tokio::time::interval(Duration::from_secs(config.report_interval_secs.max(1)));
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let batch: Vec<f64> = {
                            let mut averages = averages.lock().await;
                            std::mem::take(&mut *averages)
                        };
                        if batch.is_empty() {
                            continue;
                        }
                        match admin.publish_pollution(&plant_id, batch).await {
                            Ok(()) => tracing::debug!("Pollution averages reported"),
                            Err(e) => tracing::warn!(error = %e, "Pollution report failed"),
                        }
                    }
                }
            }
        });
    }
}
