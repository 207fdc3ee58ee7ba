use rand::Rng;

/// Simulated CO2 probe: Gaussian readings around the configured mean.
pub struct Co2Sensor {
    mean: f64,
    std_dev: f64,
}

impl Co2Sensor {
    pub fn new(mean: f64, variance: f64) -> Self {
        Self {
            mean,
            std_dev: variance.max(0.0).sqrt(),
        }
    }

    /// One reading. Box-Muller over two uniforms; the second variate is
    /// discarded.
    pub fn sample(&self) -> f64 {
        let mut rng = rand::thread_rng();
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen::<f64>();
        let gaussian = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        self.mean + self.std_dev * gaussian
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_cluster_around_the_mean() {
        let sensor = Co2Sensor::new(125_000.0, 5000.0);
        let n = 5000;
        let total: f64 = (0..n).map(|_| sensor.sample()).sum();
        let mean = total / n as f64;
        // std dev is ~70.7, so the sample mean over 5000 draws sits well
        // within +-20 of the true mean.
        assert!((mean - 125_000.0).abs() < 20.0, "sample mean drifted: {mean}");
    }

    #[test]
    fn zero_variance_is_constant() {
        let sensor = Co2Sensor::new(42.0, 0.0);
        for _ in 0..10 {
            assert_eq!(sensor.sample(), 42.0);
        }
    }
}
