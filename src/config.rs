use std::net::SocketAddr;

/// Identity and wire location of a plant, passed around by value.
///
/// Nodes never hold live references to each other: a descriptor is everything
/// a peer needs to be reached (address + port) and compared (id + tiebreak).
/// The `tiebreak` is a numeric field distinct from the display id, used only
/// to break equal-bid elections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlantDescriptor {
    pub plant_id: String,
    pub tiebreak: u64,
    pub address: String,
    pub port: u16,
}

impl PlantDescriptor {
    pub fn new(plant_id: impl Into<String>, tiebreak: u64, address: impl Into<String>, port: u16) -> Self {
        Self {
            plant_id: plant_id.into(),
            tiebreak,
            address: address.into(),
            port,
        }
    }

    /// URI the tonic channel for this plant connects to.
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

/// Sensor sampling and reporting parameters.
///
/// Defaults mirror the physical simulation: a CO2 reading every 2 s around a
/// mean of 125 000 with variance 5000, averaged over sliding windows of 8
/// with 50% overlap, reported every 10 s.
#[derive(Debug, Clone)]
pub struct SensorConfig {
    pub sample_interval_ms: u64,
    pub window_size: usize,
    pub window_step: usize,
    pub report_interval_secs: u64,
    pub mean: f64,
    pub variance: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 2000,
            window_size: 8,
            window_step: 4,
            report_interval_secs: 10,
            mean: 125_000.0,
            variance: 5000.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlantConfig {
    pub plant_id: String,
    pub tiebreak: u64,
    pub listen_addr: SocketAddr,
    /// Address other plants use to reach this node (goes into the descriptor).
    pub advertise_address: String,
    pub admin_addr: String,
    /// Simulated per-token evaluation latency.
    pub evaluation_delay_ms: u64,
    /// Bounded wait for a token send to be acknowledged by the successor.
    pub send_timeout_secs: u64,
    /// Bounded wait for an introduce propagation hop.
    pub introduce_timeout_secs: u64,
    pub sensor: SensorConfig,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            plant_id: "1".to_string(),
            tiebreak: 1,
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:50051"
                .parse()
                .expect("default listen address is valid"),
            advertise_address: "127.0.0.1".to_string(),
            admin_addr: "http://127.0.0.1:8080".to_string(),
            evaluation_delay_ms: 3000,
            send_timeout_secs: 15,
            introduce_timeout_secs: 10,
            sensor: SensorConfig::default(),
        }
    }
}

impl PlantConfig {
    pub fn new(plant_id: impl Into<String>, tiebreak: u64, listen_addr: SocketAddr) -> Self {
        Self {
            plant_id: plant_id.into(),
            tiebreak,
            listen_addr,
            ..Default::default()
        }
    }

    /// Descriptor this node registers and introduces itself with.
    pub fn descriptor(&self) -> PlantDescriptor {
        PlantDescriptor {
            plant_id: self.plant_id.clone(),
            tiebreak: self.tiebreak,
            address: self.advertise_address.clone(),
            port: self.listen_addr.port(),
        }
    }
}

/// Derive the numeric tiebreak for a plant id: an explicit value wins,
/// otherwise the id itself must parse as an integer (the historical scheme).
pub fn resolve_tiebreak(plant_id: &str, explicit: Option<u64>) -> Option<u64> {
    explicit.or_else(|| plant_id.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_endpoint() {
        let d = PlantDescriptor::new("7", 7, "10.0.0.3", 50057);
        assert_eq!(d.endpoint(), "http://10.0.0.3:50057");
    }

    #[test]
    fn sensor_config_default() {
        let cfg = SensorConfig::default();
        assert_eq!(cfg.sample_interval_ms, 2000);
        assert_eq!(cfg.window_size, 8);
        assert_eq!(cfg.window_step, 4);
        assert_eq!(cfg.report_interval_secs, 10);
    }

    #[test]
    fn plant_config_default() {
        let cfg = PlantConfig::default();
        assert_eq!(cfg.plant_id, "1");
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:50051");
        assert_eq!(cfg.evaluation_delay_ms, 3000);
        assert_eq!(cfg.send_timeout_secs, 15);
    }

    #[test]
    fn plant_config_descriptor() {
        let addr: SocketAddr = "0.0.0.0:50099".parse().unwrap();
        let mut cfg = PlantConfig::new("west-9", 9, addr);
        cfg.advertise_address = "plant-west".to_string();
        let d = cfg.descriptor();
        assert_eq!(d.plant_id, "west-9");
        assert_eq!(d.tiebreak, 9);
        assert_eq!(d.address, "plant-west");
        assert_eq!(d.port, 50099);
    }

    #[test]
    fn tiebreak_explicit_wins() {
        assert_eq!(resolve_tiebreak("3", Some(42)), Some(42));
    }

    #[test]
    fn tiebreak_falls_back_to_numeric_id() {
        assert_eq!(resolve_tiebreak("17", None), Some(17));
    }

    #[test]
    fn tiebreak_missing_for_non_numeric_id() {
        assert_eq!(resolve_tiebreak("alpha", None), None);
    }
}
