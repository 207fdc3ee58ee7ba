pub mod book;
pub mod dashboard;
pub mod registry;
pub mod service;

pub use book::DemandBook;
pub use registry::PlantRegistry;
pub use service::{AdminGrpcService, AdminShared};

use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::demand::DemandRequest;
use crate::error::Result;
use crate::proto::admin_service_server::AdminServiceServer;

/// Configuration for the admin process.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub listen_addr: SocketAddr,
    pub dashboard_addr: Option<SocketAddr>,
    /// When set, random demands are generated on this interval.
    pub generate_interval: Option<Duration>,
    pub min_amount_kwh: f64,
    pub max_amount_kwh: f64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "0.0.0.0:8080".parse().expect("default admin address is valid"),
            dashboard_addr: None,
            generate_interval: None,
            min_amount_kwh: 5000.0,
            max_amount_kwh: 15000.0,
        }
    }
}

/// Run the admin server: registry, demand bus, telemetry sink, and the
/// optional generator/dashboard side-tasks.
pub async fn run_admin(config: AdminConfig, shutdown: CancellationToken) -> Result<()> {
    let shared = AdminShared::new();

    if let Some(interval) = config.generate_interval {
        let shared = shared.clone();
        let cancel = shutdown.clone();
        let (min, max) = (config.min_amount_kwh, config.max_amount_kwh);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick would fire before any plant is up.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let amount = rand::thread_rng().gen_range(min..=max).round();
                        let demand = DemandRequest::new(amount);
                        tracing::info!(
                            request_id = %demand.id,
                            amount_kwh = amount,
                            "Generated demand"
                        );
                        shared.submit_demand(demand).await;
                    }
                }
            }
        });
    }

    if let Some(dashboard_addr) = config.dashboard_addr {
        let state = dashboard::DashboardState {
            shared: shared.clone(),
        };
        tokio::spawn(async move {
            dashboard::run_dashboard(dashboard_addr, state).await;
        });
    }

    tracing::info!(addr = %config.listen_addr, "Starting admin gRPC server");
    Server::builder()
        .add_service(AdminServiceServer::new(AdminGrpcService::new(shared)))
        .serve_with_shutdown(config.listen_addr, shutdown.cancelled_owned())
        .await?;
    Ok(())
}
