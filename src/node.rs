use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::PlantConfig;
use crate::demand::DemandQueue;
use crate::election::{ElectionCoordinator, ElectionInitiator, SharedPlant, TokenDispatcher};
use crate::error::Result;
use crate::grpc::{self, AdminLink, PlantClient, PlantGrpcService, Registration};
use crate::production::ProductionEnv;
use crate::proto;
use crate::ring::RingMaintainer;
use crate::sensor;

/// A fully wired plant node. `bootstrap` registers with the admin and links
/// the components; `run` brings the subsystems up and serves until shutdown.
pub struct PlantNode {
    pub config: PlantConfig,
    pub shared: Arc<SharedPlant>,
    pub demand_queue: Arc<DemandQueue>,
    pub dispatcher: Arc<TokenDispatcher>,
    pub coordinator: Arc<ElectionCoordinator>,
    pub ring: Arc<RingMaintainer>,
    pub client: Arc<PlantClient>,
    pub admin: AdminLink,
    registration: Registration,
}

impl PlantNode {
    /// Register with the administration server and build the node. A
    /// duplicate plant id surfaces as `GridError::DuplicateId`; the caller
    /// picks a new one, nothing is auto-generated.
    pub async fn bootstrap(config: PlantConfig) -> Result<Self> {
        let admin = AdminLink::new(config.admin_addr.clone());
        let descriptor = config.descriptor();

        tracing::info!(
            plant_id = %descriptor.plant_id,
            admin = %config.admin_addr,
            "Registering with administration server"
        );
        let registration = admin.register(&descriptor).await?;

        let shared = SharedPlant::new(descriptor);
        match &registration {
            Registration::Alone => {
                tracing::info!("First plant in the network, running alone");
            }
            Registration::Ring {
                predecessor,
                successor,
            } => {
                tracing::info!(
                    successor_id = %successor.plant_id,
                    predecessor_id = %predecessor.plant_id,
                    "Joining ring"
                );
                let (next, prev) = (successor.clone(), predecessor.clone());
                shared
                    .mutate_topology(move |state| {
                        state.next = Some(next);
                        state.prev = Some(prev);
                    })
                    .await;
            }
        }

        let client = PlantClient::new(
            Duration::from_secs(config.send_timeout_secs),
            Duration::from_secs(config.introduce_timeout_secs),
        );
        let demand_queue = Arc::new(DemandQueue::new());
        let dispatcher = TokenDispatcher::new(shared.clone(), demand_queue.clone());
        let coordinator = ElectionCoordinator::new(
            shared.clone(),
            client.clone(),
            Duration::from_millis(config.evaluation_delay_ms),
        );
        let ring = RingMaintainer::new(shared.clone(), client.clone());

        Ok(Self {
            config,
            shared,
            demand_queue,
            dispatcher,
            coordinator,
            ring,
            client,
            admin,
            registration,
        })
    }

    fn production_env(&self) -> ProductionEnv {
        ProductionEnv {
            shared: self.shared.clone(),
            admin: self.admin.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }

    /// Bring the node up and serve until the token is cancelled:
    ///
    /// 1. Bind the peer gRPC endpoint (so the ring can reach us).
    /// 2. Start the dispatcher worker and the election initiator.
    /// 3. Start the sensor pipeline and the demand-stream subscriber.
    /// 4. Introduce this plant to its assigned successor, if any.
    /// 5. Serve the plant gRPC service (blocks).
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let incoming = grpc::server::bind(self.config.listen_addr).await?;
        tracing::info!(
            plant_id = %self.config.plant_id,
            listen_addr = %self.config.listen_addr,
            "Plant node starting"
        );

        self.dispatcher
            .start(self.coordinator.clone(), self.production_env(), shutdown.clone())
            .await;

        let initiator = ElectionInitiator::new(
            self.shared.clone(),
            self.demand_queue.clone(),
            self.dispatcher.clone(),
            self.client.clone(),
            self.production_env(),
        );
        {
            let cancel = shutdown.clone();
            tokio::spawn(async move {
                initiator.run(cancel).await;
            });
        }

        sensor::spawn_pipeline(
            self.config.sensor.clone(),
            self.config.plant_id.clone(),
            self.admin.clone(),
            shutdown.clone(),
        );

        {
            let admin = self.admin.clone();
            let plant_id = self.config.plant_id.clone();
            let queue = self.demand_queue.clone();
            let cancel = shutdown.clone();
            tokio::spawn(async move {
                demand_feed(admin, plant_id, queue, cancel).await;
            });
        }

        let service = PlantGrpcService::new(
            self.shared.clone(),
            self.dispatcher.clone(),
            self.ring.clone(),
            self.demand_queue.clone(),
        );

        // The server socket is already bound, so the flood triggered by this
        // introduction can reach back to us.
        if matches!(self.registration, Registration::Ring { .. }) {
            let ring = self.ring.clone();
            tokio::spawn(async move {
                if let Err(e) = ring.introduce_self().await {
                    tracing::warn!(error = %e, "Failed to introduce to ring");
                }
            });
        }

        grpc::server::serve_plant(incoming, service, shutdown).await
    }
}

/// Subscribe to the admin demand stream and keep the outbound queue in sync:
/// new demands are queued, claimed demands are purged. The subscription
/// itself is re-established after transport hiccups; individual events are
/// never replayed.
async fn demand_feed(
    admin: AdminLink,
    plant_id: String,
    queue: Arc<DemandQueue>,
    cancel: CancellationToken,
) {
    loop {
        match admin.subscribe_demands(&plant_id).await {
            Ok(mut stream) => loop {
                let message = tokio::select! {
                    _ = cancel.cancelled() => return,
                    message = stream.message() => message,
                };
                match message {
                    Ok(Some(event)) => handle_demand_event(event, &queue).await,
                    Ok(None) => {
                        tracing::warn!("Demand stream closed by admin");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Demand stream error");
                        break;
                    }
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Demand stream unavailable");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(5)) => {}
        }
    }
}

async fn handle_demand_event(event: proto::DemandEvent, queue: &DemandQueue) {
    match event.event {
        Some(proto::demand_event::Event::NewDemand(demand)) => {
            let Ok(request_id) = uuid::Uuid::parse_str(&demand.request_id) else {
                tracing::warn!(request_id = %demand.request_id, "Demand with bad id ignored");
                return;
            };
            let created_at = chrono::TimeZone::timestamp_millis_opt(&chrono::Utc, demand.created_at_ms)
                .single()
                .unwrap_or_else(chrono::Utc::now);
            tracing::info!(
                request_id = %request_id,
                amount_kwh = demand.amount_kwh,
                "Demand received"
            );
            queue
                .put(crate::demand::DemandRequest::with_id(
                    request_id,
                    created_at,
                    demand.amount_kwh,
                ))
                .await;
        }
        Some(proto::demand_event::Event::Claimed(claimed)) => {
            if let Ok(request_id) = uuid::Uuid::parse_str(&claimed.request_id) {
                tracing::debug!(
                    request_id = %request_id,
                    winner = %claimed.plant_id,
                    "Demand claimed elsewhere"
                );
                queue.remove_by_id(request_id).await;
            }
        }
        None => {}
    }
}
