use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::demand::DemandQueue;
use crate::election::dispatcher::TokenDispatcher;
use crate::election::shared::SharedPlant;
use crate::election::state::ElectionToken;
use crate::grpc::PlantClient;
use crate::production::{self, ProductionEnv, ProductionJob};

/// Starts this plant's own elections: waits for the dispatcher's permit,
/// takes the oldest queued demand and opens the auction towards the current
/// successor. A plant alone in the ring skips the token protocol and goes
/// straight to production.
pub struct ElectionInitiator {
    shared: Arc<SharedPlant>,
    demand_queue: Arc<DemandQueue>,
    dispatcher: Arc<TokenDispatcher>,
    client: Arc<PlantClient>,
    production_env: ProductionEnv,
}

impl ElectionInitiator {
    pub fn new(
        shared: Arc<SharedPlant>,
        demand_queue: Arc<DemandQueue>,
        dispatcher: Arc<TokenDispatcher>,
        client: Arc<PlantClient>,
        production_env: ProductionEnv,
    ) -> Self {
        Self {
            shared,
            demand_queue,
            dispatcher,
            client,
            production_env,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.next_election() => {}
            }
        }
        tracing::info!("Election initiator stopped");
    }

    async fn next_election(&self) {
        self.dispatcher.start_signal().acquire().await;
        let demand = self.demand_queue.take().await;

        let (successor, token) = {
            let mut state = self.shared.lock_settled().await;
            match state.start_election(demand.id) {
                Some(successor) => {
                    let token = ElectionToken::opening(
                        &state.descriptor,
                        demand.id,
                        state.current_bid,
                        demand.amount_kwh,
                    );
                    tracing::info!(
                        request_id = %demand.id,
                        amount_kwh = demand.amount_kwh,
                        bid = state.current_bid,
                        successor_id = %successor.plant_id,
                        "Starting election"
                    );
                    (Some(successor), Some(token))
                }
                None => {
                    tracing::info!(
                        request_id = %demand.id,
                        amount_kwh = demand.amount_kwh,
                        "Plant is alone, claiming demand without election"
                    );
                    (None, None)
                }
            }
        };

        match (successor, token) {
            (Some(successor), Some(token)) => {
                // Detached send with a bounded wait; a dead successor stalls
                // this election, it never blocks the initiator.
                self.client.spawn_send(successor, token);
            }
            _ => {
                production::spawn(
                    self.production_env.clone(),
                    ProductionJob {
                        request_id: demand.id,
                        amount_kwh: demand.amount_kwh,
                    },
                );
            }
        }
    }
}
