use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::election::dispatcher::TokenDispatcher;
use crate::election::shared::SharedPlant;
use crate::election::state::PlantStatus;
use crate::grpc::AdminLink;

/// Everything a production run needs besides the demand itself.
#[derive(Clone)]
pub struct ProductionEnv {
    pub shared: Arc<SharedPlant>,
    pub admin: AdminLink,
    pub dispatcher: Arc<TokenDispatcher>,
}

/// The won demand: what to produce and for how long.
#[derive(Debug, Clone)]
pub struct ProductionJob {
    pub request_id: Uuid,
    pub amount_kwh: f64,
}

pub fn spawn(env: ProductionEnv, job: ProductionJob) {
    tokio::spawn(run(env, job));
}

/// The winner's obligation: claim the demand so every other plant stands
/// down, simulate the work, then rejoin the pool.
pub async fn run(env: ProductionEnv, job: ProductionJob) {
    let plant_id = {
        let mut state = env.shared.lock().await;
        state.status = PlantStatus::Producing;
        state.current_request = Some(job.request_id);
        state.plant_id().to_string()
    };

    tracing::info!(
        request_id = %job.request_id,
        amount_kwh = job.amount_kwh,
        "Production started"
    );

    match env.admin.publish_claim(job.request_id, &plant_id).await {
        Ok(true) => {
            tracing::debug!(request_id = %job.request_id, "Demand claim acknowledged");
        }
        Ok(false) => {
            tracing::warn!(
                request_id = %job.request_id,
                "Demand was already claimed elsewhere, producing anyway"
            );
        }
        Err(e) => {
            tracing::warn!(
                request_id = %job.request_id,
                error = %e,
                "Claim publication failed, demand source keeps its bookkeeping"
            );
        }
    }

    // Work time scales directly with the demanded energy: one ms per kWh.
    let duration = Duration::from_millis(job.amount_kwh.round().max(0.0) as u64);
    tokio::time::sleep(duration).await;

    {
        let mut state = env.shared.lock().await;
        state.reset_after_production();
    }
    tracing::info!(request_id = %job.request_id, "Production completed, plant idle");

    env.dispatcher.on_production_finished().await;
}
