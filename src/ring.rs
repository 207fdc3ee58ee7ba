use std::sync::Arc;

use crate::config::PlantDescriptor;
use crate::election::shared::SharedPlant;
use crate::election::state::RingUpdate;
use crate::error::{GridError, Result};
use crate::grpc::{descriptor_to_proto, PlantClient};
use crate::proto;

/// Keeps the neighbor links consistent as plants join. Introductions flood
/// successor-to-successor around the ring and terminate when the next hop is
/// the inserted plant itself. Every link swap runs under the per-plant
/// topology gate, so in-flight elections observe either the old ring or the
/// new one.
pub struct RingMaintainer {
    shared: Arc<SharedPlant>,
    client: Arc<PlantClient>,
}

impl RingMaintainer {
    pub fn new(shared: Arc<SharedPlant>, client: Arc<PlantClient>) -> Arc<Self> {
        Arc::new(Self { shared, client })
    }

    /// Handle one hop of an introduce flood: adjust the local links if this
    /// plant borders the insertion point, then keep the flood moving.
    pub async fn handle_introduce(
        &self,
        candidate: PlantDescriptor,
        propagator_id: &str,
        successor_hint: &str,
        predecessor_hint: &str,
    ) -> String {
        tracing::info!(
            candidate_id = %candidate.plant_id,
            propagator_id,
            successor_hint,
            predecessor_hint,
            "Received introduction"
        );

        let (update, my_id, propagate_to) = self
            .shared
            .mutate_topology(|state| {
                let update = state.apply_introduce(&candidate, successor_hint, predecessor_hint);
                let propagate_to = if state.should_propagate_introduce(&candidate.plant_id) {
                    state.next.clone()
                } else {
                    None
                };
                (update, state.plant_id().to_string(), propagate_to)
            })
            .await;

        if update != RingUpdate::Unchanged {
            tracing::info!(candidate_id = %candidate.plant_id, update = ?update, "Ring links updated");
        }

        if let Some(next) = propagate_to {
            let request = proto::IntroduceRequest {
                plant: Some(descriptor_to_proto(&candidate)),
                propagator_id: my_id.clone(),
                successor_hint: successor_hint.to_string(),
                predecessor_hint: predecessor_hint.to_string(),
            };
            self.client.spawn_introduce(next, request);
        }

        match update {
            RingUpdate::Unchanged => format!(
                "Hi plant {} welcome! I am plant {}",
                candidate.plant_id, my_id
            ),
            _ => format!(
                "Hi plant {} welcome. I changed my neighbors! I am plant {}",
                candidate.plant_id, my_id
            ),
        }
    }

    /// Announce this plant to the ring it was registered into: one introduce
    /// to the assigned successor, carrying the registry's neighbor claims.
    /// The flood does the rest.
    pub async fn introduce_self(&self) -> Result<()> {
        let (me, successor, predecessor) = {
            let state = self.shared.lock().await;
            (state.descriptor.clone(), state.next.clone(), state.prev.clone())
        };
        let (successor, predecessor) = match (successor, predecessor) {
            (Some(successor), Some(predecessor)) => (successor, predecessor),
            _ => {
                return Err(GridError::Internal(
                    "introduce_self on a plant without neighbors".to_string(),
                ))
            }
        };

        let request = proto::IntroduceRequest {
            plant: Some(descriptor_to_proto(&me)),
            propagator_id: me.plant_id.clone(),
            successor_hint: successor.plant_id.clone(),
            predecessor_hint: predecessor.plant_id.clone(),
        };

        let reply = self.client.introduce(&successor, request).await?;
        tracing::info!(
            successor_id = %successor.plant_id,
            reply,
            "Introduced to ring"
        );
        Ok(())
    }
}
