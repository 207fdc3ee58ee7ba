use std::collections::HashMap;

use uuid::Uuid;

use crate::demand::DemandRequest;

/// One demand as the admin sees it.
#[derive(Debug, Clone)]
pub struct DemandEntry {
    pub request: DemandRequest,
    pub claimed_by: Option<String>,
}

/// Demand-side bookkeeping: open demands wait for a winner, a claim closes a
/// demand exactly once. The second claimant is refused, which is how a
/// split-brain double win would surface.
#[derive(Debug, Default)]
pub struct DemandBook {
    demands: HashMap<Uuid, DemandEntry>,
}

impl DemandBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, request: DemandRequest) {
        tracing::info!(
            request_id = %request.id,
            amount_kwh = request.amount_kwh,
            "Demand recorded"
        );
        self.demands.insert(
            request.id,
            DemandEntry {
                request,
                claimed_by: None,
            },
        );
    }

    /// Record a winner claim. Returns false for an unknown demand or one
    /// already claimed by anyone (including the same plant again).
    pub fn claim(&mut self, request_id: Uuid, plant_id: &str) -> bool {
        match self.demands.get_mut(&request_id) {
            Some(entry) => match &entry.claimed_by {
                Some(owner) => {
                    tracing::warn!(
                        request_id = %request_id,
                        owner = %owner,
                        claimant = plant_id,
                        "Refused claim on an already-claimed demand"
                    );
                    false
                }
                None => {
                    entry.claimed_by = Some(plant_id.to_string());
                    tracing::info!(request_id = %request_id, plant_id, "Demand claimed");
                    true
                }
            },
            None => {
                tracing::warn!(request_id = %request_id, plant_id, "Claim for unknown demand");
                false
            }
        }
    }

    /// Demands not yet claimed, oldest first. Replayed to late subscribers.
    pub fn open(&self) -> Vec<DemandRequest> {
        let mut open: Vec<DemandRequest> = self
            .demands
            .values()
            .filter(|e| e.claimed_by.is_none())
            .map(|e| e.request.clone())
            .collect();
        open.sort_by_key(|r| r.created_at);
        open
    }

    pub fn all(&self) -> Vec<DemandEntry> {
        let mut all: Vec<DemandEntry> = self.demands.values().cloned().collect();
        all.sort_by_key(|e| e.request.created_at);
        all
    }
}
