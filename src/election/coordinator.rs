use std::sync::Arc;
use std::time::Duration;

use crate::election::shared::SharedPlant;
use crate::election::state::{Action, ElectionToken};
use crate::grpc::PlantClient;
use crate::production::ProductionJob;

/// How an evaluation left the election at this node, reported back to the
/// token's sender in the ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The election keeps circulating (forwarded, bid replaced, announced).
    InProgress,
    /// This node is done with the request (relayed the winner, dropped a
    /// stray announcement, or won).
    Ended,
}

/// Result of processing one token: the wire outcome, a human-readable note
/// for the ack, and the production job when this plant won.
#[derive(Debug)]
pub struct Evaluated {
    pub outcome: Outcome,
    pub message: String,
    pub won: Option<ProductionJob>,
}

/// Executes the election decision for one inbound token: simulated
/// processing latency, the pure state transition under the topology gate,
/// then the decided forward as a detached send.
pub struct ElectionCoordinator {
    shared: Arc<SharedPlant>,
    client: Arc<PlantClient>,
    evaluation_delay: Duration,
}

impl ElectionCoordinator {
    pub fn new(shared: Arc<SharedPlant>, client: Arc<PlantClient>, evaluation_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            shared,
            client,
            evaluation_delay,
        })
    }

    pub async fn process_token(&self, token: &ElectionToken) -> Evaluated {
        // Simulated per-token processing latency; not a correctness knob.
        if !self.evaluation_delay.is_zero() {
            tokio::time::sleep(self.evaluation_delay).await;
        }

        let (action, forward, successor, amount) = {
            let mut state = self.shared.lock_settled().await;
            let action = state.evaluate(token);
            let forward = match &action {
                Action::ForwardUnchanged => Some(token.clone()),
                Action::ForwardWithOwnBid { bid } => Some(token.with_own_bid(&state.descriptor, *bid)),
                Action::AnnounceWin => Some(token.as_elected()),
                Action::ForwardElected => Some(token.clone()),
                Action::Drop | Action::IWon => None,
            };
            (action, forward, state.next.clone(), token.amount_kwh)
        };

        tracing::info!(
            request_id = %token.request_id,
            sender_id = %token.sender_id,
            kind = %token.kind,
            bid = token.bid_price,
            action = ?action,
            "Token evaluated"
        );

        if let Some(next_token) = forward {
            match successor {
                Some(successor) => self.client.spawn_send(successor, next_token),
                None => {
                    tracing::warn!(
                        request_id = %token.request_id,
                        "No successor in ring, election hop terminates here"
                    );
                }
            }
        }

        match action {
            Action::ForwardUnchanged => Evaluated {
                outcome: Outcome::InProgress,
                message: "forwarded original".to_string(),
                won: None,
            },
            Action::ForwardWithOwnBid { bid } => Evaluated {
                outcome: Outcome::InProgress,
                message: format!("bid replaced with {bid:.2}"),
                won: None,
            },
            Action::AnnounceWin => Evaluated {
                outcome: Outcome::InProgress,
                message: "announcing winner".to_string(),
                won: None,
            },
            Action::ForwardElected => Evaluated {
                outcome: Outcome::Ended,
                message: "winner relayed".to_string(),
                won: None,
            },
            Action::Drop => Evaluated {
                outcome: Outcome::Ended,
                message: "token dropped, election already terminated".to_string(),
                won: None,
            },
            Action::IWon => Evaluated {
                outcome: Outcome::Ended,
                message: "election won".to_string(),
                won: Some(ProductionJob {
                    request_id: token.request_id,
                    amount_kwh: amount,
                }),
            },
        }
    }
}
