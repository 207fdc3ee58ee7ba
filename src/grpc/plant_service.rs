use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::demand::DemandQueue;
use crate::election::coordinator::Outcome;
use crate::election::dispatcher::{Submission, TokenDispatcher};
use crate::election::shared::SharedPlant;
use crate::error::GridError;
use crate::grpc::{descriptor_from_proto, token_from_proto};
use crate::proto;
use crate::proto::plant_service_server::PlantService;
use crate::ring::RingMaintainer;

/// Plant-facing gRPC surface: ring introductions, election tokens, status.
pub struct PlantGrpcService {
    shared: Arc<SharedPlant>,
    dispatcher: Arc<TokenDispatcher>,
    ring: Arc<RingMaintainer>,
    demand_queue: Arc<DemandQueue>,
}

impl PlantGrpcService {
    pub fn new(
        shared: Arc<SharedPlant>,
        dispatcher: Arc<TokenDispatcher>,
        ring: Arc<RingMaintainer>,
        demand_queue: Arc<DemandQueue>,
    ) -> Self {
        Self {
            shared,
            dispatcher,
            ring,
            demand_queue,
        }
    }
}

fn ack(success: bool, message: impl Into<String>, outcome: proto::TokenOutcome) -> proto::TokenAck {
    proto::TokenAck {
        success,
        message: message.into(),
        outcome: outcome as i32,
    }
}

#[tonic::async_trait]
impl PlantService for PlantGrpcService {
    async fn introduce_plant(
        &self,
        request: Request<proto::IntroduceRequest>,
    ) -> Result<Response<proto::IntroduceResponse>, Status> {
        let req = request.into_inner();
        let candidate = req
            .plant
            .ok_or_else(|| Status::invalid_argument("introduce without plant descriptor"))
            .and_then(|d| {
                descriptor_from_proto(d).map_err(|e| Status::invalid_argument(e.to_string()))
            })?;

        let message = self
            .ring
            .handle_introduce(
                candidate,
                &req.propagator_id,
                &req.successor_hint,
                &req.predecessor_hint,
            )
            .await;

        Ok(Response::new(proto::IntroduceResponse { message }))
    }

    async fn pass_election_token(
        &self,
        request: Request<proto::ElectionTokenMsg>,
    ) -> Result<Response<proto::TokenAck>, Status> {
        let msg = request.into_inner();
        let token = match token_from_proto(msg) {
            Ok(token) => token,
            Err(e) => {
                return Ok(Response::new(ack(
                    false,
                    e.to_string(),
                    proto::TokenOutcome::Error,
                )))
            }
        };

        tracing::info!(
            request_id = %token.request_id,
            sender_id = %token.sender_id,
            kind = %token.kind,
            bid = token.bid_price,
            "Received election token"
        );

        match self.dispatcher.submit(token).await {
            Ok(Submission::Accepted(reply_rx)) => match reply_rx.await {
                Ok(evaluated) => {
                    let outcome = match evaluated.outcome {
                        Outcome::InProgress => proto::TokenOutcome::InProgress,
                        Outcome::Ended => proto::TokenOutcome::Ended,
                    };
                    Ok(Response::new(ack(true, evaluated.message, outcome)))
                }
                Err(_) => Ok(Response::new(ack(
                    false,
                    "worker dropped before evaluating the token",
                    proto::TokenOutcome::Error,
                ))),
            },
            Ok(Submission::AlreadyProcessed) => Ok(Response::new(ack(
                true,
                "request already processed",
                proto::TokenOutcome::Ended,
            ))),
            Err(GridError::DispatcherStopped) => Ok(Response::new(ack(
                false,
                "dispatcher not running",
                proto::TokenOutcome::Error,
            ))),
            Err(e) => Ok(Response::new(ack(
                false,
                e.to_string(),
                proto::TokenOutcome::Error,
            ))),
        }
    }

    async fn get_node_status(
        &self,
        _request: Request<proto::NodeStatusRequest>,
    ) -> Result<Response<proto::NodeStatusResponse>, Status> {
        let (plant_id, status, current_request, bid, next_id, prev_id, stats) = {
            let state = self.shared.lock().await;
            (
                state.plant_id().to_string(),
                state.status.to_string(),
                state
                    .current_request
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                state.current_bid,
                state
                    .next
                    .as_ref()
                    .map(|d| d.plant_id.clone())
                    .unwrap_or_default(),
                state
                    .prev
                    .as_ref()
                    .map(|d| d.plant_id.clone())
                    .unwrap_or_default(),
                state.stats,
            )
        };
        let dispatcher = self.dispatcher.stats().await;
        let queued_demands = self.demand_queue.len().await;

        Ok(Response::new(proto::NodeStatusResponse {
            plant_id,
            status,
            current_request_id: current_request,
            current_bid: bid,
            next_id,
            prev_id,
            pending_tokens: dispatcher.pending as u32,
            queued_demands: queued_demands as u32,
            processed_requests: dispatcher.processed as u64,
            dropped_tokens: stats.dropped,
            duplicate_submissions: dispatcher.duplicates_ignored,
            elections_started: stats.started,
            elections_won: stats.won,
            elections_relayed: stats.relayed,
        }))
    }
}
