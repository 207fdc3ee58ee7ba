use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::admin::book::DemandBook;
use crate::admin::registry::PlantRegistry;
use crate::demand::DemandRequest;
use crate::grpc::{descriptor_from_proto, descriptor_to_proto};
use crate::proto;
use crate::proto::admin_service_server::AdminService;

const SUBSCRIBER_BUFFER: usize = 256;
const POLLUTION_HISTORY: usize = 64;

/// One pollution batch as reported by a plant.
#[derive(Debug, Clone)]
pub struct PollutionEntry {
    pub plant_id: String,
    pub averages: Vec<f64>,
    pub reported_at: DateTime<Utc>,
}

/// Shared state behind the admin gRPC surface and the dashboard.
pub struct AdminShared {
    pub registry: Mutex<PlantRegistry>,
    pub book: Mutex<DemandBook>,
    subscribers: Mutex<Vec<mpsc::Sender<proto::DemandEvent>>>,
    pub pollution: Mutex<VecDeque<PollutionEntry>>,
}

impl AdminShared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(PlantRegistry::new()),
            book: Mutex::new(DemandBook::new()),
            subscribers: Mutex::new(Vec::new()),
            pollution: Mutex::new(VecDeque::new()),
        })
    }

    /// Record a new demand and broadcast it to every subscribed plant.
    pub async fn submit_demand(&self, request: DemandRequest) {
        self.book.lock().await.submit(request.clone());
        self.broadcast(proto::DemandEvent {
            event: Some(proto::demand_event::Event::NewDemand(proto::Demand {
                request_id: request.id.to_string(),
                created_at_ms: request.created_at.timestamp_millis(),
                amount_kwh: request.amount_kwh,
            })),
        })
        .await;
    }

    /// Record a winner claim; on the first claim, tell every plant to stand
    /// down on this demand.
    pub async fn claim_demand(&self, request_id: Uuid, plant_id: &str) -> bool {
        let accepted = self.book.lock().await.claim(request_id, plant_id);
        if accepted {
            self.broadcast(proto::DemandEvent {
                event: Some(proto::demand_event::Event::Claimed(proto::DemandClaimed {
                    request_id: request_id.to_string(),
                    plant_id: plant_id.to_string(),
                })),
            })
            .await;
        }
        accepted
    }

    async fn broadcast(&self, event: proto::DemandEvent) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Demand subscriber falling behind, event dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    async fn subscribe(&self, plant_id: &str) -> mpsc::Receiver<proto::DemandEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);

        // Replay the open demands so a late joiner can still compete.
        let open = self.book.lock().await.open();
        for request in open {
            let event = proto::DemandEvent {
                event: Some(proto::demand_event::Event::NewDemand(proto::Demand {
                    request_id: request.id.to_string(),
                    created_at_ms: request.created_at.timestamp_millis(),
                    amount_kwh: request.amount_kwh,
                })),
            };
            if tx.try_send(event).is_err() {
                break;
            }
        }

        self.subscribers.lock().await.push(tx);
        tracing::info!(plant_id, "Plant subscribed to demand stream");
        rx
    }

    pub async fn record_pollution(&self, entry: PollutionEntry) {
        let mut pollution = self.pollution.lock().await;
        if pollution.len() >= POLLUTION_HISTORY {
            pollution.pop_front();
        }
        pollution.push_back(entry);
    }
}

pub struct AdminGrpcService {
    shared: Arc<AdminShared>,
}

impl AdminGrpcService {
    pub fn new(shared: Arc<AdminShared>) -> Self {
        Self { shared }
    }
}

#[tonic::async_trait]
impl AdminService for AdminGrpcService {
    async fn register_plant(
        &self,
        request: Request<proto::RegisterRequest>,
    ) -> Result<Response<proto::RegisterResponse>, Status> {
        let descriptor = request
            .into_inner()
            .plant
            .ok_or_else(|| Status::invalid_argument("register without plant descriptor"))
            .and_then(|d| {
                descriptor_from_proto(d).map_err(|e| Status::invalid_argument(e.to_string()))
            })?;

        let plant_id = descriptor.plant_id.clone();
        let result = self.shared.registry.lock().await.register(descriptor);

        let message = if result.success {
            format!("plant {plant_id} registered")
        } else {
            format!("plant id {plant_id} already exists")
        };

        Ok(Response::new(proto::RegisterResponse {
            success: result.success,
            predecessor: result.predecessor.as_ref().map(descriptor_to_proto),
            successor: result.successor.as_ref().map(descriptor_to_proto),
            message,
        }))
    }

    async fn submit_demand(
        &self,
        request: Request<proto::SubmitDemandRequest>,
    ) -> Result<Response<proto::SubmitDemandResponse>, Status> {
        let req = request.into_inner();
        if req.amount_kwh <= 0.0 || !req.amount_kwh.is_finite() {
            return Err(Status::invalid_argument("demand amount must be positive"));
        }

        let demand = DemandRequest::new(req.amount_kwh);
        let reply = proto::SubmitDemandResponse {
            request_id: demand.id.to_string(),
            created_at_ms: demand.created_at.timestamp_millis(),
        };
        self.shared.submit_demand(demand).await;
        Ok(Response::new(reply))
    }

    type StreamDemandsStream =
        Pin<Box<dyn Stream<Item = Result<proto::DemandEvent, Status>> + Send>>;

    async fn stream_demands(
        &self,
        request: Request<proto::StreamDemandsRequest>,
    ) -> Result<Response<Self::StreamDemandsStream>, Status> {
        let req = request.into_inner();
        let rx = self.shared.subscribe(&req.plant_id).await;
        let stream = ReceiverStream::new(rx).map(Ok);
        Ok(Response::new(Box::pin(stream)))
    }

    async fn publish_claim(
        &self,
        request: Request<proto::ClaimRequest>,
    ) -> Result<Response<proto::ClaimResponse>, Status> {
        let req = request.into_inner();
        let request_id = Uuid::parse_str(&req.request_id)
            .map_err(|_| Status::invalid_argument("bad request id"))?;
        let acknowledged = self.shared.claim_demand(request_id, &req.plant_id).await;
        Ok(Response::new(proto::ClaimResponse { acknowledged }))
    }

    async fn publish_pollution(
        &self,
        request: Request<proto::PollutionReport>,
    ) -> Result<Response<proto::PollutionAck>, Status> {
        let req = request.into_inner();
        let reported_at = Utc
            .timestamp_millis_opt(req.reported_at_ms)
            .single()
            .unwrap_or_else(Utc::now);
        tracing::debug!(
            plant_id = %req.plant_id,
            averages = req.averages.len(),
            "Pollution batch received"
        );
        self.shared
            .record_pollution(PollutionEntry {
                plant_id: req.plant_id,
                averages: req.averages,
                reported_at,
            })
            .await;
        Ok(Response::new(proto::PollutionAck {}))
    }

    async fn list_plants(
        &self,
        _request: Request<proto::ListPlantsRequest>,
    ) -> Result<Response<proto::ListPlantsResponse>, Status> {
        let registry = self.shared.registry.lock().await;
        Ok(Response::new(proto::ListPlantsResponse {
            plants: registry.all().iter().map(descriptor_to_proto).collect(),
        }))
    }

    async fn list_demands(
        &self,
        request: Request<proto::ListDemandsRequest>,
    ) -> Result<Response<proto::ListDemandsResponse>, Status> {
        let include_claimed = request.into_inner().include_claimed;
        let book = self.shared.book.lock().await;
        let demands = book
            .all()
            .into_iter()
            .filter(|e| include_claimed || e.claimed_by.is_none())
            .map(|e| proto::DemandInfo {
                request_id: e.request.id.to_string(),
                amount_kwh: e.request.amount_kwh,
                created_at_ms: e.request.created_at.timestamp_millis(),
                claimed: e.claimed_by.is_some(),
                claimed_by: e.claimed_by.unwrap_or_default(),
            })
            .collect();
        Ok(Response::new(proto::ListDemandsResponse { demands }))
    }
}
