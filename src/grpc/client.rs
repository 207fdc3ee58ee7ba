use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use uuid::Uuid;

use crate::config::PlantDescriptor;
use crate::election::state::ElectionToken;
use crate::error::{GridError, Result};
use crate::grpc::{descriptor_from_proto, descriptor_to_proto, token_to_proto};
use crate::proto;
use crate::proto::admin_service_client::AdminServiceClient;
use crate::proto::plant_service_client::PlantServiceClient;

/// Outbound side of the ring protocol. Channels are opened per send, like
/// the ring they serve: neighbors change under our feet, so nothing is
/// pooled or pinned to a descriptor.
pub struct PlantClient {
    send_timeout: Duration,
    introduce_timeout: Duration,
}

impl PlantClient {
    pub fn new(send_timeout: Duration, introduce_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            send_timeout,
            introduce_timeout,
        })
    }

    /// One token hop, bounded by the send timeout. The ack carries the
    /// receiver's evaluation outcome, which is informational only.
    pub async fn send_token(
        &self,
        target: &PlantDescriptor,
        token: &ElectionToken,
    ) -> Result<proto::TokenAck> {
        let endpoint = target.endpoint();
        let request = token_to_proto(token);
        let hop = async {
            let mut client = PlantServiceClient::connect(endpoint).await?;
            let reply = client.pass_election_token(request).await?;
            Ok::<_, GridError>(reply.into_inner())
        };
        timeout(self.send_timeout, hop)
            .await
            .map_err(|_| GridError::Internal(format!("token send to plant {} timed out", target.plant_id)))?
    }

    /// Fire-and-forget token send. Failures are logged, never retried: a
    /// lost token stalls that election by design.
    pub fn spawn_send(self: &Arc<Self>, target: PlantDescriptor, token: ElectionToken) {
        let client = self.clone();
        tokio::spawn(async move {
            match client.send_token(&target, &token).await {
                Ok(ack) => {
                    tracing::debug!(
                        target_id = %target.plant_id,
                        request_id = %token.request_id,
                        outcome = ack.outcome,
                        "Token acknowledged by successor"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        target_id = %target.plant_id,
                        request_id = %token.request_id,
                        error = %e,
                        "Token send failed, election may stall"
                    );
                }
            }
        });
    }

    pub async fn introduce(
        &self,
        target: &PlantDescriptor,
        request: proto::IntroduceRequest,
    ) -> Result<String> {
        let endpoint = target.endpoint();
        let hop = async {
            let mut client = PlantServiceClient::connect(endpoint).await?;
            let reply = client.introduce_plant(request).await?;
            Ok::<_, GridError>(reply.into_inner().message)
        };
        timeout(self.introduce_timeout, hop)
            .await
            .map_err(|_| GridError::Internal(format!("introduce to plant {} timed out", target.plant_id)))?
    }

    /// Fire-and-forget introduce propagation hop.
    pub fn spawn_introduce(self: &Arc<Self>, target: PlantDescriptor, request: proto::IntroduceRequest) {
        let client = self.clone();
        tokio::spawn(async move {
            match client.introduce(&target, request).await {
                Ok(message) => {
                    tracing::debug!(target_id = %target.plant_id, message, "Introduce propagated");
                }
                Err(e) => {
                    tracing::warn!(
                        target_id = %target.plant_id,
                        error = %e,
                        "Introduce propagation failed"
                    );
                }
            }
        });
    }
}

/// What the registry told a joining plant about its place in the ring.
#[derive(Debug, Clone)]
pub enum Registration {
    /// First member: no neighbors, no token protocol.
    Alone,
    Ring {
        predecessor: PlantDescriptor,
        successor: PlantDescriptor,
    },
}

/// Client for the admin process: registry, demand bus, claim publication and
/// telemetry sink.
#[derive(Clone)]
pub struct AdminLink {
    endpoint: String,
}

impl AdminLink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    async fn connect(&self) -> Result<AdminServiceClient<tonic::transport::Channel>> {
        Ok(AdminServiceClient::connect(self.endpoint.clone()).await?)
    }

    /// Register with the admin registry. A duplicate id is a recoverable
    /// error: the caller must pick a new id, none is generated for it.
    pub async fn register(&self, descriptor: &PlantDescriptor) -> Result<Registration> {
        let mut client = self.connect().await?;
        let reply = client
            .register_plant(proto::RegisterRequest {
                plant: Some(descriptor_to_proto(descriptor)),
            })
            .await?
            .into_inner();

        if !reply.success {
            return Err(GridError::DuplicateId(descriptor.plant_id.clone()));
        }

        let predecessor = reply
            .predecessor
            .ok_or_else(|| GridError::RegistrationFailed("registry reply without predecessor".to_string()))
            .and_then(descriptor_from_proto)?;
        let successor = reply
            .successor
            .ok_or_else(|| GridError::RegistrationFailed("registry reply without successor".to_string()))
            .and_then(descriptor_from_proto)?;

        if predecessor.plant_id == descriptor.plant_id && successor.plant_id == descriptor.plant_id {
            return Ok(Registration::Alone);
        }
        Ok(Registration::Ring {
            predecessor,
            successor,
        })
    }

    /// Publish the winner claim for a demand. Returns whether the admin
    /// accepted it as the first claim.
    pub async fn publish_claim(&self, request_id: Uuid, plant_id: &str) -> Result<bool> {
        let mut client = self.connect().await?;
        let reply = client
            .publish_claim(proto::ClaimRequest {
                request_id: request_id.to_string(),
                plant_id: plant_id.to_string(),
            })
            .await?
            .into_inner();
        Ok(reply.acknowledged)
    }

    pub async fn publish_pollution(&self, plant_id: &str, averages: Vec<f64>) -> Result<()> {
        let mut client = self.connect().await?;
        client
            .publish_pollution(proto::PollutionReport {
                plant_id: plant_id.to_string(),
                averages,
                reported_at_ms: chrono::Utc::now().timestamp_millis(),
            })
            .await?;
        Ok(())
    }

    pub async fn subscribe_demands(
        &self,
        plant_id: &str,
    ) -> Result<tonic::Streaming<proto::DemandEvent>> {
        let mut client = self.connect().await?;
        let stream = client
            .stream_demands(proto::StreamDemandsRequest {
                plant_id: plant_id.to_string(),
            })
            .await?
            .into_inner();
        Ok(stream)
    }
}
