use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tonic::transport::server::TcpIncoming;
use tonic::transport::Server;

use crate::error::{GridError, Result};
use crate::grpc::plant_service::PlantGrpcService;
use crate::proto::plant_service_server::PlantServiceServer;

/// Bind the plant's listen address up front, so the node only introduces
/// itself to the ring once peers can actually reach it.
pub async fn bind(addr: SocketAddr) -> Result<TcpIncoming> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| GridError::Internal(format!("failed to bind {addr}: {e}")))?;
    TcpIncoming::from_listener(listener, true, None)
        .map_err(|e| GridError::Internal(format!("failed to prepare listener: {e}")))
}

/// Serve the plant gRPC service until the node shuts down.
pub async fn serve_plant(
    incoming: TcpIncoming,
    service: PlantGrpcService,
    shutdown: CancellationToken,
) -> Result<()> {
    Server::builder()
        .add_service(PlantServiceServer::new(service))
        .serve_with_incoming_shutdown(incoming, shutdown.cancelled_owned())
        .await?;
    Ok(())
}
