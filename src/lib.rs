pub mod admin;
pub mod config;
pub mod demand;
pub mod election;
pub mod error;
pub mod grpc;
pub mod node;
pub mod production;
pub mod ring;
pub mod sensor;
pub mod shutdown;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("gridring");
}
