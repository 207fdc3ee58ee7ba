use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("Plant id {0:?} is already registered, pick a different id")]
    DuplicateId(String),

    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Token dispatcher is not running")]
    DispatcherStopped,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GridError>;
