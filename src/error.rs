use crate::matter::clusters::ClusterId;
use crate::matter::runtime::RuntimeError;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum BridgeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cluster 0x{cluster_id:04X} is not present on endpoint {endpoint}")]
    ClusterNotPresent {
        endpoint: String,
        cluster_id: ClusterId,
    },

    #[error("Cluster 0x{cluster_id:04X} already exists on endpoint {endpoint}")]
    DuplicateCluster {
        endpoint: String,
        cluster_id: ClusterId,
    },

    #[error("Child endpoint {child} already exists under {parent}")]
    DuplicateChildId { parent: String, child: String },

    #[error("Endpoint id {0} is already used on this server node")]
    DuplicateEndpointId(String),

    #[error("Device type {device_type} on child {child} adds no cluster beyond its parent")]
    RedundantDeviceType { child: String, device_type: String },

    #[error("Endpoint {endpoint} ({device_type}) is missing required cluster 0x{cluster_id:04X}")]
    MissingRequiredCluster {
        endpoint: String,
        device_type: String,
        cluster_id: ClusterId,
    },

    #[error("Type mismatch for {attribute}: expected {expected}, got {actual}")]
    TypeMismatch {
        attribute: String,
        expected: String,
        actual: String,
    },

    #[error("{0} is not allowed while the server node is online")]
    IllegalStateAfterStart(String),

    #[error("Failed to start server node {node}: {reason}")]
    StartFailure { node: String, reason: String },

    #[error("Failed to stop server node {node}: {reason}")]
    StopFailure { node: String, reason: String },

    #[error("Attribute {attribute} committed locally but not reported: {reason}")]
    PropagationFailure { attribute: String, reason: String },

    #[error("Protocol runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Software update failed: {0}")]
    UpdateFailure(String),

    #[error("Invalid commissioning credentials: {0}")]
    InvalidCredentials(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unhandled fault: {0}")]
    UnhandledFault(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
