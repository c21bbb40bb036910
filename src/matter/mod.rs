//! Matter device model: clusters, endpoints and server nodes.

pub mod attribute_store;
pub mod cluster_server;
pub mod clusters;
pub mod device_types;
pub mod endpoint;
pub mod pairing;
pub mod runtime;
pub mod server_node;

pub use attribute_store::{AttributeStore, ClusterState, SubscriptionHandle};
pub use cluster_server::ClusterServer;
pub use clusters::{AttributeValue, ClusterId};
pub use device_types::DeviceType;
pub use endpoint::{Endpoint, EndpointTree};
pub use server_node::{ContextRequest, Lifecycle, ServerNode, ServerNodeContext};
