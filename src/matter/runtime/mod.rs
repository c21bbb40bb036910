//! Protocol runtime seam.
//!
//! The bridge never speaks the Matter wire protocol itself. A
//! [`ProtocolRuntime`] owns sockets, discovery advertisement and fabric
//! sessions; the server node hands it endpoint trees and attribute changes
//! through a [`RuntimeNode`].
//!
//! Two implementations ship with the crate:
//! - [`udp::UdpRuntime`] binds the operational UDP port and publishes the
//!   commissionable discovery record.
//! - [`memory::MemoryRuntime`] keeps everything in memory and journals every
//!   call, for tests and `--dry-run`.

pub mod memory;
pub mod udp;

use super::clusters::{AttributeValue, ClusterId};
use super::endpoint::EndpointTree;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error as ThisError;

pub use memory::{MemoryRuntime, RuntimeEvent};
pub use udp::UdpRuntime;

/// Errors raised by a protocol runtime.
#[derive(ThisError, Debug)]
pub enum RuntimeError {
    #[error("address already in use: {0}")]
    AddressInUse(String),

    #[error("node is not running")]
    NotRunning,

    #[error("endpoint {0} is unknown to the runtime")]
    UnknownEndpoint(String),

    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Identity a node presents to controllers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeIdentity {
    pub store_id: String,
    pub device_name: String,
    pub device_type_code: u32,
    pub vendor_id: u16,
    pub vendor_name: String,
    pub product_id: u16,
    pub product_name: String,
    pub serial_number: String,
    pub unique_id: String,
    pub discriminator: u16,
    pub passcode: u32,
    pub port: u16,
}

/// Runtime-side handle for a node context.
#[derive(Debug, Clone)]
pub struct ContextHandle {
    pub id: u64,
    pub identity: NodeIdentity,
}

/// A committed attribute change to report to subscribed controllers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeChange {
    pub endpoint: String,
    pub cluster_id: ClusterId,
    pub attribute: String,
    pub value: AttributeValue,
}

/// Process-wide protocol runtime.
pub trait ProtocolRuntime: Send + Sync {
    fn name(&self) -> &'static str;

    /// Register a node identity. No network side effects.
    fn create_context(&self, identity: &NodeIdentity) -> Result<ContextHandle, RuntimeError>;

    /// Create the runtime half of a server node.
    fn create_node(&self, context: &ContextHandle) -> Result<Arc<dyn RuntimeNode>, RuntimeError>;
}

/// Runtime half of one server node.
#[async_trait]
pub trait RuntimeNode: Send + Sync {
    /// Publish (or replace) an endpoint tree rooted at `tree.id`.
    async fn add(&self, tree: EndpointTree) -> Result<(), RuntimeError>;

    /// Bind transport and advertise the node.
    async fn start(&self) -> Result<(), RuntimeError>;

    /// Release transport and withdraw the advertisement.
    async fn stop(&self) -> Result<(), RuntimeError>;

    /// Report a committed attribute change.
    async fn report_attribute_change(&self, change: &AttributeChange) -> Result<(), RuntimeError>;
}

/// Apply a change to a published tree. Returns false if the endpoint or
/// cluster is unknown.
pub(crate) fn apply_change(tree: &mut EndpointTree, change: &AttributeChange) -> bool {
    if tree.id == change.endpoint {
        let Some(cluster) = tree.clusters.iter_mut().find(|c| c.id == change.cluster_id) else {
            return false;
        };
        return match cluster.attributes.get_mut(change.attribute.as_str()) {
            Some(value) => {
                *value = change.value.clone();
                true
            }
            None => false,
        };
    }
    tree.children
        .iter_mut()
        .any(|child| apply_change(child, change))
}
