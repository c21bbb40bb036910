//! BooleanState cluster (0x0045).
//!
//! A read-only binary state, used by contact sensors (true = contact).

use super::{AttributeSpec, AttributeType, ClusterId, ClusterSchema};
use crate::matter::cluster_server::ClusterServer;

/// Matter Cluster ID for BooleanState
pub const CLUSTER_ID: ClusterId = 0x0045;

pub const STATE_VALUE: &str = "stateValue";

pub const SCHEMA: ClusterSchema = ClusterSchema {
    id: CLUSTER_ID,
    name: "booleanState",
    revision: 1,
    attributes: &[AttributeSpec::new(0x0000, STATE_VALUE, AttributeType::Bool)],
};

/// BooleanState cluster server with the given contact state.
pub fn cluster_server(contact: bool) -> ClusterServer {
    ClusterServer::new(&SCHEMA).preset(STATE_VALUE, contact)
}
