//! Identify (0x0003) and Groups (0x0004) clusters.
//!
//! Both are required by nearly every application device type, so they share
//! a module.

use super::{AttributeSpec, AttributeType, ClusterId, ClusterSchema};
use crate::matter::cluster_server::ClusterServer;

pub const IDENTIFY_CLUSTER_ID: ClusterId = 0x0003;
pub const GROUPS_CLUSTER_ID: ClusterId = 0x0004;

pub const IDENTIFY_TIME: &str = "identifyTime";
pub const IDENTIFY_TYPE: &str = "identifyType";
pub const NAME_SUPPORT: &str = "nameSupport";

pub const IDENTIFY: ClusterSchema = ClusterSchema {
    id: IDENTIFY_CLUSTER_ID,
    name: "identify",
    revision: 4,
    attributes: &[
        AttributeSpec::new(0x0000, IDENTIFY_TIME, AttributeType::U16),
        // 0 = None, 1 = LightOutput, 2 = VisibleIndicator, 3 = AudibleBeep,
        // 4 = Display, 5 = Actuator
        AttributeSpec::new(0x0001, IDENTIFY_TYPE, AttributeType::U8).range(0, 5),
    ],
};

pub const GROUPS: ClusterSchema = ClusterSchema {
    id: GROUPS_CLUSTER_ID,
    name: "groups",
    revision: 4,
    attributes: &[AttributeSpec::new(0x0000, NAME_SUPPORT, AttributeType::U8)],
};

/// Identify cluster server with the given identify time (seconds).
pub fn identify_cluster_server(identify_time: u16) -> ClusterServer {
    ClusterServer::new(&IDENTIFY).preset(IDENTIFY_TIME, identify_time)
}

pub fn groups_cluster_server() -> ClusterServer {
    ClusterServer::new(&GROUPS)
}
