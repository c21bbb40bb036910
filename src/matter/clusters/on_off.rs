//! OnOff cluster (0x0006).
//!
//! Backs lights, outlets and switches. `startUpOnOff` is kept nullable the
//! way the protocol models it (null = restore previous state).

use super::{AttributeDefault, AttributeSpec, AttributeType, ClusterId, ClusterSchema};
use crate::matter::cluster_server::ClusterServer;

/// Matter Cluster ID for OnOff
pub const CLUSTER_ID: ClusterId = 0x0006;

pub const ON_OFF: &str = "onOff";
pub const GLOBAL_SCENE_CONTROL: &str = "globalSceneControl";
pub const ON_TIME: &str = "onTime";
pub const OFF_WAIT_TIME: &str = "offWaitTime";
pub const START_UP_ON_OFF: &str = "startUpOnOff";

pub const SCHEMA: ClusterSchema = ClusterSchema {
    id: CLUSTER_ID,
    name: "onOff",
    revision: 6,
    attributes: &[
        AttributeSpec::new(0x0000, ON_OFF, AttributeType::Bool),
        AttributeSpec::new(0x4000, GLOBAL_SCENE_CONTROL, AttributeType::Bool)
            .default_value(AttributeDefault::Bool(true)),
        AttributeSpec::new(0x4001, ON_TIME, AttributeType::U16),
        AttributeSpec::new(0x4002, OFF_WAIT_TIME, AttributeType::U16),
        // 0 = Off, 1 = On, 2 = Toggle
        AttributeSpec::new(0x4003, START_UP_ON_OFF, AttributeType::U8)
            .nullable()
            .range(0, 2),
    ],
};

/// OnOff cluster server with the given initial state.
pub fn cluster_server(on_off: bool) -> ClusterServer {
    ClusterServer::new(&SCHEMA).preset(ON_OFF, on_off)
}
