//! LevelControl cluster (0x0008), used by dimmable lights.

use super::{AttributeDefault, AttributeSpec, AttributeType, ClusterId, ClusterSchema};
use crate::matter::cluster_server::ClusterServer;

/// Matter Cluster ID for LevelControl
pub const CLUSTER_ID: ClusterId = 0x0008;

pub const CURRENT_LEVEL: &str = "currentLevel";
pub const ON_LEVEL: &str = "onLevel";
pub const MIN_LEVEL: &str = "minLevel";
pub const MAX_LEVEL: &str = "maxLevel";
pub const OPTIONS: &str = "options";

pub const SCHEMA: ClusterSchema = ClusterSchema {
    id: CLUSTER_ID,
    name: "levelControl",
    revision: 5,
    attributes: &[
        AttributeSpec::new(0x0000, CURRENT_LEVEL, AttributeType::U8)
            .nullable()
            .range(1, 254)
            .default_value(AttributeDefault::Int(254)),
        AttributeSpec::new(0x0011, ON_LEVEL, AttributeType::U8)
            .nullable()
            .range(1, 254),
        AttributeSpec::new(0x0002, MIN_LEVEL, AttributeType::U8)
            .range(1, 254)
            .default_value(AttributeDefault::Int(1)),
        AttributeSpec::new(0x0003, MAX_LEVEL, AttributeType::U8)
            .range(1, 254)
            .default_value(AttributeDefault::Int(254)),
        AttributeSpec::new(0x000F, OPTIONS, AttributeType::U8),
    ],
};

/// LevelControl cluster server at the given level (1..=254).
pub fn cluster_server(current_level: u8) -> ClusterServer {
    ClusterServer::new(&SCHEMA).preset(CURRENT_LEVEL, current_level)
}
