//! OccupancySensing cluster (0x0406).

use super::{AttributeDefault, AttributeSpec, AttributeType, ClusterId, ClusterSchema};
use crate::matter::cluster_server::ClusterServer;

/// Matter Cluster ID for OccupancySensing
pub const CLUSTER_ID: ClusterId = 0x0406;

/// Occupancy bitmap, bit 0 = occupied
pub const OCCUPANCY: &str = "occupancy";
pub const OCCUPANCY_SENSOR_TYPE: &str = "occupancySensorType";
pub const OCCUPANCY_SENSOR_TYPE_BITMAP: &str = "occupancySensorTypeBitmap";

pub const SCHEMA: ClusterSchema = ClusterSchema {
    id: CLUSTER_ID,
    name: "occupancySensing",
    revision: 4,
    attributes: &[
        AttributeSpec::new(0x0000, OCCUPANCY, AttributeType::U8).range(0, 1),
        // 0 = PIR, 1 = Ultrasonic, 2 = PIR and ultrasonic, 3 = Physical contact
        AttributeSpec::new(0x0001, OCCUPANCY_SENSOR_TYPE, AttributeType::U8).range(0, 3),
        AttributeSpec::new(0x0002, OCCUPANCY_SENSOR_TYPE_BITMAP, AttributeType::U8)
            .range(0, 7)
            .default_value(AttributeDefault::Int(1)),
    ],
};

/// OccupancySensing cluster server (PIR) with the given occupancy.
pub fn cluster_server(occupied: bool) -> ClusterServer {
    ClusterServer::new(&SCHEMA).preset(OCCUPANCY, u8::from(occupied))
}
