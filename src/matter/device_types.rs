//! Device type definitions for the Matter bridge.
//!
//! Each device type names the clusters an endpoint must serve to claim it.
//! Definitions are plain `const` values shared by every endpoint that uses
//! them.

use super::clusters::identify::{GROUPS_CLUSTER_ID, IDENTIFY_CLUSTER_ID};
use super::clusters::measurement::{
    FLOW_CLUSTER_ID, ILLUMINANCE_CLUSTER_ID, PRESSURE_CLUSTER_ID, RELATIVE_HUMIDITY_CLUSTER_ID,
    TEMPERATURE_CLUSTER_ID,
};
use super::clusters::{
    ClusterId, boolean_state, bridged_device_basic_info, level_control, occupancy_sensing, on_off,
};
use strum::{Display, EnumString};

/// Device class as defined by the Matter device library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DeviceClass {
    /// Application device with a single primary function
    Simple,
    /// Endpoint whose children come and go at runtime (aggregator)
    Dynamic,
    /// Utility device (bridged node)
    Utility,
    /// Root of a node
    Node,
}

/// Identity of a device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceType {
    pub name: &'static str,
    pub code: u32,
    pub device_class: DeviceClass,
    pub revision: u16,
    /// Server clusters an endpoint of this type must carry
    pub required_clusters: &'static [ClusterId],
}

impl DeviceType {
    /// Name used for the endpoint type, e.g. `MA_onofflight`.
    pub fn behavior_name(&self) -> String {
        self.name.replace('-', "_")
    }

    pub fn requires(&self, cluster_id: ClusterId) -> bool {
        self.required_clusters.contains(&cluster_id)
    }
}

/// Matter Root Node device type
///
/// Device Type ID: 0x0016 (22 decimal)
pub const ROOT_NODE: DeviceType = DeviceType {
    name: "MA-rootdevice",
    code: 0x0016,
    device_class: DeviceClass::Node,
    revision: 1,
    required_clusters: &[],
};

/// Matter Aggregator device type (for bridge root)
///
/// Device Type ID: 0x000E (14 decimal)
///
/// Used as the bridge aggregator endpoint that enumerates bridged devices.
pub const AGGREGATOR: DeviceType = DeviceType {
    name: "MA-aggregator",
    code: 0x000E,
    device_class: DeviceClass::Dynamic,
    revision: 1,
    required_clusters: &[],
};

/// Matter Bridged Node device type
///
/// Device Type ID: 0x0013 (19 decimal)
///
/// Added to bridged device endpoints alongside their functional device type.
pub const BRIDGED_NODE: DeviceType = DeviceType {
    name: "MA-bridgedNode",
    code: 0x0013,
    device_class: DeviceClass::Utility,
    revision: 2,
    required_clusters: &[bridged_device_basic_info::CLUSTER_ID],
};

/// Matter On/Off Light device type
///
/// Device Type ID: 0x0100 (256 decimal)
///
/// Required clusters: Identify, Groups, OnOff
pub const ON_OFF_LIGHT: DeviceType = DeviceType {
    name: "MA-onofflight",
    code: 0x0100,
    device_class: DeviceClass::Simple,
    revision: 3,
    required_clusters: &[IDENTIFY_CLUSTER_ID, GROUPS_CLUSTER_ID, on_off::CLUSTER_ID],
};

/// Matter Dimmable Light device type
///
/// Device Type ID: 0x0101 (257 decimal)
///
/// Required clusters: Identify, Groups, OnOff, LevelControl
pub const DIMMABLE_LIGHT: DeviceType = DeviceType {
    name: "MA-dimmablelight",
    code: 0x0101,
    device_class: DeviceClass::Simple,
    revision: 3,
    required_clusters: &[
        IDENTIFY_CLUSTER_ID,
        GROUPS_CLUSTER_ID,
        on_off::CLUSTER_ID,
        level_control::CLUSTER_ID,
    ],
};

/// Matter On/Off Light Switch device type
///
/// Device Type ID: 0x0103 (259 decimal)
pub const ON_OFF_SWITCH: DeviceType = DeviceType {
    name: "MA-onofflightswitch",
    code: 0x0103,
    device_class: DeviceClass::Simple,
    revision: 3,
    required_clusters: &[IDENTIFY_CLUSTER_ID, on_off::CLUSTER_ID],
};

/// Matter On/Off Plug-in Unit device type
///
/// Device Type ID: 0x010A (266 decimal)
///
/// Used for outlets and relays.
pub const ON_OFF_OUTLET: DeviceType = DeviceType {
    name: "MA-onoffpluginunit",
    code: 0x010A,
    device_class: DeviceClass::Simple,
    revision: 3,
    required_clusters: &[IDENTIFY_CLUSTER_ID, GROUPS_CLUSTER_ID, on_off::CLUSTER_ID],
};

/// Matter Contact Sensor device type
///
/// Device Type ID: 0x0015 (21 decimal)
///
/// Used for binary sensors (open/closed).
pub const CONTACT_SENSOR: DeviceType = DeviceType {
    name: "MA-contactsensor",
    code: 0x0015,
    device_class: DeviceClass::Simple,
    revision: 1,
    required_clusters: &[IDENTIFY_CLUSTER_ID, boolean_state::CLUSTER_ID],
};

/// Matter Light Sensor device type (0x0106)
pub const LIGHT_SENSOR: DeviceType = DeviceType {
    name: "MA-lightsensor",
    code: 0x0106,
    device_class: DeviceClass::Simple,
    revision: 3,
    required_clusters: &[IDENTIFY_CLUSTER_ID, ILLUMINANCE_CLUSTER_ID],
};

/// Matter Occupancy Sensor device type
///
/// Device Type ID: 0x0107 (263 decimal)
///
/// Used for motion/presence sensors.
pub const OCCUPANCY_SENSOR: DeviceType = DeviceType {
    name: "MA-occupancysensor",
    code: 0x0107,
    device_class: DeviceClass::Simple,
    revision: 3,
    required_clusters: &[IDENTIFY_CLUSTER_ID, occupancy_sensing::CLUSTER_ID],
};

/// Matter Temperature Sensor device type (0x0302)
pub const TEMPERATURE_SENSOR: DeviceType = DeviceType {
    name: "MA-tempsensor",
    code: 0x0302,
    device_class: DeviceClass::Simple,
    revision: 2,
    required_clusters: &[IDENTIFY_CLUSTER_ID, TEMPERATURE_CLUSTER_ID],
};

/// Matter Pressure Sensor device type (0x0305)
pub const PRESSURE_SENSOR: DeviceType = DeviceType {
    name: "MA-pressuresensor",
    code: 0x0305,
    device_class: DeviceClass::Simple,
    revision: 2,
    required_clusters: &[IDENTIFY_CLUSTER_ID, PRESSURE_CLUSTER_ID],
};

/// Matter Flow Sensor device type (0x0306)
pub const FLOW_SENSOR: DeviceType = DeviceType {
    name: "MA-flowsensor",
    code: 0x0306,
    device_class: DeviceClass::Simple,
    revision: 2,
    required_clusters: &[IDENTIFY_CLUSTER_ID, FLOW_CLUSTER_ID],
};

/// Matter Humidity Sensor device type (0x0307)
pub const HUMIDITY_SENSOR: DeviceType = DeviceType {
    name: "MA-humiditysensor",
    code: 0x0307,
    device_class: DeviceClass::Simple,
    revision: 2,
    required_clusters: &[IDENTIFY_CLUSTER_ID, RELATIVE_HUMIDITY_CLUSTER_ID],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::clusters;

    const ALL: &[DeviceType] = &[
        ROOT_NODE,
        AGGREGATOR,
        BRIDGED_NODE,
        ON_OFF_LIGHT,
        DIMMABLE_LIGHT,
        ON_OFF_SWITCH,
        ON_OFF_OUTLET,
        CONTACT_SENSOR,
        LIGHT_SENSOR,
        OCCUPANCY_SENSOR,
        TEMPERATURE_SENSOR,
        PRESSURE_SENSOR,
        FLOW_SENSOR,
        HUMIDITY_SENSOR,
    ];

    #[test]
    fn test_required_clusters_are_registered() {
        for device_type in ALL {
            for id in device_type.required_clusters {
                assert!(
                    clusters::schema(*id).is_some(),
                    "{} requires unknown cluster 0x{:04X}",
                    device_type.name,
                    id
                );
            }
        }
    }

    #[test]
    fn test_behavior_name_and_class() {
        assert_eq!(ON_OFF_LIGHT.behavior_name(), "MA_onofflight");
        assert_eq!(ON_OFF_LIGHT.device_class.to_string(), "simple");
        assert_eq!(AGGREGATOR.device_class.to_string(), "dynamic");
        assert_eq!("utility".parse::<DeviceClass>().unwrap(), DeviceClass::Utility);
        assert!(ON_OFF_LIGHT.requires(on_off::CLUSTER_ID));
        assert!(!CONTACT_SENSOR.requires(on_off::CLUSTER_ID));
    }
}
