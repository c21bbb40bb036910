//! BridgedDeviceBasicInformation cluster (0x0039).
//!
//! Provides the names of bridged devices. Controllers like Home Assistant
//! read `nodeLabel` to display the device under the bridge.

use super::{AttributeDefault, AttributeSpec, AttributeType, ClusterId, ClusterSchema};
use crate::matter::cluster_server::ClusterServer;

/// Matter Cluster ID for BridgedDeviceBasicInformation
pub const CLUSTER_ID: ClusterId = 0x0039;

pub const VENDOR_NAME: &str = "vendorName";
pub const PRODUCT_NAME: &str = "productName";
pub const SOFTWARE_VERSION: &str = "softwareVersion";
pub const SOFTWARE_VERSION_STRING: &str = "softwareVersionString";
pub const NODE_LABEL: &str = "nodeLabel";
pub const SERIAL_NUMBER: &str = "serialNumber";
pub const UNIQUE_ID: &str = "uniqueId";
pub const REACHABLE: &str = "reachable";

pub const SCHEMA: ClusterSchema = ClusterSchema {
    id: CLUSTER_ID,
    name: "bridgedDeviceBasicInformation",
    revision: 4,
    attributes: &[
        AttributeSpec::new(0x0001, VENDOR_NAME, AttributeType::Text),
        AttributeSpec::new(0x0003, PRODUCT_NAME, AttributeType::Text),
        AttributeSpec::new(0x000A, SOFTWARE_VERSION, AttributeType::U32),
        AttributeSpec::new(0x000B, SOFTWARE_VERSION_STRING, AttributeType::Text)
            .default_value(AttributeDefault::Text("0.0.0")),
        AttributeSpec::new(0x0005, NODE_LABEL, AttributeType::Text),
        AttributeSpec::new(0x000F, SERIAL_NUMBER, AttributeType::Text),
        AttributeSpec::new(0x0011, REACHABLE, AttributeType::Bool)
            .default_value(AttributeDefault::Bool(true)),
        AttributeSpec::new(0x0012, UNIQUE_ID, AttributeType::Text),
    ],
};

/// Descriptive information about a bridged device.
///
/// # Example
/// ```ignore
/// BridgedDeviceInfo::new("Kitchen Light")
///     .with_vendor("Acme")
///     .with_product("Smart Bulb")
///     .with_serial("KL-0001")
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgedDeviceInfo {
    pub node_label: String,
    pub vendor_name: String,
    pub product_name: String,
    pub serial_number: String,
    pub software_version: u32,
    pub software_version_string: String,
}

impl BridgedDeviceInfo {
    pub fn new(node_label: impl Into<String>) -> Self {
        Self {
            node_label: node_label.into(),
            ..Default::default()
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor_name = vendor.into();
        self
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product_name = product.into();
        self
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = serial.into();
        self
    }

    pub fn with_software_version(mut self, version: u32, display: impl Into<String>) -> Self {
        self.software_version = version;
        self.software_version_string = display.into();
        self
    }

    /// Build the cluster server; `uniqueId` falls back to the serial number.
    pub fn cluster_server(&self) -> ClusterServer {
        let unique_id = if self.serial_number.is_empty() {
            self.node_label.clone()
        } else {
            self.serial_number.clone()
        };
        let server = ClusterServer::new(&SCHEMA)
            .preset(NODE_LABEL, self.node_label.as_str())
            .preset(VENDOR_NAME, self.vendor_name.as_str())
            .preset(PRODUCT_NAME, self.product_name.as_str())
            .preset(SERIAL_NUMBER, self.serial_number.as_str())
            .preset(UNIQUE_ID, unique_id);
        if self.software_version_string.is_empty() {
            server
        } else {
            server
                .preset(SOFTWARE_VERSION, self.software_version)
                .preset(SOFTWARE_VERSION_STRING, self.software_version_string.as_str())
        }
    }
}
