//! Measurement clusters: illuminance, temperature, pressure, flow and
//! relative humidity.
//!
//! All five share the `measuredValue` / `minMeasuredValue` /
//! `maxMeasuredValue` layout and differ only in type and units:
//!
//! | Cluster            | ID     | Type | Unit                      |
//! |--------------------|--------|------|---------------------------|
//! | Illuminance        | 0x0400 | u16  | 10000 * log10(lux) + 1    |
//! | Temperature        | 0x0402 | i16  | 0.01 °C                   |
//! | Pressure           | 0x0403 | i16  | 0.1 kPa                   |
//! | Flow               | 0x0404 | u16  | 0.1 m³/h                  |
//! | Relative humidity  | 0x0405 | u16  | 0.01 %                    |

use super::{AttributeSpec, AttributeType, ClusterId, ClusterSchema};
use crate::matter::cluster_server::ClusterServer;

pub const ILLUMINANCE_CLUSTER_ID: ClusterId = 0x0400;
pub const TEMPERATURE_CLUSTER_ID: ClusterId = 0x0402;
pub const PRESSURE_CLUSTER_ID: ClusterId = 0x0403;
pub const FLOW_CLUSTER_ID: ClusterId = 0x0404;
pub const RELATIVE_HUMIDITY_CLUSTER_ID: ClusterId = 0x0405;

pub const MEASURED_VALUE: &str = "measuredValue";
pub const MIN_MEASURED_VALUE: &str = "minMeasuredValue";
pub const MAX_MEASURED_VALUE: &str = "maxMeasuredValue";

const fn measured(kind: AttributeType) -> [AttributeSpec; 3] {
    [
        AttributeSpec::new(0x0000, MEASURED_VALUE, kind).nullable(),
        AttributeSpec::new(0x0001, MIN_MEASURED_VALUE, kind).nullable(),
        AttributeSpec::new(0x0002, MAX_MEASURED_VALUE, kind).nullable(),
    ]
}

const U16_MEASURED: [AttributeSpec; 3] = measured(AttributeType::U16);
const I16_MEASURED: [AttributeSpec; 3] = measured(AttributeType::I16);
const HUMIDITY_MEASURED: [AttributeSpec; 3] = [
    AttributeSpec::new(0x0000, MEASURED_VALUE, AttributeType::U16)
        .nullable()
        .range(0, 10000),
    AttributeSpec::new(0x0001, MIN_MEASURED_VALUE, AttributeType::U16)
        .nullable()
        .range(0, 9999),
    AttributeSpec::new(0x0002, MAX_MEASURED_VALUE, AttributeType::U16)
        .nullable()
        .range(1, 10000),
];

pub const ILLUMINANCE: ClusterSchema = ClusterSchema {
    id: ILLUMINANCE_CLUSTER_ID,
    name: "illuminanceMeasurement",
    revision: 3,
    attributes: &U16_MEASURED,
};

pub const TEMPERATURE: ClusterSchema = ClusterSchema {
    id: TEMPERATURE_CLUSTER_ID,
    name: "temperatureMeasurement",
    revision: 4,
    attributes: &I16_MEASURED,
};

pub const PRESSURE: ClusterSchema = ClusterSchema {
    id: PRESSURE_CLUSTER_ID,
    name: "pressureMeasurement",
    revision: 3,
    attributes: &I16_MEASURED,
};

pub const FLOW: ClusterSchema = ClusterSchema {
    id: FLOW_CLUSTER_ID,
    name: "flowMeasurement",
    revision: 3,
    attributes: &U16_MEASURED,
};

pub const RELATIVE_HUMIDITY: ClusterSchema = ClusterSchema {
    id: RELATIVE_HUMIDITY_CLUSTER_ID,
    name: "relativeHumidityMeasurement",
    revision: 3,
    attributes: &HUMIDITY_MEASURED,
};

/// Illuminance in the protocol's logarithmic encoding.
pub fn illuminance_cluster_server(measured_value: u16) -> ClusterServer {
    ClusterServer::new(&ILLUMINANCE).preset(MEASURED_VALUE, measured_value)
}

/// Temperature in centidegrees Celsius (21.5 °C = 2150).
pub fn temperature_cluster_server(centidegrees: i16) -> ClusterServer {
    ClusterServer::new(&TEMPERATURE).preset(MEASURED_VALUE, centidegrees)
}

pub fn pressure_cluster_server(measured_value: i16) -> ClusterServer {
    ClusterServer::new(&PRESSURE).preset(MEASURED_VALUE, measured_value)
}

pub fn flow_cluster_server(measured_value: u16) -> ClusterServer {
    ClusterServer::new(&FLOW).preset(MEASURED_VALUE, measured_value)
}

/// Relative humidity in hundredths of a percent (45.5 % = 4550).
pub fn relative_humidity_cluster_server(measured_value: u16) -> ClusterServer {
    ClusterServer::new(&RELATIVE_HUMIDITY).preset(MEASURED_VALUE, measured_value)
}

/// Convert lux to the illuminance cluster encoding.
pub fn lux_to_measured_value(lux: f64) -> u16 {
    if lux <= 0.0 {
        return 0;
    }
    let value = (10000.0 * lux.log10() + 1.0).round();
    value.clamp(1.0, 65534.0) as u16
}
