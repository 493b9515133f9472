//! The shared network key-value table.
//!
//! The robot controller and this client coordinate through typed keys on a
//! remote table. The transport is external; this module wraps it behind
//! [`TableChannel`]:
//!
//! - [`MqttTable`]: retained topics on an MQTT broker, JSON-encoded values.
//! - [`LocalTable`]: in-process map for tests and the offline demo.
//!
//! Reads return the caller's default when a key is absent. Writes are
//! fire-and-forget and never block the control loop.

mod local;
mod mqtt;

pub use local::LocalTable;
pub use mqtt::MqttTable;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::VisionError;

/// A value on the table. JSON on the wire for the MQTT transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableValue {
    Bool(bool),
    Number(f64),
    NumberArray(Vec<f64>),
}

/// Typed access to the shared table.
///
/// Every read reflects the latest externally observed value; implementations
/// mirror remote state but do not cache stale reads. Puts never block.
pub trait TableChannel {
    /// Block until the remote side signals connected, or fail with
    /// [`VisionError::ConnectionTimeout`].
    fn wait_connected(&mut self, timeout: Duration) -> Result<(), VisionError>;

    /// The transport's current view of the connection. `false` ends the loop.
    fn connected(&mut self) -> bool;

    fn get_bool(&mut self, key: &str, default: bool) -> bool;
    fn get_number(&mut self, key: &str, default: f64) -> f64;
    fn get_number_array(&mut self, key: &str, default: &[f64]) -> Vec<f64>;

    fn put_bool(&mut self, key: &str, value: bool);
    fn put_number(&mut self, key: &str, value: f64);
    fn put_number_array(&mut self, key: &str, values: &[f64]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_values_round_trip_as_json() {
        for value in [
            TableValue::Bool(true),
            TableValue::Number(-1.0),
            TableValue::NumberArray(vec![140.0, 105.0, 62.0]),
        ] {
            let json = serde_json::to_string(&value).expect("serialize");
            let back: TableValue = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(back, value);
        }
    }

    #[test]
    fn untagged_json_distinguishes_bool_from_number() {
        let b: TableValue = serde_json::from_str("true").expect("bool");
        assert_eq!(b, TableValue::Bool(true));
        let n: TableValue = serde_json::from_str("2").expect("number");
        assert_eq!(n, TableValue::Number(2.0));
    }
}
