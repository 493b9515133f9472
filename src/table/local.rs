//! In-process table for tests and the offline demo.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::VisionError;
use crate::table::{TableChannel, TableValue};

/// A `TableChannel` backed by a plain map. Always connected until
/// [`LocalTable::disconnect`] is called.
#[derive(Debug, Default)]
pub struct LocalTable {
    store: HashMap<String, TableValue>,
    disconnected: bool,
}

impl LocalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the remote side going away.
    pub fn disconnect(&mut self) {
        self.disconnected = true;
    }

    /// Raw view of a stored value, for assertions.
    pub fn raw(&self, key: &str) -> Option<&TableValue> {
        self.store.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }
}

impl TableChannel for LocalTable {
    fn wait_connected(&mut self, _timeout: Duration) -> Result<(), VisionError> {
        Ok(())
    }

    fn connected(&mut self) -> bool {
        !self.disconnected
    }

    fn get_bool(&mut self, key: &str, default: bool) -> bool {
        match self.store.get(key) {
            Some(TableValue::Bool(b)) => *b,
            _ => default,
        }
    }

    fn get_number(&mut self, key: &str, default: f64) -> f64 {
        match self.store.get(key) {
            Some(TableValue::Number(n)) => *n,
            _ => default,
        }
    }

    fn get_number_array(&mut self, key: &str, default: &[f64]) -> Vec<f64> {
        match self.store.get(key) {
            Some(TableValue::NumberArray(values)) => values.clone(),
            _ => default.to_vec(),
        }
    }

    fn put_bool(&mut self, key: &str, value: bool) {
        self.store.insert(key.to_string(), TableValue::Bool(value));
    }

    fn put_number(&mut self, key: &str, value: f64) {
        self.store
            .insert(key.to_string(), TableValue::Number(value));
    }

    fn put_number_array(&mut self, key: &str, values: &[f64]) {
        self.store
            .insert(key.to_string(), TableValue::NumberArray(values.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_keys_return_defaults() {
        let mut table = LocalTable::new();
        assert!(!table.get_bool("Enabled", false));
        assert_eq!(table.get_number("Mode", -1.0), -1.0);
        assert_eq!(table.get_number_array("contour centers", &[1.0]), vec![1.0]);
    }

    #[test]
    fn number_array_round_trips_in_order() {
        let mut table = LocalTable::new();
        let centers = [140.0, 105.0, 33.0, 47.0];
        table.put_number_array("contour centers", &centers);
        assert_eq!(
            table.get_number_array("contour centers", &[]),
            centers.to_vec()
        );
    }

    #[test]
    fn type_mismatch_reads_as_default() {
        let mut table = LocalTable::new();
        table.put_number("Enabled", 1.0);
        assert!(!table.get_bool("Enabled", false));
    }

    #[test]
    fn disconnect_flips_connected() {
        let mut table = LocalTable::new();
        assert!(table.connected());
        table.disconnect();
        assert!(!table.connected());
    }
}
