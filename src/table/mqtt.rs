//! MQTT-backed table channel.
//!
//! Keys map to retained topics under a configurable prefix
//! (`SmartDashboard/<key>` by default) with JSON payloads, so the latest
//! value of every key is replayed on subscribe and the table behaves like a
//! shared key-value store. The synchronous v5 client is used; the control
//! loop drains pending events before every read, which keeps the local mirror
//! equal to the latest externally observed state without a second thread.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{Client, Connection, Event, MqttOptions};

use crate::config::TableSettings;
use crate::error::VisionError;
use crate::table::{TableChannel, TableValue};

pub struct MqttTable {
    client: Client,
    connection: Connection,
    server: String,
    topic_prefix: String,
    store: HashMap<String, TableValue>,
    connected: bool,
}

impl MqttTable {
    /// Open a session against the broker. The caller still has to
    /// [`wait_connected`](TableChannel::wait_connected) before polling.
    pub fn open(settings: &TableSettings) -> Result<Self, VisionError> {
        let (host, port) = split_server(&settings.server)?;
        let mut options = MqttOptions::new(settings.client_id.clone(), host, port);
        options.set_keep_alive(Duration::from_secs(5));

        let (client, connection) = Client::new(options, 64);
        Ok(Self {
            client,
            connection,
            server: settings.server.clone(),
            topic_prefix: settings.topic_prefix.clone(),
            store: HashMap::new(),
            connected: false,
        })
    }

    fn topic(&self, key: &str) -> String {
        format!("{}/{}", self.topic_prefix, key)
    }

    fn apply_packet(&mut self, packet: Packet) {
        match packet {
            Packet::ConnAck(_) => {
                self.connected = true;
            }
            Packet::Disconnect(_) => {
                self.connected = false;
            }
            Packet::Publish(publish) => {
                let Ok(topic) = String::from_utf8(publish.topic.to_vec()) else {
                    return;
                };
                let Some(key) = topic.strip_prefix(&format!("{}/", self.topic_prefix)) else {
                    return;
                };
                match serde_json::from_slice::<TableValue>(&publish.payload) {
                    Ok(value) => {
                        self.store.insert(key.to_string(), value);
                    }
                    Err(err) => {
                        log::warn!("table: undecodable payload on '{}': {}", topic, err);
                    }
                }
            }
            _ => {}
        }
    }

    /// Drain everything the event loop has pending without blocking.
    fn drain(&mut self) {
        loop {
            match self.connection.try_recv() {
                Ok(Ok(Event::Incoming(packet))) => self.apply_packet(packet),
                Ok(Ok(Event::Outgoing(_))) => {}
                Ok(Err(err)) => {
                    log::warn!("table: connection error: {}", err);
                    self.connected = false;
                    break;
                }
                Err(_) => break,
            }
        }
    }

    fn publish(&mut self, key: &str, value: TableValue) {
        let topic = self.topic(key);
        let payload = match serde_json::to_vec(&value) {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("table: failed to encode '{}': {}", key, err);
                return;
            }
        };
        if let Err(err) = self
            .client
            .try_publish(topic, QoS::AtLeastOnce, true, payload)
        {
            log::warn!("table: publish of '{}' dropped: {}", key, err);
        }
    }
}

impl TableChannel for MqttTable {
    fn wait_connected(&mut self, timeout: Duration) -> Result<(), VisionError> {
        let deadline = Instant::now() + timeout;
        while !self.connected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(VisionError::ConnectionTimeout {
                    server: self.server.clone(),
                    waited: timeout,
                });
            }
            match self.connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(packet))) => self.apply_packet(packet),
                Ok(Ok(Event::Outgoing(_))) => {}
                Ok(Err(err)) => {
                    log::warn!("table: waiting for broker: {}", err);
                    // The event loop retries internally; keep waiting out the deadline.
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(_) => {
                    return Err(VisionError::ConnectionTimeout {
                        server: self.server.clone(),
                        waited: timeout,
                    });
                }
            }
        }

        if let Err(err) = self
            .client
            .subscribe(format!("{}/#", self.topic_prefix), QoS::AtLeastOnce)
        {
            log::warn!("table: subscribe failed: {}", err);
        }
        log::info!("table: connected, mirroring '{}/#'", self.topic_prefix);
        Ok(())
    }

    fn connected(&mut self) -> bool {
        self.drain();
        self.connected
    }

    fn get_bool(&mut self, key: &str, default: bool) -> bool {
        self.drain();
        match self.store.get(key) {
            Some(TableValue::Bool(b)) => *b,
            _ => default,
        }
    }

    fn get_number(&mut self, key: &str, default: f64) -> f64 {
        self.drain();
        match self.store.get(key) {
            Some(TableValue::Number(n)) => *n,
            _ => default,
        }
    }

    fn get_number_array(&mut self, key: &str, default: &[f64]) -> Vec<f64> {
        self.drain();
        match self.store.get(key) {
            Some(TableValue::NumberArray(values)) => values.clone(),
            _ => default.to_vec(),
        }
    }

    fn put_bool(&mut self, key: &str, value: bool) {
        self.publish(key, TableValue::Bool(value));
    }

    fn put_number(&mut self, key: &str, value: f64) {
        self.publish(key, TableValue::Number(value));
    }

    fn put_number_array(&mut self, key: &str, values: &[f64]) {
        self.publish(key, TableValue::NumberArray(values.to_vec()));
    }
}

fn split_server(server: &str) -> Result<(String, u16), VisionError> {
    let (host, port) = server
        .rsplit_once(':')
        .ok_or_else(|| VisionError::MalformedConfig {
            detail: format!("table server '{}' is not host:port", server),
        })?;
    let port: u16 = port.parse().map_err(|_| VisionError::MalformedConfig {
        detail: format!("table server port in '{}' is not a number", server),
    })?;
    Ok((host.to_string(), port))
}
