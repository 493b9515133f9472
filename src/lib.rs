//! Robot-mounted vision client.
//!
//! Watches a remote key-value table for a mode flag, runs a fixed contour
//! or tracking pipeline over camera frames, and publishes direction,
//! distance, and contour geometry back to the table for the drive side to
//! consume. Cameras degrade to placeholder frames instead of failing the
//! client; only losing the table connection ends the loop.
//!
//! Layout:
//! - [`table`] — the table channel trait, the MQTT transport, and an
//!   in-process table for tests
//! - [`source`] — camera backends behind one identifier scheme
//! - [`pipeline`] — the contour and tracking operation families
//! - [`client`] — the mode-driven control loop
//! - [`stream`] — the MJPEG dashboard stream
//! - [`config`] — TOML + environment configuration

pub mod client;
pub mod config;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod source;
pub mod stream;
pub mod table;

pub use client::{Mode, VisionClient};
pub use config::ClientConfig;
pub use error::VisionError;
pub use frame::Frame;
