//! Error taxonomy for the vision client.
//!
//! Four failure classes cover everything the loop can hit:
//!
//! - `ConnectionTimeout`: the remote table never signaled connected. Fatal.
//! - `DeviceUnavailable`: a camera could not be opened or read. The caller
//!   degrades to a placeholder frame and keeps running.
//! - `NoTargetDetected`: the pipeline found nothing qualifying this iteration.
//!   The loop skips publishing and moves on.
//! - `MalformedConfig`: a configuration value (including an unrecognized `Mode`
//!   read off the table) made no sense. Treated as idle.

use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum VisionError {
    /// The remote table never signaled connected within the deadline.
    ConnectionTimeout { server: String, waited: Duration },
    /// A camera device could not be opened or read.
    DeviceUnavailable { identifier: String, reason: String },
    /// The pipeline produced no qualifying target this iteration.
    NoTargetDetected,
    /// A configuration value made no sense.
    MalformedConfig { detail: String },
}

impl fmt::Display for VisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisionError::ConnectionTimeout { server, waited } => {
                write!(
                    f,
                    "table at {} did not connect within {:.1}s",
                    server,
                    waited.as_secs_f64()
                )
            }
            VisionError::DeviceUnavailable { identifier, reason } => {
                write!(f, "camera '{}' unavailable: {}", identifier, reason)
            }
            VisionError::NoTargetDetected => write!(f, "no qualifying target in frame"),
            VisionError::MalformedConfig { detail } => {
                write!(f, "malformed configuration: {}", detail)
            }
        }
    }
}

impl std::error::Error for VisionError {}

impl VisionError {
    /// True for failures the loop recovers from locally (substitute value,
    /// skip an iteration). Connection loss is the only fatal class.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, VisionError::ConnectionTimeout { .. })
    }
}
