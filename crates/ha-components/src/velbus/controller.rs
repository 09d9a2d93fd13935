//! Seam to the Velbus protocol library
//!
//! The bus protocol itself lives outside this crate. Integrations talk to it
//! through these traits; tests provide in-memory implementations.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VelbusError {
    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Invoked once a scan has found every module on the bus
pub type ScanCallback = Box<dyn FnOnce(Vec<Arc<dyn VelbusModule>>) + Send>;

/// Invoked whenever a module reports a new status for a channel
pub type StatusListener = Box<dyn Fn() + Send + Sync>;

/// Opens connections to a bus
#[async_trait]
pub trait VelbusConnector: Send + Sync {
    /// Open the bus on a serial device (`/dev/ttyACM0`) or `host:port`
    async fn connect(&self, port: &str) -> Result<Arc<dyn VelbusController>, VelbusError>;
}

/// A live bus connection
#[async_trait]
pub trait VelbusController: Send + Sync {
    /// Start scanning for modules; `callback` runs when the scan completes
    fn scan(&self, callback: ScanCallback) -> Result<(), VelbusError>;

    /// Broadcast the current time to every module
    async fn sync_clock(&self) -> Result<(), VelbusError>;

    /// Close the connection
    fn stop(&self);
}

/// A module found on the bus. Channels are numbered from 1.
pub trait VelbusModule: Send + Sync {
    fn address(&self) -> u8;

    /// Programmed serial number, 0 when none is set
    fn serial(&self) -> u32;

    fn number_of_channels(&self) -> u8;

    /// Platform categories the channel can be exposed as (`switch`, `sensor`, ...)
    fn categories(&self, channel: u8) -> Vec<String>;

    fn name(&self, channel: u8) -> String;

    /// Module type, e.g. `VMB4RYLD`
    fn module_name(&self) -> String;

    fn memory_map_version(&self) -> u32;
    fn build_year(&self) -> u32;
    fn build_week(&self) -> u32;

    fn on_status_update(&self, channel: u8, listener: StatusListener);

    fn is_on(&self, channel: u8) -> bool;
    fn is_closed(&self, channel: u8) -> bool;
    fn sensor_value(&self, channel: u8) -> Option<f64>;
    fn sensor_unit(&self, channel: u8) -> Option<String>;
    /// Cover position in percent, 100 fully open
    fn cover_position(&self, channel: u8) -> Option<u8>;
    fn current_temperature(&self, channel: u8) -> Option<f64>;
    fn target_temperature(&self, channel: u8) -> Option<f64>;
}
