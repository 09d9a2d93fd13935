//! Common test utilities for the integrations
//!
//! In-memory stand-ins for the Velbus protocol library and the quakes feed
//! client, plus a host harness with state assertions.

#![allow(dead_code)]

mod mock_feed;
mod mock_velbus;
mod test_hass;

pub use mock_feed::*;
pub use mock_velbus::*;
pub use test_hass::*;
