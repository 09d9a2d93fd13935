//! Home Assistant Built-in Components
//!
//! Integrations that run on the native host: the Velbus bus adapter and the
//! GeoNet NZ Quakes feed, plus the shared `geo_location` rendering helpers.

pub mod geo_location;
pub mod geonetnz_quakes;
pub mod velbus;
