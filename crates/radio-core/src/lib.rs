//! Station catalog, artwork resolution and playback coordination for the
//! radio kiosk.
//!
//! Data flows one way at startup: [`catalog`] parses the station file into
//! [`station::StationRecord`]s, [`core::RadioCore`] binds them to slots in the
//! [`registry::StationRegistry`] and asks the [`fetcher::AssetFetcher`] for any
//! remote artwork. From then on every mutation happens inside the core's event
//! loop; fetch completions and player notifications arrive there as
//! [`core::RadioEvent`]s.

pub mod catalog;
pub mod color;
pub mod config;
pub mod core;
pub mod error;
pub mod fetcher;
pub mod platform;
pub mod playback;
pub mod player;
pub mod registry;
pub mod station;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
