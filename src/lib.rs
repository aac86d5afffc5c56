//! Session pool for a single persistent, authenticated browser session
//! multiplexed across a fixed number of tabs.
//!
//! The core pieces: [`driver`] abstracts the rendering engine behind a
//! small trait so the rest of the crate never touches `chromiumoxide`
//! directly, [`slot`] drives one tab through the send-and-extract protocol,
//! [`clipboard`] serializes and performs the actual response extraction,
//! and [`pool`] owns the fleet of slots plus the FIFO lease queue and
//! background health/inactivity monitors. [`api`] wires all of that to an
//! HTTP surface.

pub mod api;
pub mod clipboard;
pub mod config;
pub mod driver;
pub mod error;
pub mod pool;
pub mod selectors;
pub mod slot;
