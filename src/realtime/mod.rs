//! Realtime fan-out over WebSockets
//!
//! Clients join rooms keyed by their own user id and receive the events
//! addressed to those rooms. Delivery is best-effort.

pub mod events;
pub mod hub;
pub mod notify;
pub mod socket;

pub use events::*;
pub use hub::{Room, RoomHub, RoomMessage};
