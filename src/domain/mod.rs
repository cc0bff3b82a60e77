//! Domain types and DTOs
//!
//! These types define the marketplace entities and the rules that move
//! bids and orders between states.

pub mod bids;
pub mod orders;
pub mod providers;

// Re-export commonly used types
pub use bids::*;
pub use orders::*;
pub use providers::*;
