//! Typed client for the marketplace API
//!
//! - [`MarketplaceClient`] wraps the REST endpoints behind an explicit [`Session`]
//! - [`BidBoard`] reconciles bids arriving from fetches, polls, pushes and acks
//! - [`BidWatcher`] keeps a board current for one order
//! - [`BidDecisions`] issues accept/reject/counter commands
//! - [`RealtimeClient`] holds the socket connection and reconnects on loss

use std::time::Duration;

pub mod api;
pub mod decisions;
pub mod error;
pub mod reconcile;
pub mod session;
pub mod socket;
pub mod validate;
pub mod watcher;

pub use api::{BidsApi, MarketplaceClient};
pub use decisions::{AcceptedBid, BidCommand, BidDecisions};
pub use error::{ClientError, ClientResult};
pub use reconcile::{BidBoard, BidSource, BoardEvent, BoardPhase, BoardView, MergeReport};
pub use session::Session;
pub use socket::{RealtimeClient, RealtimeHandle};
pub use validate::CounterOfferDraft;
pub use watcher::{BidWatcher, BoardSink, WatcherCommand, WatcherHandle};

/// Client timing knobs
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bid refetch period while an order has no bids yet
    pub poll_interval: Duration,
    /// Reconnection attempts after a lost or failed connection
    pub reconnect_attempts: u32,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(20),
        }
    }
}
