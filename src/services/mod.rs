//! Service layer
//!
//! Bidding and order workflows on top of the store, plus the Redis relay
//! that shares realtime events between instances.

pub mod bidding;
pub mod orders;
pub mod relay;

pub use bidding::BiddingService;
pub use orders::OrdersService;
pub use relay::RedisRelay;
