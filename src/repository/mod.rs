//! Persistence for providers, orders and bids.
//!
//! Every operation that reads a row and then writes a state derived from it
//! runs as one atomic unit inside the store, so concurrent decisions on the
//! same order are serialized rather than racing.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    BidAction, Order, OrderBid, OrderDetails, OrderStatus, Party, ServiceProvider, TransitionError,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a bid decision
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub bid: OrderBid,
    /// Set when acceptance assigned the order
    pub order: Option<Order>,
    /// Sibling bids expired by the acceptance
    pub expired: Vec<OrderBid>,
}

/// Result of an order status change
#[derive(Debug, Clone)]
pub struct StatusOutcome {
    pub order: Order,
    /// Live bids expired because the order was cancelled
    pub expired: Vec<OrderBid>,
}

/// Result of a provider declining an order
#[derive(Debug, Clone)]
pub struct DeclineOutcome {
    /// False when the provider had already declined this order
    pub recorded: bool,
    /// Set when a direct booking was rejected as a consequence
    pub order: Option<Order>,
}

#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    async fn ping(&self) -> bool;

    // Providers

    /// Fails with `Conflict` when the user already has a profile
    async fn insert_provider(&self, provider: ServiceProvider) -> StoreResult<ServiceProvider>;
    async fn provider(&self, id: Uuid) -> StoreResult<Option<ServiceProvider>>;
    async fn provider_by_user(&self, user_id: Uuid) -> StoreResult<Option<ServiceProvider>>;
    /// Active providers that may still be offered the order
    async fn eligible_providers(&self, order_id: Uuid) -> StoreResult<Vec<ServiceProvider>>;

    // Orders

    async fn insert_order(&self, details: OrderDetails) -> StoreResult<OrderDetails>;
    async fn order(&self, id: Uuid) -> StoreResult<Option<OrderDetails>>;
    async fn orders_for_customer(
        &self,
        user_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> StoreResult<(Vec<Order>, u64)>;
    /// Orders open for bids that the provider has not declined
    async fn open_orders_for_provider(&self, provider: &ServiceProvider) -> StoreResult<Vec<Order>>;
    /// Cancelling also expires the order's live bids
    async fn update_order_status(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        actor: Party,
    ) -> StoreResult<StatusOutcome>;
    async fn decline_order(&self, order_id: Uuid, provider_id: Uuid) -> StoreResult<DeclineOutcome>;

    // Bids

    /// Fails with `Conflict` when the order is closed, was declined by the
    /// provider, or already carries a bid from the provider
    async fn insert_bid(&self, bid: OrderBid) -> StoreResult<OrderBid>;
    async fn bid(&self, id: Uuid) -> StoreResult<Option<OrderBid>>;
    async fn bids_for_order(&self, order_id: Uuid) -> StoreResult<Vec<OrderBid>>;
    async fn counter_offers_for_provider(&self, provider_id: Uuid) -> StoreResult<Vec<OrderBid>>;
    /// Apply a decision. Acceptance also expires live siblings and assigns the order.
    async fn decide_bid(
        &self,
        bid_id: Uuid,
        action: BidAction,
        actor: Party,
    ) -> StoreResult<DecisionOutcome>;
}

pub type SharedStore = Arc<dyn MarketplaceStore>;

pub(crate) const ORDER_ASSIGNED: &str = "Order has already been assigned to a provider";
pub(crate) const ORDER_CLOSED: &str = "Order is not accepting bids";
pub(crate) const ORDER_DECLINED: &str = "You have declined this order";
pub(crate) const DUPLICATE_BID: &str = "You have already placed a bid on this order";
pub(crate) const PROVIDER_EXISTS: &str = "Provider profile already exists";
