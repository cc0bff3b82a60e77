//! Bid submission and decisions
//!
//! The store applies each change atomically; this layer resolves who is
//! acting and fans out the committed result to the affected rooms.

use chrono::Utc;
use uuid::Uuid;

use crate::domain::{
    BidAction, BidStatus, CounterOfferSummary, CreateBidRequest, OrderBid, OrderDetails, Party,
    ServiceProvider,
};
use crate::error::{ApiError, ApiResult};
use crate::realtime::{notify, Room, RoomHub, REASON_ORDER_ASSIGNED};
use crate::repository::{DecisionOutcome, MarketplaceStore};

pub(crate) const PROVIDER_NOT_LOADED: &str = "Provider information not loaded";

/// Pair expired bids with their provider's user id. A bid whose provider
/// cannot be resolved is kept so the customer still hears about it.
pub(crate) async fn expired_with_providers(
    store: &dyn MarketplaceStore,
    expired: &[OrderBid],
) -> Vec<(Option<Uuid>, OrderBid)> {
    let mut out = Vec::with_capacity(expired.len());
    for bid in expired {
        let user_id = match store.provider(bid.service_provider_id).await {
            Ok(p) => p.map(|p| p.user_id),
            Err(e) => {
                tracing::warn!(error = %e, bid_id = %bid.id, "Could not resolve provider of expired bid");
                None
            }
        };
        out.push((user_id, bid.clone()));
    }
    out
}

pub struct BiddingService<'a> {
    store: &'a dyn MarketplaceStore,
    hub: &'a RoomHub,
}

impl<'a> BiddingService<'a> {
    pub fn new(store: &'a dyn MarketplaceStore, hub: &'a RoomHub) -> Self {
        Self { store, hub }
    }

    async fn caller_provider(&self, user_id: Uuid) -> ApiResult<ServiceProvider> {
        self.store
            .provider_by_user(user_id)
            .await?
            .ok_or_else(|| ApiError::not_found(PROVIDER_NOT_LOADED))
    }

    async fn order(&self, order_id: Uuid) -> ApiResult<OrderDetails> {
        self.store
            .order(order_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Order not found"))
    }

    /// Place a pending bid on an open order as the caller's provider profile
    pub async fn submit(&self, user_id: Uuid, req: CreateBidRequest) -> ApiResult<OrderBid> {
        req.validate().map_err(ApiError::bad_request)?;

        let provider = self.caller_provider(user_id).await?;
        if req.service_provider_id.is_some_and(|id| id != provider.id) {
            return Err(ApiError::forbidden(
                "You can only bid with your own provider profile",
            ));
        }

        let order = self.order(req.order_id).await?.order;
        if order.user_id == user_id {
            return Err(ApiError::forbidden("You cannot bid on your own order"));
        }

        let bid = OrderBid::new(
            order.id,
            provider.id,
            order.original_amount,
            req.bid_price,
            req.message(),
            Utc::now(),
        );
        let bid = self.store.insert_bid(bid).await?;

        tracing::info!(
            user_id = %user_id,
            bid_id = %bid.id,
            order_id = %bid.order_id,
            bid_price = %bid.bid_price,
            "Bid submitted"
        );

        notify::notify_new_bid(self.hub, order.user_id, &bid, &provider);
        Ok(bid)
    }

    /// The owner sees every bid on the order; a provider sees only their own
    pub async fn bids_for_order(&self, user_id: Uuid, order_id: Uuid) -> ApiResult<Vec<OrderBid>> {
        let order = self.order(order_id).await?.order;
        let bids = self.store.bids_for_order(order_id).await?;

        if order.user_id == user_id {
            return Ok(bids);
        }

        let Some(provider) = self.store.provider_by_user(user_id).await? else {
            return Err(ApiError::forbidden("You do not have access to this order"));
        };

        Ok(bids
            .into_iter()
            .filter(|b| b.service_provider_id == provider.id)
            .collect())
    }

    /// Accept, reject or counter a bid on behalf of whichever party the caller is
    pub async fn decide(
        &self,
        user_id: Uuid,
        bid_id: Uuid,
        action: BidAction,
    ) -> ApiResult<OrderBid> {
        let bid = self
            .store
            .bid(bid_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Bid not found"))?;
        let order = self.order(bid.order_id).await?.order;
        let provider = self
            .store
            .provider(bid.service_provider_id)
            .await?
            .ok_or_else(|| ApiError::not_found(PROVIDER_NOT_LOADED))?;

        let actor = if order.user_id == user_id {
            Party::Customer
        } else if provider.user_id == user_id {
            Party::Provider
        } else {
            return Err(ApiError::forbidden("You are not a party to this bid"));
        };

        let outcome = self.store.decide_bid(bid_id, action, actor).await?;

        tracing::info!(
            user_id = %user_id,
            bid_id = %bid_id,
            actor = %actor,
            action = action.name(),
            status = %outcome.bid.status,
            version = outcome.bid.version,
            "Bid decision applied"
        );

        self.emit(order.user_id, &provider, actor, &outcome).await;
        Ok(outcome.bid)
    }

    async fn emit(
        &self,
        customer_id: Uuid,
        provider: &ServiceProvider,
        actor: Party,
        outcome: &DecisionOutcome,
    ) {
        let bid = &outcome.bid;
        match bid.status {
            BidStatus::CounterOffered => notify::notify_counter_offer(self.hub, provider.user_id, bid),
            _ => notify::notify_bid_decided(self.hub, customer_id, provider.user_id, bid),
        }

        if let Some(order) = &outcome.order {
            let counterpart = match actor {
                Party::Customer => Room::Provider(provider.user_id),
                Party::Provider => Room::Customer(customer_id),
            };
            notify::notify_order_updated(self.hub, counterpart, order);
        }

        if outcome.expired.is_empty() {
            return;
        }

        let losers = expired_with_providers(self.store, &outcome.expired).await;
        notify::notify_bids_expired(self.hub, customer_id, &losers, REASON_ORDER_ASSIGNED);
    }

    /// Bids of the caller's provider profile that await an answer to a counter-offer
    pub async fn counter_offers(
        &self,
        user_id: Uuid,
        provider_id: Uuid,
    ) -> ApiResult<Vec<CounterOfferSummary>> {
        let provider = self.caller_provider(user_id).await?;
        if provider.id != provider_id {
            return Err(ApiError::forbidden(
                "You can only view counter offers for your own provider profile",
            ));
        }

        let bids = self.store.counter_offers_for_provider(provider.id).await?;
        Ok(bids
            .into_iter()
            .filter_map(CounterOfferSummary::from_bid)
            .collect())
    }
}
