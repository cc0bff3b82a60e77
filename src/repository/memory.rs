//! In-memory store used for local development and tests.
//!
//! A single lock guards all tables, which makes every operation atomic.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::{
    DecisionOutcome, DeclineOutcome, MarketplaceStore, StatusOutcome, StoreError, StoreResult,
    DUPLICATE_BID, ORDER_ASSIGNED, ORDER_CLOSED, ORDER_DECLINED, PROVIDER_EXISTS,
};
use crate::domain::{
    BidAction, Order, OrderBid, OrderDetails, OrderServiceItem, OrderStatus, Party,
    ServiceProvider,
};

#[derive(Default)]
struct Tables {
    providers: Vec<ServiceProvider>,
    /// Insertion order, oldest first
    orders: Vec<Order>,
    order_services: HashMap<Uuid, Vec<OrderServiceItem>>,
    bids: Vec<OrderBid>,
    /// (order_id, service_provider_id)
    rejected: HashSet<(Uuid, Uuid)>,
}

impl Tables {
    fn order_mut(&mut self, id: Uuid) -> StoreResult<&mut Order> {
        self.orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(StoreError::NotFound("Order"))
    }

    fn order(&self, id: Uuid) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn closed_reason(order: &Order) -> String {
    if order.service_provider_id.is_some() {
        ORDER_ASSIGNED.to_string()
    } else {
        ORDER_CLOSED.to_string()
    }
}

#[async_trait]
impl MarketplaceStore for InMemoryStore {
    async fn ping(&self) -> bool {
        true
    }

    async fn insert_provider(&self, provider: ServiceProvider) -> StoreResult<ServiceProvider> {
        let mut t = self.tables.lock();
        if t.providers.iter().any(|p| p.user_id == provider.user_id) {
            return Err(StoreError::Conflict(PROVIDER_EXISTS.to_string()));
        }
        t.providers.push(provider.clone());
        Ok(provider)
    }

    async fn provider(&self, id: Uuid) -> StoreResult<Option<ServiceProvider>> {
        let t = self.tables.lock();
        Ok(t.providers.iter().find(|p| p.id == id).cloned())
    }

    async fn provider_by_user(&self, user_id: Uuid) -> StoreResult<Option<ServiceProvider>> {
        let t = self.tables.lock();
        Ok(t.providers.iter().find(|p| p.user_id == user_id).cloned())
    }

    async fn eligible_providers(&self, order_id: Uuid) -> StoreResult<Vec<ServiceProvider>> {
        let t = self.tables.lock();
        let Some(order) = t.order(order_id) else {
            return Ok(Vec::new());
        };

        Ok(t.providers
            .iter()
            .filter(|p| p.is_active && p.user_id != order.user_id)
            .filter(|p| !t.rejected.contains(&(order_id, p.id)))
            .cloned()
            .collect())
    }

    async fn insert_order(&self, details: OrderDetails) -> StoreResult<OrderDetails> {
        let mut t = self.tables.lock();
        t.order_services
            .insert(details.order.id, details.services.clone());
        t.orders.push(details.order.clone());
        Ok(details)
    }

    async fn order(&self, id: Uuid) -> StoreResult<Option<OrderDetails>> {
        let t = self.tables.lock();
        Ok(t.order(id).map(|order| OrderDetails {
            order: order.clone(),
            services: t.order_services.get(&id).cloned().unwrap_or_default(),
        }))
    }

    async fn orders_for_customer(
        &self,
        user_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> StoreResult<(Vec<Order>, u64)> {
        let t = self.tables.lock();
        let mine: Vec<&Order> = t.orders.iter().rev().filter(|o| o.user_id == user_id).collect();
        let total = mine.len() as u64;
        let page = mine
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn open_orders_for_provider(&self, provider: &ServiceProvider) -> StoreResult<Vec<Order>> {
        let t = self.tables.lock();
        Ok(t.orders
            .iter()
            .rev()
            .filter(|o| o.is_open_for_bids() && o.user_id != provider.user_id)
            .filter(|o| !t.rejected.contains(&(o.id, provider.id)))
            .cloned()
            .collect())
    }

    async fn update_order_status(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        actor: Party,
    ) -> StoreResult<StatusOutcome> {
        let now = Utc::now();
        let mut t = self.tables.lock();
        let order = t.order_mut(order_id)?;
        if !order.status.can_move_to(to, actor, order.bidding_enabled) {
            return Err(StoreError::Conflict(format!(
                "Cannot move order from {} to {}",
                order.status, to
            )));
        }
        order.status = to;
        order.updated_at = now;
        let order = order.clone();

        let mut expired = Vec::new();
        if to == OrderStatus::Cancelled {
            for bid in t.bids.iter_mut().filter(|b| b.order_id == order_id) {
                if bid.expire(now) {
                    expired.push(bid.clone());
                }
            }
        }

        Ok(StatusOutcome { order, expired })
    }

    async fn decline_order(&self, order_id: Uuid, provider_id: Uuid) -> StoreResult<DeclineOutcome> {
        let mut t = self.tables.lock();
        t.order_mut(order_id)?;
        let recorded = t.rejected.insert((order_id, provider_id));

        let order = t.order_mut(order_id)?;
        let rejected_booking = !order.bidding_enabled
            && order.service_provider_id == Some(provider_id)
            && order.status == OrderStatus::Pending;
        if rejected_booking {
            order.status = OrderStatus::Rejected;
            order.updated_at = Utc::now();
        }

        Ok(DeclineOutcome {
            recorded,
            order: rejected_booking.then(|| order.clone()),
        })
    }

    async fn insert_bid(&self, bid: OrderBid) -> StoreResult<OrderBid> {
        let mut t = self.tables.lock();
        let order = t.order(bid.order_id).ok_or(StoreError::NotFound("Order"))?;
        if !order.is_open_for_bids() {
            return Err(StoreError::Conflict(closed_reason(order)));
        }
        if t.rejected.contains(&(bid.order_id, bid.service_provider_id)) {
            return Err(StoreError::Conflict(ORDER_DECLINED.to_string()));
        }
        if t.bids
            .iter()
            .any(|b| b.order_id == bid.order_id && b.service_provider_id == bid.service_provider_id)
        {
            return Err(StoreError::Conflict(DUPLICATE_BID.to_string()));
        }
        t.bids.push(bid.clone());
        Ok(bid)
    }

    async fn bid(&self, id: Uuid) -> StoreResult<Option<OrderBid>> {
        let t = self.tables.lock();
        Ok(t.bids.iter().find(|b| b.id == id).cloned())
    }

    async fn bids_for_order(&self, order_id: Uuid) -> StoreResult<Vec<OrderBid>> {
        let t = self.tables.lock();
        Ok(t.bids
            .iter()
            .filter(|b| b.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn counter_offers_for_provider(&self, provider_id: Uuid) -> StoreResult<Vec<OrderBid>> {
        let t = self.tables.lock();
        Ok(t.bids
            .iter()
            .rev()
            .filter(|b| {
                b.service_provider_id == provider_id
                    && b.status == crate::domain::BidStatus::CounterOffered
            })
            .cloned()
            .collect())
    }

    async fn decide_bid(
        &self,
        bid_id: Uuid,
        action: BidAction,
        actor: Party,
    ) -> StoreResult<DecisionOutcome> {
        let now = Utc::now();
        let mut t = self.tables.lock();

        let idx = t
            .bids
            .iter()
            .position(|b| b.id == bid_id)
            .ok_or(StoreError::NotFound("Bid"))?;
        let mut bid = t.bids[idx].clone();
        let agreed = bid.apply(&action, actor, now)?;

        let order = t.order_mut(bid.order_id)?;
        if !order.is_open_for_bids() {
            return Err(StoreError::Conflict(closed_reason(order)));
        }

        let mut assigned = None;
        if let Some(price) = agreed {
            order.assign(bid.service_provider_id, price, now);
            assigned = Some(order.clone());
        }

        t.bids[idx] = bid.clone();

        let mut expired = Vec::new();
        if assigned.is_some() {
            for sibling in t
                .bids
                .iter_mut()
                .filter(|b| b.order_id == bid.order_id && b.id != bid.id)
            {
                if sibling.expire(now) {
                    expired.push(sibling.clone());
                }
            }
        }

        Ok(DecisionOutcome {
            bid,
            order: assigned,
            expired,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BidStatus, CreateOrderRequest, OrderServiceInput};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn provider(store_user: Uuid, name: &str) -> ServiceProvider {
        ServiceProvider {
            id: Uuid::new_v4(),
            user_id: store_user,
            business_name: name.into(),
            phone: None,
            description: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn order_for(customer: Uuid, direct: Option<Uuid>) -> OrderDetails {
        CreateOrderRequest {
            address: "4 Hill Street".into(),
            city: None,
            phone: None,
            scheduled_date: NaiveDate::from_ymd_opt(2026, 11, 5).unwrap(),
            scheduled_time: "14:00".into(),
            notes: None,
            services: vec![OrderServiceInput {
                service_id: None,
                title: "Deep cleaning".into(),
                price: Decimal::from(1000),
                quantity: 1,
                image: None,
            }],
            service_provider_id: direct,
        }
        .into_order(customer, Utc::now())
    }

    fn bid_on(order: &Order, provider: &ServiceProvider, price: i64) -> OrderBid {
        OrderBid::new(
            order.id,
            provider.id,
            order.original_amount,
            Decimal::from(price),
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn declined_provider_is_no_longer_eligible() {
        let store = InMemoryStore::new();
        let customer = Uuid::new_v4();
        let p1 = store.insert_provider(provider(Uuid::new_v4(), "Sparkle")).await.unwrap();
        let p2 = store.insert_provider(provider(Uuid::new_v4(), "Shine")).await.unwrap();
        let order = store.insert_order(order_for(customer, None)).await.unwrap().order;

        assert_eq!(store.eligible_providers(order.id).await.unwrap().len(), 2);

        let first = store.decline_order(order.id, p1.id).await.unwrap();
        assert!(first.recorded);
        assert!(first.order.is_none());
        let again = store.decline_order(order.id, p1.id).await.unwrap();
        assert!(!again.recorded);

        let eligible = store.eligible_providers(order.id).await.unwrap();
        assert_eq!(eligible, vec![p2.clone()]);
        assert!(store.open_orders_for_provider(&p1).await.unwrap().is_empty());
        assert_eq!(store.open_orders_for_provider(&p2).await.unwrap().len(), 1);

        let err = store.insert_bid(bid_on(&order, &p1, 900)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref m) if m == ORDER_DECLINED));
    }

    #[tokio::test]
    async fn one_bid_per_provider_per_order() {
        let store = InMemoryStore::new();
        let p = store.insert_provider(provider(Uuid::new_v4(), "Fixit")).await.unwrap();
        let order = store.insert_order(order_for(Uuid::new_v4(), None)).await.unwrap().order;

        store.insert_bid(bid_on(&order, &p, 900)).await.unwrap();
        let err = store.insert_bid(bid_on(&order, &p, 800)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref m) if m == DUPLICATE_BID));
    }

    #[tokio::test]
    async fn accept_assigns_order_and_expires_siblings() {
        let store = InMemoryStore::new();
        let a = store.insert_provider(provider(Uuid::new_v4(), "A")).await.unwrap();
        let b = store.insert_provider(provider(Uuid::new_v4(), "B")).await.unwrap();
        let c = store.insert_provider(provider(Uuid::new_v4(), "C")).await.unwrap();
        let order = store.insert_order(order_for(Uuid::new_v4(), None)).await.unwrap().order;

        let winner = store.insert_bid(bid_on(&order, &a, 900)).await.unwrap();
        let loser = store.insert_bid(bid_on(&order, &b, 950)).await.unwrap();
        let rejected = store.insert_bid(bid_on(&order, &c, 990)).await.unwrap();
        store
            .decide_bid(rejected.id, BidAction::Reject, Party::Customer)
            .await
            .unwrap();

        let outcome = store
            .decide_bid(winner.id, BidAction::Accept, Party::Customer)
            .await
            .unwrap();
        assert_eq!(outcome.bid.status, BidStatus::Accepted);
        let assigned = outcome.order.unwrap();
        assert_eq!(assigned.service_provider_id, Some(a.id));
        assert_eq!(assigned.amount, Decimal::from(900));
        assert!(assigned.is_negotiated);
        assert_eq!(outcome.expired.len(), 1);
        assert_eq!(outcome.expired[0].id, loser.id);

        let loser = store.bid(loser.id).await.unwrap().unwrap();
        assert_eq!(loser.status, BidStatus::Expired);
        let rejected = store.bid(rejected.id).await.unwrap().unwrap();
        assert_eq!(rejected.status, BidStatus::Rejected);

        // order is gone from the bidding pool
        let late = store.insert_provider(provider(Uuid::new_v4(), "D")).await.unwrap();
        let err = store.insert_bid(bid_on(&order, &late, 500)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref m) if m == ORDER_ASSIGNED));
    }

    #[tokio::test]
    async fn failed_decision_changes_nothing() {
        let store = InMemoryStore::new();
        let p = store.insert_provider(provider(Uuid::new_v4(), "A")).await.unwrap();
        let order = store.insert_order(order_for(Uuid::new_v4(), None)).await.unwrap().order;
        let bid = store.insert_bid(bid_on(&order, &p, 900)).await.unwrap();

        let err = store
            .decide_bid(bid.id, BidAction::Accept, Party::Provider)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Transition(_)));
        assert_eq!(store.bid(bid.id).await.unwrap().unwrap(), bid);
        let order = store.order(order.id).await.unwrap().unwrap().order;
        assert_eq!(order.service_provider_id, None);
    }

    #[tokio::test]
    async fn provider_declining_direct_booking_rejects_it() {
        let store = InMemoryStore::new();
        let p = store.insert_provider(provider(Uuid::new_v4(), "A")).await.unwrap();
        let order = store
            .insert_order(order_for(Uuid::new_v4(), Some(p.id)))
            .await
            .unwrap()
            .order;

        let outcome = store.decline_order(order.id, p.id).await.unwrap();
        assert_eq!(outcome.order.unwrap().status, OrderStatus::Rejected);
    }

    #[tokio::test]
    async fn status_changes_follow_party_rules() {
        let store = InMemoryStore::new();
        let p = store.insert_provider(provider(Uuid::new_v4(), "A")).await.unwrap();
        let order = store
            .insert_order(order_for(Uuid::new_v4(), Some(p.id)))
            .await
            .unwrap()
            .order;

        let err = store
            .update_order_status(order.id, OrderStatus::Completed, Party::Provider)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        for to in [OrderStatus::Accepted, OrderStatus::InProgress, OrderStatus::Completed] {
            let updated = store
                .update_order_status(order.id, to, Party::Provider)
                .await
                .unwrap();
            assert_eq!(updated.order.status, to);
            assert!(updated.expired.is_empty());
        }
    }

    #[tokio::test]
    async fn cancelling_expires_live_bids() {
        let store = InMemoryStore::new();
        let a = store.insert_provider(provider(Uuid::new_v4(), "A")).await.unwrap();
        let b = store.insert_provider(provider(Uuid::new_v4(), "B")).await.unwrap();
        let order = store.insert_order(order_for(Uuid::new_v4(), None)).await.unwrap().order;

        let countered = store.insert_bid(bid_on(&order, &a, 900)).await.unwrap();
        store
            .decide_bid(countered.id, BidAction::CounterOffer(Decimal::from(850)), Party::Customer)
            .await
            .unwrap();
        let pending = store.insert_bid(bid_on(&order, &b, 950)).await.unwrap();

        let outcome = store
            .update_order_status(order.id, OrderStatus::Cancelled, Party::Customer)
            .await
            .unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Cancelled);
        let mut ids: Vec<_> = outcome.expired.iter().map(|b| b.id).collect();
        ids.sort();
        let mut expected = vec![countered.id, pending.id];
        expected.sort();
        assert_eq!(ids, expected);

        for bid in store.bids_for_order(order.id).await.unwrap() {
            assert_eq!(bid.status, BidStatus::Expired);
        }
        assert!(store.counter_offers_for_provider(a.id).await.unwrap().is_empty());

        let err = store
            .decide_bid(countered.id, BidAction::Accept, Party::Provider)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Transition(_)));
        let order = store.order(order.id).await.unwrap().unwrap().order;
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.service_provider_id, None);
    }
}
