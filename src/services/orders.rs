//! Checkout, order visibility and provider declines

use chrono::Utc;
use uuid::Uuid;

use crate::domain::{
    CreateOrderRequest, Order, OrderDetails, OrderStatus, Party, ServiceProvider,
};
use crate::error::{ApiError, ApiResult};
use crate::realtime::{notify, Room, RoomHub, REASON_ORDER_CANCELLED};
use crate::repository::MarketplaceStore;

use super::bidding::{expired_with_providers, PROVIDER_NOT_LOADED};

pub struct OrdersService<'a> {
    store: &'a dyn MarketplaceStore,
    hub: &'a RoomHub,
}

impl<'a> OrdersService<'a> {
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

    /// Checkout. A direct booking goes to its provider; anything else is
    /// offered to every eligible provider for bidding.
    pub async fn create(&self, user_id: Uuid, req: CreateOrderRequest) -> ApiResult<OrderDetails> {
        req.validate().map_err(ApiError::BadRequest)?;

        let direct = match req.service_provider_id {
            Some(id) => {
                let provider = self
                    .store
                    .provider(id)
                    .await?
                    .filter(|p| p.is_active)
                    .ok_or_else(|| ApiError::not_found("Service provider not found"))?;
                if provider.user_id == user_id {
                    return Err(ApiError::bad_request("You cannot book your own services"));
                }
                Some(provider)
            }
            None => None,
        };

        let details = self
            .store
            .insert_order(req.into_order(user_id, Utc::now()))
            .await?;

        tracing::info!(
            user_id = %user_id,
            order_id = %details.order.id,
            amount = %details.order.amount,
            bidding = details.order.bidding_enabled,
            "Order created"
        );

        let recipients: Vec<Uuid> = match direct {
            Some(provider) => vec![provider.user_id],
            None => self
                .store
                .eligible_providers(details.order.id)
                .await?
                .into_iter()
                .map(|p| p.user_id)
                .collect(),
        };
        notify::notify_new_order_request(self.hub, &recipients, &details);

        Ok(details)
    }

    /// Orders placed by the caller, newest first
    pub async fn list(&self, user_id: Uuid, limit: u32, offset: u32) -> ApiResult<(Vec<Order>, u64)> {
        Ok(self.store.orders_for_customer(user_id, limit, offset).await?)
    }

    /// Visible to the owner, the assigned provider and providers who bid on it
    pub async fn get(&self, user_id: Uuid, order_id: Uuid) -> ApiResult<OrderDetails> {
        let details = self.order(order_id).await?;
        if details.order.user_id == user_id {
            return Ok(details);
        }

        if let Some(provider) = self.store.provider_by_user(user_id).await? {
            if details.order.service_provider_id == Some(provider.id) {
                return Ok(details);
            }
            let bids = self.store.bids_for_order(order_id).await?;
            if bids.iter().any(|b| b.service_provider_id == provider.id) {
                return Ok(details);
            }
        }

        Err(ApiError::forbidden("You do not have access to this order"))
    }

    /// Orders the caller's provider profile may still bid on
    pub async fn available(&self, user_id: Uuid) -> ApiResult<Vec<Order>> {
        let provider = self.caller_provider(user_id).await?;
        Ok(self.store.open_orders_for_provider(&provider).await?)
    }

    /// Record that a provider declined an order. Repeated declines are no-ops.
    ///
    /// `provider_id` defaults to the caller's profile and must match it when given.
    pub async fn decline(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        provider_id: Option<Uuid>,
    ) -> ApiResult<bool> {
        let provider = self.caller_provider(user_id).await?;
        if provider_id.is_some_and(|id| id != provider.id) {
            return Err(ApiError::forbidden(
                "You can only decline orders for your own provider profile",
            ));
        }

        let outcome = self.store.decline_order(order_id, provider.id).await?;

        tracing::info!(
            user_id = %user_id,
            order_id = %order_id,
            provider_id = %provider.id,
            recorded = outcome.recorded,
            "Order declined"
        );

        if let Some(order) = &outcome.order {
            notify::notify_order_updated(self.hub, Room::Customer(order.user_id), order);
        }

        Ok(outcome.recorded)
    }

    /// Move an order along its lifecycle as its owner or assigned provider
    pub async fn update_status(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        to: OrderStatus,
    ) -> ApiResult<Order> {
        let order = self.order(order_id).await?.order;

        let (actor, counterpart) = if order.user_id == user_id {
            let counterpart = match order.service_provider_id {
                Some(id) => self.store.provider(id).await?.map(|p| Room::Provider(p.user_id)),
                None => None,
            };
            (Party::Customer, counterpart)
        } else {
            let provider = self.store.provider_by_user(user_id).await?;
            match provider {
                Some(p) if order.service_provider_id == Some(p.id) => {
                    (Party::Provider, Some(Room::Customer(order.user_id)))
                }
                _ => {
                    return Err(ApiError::forbidden(
                        "Only the customer or the assigned provider can update this order",
                    ))
                }
            }
        };

        let outcome = self.store.update_order_status(order_id, to, actor).await?;
        let updated = outcome.order;

        tracing::info!(
            user_id = %user_id,
            order_id = %order_id,
            from = %order.status,
            to = %updated.status,
            "Order status updated"
        );

        if let Some(room) = counterpart {
            notify::notify_order_updated(self.hub, room, &updated);
        }

        if !outcome.expired.is_empty() {
            let lapsed = expired_with_providers(self.store, &outcome.expired).await;
            notify::notify_bids_expired(self.hub, updated.user_id, &lapsed, REASON_ORDER_CANCELLED);
        }

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BidAction, BidStatus, CreateBidRequest, OrderServiceInput};
    use crate::realtime::ServerEvent;
    use crate::services::BiddingService;
    use crate::repository::InMemoryStore;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    async fn provider(store: &InMemoryStore, name: &str) -> ServiceProvider {
        store
            .insert_provider(ServiceProvider {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                business_name: name.into(),
                phone: None,
                description: None,
                is_active: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    fn checkout(direct: Option<Uuid>) -> CreateOrderRequest {
        CreateOrderRequest {
            address: "12 Lake Road".into(),
            city: None,
            phone: None,
            scheduled_date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            scheduled_time: "10:00".into(),
            notes: None,
            services: vec![OrderServiceInput {
                service_id: None,
                title: "Deep cleaning".into(),
                price: Decimal::from(500),
                quantity: 2,
                image: None,
            }],
            service_provider_id: direct,
        }
    }

    #[tokio::test]
    async fn bidding_order_is_offered_to_eligible_providers() {
        let store = InMemoryStore::new();
        let hub = RoomHub::new(16);
        let a = provider(&store, "A").await;
        let b = provider(&store, "B").await;
        let mut rx = hub.subscribe();

        let svc = OrdersService::new(&store, &hub);
        let details = svc.create(Uuid::new_v4(), checkout(None)).await.unwrap();
        assert_eq!(details.order.amount, Decimal::from(1000));

        let mut rooms = vec![rx.recv().await.unwrap().room, rx.recv().await.unwrap().room];
        rooms.sort_by_key(|r| format!("{:?}", r));
        let mut expected = vec![Room::Provider(a.user_id), Room::Provider(b.user_id)];
        expected.sort_by_key(|r| format!("{:?}", r));
        assert_eq!(rooms, expected);
    }

    #[tokio::test]
    async fn direct_booking_goes_to_its_provider_only() {
        let store = InMemoryStore::new();
        let hub = RoomHub::new(16);
        let a = provider(&store, "A").await;
        provider(&store, "B").await;
        let mut rx = hub.subscribe();

        let svc = OrdersService::new(&store, &hub);
        let details = svc.create(Uuid::new_v4(), checkout(Some(a.id))).await.unwrap();
        assert_eq!(details.order.service_provider_id, Some(a.id));

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.room, Room::Provider(a.user_id));
        assert!(matches!(msg.event, ServerEvent::NewOrderRequest(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn declining_hides_order_and_is_idempotent() {
        let store = InMemoryStore::new();
        let hub = RoomHub::new(16);
        let a = provider(&store, "A").await;
        let svc = OrdersService::new(&store, &hub);
        let order = svc.create(Uuid::new_v4(), checkout(None)).await.unwrap().order;

        assert_eq!(svc.available(a.user_id).await.unwrap().len(), 1);
        assert!(svc.decline(a.user_id, order.id, Some(a.id)).await.unwrap());
        assert!(!svc.decline(a.user_id, order.id, None).await.unwrap());
        assert!(svc.available(a.user_id).await.unwrap().is_empty());

        let err = svc
            .decline(a.user_id, order.id, Some(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn strangers_cannot_see_orders() {
        let store = InMemoryStore::new();
        let hub = RoomHub::new(16);
        let customer = Uuid::new_v4();
        let svc = OrdersService::new(&store, &hub);
        let order = svc.create(customer, checkout(None)).await.unwrap().order;

        assert!(svc.get(customer, order.id).await.is_ok());
        assert!(matches!(
            svc.get(Uuid::new_v4(), order.id).await,
            Err(ApiError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn status_updates_notify_counterpart() {
        let store = InMemoryStore::new();
        let hub = RoomHub::new(16);
        let a = provider(&store, "A").await;
        let customer = Uuid::new_v4();
        let svc = OrdersService::new(&store, &hub);
        let order = svc.create(customer, checkout(Some(a.id))).await.unwrap().order;

        let mut rx = hub.subscribe();
        let updated = svc
            .update_status(a.user_id, order.id, OrderStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Accepted);
        assert_eq!(rx.recv().await.unwrap().room, Room::Customer(customer));

        // completing straight from accepted skips in_progress
        let err = svc
            .update_status(a.user_id, order.id, OrderStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn cancelling_withdraws_open_bids() {
        let store = InMemoryStore::new();
        let hub = RoomHub::new(16);
        let a = provider(&store, "A").await;
        let customer = Uuid::new_v4();
        let orders = OrdersService::new(&store, &hub);
        let bidding = BiddingService::new(&store, &hub);
        let order = orders.create(customer, checkout(None)).await.unwrap().order;

        let bid = bidding
            .submit(
                a.user_id,
                CreateBidRequest {
                    order_id: order.id,
                    service_provider_id: None,
                    bid_price: Decimal::from(900),
                    bid_message: None,
                },
            )
            .await
            .unwrap();
        bidding
            .decide(customer, bid.id, BidAction::CounterOffer(Decimal::from(850)))
            .await
            .unwrap();

        let mut rx = hub.subscribe();
        let cancelled = orders
            .update_status(customer, order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let lapsed: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|m| match m.event {
                ServerEvent::BidRejected(p) => Some((m.room, p.bid.status, p.reason)),
                _ => None,
            })
            .collect();
        let reason = Some(REASON_ORDER_CANCELLED.to_string());
        assert!(lapsed.contains(&(Room::Provider(a.user_id), BidStatus::Expired, reason.clone())));
        assert!(lapsed.contains(&(Room::Customer(customer), BidStatus::Expired, reason)));

        assert!(bidding.counter_offers(a.user_id, a.id).await.unwrap().is_empty());
        assert!(bidding
            .decide(a.user_id, bid.id, BidAction::Accept)
            .await
            .is_err());
        let stored = store.bid(bid.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BidStatus::Expired);
        let order = store.order(order.id).await.unwrap().unwrap().order;
        assert_eq!(order.service_provider_id, None);
    }
}
