//! Emission helpers
//!
//! Called by services after a state change has been committed. Delivery is
//! best-effort; clients recover anything missed over REST.

use uuid::Uuid;

use super::{
    BidDecisionPayload, NewBidPayload, OrderUpdatedPayload, Room, RoomHub, ServerEvent,
    REASON_ORDER_ASSIGNED,
};
use crate::domain::{
    BidStatus, CounterOfferSummary, Order, OrderBid, OrderDetails, ServiceProvider,
};

/// Tell the customer a provider placed a bid
pub fn notify_new_bid(hub: &RoomHub, customer_id: Uuid, bid: &OrderBid, provider: &ServiceProvider) {
    hub.publish(
        Room::Customer(customer_id),
        ServerEvent::NewBid(NewBidPayload {
            bid: bid.clone(),
            provider: provider.into(),
        }),
    );

    tracing::info!(
        customer_id = %customer_id,
        bid_id = %bid.id,
        order_id = %bid.order_id,
        "new_bid emitted"
    );
}

/// Tell the provider the customer countered their bid
pub fn notify_counter_offer(hub: &RoomHub, provider_user_id: Uuid, bid: &OrderBid) {
    let Some(summary) = CounterOfferSummary::from_bid(bid.clone()) else {
        return;
    };

    hub.publish(
        Room::Provider(provider_user_id),
        ServerEvent::CounterOffer(summary),
    );

    tracing::info!(
        provider_user_id = %provider_user_id,
        bid_id = %bid.id,
        "counter_offer emitted"
    );
}

/// Emit `bid_accepted` or `bid_rejected` to both sides of the negotiation
pub fn notify_bid_decided(
    hub: &RoomHub,
    customer_id: Uuid,
    provider_user_id: Uuid,
    bid: &OrderBid,
) {
    let payload = BidDecisionPayload {
        order_id: bid.order_id,
        bid: bid.clone(),
        reason: None,
    };
    let event = match bid.status {
        BidStatus::Accepted => ServerEvent::BidAccepted(payload),
        BidStatus::Rejected => ServerEvent::BidRejected(payload),
        _ => return,
    };
    let name = event.name();

    hub.publish(Room::Provider(provider_user_id), event.clone());
    hub.publish(Room::Customer(customer_id), event);

    tracing::info!(
        customer_id = %customer_id,
        provider_user_id = %provider_user_id,
        bid_id = %bid.id,
        event = name,
        "Bid decision emitted"
    );
}

/// Announce bids that lapsed without a decision. The customer room gets every
/// bid so open boards drop them; each provider hears about their own.
pub fn notify_bids_expired(
    hub: &RoomHub,
    customer_id: Uuid,
    expired: &[(Option<Uuid>, OrderBid)],
    reason: &str,
) {
    for (provider_user_id, bid) in expired {
        let event = ServerEvent::BidRejected(BidDecisionPayload {
            order_id: bid.order_id,
            bid: bid.clone(),
            reason: Some(reason.to_string()),
        });
        if let Some(user_id) = provider_user_id {
            hub.publish(Room::Provider(*user_id), event.clone());
        }
        hub.publish(Room::Customer(customer_id), event);
    }

    if !expired.is_empty() {
        tracing::info!(
            customer_id = %customer_id,
            count = expired.len(),
            reason,
            "Expired bids emitted"
        );
    }
}

/// Offer a new order to providers
pub fn notify_new_order_request(hub: &RoomHub, provider_user_ids: &[Uuid], order: &OrderDetails) {
    for user_id in provider_user_ids {
        hub.publish(
            Room::Provider(*user_id),
            ServerEvent::NewOrderRequest(order.clone()),
        );
    }

    tracing::info!(
        order_id = %order.order.id,
        providers = provider_user_ids.len(),
        "new_order_request emitted"
    );
}

/// Tell one side that an order changed
pub fn notify_order_updated(hub: &RoomHub, room: Room, order: &Order) {
    hub.publish(
        room,
        ServerEvent::OrderUpdated(OrderUpdatedPayload {
            order_id: order.id,
            status: order.status,
            service_provider_id: order.service_provider_id,
        }),
    );

    tracing::info!(
        order_id = %order.id,
        status = %order.status,
        "order_updated emitted"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::REASON_ORDER_CANCELLED;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn bid() -> OrderBid {
        OrderBid::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Decimal::from(1000),
            Decimal::from(900),
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn decisions_reach_both_rooms() {
        let hub = RoomHub::new(8);
        let mut rx = hub.subscribe();
        let (customer, provider) = (Uuid::new_v4(), Uuid::new_v4());

        let mut accepted = bid();
        accepted.status = BidStatus::Accepted;
        notify_bid_decided(&hub, customer, provider, &accepted);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.room, Room::Provider(provider));
        assert_eq!(second.room, Room::Customer(customer));
        assert_eq!(first.event.name(), "bid_accepted");
    }

    #[tokio::test]
    async fn live_bids_are_not_announced_as_decisions() {
        let hub = RoomHub::new(8);
        let mut rx = hub.subscribe();
        notify_bid_decided(&hub, Uuid::new_v4(), Uuid::new_v4(), &bid());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn expired_siblings_reach_provider_and_customer() {
        let hub = RoomHub::new(8);
        let mut rx = hub.subscribe();
        let (customer, provider) = (Uuid::new_v4(), Uuid::new_v4());
        notify_bids_expired(&hub, customer, &[(Some(provider), bid())], REASON_ORDER_ASSIGNED);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.room, Room::Provider(provider));
        assert_eq!(second.room, Room::Customer(customer));
        for msg in [first, second] {
            match msg.event {
                ServerEvent::BidRejected(p) => {
                    assert_eq!(p.reason.as_deref(), Some(REASON_ORDER_ASSIGNED))
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn unresolved_provider_still_reaches_customer() {
        let hub = RoomHub::new(8);
        let mut rx = hub.subscribe();
        let customer = Uuid::new_v4();
        notify_bids_expired(&hub, customer, &[(None, bid())], REASON_ORDER_CANCELLED);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.room, Room::Customer(customer));
        assert!(rx.try_recv().is_err());
    }
}
