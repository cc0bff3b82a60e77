//! Socket event payloads
//!
//! Every frame is a JSON object `{"event": "<name>", "data": <payload>}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{CounterOfferSummary, OrderBid, OrderDetails, OrderStatus, ProviderSummary};

/// Reason attached to `bid_rejected` when a sibling bid won the order
pub const REASON_ORDER_ASSIGNED: &str = "order_assigned";

/// Reason attached to `bid_rejected` when the customer cancelled the order
pub const REASON_ORDER_CANCELLED: &str = "order_cancelled";

/// Events pushed by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    NewBid(NewBidPayload),
    CounterOffer(CounterOfferSummary),
    BidAccepted(BidDecisionPayload),
    BidRejected(BidDecisionPayload),
    NewOrderRequest(OrderDetails),
    OrderUpdated(OrderUpdatedPayload),
    /// Acknowledges a room join
    Joined(JoinedPayload),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewBid(_) => "new_bid",
            Self::CounterOffer(_) => "counter_offer",
            Self::BidAccepted(_) => "bid_accepted",
            Self::BidRejected(_) => "bid_rejected",
            Self::NewOrderRequest(_) => "new_order_request",
            Self::OrderUpdated(_) => "order_updated",
            Self::Joined(_) => "joined",
            Self::Error(_) => "error",
        }
    }

    /// The bid carried by the event, if any
    pub fn bid(&self) -> Option<&OrderBid> {
        match self {
            Self::NewBid(p) => Some(&p.bid),
            Self::CounterOffer(p) => Some(&p.bid),
            Self::BidAccepted(p) | Self::BidRejected(p) => Some(&p.bid),
            _ => None,
        }
    }
}

/// Events sent by clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinCustomerRoom(Uuid),
    JoinProviderRoom(Uuid),
    RejectOrder(RejectOrderPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewBidPayload {
    pub bid: OrderBid,
    pub provider: ProviderSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidDecisionPayload {
    pub order_id: Uuid,
    pub bid: OrderBid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdatedPayload {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub service_provider_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RejectOrderPayload {
    pub order_id: Uuid,
    pub provider_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinedPayload {
    pub room: super::Room,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub message: String,
}
