//! Order bids and the negotiation state machine.
//!
//! A bid moves through:
//!
//! ```text
//! pending --(customer accepts)--> accepted
//! pending --(customer rejects)--> rejected
//! pending --(customer counters)--> counter_offered
//! counter_offered --(provider accepts)--> accepted
//! counter_offered --(provider rejects)--> rejected
//! ```
//!
//! `expired` is reached only when a sibling bid on the same order is accepted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Longest bid message a provider may attach
pub const MAX_BID_MESSAGE_LEN: usize = 1000;

/// Bid status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Accepted,
    CounterOffered,
    Rejected,
    Expired,
}

impl Default for BidStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::CounterOffered => "counter_offered",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    /// No further decisions can be made on a bid in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Expired)
    }

    /// Bids still under negotiation
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::CounterOffered)
    }

    /// Compute the status a decision leads to.
    pub fn next(self, action: &BidAction, actor: Party) -> Result<BidStatus, TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::Closed(self));
        }

        match (self, action, actor) {
            (Self::Pending, BidAction::Accept, Party::Customer) => Ok(Self::Accepted),
            (Self::Pending, BidAction::Reject, Party::Customer) => Ok(Self::Rejected),
            (Self::Pending, BidAction::CounterOffer(amount), Party::Customer) => {
                if *amount <= Decimal::ZERO {
                    Err(TransitionError::InvalidCounterOffer)
                } else {
                    Ok(Self::CounterOffered)
                }
            }
            (Self::CounterOffered, BidAction::Accept, Party::Provider) => Ok(Self::Accepted),
            (Self::CounterOffered, BidAction::Reject, Party::Provider) => Ok(Self::Rejected),
            (status, action, actor) => Err(TransitionError::OutOfTurn {
                actor,
                action: action.name(),
                status,
            }),
        }
    }
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BidStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "counter_offered" => Ok(Self::CounterOffered),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown bid status: {}", other)),
        }
    }
}

/// Side of the negotiation taking an action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Customer,
    Provider,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Customer => f.write_str("customer"),
            Self::Provider => f.write_str("provider"),
        }
    }
}

/// Decision taken on a bid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidAction {
    Accept,
    Reject,
    CounterOffer(Decimal),
}

impl BidAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::CounterOffer(_) => "counter",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Bid is already {0}")]
    Closed(BidStatus),

    #[error("The {actor} cannot {action} a bid that is {status}")]
    OutOfTurn {
        actor: Party,
        action: &'static str,
        status: BidStatus,
    },

    #[error("Counter offer must be a positive amount")]
    InvalidCounterOffer,
}

/// Bid entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderBid {
    pub id: Uuid,
    pub order_id: Uuid,
    pub service_provider_id: Uuid,
    /// Order total at the time the bid was placed
    pub original_price: Decimal,
    pub bid_price: Decimal,
    pub bid_message: Option<String>,
    pub customer_counter_offer: Option<Decimal>,
    pub status: BidStatus,
    /// Incremented on every transition; clients keep the highest version they have seen
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderBid {
    pub fn new(
        order_id: Uuid,
        service_provider_id: Uuid,
        original_price: Decimal,
        bid_price: Decimal,
        bid_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            service_provider_id,
            original_price,
            bid_price,
            bid_message,
            customer_counter_offer: None,
            status: BidStatus::Pending,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Price the order is settled at if this bid is accepted.
    ///
    /// A customer can only accept a bid that was never countered, and a provider
    /// can only accept a counter, so the counter (when present) is what was agreed.
    pub fn agreed_price(&self) -> Decimal {
        self.customer_counter_offer.unwrap_or(self.bid_price)
    }

    /// Apply a decision. Returns the agreed price when the bid gets accepted.
    pub fn apply(
        &mut self,
        action: &BidAction,
        actor: Party,
        now: DateTime<Utc>,
    ) -> Result<Option<Decimal>, TransitionError> {
        let next = self.status.next(action, actor)?;

        if let BidAction::CounterOffer(amount) = action {
            self.customer_counter_offer = Some(*amount);
        }

        self.status = next;
        self.version += 1;
        self.updated_at = now;

        Ok(matches!(action, BidAction::Accept).then(|| self.agreed_price()))
    }

    /// Expire a live bid once a sibling has been accepted.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if !self.status.is_live() {
            return false;
        }
        self.status = BidStatus::Expired;
        self.version += 1;
        self.updated_at = now;
        true
    }
}

/// Request DTO for submitting a bid
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBidRequest {
    pub order_id: Uuid,
    /// Resolved from the caller's provider profile when omitted
    #[serde(default)]
    pub service_provider_id: Option<Uuid>,
    pub bid_price: Decimal,
    #[serde(default)]
    pub bid_message: Option<String>,
}

impl CreateBidRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.bid_price <= Decimal::ZERO {
            return Err("Please enter a valid bid price");
        }
        if self
            .bid_message
            .as_deref()
            .is_some_and(|m| m.chars().count() > MAX_BID_MESSAGE_LEN)
        {
            return Err("Bid message is too long");
        }
        Ok(())
    }

    /// Trimmed message, `None` when blank
    pub fn message(&self) -> Option<String> {
        self.bid_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
    }
}

/// Request DTO for a customer counter-offer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterOfferRequest {
    pub counter_offer_price: Decimal,
}

/// A bid waiting on the provider's answer to a customer counter-offer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CounterOfferSummary {
    pub bid: OrderBid,
    pub order_id: Uuid,
    pub counter_offer_price: Decimal,
    pub message: String,
}

impl CounterOfferSummary {
    /// Returns `None` for bids that carry no counter-offer
    pub fn from_bid(bid: OrderBid) -> Option<Self> {
        let counter = bid.customer_counter_offer?;
        Some(Self {
            order_id: bid.order_id,
            counter_offer_price: counter,
            message: format!(
                "Customer offered Rs {} against your bid of Rs {}",
                counter, bid.bid_price
            ),
            bid,
        })
    }
}

/// `{bid}` body of create responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidBody {
    pub bid: OrderBid,
}

/// `{bids}` body of list responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidListBody {
    pub bids: Vec<OrderBid>,
}

/// `{message, bid}` body of accept/reject/counter responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub bid: OrderBid,
}

/// `{counterOffers}` body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterOfferListBody {
    pub counter_offers: Vec<CounterOfferSummary>,
}
