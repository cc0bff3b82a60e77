//! Customer decisions on bids
//!
//! The board only reflects a decision after the server has confirmed it; a
//! failed request leaves the board untouched.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{BidStatus, OrderBid};

use super::{BidsApi, BoardSink, ClientError, ClientResult, CounterOfferDraft};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BidCommand {
    Accept(Uuid),
    Reject(Uuid),
    Counter { bid_id: Uuid, amount: Decimal },
}

impl BidCommand {
    fn bid_id(&self) -> Uuid {
        match self {
            Self::Accept(id) | Self::Reject(id) => *id,
            Self::Counter { bid_id, .. } => *bid_id,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Accept(_) => "accept",
            Self::Reject(_) => "reject",
            Self::Counter { .. } => "counter_offer",
        }
    }
}

/// Handed to the caller after an accept, e.g. to continue to checkout
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedBid {
    pub service_provider_id: Uuid,
    pub bid_price: Decimal,
}

impl From<&OrderBid> for AcceptedBid {
    fn from(bid: &OrderBid) -> Self {
        Self {
            service_provider_id: bid.service_provider_id,
            bid_price: bid.agreed_price(),
        }
    }
}

pub struct BidDecisions<A> {
    api: Arc<A>,
    sink: Option<BoardSink>,
}

impl<A: BidsApi> BidDecisions<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self { api, sink: None }
    }

    /// Also apply confirmed decisions to a watched board
    pub fn with_board(mut self, sink: BoardSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub async fn execute(&self, command: BidCommand) -> ClientResult<OrderBid> {
        let result = match command {
            BidCommand::Accept(id) => self.api.accept_bid(id).await,
            BidCommand::Reject(id) => self.api.reject_bid(id).await,
            BidCommand::Counter { bid_id, amount } => self.api.counter_offer(bid_id, amount).await,
        };

        let bid = match result {
            Ok(bid) => bid,
            Err(e) => {
                warn!(bid_id = %command.bid_id(), action = command.name(), error = %e, "Bid decision failed");
                return Err(e);
            }
        };

        info!(bid_id = %bid.id, action = command.name(), status = %bid.status, "Bid decision confirmed");

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.ack(bid.clone()).await {
                warn!(error = %e, "Bid board is gone, decision not reflected");
            }
        }

        Ok(bid)
    }

    /// Accept the selected bid and hand its provider and price to `on_accepted`
    pub async fn accept<F>(&self, selected: Option<Uuid>, on_accepted: F) -> ClientResult<OrderBid>
    where
        F: FnOnce(AcceptedBid),
    {
        let bid_id = selected.ok_or(ClientError::MissingBid)?;
        let bid = self.execute(BidCommand::Accept(bid_id)).await?;
        if bid.status == BidStatus::Accepted {
            on_accepted(AcceptedBid::from(&bid));
        }
        Ok(bid)
    }

    pub async fn reject(&self, selected: Option<Uuid>) -> ClientResult<OrderBid> {
        let bid_id = selected.ok_or(ClientError::MissingBid)?;
        self.execute(BidCommand::Reject(bid_id)).await
    }

    /// Counter with a validated draft. A draft above the bid price is only
    /// flagged through [`CounterOfferDraft::can_submit`]; it is still sent here.
    pub async fn counter(&self, selected: Option<Uuid>, draft: &CounterOfferDraft) -> ClientResult<OrderBid> {
        let bid_id = selected.ok_or(ClientError::MissingBid)?;
        if let Some(warning) = draft.warning() {
            warn!(bid_id = %bid_id, "{}", warning);
        }
        self.execute(BidCommand::Counter {
            bid_id,
            amount: draft.amount,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::validate;
    use crate::domain::{BidAction, Party};
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    struct FakeApi {
        bid: Mutex<OrderBid>,
        fail: bool,
    }

    impl FakeApi {
        fn new(fail: bool) -> Self {
            Self {
                bid: Mutex::new(OrderBid::new(
                    Uuid::new_v4(),
                    Uuid::new_v4(),
                    Decimal::from(1000),
                    Decimal::from(900),
                    None,
                    Utc::now(),
                )),
                fail,
            }
        }

        fn act(&self, actor: Party, action: BidAction) -> ClientResult<OrderBid> {
            if self.fail {
                return Err(ClientError::Server {
                    status: 409,
                    message: "Bid is already rejected".into(),
                });
            }
            let mut bid = self.bid.lock();
            bid.apply(&action, actor, Utc::now())
                .map_err(|e| ClientError::Validation(e.to_string()))?;
            Ok(bid.clone())
        }
    }

    #[async_trait]
    impl BidsApi for FakeApi {
        async fn bids_for_order(&self, _order_id: Uuid) -> ClientResult<Vec<OrderBid>> {
            Ok(vec![self.bid.lock().clone()])
        }
        async fn accept_bid(&self, _bid_id: Uuid) -> ClientResult<OrderBid> {
            self.act(Party::Customer, BidAction::Accept)
        }
        async fn reject_bid(&self, _bid_id: Uuid) -> ClientResult<OrderBid> {
            self.act(Party::Customer, BidAction::Reject)
        }
        async fn counter_offer(&self, _bid_id: Uuid, amount: Decimal) -> ClientResult<OrderBid> {
            self.act(Party::Customer, BidAction::CounterOffer(amount))
        }
    }

    #[tokio::test]
    async fn accept_hands_over_provider_and_price() {
        let api = Arc::new(FakeApi::new(false));
        let bid_id = api.bid.lock().id;
        let decisions = BidDecisions::new(api.clone());

        let mut handed = None;
        let bid = decisions
            .accept(Some(bid_id), |accepted| handed = Some(accepted))
            .await
            .unwrap();

        assert_eq!(bid.status, BidStatus::Accepted);
        let handed = handed.unwrap();
        assert_eq!(handed.bid_price, Decimal::from(900));
        assert_eq!(handed.service_provider_id, bid.service_provider_id);
    }

    #[tokio::test]
    async fn nothing_selected_sends_nothing() {
        let decisions = BidDecisions::new(Arc::new(FakeApi::new(false)));
        assert!(matches!(
            decisions.reject(None).await,
            Err(ClientError::MissingBid)
        ));
        let mut called = false;
        assert!(decisions.accept(None, |_| called = true).await.is_err());
        assert!(!called);
    }

    #[tokio::test]
    async fn counter_records_the_offer() {
        let api = Arc::new(FakeApi::new(false));
        let bid_id = api.bid.lock().id;
        let decisions = BidDecisions::new(api.clone());

        let draft = validate::counter_offer("850", Decimal::from(900)).unwrap();
        let bid = decisions.counter(Some(bid_id), &draft).await.unwrap();
        assert_eq!(bid.status, BidStatus::CounterOffered);
        assert_eq!(bid.customer_counter_offer, Some(Decimal::from(850)));

        // a second counter is out of turn for the customer
        let err = decisions.counter(Some(bid_id), &draft).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(api.bid.lock().status, BidStatus::CounterOffered);
    }

    #[tokio::test]
    async fn failed_decision_surfaces_server_message() {
        let decisions = BidDecisions::new(Arc::new(FakeApi::new(true)));
        let err = decisions.reject(Some(Uuid::new_v4())).await.unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert!(err.to_string().contains("already rejected"));
    }
}
