//! Bid reconciliation
//!
//! Fetches, polls, socket pushes and decision acknowledgements all feed the
//! same [`BidBoard::apply`]. A bid is keyed by id and only replaced by a copy
//! with a higher version, so stale or repeated deliveries are harmless.

use uuid::Uuid;

use crate::domain::{BidStatus, OrderBid};

/// Where a bid update came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidSource {
    Fetch,
    Poll,
    Push,
    Ack,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    /// Full list for the order
    Snapshot { source: BidSource, bids: Vec<OrderBid> },
    /// Single bid
    Upsert { source: BidSource, bid: OrderBid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardPhase {
    WaitingForBids,
    ShowingBids,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    pub updated: usize,
    pub ignored: usize,
    /// Set on the one merge that moved the board out of waiting
    pub started_showing: bool,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.updated > 0
    }
}

/// What a bidding view renders
#[derive(Debug, Clone, PartialEq)]
pub struct BoardView {
    pub order_id: Uuid,
    pub phase: BoardPhase,
    pub bids: Vec<OrderBid>,
}

#[derive(Debug, Clone)]
pub struct BidBoard {
    order_id: Uuid,
    // arrival order
    bids: Vec<OrderBid>,
    phase: BoardPhase,
}

impl BidBoard {
    pub fn new(order_id: Uuid) -> Self {
        Self {
            order_id,
            bids: Vec::new(),
            phase: BoardPhase::WaitingForBids,
        }
    }

    pub fn order_id(&self) -> Uuid {
        self.order_id
    }

    pub fn phase(&self) -> BoardPhase {
        self.phase
    }

    pub fn get(&self, bid_id: Uuid) -> Option<&OrderBid> {
        self.bids.iter().find(|b| b.id == bid_id)
    }

    /// Bids still worth showing; rejected and expired ones drop out
    pub fn visible(&self) -> impl Iterator<Item = &OrderBid> {
        self.bids
            .iter()
            .filter(|b| !matches!(b.status, BidStatus::Rejected | BidStatus::Expired))
    }

    pub fn view(&self) -> BoardView {
        BoardView {
            order_id: self.order_id,
            phase: self.phase,
            bids: self.visible().cloned().collect(),
        }
    }

    pub fn apply(&mut self, event: BoardEvent) -> MergeReport {
        let mut report = MergeReport::default();

        match event {
            BoardEvent::Snapshot { bids, .. } => {
                for bid in bids {
                    self.merge(bid, &mut report);
                }
            }
            BoardEvent::Upsert { bid, .. } => self.merge(bid, &mut report),
        }

        if self.phase == BoardPhase::WaitingForBids && self.visible().next().is_some() {
            self.phase = BoardPhase::ShowingBids;
            report.started_showing = true;
        }

        report
    }

    fn merge(&mut self, bid: OrderBid, report: &mut MergeReport) {
        if bid.order_id != self.order_id {
            report.ignored += 1;
            return;
        }

        match self.bids.iter_mut().find(|b| b.id == bid.id) {
            Some(known) if bid.version > known.version => {
                *known = bid;
                report.updated += 1;
            }
            Some(_) => report.ignored += 1,
            None => {
                self.bids.push(bid);
                report.inserted += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn bid(order_id: Uuid, price: i64) -> OrderBid {
        OrderBid::new(
            order_id,
            Uuid::new_v4(),
            Decimal::from(1000),
            Decimal::from(price),
            None,
            Utc::now(),
        )
    }

    fn push(bid: &OrderBid) -> BoardEvent {
        BoardEvent::Upsert {
            source: BidSource::Push,
            bid: bid.clone(),
        }
    }

    #[test]
    fn duplicates_from_any_source_collapse_by_id() {
        let order = Uuid::new_v4();
        let (a, b) = (bid(order, 900), bid(order, 950));
        let mut board = BidBoard::new(order);

        board.apply(push(&a));
        board.apply(BoardEvent::Snapshot {
            source: BidSource::Poll,
            bids: vec![a.clone(), b.clone()],
        });
        board.apply(push(&b));
        board.apply(push(&a));

        let ids: Vec<Uuid> = board.visible().map(|x| x.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn waiting_ends_exactly_once() {
        let order = Uuid::new_v4();
        let mut board = BidBoard::new(order);

        let empty = board.apply(BoardEvent::Snapshot {
            source: BidSource::Fetch,
            bids: vec![],
        });
        assert!(!empty.started_showing);
        assert_eq!(board.phase(), BoardPhase::WaitingForBids);

        let first = bid(order, 900);
        assert!(board.apply(push(&first)).started_showing);
        assert_eq!(board.phase(), BoardPhase::ShowingBids);

        // the same bid arriving by poll does not re-trigger
        let again = board.apply(BoardEvent::Snapshot {
            source: BidSource::Poll,
            bids: vec![first.clone(), bid(order, 800)],
        });
        assert!(!again.started_showing);
        assert_eq!(again.inserted, 1);
    }

    #[test]
    fn stale_copies_never_overwrite_newer_ones() {
        let order = Uuid::new_v4();
        let original = bid(order, 900);
        let mut countered = original.clone();
        countered
            .apply(
                &crate::domain::BidAction::CounterOffer(Decimal::from(850)),
                crate::domain::Party::Customer,
                Utc::now(),
            )
            .unwrap();

        let mut board = BidBoard::new(order);
        board.apply(push(&countered));
        let report = board.apply(BoardEvent::Snapshot {
            source: BidSource::Poll,
            bids: vec![original.clone()],
        });

        assert_eq!(report.ignored, 1);
        assert_eq!(board.get(original.id).unwrap().status, BidStatus::CounterOffered);
    }

    #[test]
    fn rejected_bids_leave_the_view_and_other_orders_are_ignored() {
        let order = Uuid::new_v4();
        let mine = bid(order, 900);
        let mut board = BidBoard::new(order);
        board.apply(push(&mine));

        let report = board.apply(push(&bid(Uuid::new_v4(), 700)));
        assert_eq!(report.ignored, 1);

        let mut rejected = mine.clone();
        rejected
            .apply(
                &crate::domain::BidAction::Reject,
                crate::domain::Party::Customer,
                Utc::now(),
            )
            .unwrap();
        board.apply(BoardEvent::Upsert {
            source: BidSource::Ack,
            bid: rejected,
        });

        assert!(board.view().bids.is_empty());
        // once shown, the board does not go back to waiting
        assert_eq!(board.phase(), BoardPhase::ShowingBids);
    }
}
