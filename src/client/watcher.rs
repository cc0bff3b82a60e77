//! Keeps a [`BidBoard`] current for one order
//!
//! The watcher fetches once on start, applies socket pushes as they arrive
//! and, while the board is still waiting for its first bid, refetches on a
//! fixed period. Polling stops for good once a bid is showing.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::OrderBid;
use crate::realtime::ServerEvent;

use super::reconcile::{BidBoard, BidSource, BoardEvent, BoardPhase, BoardView};
use super::{BidsApi, ClientConfig, ClientError, ClientResult};

#[derive(Debug)]
pub enum WatcherCommand {
    /// Refetch now, e.g. on pull-to-refresh
    Refresh,
    Apply(BoardEvent),
}

/// Translate a pushed event into a board update
pub fn board_event(event: ServerEvent) -> Option<BoardEvent> {
    let bid = match event {
        ServerEvent::NewBid(p) => p.bid,
        ServerEvent::CounterOffer(p) => p.bid,
        ServerEvent::BidAccepted(p) | ServerEvent::BidRejected(p) => p.bid,
        _ => return None,
    };
    Some(BoardEvent::Upsert {
        source: BidSource::Push,
        bid,
    })
}

/// Feeds events into a running watcher
#[derive(Clone)]
pub struct BoardSink {
    commands: mpsc::Sender<WatcherCommand>,
}

impl BoardSink {
    pub async fn push(&self, event: ServerEvent) -> ClientResult<()> {
        match board_event(event) {
            Some(update) => self.send(WatcherCommand::Apply(update)).await,
            None => Ok(()),
        }
    }

    /// A bid as returned by a successful decision request
    pub async fn ack(&self, bid: OrderBid) -> ClientResult<()> {
        self.send(WatcherCommand::Apply(BoardEvent::Upsert {
            source: BidSource::Ack,
            bid,
        }))
        .await
    }

    async fn send(&self, command: WatcherCommand) -> ClientResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::Closed)
    }
}

pub struct WatcherHandle {
    view: watch::Receiver<BoardView>,
    commands: mpsc::Sender<WatcherCommand>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Receiver that changes whenever the visible board does
    pub fn view(&self) -> watch::Receiver<BoardView> {
        self.view.clone()
    }

    pub fn current(&self) -> BoardView {
        self.view.borrow().clone()
    }

    pub async fn refresh(&self) -> ClientResult<()> {
        self.commands
            .send(WatcherCommand::Refresh)
            .await
            .map_err(|_| ClientError::Closed)
    }

    pub fn sink(&self) -> BoardSink {
        BoardSink {
            commands: self.commands.clone(),
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct BidWatcher<A> {
    api: Arc<A>,
    board: BidBoard,
    view: watch::Sender<BoardView>,
}

impl<A: BidsApi + 'static> BidWatcher<A> {
    /// Start watching `order_id`. `pushes` carries events from a
    /// [`RealtimeClient`](super::RealtimeClient), if one is connected.
    pub fn spawn(
        api: Arc<A>,
        order_id: Uuid,
        config: &ClientConfig,
        pushes: Option<mpsc::Receiver<ServerEvent>>,
    ) -> WatcherHandle {
        let board = BidBoard::new(order_id);
        let (view_tx, view_rx) = watch::channel(board.view());
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        let watcher = Self {
            api,
            board,
            view: view_tx,
        };
        let task = tokio::spawn(watcher.run(cmd_rx, pushes, config.poll_interval));

        WatcherHandle {
            view: view_rx,
            commands: cmd_tx,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<WatcherCommand>,
        mut pushes: Option<mpsc::Receiver<ServerEvent>>,
        poll_interval: std::time::Duration,
    ) {
        self.fetch(BidSource::Fetch).await;

        let mut poll = interval_at(Instant::now() + poll_interval, poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(WatcherCommand::Refresh) => self.fetch(BidSource::Fetch).await,
                    Some(WatcherCommand::Apply(event)) => self.apply(event),
                    None => break,
                },
                pushed = recv_push(&mut pushes) => match pushed {
                    Some(event) => {
                        if let Some(update) = board_event(event) {
                            self.apply(update);
                        }
                    }
                    None => {
                        debug!("Push stream closed, relying on polling");
                        pushes = None;
                    }
                },
                _ = poll.tick(), if self.board.phase() == BoardPhase::WaitingForBids => {
                    self.fetch(BidSource::Poll).await;
                }
            }
        }

        debug!(order_id = %self.board.order_id(), "Bid watcher stopped");
    }

    async fn fetch(&mut self, source: BidSource) {
        let order_id = self.board.order_id();
        match self.api.bids_for_order(order_id).await {
            Ok(bids) => self.apply(BoardEvent::Snapshot { source, bids }),
            // transient; the next poll or push catches up
            Err(e) => warn!(order_id = %order_id, error = %e, "Failed to fetch bids"),
        }
    }

    fn apply(&mut self, event: BoardEvent) {
        let report = self.board.apply(event);
        if report.started_showing {
            debug!(order_id = %self.board.order_id(), "First bid received, polling stopped");
        }
        if report.changed() {
            self.view.send_replace(self.board.view());
        }
    }
}

async fn recv_push(pushes: &mut Option<mpsc::Receiver<ServerEvent>>) -> Option<ServerEvent> {
    match pushes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::domain::ProviderSummary;
    use crate::realtime::NewBidPayload;

    #[derive(Default)]
    struct FakeApi {
        bids: Mutex<Vec<OrderBid>>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl BidsApi for FakeApi {
        async fn bids_for_order(&self, _order_id: Uuid) -> ClientResult<Vec<OrderBid>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.bids.lock().clone())
        }
        async fn accept_bid(&self, _bid_id: Uuid) -> ClientResult<OrderBid> {
            Err(ClientError::Closed)
        }
        async fn reject_bid(&self, _bid_id: Uuid) -> ClientResult<OrderBid> {
            Err(ClientError::Closed)
        }
        async fn counter_offer(&self, _bid_id: Uuid, _amount: Decimal) -> ClientResult<OrderBid> {
            Err(ClientError::Closed)
        }
    }

    fn bid(order_id: Uuid) -> OrderBid {
        OrderBid::new(
            order_id,
            Uuid::new_v4(),
            Decimal::from(1000),
            Decimal::from(900),
            None,
            Utc::now(),
        )
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_every_interval_until_first_bid() {
        let order = Uuid::new_v4();
        let api = Arc::new(FakeApi::default());
        let handle = BidWatcher::spawn(api.clone(), order, &ClientConfig::default(), None);

        settle().await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        settle().await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 2);

        api.bids.lock().push(bid(order));
        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 3);
        assert_eq!(handle.current().phase, BoardPhase::ShowingBids);

        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn pushed_bid_stops_polling_and_is_not_duplicated_by_refresh() {
        let order = Uuid::new_v4();
        let api = Arc::new(FakeApi::default());
        let (push_tx, push_rx) = mpsc::channel(8);
        let handle = BidWatcher::spawn(api.clone(), order, &ClientConfig::default(), Some(push_rx));
        settle().await;

        let incoming = bid(order);
        push_tx
            .send(ServerEvent::NewBid(NewBidPayload {
                bid: incoming.clone(),
                provider: ProviderSummary {
                    id: incoming.service_provider_id,
                    business_name: "Sparkle".into(),
                    phone: None,
                },
            }))
            .await
            .unwrap();
        settle().await;
        assert_eq!(handle.current().bids.len(), 1);

        api.bids.lock().push(incoming.clone());
        handle.refresh().await.unwrap();
        settle().await;
        assert_eq!(handle.current().bids.len(), 1);

        let before = api.fetches.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), before);
    }
}
