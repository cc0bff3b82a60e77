//! Realtime connection for clients
//!
//! One task owns the socket. It re-joins the requested rooms after every
//! (re)connect, forwards server events to a channel and gives up after
//! [`ClientConfig::reconnect_attempts`] consecutive attempts that ended
//! without a working session.

use backoff::{backoff::Backoff, ExponentialBackoff};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::realtime::{ClientEvent, RejectOrderPayload, ServerEvent};

use super::{ClientConfig, ClientError, ClientResult, Session};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a connected session ended
enum Ended {
    /// Reconnect after the usual delay
    Disconnected,
    /// Nobody is listening anymore
    Finished,
}

/// Reconnect pacing. Every attempt that did not yield a working session,
/// including one the server closed before sending anything, counts toward
/// the limit and waits out the backoff.
struct Retry {
    backoff: ExponentialBackoff,
    failures: u32,
    limit: u32,
    max_delay: Duration,
}

impl Retry {
    fn new(config: &ClientConfig) -> Self {
        let mut backoff = ExponentialBackoff {
            initial_interval: config.reconnect_base_delay,
            max_interval: config.reconnect_max_delay,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();
        Self {
            backoff,
            failures: 0,
            limit: config.reconnect_attempts,
            max_delay: config.reconnect_max_delay,
        }
    }

    /// A session delivered events, so the next loss starts a fresh count
    fn reset(&mut self) {
        self.failures = 0;
        self.backoff.reset();
    }

    /// Delay before the next attempt, `None` once the limit is spent
    fn next_delay(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures > self.limit {
            return None;
        }
        Some(self.backoff.next_backoff().unwrap_or(self.max_delay))
    }
}

pub struct RealtimeClient {
    session: Session,
    config: ClientConfig,
    joins: Vec<ClientEvent>,
}

impl RealtimeClient {
    pub fn new(session: Session, config: ClientConfig) -> Self {
        Self {
            session,
            config,
            joins: Vec::new(),
        }
    }

    /// Receive the events addressed to the signed-in customer
    pub fn join_customer_room(mut self) -> ClientResult<Self> {
        let user_id = self.session.user_id()?;
        self.remember(ClientEvent::JoinCustomerRoom(user_id));
        Ok(self)
    }

    /// Receive the events addressed to the signed-in provider
    pub fn join_provider_room(mut self) -> ClientResult<Self> {
        let user_id = self.session.user_id()?;
        self.remember(ClientEvent::JoinProviderRoom(user_id));
        Ok(self)
    }

    fn remember(&mut self, join: ClientEvent) {
        if !self.joins.contains(&join) {
            self.joins.push(join);
        }
    }

    /// Start the connection task. It stops once the returned receiver is
    /// dropped or the handle is dropped.
    pub fn spawn(self) -> (mpsc::Receiver<ServerEvent>, RealtimeHandle) {
        let (events_tx, events_rx) = mpsc::channel(256);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(events_tx, out_rx));

        (
            events_rx,
            RealtimeHandle {
                outgoing: out_tx,
                task,
            },
        )
    }

    async fn run(
        mut self,
        events: mpsc::Sender<ServerEvent>,
        mut outgoing: mpsc::UnboundedReceiver<ClientEvent>,
    ) -> ClientResult<()> {
        let url = self.session.socket_url()?;

        let mut retry = Retry::new(&self.config);

        loop {
            match self.connect(&url).await {
                Ok(ws) => {
                    info!(rooms = self.joins.len(), "Realtime connected");

                    let mut delivered = false;
                    let ended = self.pump(ws, &events, &mut outgoing, &mut delivered).await;
                    if delivered {
                        retry.reset();
                    }
                    match ended {
                        Ok(Ended::Finished) => {
                            debug!("Realtime client finished");
                            return Ok(());
                        }
                        Ok(Ended::Disconnected) => info!(delivered, "Realtime connection closed"),
                        Err(e) => warn!(error = %e, delivered, "Realtime connection failed"),
                    }
                }
                Err(e) => warn!(error = %e, attempt = retry.failures + 1, "Realtime connect failed"),
            }

            let Some(delay) = retry.next_delay() else {
                warn!(attempts = self.config.reconnect_attempts, "Giving up on realtime connection");
                return Err(ClientError::ReconnectExhausted(self.config.reconnect_attempts));
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = events.closed() => return Ok(()),
            }
        }
    }

    async fn connect(&self, url: &Url) -> ClientResult<WsStream> {
        let (ws, _) = tokio::time::timeout(self.config.handshake_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ClientError::Timeout("socket handshake"))??;
        Ok(ws)
    }

    async fn pump(
        &mut self,
        mut ws: WsStream,
        events: &mpsc::Sender<ServerEvent>,
        outgoing: &mut mpsc::UnboundedReceiver<ClientEvent>,
        delivered: &mut bool,
    ) -> ClientResult<Ended> {
        for join in &self.joins {
            ws.send(Message::Text(serde_json::to_string(join)?)).await?;
        }

        loop {
            tokio::select! {
                frame = ws.next() => {
                    let frame = match frame {
                        Some(frame) => frame?,
                        None => return Ok(Ended::Disconnected),
                    };

                    match frame {
                        Message::Text(text) => match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => {
                                debug!(event = event.name(), "Realtime event");
                                *delivered = true;
                                if events.send(event).await.is_err() {
                                    return Ok(Ended::Finished);
                                }
                            }
                            Err(e) => warn!(error = %e, "Unrecognised realtime frame"),
                        },
                        Message::Ping(data) => ws.send(Message::Pong(data)).await?,
                        Message::Close(_) => return Ok(Ended::Disconnected),
                        Message::Binary(_) | Message::Pong(_) | Message::Frame(_) => {}
                    }
                }
                command = outgoing.recv() => match command {
                    Some(event) => {
                        if matches!(event, ClientEvent::JoinCustomerRoom(_) | ClientEvent::JoinProviderRoom(_)) {
                            self.remember(event.clone());
                        }
                        ws.send(Message::Text(serde_json::to_string(&event)?)).await?;
                    }
                    None => {
                        let _ = ws.close(None).await;
                        return Ok(Ended::Finished);
                    }
                },
                _ = events.closed() => {
                    let _ = ws.close(None).await;
                    return Ok(Ended::Finished);
                }
            }
        }
    }
}

/// Sends client events over a running [`RealtimeClient`]
pub struct RealtimeHandle {
    outgoing: mpsc::UnboundedSender<ClientEvent>,
    task: JoinHandle<ClientResult<()>>,
}

impl RealtimeHandle {
    /// Tell the server this provider declines the order
    pub fn reject_order(&self, order_id: Uuid, provider_id: Uuid) -> ClientResult<()> {
        self.send(ClientEvent::RejectOrder(RejectOrderPayload {
            order_id,
            provider_id,
        }))
    }

    /// Join another room now and after every reconnect
    pub fn join(&self, join: ClientEvent) -> ClientResult<()> {
        self.send(join)
    }

    fn send(&self, event: ClientEvent) -> ClientResult<()> {
        self.outgoing.send(event).map_err(|_| ClientError::Closed)
    }

    /// Close the connection and wait for the task, returning why it ended
    pub async fn shutdown(self) -> ClientResult<()> {
        let RealtimeHandle { outgoing, task } = self;
        drop(outgoing);
        task.await.map_err(|_| ClientError::Closed)?
    }
}
