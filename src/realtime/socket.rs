//! WebSocket endpoint and per-connection actor

use anyhow::{anyhow, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::{IntoResponse, Response},
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};
use tracing::Instrument;
use uuid::Uuid;

use super::{ClientEvent, ErrorPayload, JoinedPayload, Room, RoomMessage, ServerEvent};
use crate::app::AppState;
use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::middleware::request_id;

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

/// GET /ws?token=...
///
/// Browsers cannot set headers on the upgrade request, so the token may come
/// from the query string as well as a bearer header.
pub async fn ws_route_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SocketQuery>,
    headers: HeaderMap,
) -> Response {
    let token = query.token.filter(|t| !t.is_empty()).or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
    });

    let Some(token) = token else {
        return ApiError::unauthorized("Missing authorization token").into_response();
    };

    let request_id = request_id(&headers).map(str::to_string);

    let auth = match state.tokens.authenticate(&token) {
        Ok(auth) => auth,
        Err(e) => {
            tracing::warn!(request_id = ?request_id, error = %e, "Socket authentication failed");
            return ApiError::unauthorized("Invalid or expired token").into_response();
        }
    };

    let span = tracing::debug_span!("socket", user_id = %auth.user_id, request_id = ?request_id);
    ws.on_upgrade(move |socket| {
        async move {
            let mut connection = Connection::new(socket, state, auth);
            connection.run().await;
        }
        .instrument(span)
    })
}

/// Handles a single socket: forwards hub messages for joined rooms and
/// executes client requests.
struct Connection {
    auth: AuthContext,
    state: Arc<AppState>,
    rooms: HashSet<Room>,
    events: broadcast::Receiver<RoomMessage>,
    sender: SplitSink<WebSocket, Message>,
    receiver: SplitStream<WebSocket>,
    ping_interval: Interval,
    awaiting_pong: bool,
    closed: bool,
}

impl Connection {
    fn new(socket: WebSocket, state: Arc<AppState>, auth: AuthContext) -> Self {
        let (sender, receiver) = socket.split();
        let period = state.settings.ws_ping_interval();
        let mut ping_interval = interval_at(Instant::now() + period, period);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            events: state.hub.subscribe(),
            auth,
            state,
            rooms: HashSet::new(),
            sender,
            receiver,
            ping_interval,
            awaiting_pong: false,
            closed: false,
        }
    }

    async fn run(&mut self) {
        tracing::debug!(user_id = %self.auth.user_id, "Socket connected");
        while !self.closed {
            if let Err(e) = self.handle_next().await {
                tracing::debug!(user_id = %self.auth.user_id, error = %e, "Closing socket");
                break;
            }
        }
        tracing::debug!(user_id = %self.auth.user_id, "Socket disconnected");
    }

    async fn handle_next(&mut self) -> Result<()> {
        tokio::select! {
            event = self.events.recv() => match event {
                Ok(message) => {
                    if self.rooms.contains(&message.room) {
                        self.send(&message.event).await?;
                    }
                    Ok(())
                }
                Err(RecvError::Lagged(skipped)) => {
                    // clients resync over REST
                    tracing::warn!(user_id = %self.auth.user_id, skipped, "Socket lagged behind hub");
                    Ok(())
                }
                Err(RecvError::Closed) => Err(anyhow!("Hub closed")),
            },
            incoming = self.receiver.next() => {
                match incoming.ok_or_else(|| anyhow!("Client channel is closed"))?? {
                    Message::Text(text) => self.handle_client_message(&text).await,
                    Message::Pong(_) => {
                        self.awaiting_pong = false;
                        Ok(())
                    }
                    Message::Close(_) => {
                        self.closed = true;
                        Ok(())
                    }
                    Message::Ping(_) | Message::Binary(_) => Ok(()),
                }
            },
            _ = self.ping_interval.tick() => {
                if self.awaiting_pong {
                    return Err(anyhow!("Peer did not answer ping"));
                }
                self.awaiting_pong = true;
                self.sender.send(Message::Ping(Vec::new())).await?;
                Ok(())
            },
        }
    }

    async fn send(&mut self, event: &ServerEvent) -> Result<()> {
        let text = serde_json::to_string(event)?;
        self.sender.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn send_error(&mut self, message: impl Into<String>) -> Result<()> {
        self.send(&ServerEvent::Error(ErrorPayload {
            message: message.into(),
        }))
        .await
    }

    async fn handle_client_message(&mut self, text: &str) -> Result<()> {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "Unparseable client message");
                return self.send_error("Unknown or malformed event").await;
            }
        };

        match event {
            ClientEvent::JoinCustomerRoom(user_id) => self.join(Room::Customer(user_id), user_id).await,
            ClientEvent::JoinProviderRoom(user_id) => self.join(Room::Provider(user_id), user_id).await,
            ClientEvent::RejectOrder(payload) => {
                let result = self
                    .state
                    .orders()
                    .decline(self.auth.user_id, payload.order_id, Some(payload.provider_id))
                    .await;
                match result {
                    Ok(_) => Ok(()),
                    Err(e) => self.send_error(e.public_message()).await,
                }
            }
        }
    }

    async fn join(&mut self, room: Room, user_id: Uuid) -> Result<()> {
        if user_id != self.auth.user_id {
            tracing::warn!(
                user_id = %self.auth.user_id,
                requested = %user_id,
                "Ignoring join for another user's room"
            );
            return Ok(());
        }

        self.rooms.insert(room);
        tracing::debug!(user_id = %user_id, room = ?room, "Joined room");
        self.send(&ServerEvent::Joined(JoinedPayload { room })).await
    }
}
