//! Redis pub/sub relay for room events.
//!
//! Lets several server instances share one logical hub:
//! - every locally published event is forwarded to a Redis channel
//! - events from other instances are injected into the local hub
//! - the subscriber reconnects with exponential backoff

use anyhow::{Context, Result};
use backoff::{backoff::Backoff, ExponentialBackoff};
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::realtime::{RoomHub, RoomMessage};

/// Wire format on the Redis channel
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    origin: Uuid,
    message: RoomMessage,
}

/// Handle to the running relay
#[derive(Clone)]
pub struct RedisRelay {
    conn: ConnectionManager,
    channel: String,
    instance_id: Uuid,
}

impl RedisRelay {
    /// Connect to Redis and start relaying. Returns the hub to publish
    /// through, which forwards to Redis as well as local subscribers.
    pub async fn start(redis_url: &str, channel: String, hub: RoomHub) -> Result<(Self, RoomHub)> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client.clone())
            .await
            .context("Failed to connect to Redis")?;

        let relay = Self {
            conn,
            channel,
            instance_id: Uuid::new_v4(),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(relay.clone().forward(rx));
        tokio::spawn(relay.clone().subscribe(client, hub.clone()));

        tracing::info!(
            channel = %relay.channel,
            instance_id = %relay.instance_id,
            "Redis event relay started"
        );

        Ok((relay, hub.with_relay(tx)))
    }

    /// Lightweight health check
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;
        Ok(())
    }

    async fn forward(mut self, mut rx: mpsc::UnboundedReceiver<RoomMessage>) {
        while let Some(message) = rx.recv().await {
            if let Err(e) = self.publish(message).await {
                warn!(error = %e, "Failed to relay event to Redis");
            }
        }
        debug!("Event relay sender closed");
    }

    #[instrument(skip(self, message), fields(event = message.event.name()))]
    async fn publish(&mut self, message: RoomMessage) -> Result<()> {
        let payload = serde_json::to_string(&Envelope {
            origin: self.instance_id,
            message,
        })?;
        self.conn
            .publish::<_, _, ()>(&self.channel, payload)
            .await
            .context("Redis PUBLISH failed")?;
        Ok(())
    }

    async fn subscribe(self, client: redis::Client, hub: RoomHub) {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();

        loop {
            match self.listen(&client, &hub, &mut backoff).await {
                Ok(()) => warn!("Redis subscription ended, resubscribing"),
                Err(e) => warn!(error = %e, "Redis subscription failed"),
            }
            let delay = backoff.next_backoff().unwrap_or(Duration::from_secs(30));
            tokio::time::sleep(delay).await;
        }
    }

    async fn listen(
        &self,
        client: &redis::Client,
        hub: &RoomHub,
        backoff: &mut ExponentialBackoff,
    ) -> Result<()> {
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .context("Failed to open Redis pub/sub connection")?;
        pubsub
            .subscribe(&self.channel)
            .await
            .context("Redis SUBSCRIBE failed")?;
        backoff.reset();
        debug!(channel = %self.channel, "Subscribed to Redis events");

        let mut messages = pubsub.on_message();
        while let Some(msg) = messages.next().await {
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "Unreadable Redis payload");
                    continue;
                }
            };
            match serde_json::from_str::<Envelope>(&payload) {
                Ok(env) if env.origin == self.instance_id => {}
                Ok(env) => hub.publish_local(env.message),
                Err(e) => warn!(error = %e, "Failed to decode relayed event"),
            }
        }

        Ok(())
    }
}
