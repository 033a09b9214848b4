use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
    #[error("broker error: {0}")]
    Broker(#[from] redis::RedisError),
    #[error("encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Registered,
    Authenticated,
}

/// Best-effort notification about a user-affecting action.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    pub user_id: i32,
    pub login: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
}

impl LifecycleEvent {
    pub fn registered(user_id: i32, login: &str) -> Self {
        Self::new(EventKind::Registered, user_id, login, format!("user {login} registered"))
    }

    pub fn authenticated(user_id: i32, login: &str) -> Self {
        Self::new(
            EventKind::Authenticated,
            user_id,
            login,
            format!("user {login} authenticated"),
        )
    }

    fn new(kind: EventKind, user_id: i32, login: &str, description: String) -> Self {
        Self {
            kind,
            user_id,
            login: login.to_string(),
            description,
            occurred_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn key(&self) -> &'static str {
        match self.kind {
            EventKind::Registered => "user.registered",
            EventKind::Authenticated => "user.authenticated",
        }
    }
}

/// Fire-and-forget sink for lifecycle events. One delivery attempt per call.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, key: &str, value: &str) -> Result<(), PublishError>;

    async fn shutdown(&self) {}
}

/// Encodes `event` and hands it to `publisher`.
pub async fn publish_event(
    publisher: &dyn EventPublisher,
    event: &LifecycleEvent,
) -> Result<(), PublishError> {
    let value = serde_json::to_string(event)?;
    publisher.publish(event.key(), &value).await
}

/// Appends events to a Redis stream (`XADD <stream> * key <k> value <v>`).
#[derive(Clone)]
pub struct RedisStreamPublisher {
    conn: ConnectionManager,
    stream: String,
    timeout: Duration,
}

impl RedisStreamPublisher {
    pub async fn connect(url: &str, stream: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::open(url).context("parse REDIS_URL")?;
        let mut conn = ConnectionManager::new(client)
            .await
            .context("connect to redis")?;
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .context("redis ping")?;
        info!(stream = %stream, "event publisher connected");
        Ok(Self {
            conn,
            stream: stream.to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl EventPublisher for RedisStreamPublisher {
    async fn publish(&self, key: &str, value: &str) -> Result<(), PublishError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream)
            .arg("*")
            .arg("key")
            .arg(key)
            .arg("value")
            .arg(value);
        let entry_id = tokio::time::timeout(self.timeout, cmd.query_async::<String>(&mut conn))
            .await
            .map_err(|_| PublishError::Timeout(self.timeout))??;
        debug!(stream = %self.stream, %key, %entry_id, "event published");
        Ok(())
    }

    async fn shutdown(&self) {
        info!(stream = %self.stream, "event publisher stopped");
    }
}

/// Used when events are disabled; drops every event.
pub struct DisabledPublisher;

#[async_trait]
impl EventPublisher for DisabledPublisher {
    async fn publish(&self, key: &str, _value: &str) -> Result<(), PublishError> {
        debug!(%key, "events disabled, dropping event");
        Ok(())
    }
}
