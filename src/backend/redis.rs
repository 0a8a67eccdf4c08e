//! Redis / Dragonfly backend.
//!
//! Uses a lazily established [`MultiplexedConnection`]: constructing the
//! backend only parses the URL, the first command connects. Connect and
//! response timeouts come from [`ConnectOptions`] so a dead server fails a
//! command in seconds instead of hanging the caller. There is no retry; the
//! cache treats a failed command as a miss.
//!
//! A multiplexed connection does not reconnect by itself. Any command that
//! fails with a connection-class error drops the cached handle, so the next
//! command (usually the next health probe) dials again.
//!
//! Requires the `redis` feature flag.

use std::time::Duration;

use async_trait::async_trait;
use redis::FromRedisValue;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tracing::debug;

use super::ConnectOptions;
use super::traits::KeyValueBackend;
use crate::{MuninError, Result};

/// Keys requested per `SCAN` round trip.
const SCAN_BATCH: usize = 100;

/// RESP backend speaking to Redis, Dragonfly, Valkey and friends.
pub struct RedisBackend {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    options: ConnectOptions,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("addr", &self.client.get_connection_info().addr.to_string())
            .field("options", &self.options)
            .finish()
    }
}

impl RedisBackend {
    /// Parse `url` and build a lazy client. Performs no I/O.
    pub fn open(url: &str, options: ConnectOptions) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| MuninError::Connection {
            backend: "redis".to_string(),
            message: format!("invalid connection string ({:?})", e.kind()),
        })?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
            options,
        })
    }

    /// Get the shared connection, connecting on first use.
    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_async_connection_with_timeouts(
                self.options.response_timeout,
                self.options.connect_timeout,
            )
            .await
            .map_err(|e| MuninError::Connection {
                backend: "redis".to_string(),
                message: e.to_string(),
            })?;

        debug!(
            addr = %self.client.get_connection_info().addr,
            "redis connection established"
        );
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Run one command, dropping the connection if it turned out to be dead.
    async fn query<T: FromRedisValue>(&self, name: &'static str, cmd: &redis::Cmd) -> Result<T> {
        let mut conn = self.connection().await?;
        match cmd.query_async::<T>(&mut conn).await {
            Ok(value) => Ok(value),
            Err(e) => {
                let err = command_error(name, &e);
                if err.is_transient() {
                    self.connection.lock().await.take();
                    debug!(command = name, "redis connection dropped, reconnecting on next use");
                }
                Err(err)
            }
        }
    }
}

/// Classify a command failure: socket and timeout problems are connection
/// errors, everything the server answered with is a backend error.
fn command_error(name: &str, e: &redis::RedisError) -> MuninError {
    let message = format!("{name} failed: {e}");
    if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_unrecoverable_error()
    {
        MuninError::Connection {
            backend: "redis".to_string(),
            message,
        }
    } else {
        MuninError::backend("redis", message)
    }
}

#[async_trait]
impl KeyValueBackend for RedisBackend {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.query("GET", redis::cmd("GET").arg(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let ttl_seconds = ttl.as_secs().max(1);
        self.query::<()>(
            "SETEX",
            redis::cmd("SETEX").arg(key).arg(ttl_seconds).arg(value),
        )
        .await?;

        debug!(key, ttl_seconds, "redis SET");
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = self
                .query(
                    "SCAN",
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH),
                )
                .await?;

            keys.extend(batch);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once across iterations.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.query("DEL", redis::cmd("DEL").arg(key)).await
    }

    async fn ping(&self) -> Result<()> {
        let pong: String = self.query("PING", &redis::cmd("PING")).await?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(MuninError::backend(
                "redis",
                format!("unexpected PING reply: {pong}"),
            ))
        }
    }

    async fn info(&self) -> Result<String> {
        let info: String = self.query("INFO", redis::cmd("INFO").arg("server")).await?;

        Ok(format!("v{}", server_version(&info).unwrap_or("unknown")))
    }

    async fn close(&self) -> Result<()> {
        // Dropping the last clone of a multiplexed connection closes it.
        self.connection.lock().await.take();
        Ok(())
    }
}

/// Extract `redis_version` from an `INFO server` reply.
fn server_version(info: &str) -> Option<&str> {
    info.lines()
        .find_map(|line| line.strip_prefix("redis_version:"))
        .map(str::trim)
}

/// Escape glob metacharacters so a prefix matches literally in `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
