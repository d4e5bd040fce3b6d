//! Redis metadata store
//!
//! Plain commands and pipelines go through a shared [`ConnectionManager`].
//! Every optimistic transaction attempt opens a dedicated connection so that
//! its `WATCH` state is never shared with other callers.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::RedisConfig;
use crate::error::{DbError, DbResult};
use crate::kv::{Command, KvStore, LogEntry, Pipeline, Reply, TxFn};

/// Redis-backed [`KvStore`]
#[derive(Clone)]
pub struct RedisKvStore {
    client: Client,
    connection: ConnectionManager,
    config: RedisConfig,
}

impl RedisKvStore {
    /// Connect to Redis
    pub async fn new(config: RedisConfig) -> DbResult<Self> {
        config.validate()?;

        info!("Connecting to Redis at {}", mask_redis_url(&config.url));

        let client = Client::open(config.url.clone())
            .map_err(|e| DbError::Configuration(format!("Invalid Redis URL: {}", e)))?;

        let connection = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client.clone()))
            .await
            .map_err(|_| {
                DbError::Connection(format!(
                    "Timed out connecting to Redis after {:?}",
                    config.connect_timeout
                ))
            })?
            .map_err(|e| DbError::Connection(format!("Failed to connect to Redis: {}", e)))?;

        info!("Successfully connected to Redis");

        Ok(Self {
            client,
            connection,
            config,
        })
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn execute(&self, pipeline: Pipeline) -> DbResult<Vec<Reply>> {
        if pipeline.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Redis pipeline: {} commands", pipeline.len());

        let mut pipe = redis::pipe();
        for command in pipeline.commands() {
            add_command(&mut pipe, command);
        }

        let mut conn = self.connection.clone();
        let values: Vec<Value> = pipe.query_async(&mut conn).await.map_err(|e| {
            warn!("Redis pipeline error: {}", e);
            DbError::from(e)
        })?;

        pipeline
            .commands()
            .iter()
            .zip(values)
            .map(|(command, value)| to_reply(command, value))
            .collect()
    }

    async fn scan_keys(&self, pattern: &str) -> DbResult<Vec<String>> {
        debug!("Redis SCAN MATCH {}", pattern);

        let mut conn = self.connection.clone();
        let mut iter = conn.scan_match::<_, String>(pattern).await?;

        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        keys.sort();
        keys.dedup();

        Ok(keys)
    }

    async fn transaction(&self, keys: &[String], max_retries: usize, body: &TxFn) -> DbResult<()> {
        let attempts = max_retries.max(1);

        for attempt in 1..=attempts {
            let mut conn = self.client.get_async_connection().await?;

            redis::cmd("WATCH")
                .arg(keys)
                .query_async::<_, ()>(&mut conn)
                .await?;

            let pipeline = match body().await {
                Ok(pipeline) => pipeline,
                Err(e) => {
                    let _: redis::RedisResult<()> = redis::cmd("UNWATCH").query_async(&mut conn).await;
                    return Err(e);
                }
            };

            if pipeline.is_empty() {
                let _: redis::RedisResult<()> = redis::cmd("UNWATCH").query_async(&mut conn).await;
                return Ok(());
            }

            let mut pipe = redis::pipe();
            pipe.atomic();
            for command in pipeline.commands() {
                add_command(&mut pipe, command);
                pipe.ignore();
            }

            let committed: Option<Value> = pipe.query_async(&mut conn).await?;
            if committed.is_some() {
                debug!("Transaction on {:?} committed after {} attempt(s)", keys, attempt);
                return Ok(());
            }

            debug!("Transaction conflict on {:?}, attempt {}/{}", keys, attempt, attempts);
        }

        warn!("Transaction on {:?} exhausted {} attempts", keys, attempts);
        Err(DbError::RetriesExhausted {
            attempts,
            keys: keys.to_vec(),
        })
    }

    async fn ping(&self) -> DbResult<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

fn add_command(pipe: &mut redis::Pipeline, command: &Command) {
    match command {
        Command::HSet { key, fields } => {
            let cmd = pipe.cmd("HSET").arg(key);
            for (field, value) in fields {
                cmd.arg(field).arg(value);
            }
        }
        Command::SAdd { key, members } => {
            pipe.cmd("SADD").arg(key).arg(members);
        }
        Command::LPush { key, values } => {
            pipe.cmd("LPUSH").arg(key).arg(values);
        }
        Command::XAdd { key, fields } => {
            let cmd = pipe.cmd("XADD").arg(key).arg("*");
            for (field, value) in fields {
                cmd.arg(field).arg(value);
            }
        }
        Command::Del { keys } => {
            pipe.cmd("DEL").arg(keys);
        }
        Command::Exists { key } => {
            pipe.cmd("EXISTS").arg(key);
        }
        Command::HGetAll { key } => {
            pipe.cmd("HGETALL").arg(key);
        }
        Command::SMembers { key } => {
            pipe.cmd("SMEMBERS").arg(key);
        }
        Command::LRange { key, start, stop } => {
            pipe.cmd("LRANGE").arg(key).arg(*start).arg(*stop);
        }
        Command::LLen { key } => {
            pipe.cmd("LLEN").arg(key);
        }
        Command::XRange { key } => {
            pipe.cmd("XRANGE").arg(key).arg("-").arg("+");
        }
    }
}

fn to_reply(command: &Command, value: Value) -> DbResult<Reply> {
    let reply = match command {
        Command::HSet { .. }
        | Command::SAdd { .. }
        | Command::LPush { .. }
        | Command::XAdd { .. }
        | Command::Del { .. } => Reply::Done,
        Command::Exists { .. } => Reply::Bool(redis::from_redis_value::<i64>(&value)? > 0),
        Command::LLen { .. } => Reply::Len(redis::from_redis_value(&value)?),
        Command::HGetAll { .. } => {
            Reply::Hash(redis::from_redis_value::<HashMap<String, String>>(&value)?)
        }
        Command::SMembers { .. } | Command::LRange { .. } => {
            Reply::List(redis::from_redis_value(&value)?)
        }
        Command::XRange { .. } => {
            let raw: Vec<(String, Vec<String>)> = redis::from_redis_value(&value)?;
            Reply::Log(raw.into_iter().map(log_entry).collect())
        }
    };

    Ok(reply)
}

fn log_entry((id, flat): (String, Vec<String>)) -> LogEntry {
    let mut fields = Vec::with_capacity(flat.len() / 2);
    let mut it = flat.into_iter();
    while let (Some(field), Some(value)) = (it.next(), it.next()) {
        fields.push((field, value));
    }
    LogEntry { id, fields }
}

/// Mask sensitive parts of Redis URL for logging
pub fn mask_redis_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut masked = parsed.clone();
        if parsed.password().is_some() {
            let _ = masked.set_password(Some("***"));
        }
        masked.to_string()
    } else {
        // If parsing fails, just show the host part
        url.split('@')
            .last()
            .map(|s| format!("***@{}", s))
            .unwrap_or_else(|| "***".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_redis_url() {
        let url = "redis://:password@localhost:6379";
        let masked = mask_redis_url(url);
        assert!(!masked.contains("password"));
        assert!(masked.contains("localhost"));

        let url_no_pass = "redis://localhost:6379";
        let masked = mask_redis_url(url_no_pass);
        assert!(masked.contains("localhost"));
    }

    #[test]
    fn test_log_entry_pairs_fields() {
        let entry = log_entry((
            "1700000000000-0".to_string(),
            vec!["Name".into(), "mse".into(), "Val".into(), "0.5".into()],
        ));
        assert_eq!(entry.id, "1700000000000-0");
        assert_eq!(entry.field("Name"), Some("mse"));
        assert_eq!(entry.field("Val"), Some("0.5"));
    }

    #[test]
    fn test_reply_decoding() {
        let exists = to_reply(&Command::Exists { key: "k".into() }, Value::Int(1)).unwrap();
        assert_eq!(exists, Reply::Bool(true));

        let write = to_reply(
            &Command::Del { keys: vec!["k".into()] },
            Value::Int(0),
        )
        .unwrap();
        assert_eq!(write, Reply::Done);

        let list = to_reply(
            &Command::LRange { key: "k".into(), start: 0, stop: -1 },
            Value::Bulk(vec![Value::Data(b"a".to_vec()), Value::Data(b"b".to_vec())]),
        )
        .unwrap();
        assert_eq!(list, Reply::List(vec!["a".into(), "b".into()]));
    }
}
