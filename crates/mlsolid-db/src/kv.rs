//! Metadata store capability
//!
//! [`KvStore`] is the narrow set of key-value operations the repository
//! needs: typed reads, pattern enumeration, pipelined batches and a
//! bounded-retry optimistic transaction. Backends implement the batch,
//! scan and transaction primitives; single reads are expressed as one-command
//! pipelines unless a backend overrides them.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;

use crate::error::{DbError, DbResult};

/// Default retry budget of the optimistic transaction
pub const DEFAULT_TRANSACTION_MAX_RETRIES: usize = 10;

/// One record of an append-only log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Store-assigned, monotonically increasing id
    pub id: String,
    /// Field/value pairs in insertion order
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(f, _)| f == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A single store command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    HSet { key: String, fields: Vec<(String, String)> },
    SAdd { key: String, members: Vec<String> },
    LPush { key: String, values: Vec<String> },
    XAdd { key: String, fields: Vec<(String, String)> },
    Del { keys: Vec<String> },
    Exists { key: String },
    HGetAll { key: String },
    SMembers { key: String },
    LRange { key: String, start: isize, stop: isize },
    LLen { key: String },
    XRange { key: String },
}

impl Command {
    /// Whether the command mutates the store
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Command::HSet { .. }
                | Command::SAdd { .. }
                | Command::LPush { .. }
                | Command::XAdd { .. }
                | Command::Del { .. }
        )
    }

    /// Keys touched by the command
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Command::Del { keys } => keys.iter().map(String::as_str).collect(),
            Command::HSet { key, .. }
            | Command::SAdd { key, .. }
            | Command::LPush { key, .. }
            | Command::XAdd { key, .. }
            | Command::Exists { key }
            | Command::HGetAll { key }
            | Command::SMembers { key }
            | Command::LRange { key, .. }
            | Command::LLen { key }
            | Command::XRange { key } => vec![key.as_str()],
        }
    }
}

/// Result of one command in a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Write acknowledged
    Done,
    Bool(bool),
    Len(usize),
    Hash(HashMap<String, String>),
    List(Vec<String>),
    Log(Vec<LogEntry>),
}

impl Reply {
    pub fn into_bool(self) -> DbResult<bool> {
        match self {
            Reply::Bool(b) => Ok(b),
            other => Err(unexpected("bool", &other)),
        }
    }

    pub fn into_len(self) -> DbResult<usize> {
        match self {
            Reply::Len(n) => Ok(n),
            other => Err(unexpected("length", &other)),
        }
    }

    pub fn into_hash(self) -> DbResult<HashMap<String, String>> {
        match self {
            Reply::Hash(h) => Ok(h),
            other => Err(unexpected("hash", &other)),
        }
    }

    pub fn into_list(self) -> DbResult<Vec<String>> {
        match self {
            Reply::List(l) => Ok(l),
            other => Err(unexpected("list", &other)),
        }
    }

    pub fn into_log(self) -> DbResult<Vec<LogEntry>> {
        match self {
            Reply::Log(l) => Ok(l),
            other => Err(unexpected("log", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &Reply) -> DbError {
    DbError::Protocol(format!("expected {} reply, got {:?}", wanted, got))
}

/// Ordered batch of commands issued together.
///
/// Commands run in order and a later read observes earlier writes of the
/// same pipeline. There is no atomicity across keys outside a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn hset<K, V>(&mut self, key: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.push(Command::HSet {
            key: key.into(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        })
    }

    pub fn sadd(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Command::SAdd {
            key: key.into(),
            members: vec![member.into()],
        })
    }

    pub fn lpush(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(Command::LPush {
            key: key.into(),
            values: vec![value.into()],
        })
    }

    pub fn xadd<K, V>(&mut self, key: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.push(Command::XAdd {
            key: key.into(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        })
    }

    pub fn del(&mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.push(Command::Del {
            keys: keys.into_iter().map(Into::into).collect(),
        })
    }

    pub fn exists(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::Exists { key: key.into() })
    }

    pub fn hgetall(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::HGetAll { key: key.into() })
    }

    pub fn smembers(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::SMembers { key: key.into() })
    }

    pub fn lrange(&mut self, key: impl Into<String>, start: isize, stop: isize) -> &mut Self {
        self.push(Command::LRange {
            key: key.into(),
            start,
            stop,
        })
    }

    pub fn llen(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::LLen { key: key.into() })
    }

    pub fn xrange(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::XRange { key: key.into() })
    }
}

/// Future produced by one attempt of a transaction body
pub type TxFuture = BoxFuture<'static, DbResult<Pipeline>>;

/// Read-modify-write body of an optimistic transaction.
///
/// The body re-reads whatever state it needs and returns the writes to apply.
/// It is invoked again on every retry, so it must not carry state between
/// attempts.
pub type TxFn = dyn Fn() -> TxFuture + Send + Sync;

/// Key-value metadata store
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Run a batch of commands, returning one reply per command in order
    async fn execute(&self, pipeline: Pipeline) -> DbResult<Vec<Reply>>;

    /// Enumerate keys matching a glob pattern (`*` and `?`)
    async fn scan_keys(&self, pattern: &str) -> DbResult<Vec<String>>;

    /// Optimistic transaction over `keys`.
    ///
    /// Watches the keys, runs `body` and applies its writes atomically only
    /// if none of the watched keys changed in the meantime. On conflict the
    /// whole body is re-run, up to `max_retries` attempts, after which
    /// [`DbError::RetriesExhausted`] is returned. Errors from `body` abort
    /// the transaction without retrying.
    /// A body that returns an empty pipeline ends the transaction with `Ok`
    /// on that attempt; there is no write for a conflict to invalidate.
    async fn transaction(&self, keys: &[String], max_retries: usize, body: &TxFn) -> DbResult<()>;

    /// Check connectivity
    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }

    async fn exists(&self, key: &str) -> DbResult<bool> {
        let mut p = Pipeline::new();
        p.exists(key);
        single(self.execute(p).await?)?.into_bool()
    }

    async fn hash_get_all(&self, key: &str) -> DbResult<HashMap<String, String>> {
        let mut p = Pipeline::new();
        p.hgetall(key);
        single(self.execute(p).await?)?.into_hash()
    }

    async fn set_members(&self, key: &str) -> DbResult<Vec<String>> {
        let mut p = Pipeline::new();
        p.smembers(key);
        single(self.execute(p).await?)?.into_list()
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> DbResult<Vec<String>> {
        let mut p = Pipeline::new();
        p.lrange(key, start, stop);
        single(self.execute(p).await?)?.into_list()
    }

    async fn list_len(&self, key: &str) -> DbResult<usize> {
        let mut p = Pipeline::new();
        p.llen(key);
        single(self.execute(p).await?)?.into_len()
    }

    async fn log_range(&self, key: &str) -> DbResult<Vec<LogEntry>> {
        let mut p = Pipeline::new();
        p.xrange(key);
        single(self.execute(p).await?)?.into_log()
    }
}

fn single(replies: Vec<Reply>) -> DbResult<Reply> {
    replies
        .into_iter()
        .next()
        .ok_or_else(|| DbError::Protocol("empty pipeline reply".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_builder() {
        let mut p = Pipeline::new();
        p.hset("run:a", [("Name", "a"), ("ExperimentID", "exp")])
            .sadd("exp:exp", "a")
            .exists("run:a");

        assert_eq!(p.len(), 3);
        assert!(p.commands()[0].is_write());
        assert!(!p.commands()[2].is_write());
        assert_eq!(p.commands()[1].keys(), vec!["exp:exp"]);
    }

    #[test]
    fn test_reply_conversion() {
        assert!(Reply::Bool(true).into_bool().unwrap());
        assert_eq!(Reply::Len(3).into_len().unwrap(), 3);
        assert!(matches!(Reply::Done.into_hash(), Err(DbError::Protocol(_))));
    }

    #[test]
    fn test_log_entry_field() {
        let entry = LogEntry {
            id: "1-0".to_string(),
            fields: vec![
                ("Name".to_string(), "mse".to_string()),
                ("Val".to_string(), "0.1".to_string()),
            ],
        };
        assert_eq!(entry.field("Val"), Some("0.1"));
        assert_eq!(entry.field("Other"), None);
    }
}
