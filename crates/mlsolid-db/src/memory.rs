//! In-process metadata store
//!
//! Mirrors the Redis data types closely enough for the repository: hashes,
//! sets, lists and append-only logs. Every write bumps a per-key version, and
//! transactions validate the versions of their watched keys before applying
//! their writes.

use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::kv::{Command, KvStore, LogEntry, Pipeline, Reply, TxFn};

#[derive(Debug, Clone)]
enum Entry {
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
    List(VecDeque<String>),
    Log(Vec<LogEntry>),
}

impl Entry {
    fn type_name(&self) -> &'static str {
        match self {
            Entry::Hash(_) => "hash",
            Entry::Set(_) => "set",
            Entry::List(_) => "list",
            Entry::Log(_) => "stream",
        }
    }
}

#[derive(Debug, Default)]
struct State {
    data: HashMap<String, Entry>,
    versions: HashMap<String, u64>,
    clock: u64,
    log_seq: u64,
}

impl State {
    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn touch(&mut self, key: &str) {
        self.clock += 1;
        self.versions.insert(key.to_string(), self.clock);
    }

    fn apply(&mut self, command: &Command) -> DbResult<Reply> {
        if command.is_write() {
            for key in command.keys() {
                self.touch(key);
            }
        }

        match command {
            Command::HSet { key, fields } => {
                let hash = self.hash_mut(key)?;
                for (field, value) in fields {
                    hash.insert(field.clone(), value.clone());
                }
                Ok(Reply::Done)
            }
            Command::SAdd { key, members } => {
                let set = self.set_mut(key)?;
                set.extend(members.iter().cloned());
                Ok(Reply::Done)
            }
            Command::LPush { key, values } => {
                let list = self.list_mut(key)?;
                for value in values {
                    list.push_front(value.clone());
                }
                Ok(Reply::Done)
            }
            Command::XAdd { key, fields } => {
                self.log_seq += 1;
                let id = format!("{}-0", self.log_seq);
                let log = self.log_mut(key)?;
                log.push(LogEntry {
                    id,
                    fields: fields.clone(),
                });
                Ok(Reply::Done)
            }
            Command::Del { keys } => {
                for key in keys {
                    self.data.remove(key);
                }
                Ok(Reply::Done)
            }
            Command::Exists { key } => Ok(Reply::Bool(self.data.contains_key(key))),
            Command::HGetAll { key } => match self.data.get(key) {
                None => Ok(Reply::Hash(HashMap::new())),
                Some(Entry::Hash(h)) => Ok(Reply::Hash(h.clone())),
                Some(other) => Err(wrong_type(key, "hash", other)),
            },
            Command::SMembers { key } => match self.data.get(key) {
                None => Ok(Reply::List(Vec::new())),
                Some(Entry::Set(s)) => Ok(Reply::List(s.iter().cloned().collect())),
                Some(other) => Err(wrong_type(key, "set", other)),
            },
            Command::LRange { key, start, stop } => match self.data.get(key) {
                None => Ok(Reply::List(Vec::new())),
                Some(Entry::List(l)) => Ok(Reply::List(list_range(l, *start, *stop))),
                Some(other) => Err(wrong_type(key, "list", other)),
            },
            Command::LLen { key } => match self.data.get(key) {
                None => Ok(Reply::Len(0)),
                Some(Entry::List(l)) => Ok(Reply::Len(l.len())),
                Some(other) => Err(wrong_type(key, "list", other)),
            },
            Command::XRange { key } => match self.data.get(key) {
                None => Ok(Reply::Log(Vec::new())),
                Some(Entry::Log(l)) => Ok(Reply::Log(l.clone())),
                Some(other) => Err(wrong_type(key, "stream", other)),
            },
        }
    }

    fn hash_mut(&mut self, key: &str) -> DbResult<&mut HashMap<String, String>> {
        match self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()))
        {
            Entry::Hash(h) => Ok(h),
            other => Err(wrong_type(key, "hash", other)),
        }
    }

    fn set_mut(&mut self, key: &str) -> DbResult<&mut BTreeSet<String>> {
        match self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(BTreeSet::new()))
        {
            Entry::Set(s) => Ok(s),
            other => Err(wrong_type(key, "set", other)),
        }
    }

    fn list_mut(&mut self, key: &str) -> DbResult<&mut VecDeque<String>> {
        match self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()))
        {
            Entry::List(l) => Ok(l),
            other => Err(wrong_type(key, "list", other)),
        }
    }

    fn log_mut(&mut self, key: &str) -> DbResult<&mut Vec<LogEntry>> {
        match self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Log(Vec::new()))
        {
            Entry::Log(l) => Ok(l),
            other => Err(wrong_type(key, "stream", other)),
        }
    }
}

fn wrong_type(key: &str, wanted: &str, got: &Entry) -> DbError {
    DbError::Protocol(format!(
        "WRONGTYPE key {} holds a {}, not a {}",
        key,
        got.type_name(),
        wanted
    ))
}

/// Redis LRANGE semantics: inclusive bounds, negative indices count from the end
fn list_range(list: &VecDeque<String>, start: isize, stop: isize) -> Vec<String> {
    let len = list.len() as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start > stop || start >= len {
        return Vec::new();
    }

    list.iter()
        .skip(start as usize)
        .take((stop - start + 1) as usize)
        .cloned()
        .collect()
}

/// Compile a Redis glob (`*`, `?`, `[...]` classes, backslash escapes)
/// into an anchored regex
pub(crate) fn glob_regex(pattern: &str) -> DbResult<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => re.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4]))),
                None => re.push_str(&regex::escape("\\")),
            },
            '[' => {
                re.push('[');
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    if inner == '\\' || inner == '[' {
                        re.push('\\');
                    }
                    re.push(inner);
                }
                re.push(']');
            }
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');

    Regex::new(&re).map_err(|e| DbError::Command(format!("invalid key pattern {}: {}", pattern, e)))
}

/// In-memory [`KvStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    state: Arc<Mutex<State>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored
    pub async fn len(&self) -> usize {
        self.state.lock().await.data.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn execute(&self, pipeline: Pipeline) -> DbResult<Vec<Reply>> {
        let mut state = self.state.lock().await;
        pipeline
            .commands()
            .iter()
            .map(|command| state.apply(command))
            .collect()
    }

    async fn scan_keys(&self, pattern: &str) -> DbResult<Vec<String>> {
        let matcher = glob_regex(pattern)?;
        let state = self.state.lock().await;
        let mut keys: Vec<String> = state
            .data
            .keys()
            .filter(|k| matcher.is_match(k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn transaction(&self, keys: &[String], max_retries: usize, body: &TxFn) -> DbResult<()> {
        let attempts = max_retries.max(1);

        for attempt in 1..=attempts {
            let watched: Vec<u64> = {
                let state = self.state.lock().await;
                keys.iter().map(|k| state.version(k)).collect()
            };

            let pipeline = body().await?;

            // Nothing to commit, so there is nothing a conflict could undo
            if pipeline.is_empty() {
                debug!("Transaction on {:?} had no writes", keys);
                return Ok(());
            }

            let mut state = self.state.lock().await;
            let unchanged = keys
                .iter()
                .zip(&watched)
                .all(|(k, v)| state.version(k) == *v);

            if unchanged {
                // Validate every command against a scratch copy first so a
                // type error cannot leave the batch half applied.
                let mut scratch = State {
                    data: state.data.clone(),
                    versions: HashMap::new(),
                    clock: state.clock,
                    log_seq: state.log_seq,
                };
                for command in pipeline.commands() {
                    scratch.apply(command)?;
                }
                for command in pipeline.commands() {
                    state.apply(command)?;
                }
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn glob(pattern: &str, key: &str) -> bool {
        glob_regex(pattern).unwrap().is_match(key)
    }

    #[test]
    fn test_glob_match() {
        assert!(glob("exp:*", "exp:exp1"));
        assert!(glob("artifact:*:run1", "artifact:model.pt:run1"));
        assert!(!glob("artifact:*:run1", "artifact:model.pt:run2"));
        assert!(glob("run:?", "run:a"));
        assert!(!glob("run:?", "run:ab"));
        assert!(glob("*", ""));
        assert!(glob("a\\*b", "a*b"));
        assert!(!glob("a\\*b", "axb"));
        assert!(glob("run:[ab]", "run:b"));
        assert!(!glob("run:[ab]", "run:c"));
        assert!(glob("metric:(x)+.*", "metric:(x)+.*"));
        assert!(!glob("metric:(x)+.*", "metric:xx"));
    }

    #[test]
    fn test_list_range_semantics() {
        let list: VecDeque<String> = ["c", "b", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(list_range(&list, 0, -1), vec!["c", "b", "a"]);
        assert_eq!(list_range(&list, 0, 0), vec!["c"]);
        assert_eq!(list_range(&list, 2, 2), vec!["a"]);
        assert_eq!(list_range(&list, -1, -1), vec!["a"]);
        assert!(list_range(&list, 3, 3).is_empty());
        assert_eq!(list_range(&list, 1, 10), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_pipeline_reads_own_writes() {
        let store = MemoryKvStore::new();

        let mut p = Pipeline::new();
        p.lpush("registry:r", "first")
            .lpush("registry:r", "second")
            .lrange("registry:r", 0, -1)
            .llen("registry:r")
            .exists("registry:r");

        let replies = store.execute(p).await.unwrap();
        assert_eq!(
            replies[2],
            Reply::List(vec!["second".to_string(), "first".to_string()])
        );
        assert_eq!(replies[3], Reply::Len(2));
        assert_eq!(replies[4], Reply::Bool(true));
    }

    #[tokio::test]
    async fn test_typed_reads() {
        let store = MemoryKvStore::new();

        let mut p = Pipeline::new();
        p.hset("run:a", [("Name", "a")])
            .sadd("exp:e", "a")
            .xadd("metric:mse:a", [("Name", "mse"), ("Val", "0.5")])
            .xadd("metric:mse:a", [("Name", "mse"), ("Val", "0.4")]);
        store.execute(p).await.unwrap();

        assert_eq!(store.hash_get_all("run:a").await.unwrap()["Name"], "a");
        assert_eq!(store.set_members("exp:e").await.unwrap(), vec!["a"]);

        let log = store.log_range("metric:mse:a").await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].field("Val"), Some("0.4"));

        assert!(store.hash_get_all("run:missing").await.unwrap().is_empty());
        assert!(!store.exists("run:missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_type_is_rejected() {
        let store = MemoryKvStore::new();

        let mut p = Pipeline::new();
        p.sadd("k", "member");
        store.execute(p).await.unwrap();

        let err = store.hash_get_all("k").await.unwrap_err();
        assert!(matches!(err, DbError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_scan_keys() {
        let store = MemoryKvStore::new();

        let mut p = Pipeline::new();
        p.sadd("exp:one", "a").sadd("exp:two", "b").hset("run:a", [("Name", "a")]);
        store.execute(p).await.unwrap();

        assert_eq!(store.scan_keys("exp:*").await.unwrap(), vec!["exp:one", "exp:two"]);
        assert_eq!(store.scan_keys("run:*").await.unwrap(), vec!["run:a"]);
        assert!(store.scan_keys("metric:*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transaction_commits_without_conflict() {
        let store = MemoryKvStore::new();
        let keys = vec!["counter".to_string()];

        let body = || -> crate::kv::TxFuture {
            Box::pin(async {
                let mut p = Pipeline::new();
                p.lpush("counter", "1");
                Ok::<_, DbError>(p)
            })
        };

        store.transaction(&keys, 3, &body).await.unwrap();
        assert_eq!(store.list_len("counter").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transaction_retries_on_conflict() {
        let store = MemoryKvStore::new();
        let keys = vec!["counter".to_string()];
        let calls = Arc::new(AtomicUsize::new(0));

        let interfering = store.clone();
        let counter = calls.clone();
        let body = move || -> crate::kv::TxFuture {
            let store = interfering.clone();
            let counter = counter.clone();
            Box::pin(async move {
                // The first attempt races with a foreign write.
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    let mut p = Pipeline::new();
                    p.lpush("counter", "foreign");
                    store.execute(p).await?;
                }
                let mut p = Pipeline::new();
                p.lpush("counter", "mine");
                Ok::<_, DbError>(p)
            })
        };

        store.transaction(&keys, 3, &body).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            store.list_range("counter", 0, -1).await.unwrap(),
            vec!["mine", "foreign"]
        );
    }

    #[tokio::test]
    async fn test_transaction_exhausts_retries() {
        let store = MemoryKvStore::new();
        let keys = vec!["counter".to_string()];

        let interfering = store.clone();
        let body = move || -> crate::kv::TxFuture {
            let store = interfering.clone();
            Box::pin(async move {
                let mut p = Pipeline::new();
                p.lpush("counter", "foreign");
                store.execute(p).await?;

                let mut p = Pipeline::new();
                p.lpush("counter", "mine");
                Ok::<_, DbError>(p)
            })
        };

        let err = store.transaction(&keys, 4, &body).await.unwrap_err();
        assert!(matches!(err, DbError::RetriesExhausted { attempts: 4, .. }));

        let stored = store.list_range("counter", 0, -1).await.unwrap();
        assert_eq!(stored.len(), 4);
        assert!(stored.iter().all(|v| v == "foreign"));
    }

    #[tokio::test]
    async fn test_empty_transaction_succeeds_despite_conflict() {
        let store = MemoryKvStore::new();
        let keys = vec!["counter".to_string()];
        let calls = Arc::new(AtomicUsize::new(0));

        let interfering = store.clone();
        let counter = calls.clone();
        let body = move || -> crate::kv::TxFuture {
            let store = interfering.clone();
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut p = Pipeline::new();
                p.lpush("counter", "foreign");
                store.execute(p).await?;
                Ok::<_, DbError>(Pipeline::new())
            })
        };

        store.transaction(&keys, 4, &body).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.list_len("counter").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transaction_body_error_aborts() {
        let store = MemoryKvStore::new();
        let keys = vec!["k".to_string()];

        let body = || -> crate::kv::TxFuture {
            Box::pin(async { Err::<Pipeline, _>(DbError::AlreadyExists("k".to_string())) })
        };

        let err = store.transaction(&keys, 3, &body).await.unwrap_err();
        assert!(err.is_already_exists());
        assert!(store.is_empty().await);
    }
}
