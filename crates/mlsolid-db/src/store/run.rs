//! Run and experiment persistence

use chrono::{DateTime, Utc};
use mlsolid_core::{Experiment, Run};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::artifact::{parse_artifact, queue_artifact};
use super::metric::{parse_metric, queue_metric};
use super::SolidStore;
use crate::error::{DbError, DbResult};
use crate::keys;
use crate::kv::{Pipeline, Reply, TxFuture};

/// Keys of one run gathered before the batched read
struct RunKeys {
    id: String,
    metrics: Vec<String>,
    artifacts: Vec<String>,
}

impl SolidStore {
    /// Check whether a run exists
    pub async fn run_exists(&self, run_id: &str) -> DbResult<bool> {
        self.kv.exists(&keys::run(run_id)).await
    }

    /// Check whether an experiment has at least one run
    pub async fn experiment_exists(&self, exp_id: &str) -> DbResult<bool> {
        self.kv.exists(&keys::experiment(exp_id)).await
    }

    /// Persist a new run.
    ///
    /// Writes the run hash, indexes the run under its experiment and appends
    /// the pending values of any attached metric, all inside one transaction
    /// on the run key. Fails with [`DbError::AlreadyExists`] when the run key
    /// is already taken.
    pub async fn create_run(&self, run: &Run) -> DbResult<()> {
        let run_key = keys::run(&run.name);
        let watch = vec![run_key.clone()];

        let kv = self.kv.clone();
        let owned = run.clone();
        let body = move || -> TxFuture {
            let kv = kv.clone();
            let run = owned.clone();
            let run_key = run_key.clone();
            Box::pin(async move {
                if kv.exists(&run_key).await? {
                    return Err(DbError::AlreadyExists(format!("run <{}>", run.name)));
                }

                let mut p = Pipeline::new();
                queue_run(&mut p, &run);
                Ok(p)
            })
        };

        self.kv.transaction(&watch, self.max_retries, &body).await?;

        info!("Stored run <{}> under experiment <{}>", run.name, run.experiment_id);
        Ok(())
    }

    /// Load a run with its metrics and artifact pointers
    pub async fn run(&self, run_id: &str) -> DbResult<Run> {
        let mut runs = self.load_runs(&[run_id.to_string()]).await?;
        runs.pop()
            .ok_or_else(|| DbError::NotFound(format!("run <{}>", run_id)))
    }

    /// Load several runs in one batch. Unknown or malformed runs are skipped.
    pub async fn runs(&self, run_ids: &[String]) -> DbResult<Vec<Run>> {
        self.load_runs(run_ids).await
    }

    /// Ids of every stored run, sorted
    pub async fn run_ids(&self) -> DbResult<Vec<String>> {
        let found = self.kv.scan_keys(keys::run_pattern()).await?;
        Ok(found
            .iter()
            .filter_map(|k| keys::run_id(k))
            .map(str::to_string)
            .collect())
    }

    /// Run ids indexed under an experiment, sorted
    pub async fn experiment_run_ids(&self, exp_id: &str) -> DbResult<Vec<String>> {
        let mut ids = self.kv.set_members(&keys::experiment(exp_id)).await?;
        ids.sort();
        Ok(ids)
    }

    /// Ids of every experiment, sorted
    pub async fn experiment_ids(&self) -> DbResult<Vec<String>> {
        let found = self.kv.scan_keys(keys::experiment_pattern()).await?;
        Ok(found
            .iter()
            .filter_map(|k| keys::experiment_id(k))
            .map(str::to_string)
            .collect())
    }

    /// Load an experiment with all of its runs
    pub async fn experiment(&self, exp_id: &str) -> DbResult<Experiment> {
        if !self.experiment_exists(exp_id).await? {
            return Err(DbError::NotFound(format!("experiment <{}>", exp_id)));
        }

        let ids = self.experiment_run_ids(exp_id).await?;
        let runs = self.load_runs(&ids).await?;

        Ok(Experiment::new(exp_id, runs))
    }

    async fn load_runs(&self, run_ids: &[String]) -> DbResult<Vec<Run>> {
        let mut plan = Vec::with_capacity(run_ids.len());
        for id in run_ids {
            let metrics = self.run_keys(&keys::metric_pattern(&keys::escape_pattern(id)), id).await?;
            let artifacts = self.run_keys(&keys::artifact_pattern(&keys::escape_pattern(id)), id).await?;
            plan.push(RunKeys {
                id: id.clone(),
                metrics,
                artifacts,
            });
        }

        let mut p = Pipeline::new();
        for run in &plan {
            p.hgetall(keys::run(&run.id));
            for key in &run.metrics {
                p.xrange(key.as_str());
            }
            for key in &run.artifacts {
                p.hgetall(key.as_str());
            }
        }

        debug!("Loading {} run(s) with {} commands", plan.len(), p.len());
        let mut replies = self.kv.execute(p).await?.into_iter();

        let mut runs = Vec::with_capacity(plan.len());
        for run_keys in plan {
            let hash = next_reply(&mut replies)?.into_hash()?;

            let mut logs = Vec::with_capacity(run_keys.metrics.len());
            for key in &run_keys.metrics {
                logs.push((key, next_reply(&mut replies)?.into_log()?));
            }

            let mut pointers = Vec::with_capacity(run_keys.artifacts.len());
            for _ in &run_keys.artifacts {
                pointers.push(next_reply(&mut replies)?.into_hash()?);
            }

            if hash.is_empty() {
                debug!("Run <{}> not found, skipping", run_keys.id);
                continue;
            }

            let mut run = match parse_run(&hash) {
                Ok(run) => run,
                Err(e) => {
                    warn!("Skipping malformed run <{}>: {}", run_keys.id, e);
                    continue;
                }
            };

            for (key, log) in logs {
                if let Some(metric) = parse_metric(key, &run_keys.id, &log) {
                    run.metrics.insert(metric.name().to_string(), metric);
                }
            }

            for pointer in pointers {
                match parse_artifact(&pointer) {
                    Ok(artifact) => {
                        run.artifacts.insert(artifact.name.clone(), artifact);
                    }
                    Err(e) => warn!("Skipping malformed artifact of run <{}>: {}", run_keys.id, e),
                }
            }

            runs.push(run);
        }

        Ok(runs)
    }

    /// Keys matching `pattern` whose owner is exactly `run_id`
    pub(super) async fn run_keys(&self, pattern: &str, run_id: &str) -> DbResult<Vec<String>> {
        let mut found = self.kv.scan_keys(pattern).await?;
        found.retain(|key| keys::belongs_to_run(key, run_id));
        Ok(found)
    }
}

/// Queue every write of a freshly created run
fn queue_run(p: &mut Pipeline, run: &Run) {
    p.hset(
        keys::run(&run.name),
        [
            (keys::RUN_NAME, run.name.clone()),
            (keys::RUN_TIMESTAMP, run.timestamp.to_rfc3339()),
            (keys::RUN_EXPERIMENT, run.experiment_id.clone()),
        ],
    );
    p.sadd(keys::experiment(&run.experiment_id), run.name.as_str());

    for metric in run.metrics.values() {
        queue_metric(p, &run.name, metric);
    }
    for artifact in run.artifacts.values() {
        queue_artifact(p, &run.name, artifact);
    }
}

fn parse_run(hash: &HashMap<String, String>) -> DbResult<Run> {
    let field = |name: &str| {
        hash.get(name)
            .ok_or_else(|| DbError::InvalidData(format!("run hash is missing {}", name)))
    };

    let timestamp = DateTime::parse_from_rfc3339(field(keys::RUN_TIMESTAMP)?)
        .map_err(|e| DbError::InvalidData(format!("malformed run timestamp: {}", e)))?
        .with_timezone(&Utc);

    Ok(Run::at(field(keys::RUN_NAME)?, field(keys::RUN_EXPERIMENT)?, timestamp)?)
}

fn next_reply(replies: &mut impl Iterator<Item = Reply>) -> DbResult<Reply> {
    replies
        .next()
        .ok_or_else(|| DbError::Protocol("pipeline returned fewer replies than commands".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKvStore;
    use mlsolid_core::{ContentType, Metric, MetricKind, MetricValue, SavedArtifact};
    use std::sync::Arc;

    fn store() -> SolidStore {
        SolidStore::new(Arc::new(MemoryKvStore::new()))
    }

    #[tokio::test]
    async fn test_create_and_load_run() {
        let store = store();
        let mut run = Run::new("Linear Regression", "exp1").unwrap();

        let mut mse = Metric::new("mse", MetricKind::Float);
        mse.add(0.23_f64).unwrap();
        run.metrics.insert(mse.name().to_string(), mse);

        store.create_run(&run).await.unwrap();
        assert!(store.run_exists("linear-regression").await.unwrap());

        let loaded = store.run("linear-regression").await.unwrap();
        assert_eq!(loaded.name, "linear-regression");
        assert_eq!(loaded.experiment_id, "exp1");
        assert_eq!(loaded.timestamp.timestamp(), run.timestamp.timestamp());
        assert_eq!(
            loaded.metric("mse").unwrap().last_val(),
            Some(MetricValue::Float(0.23))
        );
    }

    #[tokio::test]
    async fn test_duplicate_run_is_rejected() {
        let store = store();
        let run = Run::new("run1", "exp1").unwrap();
        store.create_run(&run).await.unwrap();

        let err = store.create_run(&run).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_missing_run() {
        let store = store();
        assert!(store.run("nope").await.unwrap_err().is_not_found());
        assert!(store.runs(&["nope".to_string()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_experiment_index() {
        let store = store();
        store.create_run(&Run::new("a", "exp1").unwrap()).await.unwrap();
        store.create_run(&Run::new("b", "exp1").unwrap()).await.unwrap();
        store.create_run(&Run::new("c", "exp2").unwrap()).await.unwrap();

        assert_eq!(store.experiment_ids().await.unwrap(), vec!["exp1", "exp2"]);
        assert_eq!(store.experiment_run_ids("exp1").await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.run_ids().await.unwrap(), vec!["a", "b", "c"]);

        let exp = store.experiment("exp1").await.unwrap();
        assert_eq!(exp.runs.len(), 2);

        assert!(store.experiment("exp3").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_run_with_artifact_pointers() {
        let store = store();
        let mut run = Run::new("run1", "exp1").unwrap();
        run.artifacts.insert(
            "model.pt".to_string(),
            SavedArtifact {
                name: "model.pt".to_string(),
                content_type: ContentType::Model,
                object_key: "mlsolid/model.pt-0a1b2c3d4e5f".to_string(),
            },
        );

        store.create_run(&run).await.unwrap();

        let loaded = store.run("run1").await.unwrap();
        assert_eq!(
            loaded.artifact("model.pt").unwrap().object_key,
            "mlsolid/model.pt-0a1b2c3d4e5f"
        );
    }

    #[tokio::test]
    async fn test_runs_do_not_see_foreign_logs() {
        let store = store();
        store.create_run(&Run::new("run1", "exp1").unwrap()).await.unwrap();

        // Written by a client that does not validate run ids
        let mut p = Pipeline::new();
        p.xadd(keys::metric("mse", "a:run1"), [(keys::METRIC_NAME, "mse"), (keys::METRIC_VAL, "9")])
            .hset(
                keys::artifact("model.pt", "a:run1"),
                [
                    (keys::ARTIFACT_NAME, "model.pt"),
                    (keys::ARTIFACT_CONTENT_TYPE, "content-type/model"),
                    (keys::ARTIFACT_OBJECT_KEY, "mlsolid/model.pt-000000000000"),
                ],
            );
        store.kv().execute(p).await.unwrap();

        let run = store.run("run1").await.unwrap();
        assert!(run.metric_names().is_empty());
        assert!(run.artifacts.is_empty());
        assert!(store.metrics("run1").await.unwrap().is_empty());
        assert!(store.artifacts("run1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_runs_skip_malformed_records() {
        let store = store();
        store.create_run(&Run::new("good", "exp").unwrap()).await.unwrap();

        let mut p = Pipeline::new();
        p.hset(keys::run("bad"), [(keys::RUN_NAME, "bad"), (keys::RUN_TIMESTAMP, "yesterday")]);
        store.kv().execute(p).await.unwrap();

        let runs = store
            .runs(&["good".to_string(), "bad".to_string()])
            .await
            .unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].name, "good");
    }
}
