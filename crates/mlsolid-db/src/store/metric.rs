//! Metric log persistence

use mlsolid_core::Metric;
use std::collections::HashMap;
use tracing::debug;

use super::SolidStore;
use crate::error::DbResult;
use crate::keys;
use crate::kv::{LogEntry, Pipeline};

impl SolidStore {
    /// Append the pending values of each metric to its log.
    ///
    /// Only [`Metric::vals_to_commit`] is written, so values already in the
    /// log are never resent. The caller commits the metrics afterwards.
    pub async fn append_metrics(&self, run_id: &str, metrics: &[Metric]) -> DbResult<()> {
        let mut p = Pipeline::new();
        for metric in metrics {
            queue_metric(&mut p, run_id, metric);
        }

        if p.is_empty() {
            return Ok(());
        }

        debug!("Appending {} metric value(s) to run <{}>", p.len(), run_id);
        self.kv.execute(p).await?;
        Ok(())
    }

    /// Load every metric logged for a run, keyed by metric name
    pub async fn metrics(&self, run_id: &str) -> DbResult<HashMap<String, Metric>> {
        let found = self
            .run_keys(&keys::metric_pattern(&keys::escape_pattern(run_id)), run_id)
            .await?;

        let mut p = Pipeline::new();
        for key in &found {
            p.xrange(key.as_str());
        }
        let replies = self.kv.execute(p).await?;

        let mut metrics = HashMap::with_capacity(found.len());
        for (key, reply) in found.iter().zip(replies) {
            if let Some(metric) = parse_metric(key, run_id, &reply.into_log()?) {
                metrics.insert(metric.name().to_string(), metric);
            }
        }

        Ok(metrics)
    }
}

/// Queue one `XADD` per pending value of `metric`
pub(super) fn queue_metric(p: &mut Pipeline, run_id: &str, metric: &Metric) {
    let key = keys::metric(metric.name(), run_id);
    for value in metric.vals_to_commit() {
        p.xadd(
            key.as_str(),
            [
                (keys::METRIC_NAME, metric.name().to_string()),
                (keys::METRIC_VAL, value.to_string()),
            ],
        );
    }
}

/// Rebuild a metric from its log; `None` when the log is empty
pub(super) fn parse_metric(key: &str, run_id: &str, log: &[LogEntry]) -> Option<Metric> {
    let first = log.first()?;

    let name = first
        .field(keys::METRIC_NAME)
        .map(str::to_string)
        .or_else(|| name_from_key(key, run_id))?;

    let raw: Vec<String> = log
        .iter()
        .filter_map(|entry| entry.field(keys::METRIC_VAL))
        .map(str::to_string)
        .collect();

    Metric::from_log(&name, &raw)
}

fn name_from_key(key: &str, run_id: &str) -> Option<String> {
    key.strip_prefix("metric:")?
        .strip_suffix(run_id)?
        .strip_suffix(':')
        .map(str::to_string)
}
