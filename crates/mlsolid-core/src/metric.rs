//! Metric accumulator
//!
//! A metric is a named, append-only sequence of homogeneous values. New values
//! land in a pending buffer first and only become visible through
//! [`Metric::vals`] and [`Metric::last_val`] once [`Metric::commit`] is called.
//! The pending buffer is what gets written to the metadata store, so already
//! persisted values are never resent.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SolidError};
use crate::types::normalize_id;

/// A single metric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetricValue {
    /// Re-type a raw stored value: integer, then float, else string.
    pub fn parse(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            MetricValue::Int(i)
        } else if let Ok(f) = raw.parse::<f64>() {
            MetricValue::Float(f)
        } else {
            MetricValue::Str(raw.to_string())
        }
    }

    /// Kind of series this value belongs to
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Int(_) => MetricKind::Int,
            MetricValue::Float(_) => MetricKind::Float,
            MetricValue::Str(_) => MetricKind::Str,
        }
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Int(i) => Some(*i as f64),
            MetricValue::Float(f) => Some(*f),
            MetricValue::Str(_) => None,
        }
    }

    /// String view of the value, if it is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(i) => write!(f, "{}", i),
            MetricValue::Float(v) => write!(f, "{}", v),
            MetricValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Str(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Str(v)
    }
}

/// Value type a metric is fixed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Int,
    Float,
    Str,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Int => write!(f, "int"),
            MetricKind::Float => write!(f, "float"),
            MetricKind::Str => write!(f, "string"),
        }
    }
}

/// Committed values plus the pending buffer of one metric
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series<T> {
    values: Vec<T>,
    pending: Vec<T>,
}

impl<T: Clone> Series<T> {
    fn committed(values: Vec<T>) -> Self {
        Self {
            values,
            pending: Vec::new(),
        }
    }

    fn push(&mut self, v: T) {
        self.pending.push(v);
    }

    fn commit(&mut self) {
        self.values.append(&mut self.pending);
    }
}

/// Closed set of series types a metric can hold
#[derive(Debug, Clone, PartialEq)]
pub enum MetricSeries {
    Int(Series<i64>),
    Float(Series<f64>),
    Str(Series<String>),
}

impl MetricSeries {
    fn empty(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Int => MetricSeries::Int(Series::default()),
            MetricKind::Float => MetricSeries::Float(Series::default()),
            MetricKind::Str => MetricSeries::Str(Series::default()),
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSeries::Int(_) => MetricKind::Int,
            MetricSeries::Float(_) => MetricKind::Float,
            MetricSeries::Str(_) => MetricKind::Str,
        }
    }
}

/// A named, typed, append-only metric
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    name: String,
    series: MetricSeries,
}

impl Metric {
    /// Create an empty metric of the given kind. The name is normalized.
    pub fn new(name: &str, kind: MetricKind) -> Self {
        Self {
            name: normalize_id(name),
            series: MetricSeries::empty(kind),
        }
    }

    /// Create a metric whose type is fixed by the first value; every value
    /// is added to the pending buffer.
    pub fn with_pending(name: &str, values: Vec<MetricValue>) -> Result<Self> {
        let first = values.first().ok_or_else(|| {
            SolidError::InvalidInput(format!("metric <{}> has no values", name))
        })?;

        let mut metric = Self::new(name, first.kind());
        for v in values {
            metric.add(v)?;
        }
        Ok(metric)
    }

    /// Rebuild a metric from the raw text stored in its log.
    ///
    /// The first entry fixes the type for the whole sequence; later entries
    /// that do not parse under that type are dropped. Returns `None` for an
    /// empty log.
    pub fn from_log(name: &str, raw: &[String]) -> Option<Self> {
        let first = raw.first()?;

        let series = match MetricValue::parse(first).kind() {
            MetricKind::Int => MetricSeries::Int(Series::committed(
                raw.iter().filter_map(|r| r.parse::<i64>().ok()).collect(),
            )),
            MetricKind::Float => MetricSeries::Float(Series::committed(
                raw.iter().filter_map(|r| r.parse::<f64>().ok()).collect(),
            )),
            MetricKind::Str => MetricSeries::Str(Series::committed(raw.to_vec())),
        };

        Some(Self {
            name: name.to_string(),
            series,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.series.kind()
    }

    pub fn series(&self) -> &MetricSeries {
        &self.series
    }

    /// Append a value to the pending buffer
    pub fn add(&mut self, v: impl Into<MetricValue>) -> Result<()> {
        match (&mut self.series, v.into()) {
            (MetricSeries::Int(s), MetricValue::Int(i)) => s.push(i),
            (MetricSeries::Float(s), MetricValue::Float(f)) => s.push(f),
            (MetricSeries::Str(s), MetricValue::Str(v)) => s.push(v),
            (series, value) => {
                return Err(SolidError::InvalidInput(format!(
                    "metric <{}> holds {} values, got {}",
                    self.name,
                    series.kind(),
                    value.kind()
                )))
            }
        }
        Ok(())
    }

    /// Move pending values into the committed sequence. A no-op when nothing
    /// is pending.
    pub fn commit(&mut self) {
        match &mut self.series {
            MetricSeries::Int(s) => s.commit(),
            MetricSeries::Float(s) => s.commit(),
            MetricSeries::Str(s) => s.commit(),
        }
    }

    /// Last committed value
    pub fn last_val(&self) -> Option<MetricValue> {
        match &self.series {
            MetricSeries::Int(s) => s.values.last().map(|v| MetricValue::Int(*v)),
            MetricSeries::Float(s) => s.values.last().map(|v| MetricValue::Float(*v)),
            MetricSeries::Str(s) => s.values.last().map(|v| MetricValue::Str(v.clone())),
        }
    }

    /// Committed values
    pub fn vals(&self) -> Vec<MetricValue> {
        match &self.series {
            MetricSeries::Int(s) => s.values.iter().copied().map(MetricValue::Int).collect(),
            MetricSeries::Float(s) => s.values.iter().copied().map(MetricValue::Float).collect(),
            MetricSeries::Str(s) => s.values.iter().cloned().map(MetricValue::Str).collect(),
        }
    }

    /// Values waiting to be persisted
    pub fn vals_to_commit(&self) -> Vec<MetricValue> {
        match &self.series {
            MetricSeries::Int(s) => s.pending.iter().copied().map(MetricValue::Int).collect(),
            MetricSeries::Float(s) => s.pending.iter().copied().map(MetricValue::Float).collect(),
            MetricSeries::Str(s) => s.pending.iter().cloned().map(MetricValue::Str).collect(),
        }
    }

    pub fn has_pending(&self) -> bool {
        match &self.series {
            MetricSeries::Int(s) => !s.pending.is_empty(),
            MetricSeries::Float(s) => !s.pending.is_empty(),
            MetricSeries::Str(s) => !s.pending.is_empty(),
        }
    }
}
