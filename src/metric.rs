//! Queryable views over the samples owned by base metrics.

use crate::aggregate::Aggregate;
use crate::collectors::BaseMetric;
use crate::errors::{MetricsError, Result};
use crate::object::ObjectId;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// A registered base metric. Name, object and sub-metric names are fixed at
/// registration so filters can be evaluated without taking the metric lock.
pub(crate) struct BaseMetricSlot {
    id: u64,
    name: String,
    object: ObjectId,
    sub_names: Vec<String>,
    unregistered: AtomicBool,
    inner: Mutex<Box<dyn BaseMetric>>,
}

impl BaseMetricSlot {
    pub(crate) fn new(id: u64, metric: Box<dyn BaseMetric>) -> Self {
        Self {
            id,
            name: metric.name().to_string(),
            object: metric.object().clone(),
            sub_names: metric.sub_metrics().iter().map(|s| s.name().to_string()).collect(),
            unregistered: AtomicBool::new(false),
            inner: Mutex::new(metric),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn object(&self) -> &ObjectId {
        &self.object
    }

    pub(crate) fn sub_names(&self) -> &[String] {
        &self.sub_names
    }

    pub(crate) fn is_unregistered(&self) -> bool {
        self.unregistered.load(Ordering::Acquire)
    }

    pub(crate) fn set_unregistered(&self) {
        self.unregistered.store(true, Ordering::Release);
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<dyn BaseMetric>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Caller-side reference to a registered base metric.
#[derive(Clone)]
pub struct BaseMetricHandle(pub(crate) Arc<BaseMetricSlot>);

impl BaseMetricHandle {
    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn object(&self) -> &ObjectId {
        self.0.object()
    }

    pub fn sub_metric_names(&self) -> &[String] {
        self.0.sub_names()
    }

    pub fn is_unregistered(&self) -> bool {
        self.0.is_unregistered()
    }
}

impl std::fmt::Debug for BaseMetricHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseMetricHandle")
            .field("name", &self.0.name)
            .field("object", &self.0.object)
            .finish()
    }
}

/// Description of one view, as returned by enumeration and setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricInfo {
    pub name: String,
    pub object: ObjectId,
    pub description: String,
    pub unit: String,
    pub min: u32,
    pub max: u32,
    pub scale: u32,
    pub period: u32,
    pub count: usize,
    pub aggregate: Option<Aggregate>,
}

/// Position of one view's values inside [`MetricsData::values`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesInfo {
    pub name: String,
    pub object: ObjectId,
    pub unit: String,
    pub scale: u32,
    pub sequence: u32,
    pub offset: usize,
    pub count: usize,
}

/// Flattened result of a data query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsData {
    pub series: Vec<SeriesInfo>,
    pub values: Vec<u32>,
}

impl MetricsData {
    /// The values belonging to `series`, oldest first.
    pub fn samples(&self, series: &SeriesInfo) -> &[u32] {
        self.values
            .get(series.offset..series.offset + series.count)
            .unwrap_or(&[])
    }

    pub fn find(&self, object: &ObjectId, name: &str) -> Option<&SeriesInfo> {
        self.series
            .iter()
            .find(|s| &s.object == object && s.name == name)
    }
}

/// A named projection of one sub-metric, optionally reduced by an
/// aggregate. Holds no samples of its own.
pub struct Metric {
    name: String,
    object: ObjectId,
    base: Weak<BaseMetricSlot>,
    base_id: u64,
    sub: usize,
    aggregate: Option<Aggregate>,
}

impl Metric {
    pub(crate) fn new(base: &Arc<BaseMetricSlot>, sub: usize, aggregate: Option<Aggregate>) -> Result<Self> {
        let sub_name = base.sub_names().get(sub).ok_or_else(|| {
            MetricsError::PreconditionViolation(format!(
                "{} has no sub-metric #{sub}",
                base.name()
            ))
        })?;
        let name = match aggregate {
            Some(agg) => format!("{sub_name}:{}", agg.name()),
            None => sub_name.clone(),
        };
        Ok(Self {
            name,
            object: base.object().clone(),
            base: Arc::downgrade(base),
            base_id: base.id(),
            sub,
            aggregate,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object(&self) -> &ObjectId {
        &self.object
    }

    pub fn aggregate(&self) -> Option<Aggregate> {
        self.aggregate
    }

    pub(crate) fn base_id(&self) -> u64 {
        self.base_id
    }

    /// The backing base metric, unless it is gone or flagged for removal.
    pub(crate) fn base(&self) -> Option<Arc<BaseMetricSlot>> {
        self.base.upgrade().filter(|b| !b.is_unregistered())
    }

    pub(crate) fn info(&self) -> Option<MetricInfo> {
        let slot = self.base()?;
        let base = slot.lock();
        let sub = base.sub_metrics().get(self.sub)?;
        Some(MetricInfo {
            name: self.name.clone(),
            object: self.object.clone(),
            description: sub.description().to_string(),
            unit: base.unit().to_string(),
            min: base.min_value(),
            max: base.max_value(),
            scale: base.scale(),
            period: base.state().period(),
            count: match self.aggregate {
                Some(_) => 1,
                None => base.state().length(),
            },
            aggregate: self.aggregate,
        })
    }

    /// Append this view's current values to `out`.
    ///
    /// An aggregate over an empty buffer yields no value rather than an
    /// error so fresh metrics can be queried.
    pub(crate) fn query_into(&self, out: &mut MetricsData) -> Result<bool> {
        let Some(slot) = self.base() else {
            return Ok(false);
        };
        let base = slot.lock();
        let sub = base.sub_metrics().get(self.sub).ok_or_else(|| {
            MetricsError::PreconditionViolation(format!("{} lost sub-metric #{}", self.name, self.sub))
        })?;

        let offset = out.values.len();
        out.values.resize(offset + sub.length(), 0);
        let copied = sub.copy_to(&mut out.values[offset..])?;
        let count = match self.aggregate {
            Some(agg) if copied > 0 => {
                let value = agg.compute(&out.values[offset..offset + copied])?;
                out.values.truncate(offset);
                out.values.push(value);
                1
            }
            Some(_) => {
                out.values.truncate(offset);
                0
            }
            None => {
                out.values.truncate(offset + copied);
                copied
            }
        };
        out.series.push(SeriesInfo {
            name: self.name.clone(),
            object: self.object.clone(),
            unit: base.unit().to_string(),
            scale: base.scale(),
            sequence: sub.sequence(),
            offset,
            count,
        });
        Ok(true)
    }
}
