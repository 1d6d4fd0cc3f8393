pub mod cpu;
pub mod disk;
pub mod guest;
pub mod memory;
pub mod network;

use crate::errors::Result;
use crate::guest::GuestManager;
use crate::hal::{CollectorHints, HostHal};
use crate::object::ObjectId;
use crate::ring::SubMetric;
use std::marker::PhantomData;
use tracing::trace;

#[cfg(test)]
pub(crate) mod testing;

/// Fixed-point multiplier for CPU and disk load: 100% == 100_000.
pub const CPU_LOAD_MULTIPLIER: u64 = 100_000;
/// Fixed-point multiplier for network load: 100% == 100_000.
pub const NETWORK_LOAD_MULTIPLIER: u64 = 100_000;
/// Upper bound reported for plain counters.
pub const COUNTER_MAX: u32 = i32::MAX as u32;

/// Low resolution timers can fire a little early.
const SAMPLER_PRECISION_MS: u64 = 50;

/// Access to collection sources during the collect phase.
///
/// Only the engine can build one, and only while it holds its exclusive
/// lock, so anything taking a `CollectContext` runs in that phase.
pub struct CollectContext<'a> {
    hal: &'a dyn HostHal,
    guests: &'a GuestManager,
    _exclusive: PhantomData<&'a mut ()>,
}

impl<'a> CollectContext<'a> {
    pub(crate) fn new(hal: &'a dyn HostHal, guests: &'a GuestManager) -> Self {
        Self {
            hal,
            guests,
            _exclusive: PhantomData,
        }
    }

    pub fn hal(&self) -> &'a dyn HostHal {
        self.hal
    }

    pub fn guests(&self) -> &'a GuestManager {
        self.guests
    }
}

/// Scheduling state shared by every base metric.
#[derive(Debug, Clone)]
pub struct MetricState {
    object: ObjectId,
    name: String,
    period_secs: u32,
    length: usize,
    enabled: bool,
    last_sample_ms: Option<u64>,
}

impl MetricState {
    pub fn new(object: ObjectId, name: impl Into<String>) -> Self {
        Self {
            object,
            name: name.into(),
            period_secs: 0,
            length: 0,
            enabled: false,
            last_sample_ms: None,
        }
    }

    pub fn object(&self) -> &ObjectId {
        &self.object
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> u32 {
        self.period_secs
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn configure(&mut self, period_secs: u32, length: usize) {
        self.period_secs = period_secs;
        self.length = length;
        self.last_sample_ms = None;
    }

    /// Decide whether the metric is due at `now_ms`.
    ///
    /// The mark advances by whole periods so the beat does not drift; a
    /// metric two or more periods behind resyncs to `now_ms`.
    pub fn collector_beat(&mut self, now_ms: u64) -> bool {
        if !self.enabled || self.period_secs == 0 {
            return false;
        }
        let period_ms = u64::from(self.period_secs) * 1000;
        let Some(last) = self.last_sample_ms else {
            self.last_sample_ms = Some(now_ms);
            return true;
        };
        let elapsed = now_ms.saturating_sub(last);
        if elapsed + SAMPLER_PRECISION_MS < period_ms {
            return false;
        }
        self.last_sample_ms = Some(if elapsed >= 2 * period_ms {
            now_ms
        } else {
            last + period_ms
        });
        trace!(metric = %self.name, object = %self.object, now_ms, "beat");
        true
    }
}

/// One measured quantity for one target object.
///
/// Implementations own their sub-metrics. `pre_collect` only declares what
/// the tick needs; `collect` reads the prepared values and appends samples.
pub trait BaseMetric: Send {
    fn state(&self) -> &MetricState;
    fn state_mut(&mut self) -> &mut MetricState;

    fn unit(&self) -> &'static str;
    fn min_value(&self) -> u32 {
        0
    }
    fn max_value(&self) -> u32;
    fn scale(&self) -> u32 {
        1
    }

    fn sub_metrics(&self) -> &[SubMetric];
    fn sub_metrics_mut(&mut self) -> &mut [SubMetric];

    /// Re-provision the sample buffers. Counter based metrics also reset
    /// their baseline here.
    fn init(&mut self, _hal: &dyn HostHal, period_secs: u32, length: usize) {
        self.state_mut().configure(period_secs, length);
        for sub in self.sub_metrics_mut() {
            sub.init(length);
        }
    }

    fn pre_collect(&mut self, hints: &mut CollectorHints, tick: u64);

    fn collect(&mut self, ctx: &CollectContext<'_>) -> Result<()>;

    fn enable(&mut self, _guests: &GuestManager) -> Result<()> {
        self.state_mut().set_enabled(true);
        Ok(())
    }

    fn disable(&mut self, _guests: &GuestManager) -> Result<()> {
        self.state_mut().set_enabled(false);
        Ok(())
    }

    fn name(&self) -> &str {
        self.state().name()
    }

    fn object(&self) -> &ObjectId {
        self.state().object()
    }

    fn is_enabled(&self) -> bool {
        self.state().is_enabled()
    }

    fn collector_beat(&mut self, now_ms: u64) -> bool {
        self.state_mut().collector_beat(now_ms)
    }
}

/// Apply a new period and length to a metric's state and buffers.
pub(crate) fn provision(
    state: &mut MetricState,
    subs: &mut [SubMetric],
    period_secs: u32,
    length: usize,
) {
    state.configure(period_secs, length);
    for sub in subs {
        sub.init(length);
    }
}

/// `numerator / denominator` in the load scale, saturated into a sample.
pub(crate) fn load_fraction(multiplier: u64, numerator: u64, denominator: u64) -> u32 {
    if denominator == 0 {
        return 0;
    }
    let scaled = u128::from(multiplier) * u128::from(numerator) / u128::from(denominator);
    crate::ring::saturate(u64::try_from(scaled).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_state(period: u32) -> MetricState {
        let mut s = MetricState::new(ObjectId::host("h"), "CPU/Load");
        s.configure(period, 5);
        s.enabled = true;
        s
    }

    #[test]
    fn test_first_beat_fires() {
        let mut s = enabled_state(1);
        assert!(s.collector_beat(12_345));
    }

    #[test]
    fn test_beat_waits_for_period() {
        let mut s = enabled_state(2);
        assert!(s.collector_beat(0));
        assert!(!s.collector_beat(1_000));
        assert!(s.collector_beat(2_000));
        assert!(!s.collector_beat(2_010));
    }

    #[test]
    fn test_beat_tolerates_early_timer() {
        let mut s = enabled_state(1);
        assert!(s.collector_beat(0));
        assert!(s.collector_beat(990));
        // mark moved to 1000, not 990
        assert!(s.collector_beat(1_960));
    }

    #[test]
    fn test_beat_resyncs_after_stall() {
        let mut s = enabled_state(1);
        assert!(s.collector_beat(0));
        assert!(s.collector_beat(10_000));
        assert!(!s.collector_beat(10_500));
        assert!(s.collector_beat(11_000));
    }

    #[test]
    fn test_disabled_never_beats() {
        let mut s = enabled_state(1);
        s.enabled = false;
        assert!(!s.collector_beat(0));
        let mut s = enabled_state(0);
        assert!(!s.collector_beat(0));
    }

    #[test]
    fn test_load_fraction() {
        assert_eq!(load_fraction(CPU_LOAD_MULTIPLIER, 1, 4), 25_000);
        assert_eq!(load_fraction(CPU_LOAD_MULTIPLIER, 1, 0), 0);
        assert_eq!(load_fraction(CPU_LOAD_MULTIPLIER, u64::MAX, 1), u32::MAX);
    }
}
