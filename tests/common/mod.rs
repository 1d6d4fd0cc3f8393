#![allow(dead_code)]

use async_trait::async_trait;
use perf_collector::collectors::{BaseMetric, CollectContext, MetricState, COUNTER_MAX};
use perf_collector::errors::{MetricsError, Result};
use perf_collector::guest::GuestControl;
use perf_collector::hal::{CollectorHints, HostHal, MemoryUsage, RawCpuLoad};
use perf_collector::ring::SubMetric;
use perf_collector::ObjectId;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Host whose CPU counters advance by a fixed step on every bulk read.
pub struct MockHal {
    state: Mutex<MockState>,
    pub pre_collects: AtomicUsize,
}

struct MockState {
    cpu: RawCpuLoad,
    step: RawCpuLoad,
    memory: MemoryUsage,
}

impl MockHal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                cpu: RawCpuLoad { user: 5_000, kernel: 2_000, idle: 50_000 },
                step: RawCpuLoad { user: 200, kernel: 100, idle: 700 },
                memory: MemoryUsage { total: 8_000_000, used: 3_000_000, available: 5_000_000 },
            }),
            pre_collects: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HostHal for MockHal {
    async fn pre_collect(&self, hints: &CollectorHints, _tick: u64) -> Result<()> {
        self.pre_collects.fetch_add(1, Ordering::SeqCst);
        if hints.wants_host_cpu_load() {
            let mut s = self.state.lock().unwrap();
            let step = s.step;
            s.cpu.user += step.user;
            s.cpu.kernel += step.kernel;
            s.cpu.idle += step.idle;
        }
        Ok(())
    }

    fn raw_host_cpu_load(&self) -> Result<RawCpuLoad> {
        Ok(self.state.lock().unwrap().cpu)
    }

    fn host_memory_usage(&self) -> Result<MemoryUsage> {
        Ok(self.state.lock().unwrap().memory)
    }

    fn host_cpu_mhz(&self) -> Result<u32> {
        Err(MetricsError::NotFound { what: "cpufreq".into() })
    }
}

/// Guest link that accepts every request.
#[derive(Default)]
pub struct MockGuest {
    pub intervals: Mutex<Vec<u32>>,
}

#[async_trait]
impl GuestControl for MockGuest {
    async fn set_statistics_interval(&self, seconds: u32) -> Result<()> {
        self.intervals.lock().unwrap().push(seconds);
        Ok(())
    }

    async fn enable_vmm_stats(&self, _enabled: bool) -> Result<()> {
        Ok(())
    }
}

/// Base metric replaying scripted values and counting its collect calls.
pub struct ScriptedMetric {
    state: MetricState,
    subs: [SubMetric; 1],
    script: VecDeque<u32>,
    pub collects: Arc<AtomicUsize>,
}

impl ScriptedMetric {
    pub fn new(object: ObjectId, sub_name: &str, script: &[u32]) -> Self {
        let base = sub_name.rsplit_once('/').map_or(sub_name, |(b, _)| b);
        Self {
            state: MetricState::new(object, base),
            subs: [SubMetric::new(sub_name, "Scripted test values.")],
            script: script.iter().copied().collect(),
            collects: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl BaseMetric for ScriptedMetric {
    fn state(&self) -> &MetricState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MetricState {
        &mut self.state
    }

    fn unit(&self) -> &'static str {
        "%"
    }

    fn max_value(&self) -> u32 {
        COUNTER_MAX
    }

    fn sub_metrics(&self) -> &[SubMetric] {
        &self.subs
    }

    fn sub_metrics_mut(&mut self) -> &mut [SubMetric] {
        &mut self.subs
    }

    fn pre_collect(&mut self, _hints: &mut CollectorHints, _tick: u64) {}

    fn collect(&mut self, _ctx: &CollectContext<'_>) -> Result<()> {
        self.collects.fetch_add(1, Ordering::SeqCst);
        if let Some(v) = self.script.pop_front() {
            self.subs[0].put(v);
        }
        Ok(())
    }
}

/// Let the guest worker drain its queue.
pub async fn settle(mut done: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
