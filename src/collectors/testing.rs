//! Canned host values for metric unit tests.

use crate::errors::{MetricsError, Result};
use crate::hal::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct Values {
    pub raw_cpu: Option<RawCpuLoad>,
    pub cpu_load: Option<CpuLoad>,
    pub cpu_mhz: Option<u32>,
    pub memory: Option<MemoryUsage>,
    pub raw_process: HashMap<u32, RawProcessCpu>,
    pub process_ram: HashMap<u32, u64>,
    pub net: HashMap<String, RawNetLoad>,
    pub disk_load: HashMap<String, RawDiskLoad>,
    pub disk_size: HashMap<String, u64>,
    pub filesystems: HashMap<String, FsUsage>,
    pub files: HashMap<std::path::PathBuf, u64>,
}

#[derive(Default)]
pub struct CannedHal {
    pub values: Mutex<Values>,
}

impl CannedHal {
    pub fn set(&self, f: impl FnOnce(&mut Values)) {
        f(&mut self.values.lock().unwrap());
    }
}

fn missing(what: &str) -> MetricsError {
    MetricsError::NotFound { what: what.into() }
}

#[async_trait]
impl HostHal for CannedHal {
    fn host_cpu_load(&self) -> Result<CpuLoad> {
        self.values
            .lock()
            .unwrap()
            .cpu_load
            .ok_or(MetricsError::NotImplemented("host cpu load"))
    }

    fn host_cpu_mhz(&self) -> Result<u32> {
        self.values.lock().unwrap().cpu_mhz.ok_or_else(|| missing("mhz"))
    }

    fn host_memory_usage(&self) -> Result<MemoryUsage> {
        self.values.lock().unwrap().memory.ok_or_else(|| missing("ram"))
    }

    fn host_filesystem_usage(&self, mount: &str) -> Result<FsUsage> {
        self.values.lock().unwrap().filesystems.get(mount).copied().ok_or_else(|| missing(mount))
    }

    fn host_disk_size(&self, disk: &str) -> Result<u64> {
        self.values.lock().unwrap().disk_size.get(disk).copied().ok_or_else(|| missing(disk))
    }

    fn file_size(&self, path: &std::path::Path) -> Result<u64> {
        self.values.lock().unwrap().files.get(path).copied().ok_or_else(|| missing("file"))
    }

    fn process_memory_usage(&self, pid: u32) -> Result<u64> {
        self.values.lock().unwrap().process_ram.get(&pid).copied().ok_or_else(|| missing("pid"))
    }

    fn raw_host_cpu_load(&self) -> Result<RawCpuLoad> {
        self.values
            .lock()
            .unwrap()
            .raw_cpu
            .ok_or(MetricsError::NotImplemented("raw host cpu load"))
    }

    fn raw_host_network_load(&self, interface: &str) -> Result<RawNetLoad> {
        self.values.lock().unwrap().net.get(interface).copied().ok_or_else(|| missing(interface))
    }

    fn raw_host_disk_load(&self, disk: &str) -> Result<RawDiskLoad> {
        self.values.lock().unwrap().disk_load.get(disk).copied().ok_or_else(|| missing(disk))
    }

    fn raw_process_cpu_load(&self, pid: u32) -> Result<RawProcessCpu> {
        self.values.lock().unwrap().raw_process.get(&pid).copied().ok_or_else(|| missing("pid"))
    }
}

/// Every populated sample of sub-metric `idx`, oldest first.
pub fn samples(metric: &dyn crate::collectors::BaseMetric, idx: usize) -> Vec<u32> {
    let sub = &metric.sub_metrics()[idx];
    let mut out = vec![0; sub.capacity()];
    let n = sub.copy_to(&mut out).unwrap();
    out.truncate(n);
    out
}

/// Base metric with arbitrary names that records a constant on every collect.
pub struct NamedMetric {
    state: crate::collectors::MetricState,
    subs: Vec<crate::ring::SubMetric>,
}

impl NamedMetric {
    pub fn new(object: crate::object::ObjectId, base: &str, subs: &[&str]) -> Self {
        Self {
            state: crate::collectors::MetricState::new(object, base),
            subs: subs.iter().map(|n| crate::ring::SubMetric::new(*n, "test")).collect(),
        }
    }
}

impl crate::collectors::BaseMetric for NamedMetric {
    fn state(&self) -> &crate::collectors::MetricState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut crate::collectors::MetricState {
        &mut self.state
    }

    fn unit(&self) -> &'static str {
        ""
    }

    fn max_value(&self) -> u32 {
        crate::collectors::COUNTER_MAX
    }

    fn sub_metrics(&self) -> &[crate::ring::SubMetric] {
        &self.subs
    }

    fn sub_metrics_mut(&mut self) -> &mut [crate::ring::SubMetric] {
        &mut self.subs
    }

    fn pre_collect(&mut self, _hints: &mut CollectorHints, _tick: u64) {}

    fn collect(&mut self, _ctx: &crate::collectors::CollectContext<'_>) -> Result<()> {
        for sub in &mut self.subs {
            sub.put(7);
        }
        Ok(())
    }
}
