use super::*;
use crate::hal::RawDiskLoad;
use crate::ring::saturate;
use std::path::PathBuf;

/// Share of wall-clock time a host disk spent busy.
pub struct HostDiskLoad {
    state: MetricState,
    subs: [SubMetric; 1],
    disk: String,
    prev: Option<RawDiskLoad>,
}

impl HostDiskLoad {
    pub fn new(host: ObjectId, disk: &str) -> Self {
        Self {
            state: MetricState::new(host, format!("Disk/{disk}/Load")),
            subs: [SubMetric::new(
                format!("Disk/{disk}/Load/Util"),
                "Percentage of time disk was busy serving I/O requests.",
            )],
            disk: disk.to_string(),
            prev: None,
        }
    }
}

impl BaseMetric for HostDiskLoad {
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
        CPU_LOAD_MULTIPLIER as u32
    }

    fn scale(&self) -> u32 {
        (CPU_LOAD_MULTIPLIER / 100) as u32
    }

    fn sub_metrics(&self) -> &[SubMetric] {
        &self.subs
    }

    fn sub_metrics_mut(&mut self) -> &mut [SubMetric] {
        &mut self.subs
    }

    fn init(&mut self, hal: &dyn HostHal, period_secs: u32, length: usize) {
        provision(&mut self.state, &mut self.subs, period_secs, length);
        self.prev = hal.raw_host_disk_load(&self.disk).ok();
    }

    fn pre_collect(&mut self, hints: &mut CollectorHints, _tick: u64) {
        hints.collect_disk(&self.disk);
    }

    fn collect(&mut self, ctx: &CollectContext<'_>) -> Result<()> {
        let raw = ctx.hal().raw_host_disk_load(&self.disk)?;
        if let Some(prev) = self.prev {
            let busy = raw.busy_ms.saturating_sub(prev.busy_ms);
            let total = raw.total_ms.saturating_sub(prev.total_ms);
            // busy time can exceed elapsed time on multi-queue devices
            let util = load_fraction(CPU_LOAD_MULTIPLIER, busy, total).min(CPU_LOAD_MULTIPLIER as u32);
            self.subs[0].put(util);
        }
        self.prev = Some(raw);
        Ok(())
    }
}

/// Space on one mounted host filesystem, in MB.
pub struct HostFilesystemUsage {
    state: MetricState,
    subs: [SubMetric; 3],
    mount: String,
}

impl HostFilesystemUsage {
    pub fn new(host: ObjectId, mount: &str) -> Self {
        Self {
            state: MetricState::new(host, format!("FS/{mount}/Usage")),
            subs: [
                SubMetric::new(format!("FS/{mount}/Usage/Total"), "Total space available in the filesystem."),
                SubMetric::new(format!("FS/{mount}/Usage/Used"), "Space used in the filesystem."),
                SubMetric::new(format!("FS/{mount}/Usage/Free"), "Space available in the filesystem."),
            ],
            mount: mount.to_string(),
        }
    }
}

impl BaseMetric for HostFilesystemUsage {
    fn state(&self) -> &MetricState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MetricState {
        &mut self.state
    }

    fn unit(&self) -> &'static str {
        "MB"
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

    fn pre_collect(&mut self, hints: &mut CollectorHints, _tick: u64) {
        hints.collect_filesystem(&self.mount);
    }

    fn collect(&mut self, ctx: &CollectContext<'_>) -> Result<()> {
        let usage = ctx.hal().host_filesystem_usage(&self.mount)?;
        self.subs[0].put(saturate(usage.total));
        self.subs[1].put(saturate(usage.used));
        self.subs[2].put(saturate(usage.available));
        Ok(())
    }
}

/// Capacity of a host disk, in MB.
pub struct HostDiskUsage {
    state: MetricState,
    subs: [SubMetric; 1],
    disk: String,
}

impl HostDiskUsage {
    pub fn new(host: ObjectId, disk: &str) -> Self {
        Self {
            state: MetricState::new(host, format!("Disk/{disk}/Usage")),
            subs: [SubMetric::new(format!("Disk/{disk}/Usage/Total"), "Total disk size.")],
            disk: disk.to_string(),
        }
    }
}

impl BaseMetric for HostDiskUsage {
    fn state(&self) -> &MetricState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MetricState {
        &mut self.state
    }

    fn unit(&self) -> &'static str {
        "MB"
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

    fn pre_collect(&mut self, hints: &mut CollectorHints, _tick: u64) {
        hints.collect_disk(&self.disk);
    }

    fn collect(&mut self, ctx: &CollectContext<'_>) -> Result<()> {
        let size = ctx.hal().host_disk_size(&self.disk)?;
        self.subs[0].put(saturate(size));
        Ok(())
    }
}

/// Combined size of a workload's disk images, in MB.
pub struct MachineDiskUsage {
    state: MetricState,
    subs: [SubMetric; 1],
    images: Vec<PathBuf>,
}

impl MachineDiskUsage {
    pub fn new(machine: ObjectId, images: Vec<PathBuf>) -> Self {
        Self {
            state: MetricState::new(machine, "Disk/Usage"),
            subs: [SubMetric::new("Disk/Usage/Used", "Actual size of all VM disks combined.")],
            images,
        }
    }
}

impl BaseMetric for MachineDiskUsage {
    fn state(&self) -> &MetricState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MetricState {
        &mut self.state
    }

    fn unit(&self) -> &'static str {
        "MB"
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

    fn pre_collect(&mut self, hints: &mut CollectorHints, _tick: u64) {
        for image in &self.images {
            hints.collect_file_size(image);
        }
    }

    fn collect(&mut self, ctx: &CollectContext<'_>) -> Result<()> {
        let mut bytes = 0u64;
        for image in &self.images {
            bytes = bytes.saturating_add(ctx.hal().file_size(image)?);
        }
        self.subs[0].put(saturate(bytes / (1024 * 1024)));
        Ok(())
    }
}
