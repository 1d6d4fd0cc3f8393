use super::*;
use crate::errors::MetricsError;
use crate::guest::{groups, GuestChannel};
use std::sync::{Arc, Weak};

pub(crate) fn upgrade(channel: &Weak<GuestChannel>, state: &MetricState) -> Result<Arc<GuestChannel>> {
    channel.upgrade().ok_or_else(|| MetricsError::NotFound {
        what: format!("guest channel for {} of {}", state.name(), state.object()),
    })
}

/// CPU split as seen from inside the guest.
pub struct GuestCpuLoad {
    state: MetricState,
    subs: [SubMetric; 3],
    channel: Weak<GuestChannel>,
}

impl GuestCpuLoad {
    pub fn new(machine: ObjectId, channel: &Arc<GuestChannel>) -> Self {
        Self {
            state: MetricState::new(machine, "Guest/CPU/Load"),
            subs: [
                SubMetric::new(
                    "Guest/CPU/Load/User",
                    "Percentage of processor time spent in user mode as seen by the guest.",
                ),
                SubMetric::new(
                    "Guest/CPU/Load/Kernel",
                    "Percentage of processor time spent in kernel mode as seen by the guest.",
                ),
                SubMetric::new(
                    "Guest/CPU/Load/Idle",
                    "Percentage of processor time spent idling as seen by the guest.",
                ),
            ],
            channel: Arc::downgrade(channel),
        }
    }
}

impl BaseMetric for GuestCpuLoad {
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

    fn pre_collect(&mut self, hints: &mut CollectorHints, _tick: u64) {
        hints.collect_guest_stats(groups::CPU_LOAD);
    }

    fn collect(&mut self, _ctx: &CollectContext<'_>) -> Result<()> {
        let channel = upgrade(&self.channel, &self.state)?;
        // guest reports whole percents
        if let Some(stats) = channel.take_group(groups::CPU_LOAD) {
            let scale = |pct: u32| load_fraction(CPU_LOAD_MULTIPLIER, u64::from(pct), 100);
            self.subs[0].put(scale(stats.cpu_user));
            self.subs[1].put(scale(stats.cpu_kernel));
            self.subs[2].put(scale(stats.cpu_idle));
        }
        Ok(())
    }

    fn enable(&mut self, _guests: &GuestManager) -> Result<()> {
        upgrade(&self.channel, &self.state)?.enable(groups::CPU_LOAD)?;
        self.state.set_enabled(true);
        Ok(())
    }

    fn disable(&mut self, _guests: &GuestManager) -> Result<()> {
        upgrade(&self.channel, &self.state)?.disable(groups::CPU_LOAD)?;
        self.state.set_enabled(false);
        Ok(())
    }
}

/// Memory as seen from inside the guest, in kB.
pub struct GuestRamUsage {
    state: MetricState,
    subs: [SubMetric; 6],
    channel: Weak<GuestChannel>,
}

impl GuestRamUsage {
    pub fn new(machine: ObjectId, channel: &Arc<GuestChannel>) -> Self {
        Self {
            state: MetricState::new(machine, "Guest/RAM/Usage"),
            subs: [
                SubMetric::new("Guest/RAM/Usage/Total", "Total amount of physical guest RAM."),
                SubMetric::new("Guest/RAM/Usage/Free", "Free amount of physical guest RAM."),
                SubMetric::new("Guest/RAM/Usage/Balloon", "Amount of ballooned physical guest RAM."),
                SubMetric::new("Guest/RAM/Usage/Shared", "Amount of shared physical guest RAM."),
                SubMetric::new("Guest/RAM/Usage/Cache", "Total amount of guest (disk) cache memory."),
                SubMetric::new("Guest/Pagefile/Usage/Total", "Total amount of space in the page file."),
            ],
            channel: Arc::downgrade(channel),
        }
    }
}

impl BaseMetric for GuestRamUsage {
    fn state(&self) -> &MetricState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MetricState {
        &mut self.state
    }

    fn unit(&self) -> &'static str {
        "kB"
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
        hints.collect_guest_stats(groups::RAM_USAGE);
    }

    fn collect(&mut self, _ctx: &CollectContext<'_>) -> Result<()> {
        let channel = upgrade(&self.channel, &self.state)?;
        if let Some(s) = channel.take_group(groups::RAM_USAGE) {
            let values = [
                s.mem_total,
                s.mem_free,
                s.mem_balloon,
                s.mem_shared,
                s.mem_cache,
                s.page_total,
            ];
            for (sub, value) in self.subs.iter_mut().zip(values) {
                sub.put(value);
            }
        }
        Ok(())
    }

    fn enable(&mut self, _guests: &GuestManager) -> Result<()> {
        upgrade(&self.channel, &self.state)?.enable(groups::RAM_USAGE)?;
        self.state.set_enabled(true);
        Ok(())
    }

    fn disable(&mut self, _guests: &GuestManager) -> Result<()> {
        upgrade(&self.channel, &self.state)?.disable(groups::RAM_USAGE)?;
        self.state.set_enabled(false);
        Ok(())
    }
}
