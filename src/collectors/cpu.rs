use super::*;
use crate::hal::{RawCpuLoad, RawProcessCpu};

/// Host CPU split into user, kernel and idle time.
pub struct HostCpuLoad {
    state: MetricState,
    subs: [SubMetric; 3],
    prev: Option<RawCpuLoad>,
}

impl HostCpuLoad {
    pub fn new(host: ObjectId) -> Self {
        Self {
            state: MetricState::new(host, "CPU/Load"),
            subs: [
                SubMetric::new("CPU/Load/User", "Percentage of processor time spent in user mode."),
                SubMetric::new("CPU/Load/Kernel", "Percentage of processor time spent in kernel mode."),
                SubMetric::new("CPU/Load/Idle", "Percentage of processor time spent idling."),
            ],
            prev: None,
        }
    }

    fn put(&mut self, user: u32, kernel: u32, idle: u32) {
        self.subs[0].put(user);
        self.subs[1].put(kernel);
        self.subs[2].put(idle);
    }
}

impl BaseMetric for HostCpuLoad {
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
        self.prev = hal.raw_host_cpu_load().ok();
    }

    fn pre_collect(&mut self, hints: &mut CollectorHints, _tick: u64) {
        hints.collect_host_cpu_load();
    }

    fn collect(&mut self, ctx: &CollectContext<'_>) -> Result<()> {
        let raw = match ctx.hal().raw_host_cpu_load() {
            Ok(raw) => raw,
            Err(e) if e.is_unsupported() => {
                // backend reports ready-made percentages instead
                let load = ctx.hal().host_cpu_load()?;
                self.put(load.user, load.kernel, load.idle);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if let Some(prev) = self.prev {
            let user = raw.user.saturating_sub(prev.user);
            let kernel = raw.kernel.saturating_sub(prev.kernel);
            let idle = raw.idle.saturating_sub(prev.idle);
            let total = user + kernel + idle;
            if total == 0 {
                // no counter moved since the last sample
                self.put(0, 0, 0);
            } else {
                self.put(
                    load_fraction(CPU_LOAD_MULTIPLIER, user, total),
                    load_fraction(CPU_LOAD_MULTIPLIER, kernel, total),
                    load_fraction(CPU_LOAD_MULTIPLIER, idle, total),
                );
            }
        }
        self.prev = Some(raw);
        Ok(())
    }
}

/// Average current frequency of the host processors.
pub struct HostCpuMhz {
    state: MetricState,
    subs: [SubMetric; 1],
}

impl HostCpuMhz {
    pub fn new(host: ObjectId) -> Self {
        Self {
            state: MetricState::new(host, "CPU/MHz"),
            subs: [SubMetric::new(
                "CPU/MHz",
                "Average of current frequency of all processors.",
            )],
        }
    }
}

impl BaseMetric for HostCpuMhz {
    fn state(&self) -> &MetricState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MetricState {
        &mut self.state
    }

    fn unit(&self) -> &'static str {
        "MHz"
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
        hints.collect_host_cpu_mhz();
    }

    fn collect(&mut self, ctx: &CollectContext<'_>) -> Result<()> {
        let mhz = ctx.hal().host_cpu_mhz()?;
        self.subs[0].put(mhz);
        Ok(())
    }
}

/// CPU time of a workload's process relative to all host CPU time.
pub struct MachineCpuLoad {
    state: MetricState,
    subs: [SubMetric; 2],
    pid: u32,
    prev: Option<RawProcessCpu>,
}

impl MachineCpuLoad {
    pub fn new(machine: ObjectId, pid: u32) -> Self {
        Self {
            state: MetricState::new(machine, "CPU/Load"),
            subs: [
                SubMetric::new(
                    "CPU/Load/User",
                    "Percentage of processor time spent in user mode by the VM process.",
                ),
                SubMetric::new(
                    "CPU/Load/Kernel",
                    "Percentage of processor time spent in kernel mode by the VM process.",
                ),
            ],
            pid,
            prev: None,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl BaseMetric for MachineCpuLoad {
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
        self.prev = hal.raw_process_cpu_load(self.pid).ok();
    }

    fn pre_collect(&mut self, hints: &mut CollectorHints, _tick: u64) {
        hints.collect_process_cpu(self.pid);
    }

    fn collect(&mut self, ctx: &CollectContext<'_>) -> Result<()> {
        let raw = match ctx.hal().raw_process_cpu_load(self.pid) {
            Ok(raw) => raw,
            Err(e) if e.is_unsupported() => {
                let load = ctx.hal().process_cpu_load(self.pid)?;
                self.subs[0].put(load.user);
                self.subs[1].put(load.kernel);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if let Some(prev) = self.prev {
            let host = raw.host_total.saturating_sub(prev.host_total);
            let user = raw.user.saturating_sub(prev.user);
            let kernel = raw.kernel.saturating_sub(prev.kernel);
            self.subs[0].put(load_fraction(CPU_LOAD_MULTIPLIER, user, host));
            self.subs[1].put(load_fraction(CPU_LOAD_MULTIPLIER, kernel, host));
        }
        self.prev = Some(raw);
        Ok(())
    }
}
