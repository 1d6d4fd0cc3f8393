use super::*;
use crate::guest::groups;
use crate::ring::saturate;

/// Host physical memory in kB.
pub struct HostRamUsage {
    state: MetricState,
    subs: [SubMetric; 3],
}

impl HostRamUsage {
    pub fn new(host: ObjectId) -> Self {
        Self {
            state: MetricState::new(host, "RAM/Usage"),
            subs: [
                SubMetric::new("RAM/Usage/Total", "Total physical memory installed."),
                SubMetric::new("RAM/Usage/Used", "Physical memory currently occupied."),
                SubMetric::new("RAM/Usage/Free", "Physical memory currently available to applications."),
            ],
        }
    }
}

impl BaseMetric for HostRamUsage {
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
        hints.collect_host_ram();
    }

    fn collect(&mut self, ctx: &CollectContext<'_>) -> Result<()> {
        let usage = ctx.hal().host_memory_usage()?;
        self.subs[0].put(saturate(usage.total));
        self.subs[1].put(saturate(usage.used));
        self.subs[2].put(saturate(usage.available));
        Ok(())
    }
}

/// Hypervisor-wide memory, reported by whichever guest the manager elected
/// as VMM stats provider.
pub struct HostRamVmm {
    state: MetricState,
    subs: [SubMetric; 4],
    current: Option<[u32; 4]>,
}

impl HostRamVmm {
    pub fn new(host: ObjectId) -> Self {
        Self {
            state: MetricState::new(host, "RAM/VMM"),
            subs: [
                SubMetric::new("RAM/VMM/Used", "Total physical memory used by the hypervisor."),
                SubMetric::new("RAM/VMM/Free", "Total physical memory free inside the hypervisor."),
                SubMetric::new("RAM/VMM/Ballooned", "Total physical memory ballooned by the hypervisor."),
                SubMetric::new("RAM/VMM/Shared", "Total physical memory shared between VMs."),
            ],
            current: None,
        }
    }
}

impl BaseMetric for HostRamVmm {
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
        hints.collect_host_ram_vmm();
        hints.collect_guest_stats(groups::VMM_RAM);
    }

    fn collect(&mut self, ctx: &CollectContext<'_>) -> Result<()> {
        match ctx.guests().vmm_stats_provider() {
            Some(provider) => {
                // without a fresh push the previous values are repeated
                if let Some(stats) = provider.take_group(groups::VMM_RAM) {
                    self.current = Some([
                        stats.alloc_vmm,
                        stats.free_vmm,
                        stats.balloon_vmm,
                        stats.shared_vmm,
                    ]);
                }
            }
            None => self.current = None,
        }
        // nothing is recorded until the provider has pushed once
        let Some(current) = self.current else {
            return Ok(());
        };
        for (sub, value) in self.subs.iter_mut().zip(current) {
            sub.put(value);
        }
        Ok(())
    }

    fn enable(&mut self, guests: &GuestManager) -> Result<()> {
        self.state.set_enabled(true);
        match guests.vmm_stats_provider() {
            Some(provider) => provider.enable(groups::VMM_RAM),
            None => Ok(()),
        }
    }

    fn disable(&mut self, guests: &GuestManager) -> Result<()> {
        self.state.set_enabled(false);
        match guests.vmm_stats_provider() {
            Some(provider) => provider.disable(groups::VMM_RAM),
            None => Ok(()),
        }
    }
}

/// Resident memory of a workload's process in kB.
pub struct MachineRamUsage {
    state: MetricState,
    subs: [SubMetric; 1],
    pid: u32,
}

impl MachineRamUsage {
    pub fn new(machine: ObjectId, pid: u32) -> Self {
        Self {
            state: MetricState::new(machine, "RAM/Usage"),
            subs: [SubMetric::new("RAM/Usage/Used", "Size of resident portion of VM process in memory.")],
            pid,
        }
    }
}

impl BaseMetric for MachineRamUsage {
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
        hints.collect_process_ram(self.pid);
    }

    fn collect(&mut self, ctx: &CollectContext<'_>) -> Result<()> {
        let used = ctx.hal().process_memory_usage(self.pid)?;
        self.subs[0].put(saturate(used));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing::{samples, CannedHal};
    use crate::guest::{GuestControl, GuestStats};
    use crate::hal::MemoryUsage;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Quiet;

    #[async_trait]
    impl GuestControl for Quiet {
        async fn set_statistics_interval(&self, _seconds: u32) -> Result<()> {
            Ok(())
        }
        async fn enable_vmm_stats(&self, _enabled: bool) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_host_ram_saturates_wide_values() {
        let hal = CannedHal::default();
        hal.set(|v| {
            v.memory = Some(MemoryUsage {
                total: u64::from(u32::MAX) + 10,
                used: 1024,
                available: 2048,
            })
        });
        let guests = GuestManager::start();
        let mut m = HostRamUsage::new(ObjectId::host("h"));
        m.init(&hal, 1, 2);
        m.collect(&CollectContext::new(&hal, &guests)).unwrap();
        assert_eq!(samples(&m, 0), vec![u32::MAX]);
        assert_eq!(samples(&m, 1), vec![1024]);
        assert_eq!(samples(&m, 2), vec![2048]);
    }

    #[tokio::test]
    async fn test_vmm_ram_repeats_last_provider_values() {
        let hal = CannedHal::default();
        let guests = GuestManager::start();
        let mut m = HostRamVmm::new(ObjectId::host("h"));
        m.init(&hal, 1, 4);

        // no provider yet
        m.collect(&CollectContext::new(&hal, &guests)).unwrap();
        assert!(samples(&m, 0).is_empty());

        let provider = guests.register_guest("vm1", Arc::new(Quiet));
        // provider known but silent
        m.collect(&CollectContext::new(&hal, &guests)).unwrap();
        assert!(samples(&m, 0).is_empty());

        provider.update_stats(&GuestStats {
            valid: groups::VMM_RAM,
            alloc_vmm: 500,
            free_vmm: 100,
            ..Default::default()
        });
        m.collect(&CollectContext::new(&hal, &guests)).unwrap();
        m.collect(&CollectContext::new(&hal, &guests)).unwrap();
        assert_eq!(samples(&m, 0), vec![500, 500]);
        assert_eq!(samples(&m, 1), vec![100, 100]);
        assert!(!provider.is_valid(groups::VMM_RAM));

        guests.unregister_guest(&provider);
        m.collect(&CollectContext::new(&hal, &guests)).unwrap();
        assert_eq!(samples(&m, 0), vec![500, 500]);
    }

    #[tokio::test]
    async fn test_machine_ram() {
        let hal = CannedHal::default();
        hal.set(|v| {
            v.process_ram.insert(5, 4096);
        });
        let guests = GuestManager::start();
        let mut m = MachineRamUsage::new(ObjectId::machine("vm"), 5);
        m.init(&hal, 1, 2);
        m.collect(&CollectContext::new(&hal, &guests)).unwrap();
        assert_eq!(samples(&m, 0), vec![4096]);
    }
}
