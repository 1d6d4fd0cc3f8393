use super::*;
use crate::guest::{groups, GuestChannel};
use crate::hal::RawNetLoad;
use std::sync::{Arc, Weak};

/// Share of a host interface's bandwidth used per direction.
pub struct HostNetworkLoad {
    state: MetricState,
    subs: [SubMetric; 2],
    interface: String,
    /// link speed in bytes per second
    speed: u64,
    prev: Option<RawNetLoad>,
}

impl HostNetworkLoad {
    pub fn new(host: ObjectId, interface: &str, speed_mbits: u64) -> Self {
        Self {
            state: MetricState::new(host, format!("Net/{interface}/Load")),
            subs: [
                SubMetric::new(
                    format!("Net/{interface}/Load/Rx"),
                    "Percentage of network interface receive bandwidth used.",
                ),
                SubMetric::new(
                    format!("Net/{interface}/Load/Tx"),
                    "Percentage of network interface transmit bandwidth used.",
                ),
            ],
            interface: interface.to_string(),
            speed: speed_mbits * 1_000_000 / 8,
            prev: None,
        }
    }
}

impl BaseMetric for HostNetworkLoad {
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
        NETWORK_LOAD_MULTIPLIER as u32
    }

    fn scale(&self) -> u32 {
        (NETWORK_LOAD_MULTIPLIER / 100) as u32
    }

    fn sub_metrics(&self) -> &[SubMetric] {
        &self.subs
    }

    fn sub_metrics_mut(&mut self) -> &mut [SubMetric] {
        &mut self.subs
    }

    fn init(&mut self, hal: &dyn HostHal, period_secs: u32, length: usize) {
        provision(&mut self.state, &mut self.subs, period_secs, length);
        self.prev = hal.raw_host_network_load(&self.interface).ok();
    }

    fn pre_collect(&mut self, hints: &mut CollectorHints, _tick: u64) {
        hints.collect_interface(&self.interface);
    }

    fn collect(&mut self, ctx: &CollectContext<'_>) -> Result<()> {
        let raw = ctx.hal().raw_host_network_load(&self.interface)?;
        if let Some(prev) = self.prev {
            let capacity = self.speed * u64::from(self.state.period());
            if capacity == 0 {
                tracing::debug!(interface = %self.interface, "link speed unknown, reporting zero load");
            }
            let rx = raw.rx.saturating_sub(prev.rx);
            let tx = raw.tx.saturating_sub(prev.tx);
            self.subs[0].put(load_fraction(NETWORK_LOAD_MULTIPLIER, rx, capacity));
            self.subs[1].put(load_fraction(NETWORK_LOAD_MULTIPLIER, tx, capacity));
        }
        self.prev = Some(raw);
        Ok(())
    }
}

/// Network throughput of a workload as reported by its guest.
pub struct MachineNetRate {
    state: MetricState,
    subs: [SubMetric; 2],
    channel: Weak<GuestChannel>,
}

impl MachineNetRate {
    pub fn new(machine: ObjectId, channel: &Arc<GuestChannel>) -> Self {
        Self {
            state: MetricState::new(machine, "Net/Rate"),
            subs: [
                SubMetric::new("Net/Rate/Rx", "Network receive rate."),
                SubMetric::new("Net/Rate/Tx", "Network transmit rate."),
            ],
            channel: Arc::downgrade(channel),
        }
    }
}

impl BaseMetric for MachineNetRate {
    fn state(&self) -> &MetricState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MetricState {
        &mut self.state
    }

    fn unit(&self) -> &'static str {
        "B/s"
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
        hints.collect_guest_stats(groups::NET_RATE);
    }

    fn collect(&mut self, _ctx: &CollectContext<'_>) -> Result<()> {
        let channel = super::guest::upgrade(&self.channel, &self.state)?;
        if let Some(stats) = channel.take_group(groups::NET_RATE) {
            self.subs[0].put(stats.net_rx);
            self.subs[1].put(stats.net_tx);
        }
        Ok(())
    }

    fn enable(&mut self, _guests: &GuestManager) -> Result<()> {
        super::guest::upgrade(&self.channel, &self.state)?.enable(groups::NET_RATE)?;
        self.state.set_enabled(true);
        Ok(())
    }

    fn disable(&mut self, _guests: &GuestManager) -> Result<()> {
        super::guest::upgrade(&self.channel, &self.state)?.disable(groups::NET_RATE)?;
        self.state.set_enabled(false);
        Ok(())
    }
}
