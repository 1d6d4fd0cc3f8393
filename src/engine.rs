//! The collector engine: owns every base metric and view, drives the
//! three-phase sampling tick and exposes the bulk operations.
//!
//! Lock order is engine lists first, then a single base metric. Phases 1
//! and 2 of a tick run without the lists lock; phase 3 holds it
//! exclusively and is the only place base metrics or guest channels are
//! destroyed.

use crate::aggregate::Aggregate;
use crate::collectors::{cpu, disk, guest, memory, network, BaseMetric, CollectContext};
use crate::errors::{MetricsError, Result};
use crate::filter::Filter;
use crate::guest::{GuestChannel, GuestControl, GuestManager};
use crate::hal::{CollectorHints, HostHal};
use crate::metric::{BaseMetricHandle, BaseMetricSlot, Metric, MetricInfo, MetricsData};
use crate::object::ObjectId;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// The sampler never fires more often than this.
pub const MIN_SAMPLER_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub sampler_interval: Duration,
}

impl EngineSettings {
    pub fn new(sampler_interval: Duration) -> Self {
        Self {
            sampler_interval: sampler_interval.max(MIN_SAMPLER_INTERVAL),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::new(MIN_SAMPLER_INTERVAL)
    }
}

/// What to monitor on the host itself.
#[derive(Debug, Clone, Default)]
pub struct HostInventory {
    pub name: String,
    /// Interface name and link speed in Mbit/s (0 when unknown).
    pub interfaces: Vec<(String, u64)>,
    pub disks: Vec<String>,
    pub filesystems: Vec<String>,
}

/// One workload to monitor.
#[derive(Clone)]
pub struct MachineSpec {
    pub name: String,
    pub pid: u32,
    pub images: Vec<PathBuf>,
    /// Link to the guest, when it can report its own statistics.
    pub guest: Option<Arc<dyn GuestControl>>,
}

impl MachineSpec {
    pub fn new(name: impl Into<String>, pid: u32) -> Self {
        Self {
            name: name.into(),
            pid,
            images: Vec::new(),
            guest: None,
        }
    }

    pub fn object(&self) -> ObjectId {
        ObjectId::machine(self.name.clone())
    }
}

#[derive(Default)]
struct Lists {
    bases: Vec<Arc<BaseMetricSlot>>,
    views: Vec<Metric>,
}

impl Lists {
    /// A base metric matches by its own name, any sub-metric name or the
    /// name of any of its views.
    fn base_matches(&self, filter: &Filter, slot: &BaseMetricSlot) -> bool {
        let object = slot.object();
        filter.matches(object, slot.name())
            || slot.sub_names().iter().any(|n| filter.matches(object, n))
            || self
                .views
                .iter()
                .any(|v| v.base_id() == slot.id() && filter.matches(object, v.name()))
    }

    fn matching_bases<'a>(&'a self, filter: &'a Filter) -> impl Iterator<Item = &'a Arc<BaseMetricSlot>> + 'a {
        self.bases
            .iter()
            .filter(move |s| !s.is_unregistered() && self.base_matches(filter, s))
    }

    fn infos_for(&self, ids: &HashSet<u64>) -> Vec<MetricInfo> {
        self.views
            .iter()
            .filter(|v| ids.contains(&v.base_id()))
            .filter_map(Metric::info)
            .collect()
    }
}

pub struct CollectorEngine {
    hal: Arc<dyn HostHal>,
    guests: GuestManager,
    lists: RwLock<Lists>,
    next_id: AtomicU64,
    settings: EngineSettings,
    started: Instant,
    suspended: AtomicBool,
    stop: Notify,
    sampler: Mutex<Option<JoinHandle<()>>>,
}

impl CollectorEngine {
    /// Build an engine and start its guest request worker. Must be called
    /// inside a Tokio runtime.
    pub fn new(hal: Arc<dyn HostHal>, settings: EngineSettings) -> Arc<Self> {
        info!(interval_ms = settings.sampler_interval.as_millis() as u64, "collector engine created");
        Arc::new(Self {
            hal,
            guests: GuestManager::start(),
            lists: RwLock::new(Lists::default()),
            next_id: AtomicU64::new(1),
            settings,
            started: Instant::now(),
            suspended: AtomicBool::new(false),
            stop: Notify::new(),
            sampler: Mutex::new(None),
        })
    }

    pub fn guests(&self) -> &GuestManager {
        &self.guests
    }

    pub fn hal(&self) -> &dyn HostHal {
        &*self.hal
    }

    fn read(&self) -> RwLockReadGuard<'_, Lists> {
        self.lists.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Lists> {
        self.lists.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ---- registration ----

    pub fn register_base_metric(&self, metric: Box<dyn BaseMetric>) -> Result<BaseMetricHandle> {
        let mut lists = self.write();
        self.insert_base(&mut lists, metric).map(BaseMetricHandle)
    }

    fn insert_base(&self, lists: &mut Lists, metric: Box<dyn BaseMetric>) -> Result<Arc<BaseMetricSlot>> {
        let duplicate = lists.bases.iter().any(|s| {
            !s.is_unregistered() && s.object() == metric.object() && s.name() == metric.name()
        });
        if duplicate {
            return Err(MetricsError::PreconditionViolation(format!(
                "{} already registered for {}",
                metric.name(),
                metric.object()
            )));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(BaseMetricSlot::new(id, metric));
        debug!(metric = %slot.name(), object = %slot.object(), "base metric registered");
        lists.bases.push(Arc::clone(&slot));
        Ok(slot)
    }

    /// Register a view of sub-metric `sub` of `base`.
    pub fn register_metric(
        &self,
        base: &BaseMetricHandle,
        sub: usize,
        aggregate: Option<Aggregate>,
    ) -> Result<()> {
        let mut lists = self.write();
        Self::add_view(&mut lists, &base.0, sub, aggregate)
    }

    fn add_view(lists: &mut Lists, slot: &Arc<BaseMetricSlot>, sub: usize, aggregate: Option<Aggregate>) -> Result<()> {
        if slot.is_unregistered() {
            return Err(MetricsError::PreconditionViolation(format!(
                "{} of {} is unregistered",
                slot.name(),
                slot.object()
            )));
        }
        let view = Metric::new(slot, sub, aggregate)?;
        if lists
            .views
            .iter()
            .any(|v| v.object() == view.object() && v.name() == view.name() && v.base().is_some())
        {
            return Err(MetricsError::PreconditionViolation(format!(
                "metric {} already registered for {}",
                view.name(),
                view.object()
            )));
        }
        lists.views.push(view);
        Ok(())
    }

    /// Register `metric` with a raw, avg, min and max view per sub-metric.
    /// Either the base metric and all of its views are added or nothing is.
    pub fn register_with_views(&self, metric: Box<dyn BaseMetric>) -> Result<BaseMetricHandle> {
        let mut lists = self.write();
        let slot = self.insert_base(&mut lists, metric)?;
        let views_before = lists.views.len();
        if let Err(e) = Self::add_all_views(&mut lists, &slot) {
            lists.views.truncate(views_before);
            lists.bases.retain(|s| !Arc::ptr_eq(s, &slot));
            debug!(metric = %slot.name(), object = %slot.object(), error = %e, "registration rolled back");
            return Err(e);
        }
        Ok(BaseMetricHandle(slot))
    }

    fn add_all_views(lists: &mut Lists, slot: &Arc<BaseMetricSlot>) -> Result<()> {
        for sub in 0..slot.sub_names().len() {
            Self::add_view(lists, slot, sub, None)?;
            for agg in Aggregate::ALL {
                Self::add_view(lists, slot, sub, Some(agg))?;
            }
        }
        Ok(())
    }

    /// Flag matching base metrics for removal at the next collect phase.
    pub fn unregister_base_metrics_for(&self, filter: &Filter) -> usize {
        let lists = self.read();
        let mut flagged = 0;
        for slot in lists.matching_bases(filter) {
            slot.set_unregistered();
            flagged += 1;
        }
        debug!(flagged, "base metrics flagged for removal");
        flagged
    }

    pub fn unregister_metrics_for(&self, filter: &Filter) -> usize {
        let mut lists = self.write();
        let before = lists.views.len();
        lists.views.retain(|v| !filter.matches(v.object(), v.name()));
        before - lists.views.len()
    }

    pub fn register_guest(&self, name: impl Into<String>, control: Arc<dyn GuestControl>) -> Arc<GuestChannel> {
        self.guests.register_guest(name, control)
    }

    /// The channel stays readable until the next collect phase destroys it.
    pub fn unregister_guest(&self, channel: &Arc<GuestChannel>) {
        self.guests.unregister_guest(channel);
    }

    /// Register the host's base metrics, each with its four views.
    pub fn register_host(&self, host: &HostInventory) -> Result<Vec<BaseMetricHandle>> {
        let object = ObjectId::host(host.name.clone());
        let mut metrics: Vec<Box<dyn BaseMetric>> = vec![
            Box::new(cpu::HostCpuLoad::new(object.clone())),
            Box::new(cpu::HostCpuMhz::new(object.clone())),
            Box::new(memory::HostRamUsage::new(object.clone())),
            Box::new(memory::HostRamVmm::new(object.clone())),
        ];
        for (interface, speed) in &host.interfaces {
            metrics.push(Box::new(network::HostNetworkLoad::new(object.clone(), interface, *speed)));
        }

        let mut disks = host.disks.clone();
        for mount in &host.filesystems {
            metrics.push(Box::new(disk::HostFilesystemUsage::new(object.clone(), mount)));
            match self.hal.disk_list_by_fs(mount) {
                Ok(found) => {
                    for d in found {
                        if !disks.contains(&d) {
                            disks.push(d);
                        }
                    }
                }
                Err(e) => debug!(mount = %mount, error = %e, "no disks listed for filesystem"),
            }
        }
        for d in &disks {
            metrics.push(Box::new(disk::HostDiskLoad::new(object.clone(), d)));
            metrics.push(Box::new(disk::HostDiskUsage::new(object.clone(), d)));
        }

        let handles = metrics
            .into_iter()
            .map(|m| self.register_with_views(m))
            .collect::<Result<Vec<_>>>()?;
        info!(host = %host.name, base_metrics = handles.len(), "host registered");
        Ok(handles)
    }

    /// Register a workload's base metrics, plus a guest channel and the
    /// guest-backed metrics when it has a guest link.
    pub fn register_machine(&self, machine: &MachineSpec) -> Result<Option<Arc<GuestChannel>>> {
        let object = machine.object();
        let mut metrics: Vec<Box<dyn BaseMetric>> = vec![
            Box::new(cpu::MachineCpuLoad::new(object.clone(), machine.pid)),
            Box::new(memory::MachineRamUsage::new(object.clone(), machine.pid)),
        ];
        if !machine.images.is_empty() {
            metrics.push(Box::new(disk::MachineDiskUsage::new(object.clone(), machine.images.clone())));
        }
        let channel = machine
            .guest
            .as_ref()
            .map(|control| self.register_guest(machine.name.clone(), Arc::clone(control)));
        if let Some(ch) = &channel {
            metrics.push(Box::new(guest::GuestCpuLoad::new(object.clone(), ch)));
            metrics.push(Box::new(guest::GuestRamUsage::new(object.clone(), ch)));
            metrics.push(Box::new(network::MachineNetRate::new(object.clone(), ch)));
        }
        for m in metrics {
            self.register_with_views(m)?;
        }
        info!(machine = %machine.name, pid = machine.pid, guest = channel.is_some(), "machine registered");
        Ok(channel)
    }

    /// Tear down everything registered for `object`.
    pub fn unregister_machine(&self, object: &ObjectId) -> usize {
        let flagged = self.unregister_base_metrics_for(&Filter::object(object.clone()));
        if let Some(channel) = self.guests.find(object.name()) {
            self.unregister_guest(&channel);
        }
        info!(object = %object, flagged, "machine unregistered");
        flagged
    }

    // ---- configuration and queries ----

    pub fn get_metrics(&self, filter: &Filter) -> Vec<MetricInfo> {
        let lists = self.read();
        lists
            .views
            .iter()
            .filter(|v| filter.matches(v.object(), v.name()))
            .filter_map(Metric::info)
            .collect()
    }

    /// Re-provision matching base metrics. A zero period or length leaves
    /// them disabled, anything else enables them.
    pub fn setup_metrics(&self, filter: &Filter, period_secs: u32, length: usize) -> Result<Vec<MetricInfo>> {
        let lists = self.read();
        let mut touched = HashSet::new();
        let mut first_err = None;
        for slot in lists.matching_bases(filter) {
            let mut metric = slot.lock();
            metric.init(&*self.hal, period_secs, length);
            let result = if period_secs == 0 || length == 0 {
                metric.disable(&self.guests)
            } else {
                metric.enable(&self.guests)
            };
            if let Err(e) = result {
                warn!(metric = %slot.name(), object = %slot.object(), error = %e, "setup failed");
                first_err.get_or_insert(e);
            }
            touched.insert(slot.id());
        }
        debug!(count = touched.len(), period_secs, length, "metrics set up");
        match first_err {
            Some(e) => Err(e),
            None => Ok(lists.infos_for(&touched)),
        }
    }

    pub fn enable_metrics(&self, filter: &Filter) -> Result<Vec<MetricInfo>> {
        self.toggle(filter, true)
    }

    pub fn disable_metrics(&self, filter: &Filter) -> Result<Vec<MetricInfo>> {
        self.toggle(filter, false)
    }

    fn toggle(&self, filter: &Filter, enable: bool) -> Result<Vec<MetricInfo>> {
        let lists = self.read();
        let mut touched = HashSet::new();
        let mut first_err = None;
        for slot in lists.matching_bases(filter) {
            let mut metric = slot.lock();
            let result = if enable {
                metric.enable(&self.guests)
            } else {
                metric.disable(&self.guests)
            };
            if let Err(e) = result {
                warn!(metric = %slot.name(), object = %slot.object(), enable, error = %e, "toggle failed");
                first_err.get_or_insert(e);
            }
            touched.insert(slot.id());
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(lists.infos_for(&touched)),
        }
    }

    /// Current samples of every matching view, oldest first.
    pub fn query_metrics_data(&self, filter: &Filter) -> Result<MetricsData> {
        let lists = self.read();
        let mut data = MetricsData::default();
        for view in lists.views.iter().filter(|v| filter.matches(v.object(), v.name())) {
            view.query_into(&mut data)?;
        }
        Ok(data)
    }

    // ---- sampling ----

    pub fn suspend_sampling(&self) {
        self.suspended.store(true, Ordering::Release);
        info!("sampling suspended");
    }

    pub fn resume_sampling(&self) {
        self.suspended.store(false, Ordering::Release);
        info!("sampling resumed");
    }

    pub fn is_sampling_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    pub fn uptime_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Run one tick at engine time `now_ms`.
    pub async fn sample(&self, tick: u64, now_ms: u64) {
        let (hints, due) = self.hint_phase(tick, now_ms);
        if due.is_empty() {
            trace!(tick, "nothing due");
        } else if let Err(e) = self.hal.pre_collect(&hints, tick).await {
            if e.is_unsupported() {
                debug!(tick, error = %e, "bulk pre-collect unsupported");
            } else {
                warn!(tick, error = %e, "bulk pre-collect failed");
            }
        }
        self.collect_phase(tick, due);
    }

    fn hint_phase(&self, tick: u64, now_ms: u64) -> (CollectorHints, Vec<Arc<BaseMetricSlot>>) {
        let slots = self.read().bases.clone();
        let mut hints = CollectorHints::new();
        let mut due = Vec::new();
        for slot in slots {
            if slot.is_unregistered() {
                continue;
            }
            let mut metric = slot.lock();
            if metric.collector_beat(now_ms) {
                metric.pre_collect(&mut hints, tick);
                drop(metric);
                due.push(slot);
            }
        }
        (hints, due)
    }

    fn collect_phase(&self, tick: u64, mut due: Vec<Arc<BaseMetricSlot>>) {
        let mut lists = self.write();

        let before = lists.bases.len();
        lists.bases.retain(|s| !s.is_unregistered());
        let purged = before - lists.bases.len();
        due.retain(|s| !s.is_unregistered());
        lists.views.retain(|v| v.base().is_some());
        if purged > 0 {
            debug!(tick, purged, "destroyed unregistered base metrics");
        }

        let ctx = CollectContext::new(&*self.hal, &self.guests);
        self.guests.destroy_unregistered(&ctx);

        for slot in &due {
            let mut metric = slot.lock();
            if !metric.is_enabled() {
                continue;
            }
            if let Err(e) = metric.collect(&ctx) {
                if e.is_unsupported() {
                    trace!(metric = %slot.name(), object = %slot.object(), error = %e, "not supported");
                } else {
                    warn!(metric = %slot.name(), object = %slot.object(), tick, error = %e, "collect failed");
                }
            }
        }
        trace!(tick, collected = due.len(), "tick done");
    }

    /// Drive ticks from a timer until [`shutdown`](Self::shutdown).
    pub fn spawn_sampler(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.settings.sampler_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut tick = 0u64;
            loop {
                tokio::select! {
                    _ = engine.stop.notified() => break,
                    _ = ticker.tick() => {}
                }
                if engine.is_sampling_suspended() {
                    continue;
                }
                tick += 1;
                engine.sample(tick, engine.uptime_ms()).await;
            }
            info!(ticks = tick, "sampler stopped");
        });
        let previous = self
            .sampler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(old) = previous {
            warn!("sampler restarted, aborting the previous one");
            old.abort();
        }
    }

    /// Stop the sampler and the guest worker.
    pub async fn shutdown(&self) {
        let handle = self
            .sampler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            self.stop.notify_one();
            if let Err(e) = handle.await {
                warn!(error = %e, "sampler task ended abnormally");
            }
        }
        self.guests.shutdown().await;
        info!("collector engine shut down");
    }
}
