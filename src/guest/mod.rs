//! Guest-reported statistics.
//!
//! Each workload that reports its own view of CPU and memory gets a
//! [`GuestChannel`]. Values are pushed out-of-band by the guest link and
//! held behind the channel's own lock; configuration (which stat groups the
//! guest should report) only changes on the manager's worker, in the order
//! requests were submitted.

mod manager;

pub use manager::GuestManager;

use crate::errors::{MetricsError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Stat group bits, used both for validity and for enablement.
pub mod groups {
    pub const CPU_LOAD: u32 = 0x01;
    pub const RAM_USAGE: u32 = 0x02;
    pub const VMM_RAM: u32 = 0x04;
    pub const NET_RATE: u32 = 0x08;
    pub const ALL: u32 = CPU_LOAD | RAM_USAGE | VMM_RAM | NET_RATE;
}

/// Latest values per group, also the shape of one push from the guest.
/// Fields of a group whose bit is clear in `valid` are stale and must not
/// be sampled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuestStats {
    pub valid: u32,
    pub cpu_user: u32,
    pub cpu_kernel: u32,
    pub cpu_idle: u32,
    pub mem_total: u32,
    pub mem_free: u32,
    pub mem_balloon: u32,
    pub mem_shared: u32,
    pub mem_cache: u32,
    pub page_total: u32,
    pub alloc_vmm: u32,
    pub free_vmm: u32,
    pub balloon_vmm: u32,
    pub shared_vmm: u32,
    pub net_rx: u32,
    pub net_tx: u32,
}

impl GuestStats {
    pub fn is_valid(&self, group: u32) -> bool {
        self.valid & group == group
    }

    fn apply(&mut self, u: &GuestStats) {
        if u.valid & groups::CPU_LOAD != 0 {
            self.cpu_user = u.cpu_user;
            self.cpu_kernel = u.cpu_kernel;
            self.cpu_idle = u.cpu_idle;
        }
        if u.valid & groups::RAM_USAGE != 0 {
            self.mem_total = u.mem_total;
            self.mem_free = u.mem_free;
            self.mem_balloon = u.mem_balloon;
            self.mem_shared = u.mem_shared;
            self.mem_cache = u.mem_cache;
            self.page_total = u.page_total;
        }
        if u.valid & groups::VMM_RAM != 0 {
            self.alloc_vmm = u.alloc_vmm;
            self.free_vmm = u.free_vmm;
            self.balloon_vmm = u.balloon_vmm;
            self.shared_vmm = u.shared_vmm;
        }
        if u.valid & groups::NET_RATE != 0 {
            self.net_rx = u.net_rx;
            self.net_tx = u.net_tx;
        }
        self.valid |= u.valid & groups::ALL;
    }
}

/// Control link to a running guest, implemented by the workload's host side.
#[async_trait]
pub trait GuestControl: Send + Sync {
    /// Ask the guest to push statistics every `seconds`; 0 stops pushes.
    async fn set_statistics_interval(&self, seconds: u32) -> Result<()>;

    /// Toggle hypervisor-wide memory statistics.
    async fn enable_vmm_stats(&self, enabled: bool) -> Result<()>;
}

/// Control commands executed by the manager's worker.
pub enum GuestRequest {
    Enable { channel: Arc<GuestChannel>, mask: u32 },
    Disable { channel: Arc<GuestChannel>, mask: u32 },
    Abort,
}

impl std::fmt::Debug for GuestRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuestRequest::Enable { channel, mask } => {
                write!(f, "Enable({}, {mask:#x})", channel.name())
            }
            GuestRequest::Disable { channel, mask } => {
                write!(f, "Disable({}, {mask:#x})", channel.name())
            }
            GuestRequest::Abort => f.write_str("Abort"),
        }
    }
}

pub struct GuestChannel {
    name: String,
    control: Arc<dyn GuestControl>,
    requests: UnboundedSender<GuestRequest>,
    enabled: AtomicU32,
    unregistered: AtomicBool,
    stats: Mutex<GuestStats>,
}

impl GuestChannel {
    fn new(
        name: String,
        control: Arc<dyn GuestControl>,
        requests: UnboundedSender<GuestRequest>,
    ) -> Self {
        Self {
            name,
            control,
            requests,
            enabled: AtomicU32::new(0),
            unregistered: AtomicBool::new(false),
            stats: Mutex::new(GuestStats::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Groups the guest is currently asked to report.
    pub fn enabled_mask(&self) -> u32 {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled_mask() != 0
    }

    pub fn is_unregistered(&self) -> bool {
        self.unregistered.load(Ordering::Acquire)
    }

    pub(crate) fn set_unregistered(&self) {
        self.unregistered.store(true, Ordering::Release);
    }

    /// Queue a request to start reporting `mask`.
    pub fn enable(self: &Arc<Self>, mask: u32) -> Result<()> {
        self.enqueue(GuestRequest::Enable {
            channel: Arc::clone(self),
            mask,
        })
    }

    /// Queue a request to stop reporting `mask`.
    pub fn disable(self: &Arc<Self>, mask: u32) -> Result<()> {
        self.enqueue(GuestRequest::Disable {
            channel: Arc::clone(self),
            mask,
        })
    }

    fn enqueue(&self, request: GuestRequest) -> Result<()> {
        debug!(guest = %self.name, ?request, "queueing guest request");
        self.requests
            .send(request)
            .map_err(|_| MetricsError::QueueClosed)
    }

    /// Accept a push from the guest.
    pub fn update_stats(&self, update: &GuestStats) {
        self.stats().apply(update);
    }

    /// Mark groups as consumed or lost.
    pub fn invalidate(&self, mask: u32) {
        self.stats().valid &= !mask;
    }

    pub fn is_valid(&self, group: u32) -> bool {
        self.stats().is_valid(group)
    }

    /// Copy of the current values.
    pub fn stats_snapshot(&self) -> GuestStats {
        *self.stats()
    }

    /// Read a group if valid and invalidate it in the same critical section.
    pub fn take_group(&self, group: u32) -> Option<GuestStats> {
        let mut stats = self.stats();
        if !stats.is_valid(group) {
            return None;
        }
        let copy = *stats;
        stats.valid &= !group;
        Some(copy)
    }

    fn stats(&self) -> MutexGuard<'_, GuestStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Only the worker calls these two.

    async fn enable_internal(&self, mask: u32) -> Result<()> {
        let current = self.enabled_mask();
        if current & mask == mask {
            return Ok(());
        }
        if current == 0 {
            self.control.set_statistics_interval(1).await?;
        }
        if mask & groups::VMM_RAM != 0 {
            self.control.enable_vmm_stats(true).await?;
        }
        self.enabled.fetch_or(mask, Ordering::AcqRel);
        Ok(())
    }

    async fn disable_internal(&self, mask: u32) -> Result<()> {
        let current = self.enabled_mask();
        if current & mask == 0 {
            return Ok(());
        }
        if mask & current & groups::VMM_RAM != 0 {
            self.control.enable_vmm_stats(false).await?;
        }
        let remaining = current & !mask;
        self.enabled.store(remaining, Ordering::Release);
        if remaining == 0 {
            self.control.set_statistics_interval(0).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for GuestChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestChannel")
            .field("name", &self.name)
            .field("enabled", &self.enabled_mask())
            .field("unregistered", &self.is_unregistered())
            .finish()
    }
}
