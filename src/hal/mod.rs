//! Host capability interface consumed by the sampler.
//!
//! A backend implements whichever capabilities its platform offers; the
//! rest keep the default `NotImplemented` answer and the metrics depending on
//! them are skipped. All blocking acquisition belongs in
//! [`HostHal::pre_collect`], which runs once per tick outside the engine
//! lock. The getters are called from the collect phase and must answer from
//! memory.

pub mod linux;

use crate::errors::{MetricsError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Host CPU split already expressed in the CPU load scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuLoad {
    pub user: u32,
    pub kernel: u32,
    pub idle: u32,
}

/// Monotonic host CPU time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawCpuLoad {
    pub user: u64,
    pub kernel: u64,
    pub idle: u64,
}

impl RawCpuLoad {
    pub fn total(&self) -> u64 {
        self.user + self.kernel + self.idle
    }
}

/// Monotonic process CPU counters plus the host total they are measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawProcessCpu {
    pub user: u64,
    pub kernel: u64,
    pub host_total: u64,
}

/// Host memory in kB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryUsage {
    pub total: u64,
    pub used: u64,
    pub available: u64,
}

/// Filesystem space in MB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FsUsage {
    pub total: u64,
    pub used: u64,
    pub available: u64,
}

/// Monotonic byte counters of one network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawNetLoad {
    pub rx: u64,
    pub tx: u64,
}

/// Milliseconds a disk spent busy, against wall-clock milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawDiskLoad {
    pub busy_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessNeeds {
    pub cpu: bool,
    pub ram: bool,
}

/// What the due metrics need from bulk acquisition this tick.
#[derive(Debug, Clone, Default)]
pub struct CollectorHints {
    host_cpu_load: bool,
    host_cpu_mhz: bool,
    host_ram: bool,
    host_ram_vmm: bool,
    processes: BTreeMap<u32, ProcessNeeds>,
    interfaces: Vec<String>,
    disks: Vec<String>,
    filesystems: Vec<String>,
    files: Vec<PathBuf>,
    guest_groups: u32,
}

impl CollectorHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect_host_cpu_load(&mut self) {
        self.host_cpu_load = true;
    }

    pub fn collect_host_cpu_mhz(&mut self) {
        self.host_cpu_mhz = true;
    }

    pub fn collect_host_ram(&mut self) {
        self.host_ram = true;
    }

    pub fn collect_host_ram_vmm(&mut self) {
        self.host_ram_vmm = true;
    }

    pub fn collect_process_cpu(&mut self, pid: u32) {
        self.processes.entry(pid).or_default().cpu = true;
    }

    pub fn collect_process_ram(&mut self, pid: u32) {
        self.processes.entry(pid).or_default().ram = true;
    }

    pub fn collect_interface(&mut self, name: &str) {
        push_unique(&mut self.interfaces, name);
    }

    pub fn collect_disk(&mut self, name: &str) {
        push_unique(&mut self.disks, name);
    }

    pub fn collect_filesystem(&mut self, mount: &str) {
        push_unique(&mut self.filesystems, mount);
    }

    pub fn collect_file_size(&mut self, path: &std::path::Path) {
        if !self.files.iter().any(|p| p == path) {
            self.files.push(path.to_path_buf());
        }
    }

    pub fn collect_guest_stats(&mut self, groups: u32) {
        self.guest_groups |= groups;
    }

    pub fn wants_host_cpu_load(&self) -> bool {
        self.host_cpu_load
    }

    pub fn wants_host_cpu_mhz(&self) -> bool {
        self.host_cpu_mhz
    }

    pub fn wants_host_ram(&self) -> bool {
        self.host_ram
    }

    pub fn wants_host_ram_vmm(&self) -> bool {
        self.host_ram_vmm
    }

    pub fn processes(&self) -> impl Iterator<Item = (u32, ProcessNeeds)> + '_ {
        self.processes.iter().map(|(pid, needs)| (*pid, *needs))
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn disks(&self) -> &[String] {
        &self.disks
    }

    pub fn filesystems(&self) -> &[String] {
        &self.filesystems
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn guest_groups(&self) -> u32 {
        self.guest_groups
    }

    pub fn is_empty(&self) -> bool {
        !self.host_cpu_load
            && !self.host_cpu_mhz
            && !self.host_ram
            && !self.host_ram_vmm
            && self.processes.is_empty()
            && self.interfaces.is_empty()
            && self.disks.is_empty()
            && self.filesystems.is_empty()
            && self.files.is_empty()
            && self.guest_groups == 0
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

#[async_trait]
pub trait HostHal: Send + Sync {
    /// Bulk acquisition for everything hinted; called at most once per tick.
    async fn pre_collect(&self, _hints: &CollectorHints, _tick: u64) -> Result<()> {
        Ok(())
    }

    fn host_cpu_load(&self) -> Result<CpuLoad> {
        Err(MetricsError::NotImplemented("host cpu load"))
    }

    fn host_cpu_mhz(&self) -> Result<u32> {
        Err(MetricsError::NotImplemented("host cpu mhz"))
    }

    fn host_memory_usage(&self) -> Result<MemoryUsage> {
        Err(MetricsError::NotImplemented("host memory usage"))
    }

    fn host_filesystem_usage(&self, _mount: &str) -> Result<FsUsage> {
        Err(MetricsError::NotImplemented("filesystem usage"))
    }

    /// Size of a disk in MB.
    fn host_disk_size(&self, _disk: &str) -> Result<u64> {
        Err(MetricsError::NotImplemented("disk size"))
    }

    /// Disks backing the filesystem mounted at `mount`.
    ///
    /// Not snapshotted and may block; only call it while registering
    /// objects, never from a sampling tick.
    fn disk_list_by_fs(&self, _mount: &str) -> Result<Vec<String>> {
        Err(MetricsError::NotImplemented("disk listing"))
    }

    /// Size in bytes of a file hinted with `collect_file_size`.
    fn file_size(&self, _path: &std::path::Path) -> Result<u64> {
        Err(MetricsError::NotImplemented("file size"))
    }

    fn process_cpu_load(&self, _pid: u32) -> Result<CpuLoad> {
        Err(MetricsError::NotImplemented("process cpu load"))
    }

    /// Resident memory of a process in kB.
    fn process_memory_usage(&self, _pid: u32) -> Result<u64> {
        Err(MetricsError::NotImplemented("process memory usage"))
    }

    fn raw_host_cpu_load(&self) -> Result<RawCpuLoad> {
        Err(MetricsError::NotImplemented("raw host cpu load"))
    }

    fn raw_host_network_load(&self, _interface: &str) -> Result<RawNetLoad> {
        Err(MetricsError::NotImplemented("raw host network load"))
    }

    fn raw_host_disk_load(&self, _disk: &str) -> Result<RawDiskLoad> {
        Err(MetricsError::NotImplemented("raw host disk load"))
    }

    fn raw_process_cpu_load(&self, _pid: u32) -> Result<RawProcessCpu> {
        Err(MetricsError::NotImplemented("raw process cpu load"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    #[async_trait]
    impl HostHal for Bare {}

    #[test]
    fn test_defaults_are_not_implemented() {
        let hal = Bare;
        assert!(hal.raw_host_cpu_load().unwrap_err().is_unsupported());
        assert!(hal.host_filesystem_usage("/").unwrap_err().is_unsupported());
        assert!(tokio_test::block_on(hal.pre_collect(&CollectorHints::new(), 1)).is_ok());
    }

    #[test]
    fn test_hints_merge_duplicates() {
        let mut hints = CollectorHints::new();
        assert!(hints.is_empty());
        hints.collect_process_cpu(42);
        hints.collect_process_ram(42);
        hints.collect_interface("eth0");
        hints.collect_interface("eth0");
        hints.collect_guest_stats(0x1);
        hints.collect_guest_stats(0x2);
        let procs: Vec<_> = hints.processes().collect();
        assert_eq!(procs, vec![(42, ProcessNeeds { cpu: true, ram: true })]);
        assert_eq!(hints.interfaces().len(), 1);
        assert_eq!(hints.guest_groups(), 0x3);
        assert!(!hints.is_empty());
    }
}
