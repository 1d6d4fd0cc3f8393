use super::*;
use crate::errors::MetricsError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use sysinfo::Disks;
use tokio::fs;
use tracing::debug;

/// Linux backend reading /proc and /sys.
///
/// Every file is read in `pre_collect`; the getters answer from the
/// snapshot of the latest tick.
pub struct LinuxHal {
    proc_root: PathBuf,
    sys_root: PathBuf,
    started: Instant,
    page_kb: u64,
    snapshot: Mutex<Snapshot>,
}

const CPU_COLUMNS: [&str; 8] = ["user", "nice", "system", "idle", "iowait", "irq", "softirq", "steal"];

/// Raw CPU tick counts from /proc/stat.
#[derive(Debug, Clone, Default)]
struct CpuSample {
    user: u64,
    nice: u64,
    system: u64,
    idle: u64,
    iowait: u64,
    irq: u64,
    softirq: u64,
    steal: u64,
}

impl CpuSample {
    fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    fn raw(&self) -> RawCpuLoad {
        RawCpuLoad {
            user: self.user + self.nice,
            kernel: self.system + self.irq + self.softirq,
            idle: self.idle + self.iowait,
        }
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    cpu: Option<CpuSample>,
    cpu_mhz: Option<u32>,
    memory: Option<MemoryUsage>,
    process_cpu: HashMap<u32, (u64, u64)>,
    process_rss_kb: HashMap<u32, u64>,
    net: HashMap<String, RawNetLoad>,
    disk_busy_ms: HashMap<String, u64>,
    disk_clock_ms: u64,
    disk_size_mb: HashMap<String, u64>,
    filesystems: HashMap<String, FsUsage>,
    files: HashMap<PathBuf, u64>,
}

impl LinuxHal {
    pub fn new() -> Self {
        Self::with_roots("/proc", "/sys")
    }

    /// Point the backend at alternative proc/sys trees.
    pub fn with_roots(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        let page_kb = nix::unistd::sysconf(nix::unistd::SysconfVar::PAGE_SIZE)
            .ok()
            .flatten()
            .map(|bytes| bytes as u64 / 1024)
            .unwrap_or(4);
        Self {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
            started: Instant::now(),
            page_kb,
            snapshot: Mutex::new(Snapshot::default()),
        }
    }

    async fn read(&self, root: &Path, rel: &str) -> Result<(String, String)> {
        let path = root.join(rel);
        let display = path.display().to_string();
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| MetricsError::from_io(display.clone(), e))?;
        Ok((display, content))
    }

    /// Parse the aggregate `cpu` line of /proc/stat.
    fn parse_cpu_line(line: &str) -> Result<CpuSample> {
        let bad = |field: &str, raw: &str| MetricsError::Parse {
            path: "/proc/stat".into(),
            field: field.into(),
            raw: raw.to_string(),
        };
        let mut columns = line.split_whitespace();
        if columns.next() != Some("cpu") {
            return Err(bad("cpu", line));
        }
        let mut ticks = [0u64; 8];
        for (slot, name) in ticks.iter_mut().zip(CPU_COLUMNS) {
            let raw = columns.next().ok_or_else(|| bad(name, line))?;
            *slot = raw.parse().map_err(|_| bad(name, raw))?;
        }
        let [user, nice, system, idle, iowait, irq, softirq, steal] = ticks;
        Ok(CpuSample { user, nice, system, idle, iowait, irq, softirq, steal })
    }

    /// Total and available memory from /proc/meminfo, in kB.
    fn memory_usage(meminfo: &str) -> Result<MemoryUsage> {
        let (mut total, mut available) = (None, None);
        for line in meminfo.lines() {
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            let slot = match key {
                "MemTotal" => &mut total,
                "MemAvailable" => &mut available,
                _ => continue,
            };
            *slot = rest.split_whitespace().next().and_then(|v| v.parse::<u64>().ok());
        }
        let missing = |field: &str| MetricsError::Parse {
            path: "/proc/meminfo".into(),
            field: field.into(),
            raw: "field not found".into(),
        };
        let total = total.ok_or_else(|| missing("MemTotal"))?;
        let available = available.ok_or_else(|| missing("MemAvailable"))?;
        Ok(MemoryUsage {
            total,
            used: total.saturating_sub(available),
            available,
        })
    }

    /// Average "cpu MHz" over all processors in /proc/cpuinfo.
    fn parse_cpu_mhz(content: &str) -> Option<u32> {
        let speeds: Vec<f64> = content
            .lines()
            .filter(|line| line.starts_with("cpu MHz"))
            .filter_map(|line| line.split(':').nth(1))
            .filter_map(|v| v.trim().parse::<f64>().ok())
            .collect();
        if speeds.is_empty() {
            return None;
        }
        Some((speeds.iter().sum::<f64>() / speeds.len() as f64) as u32)
    }

    /// Byte counters per interface from /proc/net/dev.
    fn parse_net_dev(content: &str) -> HashMap<String, RawNetLoad> {
        content
            .lines()
            .skip(2)
            .filter_map(|line| {
                let (name, rest) = line.split_once(':')?;
                let fields: Vec<u64> = rest
                    .split_whitespace()
                    .filter_map(|f| f.parse().ok())
                    .collect();
                if fields.len() < 9 {
                    return None;
                }
                Some((
                    name.trim().to_string(),
                    RawNetLoad {
                        rx: fields[0],
                        tx: fields[8],
                    },
                ))
            })
            .collect()
    }

    /// Milliseconds spent doing I/O per device from /proc/diskstats.
    fn parse_diskstats(content: &str) -> HashMap<String, u64> {
        content
            .lines()
            .filter_map(|line| {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() < 13 {
                    return None;
                }
                let busy = parts[12].parse::<u64>().ok()?;
                Some((parts[2].to_string(), busy))
            })
            .collect()
    }

    /// utime and stime from /proc/<pid>/stat.
    fn parse_pid_stat(pid: u32, content: &str) -> Result<(u64, u64)> {
        let err = |field: &str| MetricsError::Parse {
            path: format!("/proc/{pid}/stat"),
            field: field.into(),
            raw: content.trim().to_string(),
        };
        // comm may contain spaces and parens; the fixed fields follow the last ')'
        let (_, rest) = content.rsplit_once(')').ok_or_else(|| err("comm"))?;
        let fields: Vec<&str> = rest.split_whitespace().collect();
        if fields.len() < 13 {
            return Err(err("stat"));
        }
        let utime = fields[11].parse::<u64>().map_err(|_| err("utime"))?;
        let stime = fields[12].parse::<u64>().map_err(|_| err("stime"))?;
        Ok((utime, stime))
    }

    /// Resident pages from /proc/<pid>/statm.
    fn parse_statm(pid: u32, content: &str) -> Result<u64> {
        content
            .split_whitespace()
            .nth(1)
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| MetricsError::Parse {
                path: format!("/proc/{pid}/statm"),
                field: "resident".into(),
                raw: content.trim().to_string(),
            })
    }

    /// Network interfaces listed in /proc/net/dev, loopback excluded.
    pub async fn interfaces(&self) -> Result<Vec<String>> {
        let (_, content) = self.read(&self.proc_root, "net/dev").await?;
        let mut names: Vec<String> = Self::parse_net_dev(&content)
            .into_keys()
            .filter(|n| n != "lo")
            .collect();
        names.sort();
        Ok(names)
    }

    /// Link speed in Mbit/s from sysfs.
    pub async fn link_speed_mbits(&self, interface: &str) -> Result<u64> {
        let (path, content) = self
            .read(&self.sys_root, &format!("class/net/{interface}/speed"))
            .await?;
        content
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|v| *v > 0)
            .map(|v| v as u64)
            .ok_or(MetricsError::Parse {
                path,
                field: "speed".into(),
                raw: content.trim().to_string(),
            })
    }

    async fn read_host_cpu(&self) -> Result<CpuSample> {
        let (_, stat) = self.read(&self.proc_root, "stat").await?;
        let line = stat.lines().next().ok_or_else(|| MetricsError::Parse {
            path: "/proc/stat".into(),
            field: "cpu_line".into(),
            raw: "empty file".into(),
        })?;
        Self::parse_cpu_line(line)
    }

    async fn read_filesystems(mounts: Vec<String>) -> Result<HashMap<String, FsUsage>> {
        tokio::task::spawn_blocking(move || {
            let disks = Disks::new_with_refreshed_list();
            let mut usage = HashMap::new();
            for disk in disks.list() {
                let mount = disk.mount_point().to_string_lossy().into_owned();
                if mounts.contains(&mount) {
                    let total = disk.total_space() / (1024 * 1024);
                    let available = disk.available_space() / (1024 * 1024);
                    usage.insert(
                        mount,
                        FsUsage {
                            total,
                            used: total.saturating_sub(available),
                            available,
                        },
                    );
                }
            }
            usage
        })
        .await
        .map_err(|e| MetricsError::NotSupported(format!("filesystem scan aborted: {e}")))
    }

    fn snapshot(&self) -> std::sync::MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LinuxHal {
    fn default() -> Self {
        Self::new()
    }
}

fn absent(what: impl Into<String>) -> MetricsError {
    MetricsError::NotFound { what: what.into() }
}

#[async_trait]
impl HostHal for LinuxHal {
    async fn pre_collect(&self, hints: &CollectorHints, tick: u64) -> Result<()> {
        let mut next = Snapshot::default();

        let need_cpu = hints.wants_host_cpu_load() || hints.processes().any(|(_, n)| n.cpu);
        if need_cpu {
            match self.read_host_cpu().await {
                Ok(sample) => next.cpu = Some(sample),
                Err(e) => debug!(tick, error = %e, "host cpu counters unavailable"),
            }
        }

        if hints.wants_host_cpu_mhz() {
            if let Ok((_, content)) = self.read(&self.proc_root, "cpuinfo").await {
                next.cpu_mhz = Self::parse_cpu_mhz(&content);
            }
        }

        if hints.wants_host_ram() {
            match self.read(&self.proc_root, "meminfo").await {
                Ok((_, content)) => {
                    next.memory = Self::memory_usage(&content).ok();
                }
                Err(e) => debug!(tick, error = %e, "meminfo unavailable"),
            }
        }

        for (pid, needs) in hints.processes() {
            if needs.cpu {
                match self.read(&self.proc_root, &format!("{pid}/stat")).await {
                    Ok((_, content)) => match Self::parse_pid_stat(pid, &content) {
                        Ok(times) => {
                            next.process_cpu.insert(pid, times);
                        }
                        Err(e) => debug!(tick, pid, error = %e, "bad process stat"),
                    },
                    Err(e) => debug!(tick, pid, error = %e, "process stat unavailable"),
                }
            }
            if needs.ram {
                if let Ok((_, content)) = self.read(&self.proc_root, &format!("{pid}/statm")).await
                {
                    if let Ok(pages) = Self::parse_statm(pid, &content) {
                        next.process_rss_kb.insert(pid, pages * self.page_kb);
                    }
                }
            }
        }

        if !hints.interfaces().is_empty() {
            if let Ok((_, content)) = self.read(&self.proc_root, "net/dev").await {
                next.net = Self::parse_net_dev(&content);
            }
        }

        if !hints.disks().is_empty() {
            if let Ok((_, content)) = self.read(&self.proc_root, "diskstats").await {
                next.disk_busy_ms = Self::parse_diskstats(&content);
                next.disk_clock_ms = self.started.elapsed().as_millis() as u64;
            }
            for disk in hints.disks() {
                let rel = format!("class/block/{disk}/size");
                if let Ok((_, content)) = self.read(&self.sys_root, &rel).await {
                    if let Ok(sectors) = content.trim().parse::<u64>() {
                        next.disk_size_mb.insert(disk.clone(), sectors * 512 / (1024 * 1024));
                    }
                }
            }
        }

        if !hints.filesystems().is_empty() {
            match Self::read_filesystems(hints.filesystems().to_vec()).await {
                Ok(usage) => next.filesystems = usage,
                Err(e) => debug!(tick, error = %e, "filesystem usage unavailable"),
            }
        }

        for file in hints.files() {
            if let Ok(meta) = fs::metadata(file).await {
                next.files.insert(file.clone(), meta.len());
            }
        }

        *self.snapshot() = next;
        Ok(())
    }

    fn host_cpu_mhz(&self) -> Result<u32> {
        self.snapshot().cpu_mhz.ok_or_else(|| absent("cpu MHz"))
    }

    fn host_memory_usage(&self) -> Result<MemoryUsage> {
        self.snapshot().memory.ok_or_else(|| absent("meminfo"))
    }

    fn host_filesystem_usage(&self, mount: &str) -> Result<FsUsage> {
        self.snapshot()
            .filesystems
            .get(mount)
            .copied()
            .ok_or_else(|| absent(format!("filesystem {mount}")))
    }

    fn host_disk_size(&self, disk: &str) -> Result<u64> {
        self.snapshot()
            .disk_size_mb
            .get(disk)
            .copied()
            .ok_or_else(|| absent(format!("disk {disk}")))
    }

    // registration only; sampling reads filesystems off the runtime in pre_collect
    fn disk_list_by_fs(&self, mount: &str) -> Result<Vec<String>> {
        let disks = Disks::new_with_refreshed_list();
        let names = disks_mounted_at(
            disks.list().iter().map(|d| (d.name(), d.mount_point())),
            Path::new(mount),
        );
        if names.is_empty() {
            return Err(absent(format!("disks for {mount}")));
        }
        Ok(names)
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        self.snapshot()
            .files
            .get(path)
            .copied()
            .ok_or_else(|| absent(path.display().to_string()))
    }

    fn process_memory_usage(&self, pid: u32) -> Result<u64> {
        self.snapshot()
            .process_rss_kb
            .get(&pid)
            .copied()
            .ok_or_else(|| absent(format!("process {pid}")))
    }

    fn raw_host_cpu_load(&self) -> Result<RawCpuLoad> {
        self.snapshot()
            .cpu
            .as_ref()
            .map(CpuSample::raw)
            .ok_or_else(|| absent("/proc/stat"))
    }

    fn raw_host_network_load(&self, interface: &str) -> Result<RawNetLoad> {
        self.snapshot()
            .net
            .get(interface)
            .copied()
            .ok_or_else(|| absent(format!("interface {interface}")))
    }

    fn raw_host_disk_load(&self, disk: &str) -> Result<RawDiskLoad> {
        let snap = self.snapshot();
        snap.disk_busy_ms
            .get(disk)
            .map(|&busy_ms| RawDiskLoad {
                busy_ms,
                total_ms: snap.disk_clock_ms,
            })
            .ok_or_else(|| absent(format!("disk {disk}")))
    }

    fn raw_process_cpu_load(&self, pid: u32) -> Result<RawProcessCpu> {
        let snap = self.snapshot();
        let (user, kernel) = snap
            .process_cpu
            .get(&pid)
            .copied()
            .ok_or_else(|| absent(format!("process {pid}")))?;
        let host_total = snap
            .cpu
            .as_ref()
            .map(CpuSample::total)
            .ok_or_else(|| absent("/proc/stat"))?;
        Ok(RawProcessCpu {
            user,
            kernel,
            host_total,
        })
    }
}

/// Device names, without `/dev/`, of the disks mounted at `mount`.
fn disks_mounted_at<'a>(
    disks: impl Iterator<Item = (&'a std::ffi::OsStr, &'a Path)>,
    mount: &Path,
) -> Vec<String> {
    disks
        .filter(|(_, at)| *at == mount)
        .map(|(name, _)| {
            let name = name.to_string_lossy();
            name.strip_prefix("/dev/").unwrap_or(&name).to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;

    const SAMPLE_STAT: &str = "\
cpu  10132153 290696 3084719 46828483 16683 0 25195 0 0 0
cpu0 1393280 32966 572056 13343292 6130 0 17875 0 0 0
cpu1 1335498 35507 523368 13200746 4990 0 3670 0 0 0";

    const SAMPLE_MEMINFO: &str = "\
MemTotal:       16384000 kB
MemFree:         2048000 kB
MemAvailable:    4096000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapTotal:       8192000 kB
SwapFree:        4096000 kB";

    const SAMPLE_NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1000      10    0    0    0     0          0         0     1000      10    0    0    0     0       0          0
  eth0: 123456    100    0    0    0     0          0         0   654321     200    0    0    0     0       0          0";

    const SAMPLE_DISKSTATS: &str = "\
   8       0 sda 1000 10 20000 500 2000 20 40000 900 0 1234 1400 0 0 0 0
   8       1 sda1 900 10 18000 450 1900 20 38000 850 0 1100 1300 0 0 0 0";

    #[test]
    fn test_parse_cpu_line() {
        let line = "cpu  10132153 290696 3084719 46828483 16683 0 25195 0 0 0";
        let sample = LinuxHal::parse_cpu_line(line).unwrap();
        assert_eq!(sample.user, 10132153);
        assert_eq!(sample.nice, 290696);
        assert_eq!(sample.system, 3084719);
        assert_eq!(sample.idle, 46828483);
        assert_eq!(sample.iowait, 16683);
        assert_eq!(sample.steal, 0);

        let raw = sample.raw();
        assert_eq!(raw.user, 10132153 + 290696);
        assert_eq!(raw.kernel, 3084719 + 25195);
        assert_eq!(raw.idle, 46828483 + 16683);
    }

    #[test]
    fn test_parse_cpu_line_too_short() {
        assert!(LinuxHal::parse_cpu_line("cpu  100 200").is_err());
        assert!(LinuxHal::parse_cpu_line("cpu0 1 2 3 4 5 6 7 8").is_err());
        assert!(LinuxHal::parse_cpu_line("cpu 1 2 x 4 5 6 7 8").is_err());
    }

    #[test]
    fn test_memory_usage() {
        let usage = LinuxHal::memory_usage(SAMPLE_MEMINFO).unwrap();
        assert_eq!(usage.total, 16384000);
        assert_eq!(usage.available, 4096000);
        assert_eq!(usage.used, 16384000 - 4096000);
    }

    #[test]
    fn test_memory_usage_missing_field() {
        assert!(LinuxHal::memory_usage("").is_err());
        assert!(LinuxHal::memory_usage("MemTotal:  1024 kB\n").is_err());
    }

    #[test]
    fn test_parse_cpu_mhz_averages() {
        let content = "processor : 0\ncpu MHz\t\t: 2000.000\nprocessor : 1\ncpu MHz\t\t: 3000.000\n";
        assert_eq!(LinuxHal::parse_cpu_mhz(content), Some(2500));
        assert_eq!(LinuxHal::parse_cpu_mhz("processor : 0\n"), None);
    }

    #[test]
    fn test_parse_net_dev() {
        let net = LinuxHal::parse_net_dev(SAMPLE_NET_DEV);
        assert_eq!(net["eth0"], RawNetLoad { rx: 123456, tx: 654321 });
        assert!(net.contains_key("lo"));
    }

    #[test]
    fn test_parse_diskstats() {
        let disks = LinuxHal::parse_diskstats(SAMPLE_DISKSTATS);
        assert_eq!(disks["sda"], 1234);
        assert_eq!(disks["sda1"], 1100);
    }

    #[test]
    fn test_parse_pid_stat_with_spaces_in_comm() {
        let content = "4242 (my (odd) vm) S 1 4242 4242 0 -1 4194560 100 0 0 0 750 250 0 0 20 0 4 0 100 0 0";
        assert_eq!(LinuxHal::parse_pid_stat(4242, content).unwrap(), (750, 250));
        assert!(LinuxHal::parse_pid_stat(1, "garbage").is_err());
    }

    #[test]
    fn test_parse_statm() {
        assert_eq!(LinuxHal::parse_statm(1, "5000 1200 300 10 0 900 0").unwrap(), 1200);
        assert!(LinuxHal::parse_statm(1, "").is_err());
    }

    fn fake_proc() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let proc_root = dir.path().join("proc");
        stdfs::create_dir_all(proc_root.join("net")).unwrap();
        stdfs::create_dir_all(proc_root.join("77")).unwrap();
        stdfs::write(proc_root.join("stat"), SAMPLE_STAT).unwrap();
        stdfs::write(proc_root.join("meminfo"), SAMPLE_MEMINFO).unwrap();
        stdfs::write(proc_root.join("net/dev"), SAMPLE_NET_DEV).unwrap();
        stdfs::write(proc_root.join("diskstats"), SAMPLE_DISKSTATS).unwrap();
        stdfs::write(
            proc_root.join("77/stat"),
            "77 (qemu) S 1 77 77 0 -1 0 0 0 0 0 40 10 0 0 20 0 1 0 1 0 0",
        )
        .unwrap();
        stdfs::write(proc_root.join("77/statm"), "1000 256 10 1 0 100 0").unwrap();

        let sys_root = dir.path().join("sys");
        stdfs::create_dir_all(sys_root.join("class/net/eth0")).unwrap();
        stdfs::create_dir_all(sys_root.join("class/block/sda")).unwrap();
        stdfs::write(sys_root.join("class/net/eth0/speed"), "1000\n").unwrap();
        stdfs::write(sys_root.join("class/block/sda/size"), "4194304\n").unwrap();
        dir
    }

    #[test]
    fn test_pre_collect_fills_snapshot() {
        let dir = fake_proc();
        let hal = LinuxHal::with_roots(dir.path().join("proc"), dir.path().join("sys"));

        // nothing hinted yet
        assert!(hal.raw_host_cpu_load().is_err());

        let mut hints = CollectorHints::new();
        hints.collect_host_cpu_load();
        hints.collect_host_ram();
        hints.collect_process_cpu(77);
        hints.collect_process_ram(77);
        hints.collect_interface("eth0");
        hints.collect_disk("sda");
        tokio_test::block_on(hal.pre_collect(&hints, 1)).unwrap();

        assert_eq!(hal.raw_host_cpu_load().unwrap().user, 10132153 + 290696);
        assert_eq!(hal.host_memory_usage().unwrap().total, 16384000);
        let proc_cpu = hal.raw_process_cpu_load(77).unwrap();
        assert_eq!((proc_cpu.user, proc_cpu.kernel), (40, 10));
        assert!(proc_cpu.host_total > 0);
        assert_eq!(hal.process_memory_usage(77).unwrap(), 256 * hal.page_kb);
        assert_eq!(hal.raw_host_network_load("eth0").unwrap().tx, 654321);
        assert_eq!(hal.raw_host_disk_load("sda").unwrap().busy_ms, 1234);
        assert_eq!(hal.host_disk_size("sda").unwrap(), 2048);
        assert!(matches!(
            hal.raw_process_cpu_load(78),
            Err(MetricsError::NotFound { .. })
        ));
        assert!(hal.host_cpu_load().unwrap_err().is_unsupported());
    }

    #[test]
    fn test_interfaces_and_link_speed() {
        let dir = fake_proc();
        let hal = LinuxHal::with_roots(dir.path().join("proc"), dir.path().join("sys"));
        let names = tokio_test::block_on(hal.interfaces()).unwrap();
        assert_eq!(names, vec!["eth0".to_string()]);
        assert_eq!(tokio_test::block_on(hal.link_speed_mbits("eth0")).unwrap(), 1000);
        assert!(tokio_test::block_on(hal.link_speed_mbits("wlan9")).is_err());
    }

    #[test]
    fn test_disks_mounted_at() {
        use std::ffi::OsStr;
        let mounts = [
            (OsStr::new("/dev/sda1"), Path::new("/")),
            (OsStr::new("/dev/nvme0n1p2"), Path::new("/home")),
            (OsStr::new("tmpfs"), Path::new("/")),
        ];
        let found = disks_mounted_at(mounts.iter().copied(), Path::new("/"));
        assert_eq!(found, vec!["sda1".to_string(), "tmpfs".to_string()]);
        assert!(disks_mounted_at(mounts.iter().copied(), Path::new("/var")).is_empty());
    }
}
