use crate::engine::{EngineSettings, MIN_SAMPLER_INTERVAL};
use crate::errors::Result;
use crate::filter::Filter;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "perf-collector", version, about)]
pub struct Config {
    /// Name reported for the host object.
    /// if none provided, default to hostname.
    #[arg(long, env = "PERF_COLLECTOR_ID")]
    pub collector_id: Option<String>,

    /// Sampler timer interval in milliseconds (never below 1000).
    #[arg(long, env = "PERF_COLLECTOR_SAMPLER_INTERVAL_MS", default_value_t = 1000)]
    pub sampler_interval_ms: u64,

    /// Collection period of every metric in seconds; 0 leaves metrics disabled.
    #[arg(long, env = "PERF_COLLECTOR_PERIOD_SECS", default_value_t = 1)]
    pub period_secs: u32,

    /// Number of samples kept per metric.
    #[arg(long, env = "PERF_COLLECTOR_SAMPLE_COUNT", default_value_t = 10)]
    pub sample_count: usize,

    /// Comma-separated list of PIDs to monitor as workloads.
    #[arg(long, env = "PERF_COLLECTOR_MONITORED_PIDS", value_delimiter = ',')]
    pub monitored_pids: Vec<u32>,

    /// Comma-separated network interfaces; all non-loopback ones when empty.
    #[arg(long, env = "PERF_COLLECTOR_NET_INTERFACES", value_delimiter = ',')]
    pub net_interfaces: Vec<String>,

    /// Comma-separated mount points to report filesystem usage for.
    #[arg(long, env = "PERF_COLLECTOR_FILESYSTEMS", value_delimiter = ',', default_value = "/")]
    pub filesystems: Vec<String>,

    /// Metric name patterns to set up and report.
    #[arg(long, env = "PERF_COLLECTOR_METRICS", default_value = "*")]
    pub metrics: String,

    /// Report interval in milliseconds.
    #[arg(long, env = "PERF_COLLECTOR_REPORT_INTERVAL_MS", default_value_t = 5000)]
    pub report_interval_ms: u64,

    /// Enable JSON structured logging.
    #[arg(long, env = "PERF_COLLECTOR_JSON_LOGS", default_value_t = false)]
    pub json_logs: bool,

    #[arg(long, env = "PERF_COLLECTOR_PROC_ROOT", default_value = "/proc")]
    pub proc_root: PathBuf,

    #[arg(long, env = "PERF_COLLECTOR_SYS_ROOT", default_value = "/sys")]
    pub sys_root: PathBuf,
}

impl Config {
    /// get collector ID, upon failure fallback to hostname.
    pub fn resolved_collector_id(&self) -> String {
        self.collector_id.clone().unwrap_or_else(|| {
            hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown-host".to_string())
        })
    }

    pub fn sampler_interval(&self) -> Duration {
        Duration::from_millis(self.sampler_interval_ms).max(MIN_SAMPLER_INTERVAL)
    }

    /// Reports are never more frequent than samples.
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms).max(self.sampler_interval())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings::new(self.sampler_interval())
    }

    pub fn metric_filter(&self) -> Result<Filter> {
        Filter::single(&self.metrics, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::try_parse_from(["perf-collector"]).unwrap();
        assert_eq!(cfg.sampler_interval(), Duration::from_secs(1));
        assert_eq!(cfg.period_secs, 1);
        assert_eq!(cfg.sample_count, 10);
        assert_eq!(cfg.filesystems, vec!["/".to_string()]);
        assert!(cfg.monitored_pids.is_empty());
    }

    #[test]
    fn test_interval_is_clamped() {
        let cfg = Config::try_parse_from(["perf-collector", "--sampler-interval-ms", "200"]).unwrap();
        assert_eq!(cfg.sampler_interval(), MIN_SAMPLER_INTERVAL);
        assert_eq!(cfg.engine_settings().sampler_interval, MIN_SAMPLER_INTERVAL);

        let cfg = Config::try_parse_from(["perf-collector", "--report-interval-ms", "0"]).unwrap();
        assert_eq!(cfg.report_interval(), MIN_SAMPLER_INTERVAL);
    }

    #[test]
    fn test_lists_and_filter() {
        let cfg = Config::try_parse_from([
            "perf-collector",
            "--monitored-pids",
            "10,20",
            "--metrics",
            "CPU/*,RAM/Usage/Used:avg",
            "--collector-id",
            "box",
        ])
        .unwrap();
        assert_eq!(cfg.monitored_pids, vec![10, 20]);
        assert_eq!(cfg.resolved_collector_id(), "box");
        let filter = cfg.metric_filter().unwrap();
        let host = crate::object::ObjectId::host("box");
        assert!(filter.matches(&host, "CPU/Load/User"));
        assert!(filter.matches(&host, "RAM/Usage/Used:avg"));
        assert!(!filter.matches(&host, "RAM/Usage/Used"));
    }

    #[test]
    fn test_bad_filter() {
        let cfg = Config::try_parse_from(["perf-collector", "--metrics", "CPU/Load:median"]).unwrap();
        assert!(cfg.metric_filter().is_err());
    }
}
