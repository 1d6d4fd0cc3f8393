//! The fixed set of metric names a collector can offer.

use crate::aggregate::Aggregate;

/// Sub-metric names of every base metric kind. `*` stands for the
/// interface, disk or mount point segment.
pub const SUB_METRICS: &[&str] = &[
    "CPU/Load/User",
    "CPU/Load/Kernel",
    "CPU/Load/Idle",
    "CPU/MHz",
    "RAM/Usage/Total",
    "RAM/Usage/Used",
    "RAM/Usage/Free",
    "RAM/VMM/Used",
    "RAM/VMM/Free",
    "RAM/VMM/Ballooned",
    "RAM/VMM/Shared",
    "Net/*/Load/Rx",
    "Net/*/Load/Tx",
    "Disk/*/Load/Util",
    "Disk/*/Usage/Total",
    "FS/*/Usage/Total",
    "FS/*/Usage/Used",
    "FS/*/Usage/Free",
    "Disk/Usage/Used",
    "Net/Rate/Rx",
    "Net/Rate/Tx",
    "Guest/CPU/Load/User",
    "Guest/CPU/Load/Kernel",
    "Guest/CPU/Load/Idle",
    "Guest/RAM/Usage/Total",
    "Guest/RAM/Usage/Free",
    "Guest/RAM/Usage/Balloon",
    "Guest/RAM/Usage/Shared",
    "Guest/RAM/Usage/Cache",
    "Guest/Pagefile/Usage/Total",
];

/// Every sub-metric name bare and with each aggregate suffix.
pub fn metric_names() -> Vec<String> {
    SUB_METRICS
        .iter()
        .flat_map(|name| {
            std::iter::once(name.to_string())
                .chain(Aggregate::ALL.iter().map(move |agg| format!("{name}:{}", agg.name())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_name_has_four_forms() {
        let names = metric_names();
        assert_eq!(names.len(), SUB_METRICS.len() * 4);
        assert_eq!(&names[..4], &["CPU/Load/User", "CPU/Load/User:avg", "CPU/Load/User:min", "CPU/Load/User:max"]);
        assert!(names.iter().any(|n| n == "Net/*/Load/Rx:max"));
    }

    #[test]
    fn test_catalog_covers_registered_names() {
        use crate::collectors::{cpu, disk, memory, BaseMetric};
        use crate::filter::Filter;
        use crate::object::ObjectId;

        let host = ObjectId::host("h");
        let metrics: Vec<Box<dyn BaseMetric>> = vec![
            Box::new(cpu::HostCpuLoad::new(host.clone())),
            Box::new(memory::HostRamVmm::new(host.clone())),
            Box::new(disk::HostFilesystemUsage::new(host.clone(), "/home")),
        ];
        let catalog = Filter::from_pairs(SUB_METRICS.iter().map(|n| (None, *n))).unwrap();
        for m in &metrics {
            for sub in m.sub_metrics() {
                assert!(catalog.matches(&host, sub.name()), "{} missing", sub.name());
            }
        }
    }
}
