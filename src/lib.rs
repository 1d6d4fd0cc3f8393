pub mod aggregate;
pub mod catalog;
pub mod collectors;
pub mod config;
pub mod engine;
pub mod errors;
pub mod filter;
pub mod guest;
pub mod hal;
pub mod metric;
pub mod object;
pub mod ring;

pub use aggregate::Aggregate;
pub use engine::{CollectorEngine, EngineSettings, HostInventory, MachineSpec};
pub use errors::{MetricsError, Result};
pub use filter::Filter;
pub use metric::{BaseMetricHandle, MetricInfo, MetricsData, SeriesInfo};
pub use object::ObjectId;
