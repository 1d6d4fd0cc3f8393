use chrono::{DateTime, Utc};
use clap::Parser;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use perf_collector::config::Config;
use perf_collector::hal::linux::LinuxHal;
use perf_collector::{CollectorEngine, HostInventory, MachineSpec, MetricsData, ObjectId};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// One line of output per report interval.
#[derive(Serialize)]
struct Report<'a> {
    timestamp: DateTime<Utc>,
    collector: &'a str,
    #[serde(flatten)]
    data: MetricsData,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn machine_object(pid: u32) -> ObjectId {
    ObjectId::machine(format!("pid-{pid}"))
}

/// EPERM still means the process exists.
fn pid_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    !matches!(kill(Pid::from_raw(raw), None), Err(Errno::ESRCH))
}

async fn host_inventory(config: &Config, hal: &LinuxHal) -> HostInventory {
    let names = if config.net_interfaces.is_empty() {
        hal.interfaces().await.unwrap_or_else(|e| {
            warn!(error = %e, "could not list network interfaces");
            Vec::new()
        })
    } else {
        config.net_interfaces.clone()
    };
    let mut interfaces = Vec::with_capacity(names.len());
    for name in names {
        let speed = hal.link_speed_mbits(&name).await.unwrap_or_else(|e| {
            debug!(interface = %name, error = %e, "link speed unknown");
            0
        });
        interfaces.push((name, speed));
    }
    HostInventory {
        name: config.resolved_collector_id(),
        interfaces,
        disks: Vec::new(),
        filesystems: config.filesystems.clone(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.json_logs);

    let hal = Arc::new(LinuxHal::with_roots(&config.proc_root, &config.sys_root));
    let inventory = host_inventory(&config, &hal).await;
    let engine = CollectorEngine::new(hal, config.engine_settings());

    engine.register_host(&inventory)?;
    for pid in &config.monitored_pids {
        let object = machine_object(*pid);
        engine.register_machine(&MachineSpec::new(object.name(), *pid))?;
    }

    let filter = config.metric_filter()?;
    let infos = engine.setup_metrics(&filter, config.period_secs, config.sample_count)?;
    info!(
        host = %inventory.name,
        metrics = infos.len(),
        period_secs = config.period_secs,
        samples = config.sample_count,
        "collector started"
    );
    engine.spawn_sampler();

    let mut live = config.monitored_pids.clone();
    let mut report = tokio::time::interval(config.report_interval());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!(error = %e, "could not listen for ctrl-c");
                }
                info!("shutting down");
                break;
            }
            _ = report.tick() => {}
        }

        live.retain(|pid| {
            let alive = pid_alive(*pid);
            if !alive {
                engine.unregister_machine(&machine_object(*pid));
            }
            alive
        });

        let line = Report {
            timestamp: Utc::now(),
            collector: &inventory.name,
            data: engine.query_metrics_data(&filter)?,
        };
        println!("{}", serde_json::to_string(&line)?);
    }

    engine.shutdown().await;
    Ok(())
}
