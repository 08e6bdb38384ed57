use clap::Parser;
use meshfault::admin_api::{AdminApiServer, AdminState};
use meshfault::config::Config;
use meshfault::{demo, CpuStressFault, FaultManager, InjectionEngine, MemLeakFault, MetricInjector};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "meshfault", version, about)]
struct Args {
    /// Admin API port (overrides the config file)
    #[arg(short, long, env = "MESHFAULT_PORT")]
    port: Option<u16>,

    /// YAML configuration file
    #[arg(short, long, env = "MESHFAULT_CONFIG")]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "MESHFAULT_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "meshfault=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_faults(config: &Config) -> Arc<FaultManager> {
    let faults = Arc::new(match config.seed {
        Some(seed) => FaultManager::with_seed(seed),
        None => FaultManager::new(),
    });

    if let Some(leak) = &config.faults.mem_leak {
        faults.register(Arc::new(MemLeakFault::new(
            leak.alloc_size,
            leak.alloc_delay(),
        )));
    }
    if let Some(cpu) = &config.faults.cpu_stress {
        faults.register(Arc::new(CpuStressFault::new(cpu.tick(), cpu.duty_cycle)));
    }
    faults
}

fn build_engine(config: &Config, faults: &FaultManager) -> Arc<InjectionEngine> {
    let engine = Arc::new(InjectionEngine::with_gate(
        config.injection.max_rules,
        faults.gate(),
    ));
    for rule in &config.injection.rules {
        match engine.add_rule(rule.clone()) {
            Ok(id) => info!("Loaded injection rule {}", id),
            Err(e) => warn!("Skipping configured rule {:?}: {}", rule.id, e),
        }
    }
    engine
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("meshfault v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.admin.port = port;
    }
    config.validate()?;

    let faults = build_faults(&config);
    let engine = build_engine(&config, &faults);
    info!(
        faults = ?faults.list(),
        rules = engine.len(),
        service = %config.service_name,
        "Configuration loaded"
    );

    let admin_addr = config.admin.socket_addr()?;
    let admin = AdminApiServer::new(
        admin_addr,
        AdminState::new(Arc::clone(&faults), Arc::clone(&engine)),
    );

    let demo_task = match &config.demo {
        Some(demo_config) => {
            let addr: SocketAddr = format!("{}:{}", demo_config.host, demo_config.port).parse()?;
            let injector = MetricInjector::new(Arc::clone(&engine), config.service_name.clone());
            Some(tokio::spawn(async move {
                if let Err(e) = demo::run(addr, injector).await {
                    error!("Demo upstream failed: {}", e);
                }
            }))
        }
        None => None,
    };

    let result = tokio::select! {
        r = admin.run() => r,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    if let Some(task) = demo_task {
        task.abort();
    }

    let shutdown_faults = Arc::clone(&faults);
    let stopped = tokio::task::spawn_blocking(move || shutdown_faults.stop_all()).await?;
    if !stopped.is_empty() {
        info!("Stopped faults on shutdown: {:?}", stopped);
    }

    result
}
