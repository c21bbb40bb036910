use clap::Parser;
use log::{error, info};
use plugin_matter_bridge::bridge::{
    BridgeController, BridgeExit, BridgeFactory, CommandUpdater, PluginRegistry,
    signals::spawn_signal_listener,
};
use plugin_matter_bridge::config::{BridgeMode, Config, load_dotenv};
use plugin_matter_bridge::error::BridgeError;
use plugin_matter_bridge::input::SimulationPlugin;
use plugin_matter_bridge::instance_lock::InstanceLock;
use plugin_matter_bridge::matter::runtime::{MemoryRuntime, ProtocolRuntime, UdpRuntime};
use plugin_matter_bridge::storage::Storage;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Matter bridge exposing plugin devices as Matter endpoints.
#[derive(Parser, Debug)]
#[command(name = "plugin-matter-bridge", version)]
struct Cli {
    /// Bridge name, also used for the instance lock
    #[arg(long)]
    name: Option<String>,

    /// `bridge` (one aggregator node) or `childbridge` (one node per plugin)
    #[arg(long)]
    mode: Option<BridgeMode>,

    /// Operational port of the first node
    #[arg(long)]
    port: Option<u16>,

    /// Directory for persisted node contexts
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Keep node contexts in memory only
    #[arg(long)]
    ephemeral: bool,

    /// Use the in-process runtime instead of binding UDP sockets
    #[arg(long)]
    dry_run: bool,

    /// Seconds between simulated sensor changes
    #[arg(long, env = "SIM_INTERVAL_SECS", default_value_t = 30)]
    sim_interval: u64,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(name) = &self.name {
            config.bridge.name = name.clone();
        }
        if let Some(mode) = self.mode {
            config.bridge.mode = mode;
        }
        if let Some(port) = self.port {
            config.matter.port = port;
        }
        if let Some(dir) = &self.storage_dir {
            config.bridge.storage_dir = Some(dir.clone());
        }
        if self.ephemeral {
            config.bridge.storage_dir = None;
        }
    }
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() -> ExitCode {
    // Load .env file before anything else, while still single-threaded
    load_dotenv();
    init_logger();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> ExitCode {
    info!("Starting Plugin Matter Bridge");
    let mut config = Config::from_env();
    cli.apply(&mut config);
    info!("Configuration loaded:");
    info!("  Bridge Name: {}", config.bridge.name);
    info!("  Mode: {}", config.bridge.mode);
    info!("  Vendor ID: 0x{:04X}", config.matter.vendor_id);
    info!("  Product ID: 0x{:04X}", config.matter.product_id);
    info!("  Port: {}", config.matter.port);

    let _lock = match InstanceLock::acquire(&config.bridge.name) {
        Ok(lock) => lock,
        Err(e) => {
            error!("[Bridge] {}", e);
            return ExitCode::FAILURE;
        }
    };

    let storage = match &config.bridge.storage_dir {
        Some(dir) => {
            info!("  Storage: {}", dir.display());
            Storage::at(dir)
        }
        None => {
            info!("  Storage: in memory");
            Storage::in_memory()
        }
    };

    let runtime: Arc<dyn ProtocolRuntime> = if cli.dry_run {
        info!("  Runtime: in-process (dry run)");
        Arc::new(MemoryRuntime::new())
    } else {
        Arc::new(UdpRuntime::new())
    };

    let plugins =
        PluginRegistry::new().with(SimulationPlugin::new(Duration::from_secs(cli.sim_interval)));
    let updater = Arc::new(CommandUpdater::new(config.bridge.update_command.clone()));
    let factory = BridgeFactory::new(config, runtime, storage, plugins);
    let controller = BridgeController::new(factory, updater);

    let signals = match spawn_signal_listener(controller.signal()) {
        Ok(handle) => handle,
        Err(e) => {
            error!("[Bridge] Failed to install signal handlers: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("  - Press Ctrl+C to exit, send SIGHUP to restart, SIGUSR1 to update");

    let result = tokio::spawn(controller.run()).await;
    signals.abort();

    match result {
        Ok(Ok(BridgeExit::Shutdown)) => {
            info!("Plugin Matter Bridge stopped");
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!("[Bridge] {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("[Bridge] {}", BridgeError::UnhandledFault(e.to_string()));
            ExitCode::FAILURE
        }
    }
}
