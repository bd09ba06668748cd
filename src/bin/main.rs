use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use busbridge::config::{APP_NAME, Settings};
use busbridge::manager::DeviceManager;
use busbridge::rpc::methods::boxed;
use busbridge::{ConnectionRegistry, Dispatcher, MethodTable, RpcClient, state_channel};

/// Bridge RPC calls onto MQTT pub/sub and scan serial buses through the
/// remote gateway.
#[derive(Parser)]
#[command(name = APP_NAME)]
#[command(version)]
struct Cli {
    /// Broker endpoint as host:port
    #[arg(long)]
    broker: Option<String>,

    /// Path to a TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port to scan (repeatable; replaces the default list)
    #[arg(long = "port")]
    ports: Vec<String>,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let mut settings = match cli.config {
        Some(path) => match Settings::load(&path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        None => Settings::default(),
    };
    if let Some(broker) = cli.broker {
        settings.broker = broker;
    }
    if !cli.ports.is_empty() {
        settings.ports = cli.ports;
    }

    if let Err(e) = run(settings).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(settings: Settings) -> busbridge::RpcResult<()> {
    let registry = Arc::new(ConnectionRegistry::with_mqtt(APP_NAME));
    let transport = registry.get_or_create(&settings.broker)?;
    let client = RpcClient::new(transport.clone())?;

    let (state_handle, state_publisher) = state_channel(transport.clone(), &settings.state_topic);
    let manager = DeviceManager::new(client.clone(), state_handle, settings.ports.clone());

    let mut methods = MethodTable::new();
    {
        let manager = manager.clone();
        methods.register("bus_scan", "scan", move |_params| {
            let manager = manager.clone();
            boxed(async move { manager.scan_serial_bus().await })
        });
    }
    methods.register("bus_scan", "test", |_params| {
        boxed(async { Ok(serde_json::json!("Result of short-running task")) })
    });

    let dispatcher = Dispatcher::new(
        transport,
        client,
        Arc::new(methods),
        APP_NAME,
        settings.max_tasks,
        tokio::runtime::Handle::current(),
    );
    dispatcher.setup()?;
    tokio::spawn(state_publisher.run());

    // Best-effort shutdown: in-flight tasks are abandoned, not drained.
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            shutdown.cancel();
        }
    });

    log::info!(target: "busbridge", "serving on {}", settings.broker);
    shutdown.cancelled().await;
    log::info!(target: "busbridge", "shutting down");
    registry.close_all();
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            log::warn!(target: "busbridge", "cannot install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
