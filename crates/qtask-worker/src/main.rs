//! `qtask-worker` — the background consume loop (spec §4.5).

use std::sync::Arc;

use qtask_broker::BrokerClient;
use qtask_core::config::AppConfig;
use qtask_sim::{MockSimulator, SimulatorBackend};
use qtask_store::PgStore;
use qtask_worker::Worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing(&config);

    let simulator = MockSimulator;
    if let Err(err) = simulator.self_check() {
        tracing::error!(error = %err, "simulator_self_check_failed_worker_will_not_start");
        std::process::exit(1);
    }
    tracing::info!("simulator_self_check_passed");

    let store = PgStore::connect(&config.database_url).await?;
    store.migrate().await?;
    let broker = Arc::new(BrokerClient::connect(&config.rabbitmq_url).await?);
    tracing::info!("worker_connected_to_store_and_broker");

    let worker = Worker::new(Arc::new(store), broker.clone(), Arc::new(simulator));
    let result = worker.run(shutdown_signal()).await;
    drop(worker);

    tracing::info!("closing_broker_connection");
    if let Err(err) = broker.close().await {
        tracing::warn!(error = %err, "broker_close_failed");
    }

    result.map_err(Into::into)
}

fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.is_development() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown_signal_received");
}
