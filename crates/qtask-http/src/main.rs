//! `qtask-server` — the HTTP submission front end (spec §4.6).

use std::sync::Arc;

use qtask_broker::BrokerClient;
use qtask_core::config::AppConfig;
use qtask_http::{app, AppState};
use qtask_store::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing(&config);

    let store = PgStore::connect(&config.database_url).await?;
    store.migrate().await?;
    tracing::info!("database_connected");

    // A failed broker connect at startup is logged, not fatal: submissions
    // simply 503 until the broker comes up (spec §9 / SPEC_FULL §4.6).
    let broker: Arc<dyn qtask_broker::Broker> = match BrokerClient::connect(&config.rabbitmq_url).await {
        Ok(client) => {
            tracing::info!("broker_connected");
            Arc::new(client)
        }
        Err(err) => {
            tracing::error!(error = %err, "broker_connect_failed_at_startup");
            Arc::new(UnavailableBroker)
        }
    };

    let state = AppState::new(Arc::new(store), broker);
    let cors = config.cors_origin_list();
    let router = app(state, cors.as_deref());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "qtask_server_listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("qtask_server_shut_down");
    Ok(())
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

/// Stands in for a broker that failed to connect at startup: every
/// operation reports unavailable rather than panicking the process.
struct UnavailableBroker;

#[async_trait::async_trait]
impl qtask_broker::Broker for UnavailableBroker {
    async fn publish(
        &self,
        _task_id: uuid::Uuid,
        _circuit: &str,
        _correlation_id: &str,
    ) -> Result<(), qtask_broker::BrokerError> {
        Err(qtask_broker::BrokerError::NotConnected)
    }

    async fn consume(
        &self,
        _consumer_tag: &str,
    ) -> Result<
        futures_util::stream::BoxStream<'static, Result<qtask_broker::RawDelivery, qtask_broker::BrokerError>>,
        qtask_broker::BrokerError,
    > {
        Err(qtask_broker::BrokerError::NotConnected)
    }

    async fn health(&self) -> bool {
        false
    }
}
