//! Orders service entry point.
//!
//! Connects to the message broker, picks the order store, then runs the
//! queue consumer and the HTTP server side by side until SIGINT or SIGTERM.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::routes::orders::AppState;
use messaging::{BrokerConnection, OrderIngestionConsumer, SignedEventPublisher, TokenIssuer};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Check the event token secret
    let token_issuer = match config.token_secret() {
        Ok(secret) => TokenIssuer::new(secret),
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    // 4. Connect to the broker
    let broker = Arc::new(BrokerConnection::new(config.broker_config()));
    if let Err(e) = broker.connect().await {
        tracing::error!(error = %e, "failed to connect to message broker");
        std::process::exit(1);
    }

    // 5. Pick the order store
    match config.database_url.clone() {
        Some(url) => {
            let store = match PostgresOrderStore::connect(&url).await {
                Ok(store) => store,
                Err(e) => {
                    tracing::error!(error = %e, "failed to connect to database");
                    std::process::exit(1);
                }
            };
            if let Err(e) = store.run_migrations().await {
                tracing::error!(error = %e, "failed to run database migrations");
                std::process::exit(1);
            }
            run(config, store, broker, token_issuer, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            run(config, InMemoryOrderStore::new(), broker, token_issuer, metrics_handle).await;
        }
    }
}

async fn run<S>(
    config: Config,
    store: S,
    broker: Arc<BrokerConnection>,
    token_issuer: TokenIssuer,
    metrics_handle: PrometheusHandle,
) where
    S: OrderStore + Clone + 'static,
{
    let publisher = Arc::new(SignedEventPublisher::new(Arc::clone(&broker), token_issuer));

    // 6. Start the queue consumer
    let consumer = Arc::new(OrderIngestionConsumer::new(
        store.clone(),
        Arc::clone(&publisher),
        Arc::clone(&broker),
        config.consumer_config(),
    ));
    let consumer_task = tokio::spawn(async move {
        match consumer.start().await {
            // Shutdown aborts this task, so a normal return means the broker
            // ended the delivery stream.
            Ok(()) => tracing::error!(
                "order ingestion consumer stopped unexpectedly, orders.create is no longer consumed"
            ),
            Err(e) => {
                tracing::error!(error = %e, "order ingestion consumer failed to start");
                std::process::exit(1);
            }
        }
    });

    // 7. Build the application
    let state = Arc::new(AppState::new(store, publisher));
    let app = api::create_app(state, metrics_handle);

    // 8. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting orders API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 9. Stop consuming and release the broker connection
    consumer_task.abort();
    if let Err(e) = broker.close().await {
        tracing::warn!(error = %e, "failed to close broker connection");
    }

    tracing::info!("server shut down gracefully");
}
