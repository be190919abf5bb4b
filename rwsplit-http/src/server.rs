use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use rwsplit::store::{MemoryStore, SchemeConnector};
use rwsplit::{Supervisor, TopologyConfig};
use rwsplit_replication::{FollowerFeed, HttpConnector, StoreNodeConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::handlers::{
    banner, health, internal, list_requests, probe_replication, replication_status, server_info,
    stats, AppState, StoreNodeState,
};
use crate::middleware::{allow_private_network, stamp_server_id};

/// Install the global subscriber once. Later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Routes of an application server instance.
pub fn app_router(state: Arc<AppState>) -> Router {
    let server_id = HeaderValue::from_str(&state.server_id)
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"));

    Router::new()
        .route("/health", get(health))
        .route("/api/", get(banner))
        .route("/api/server-info", get(server_info))
        .route("/api/stats", get(stats))
        .route("/api/requests", get(list_requests))
        .route("/api/replication/status", get(replication_status))
        .route("/api/replication/probe", post(probe_replication))
        .with_state(state)
        .layer(middleware::from_fn(
            move |request: axum::extract::Request, next: middleware::Next| {
                stamp_server_id(server_id.clone(), request, next)
            },
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive().max_age(Duration::from_secs(86400)))
        .layer(middleware::from_fn(allow_private_network))
}

/// Internal routes of a store node.
pub fn store_router(state: Arc<StoreNodeState>) -> Router {
    Router::new()
        .route("/internal/ping", get(internal::ping))
        .route("/internal/write", post(internal::write))
        .route("/internal/replicate", post(internal::replicate))
        .route("/internal/read", post(internal::read))
        .route("/internal/status", get(internal::status))
        .route("/internal/online", post(internal::set_online))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Connector for `http://` and `https://` store addresses.
pub fn http_connector(op_timeout: Duration) -> Arc<SchemeConnector> {
    let http = HttpConnector::new(op_timeout);
    Arc::new(
        SchemeConnector::new()
            .with("http", Arc::new(http.clone()))
            .with("https", Arc::new(http)),
    )
}

/// Run an application server until ctrl-c or SIGTERM, then release every
/// store connection.
pub async fn serve_app(
    config: TopologyConfig,
    bind_addr: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    tracing::info!(
        "Starting application server {} (master={}, replicas={})",
        config.server_id,
        config.master.identity,
        config.replicas.len()
    );

    let connector = http_connector(config.op_timeout());
    let supervisor = Supervisor::start(config, connector).await?;
    let app = app_router(AppState::new(Arc::clone(&supervisor)));

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Application server {} listening on {}", supervisor.server_id(), bind_addr);

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    supervisor.shutdown().await;
    served?;
    Ok(())
}

/// Run a store node until ctrl-c or SIGTERM.
pub async fn serve_store(
    config: StoreNodeConfig,
    op_timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let store = MemoryStore::new(config.node_id.as_str());
    let feed = FollowerFeed::new(&config, op_timeout);
    if feed.follower_count() > 0 {
        tracing::info!(
            "Forwarding writes to {} followers after {:?}",
            feed.follower_count(),
            feed.lag()
        );
    } else {
        tracing::info!("No followers configured");
    }

    let state = Arc::new(StoreNodeState {
        node_id: config.node_id.clone(),
        store,
        feed,
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Store node {} listening on {}", config.node_id, config.bind_addr);

    axum::serve(listener, store_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutting down gracefully");
}
