use std::net::SocketAddr;

use raftsim::api::create_router;
use raftsim::config::ServerConfig;
use raftsim::control::SimulationHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "raftsim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(
        "default run: {} nodes, seed {}, time scale {}",
        config.simulation.node_count,
        config.simulation.random_seed,
        config.time_scale
    );

    let (handle, worker) = SimulationHandle::spawn(&config);
    let app = create_router(handle);

    // Control plane on http://127.0.0.1:<port>/raft/...
    let addr = SocketAddr::from(([127, 0, 0, 1], config.listen_port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind: {e}");
            std::process::exit(1);
        });

    axum::serve(listener, app).await.unwrap_or_else(|e| {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    });

    // The router held the last handle; the worker exits on its own.
    if let Err(e) = worker.await {
        tracing::error!("simulation worker failed: {e}");
    }
}
