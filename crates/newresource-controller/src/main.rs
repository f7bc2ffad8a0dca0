//! newresource controller
//!
//! - Loads `newresource.yaml` (or the path given as the first argument)
//! - Registers the reconcile metric set once; a collision aborts startup
//! - Runs the controller against the in-memory store
//! - Serves /healthz, /readyz, /metrics until Ctrl-C

use std::net::SocketAddr;

use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use newresource_controller::{app_state, config, router};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "newresource.yaml".to_string());
    let cfg = config::load_from_file(&path).expect("config load failed");
    let listen: SocketAddr = cfg
        .metrics
        .listen
        .parse()
        .expect("metrics.listen must be a valid SocketAddr");

    let state = app_state::AppState::new(cfg).expect("metrics registration failed");
    let controller = state.build_controller().expect("watch registration failed");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(controller.run(shutdown_rx));

    let app = router::build_router(state.clone());
    tracing::info!(%listen, "newresource-controller starting");
    let listener = tokio::net::TcpListener::bind(listen).await.expect("failed to bind");

    let draining = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
            draining.set_draining();
            let _ = shutdown_tx.send(true);
        })
        .await
        .expect("server failed");

    match running.await {
        Ok(Ok(())) => tracing::info!("controller stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "controller failed"),
        Err(e) => tracing::error!(error = %e, "controller task aborted"),
    }
}
