use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() {
    if let Err(err) = authority::telemetry::setup_logging() {
        eprintln!("cannot install logger: {err}");
    }

    let state = match authority::initialize_state().await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "cannot start server");
            std::process::exit(1);
        },
    };

    let port = state.config.port;
    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(port, error = %err, "cannot bind port");
            std::process::exit(1);
        },
    };

    tracing::info!(port, "server started");

    if let Err(err) = axum::serve(listener, authority::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %err, "server stopped unexpectedly");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
