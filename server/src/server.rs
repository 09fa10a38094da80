use axum::{extract::Request, Router};
use sentry_tower::{NewSentryLayer, SentryHttpLayer};
use tokio::net::TcpListener;
use tracing::info;

/// Serve the router on `0.0.0.0:port` until the process is stopped
pub async fn run_server(routes: Router, port: u16) -> color_eyre::Result<()> {
    let app = routes
        .layer(SentryHttpLayer::with_transaction())
        .layer(NewSentryLayer::<Request>::new_from_top());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(&addr).await?;

    info!("Listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
