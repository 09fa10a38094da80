use pinboard::{
    routes,
    server::run_server,
    setup::{setup_sentry, setup_tracing},
    state::AppState,
};
use tracing::info;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    // A missing .env is fine, the environment may already be set up
    let _ = dotenvy::dotenv();

    // Initialize Sentry for error tracking
    let _sentry_guard = setup_sentry();

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()?
        .block_on(async { run_application().await })
}

async fn run_application() -> color_eyre::Result<()> {
    setup_tracing("pinboard")?;

    let app_state = AppState::from_env().await?;
    info!(version = app_state.version(), "Starting pinboard");

    let port = app_state.config.port;
    let router = routes::routes(app_state)?;

    run_server(router, port).await
}
