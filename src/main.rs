use course_rooms::config::Config;
use course_rooms::state::AppState;
use course_rooms::{routes, services};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().expect("invalid configuration");
    let addr = config.bind_addr();
    let state = AppState::new(config);

    // Spawn background snapshot task if configured.
    let _snapshots = state.config.snapshot_interval.map(|interval| {
        tracing::info!(secs = interval.as_secs(), data_dir = %state.config.data_dir.display(), "periodic snapshots enabled");
        services::persistence::spawn_snapshot_task(state.clone(), interval)
    });

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    tracing::info!(%addr, "course-rooms listening");
    axum::serve(listener, app).await.expect("server failed");
}
