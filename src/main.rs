use assessment_backend::stores::memory::MemorySessionStore;
use assessment_backend::stores::postgres::{PgAttemptStore, PgSubmissionStore, PgTestSource};
use assessment_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    routes, AppState,
};
use assessment_backend::utils::time::SystemClock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(
        Arc::new(PgAttemptStore::new(pool.clone())),
        Arc::new(PgSubmissionStore::new(pool.clone())),
        Arc::new(PgTestSource::new(pool)),
        Arc::new(MemorySessionStore::new()),
        Arc::new(SystemClock),
        config.heartbeat_sync_secs,
        config.integrity,
    );

    // Safety net for clients that vanish without a final heartbeat: any
    // active attempt past its absolute ceiling gets force-expired and
    // auto-submitted server-side.
    {
        let state = app_state.clone();
        let sweep_interval = Duration::from_secs(config.expiry_sweep_secs);
        tokio::spawn(async move {
            loop {
                match state.attempt_service.sweep_expired().await {
                    Ok(0) => {}
                    Ok(n) => info!(expired = n, "expiry sweep force-expired attempts"),
                    Err(e) => tracing::error!(error = ?e, "expiry sweep error"),
                }
                tokio::time::sleep(sweep_interval).await;
            }
        });
    }

    let app = routes::app_router(app_state, config.public_rps, config.operator_rps)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
