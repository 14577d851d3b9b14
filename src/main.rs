use axum::Router;
use chrono::{Duration, Utc};
use mindguard_activities::config::Config;
use mindguard_activities::db::{self, ActivityStore, SqliteStore};
use mindguard_activities::domain::engine::RecommendationEngine;
use mindguard_activities::services::recommendations::RecommendationService;
use mindguard_activities::state::{AppState, SharedState};
use mindguard_activities::web;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Feedback sessions older than this are dropped by the cleanup job.
const SESSION_MAX_AGE_HOURS: i64 = 12;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = db::connect(&config.database_url).await.map_err(|e| {
        tracing::error!("Failed to connect to database: {}", e);
        e
    })?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    db::migrate(&pool).await.map_err(|e| {
        tracing::error!("Failed to run database migrations: {}", e);
        e
    })?;
    tracing::info!("Database migrations completed");

    let store: Arc<dyn ActivityStore> = Arc::new(SqliteStore::new(pool));
    let engine = RecommendationEngine::new(config.activities.clone(), Arc::new(config.swarm.clone()));
    let service = RecommendationService::load(
        engine,
        store,
        config.history_depth,
        config.stale_removal_after,
    )
    .await?;

    // Stale suspensions are restored before the first recommendation cycle.
    let restored = service.reconcile_stale_removals(Utc::now()).await?;
    tracing::info!("Startup reconciliation restored {} activities", restored.len());

    let shared: SharedState = Arc::new(AppState::new(config, service));

    let scheduler = JobScheduler::new().await?;

    if let Some(schedule) = shared.config.reconcile_cron.clone() {
        let shared_for_reconcile = shared.clone();
        scheduler
            .add(Job::new_async(schedule.as_str(), move |_uuid, _l| {
                let state = shared_for_reconcile.clone();
                Box::pin(async move {
                    if let Err(e) = state.recommendations.reconcile_stale_removals(Utc::now()).await {
                        tracing::error!("Failed to reconcile stale removals: {}", e);
                    }
                })
            })?)
            .await?;
    }

    let shared_for_cleanup = shared.clone();
    scheduler
        .add(Job::new_async("0 30 * * * *", move |_uuid, _l| {
            let state = shared_for_cleanup.clone();
            Box::pin(async move {
                let now = Utc::now();
                let mut sessions = state.feedback_sessions.write().await;
                let before_count = sessions.len();
                sessions.retain(|_, s| !s.is_expired(now, Duration::hours(SESSION_MAX_AGE_HOURS)));
                let dropped = before_count - sessions.len();
                if dropped > 0 {
                    tracing::info!("Cleaned up {} abandoned feedback sessions", dropped);
                }
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!("Scheduler started:");
    match &shared.config.reconcile_cron {
        Some(schedule) => tracing::info!("  - Stale removal reconciliation: {}", schedule),
        None => tracing::info!("  - Stale removal reconciliation: startup only"),
    }
    tracing::info!("  - Feedback session cleanup: hourly");

    let app = Router::new()
        .merge(web::routes(shared.clone()))
        .layer(TraceLayer::new_for_http());

    let addr = shared.config.bind_addr.clone();
    tracing::info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
