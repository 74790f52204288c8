use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use salonbook::config::AppConfig;
use salonbook::db;
use salonbook::handlers;
use salonbook::services::calendar::http::HttpCalendarSync;
use salonbook::services::calendar::{CalendarSync, NoopCalendarSync};
use salonbook::services::clock::SystemClock;
use salonbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let calendar: Arc<dyn CalendarSync> = if config.calendar_sync_url.is_empty() {
        tracing::info!("no external calendar configured, using internal appointments only");
        Arc::new(NoopCalendarSync)
    } else {
        tracing::info!("using external calendar at {}", config.calendar_sync_url);
        Arc::new(HttpCalendarSync::new(
            config.calendar_sync_url.clone(),
            config.calendar_sync_token.clone(),
        ))
    };

    let state = Arc::new(AppState::new(
        conn,
        config.clone(),
        calendar,
        Arc::new(SystemClock),
    ));

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/availability",
            get(handlers::availability::get_availability)
                .post(handlers::availability::post_availability),
        )
        .route(
            "/api/available-dates",
            get(handlers::availability::get_available_dates)
                .post(handlers::availability::post_available_dates),
        )
        .route(
            "/api/available-dates/stream",
            get(handlers::availability::stream_available_dates),
        )
        .route(
            "/api/appointments",
            get(handlers::appointments::list_appointments)
                .post(handlers::appointments::create_appointment),
        )
        .route(
            "/api/appointments/:id",
            get(handlers::appointments::get_appointment),
        )
        .route(
            "/api/appointments/:id/cancel",
            post(handlers::appointments::cancel_appointment),
        )
        .route(
            "/api/appointments/:id/status",
            post(handlers::appointments::update_status),
        )
        .route(
            "/api/appointments/:id/ics",
            get(handlers::appointments::download_ics),
        )
        .route(
            "/api/admin/tenants/:id",
            get(handlers::admin::get_tenant).post(handlers::admin::update_tenant),
        )
        .route(
            "/api/admin/tenants/:id/staff",
            post(handlers::admin::upsert_staff),
        )
        .route(
            "/api/admin/tenants/:id/services",
            post(handlers::admin::upsert_service),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
