use axum::routing::{get, post};
use axum::Router;
use clickhouse::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use practice_pulse::audit;
use practice_pulse::cache::{CacheConfig, ChartCache};
use practice_pulse::config::AnalyticsConfig;
use practice_pulse::config_db::ConfigDb;
use practice_pulse::handlers;
use practice_pulse::migrations;
use practice_pulse::orchestrator::ChartOrchestrator;
use practice_pulse::report_card_service::ReportCardService;
use practice_pulse::sizing_engine::{spawn_sizing_engine, SizingEngine};
use practice_pulse::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("practice_pulse=debug,tower_http=debug")))
        .init();

    let clickhouse_url = std::env::var("CLICKHOUSE_URL").unwrap_or_else(|_| "http://localhost:8123".to_string());
    let clickhouse_db = std::env::var("CLICKHOUSE_DATABASE").unwrap_or_else(|_| "practice_pulse".to_string());
    let clickhouse_user = std::env::var("CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string());
    let clickhouse_password = std::env::var("CLICKHOUSE_PASSWORD").unwrap_or_default();

    migrations::run(&clickhouse_url, &clickhouse_user, &clickhouse_password).await?;

    let ch = Client::default()
        .with_url(&clickhouse_url)
        .with_database(&clickhouse_db)
        .with_user(&clickhouse_user)
        .with_password(&clickhouse_password);

    let config_db_path = std::env::var("PRACTICE_PULSE_CONFIG_DB").unwrap_or_else(|_| "./practice_pulse_config.db".to_string());
    let config_db = Arc::new(ConfigDb::open(&config_db_path)?);
    tracing::info!("config db opened at {config_db_path}");

    let config_path = std::env::var("PRACTICE_PULSE_CONFIG").unwrap_or_else(|_| "./practice_pulse.toml".to_string());
    let config = AnalyticsConfig::load(&config_path)?;

    let audit = audit::spawn(ch.clone());
    let cache = Some(ChartCache::new(CacheConfig::from_env()));

    let query_deadline = config.query.deadline();
    let sizing_engine = Arc::new(SizingEngine::with_deadline(ch.clone(), config.sizing.clone(), query_deadline));
    spawn_sizing_engine(sizing_engine, 3600);

    let orchestrator = Arc::new(ChartOrchestrator::with_deadline(
        ch.clone(),
        config_db.clone(),
        audit.clone(),
        cache.clone(),
        query_deadline,
    ));
    let report_cards = Arc::new(ReportCardService::with_deadline(ch.clone(), cache.clone(), query_deadline));

    let state = AppState {
        ch,
        config_db,
        orchestrator,
        report_cards,
        cache,
        audit,
    };

    let app = Router::new()
        .route("/api/v1/charts/orchestrate", post(handlers::charts::orchestrate_chart))
        .route("/api/v1/report-cards/{organization_id}", get(handlers::report_cards::get_latest))
        .route("/api/v1/report-cards/{organization_id}/months", get(handlers::report_cards::available_months))
        .route("/api/v1/report-cards/{organization_id}/previous-month", get(handlers::report_cards::previous_month_summary))
        .route("/api/v1/report-cards/{organization_id}/grade-history", get(handlers::report_cards::grade_history))
        .route("/api/v1/report-cards/{organization_id}/annual-review", get(handlers::report_cards::annual_review))
        .route("/api/v1/report-cards/{organization_id}/trends", get(handlers::report_cards::trends_for_org))
        .route("/api/v1/report-cards/{organization_id}/{month}", get(handlers::report_cards::get_for_month))
        .route("/api/v1/peer-comparison", get(handlers::report_cards::peer_comparison))
        .route(
            "/api/v1/data-sources",
            get(handlers::data_sources::list).post(handlers::data_sources::create),
        )
        .route(
            "/api/v1/data-sources/{id}",
            get(handlers::data_sources::get).put(handlers::data_sources::update).delete(handlers::data_sources::delete),
        )
        .route("/api/v1/measures", get(handlers::measures::list).post(handlers::measures::create))
        .route(
            "/api/v1/measures/{id}",
            get(handlers::measures::get).put(handlers::measures::update).delete(handlers::measures::delete),
        )
        .route(
            "/api/v1/chart-definitions",
            get(handlers::chart_definitions::list).post(handlers::chart_definitions::create),
        )
        .route(
            "/api/v1/chart-definitions/{id}",
            get(handlers::chart_definitions::get)
                .put(handlers::chart_definitions::update)
                .delete(handlers::chart_definitions::delete),
        )
        .route("/healthz", get(handlers::health::healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!("practice-pulse-api listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
