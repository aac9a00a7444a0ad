pub mod access;
pub mod audit;
pub mod auth;
pub mod benchmark;
pub mod cache;
pub mod chart_handlers;
pub mod column_resolver;
pub mod config;
pub mod config_db;
pub mod deadline;
pub mod error;
pub mod handlers;
pub mod migrations;
pub mod models;
pub mod orchestrator;
pub mod query_builder;
pub mod report_card_generator;
pub mod report_card_service;
pub mod sizing_engine;
pub mod trend_analyzer;

use clickhouse::Client;
use std::sync::Arc;

use audit::AuditTracker;
use cache::ChartCache;
use config_db::ConfigDb;
use orchestrator::ChartOrchestrator;
use report_card_service::ReportCardService;

#[derive(Clone)]
pub struct AppState {
    pub ch: Client,
    pub config_db: Arc<ConfigDb>,
    pub orchestrator: Arc<ChartOrchestrator>,
    pub report_cards: Arc<ReportCardService>,
    pub cache: Option<ChartCache>,
    pub audit: AuditTracker,
}
