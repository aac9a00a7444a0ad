use chrono::{Datelike, NaiveDate};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use practice_pulse::benchmark::StaticBenchmarkProvider;
use practice_pulse::config::AnalyticsConfig;
use practice_pulse::config_db::ConfigDb;
use practice_pulse::migrations;
use practice_pulse::report_card_generator::ReportCardGenerator;
use practice_pulse::trend_analyzer::TrendAnalyzer;

/// Drives trend analysis and report-card generation outside the request
/// path. One month at a time; cross-month parallelism is permitted by
/// the underlying engines but this runner takes the simpler sequential
/// option.
#[derive(Parser, Debug)]
struct Args {
    /// Report-card month to generate, YYYY-MM-01. Defaults to the start
    /// of the current month.
    #[arg(long)]
    month: Option<NaiveDate>,

    /// Regenerate a single practice instead of the whole month.
    #[arg(long)]
    practice_id: Option<i64>,

    /// How many trailing months to backfill when `--month` is omitted.
    #[arg(long, default_value_t = 1)]
    backfill_months: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("practice_pulse=info")))
        .init();

    let args = Args::parse();

    let clickhouse_url = std::env::var("CLICKHOUSE_URL").unwrap_or_else(|_| "http://localhost:8123".to_string());
    let clickhouse_db = std::env::var("CLICKHOUSE_DATABASE").unwrap_or_else(|_| "practice_pulse".to_string());
    let clickhouse_user = std::env::var("CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string());
    let clickhouse_password = std::env::var("CLICKHOUSE_PASSWORD").unwrap_or_default();

    migrations::run(&clickhouse_url, &clickhouse_user, &clickhouse_password).await?;

    let ch = clickhouse::Client::default()
        .with_url(&clickhouse_url)
        .with_database(&clickhouse_db)
        .with_user(&clickhouse_user)
        .with_password(&clickhouse_password);

    let config_db_path = std::env::var("PRACTICE_PULSE_CONFIG_DB").unwrap_or_else(|_| "./practice_pulse_config.db".to_string());
    let config_db = Arc::new(ConfigDb::open(&config_db_path)?);
    tracing::info!("config db opened at {config_db_path}");

    let config_path = std::env::var("PRACTICE_PULSE_CONFIG").unwrap_or_else(|_| "./practice_pulse.toml".to_string());
    let config = AnalyticsConfig::load(&config_path)?;

    let query_deadline = config.query.deadline();
    let generator = ReportCardGenerator::with_deadline(
        ch.clone(),
        config_db.clone(),
        config.scoring.clone(),
        config.sizing.clone(),
        Arc::new(StaticBenchmarkProvider::empty()),
        query_deadline,
    );
    let trend_analyzer = TrendAnalyzer::with_deadline(ch.clone(), config.trend.clone(), query_deadline);

    if let Some(practice_id) = args.practice_id {
        let month = args.month.unwrap_or_else(current_month_start);
        tracing::info!("regenerating practice {practice_id} for {month}");
        generator.generate_for_practice(practice_id, month).await?;
        tracing::info!("regeneration complete");
        return Ok(());
    }

    let months: Vec<NaiveDate> = match args.month {
        Some(month) => vec![month],
        None => (0..args.backfill_months)
            .map(|i| current_month_start() - chrono::Months::new(i))
            .collect(),
    };

    for month in months {
        tracing::info!("running trend analysis for {month}");
        let measures = config_db.list_active_measures()?;
        let trend_count = trend_analyzer.run(month, &measures).await?;
        tracing::info!("trend analysis wrote {trend_count} rows");

        tracing::info!("generating report cards for {month}");
        let summary = generator.generate_month(month).await?;
        tracing::info!(
            "report card generation complete: {} succeeded, {} failed",
            summary.succeeded,
            summary.failed.len()
        );
        for (practice_id, error) in summary.failed.iter().take(3) {
            tracing::warn!("practice {practice_id} failed: {error}");
        }
    }

    Ok(())
}

fn current_month_start() -> NaiveDate {
    let today = chrono::Utc::now().date_naive();
    NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today)
}
