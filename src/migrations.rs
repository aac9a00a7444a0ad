use clickhouse::Client;

/// Ordered list of DDL statements that bring the warehouse schema up to
/// date. Every statement is idempotent (`IF NOT EXISTS`) so it's safe to
/// run on every startup.
const MIGRATIONS: &[&str] = &[
    "CREATE DATABASE IF NOT EXISTS practice_pulse",

    // Raw (practice, measure, month) observations, ingested out of band by
    // a separate pipeline. ReplacingMergeTree so a re-ingested row for the
    // same period silently supersedes the prior one instead of duplicating.
    r"CREATE TABLE IF NOT EXISTS practice_pulse.statistics_rows
(
    practice_id     Int64,
    organization_id String,
    measure_name    LowCardinality(String),
    period_date     Date,
    value           Float64,
    ingested_at     DateTime64(3) DEFAULT now64(3)
)
ENGINE = ReplacingMergeTree(ingested_at)
PARTITION BY toYYYYMM(period_date)
ORDER BY (practice_id, measure_name, period_date)
SETTINGS index_granularity = 8192",

    // One row per practice, overwritten on every sizing-engine run.
    r"CREATE TABLE IF NOT EXISTS practice_pulse.size_bucket_assignments
(
    practice_id                         Int64,
    organization_id                     String,
    bucket                              LowCardinality(String),
    monthly_charges_avg                 Float64,
    percentile_in_global_distribution   Float64,
    calculated_at                       DateTime
)
ENGINE = ReplacingMergeTree(calculated_at)
ORDER BY practice_id
SETTINGS index_granularity = 8192",

    // 3-month / 6-month / year-over-year direction and magnitude per
    // (practice, measure). Re-running the trend analyzer for a period
    // replaces the prior row for that (practice, measure, period).
    r"CREATE TABLE IF NOT EXISTS practice_pulse.trend_rows
(
    practice_id        Int64,
    organization_id    String,
    measure_name       LowCardinality(String),
    period             LowCardinality(String),
    direction          LowCardinality(String),
    percentage_change  Float64,
    calculated_at      DateTime
)
ENGINE = ReplacingMergeTree(calculated_at)
ORDER BY (practice_id, measure_name, period)
SETTINGS index_granularity = 8192",

    // One row per (practice, report_card_month). `insights` and
    // `measure_scores` carry JSON blobs decoded at the service boundary
    // rather than modeled as nested columns, matching how they're read back.
    r"CREATE TABLE IF NOT EXISTS practice_pulse.report_card_results
(
    result_id         String,
    practice_id       Int64,
    organization_id   String,
    report_card_month Date,
    generated_at      DateTime,
    overall_score     Float64,
    size_bucket       LowCardinality(String),
    percentile_rank   Float64,
    insights          String,
    measure_scores    String
)
ENGINE = ReplacingMergeTree(generated_at)
PARTITION BY toYYYYMM(report_card_month)
ORDER BY (practice_id, report_card_month)
SETTINGS index_granularity = 8192",

    // Fail-closed and other audit events. Append-only; no replacing key.
    r"CREATE TABLE IF NOT EXISTS practice_pulse.audit_events
(
    component    LowCardinality(String),
    message      String,
    severity     LowCardinality(String),
    recorded_at  DateTime64(3)
)
ENGINE = MergeTree
PARTITION BY toYYYYMM(recorded_at)
ORDER BY (recorded_at, component)
TTL toDateTime(recorded_at) + INTERVAL 2 YEAR DELETE
SETTINGS index_granularity = 8192",
];

/// Runs every statement in `MIGRATIONS` in order against `url`, logging
/// progress as it goes. Safe to call on every startup.
pub async fn run(url: &str, user: &str, password: &str) -> anyhow::Result<()> {
    let client = Client::default()
        .with_url(url)
        .with_user(user)
        .with_password(password);

    tracing::info!("running clickhouse migrations ({} statements)", MIGRATIONS.len());

    for (i, sql) in MIGRATIONS.iter().enumerate() {
        let preview: String = sql.chars().take(80).collect();
        tracing::debug!("migration {}/{}: {}...", i + 1, MIGRATIONS.len(), preview);
        client.query(sql).execute().await.map_err(|e| {
            tracing::error!("migration {}/{} failed: {e}", i + 1, MIGRATIONS.len());
            e
        })?;
    }

    tracing::info!("clickhouse migrations complete");
    Ok(())
}
