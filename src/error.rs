use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Centralized error taxonomy for the HTTP boundary. Batch engines use
/// `anyhow::Result` internally and only construct `AppError` once an
/// HTTP handler is involved.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("report card not found")]
    ReportCardNotFound,

    #[error("measure not found: {0}")]
    MeasureNotFound(String),

    #[error("measure already exists: {0}")]
    MeasureDuplicate(String),

    #[error("data source not found: {0}")]
    DataSourceNotFound(i64),

    #[error("chart definition not found: {0}")]
    ChartDefinitionNotFound(i64),

    #[error("no handler registered for chart type '{0}'")]
    NoHandlerForChartType(String),

    #[error("invalid chart config: {0}")]
    InvalidConfig(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("statistics collection failed: {0}")]
    StatisticsCollectionFailed(String),

    #[error("trend analysis failed: {0}")]
    TrendAnalysisFailed(String),

    #[error("query exceeded its deadline")]
    QueryTimeout,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::ReportCardNotFound => "REPORT_CARD_NOT_FOUND",
            AppError::MeasureNotFound(_) => "MEASURE_NOT_FOUND",
            AppError::MeasureDuplicate(_) => "MEASURE_DUPLICATE",
            AppError::DataSourceNotFound(_) => "DATA_SOURCE_NOT_FOUND",
            AppError::ChartDefinitionNotFound(_) => "CHART_DEFINITION_NOT_FOUND",
            AppError::NoHandlerForChartType(_) => "NO_HANDLER_FOR_CHART_TYPE",
            AppError::InvalidConfig(_) => "INVALID_CONFIG",
            AppError::InsufficientData(_) => "INSUFFICIENT_DATA",
            AppError::PermissionDenied(_) => "PERMISSION_DENIED",
            AppError::StatisticsCollectionFailed(_) => "STATISTICS_COLLECTION_FAILED",
            AppError::TrendAnalysisFailed(_) => "TREND_ANALYSIS_FAILED",
            AppError::QueryTimeout => "QUERY_TIMEOUT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::ReportCardNotFound
            | AppError::MeasureNotFound(_)
            | AppError::DataSourceNotFound(_)
            | AppError::ChartDefinitionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::MeasureDuplicate(_) => StatusCode::CONFLICT,
            AppError::NoHandlerForChartType(_)
            | AppError::InvalidConfig(_)
            | AppError::InsufficientData(_) => StatusCode::BAD_REQUEST,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::QueryTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::StatisticsCollectionFailed(_)
            | AppError::TrendAnalysisFailed(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error");
        }
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
