use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    services::analytics::{AnalyticsService, DashboardSummary, ReportingWindow, TimeSeriesPoint},
    ApiResponse, ApiResult, AppState,
};

/// Build the admin dashboard Router scoped under `/dashboard`.
///
/// Admin-role authentication is enforced by the serving layer in front of
/// these routes.
pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(get_dashboard_stats))
        .route("/analysis", get(get_revenue_analysis))
}

/// Query parameters for the revenue analysis series.
///
/// A well-formed `startDate`/`endDate` pair overrides `timeframe`; anything
/// missing or malformed silently resolves to the trailing-year default.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct RevenueAnalysisQuery {
    /// Trailing window: weekly | monthly | quarterly | annually
    pub timeframe: Option<String>,
    /// Inclusive range start (YYYY-MM-DD)
    pub start_date: Option<String>,
    /// Inclusive range end (YYYY-MM-DD)
    pub end_date: Option<String>,
}

/// Aggregate summary for the dashboard landing page
#[utoipa::path(
    get,
    path = "/dashboard/stats",
    responses(
        (status = 200, description = "Dashboard summary retrieved successfully", body = ApiResponse<DashboardSummary>),
        (status = 500, description = "Aggregation failed")
    ),
    tag = "Dashboard"
)]
pub async fn get_dashboard_stats(State(state): State<AppState>) -> ApiResult<DashboardSummary> {
    let analytics = AnalyticsService::new(state.db);
    let summary = analytics.dashboard_summary().await?;

    Ok(Json(ApiResponse::success(summary)))
}

/// Revenue/profit time series for the chart view
#[utoipa::path(
    get,
    path = "/dashboard/analysis",
    params(RevenueAnalysisQuery),
    responses(
        (status = 200, description = "Revenue series retrieved successfully", body = ApiResponse<Vec<TimeSeriesPoint>>),
        (status = 500, description = "Aggregation failed")
    ),
    tag = "Dashboard"
)]
pub async fn get_revenue_analysis(
    State(state): State<AppState>,
    Query(params): Query<RevenueAnalysisQuery>,
) -> ApiResult<Vec<TimeSeriesPoint>> {
    let window = ReportingWindow::resolve(
        params.timeframe.as_deref(),
        params.start_date.as_deref(),
        params.end_date.as_deref(),
    );

    let analytics = AnalyticsService::new(state.db);
    let series = analytics.revenue_series(&window).await?;

    Ok(Json(ApiResponse::success(series)))
}
