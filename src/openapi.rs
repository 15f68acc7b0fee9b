use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::services::analytics::{CategorySales, DashboardSummary, TimeSeriesPoint, TopSellerRow};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront Admin API",
        description = "Back-office analytics for the storefront: dashboard summary, best sellers, category revenue and the revenue/profit time series."
    ),
    paths(
        crate::handlers::dashboard::get_dashboard_stats,
        crate::handlers::dashboard::get_revenue_analysis,
    ),
    components(schemas(DashboardSummary, TimeSeriesPoint, TopSellerRow, CategorySales)),
    tags(
        (name = "Dashboard", description = "Admin sales analytics endpoints")
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at `/docs`, serving the spec from
/// `/api-docs/openapi.json`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
