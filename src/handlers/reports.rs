use axum::{extract::State, response::IntoResponse, Json};

use crate::{errors::ServiceError, ApiResponse, AppState};

/// GET /reports/total-sales
pub async fn total_sales(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let total = state.services.orders.total_sales().await?;
    Ok(Json(ApiResponse::success(total)))
}

/// GET /reports/sales-by-category
pub async fn sales_by_category(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let sales = state.services.orders.sales_by_category().await?;
    Ok(Json(ApiResponse::success(sales)))
}
