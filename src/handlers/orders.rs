use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::OrderStatus,
    errors::ServiceError,
    services::orders::CreateOrderRequest,
    ApiResponse, AppState, ListQuery,
};

const USER_ID_HEADER: &str = "x-user-id";

fn acting_user(headers: &HeaderMap) -> Result<Uuid, ServiceError> {
    let raw = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ServiceError::InvalidInput(format!("Missing {} header", USER_ID_HEADER))
        })?;
    Uuid::parse_str(raw)
        .map_err(|_| ServiceError::InvalidInput(format!("Invalid {} header", USER_ID_HEADER)))
}

fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(raw)
        .map_err(|_| ServiceError::InvalidInput(format!("Unknown order status: {}", raw)))
}

/// POST /orders
pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let user_id = acting_user(&headers)?;
    let order = state.services.orders.create_order(user_id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// GET /orders
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state
        .services
        .orders
        .list_orders(query.page(), query.per_page(state.config.default_page_size))
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// GET /orders/status/{status}
pub async fn list_orders_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = parse_status(&status)?;
    let page = state
        .services
        .orders
        .list_orders_by_status(
            status,
            query.page(),
            query.per_page(state.config.default_page_size),
        )
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

#[derive(Debug, Deserialize)]
pub struct UserOrdersQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub status: Option<String>,
}

/// GET /orders/user/{user_id}
pub async fn list_user_orders(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<UserOrdersQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let list = ListQuery {
        page: query.page,
        per_page: query.per_page,
    };
    let page = list.page();
    let per_page = list.per_page(state.config.default_page_size);
    let orders = match query.status.as_deref() {
        Some(raw) => {
            let status = parse_status(raw)?;
            state
                .services
                .orders
                .list_user_orders_by_status(user_id, status, page, per_page)
                .await?
        }
        None => {
            state
                .services
                .orders
                .list_user_orders(user_id, page, per_page)
                .await?
        }
    };
    Ok(Json(ApiResponse::success(orders)))
}

/// GET /orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get_order(order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// GET /orders/{id}/details
pub async fn get_order_details(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    // 404 for unknown orders rather than an empty detail list.
    state.services.orders.get_order(order_id).await?;
    let details = state.services.orders.get_order_details(order_id).await?;
    Ok(Json(ApiResponse::success(details)))
}

/// GET /orders/payment-ref/{payment_ref}
pub async fn get_order_by_payment_ref(
    State(state): State<AppState>,
    Path(payment_ref): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .find_by_payment_ref(&payment_ref)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("No order with payment reference {}", payment_ref))
        })?;
    Ok(Json(ApiResponse::success(order)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// PUT /orders/{id}/status
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let target = parse_status(&request.status)?;
    let order = state
        .services
        .order_status
        .transition(order_id, target)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}
