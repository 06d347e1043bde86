use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use shared::{
    ApiResponse, CreateOrderRequest, PoolError, ResolveOrderRequest, SubmitHashRequest,
};
use uuid::Uuid;

use crate::{api::error_response, services::AppState};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/orders")
            .route("", web::post().to(create_order))
            .route("/{order_id}", web::get().to(get_order))
            .route("/{order_id}/retry", web::post().to(retry_assignment))
            .route("/{order_id}/hash", web::post().to(submit_hash))
            .route("/{order_id}/resolve", web::post().to(resolve_order)),
    );
}

fn failure(state: &AppState, action: &str, e: &PoolError) -> HttpResponse {
    if e.is_retryable() {
        tracing::debug!("{} deferred: {}", action, e);
    } else {
        tracing::warn!("{} failed: {}", action, e);
    }
    error_response(e, state.orders.retry_after_seconds())
}

async fn create_order(
    state: web::Data<AppState>,
    req: web::Json<CreateOrderRequest>,
) -> impl Responder {
    tracing::info!("API: Create order for user {} package {}", req.user_id, req.package_id);

    match state
        .orders
        .create_order(&req.user_id, &req.package_id, req.amount, Utc::now())
    {
        Ok(view) => HttpResponse::Created().json(ApiResponse::success(view)),
        Err(e) => failure(&state, "Create order", &e),
    }
}

/// Resolved orders leave memory after a while; fall back to the store.
async fn get_order(state: web::Data<AppState>, order_id: web::Path<Uuid>) -> impl Responder {
    let order_id = order_id.into_inner();
    let now = Utc::now();

    match state.orders.get_order(order_id, now) {
        Ok(view) => HttpResponse::Ok().json(ApiResponse::success(view)),
        Err(PoolError::OrderNotFound(_)) => match state.database.get_order(order_id).await {
            Ok(Some(order)) => {
                HttpResponse::Ok().json(ApiResponse::success(state.orders.view(&order, now)))
            }
            Ok(None) => failure(&state, "Get order", &PoolError::OrderNotFound(order_id)),
            Err(e) => {
                tracing::error!("Failed to load order {}: {}", order_id, e);
                failure(&state, "Get order", &PoolError::PersistenceFailure(e.to_string()))
            }
        },
        Err(e) => failure(&state, "Get order", &e),
    }
}

async fn retry_assignment(state: web::Data<AppState>, order_id: web::Path<Uuid>) -> impl Responder {
    match state.orders.retry_assignment(order_id.into_inner(), Utc::now()) {
        Ok(view) => HttpResponse::Ok().json(ApiResponse::success(view)),
        Err(e) => failure(&state, "Retry assignment", &e),
    }
}

async fn submit_hash(
    state: web::Data<AppState>,
    order_id: web::Path<Uuid>,
    req: web::Json<SubmitHashRequest>,
) -> impl Responder {
    let order_id = order_id.into_inner();
    tracing::info!("API: Submit hash for order {}", order_id);

    match state.orders.submit_hash(order_id, &req.tx_hash, Utc::now()) {
        Ok(view) => HttpResponse::Ok().json(ApiResponse::success(view)),
        Err(e) => failure(&state, "Submit hash", &e),
    }
}

async fn resolve_order(
    state: web::Data<AppState>,
    order_id: web::Path<Uuid>,
    req: web::Json<ResolveOrderRequest>,
) -> impl Responder {
    let order_id = order_id.into_inner();
    tracing::info!("API: Resolve order {} as {:?}", order_id, req.outcome);

    match state.orders.resolve_order(order_id, req.outcome, Utc::now()) {
        Ok(view) => {
            state.cache.invalidate_pool_stats().await;
            HttpResponse::Ok().json(ApiResponse::success(view))
        }
        Err(e) => failure(&state, "Resolve order", &e),
    }
}
