use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use shared::{
    ApiResponse, CreateWalletRequest, EditWalletRequest, ExcludeWalletRequest, PaginationParams,
    PoolError, RepairWalletRequest, WalletId, WalletListQuery,
};

use crate::{
    api::error_response,
    services::{AppState, WalletAdmin},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/wallets", web::post().to(create_wallet))
            .route("/wallets", web::get().to(list_wallets))
            .route("/wallets/{wallet_id}", web::get().to(get_wallet))
            .route("/wallets/{wallet_id}", web::put().to(edit_wallet))
            .route("/wallets/{wallet_id}", web::delete().to(remove_wallet))
            .route("/wallets/{wallet_id}/exclude", web::post().to(exclude_wallet))
            .route("/wallets/{wallet_id}/reactivate", web::post().to(reactivate_wallet))
            .route("/wallets/{wallet_id}/repair", web::post().to(repair_wallet))
            .route("/wallets/{wallet_id}/history", web::get().to(wallet_history))
            .route("/pool/stats", web::get().to(pool_stats))
            .route("/alerts", web::get().to(active_alerts))
            .route("/alerts/{alert_id}/ack", web::post().to(acknowledge_alert)),
    );
}

fn failure(state: &AppState, action: &str, e: &PoolError) -> HttpResponse {
    tracing::warn!("Admin: {} failed: {}", action, e);
    error_response(e, state.config.retry_after_seconds)
}

async fn create_wallet(
    state: web::Data<AppState>,
    req: web::Json<CreateWalletRequest>,
) -> impl Responder {
    tracing::info!("API: Add {} wallet {}", req.network, req.address);

    match WalletAdmin::create_wallet(&state, req.into_inner()).await {
        Ok(wallet) => HttpResponse::Created().json(ApiResponse::success(wallet)),
        Err(e) => failure(&state, "create wallet", &e),
    }
}

async fn list_wallets(
    state: web::Data<AppState>,
    query: web::Query<WalletListQuery>,
) -> impl Responder {
    match WalletAdmin::list_wallets(&state, &query).await {
        Ok(page) => HttpResponse::Ok().json(ApiResponse::success(page)),
        Err(e) => failure(&state, "list wallets", &e),
    }
}

async fn get_wallet(state: web::Data<AppState>, wallet_id: web::Path<WalletId>) -> impl Responder {
    match WalletAdmin::get_wallet(&state, wallet_id.into_inner()).await {
        Ok(wallet) => HttpResponse::Ok().json(ApiResponse::success(wallet)),
        Err(e) => failure(&state, "get wallet", &e),
    }
}

async fn edit_wallet(
    state: web::Data<AppState>,
    wallet_id: web::Path<WalletId>,
    req: web::Json<EditWalletRequest>,
) -> impl Responder {
    match WalletAdmin::edit_wallet(&state, wallet_id.into_inner(), req.into_inner()).await {
        Ok(wallet) => HttpResponse::Ok().json(ApiResponse::success(wallet)),
        Err(e) => failure(&state, "edit wallet", &e),
    }
}

async fn remove_wallet(state: web::Data<AppState>, wallet_id: web::Path<WalletId>) -> impl Responder {
    let wallet_id = wallet_id.into_inner();
    tracing::info!("API: Remove wallet {}", wallet_id);

    match WalletAdmin::remove_wallet(&state, wallet_id).await {
        Ok(wallet) => HttpResponse::Ok().json(ApiResponse::success(wallet)),
        Err(e) => failure(&state, "remove wallet", &e),
    }
}

async fn exclude_wallet(
    state: web::Data<AppState>,
    wallet_id: web::Path<WalletId>,
    req: web::Json<ExcludeWalletRequest>,
) -> impl Responder {
    let wallet_id = wallet_id.into_inner();
    tracing::info!(
        "API: Exclude wallet {} as {:?} (force: {})",
        wallet_id,
        req.status,
        req.force
    );

    match WalletAdmin::exclude_wallet(&state, wallet_id, req.into_inner()).await {
        Ok(result) => HttpResponse::Ok().json(ApiResponse::success(result)),
        Err(e) => failure(&state, "exclude wallet", &e),
    }
}

async fn reactivate_wallet(
    state: web::Data<AppState>,
    wallet_id: web::Path<WalletId>,
) -> impl Responder {
    match WalletAdmin::reactivate_wallet(&state, wallet_id.into_inner()).await {
        Ok(wallet) => HttpResponse::Ok().json(ApiResponse::success(wallet)),
        Err(e) => failure(&state, "reactivate wallet", &e),
    }
}

async fn repair_wallet(
    state: web::Data<AppState>,
    wallet_id: web::Path<WalletId>,
    req: web::Json<RepairWalletRequest>,
) -> impl Responder {
    let wallet_id = wallet_id.into_inner();
    tracing::warn!("API: Repair requested for wallet {} (confirm: {})", wallet_id, req.confirm);

    match WalletAdmin::repair_wallet(&state, wallet_id, req.confirm).await {
        Ok(wallet) => HttpResponse::Ok().json(ApiResponse::success(wallet)),
        Err(e) => failure(&state, "repair wallet", &e),
    }
}

async fn wallet_history(
    state: web::Data<AppState>,
    wallet_id: web::Path<WalletId>,
    query: web::Query<PaginationParams>,
) -> impl Responder {
    let start = std::time::Instant::now();

    match WalletAdmin::wallet_history(&state, wallet_id.into_inner(), &query).await {
        Ok(page) => {
            tracing::debug!("History query took {:?}", start.elapsed());
            HttpResponse::Ok().json(ApiResponse::success(page))
        }
        Err(e) => failure(&state, "wallet history", &e),
    }
}

async fn pool_stats(state: web::Data<AppState>) -> impl Responder {
    match WalletAdmin::pool_stats(&state).await {
        Ok(stats) => HttpResponse::Ok().json(ApiResponse::success(stats)),
        Err(e) => failure(&state, "pool stats", &e),
    }
}

#[derive(Debug, Deserialize)]
struct AlertQuery {
    #[serde(default = "default_alert_limit")]
    limit: i64,
}

fn default_alert_limit() -> i64 {
    50
}

async fn active_alerts(state: web::Data<AppState>, query: web::Query<AlertQuery>) -> impl Responder {
    match WalletAdmin::active_alerts(&state, query.limit).await {
        Ok(alerts) => HttpResponse::Ok().json(ApiResponse::success(alerts)),
        Err(e) => failure(&state, "list alerts", &e),
    }
}

async fn acknowledge_alert(state: web::Data<AppState>, alert_id: web::Path<i64>) -> impl Responder {
    let alert_id = alert_id.into_inner();
    match WalletAdmin::acknowledge_alert(&state, alert_id).await {
        Ok(true) => HttpResponse::Ok().json(ApiResponse::success(alert_id)),
        Ok(false) => HttpResponse::NotFound()
            .json(ApiResponse::<()>::error(format!("Active alert not found: {}", alert_id))),
        Err(e) => failure(&state, "acknowledge alert", &e),
    }
}
