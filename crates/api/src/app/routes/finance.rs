use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};

use epro_core::{FinanceCodesId, ItemId, RequestId};
use epro_procurement::NewFinanceCodes;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route(
            "/requests/:id/default-finance-codes/apply",
            post(apply_default_finance_codes),
        )
        .route("/items/:id/finance-codes", get(list_finance_codes).post(add_finance_codes))
        .route(
            "/finance-codes/:id",
            patch(update_finance_codes).delete(delete_finance_codes),
        )
}

pub async fn apply_default_finance_codes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let request_id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond_list(
        services
            .store()
            .apply_default_finance_codes(request_id, actor.actor())
            .await,
    )
}

pub async fn add_finance_codes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    dto::JsonBody(body): dto::JsonBody<NewFinanceCodes>,
) -> axum::response::Response {
    let item_id: ItemId = match errors::parse_id(&id, "item") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(
        StatusCode::CREATED,
        services.store().add_finance_codes(item_id, body, actor.actor()).await,
    )
}

/// Splits of an item together with their allocation total.
pub async fn list_finance_codes(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id: ItemId = match errors::parse_id(&id, "item") {
        Ok(v) => v,
        Err(r) => return r,
    };
    let splits = match services.store().list_finance_codes(item_id).await {
        Ok(v) => v,
        Err(e) => return errors::store_error_to_response(e),
    };
    let total = match services.store().allocation_total(item_id).await {
        Ok(v) => v,
        Err(e) => return errors::store_error_to_response(e),
    };
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "items": splits,
            "allocation_total": total,
        })),
    )
        .into_response()
}

pub async fn update_finance_codes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    dto::JsonBody(body): dto::JsonBody<NewFinanceCodes>,
) -> axum::response::Response {
    let id: FinanceCodesId = match errors::parse_id(&id, "finance codes") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(
        StatusCode::OK,
        services.store().update_finance_codes(id, body, actor.actor()).await,
    )
}

pub async fn delete_finance_codes(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: FinanceCodesId = match errors::parse_id(&id, "finance codes") {
        Ok(v) => v,
        Err(r) => return r,
    };
    match services.store().delete_finance_codes(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
