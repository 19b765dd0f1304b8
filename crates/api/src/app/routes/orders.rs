use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};

use epro_core::{GoodsReceivedNoteId, PurchaseOrderId, PurchaseOrderItemId, RequestId};
use epro_procurement::{NewGoodsReceivedNote, NewPurchaseOrder, NewPurchaseOrderItem};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/requests/:id/orders", get(list_orders).post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/items", post(add_order_item))
        .route("/order-items/:id", delete(remove_order_item))
        .route("/orders/:id/grns", post(create_grn))
        .route("/grns/:id", get(get_grn))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    dto::JsonBody(body): dto::JsonBody<NewPurchaseOrder>,
) -> axum::response::Response {
    let request_id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(
        StatusCode::CREATED,
        services.store().create_order(request_id, body, actor.actor()).await,
    )
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let request_id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond_list(services.store().list_orders(request_id).await)
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: PurchaseOrderId = match errors::parse_id(&id, "purchase order") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(StatusCode::OK, services.store().get_order(id).await)
}

pub async fn add_order_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    dto::JsonBody(body): dto::JsonBody<NewPurchaseOrderItem>,
) -> axum::response::Response {
    let id: PurchaseOrderId = match errors::parse_id(&id, "purchase order") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(
        StatusCode::CREATED,
        services.store().add_order_item(id, body, actor.actor()).await,
    )
}

pub async fn remove_order_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: PurchaseOrderItemId = match errors::parse_id(&id, "purchase order item") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(StatusCode::OK, services.store().remove_order_item(id).await)
}

pub async fn create_grn(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    dto::JsonBody(body): dto::JsonBody<NewGoodsReceivedNote>,
) -> axum::response::Response {
    let id: PurchaseOrderId = match errors::parse_id(&id, "purchase order") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(
        StatusCode::CREATED,
        services.store().create_grn(id, body, actor.actor()).await,
    )
}

pub async fn get_grn(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: GoodsReceivedNoteId = match errors::parse_id(&id, "goods received note") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(StatusCode::OK, services.store().get_grn(id).await)
}
