use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Router,
};

use epro_core::{ItemId, RequestId};
use epro_procurement::{ItemPatch, NewItem};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/requests/:id/items", get(list_items).post(add_item))
        .route(
            "/items/:id",
            get(get_item).patch(update_item).delete(delete_item),
        )
        .route(
            "/items/:id/default-finance-codes",
            put(set_default_finance_item).delete(unset_default_finance_item),
        )
}

pub async fn add_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    dto::JsonBody(body): dto::JsonBody<NewItem>,
) -> axum::response::Response {
    let request_id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(
        StatusCode::CREATED,
        services.store().add_item(request_id, body, actor.actor()).await,
    )
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let request_id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond_list(services.store().list_items(request_id).await)
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ItemId = match errors::parse_id(&id, "item") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(StatusCode::OK, services.store().get_item(id).await)
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    dto::JsonBody(body): dto::JsonBody<ItemPatch>,
) -> axum::response::Response {
    let id: ItemId = match errors::parse_id(&id, "item") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(
        StatusCode::OK,
        services.store().update_item(id, body, actor.actor()).await,
    )
}

pub async fn delete_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ItemId = match errors::parse_id(&id, "item") {
        Ok(v) => v,
        Err(r) => return r,
    };
    match services.store().delete_item(id).await {
        Ok(removed) => {
            services.attachments().cleanup(&removed).await;
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn set_default_finance_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ItemId = match errors::parse_id(&id, "item") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(
        StatusCode::OK,
        services.store().set_default_finance_item(id, actor.actor()).await,
    )
}

pub async fn unset_default_finance_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ItemId = match errors::parse_id(&id, "item") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(
        StatusCode::OK,
        services.store().unset_default_finance_item(id, actor.actor()).await,
    )
}
