use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tracing::info;

use epro_core::{OfficeId, RequestId};
use epro_procurement::{
    Assignment, NewManualLogEntry, NewPurchaseRequest, RequestPatch, StatusTransition,
};

use crate::app::routes::common::required_actor;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/requests", post(create_request).get(list_requests))
        .route(
            "/requests/:id",
            get(get_request).patch(update_request).delete(delete_request),
        )
        .route("/requests/:id/transitions", post(transition_request))
        .route("/requests/:id/assignment", post(assign_request))
        .route("/requests/:id/cancellation-request", post(request_cancellation))
        .route("/requests/:id/log", get(request_log).post(add_log_entry))
}

pub async fn create_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    dto::JsonBody(body): dto::JsonBody<NewPurchaseRequest>,
) -> axum::response::Response {
    dto::respond(
        StatusCode::CREATED,
        services.store().create_request(body, actor.actor()).await,
    )
}

pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListRequestsQuery>,
) -> axum::response::Response {
    let office_id: Option<OfficeId> = match query.office_id.as_deref() {
        Some(raw) => match errors::parse_id(raw, "office") {
            Ok(v) => Some(v),
            Err(r) => return r,
        },
        None => None,
    };
    dto::respond_list(services.store().list_requests(office_id).await)
}

pub async fn get_request(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(StatusCode::OK, services.store().get_request(id).await)
}

pub async fn update_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    dto::JsonBody(body): dto::JsonBody<RequestPatch>,
) -> axum::response::Response {
    let id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(
        StatusCode::OK,
        services.store().update_request(id, body, actor.actor()).await,
    )
}

pub async fn delete_request(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(r) => return r,
    };
    match services.store().delete_request(id).await {
        Ok(removed) => {
            services.attachments().cleanup(&removed).await;
            info!(request_id = %id, files = removed.attachment_paths.len(), "purchase request deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn transition_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    dto::JsonBody(body): dto::JsonBody<StatusTransition>,
) -> axum::response::Response {
    let id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(r) => return r,
    };
    let actor = match required_actor(&actor) {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(
        StatusCode::OK,
        services.store().transition_request(id, body, actor).await,
    )
}

pub async fn assign_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    dto::JsonBody(body): dto::JsonBody<Assignment>,
) -> axum::response::Response {
    let id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(
        StatusCode::OK,
        services.store().assign_request(id, body, actor.actor()).await,
    )
}

pub async fn request_cancellation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(r) => return r,
    };
    let actor = match required_actor(&actor) {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(
        StatusCode::OK,
        services.store().request_cancellation(id, actor).await,
    )
}

pub async fn request_log(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond_list(services.store().request_log(id).await)
}

pub async fn add_log_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    dto::JsonBody(body): dto::JsonBody<NewManualLogEntry>,
) -> axum::response::Response {
    let id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(
        StatusCode::CREATED,
        services.store().add_log_entry(id, body, actor.actor()).await,
    )
}
