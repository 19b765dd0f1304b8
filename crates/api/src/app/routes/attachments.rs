use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get},
    Router,
};

use epro_core::{AttachmentId, ItemId};
use epro_procurement::NewAttachment;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/items/:id/attachments", get(list_attachments).post(upload_attachment))
        .route("/attachments/:id", delete(delete_attachment))
}

/// Raw request body is the file; the name comes from `?file_name=`.
pub async fn upload_attachment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let item_id: ItemId = match errors::parse_id(&id, "item") {
        Ok(v) => v,
        Err(r) => return r,
    };
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let new = NewAttachment {
        file_name: query.file_name,
        content_type,
    };
    dto::respond(
        StatusCode::CREATED,
        services.attachments().add(item_id, new, &body, actor.actor()).await,
    )
}

pub async fn list_attachments(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id: ItemId = match errors::parse_id(&id, "item") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond_list(services.attachments().list(item_id).await)
}

pub async fn delete_attachment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AttachmentId = match errors::parse_id(&id, "attachment") {
        Ok(v) => v,
        Err(r) => return r,
    };
    match services.attachments().delete(id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
