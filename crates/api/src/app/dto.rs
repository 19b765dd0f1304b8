//! Request/response shapes that are not domain types themselves.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use epro_infra::StoreResult;

use crate::app::errors;

#[derive(Debug, Deserialize)]
pub struct ListRequestsQuery {
    pub office_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub file_name: String,
}

/// JSON request body whose rejections use the API error shape.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = axum::response::Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_body",
                rejection.body_text(),
            )),
        }
    }
}

/// `{"items": [...]}`, the shape of every list response.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

/// Serialize a store result with `status`, or map its error.
pub fn respond<T: Serialize>(status: StatusCode, result: StoreResult<T>) -> axum::response::Response {
    match result {
        Ok(value) => (status, Json(value)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub fn respond_list<T: Serialize>(result: StoreResult<Vec<T>>) -> axum::response::Response {
    respond(StatusCode::OK, result.map(|items| ListResponse { items }))
}
