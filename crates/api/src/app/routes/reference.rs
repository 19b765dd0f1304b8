use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Router,
};

use epro_core::{OfficeId, VendorId};
use epro_procurement::{CodeKind, NewCode, NewCurrency, NewOffice, NewUnit, NewVendor};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/offices", post(create_office).get(list_offices))
        .route("/offices/:id", get(get_office))
        .route("/currencies", post(create_currency).get(list_currencies))
        .route("/units", post(create_unit).get(list_units))
        .route("/vendors", post(create_vendor).get(list_vendors))
        .route("/vendors/:id", get(get_vendor))
        .route("/codes/:kind", post(create_code).get(list_codes))
}

pub async fn create_office(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    dto::JsonBody(body): dto::JsonBody<NewOffice>,
) -> axum::response::Response {
    dto::respond(
        StatusCode::CREATED,
        services.store().create_office(body, actor.actor()).await,
    )
}

pub async fn list_offices(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    dto::respond_list(services.store().list_offices().await)
}

pub async fn get_office(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: OfficeId = match errors::parse_id(&id, "office") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(StatusCode::OK, services.store().get_office(id).await)
}

pub async fn create_currency(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    dto::JsonBody(body): dto::JsonBody<NewCurrency>,
) -> axum::response::Response {
    dto::respond(
        StatusCode::CREATED,
        services.store().create_currency(body, actor.actor()).await,
    )
}

pub async fn list_currencies(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    dto::respond_list(services.store().list_currencies().await)
}

pub async fn create_unit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    dto::JsonBody(body): dto::JsonBody<NewUnit>,
) -> axum::response::Response {
    dto::respond(
        StatusCode::CREATED,
        services.store().create_unit(body, actor.actor()).await,
    )
}

pub async fn list_units(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    dto::respond_list(services.store().list_units().await)
}

pub async fn create_vendor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    dto::JsonBody(body): dto::JsonBody<NewVendor>,
) -> axum::response::Response {
    dto::respond(
        StatusCode::CREATED,
        services.store().create_vendor(body, actor.actor()).await,
    )
}

pub async fn list_vendors(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    dto::respond_list(services.store().list_vendors().await)
}

pub async fn get_vendor(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: VendorId = match errors::parse_id(&id, "vendor") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(StatusCode::OK, services.store().get_vendor(id).await)
}

pub async fn create_code(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(kind): Path<String>,
    dto::JsonBody(body): dto::JsonBody<NewCode>,
) -> axum::response::Response {
    let kind: CodeKind = match kind.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    dto::respond(
        StatusCode::CREATED,
        services.store().create_code(kind, body, actor.actor()).await,
    )
}

pub async fn list_codes(
    Extension(services): Extension<Arc<AppServices>>,
    Path(kind): Path<String>,
) -> axum::response::Response {
    let kind: CodeKind = match kind.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    dto::respond_list(services.store().list_codes(kind).await)
}
