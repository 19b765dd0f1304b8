use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Router,
};

use epro_core::{QuotationAnalysisId, RequestId, RfqId};
use epro_procurement::{NewQuotationAnalysis, NewRequestForQuotation, NewRfqItem};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/requests/:id/rfqs", get(list_rfqs).post(create_rfq))
        .route("/rfqs/:id", get(get_rfq))
        .route("/rfqs/:id/items", post(add_rfq_item))
        .route("/quotation-analyses", post(create_quotation_analysis))
        .route("/quotation-analyses/:id", get(get_quotation_analysis))
}

pub async fn create_rfq(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    dto::JsonBody(body): dto::JsonBody<NewRequestForQuotation>,
) -> axum::response::Response {
    let request_id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(
        StatusCode::CREATED,
        services.store().create_rfq(request_id, body, actor.actor()).await,
    )
}

pub async fn list_rfqs(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let request_id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond_list(services.store().list_rfqs(request_id).await)
}

pub async fn get_rfq(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RfqId = match errors::parse_id(&id, "rfq") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(StatusCode::OK, services.store().get_rfq(id).await)
}

pub async fn add_rfq_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    dto::JsonBody(body): dto::JsonBody<NewRfqItem>,
) -> axum::response::Response {
    let id: RfqId = match errors::parse_id(&id, "rfq") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(
        StatusCode::CREATED,
        services.store().add_rfq_item(id, body, actor.actor()).await,
    )
}

pub async fn create_quotation_analysis(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    dto::JsonBody(body): dto::JsonBody<NewQuotationAnalysis>,
) -> axum::response::Response {
    dto::respond(
        StatusCode::CREATED,
        services
            .store()
            .create_quotation_analysis(body, actor.actor())
            .await,
    )
}

pub async fn get_quotation_analysis(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: QuotationAnalysisId = match errors::parse_id(&id, "quotation analysis") {
        Ok(v) => v,
        Err(r) => return r,
    };
    dto::respond(StatusCode::OK, services.store().get_quotation_analysis(id).await)
}
