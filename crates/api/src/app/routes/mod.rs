use axum::Router;

pub mod attachments;
pub mod common;
pub mod finance;
pub mod items;
pub mod orders;
pub mod quotations;
pub mod reference;
pub mod requests;
pub mod system;

/// Router for every procurement endpoint.
pub fn router() -> Router {
    Router::new()
        .nest("/reference", reference::router())
        .merge(requests::router())
        .merge(items::router())
        .merge(finance::router())
        .merge(attachments::router())
        .merge(quotations::router())
        .merge(orders::router())
}
