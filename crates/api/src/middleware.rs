use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use epro_core::UserId;

use crate::app::errors;
use crate::context::ActorContext;

pub const ACTOR_HEADER: &str = "x-actor-id";

pub async fn actor_middleware(mut req: Request, next: Next) -> Response {
    let actor = match extract_actor(req.headers()) {
        Ok(actor) => actor,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_actor", msg),
    };
    req.extensions_mut().insert(ActorContext::new(actor));
    next.run(req).await
}

fn extract_actor(headers: &HeaderMap) -> Result<Option<UserId>, String> {
    let Some(value) = headers.get(ACTOR_HEADER) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| format!("{ACTOR_HEADER} must be a UUID"))?
        .trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| format!("{ACTOR_HEADER} must be a UUID"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_is_optional() {
        assert_eq!(extract_actor(&HeaderMap::new()), Ok(None));
    }

    #[test]
    fn header_must_be_uuid() {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_static("bob"));
        assert!(extract_actor(&headers).is_err());

        let id = UserId::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(extract_actor(&headers), Ok(Some(id)));
    }
}
