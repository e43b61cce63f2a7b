use std::convert::Infallible;

use serde::Serialize;
use serde_json::json;
use warp::{
    http::{HeaderValue, StatusCode},
    reject::{InvalidHeader, InvalidQuery, LengthRequired, MethodNotAllowed, PayloadTooLarge},
    reply::{self, Reply, Response},
    Rejection,
};

use crate::{
    concurrency::{
        etag::{EntityTag, Taggable},
        precondition::Precondition,
    },
    constants::{ETAG_HEADER, PAGINATION_HEADER},
    error::{ApiError, FieldErrors},
    form::SCHEMA_FIELD,
    pagination::PageContext,
};

fn with_header(mut response: Response, name: &'static str, value: &str) -> Response {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            response.headers_mut().insert(name, value);
        }
        Err(e) => log::error!("Dropped invalid {name} header ({e})"),
    }
    response
}

pub fn with_etag(response: Response, tag: &EntityTag) -> Response {
    with_header(response, ETAG_HEADER, &tag.header_value())
}

pub fn json<T: Serialize>(body: &T) -> Response {
    reply::json(body).into_response()
}

/// Entity body with its tag, e.g. `201` after a create.
pub fn entity<T: Serialize + Taggable>(entity: &T, status: StatusCode) -> Response {
    let response = reply::with_status(reply::json(entity), status).into_response();
    with_etag(response, &EntityTag::of(entity))
}

/// `304` when `If-None-Match` names the current tag, the entity otherwise.
pub fn conditional<T: Serialize + Taggable>(entity: &T, if_none_match: Option<&str>) -> Response {
    let tag = EntityTag::of(entity);

    match Precondition::parse(if_none_match) {
        Some(precondition) if precondition.matches(&tag) => not_modified(&tag),
        _ => self::entity(entity, StatusCode::OK),
    }
}

pub fn page<T: Serialize>(page: PageContext<T>) -> Response {
    let response = json(&page.rows);

    match serde_json::to_string(&page.metadata) {
        Ok(metadata) => with_header(response, PAGINATION_HEADER, &metadata),
        Err(e) => {
            log::error!("Could not serialize pagination metadata ({e})");
            response
        }
    }
}

pub fn no_content(tag: Option<&EntityTag>) -> Response {
    let response = StatusCode::NO_CONTENT.into_response();
    match tag {
        Some(tag) => with_etag(response, tag),
        None => response,
    }
}

pub fn not_modified(tag: &EntityTag) -> Response {
    with_etag(StatusCode::NOT_MODIFIED.into_response(), tag)
}

pub fn error(error: &ApiError) -> Response {
    reply::with_status(reply::json(&error.body()), error.status()).into_response()
}

/// Collapses a handler result into the response sent to the client.
pub fn finish(result: Result<Response, ApiError>) -> Response {
    match result {
        Ok(response) => response,
        Err(e) => {
            log::debug!("Request failed: {e}");
            error(&e)
        }
    }
}

fn status_error(status: StatusCode, message: &str) -> Response {
    let body = json!({
        "code": status.as_u16(),
        "status": status.canonical_reason().unwrap_or_default(),
        "error": message,
    });
    reply::with_status(reply::json(&body), status).into_response()
}

pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    if let Some(e) = err.find::<ApiError>() {
        return Ok(error(e));
    }

    let response = if err.is_not_found() {
        status_error(StatusCode::NOT_FOUND, "The requested URL was not found on the server")
    } else if err.find::<MethodNotAllowed>().is_some() {
        status_error(
            StatusCode::METHOD_NOT_ALLOWED,
            "The method is not allowed for the requested URL",
        )
    } else if err.find::<InvalidQuery>().is_some() {
        error(&ApiError::invalid_query(FieldErrors::single(
            SCHEMA_FIELD,
            "Invalid query string",
        )))
    } else if err.find::<InvalidHeader>().is_some() {
        status_error(StatusCode::BAD_REQUEST, "A request header could not be read")
    } else if err.find::<PayloadTooLarge>().is_some() {
        status_error(StatusCode::PAYLOAD_TOO_LARGE, "Request body is too large")
    } else if err.find::<LengthRequired>().is_some() {
        status_error(StatusCode::LENGTH_REQUIRED, "A Content-Length header is required")
    } else {
        log::error!("Unhandled rejection: {err:?}");
        status_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Tag;

    fn tag() -> Tag {
        Tag {
            id: 1,
            name: String::from("vegan"),
        }
    }

    #[test]
    fn entity_carries_quoted_etag() {
        let response = entity(&tag(), StatusCode::CREATED);

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers()[ETAG_HEADER],
            EntityTag::of(&tag()).header_value().as_str()
        );
    }

    #[test]
    fn matching_if_none_match_is_not_modified() {
        let current = EntityTag::of(&tag()).header_value();

        assert_eq!(
            conditional(&tag(), Some(&current)).status(),
            StatusCode::NOT_MODIFIED
        );
        assert_eq!(
            conditional(&tag(), Some("\"stale\"")).status(),
            StatusCode::OK
        );
        assert_eq!(conditional(&tag(), None).status(), StatusCode::OK);
    }

    #[test]
    fn errors_use_their_status() {
        assert_eq!(
            finish(Err(ApiError::PreconditionRequired)).status(),
            StatusCode::PRECONDITION_REQUIRED
        );
        assert_eq!(no_content(None).status(), StatusCode::NO_CONTENT);
    }
}
