use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use serde::Serialize;
use serde_json::{json, Value};
use sqlx::error::ErrorKind;
use thiserror::Error;
use warp::http::StatusCode;

use crate::constants::STORAGE_RETRY_MESSAGE;

/// Field name -> messages, serialized as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn merge(&mut self, prefix: &str, other: FieldErrors) {
        for (field, messages) in other.0 {
            for message in messages {
                self.add(format!("{prefix}.{field}"), message);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{field}: {}", messages.join(", "))?;
            first = false;
        }
        Ok(())
    }
}

/// Where a validation error was found in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Json,
    Query,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Json => "json",
            Location::Query => "query",
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input, rejected before any storage access.
    #[error("invalid {location} input ({errors})")]
    Validation {
        location: Location,
        errors: FieldErrors,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("this request requires an If-Match precondition")]
    PreconditionRequired,

    #[error("the If-Match precondition does not match the current entity state")]
    PreconditionFailed,

    /// Uniqueness or foreign-key violation reported by the store.
    #[error("constraint violation ({0})")]
    ConstraintViolation(FieldErrors),

    /// Well-formed request naming a target or link that does not exist.
    #[error("unprocessable entity ({0})")]
    Unprocessable(FieldErrors),

    #[error("{0}")]
    TransientStorage(String),
}

impl ApiError {
    pub fn invalid_json(errors: FieldErrors) -> Self {
        Self::Validation {
            location: Location::Json,
            errors,
        }
    }

    pub fn invalid_query(errors: FieldErrors) -> Self {
        Self::Validation {
            location: Location::Query,
            errors,
        }
    }

    pub fn not_found(entity: &str, id: i64) -> Self {
        Self::NotFound(format!("No {entity} exists with id {id}"))
    }

    pub fn unprocessable(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unprocessable(FieldErrors::single(field, message))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. }
            | ApiError::ConstraintViolation(_)
            | ApiError::Unprocessable(_)
            | ApiError::TransientStorage(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PreconditionRequired => StatusCode::PRECONDITION_REQUIRED,
            ApiError::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
        }
    }

    pub fn body(&self) -> Value {
        let status = self.status();
        let reason = status.canonical_reason().unwrap_or_default();

        match self {
            ApiError::Validation { location, errors } => json!({
                "code": status.as_u16(),
                "status": reason,
                "errors": { (location.as_str()): errors },
            }),
            ApiError::ConstraintViolation(errors) | ApiError::Unprocessable(errors) => json!({
                "code": status.as_u16(),
                "status": reason,
                "errors": { (Location::Json.as_str()): errors },
            }),
            _ => json!({
                "code": status.as_u16(),
                "status": reason,
                "error": self.to_string(),
            }),
        }
    }
}

impl warp::reject::Reject for ApiError {}

/// Storage failure as reported by the driver. Only ever logged; clients see
/// [`ApiError::TransientStorage`] or a translated constraint error.
#[derive(Debug, Error)]
#[error("{info}")]
pub struct QueryError {
    info: String,
    kind: Option<ErrorKind>,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self { info, kind: None }
    }

    pub fn kind(&self) -> Option<&ErrorKind> {
        self.kind.as_ref()
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => Self {
                info: format!("{e}"),
                kind: Some(e.kind()),
            },
            sqlx::Error::Configuration(e) => Self::new(format!("{e}")),
            sqlx::Error::Io(e) => Self::new(format!("{e}")),
            sqlx::Error::Tls(e) => Self::new(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::new(e),
            sqlx::Error::RowNotFound => Self::new(String::from("Row not found")),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::new(format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                Self::new(format!("Column index out of bounds {index} ({len})"))
            }
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("Column not found: {e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::new(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::new(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(String::from("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::new(String::from("Worker crashed")),
            sqlx::Error::Migrate(e) => Self::new(format!("{e}")),
            e => Self::new(format!("Unknown error ({e})")),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(value: QueryError) -> Self {
        log::error!("Storage failure: {}", value.info);
        ApiError::TransientStorage(STORAGE_RETRY_MESSAGE.to_owned())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(value: sqlx::Error) -> Self {
        QueryError::from(value).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn validation_body_is_field_addressed() {
        let mut errors = FieldErrors::new();
        errors.add("name", "Missing data for required field.");
        errors.add("name", "Shorter than minimum length 1.");

        let error = ApiError::invalid_json(errors);

        assert_eq!(error.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            error.body(),
            json!({
                "code": 422,
                "status": "Unprocessable Entity",
                "errors": { "json": { "name": [
                    "Missing data for required field.",
                    "Shorter than minimum length 1.",
                ]}},
            })
        );
    }

    #[test]
    fn constraint_errors_never_carry_driver_text() {
        let error: ApiError = QueryError::new("UNIQUE constraint failed: items.name".into()).into();

        assert_eq!(error.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!error.body().to_string().contains("UNIQUE"));
    }

    #[test]
    fn precondition_statuses() {
        assert_eq!(
            ApiError::PreconditionRequired.status(),
            StatusCode::PRECONDITION_REQUIRED
        );
        assert_eq!(
            ApiError::PreconditionFailed.status(),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(ApiError::not_found("tag", 3).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::not_found("tag", 3).body()["error"],
            "No tag exists with id 3"
        );
    }

    #[test]
    fn merged_errors_are_prefixed() {
        let mut outer = FieldErrors::new();
        outer.merge("recipeIngredients.1", FieldErrors::single("unit", "Field may not be empty."));

        assert_eq!(
            outer.get("recipeIngredients.1.unit"),
            Some(&[String::from("Field may not be empty.")][..])
        );
    }
}
