//! Locating the field behind a constraint violation.
//!
//! The driver tells us which kind of constraint failed. Which field caused it
//! is found by probing the candidates a write declared, inside the transaction
//! the violation happened in.

use sqlx::{error::ErrorKind, Sqlite, SqliteConnection};

use super::{
    error::{ApiError, FieldErrors, QueryError},
    form::SCHEMA_FIELD,
    schema::Id,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Text(String),
    Integer(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    /// `value` must not already be stored in `table.column` by another row.
    Unique {
        field: String,
        table: &'static str,
        column: &'static str,
        value: Bound,
        except: Option<Id>,
    },
    /// `id` must name an existing row of `table`.
    Reference {
        field: String,
        table: &'static str,
        entity: &'static str,
        id: Id,
    },
}

impl Probe {
    pub fn unique(
        field: &str,
        table: &'static str,
        column: &'static str,
        value: Bound,
        except: Option<Id>,
    ) -> Self {
        Self::Unique {
            field: field.to_owned(),
            table,
            column,
            value,
            except,
        }
    }

    pub fn reference(field: &str, table: &'static str, entity: &'static str, id: Id) -> Self {
        Self::Reference {
            field: field.to_owned(),
            table,
            entity,
            id,
        }
    }

    fn answers(&self, kind: &ErrorKind) -> bool {
        matches!(
            (self, kind),
            (Probe::Unique { .. }, ErrorKind::UniqueViolation)
                | (Probe::Reference { .. }, ErrorKind::ForeignKeyViolation)
        )
    }

    fn field(&self) -> &str {
        match self {
            Probe::Unique { field, .. } | Probe::Reference { field, .. } => field,
        }
    }

    fn message(&self) -> String {
        match self {
            Probe::Unique { field, .. } => format!("{field} already exists"),
            Probe::Reference { field, entity, .. } => {
                format!("{field} does not reference an existing {entity}")
            }
        }
    }

    async fn conflicts(&self, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
        let (conflict,): (i64,) = match self {
            Probe::Unique {
                table,
                column,
                value,
                except,
                ..
            } => {
                let sql = format!(
                    "SELECT EXISTS (SELECT 1 FROM {table} WHERE {column} = ? AND id IS NOT ?)"
                );
                let query = sqlx::query_as::<Sqlite, (i64,)>(&sql);
                let query = match value {
                    Bound::Text(value) => query.bind(value.as_str()),
                    Bound::Integer(value) => query.bind(*value),
                };
                query.bind(*except).fetch_one(&mut *conn).await?
            }
            Probe::Reference { table, id, .. } => {
                let sql = format!("SELECT NOT EXISTS (SELECT 1 FROM {table} WHERE id = ?)");
                sqlx::query_as::<Sqlite, (i64,)>(&sql)
                    .bind(*id)
                    .fetch_one(&mut *conn)
                    .await?
            }
        };

        Ok(conflict != 0)
    }
}

/// Turns a failed write into a client error. Constraint violations become
/// field-addressed errors; anything else is a storage failure.
pub async fn translate(
    error: sqlx::Error,
    probes: &[Probe],
    conn: &mut SqliteConnection,
) -> ApiError {
    let error = QueryError::from(error);
    let Some(kind) = error.kind().filter(|kind| {
        matches!(kind, ErrorKind::UniqueViolation | ErrorKind::ForeignKeyViolation)
    }) else {
        return error.into();
    };

    for probe in probes.iter().filter(|probe| probe.answers(kind)) {
        match probe.conflicts(conn).await {
            Ok(true) => {
                log::warn!("Constraint violation on {}: {error}", probe.field());
                return ApiError::ConstraintViolation(FieldErrors::single(
                    probe.field(),
                    probe.message(),
                ));
            }
            Ok(false) => {}
            Err(e) => return QueryError::from(e).into(),
        }
    }

    log::warn!("Constraint violation not matched to a field: {error}");
    ApiError::ConstraintViolation(FieldErrors::single(
        SCHEMA_FIELD,
        "The request conflicts with existing data",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_field() {
        let unique = Probe::unique("name", "tags", "name", Bound::Text("vegan".into()), None);
        let reference = Probe::reference("ingredientId", "ingredients", "ingredient", 4);

        assert_eq!(unique.message(), "name already exists");
        assert_eq!(
            reference.message(),
            "ingredientId does not reference an existing ingredient"
        );
    }

    #[test]
    fn probes_answer_only_their_kind() {
        let unique = Probe::unique("productId", "items", "product_id", Bound::Integer(1), Some(2));

        assert!(unique.answers(&ErrorKind::UniqueViolation));
        assert!(!unique.answers(&ErrorKind::ForeignKeyViolation));
        assert!(!unique.answers(&ErrorKind::CheckViolation));
    }
}
