pub mod ingredients;
pub mod items;
pub mod recipes;
pub mod tags;

use sqlx::{Pool, Sqlite, SqliteConnection, Transaction};

use super::{
    error::{ApiError, QueryError},
    schema::Id,
};

pub async fn begin(pool: &Pool<Sqlite>) -> Result<Transaction<'static, Sqlite>, ApiError> {
    pool.begin()
        .await
        .map_err(|e| QueryError::new(format!("Could not start transaction ({e})")).into())
}

pub async fn commit(tr: Transaction<'static, Sqlite>) -> Result<(), ApiError> {
    tr.commit()
        .await
        .map_err(|e| QueryError::new(format!("Could not commit transaction ({e})")).into())
}

/// Takes the store's write lock for the rest of the transaction by touching
/// the row. Returns `false` when no row has this id.
///
/// Must be the first statement of the transaction, so that everything read
/// afterwards is the committed state no other writer can change until commit.
pub async fn lock_row(table: &str, id: Id, conn: &mut SqliteConnection) -> Result<bool, ApiError> {
    log::trace!("Locking {table} {id}");

    let result = sqlx::query(&format!("UPDATE {table} SET name = name WHERE id = ?"))
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(result.rows_affected() > 0)
}

pub async fn row_exists(table: &str, id: Id, conn: &mut SqliteConnection) -> Result<bool, ApiError> {
    let (exists,): (i64,) =
        sqlx::query_as(&format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = ?)"))
            .bind(id)
            .fetch_one(&mut *conn)
            .await
            .map_err(QueryError::from)?;

    Ok(exists != 0)
}

/// `LIKE` pattern matching `name` anywhere, with wildcards in `name` taken
/// literally. Pair with `ESCAPE '\'`.
pub fn contains_pattern(name: &str) -> String {
    let mut pattern = String::with_capacity(name.len() + 2);
    pattern.push('%');
    for c in name.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
