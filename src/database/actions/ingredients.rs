use chrono::Utc;
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};

use super::{begin, commit, contains_pattern, lock_row};
use crate::{
    concurrency::precondition::Precondition,
    constraint::{translate, Bound, Probe},
    error::{ApiError, QueryError},
    form::{IngredientDraft, IngredientQuery},
    pagination::PageContext,
    schema::{Entity, Id, Ingredient},
};

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &IngredientQuery) {
    builder.push(" WHERE 1 = 1");

    if let Some(name) = &query.name {
        builder
            .push(" AND i.name LIKE ")
            .push_bind(contains_pattern(name))
            .push(" ESCAPE '\\'");
    }
    if let Some(recipe_id) = query.recipe_id {
        builder
            .push(" AND EXISTS (SELECT 1 FROM recipe_ingredients ri")
            .push(" WHERE ri.ingredient_id = i.id AND ri.recipe_id = ")
            .push_bind(recipe_id)
            .push(")");
    }
}

pub async fn list_ingredients(
    query: &IngredientQuery,
    pool: &Pool<Sqlite>,
) -> Result<PageContext<Ingredient>, ApiError> {
    log::trace!("Listing ingredients {query:?}");

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM ingredients i");
    push_filters(&mut count, query);
    let (total,): (i64,) = count
        .build_query_as()
        .fetch_one(pool)
        .await
        .map_err(QueryError::from)?;

    let mut select = QueryBuilder::new("SELECT i.id, i.name FROM ingredients i");
    push_filters(&mut select, query);
    select
        .push(" ORDER BY i.id LIMIT ")
        .push_bind(query.page.page_size)
        .push(" OFFSET ")
        .push_bind(query.page.offset());

    let rows: Vec<Ingredient> = select
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(PageContext::from_rows(rows, total, query.page))
}

pub async fn fetch_ingredient(
    id: Id,
    conn: &mut SqliteConnection,
) -> Result<Option<Ingredient>, ApiError> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT id, name FROM ingredients WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_ingredient(id: Id, pool: &Pool<Sqlite>) -> Result<Ingredient, ApiError> {
    let mut conn = pool.acquire().await.map_err(QueryError::from)?;

    fetch_ingredient(id, &mut conn)
        .await?
        .ok_or_else(|| ApiError::not_found(Ingredient::NAME, id))
}

/// Locks the ingredient for the current transaction and reads it back.
pub async fn lock_ingredient(id: Id, conn: &mut SqliteConnection) -> Result<Ingredient, ApiError> {
    if !lock_row(Ingredient::TABLE, id, conn).await? {
        return Err(ApiError::not_found(Ingredient::NAME, id));
    }

    fetch_ingredient(id, conn)
        .await?
        .ok_or_else(|| ApiError::not_found(Ingredient::NAME, id))
}

fn probes(draft: &IngredientDraft, id: Option<Id>) -> Vec<Probe> {
    vec![Probe::unique(
        "name",
        Ingredient::TABLE,
        "name",
        Bound::Text(draft.name.clone()),
        id,
    )]
}

pub async fn create_ingredient(
    draft: &IngredientDraft,
    pool: &Pool<Sqlite>,
) -> Result<Ingredient, ApiError> {
    let mut tr = begin(pool).await?;

    let result = sqlx::query("INSERT INTO ingredients (name) VALUES (?)")
        .bind(&draft.name)
        .execute(&mut *tr)
        .await;

    let id = match result {
        Ok(result) => result.last_insert_rowid(),
        Err(e) => return Err(translate(e, &probes(draft, None), &mut tr).await),
    };

    let ingredient = fetch_ingredient(id, &mut tr)
        .await?
        .ok_or_else(|| ApiError::not_found(Ingredient::NAME, id))?;

    commit(tr).await?;
    log::info!("Created ingredient {id}");

    Ok(ingredient)
}

pub async fn update_ingredient(
    id: Id,
    draft: &IngredientDraft,
    precondition: &Precondition,
    pool: &Pool<Sqlite>,
) -> Result<Ingredient, ApiError> {
    let mut tr = begin(pool).await?;

    let current = lock_ingredient(id, &mut tr).await?;
    precondition.check(&current)?;

    let result = sqlx::query("UPDATE ingredients SET name = ? WHERE id = ?")
        .bind(&draft.name)
        .bind(id)
        .execute(&mut *tr)
        .await;

    if let Err(e) = result {
        return Err(translate(e, &probes(draft, Some(id)), &mut tr).await);
    }

    let ingredient = fetch_ingredient(id, &mut tr)
        .await?
        .ok_or_else(|| ApiError::not_found(Ingredient::NAME, id))?;

    commit(tr).await?;
    log::info!("Updated ingredient {id}");

    Ok(ingredient)
}

/// Items pointing at the ingredient are unlinked, its recipe rows removed.
pub async fn delete_ingredient(
    id: Id,
    precondition: &Precondition,
    pool: &Pool<Sqlite>,
) -> Result<(), ApiError> {
    let mut tr = begin(pool).await?;

    let current = lock_ingredient(id, &mut tr).await?;
    precondition.check(&current)?;

    // Linked items lose their ingredient through `ON DELETE SET NULL`.
    let touched = sqlx::query("UPDATE items SET updated_at = ? WHERE ingredient_id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?
        .rows_affected();

    sqlx::query("DELETE FROM ingredients WHERE id = ?")
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;

    commit(tr).await?;
    log::info!("Deleted ingredient {id}, unlinked {touched} item(s)");

    Ok(())
}
