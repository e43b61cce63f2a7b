use chrono::Utc;
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};

use super::{begin, commit, contains_pattern, lock_row};
use crate::{
    concurrency::precondition::Precondition,
    constraint::{translate, Bound, Probe},
    error::{ApiError, QueryError},
    form::{RecipeDraft, RecipeQuery},
    pagination::PageContext,
    schema::{Entity, Id, Recipe},
};

pub(crate) const RECIPE_COLUMNS: &str =
    "r.id, r.name, r.steps, r.notes, r.rating, r.created_at, r.updated_at";

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &RecipeQuery) {
    builder.push(" WHERE 1 = 1");

    if let Some(name) = &query.name {
        builder
            .push(" AND r.name LIKE ")
            .push_bind(contains_pattern(name))
            .push(" ESCAPE '\\'");
    }
    if let Some(tag_id) = query.tag_id {
        builder
            .push(" AND EXISTS (SELECT 1 FROM recipe_tags rt")
            .push(" WHERE rt.recipe_id = r.id AND rt.tag_id = ")
            .push_bind(tag_id)
            .push(")");
    }
    if let Some(ingredient_id) = query.ingredient_id {
        builder
            .push(" AND EXISTS (SELECT 1 FROM recipe_ingredients ri")
            .push(" WHERE ri.recipe_id = r.id AND ri.ingredient_id = ")
            .push_bind(ingredient_id)
            .push(")");
    }
}

pub async fn list_recipes(
    query: &RecipeQuery,
    pool: &Pool<Sqlite>,
) -> Result<PageContext<Recipe>, ApiError> {
    log::trace!("Listing recipes {query:?}");

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM recipes r");
    push_filters(&mut count, query);
    let (total,): (i64,) = count
        .build_query_as()
        .fetch_one(pool)
        .await
        .map_err(QueryError::from)?;

    let mut select = QueryBuilder::new(format!("SELECT {RECIPE_COLUMNS} FROM recipes r"));
    push_filters(&mut select, query);
    select
        .push(" ORDER BY r.id LIMIT ")
        .push_bind(query.page.page_size)
        .push(" OFFSET ")
        .push_bind(query.page.offset());

    let rows: Vec<Recipe> = select
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(PageContext::from_rows(rows, total, query.page))
}

pub async fn fetch_recipe(id: Id, conn: &mut SqliteConnection) -> Result<Option<Recipe>, ApiError> {
    let row: Option<Recipe> =
        sqlx::query_as(&format!("SELECT {RECIPE_COLUMNS} FROM recipes r WHERE r.id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_recipe(id: Id, pool: &Pool<Sqlite>) -> Result<Recipe, ApiError> {
    let mut conn = pool.acquire().await.map_err(QueryError::from)?;

    fetch_recipe(id, &mut conn)
        .await?
        .ok_or_else(|| ApiError::not_found(Recipe::NAME, id))
}

/// Locks the recipe for the current transaction and reads it back.
pub async fn lock_recipe(id: Id, conn: &mut SqliteConnection) -> Result<Recipe, ApiError> {
    if !lock_row(Recipe::TABLE, id, conn).await? {
        return Err(ApiError::not_found(Recipe::NAME, id));
    }

    fetch_recipe(id, conn)
        .await?
        .ok_or_else(|| ApiError::not_found(Recipe::NAME, id))
}

fn probes(draft: &RecipeDraft, id: Option<Id>) -> Vec<Probe> {
    vec![Probe::unique(
        "name",
        Recipe::TABLE,
        "name",
        Bound::Text(draft.name.clone()),
        id,
    )]
}

pub async fn create_recipe(draft: &RecipeDraft, pool: &Pool<Sqlite>) -> Result<Recipe, ApiError> {
    let mut tr = begin(pool).await?;
    let now = Utc::now();

    let result = sqlx::query(
        "
        INSERT INTO recipes (name, steps, notes, rating, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
    ",
    )
    .bind(&draft.name)
    .bind(&draft.steps)
    .bind(&draft.notes)
    .bind(draft.rating)
    .bind(now)
    .bind(now)
    .execute(&mut *tr)
    .await;

    let id = match result {
        Ok(result) => result.last_insert_rowid(),
        Err(e) => return Err(translate(e, &probes(draft, None), &mut tr).await),
    };

    let recipe = fetch_recipe(id, &mut tr)
        .await?
        .ok_or_else(|| ApiError::not_found(Recipe::NAME, id))?;

    commit(tr).await?;
    log::info!("Created recipe {id}");

    Ok(recipe)
}

pub async fn update_recipe(
    id: Id,
    draft: &RecipeDraft,
    precondition: &Precondition,
    pool: &Pool<Sqlite>,
) -> Result<Recipe, ApiError> {
    let mut tr = begin(pool).await?;

    let current = lock_recipe(id, &mut tr).await?;
    precondition.check(&current)?;

    let result = sqlx::query(
        "
        UPDATE recipes
        SET name = ?, steps = ?, notes = ?, rating = ?, updated_at = ?
        WHERE id = ?
    ",
    )
    .bind(&draft.name)
    .bind(&draft.steps)
    .bind(&draft.notes)
    .bind(draft.rating)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *tr)
    .await;

    if let Err(e) = result {
        return Err(translate(e, &probes(draft, Some(id)), &mut tr).await);
    }

    let recipe = fetch_recipe(id, &mut tr)
        .await?
        .ok_or_else(|| ApiError::not_found(Recipe::NAME, id))?;

    commit(tr).await?;
    log::info!("Updated recipe {id}");

    Ok(recipe)
}

/// Tag links and ingredient rows of the recipe go with it.
pub async fn delete_recipe(
    id: Id,
    precondition: &Precondition,
    pool: &Pool<Sqlite>,
) -> Result<(), ApiError> {
    let mut tr = begin(pool).await?;

    let current = lock_recipe(id, &mut tr).await?;
    precondition.check(&current)?;

    sqlx::query("DELETE FROM recipes WHERE id = ?")
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;

    commit(tr).await?;
    log::info!("Deleted recipe {id}");

    Ok(())
}
