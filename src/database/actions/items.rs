use chrono::Utc;
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};

use super::{begin, commit, contains_pattern, lock_row};
use crate::{
    concurrency::precondition::Precondition,
    constraint::{translate, Bound, Probe},
    error::{ApiError, QueryError},
    form::{ItemDraft, ItemQuery},
    pagination::PageContext,
    schema::{Entity, Id, Ingredient, Item, ItemRow},
};

pub(crate) const ITEM_COLUMNS: &str = "
    SELECT it.id, it.name, it.amount, it.product_id, it.ingredient_id,
        ing.name AS ingredient_name, it.updated_at
    FROM items it
    LEFT JOIN ingredients ing ON ing.id = it.ingredient_id";

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &ItemQuery) {
    builder.push(" WHERE 1 = 1");

    if let Some(name) = &query.name {
        builder
            .push(" AND it.name LIKE ")
            .push_bind(contains_pattern(name))
            .push(" ESCAPE '\\'");
    }
    if let Some(product_id) = query.product_id {
        builder.push(" AND it.product_id = ").push_bind(product_id);
    }
    if let Some(ingredient_id) = query.ingredient_id {
        builder
            .push(" AND it.ingredient_id = ")
            .push_bind(ingredient_id);
    }
}

pub async fn list_items(query: &ItemQuery, pool: &Pool<Sqlite>) -> Result<PageContext<Item>, ApiError> {
    log::trace!("Listing items {query:?}");

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM items it");
    push_filters(&mut count, query);
    let (total,): (i64,) = count
        .build_query_as()
        .fetch_one(pool)
        .await
        .map_err(QueryError::from)?;

    let mut select = QueryBuilder::new(ITEM_COLUMNS);
    push_filters(&mut select, query);
    select
        .push(" ORDER BY it.id LIMIT ")
        .push_bind(query.page.page_size)
        .push(" OFFSET ")
        .push_bind(query.page.offset());

    let rows: Vec<ItemRow> = select
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(PageContext::from_rows(
        rows.into_iter().map(Item::from).collect(),
        total,
        query.page,
    ))
}

pub async fn fetch_item(id: Id, conn: &mut SqliteConnection) -> Result<Option<Item>, ApiError> {
    let row: Option<ItemRow> = sqlx::query_as(&format!("{ITEM_COLUMNS} WHERE it.id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(row.map(Item::from))
}

pub async fn get_item(id: Id, pool: &Pool<Sqlite>) -> Result<Item, ApiError> {
    let mut conn = pool.acquire().await.map_err(QueryError::from)?;

    fetch_item(id, &mut conn)
        .await?
        .ok_or_else(|| ApiError::not_found(Item::NAME, id))
}

/// Locks the item for the current transaction and reads it back.
pub async fn lock_item(id: Id, conn: &mut SqliteConnection) -> Result<Item, ApiError> {
    if !lock_row(Item::TABLE, id, conn).await? {
        return Err(ApiError::not_found(Item::NAME, id));
    }

    fetch_item(id, conn)
        .await?
        .ok_or_else(|| ApiError::not_found(Item::NAME, id))
}

fn probes(draft: &ItemDraft, id: Option<Id>) -> Vec<Probe> {
    let mut probes = vec![Probe::unique(
        "name",
        Item::TABLE,
        "name",
        Bound::Text(draft.name.clone()),
        id,
    )];

    if let Some(product_id) = draft.product_id {
        probes.push(Probe::unique(
            "productId",
            Item::TABLE,
            "product_id",
            Bound::Integer(product_id),
            id,
        ));
    }
    if let Some(ingredient_id) = draft.ingredient_id {
        probes.push(Probe::reference(
            "ingredientId",
            Ingredient::TABLE,
            Ingredient::NAME,
            ingredient_id,
        ));
    }

    probes
}

pub async fn create_item(draft: &ItemDraft, pool: &Pool<Sqlite>) -> Result<Item, ApiError> {
    let mut tr = begin(pool).await?;

    let result = sqlx::query(
        "
        INSERT INTO items (name, amount, product_id, ingredient_id, updated_at)
        VALUES (?, ?, ?, ?, ?)
    ",
    )
    .bind(&draft.name)
    .bind(draft.amount)
    .bind(draft.product_id)
    .bind(draft.ingredient_id)
    .bind(Utc::now())
    .execute(&mut *tr)
    .await;

    let id = match result {
        Ok(result) => result.last_insert_rowid(),
        Err(e) => return Err(translate(e, &probes(draft, None), &mut tr).await),
    };

    let item = fetch_item(id, &mut tr)
        .await?
        .ok_or_else(|| ApiError::not_found(Item::NAME, id))?;

    commit(tr).await?;
    log::info!("Created item {id}");

    Ok(item)
}

/// Full replacement: an omitted `ingredientId` unlinks the ingredient.
pub async fn update_item(
    id: Id,
    draft: &ItemDraft,
    precondition: &Precondition,
    pool: &Pool<Sqlite>,
) -> Result<Item, ApiError> {
    let mut tr = begin(pool).await?;

    let current = lock_item(id, &mut tr).await?;
    precondition.check(&current)?;

    let result = sqlx::query(
        "
        UPDATE items
        SET name = ?, amount = ?, product_id = ?, ingredient_id = ?, updated_at = ?
        WHERE id = ?
    ",
    )
    .bind(&draft.name)
    .bind(draft.amount)
    .bind(draft.product_id)
    .bind(draft.ingredient_id)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *tr)
    .await;

    if let Err(e) = result {
        return Err(translate(e, &probes(draft, Some(id)), &mut tr).await);
    }

    let item = fetch_item(id, &mut tr)
        .await?
        .ok_or_else(|| ApiError::not_found(Item::NAME, id))?;

    commit(tr).await?;
    log::info!("Updated item {id}");

    Ok(item)
}

pub async fn delete_item(
    id: Id,
    precondition: &Precondition,
    pool: &Pool<Sqlite>,
) -> Result<(), ApiError> {
    let mut tr = begin(pool).await?;

    let current = lock_item(id, &mut tr).await?;
    precondition.check(&current)?;

    sqlx::query("DELETE FROM items WHERE id = ?")
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;

    commit(tr).await?;
    log::info!("Deleted item {id}");

    Ok(())
}
