use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};

use super::{owner_tag, resolve_targets};
use crate::{
    actions::{
        begin, commit,
        items::{fetch_item, lock_item, ITEM_COLUMNS},
        row_exists,
    },
    concurrency::precondition::Precondition,
    constraint::{translate, Probe},
    error::{ApiError, QueryError},
    schema::{Entity, Id, Ingredient, Item, ItemRow},
};

const FIELD: &str = "ingredientId";

async fn set_ingredient(
    item_id: Id,
    ingredient_id: Option<Id>,
    conn: &mut SqliteConnection,
) -> Result<Item, ApiError> {
    let result = sqlx::query("UPDATE items SET ingredient_id = ?, updated_at = ? WHERE id = ?")
        .bind(ingredient_id)
        .bind(Utc::now())
        .bind(item_id)
        .execute(&mut *conn)
        .await;

    if let Err(e) = result {
        let probes: Vec<Probe> = ingredient_id
            .map(|id| Probe::reference(FIELD, Ingredient::TABLE, Ingredient::NAME, id))
            .into_iter()
            .collect();
        return Err(translate(e, &probes, conn).await);
    }

    fetch_item(item_id, conn)
        .await?
        .ok_or_else(|| ApiError::not_found(Item::NAME, item_id))
}

/// `None` when the item is not linked to an ingredient.
pub async fn get_item_ingredient(
    item_id: Id,
    pool: &Pool<Sqlite>,
) -> Result<Option<Ingredient>, ApiError> {
    let mut conn = pool.acquire().await.map_err(QueryError::from)?;

    let item = fetch_item(item_id, &mut conn)
        .await?
        .ok_or_else(|| ApiError::not_found(Item::NAME, item_id))?;

    Ok(item.ingredient)
}

pub async fn list_ingredient_items(
    ingredient_id: Id,
    pool: &Pool<Sqlite>,
) -> Result<Vec<Item>, ApiError> {
    let mut conn = pool.acquire().await.map_err(QueryError::from)?;

    if !row_exists(Ingredient::TABLE, ingredient_id, &mut conn).await? {
        return Err(ApiError::not_found(Ingredient::NAME, ingredient_id));
    }

    let rows: Vec<ItemRow> =
        sqlx::query_as(&format!("{ITEM_COLUMNS} WHERE it.ingredient_id = ? ORDER BY it.id"))
            .bind(ingredient_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(Item::from).collect())
}

/// Links the item to `ingredient_id` and returns the item as stored.
///
/// Relinking to the same ingredient changes nothing. An item already linked
/// to a different ingredient has to be unlinked first.
pub async fn link_item_ingredient(
    item_id: Id,
    ingredient_id: Id,
    precondition: Option<&Precondition>,
    pool: &Pool<Sqlite>,
) -> Result<Item, ApiError> {
    let mut tr = begin(pool).await?;

    let item = lock_item(item_id, &mut tr).await?;
    owner_tag(&item, precondition)?;

    match item.ingredient_id {
        Some(current) if current == ingredient_id => {
            commit(tr).await?;
            return Ok(item);
        }
        Some(current) => {
            log::warn!("Item {item_id} is already linked to ingredient {current}");
            return Err(ApiError::unprocessable(
                FIELD,
                format!("Item {item_id} is already linked to ingredient {current}"),
            ));
        }
        None => {}
    }

    let targets = [(FIELD.to_owned(), ingredient_id)];
    resolve_targets(&targets, Ingredient::TABLE, Ingredient::NAME, &mut tr).await?;

    let item = set_ingredient(item_id, Some(ingredient_id), &mut tr).await?;

    commit(tr).await?;
    log::info!("Linked item {item_id} to ingredient {ingredient_id}");

    Ok(item)
}

/// Clears the item's ingredient. The ingredient itself is left alone.
pub async fn unlink_item_ingredient(
    item_id: Id,
    precondition: &Precondition,
    pool: &Pool<Sqlite>,
) -> Result<Item, ApiError> {
    let mut tr = begin(pool).await?;

    let item = lock_item(item_id, &mut tr).await?;
    precondition.check(&item)?;

    let Some(ingredient_id) = item.ingredient_id else {
        log::warn!("Item {item_id} has no ingredient to unlink");
        return Err(ApiError::unprocessable(
            FIELD,
            format!("Item {item_id} is not linked to an ingredient"),
        ));
    };

    let item = set_ingredient(item_id, None, &mut tr).await?;

    commit(tr).await?;
    log::info!("Unlinked ingredient {ingredient_id} from item {item_id}");

    Ok(item)
}
