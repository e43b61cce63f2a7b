use sqlx::{Pool, Sqlite, SqliteConnection};

use super::{absent_link, indexed_targets, owner_tag, resolve_targets};
use crate::{
    actions::{
        begin, commit,
        recipes::{lock_recipe, RECIPE_COLUMNS},
        row_exists,
        tags::lock_tag,
    },
    concurrency::{etag::EntityTag, precondition::Precondition},
    constraint::{translate, Probe},
    error::{ApiError, QueryError},
    schema::{Entity, Id, Recipe, Tag},
};

/// Idempotent: linking an already linked pair changes nothing.
async fn link(
    recipe_id: Id,
    tag_id: Id,
    fields: (&str, &str),
    conn: &mut SqliteConnection,
) -> Result<(), ApiError> {
    let result = sqlx::query(
        "INSERT INTO recipe_tags (recipe_id, tag_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
    )
    .bind(recipe_id)
    .bind(tag_id)
    .execute(&mut *conn)
    .await;

    if let Err(e) = result {
        let probes = [
            Probe::reference(fields.0, Recipe::TABLE, Recipe::NAME, recipe_id),
            Probe::reference(fields.1, Tag::TABLE, Tag::NAME, tag_id),
        ];
        return Err(translate(e, &probes, conn).await);
    }

    Ok(())
}

async fn unlink(recipe_id: Id, tag_id: Id, conn: &mut SqliteConnection) -> Result<bool, ApiError> {
    let result = sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = ? AND tag_id = ?")
        .bind(recipe_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(result.rows_affected() > 0)
}

pub async fn list_recipe_tags(recipe_id: Id, pool: &Pool<Sqlite>) -> Result<Vec<Tag>, ApiError> {
    let mut conn = pool.acquire().await.map_err(QueryError::from)?;

    if !row_exists(Recipe::TABLE, recipe_id, &mut conn).await? {
        return Err(ApiError::not_found(Recipe::NAME, recipe_id));
    }

    let rows: Vec<Tag> = sqlx::query_as(
        "
        SELECT t.id, t.name FROM tags t
        JOIN recipe_tags rt ON rt.tag_id = t.id
        WHERE rt.recipe_id = ?
        ORDER BY t.id
    ",
    )
    .bind(recipe_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn list_tag_recipes(tag_id: Id, pool: &Pool<Sqlite>) -> Result<Vec<Recipe>, ApiError> {
    let mut conn = pool.acquire().await.map_err(QueryError::from)?;

    if !row_exists(Tag::TABLE, tag_id, &mut conn).await? {
        return Err(ApiError::not_found(Tag::NAME, tag_id));
    }

    let rows: Vec<Recipe> = sqlx::query_as(&format!(
        "
        SELECT {RECIPE_COLUMNS} FROM recipes r
        JOIN recipe_tags rt ON rt.recipe_id = r.id
        WHERE rt.tag_id = ?
        ORDER BY r.id
    "
    ))
    .bind(tag_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

/// Links every tag to the recipe. Returns the recipe's tag.
pub async fn add_recipe_tags(
    recipe_id: Id,
    tag_ids: &[Id],
    precondition: Option<&Precondition>,
    pool: &Pool<Sqlite>,
) -> Result<EntityTag, ApiError> {
    let mut tr = begin(pool).await?;

    let recipe = lock_recipe(recipe_id, &mut tr).await?;
    let etag = owner_tag(&recipe, precondition)?;

    let targets = indexed_targets("tagIds", None, tag_ids);
    resolve_targets(&targets, Tag::TABLE, Tag::NAME, &mut tr).await?;

    for (field, tag_id) in &targets {
        link(recipe_id, *tag_id, ("recipeId", field.as_str()), &mut tr).await?;
    }

    commit(tr).await?;
    log::info!("Linked {} tag(s) to recipe {recipe_id}", tag_ids.len());

    Ok(etag)
}

/// Links every recipe to the tag. Returns the tag's tag.
pub async fn add_tag_recipes(
    tag_id: Id,
    recipe_ids: &[Id],
    precondition: Option<&Precondition>,
    pool: &Pool<Sqlite>,
) -> Result<EntityTag, ApiError> {
    let mut tr = begin(pool).await?;

    let tag = lock_tag(tag_id, &mut tr).await?;
    let etag = owner_tag(&tag, precondition)?;

    let targets = indexed_targets("recipeIds", None, recipe_ids);
    resolve_targets(&targets, Recipe::TABLE, Recipe::NAME, &mut tr).await?;

    for (field, recipe_id) in &targets {
        link(*recipe_id, tag_id, (field.as_str(), "tagId"), &mut tr).await?;
    }

    commit(tr).await?;
    log::info!("Linked {} recipe(s) to tag {tag_id}", recipe_ids.len());

    Ok(etag)
}

pub async fn remove_recipe_tag(
    recipe_id: Id,
    tag_id: Id,
    precondition: &Precondition,
    pool: &Pool<Sqlite>,
) -> Result<EntityTag, ApiError> {
    let mut tr = begin(pool).await?;

    let recipe = lock_recipe(recipe_id, &mut tr).await?;
    let etag = precondition.check(&recipe)?;

    if !unlink(recipe_id, tag_id, &mut tr).await? {
        return Err(absent_link(
            "tagId",
            (Recipe::NAME, recipe_id),
            (Tag::NAME, tag_id),
        ));
    }

    commit(tr).await?;
    log::info!("Unlinked tag {tag_id} from recipe {recipe_id}");

    Ok(etag)
}

pub async fn remove_tag_recipe(
    tag_id: Id,
    recipe_id: Id,
    precondition: &Precondition,
    pool: &Pool<Sqlite>,
) -> Result<EntityTag, ApiError> {
    let mut tr = begin(pool).await?;

    let tag = lock_tag(tag_id, &mut tr).await?;
    let etag = precondition.check(&tag)?;

    if !unlink(recipe_id, tag_id, &mut tr).await? {
        return Err(absent_link(
            "recipeId",
            (Tag::NAME, tag_id),
            (Recipe::NAME, recipe_id),
        ));
    }

    commit(tr).await?;
    log::info!("Unlinked recipe {recipe_id} from tag {tag_id}");

    Ok(etag)
}
