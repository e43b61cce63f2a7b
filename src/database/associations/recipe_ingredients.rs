use sqlx::{Pool, Sqlite, SqliteConnection};

use super::{absent_link, indexed_targets, owner_tag, resolve_targets};
use crate::{
    actions::{
        begin, commit,
        ingredients::lock_ingredient,
        recipes::{lock_recipe, RECIPE_COLUMNS},
        row_exists,
    },
    concurrency::{etag::EntityTag, precondition::Precondition},
    constraint::{translate, Probe},
    error::{ApiError, QueryError},
    form::QuantityLink,
    schema::{
        Entity, Id, Ingredient, IngredientRecipe, IngredientRecipeRow, Recipe, RecipeIngredient,
        RecipeIngredientRow,
    },
};

const LIST: &str = "recipeIngredients";

/// Inserts the pair, or replaces `amount` and `unit` when it already exists.
async fn upsert(
    recipe_id: Id,
    ingredient_id: Id,
    link: &QuantityLink,
    fields: (&str, &str),
    conn: &mut SqliteConnection,
) -> Result<(), ApiError> {
    let result = sqlx::query(
        "
        INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount, unit)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (recipe_id, ingredient_id) DO UPDATE
        SET amount = excluded.amount, unit = excluded.unit
    ",
    )
    .bind(recipe_id)
    .bind(ingredient_id)
    .bind(link.amount)
    .bind(&link.unit)
    .execute(&mut *conn)
    .await;

    if let Err(e) = result {
        let probes = [
            Probe::reference(fields.0, Recipe::TABLE, Recipe::NAME, recipe_id),
            Probe::reference(fields.1, Ingredient::TABLE, Ingredient::NAME, ingredient_id),
        ];
        return Err(translate(e, &probes, conn).await);
    }

    Ok(())
}

async fn remove(
    recipe_id: Id,
    ingredient_id: Id,
    conn: &mut SqliteConnection,
) -> Result<bool, ApiError> {
    let result =
        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = ? AND ingredient_id = ?")
            .bind(recipe_id)
            .bind(ingredient_id)
            .execute(&mut *conn)
            .await
            .map_err(QueryError::from)?;

    Ok(result.rows_affected() > 0)
}

fn link_targets(links: &[QuantityLink], member: &str) -> Vec<(String, Id)> {
    let ids: Vec<Id> = links.iter().map(|link| link.target).collect();
    indexed_targets(LIST, Some(member), &ids)
}

pub async fn list_recipe_ingredients(
    recipe_id: Id,
    pool: &Pool<Sqlite>,
) -> Result<Vec<RecipeIngredient>, ApiError> {
    let mut conn = pool.acquire().await.map_err(QueryError::from)?;

    if !row_exists(Recipe::TABLE, recipe_id, &mut conn).await? {
        return Err(ApiError::not_found(Recipe::NAME, recipe_id));
    }

    let rows: Vec<RecipeIngredientRow> = sqlx::query_as(
        "
        SELECT ri.recipe_id, ri.ingredient_id, i.name AS ingredient_name, ri.amount, ri.unit
        FROM recipe_ingredients ri
        JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ?
        ORDER BY i.id
    ",
    )
    .bind(recipe_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(RecipeIngredient::from).collect())
}

pub async fn list_ingredient_recipes(
    ingredient_id: Id,
    pool: &Pool<Sqlite>,
) -> Result<Vec<IngredientRecipe>, ApiError> {
    let mut conn = pool.acquire().await.map_err(QueryError::from)?;

    if !row_exists(Ingredient::TABLE, ingredient_id, &mut conn).await? {
        return Err(ApiError::not_found(Ingredient::NAME, ingredient_id));
    }

    let rows: Vec<IngredientRecipeRow> = sqlx::query_as(&format!(
        "
        SELECT {RECIPE_COLUMNS}, ri.amount, ri.unit
        FROM recipe_ingredients ri
        JOIN recipes r ON r.id = ri.recipe_id
        WHERE ri.ingredient_id = ?
        ORDER BY r.id
    "
    ))
    .bind(ingredient_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(IngredientRecipe::from).collect())
}

/// Adds or updates every `ingredient -> amount, unit` row of the recipe.
pub async fn add_recipe_ingredients(
    recipe_id: Id,
    links: &[QuantityLink],
    precondition: Option<&Precondition>,
    pool: &Pool<Sqlite>,
) -> Result<EntityTag, ApiError> {
    let mut tr = begin(pool).await?;

    let recipe = lock_recipe(recipe_id, &mut tr).await?;
    let etag = owner_tag(&recipe, precondition)?;

    let targets = link_targets(links, "ingredientId");
    resolve_targets(&targets, Ingredient::TABLE, Ingredient::NAME, &mut tr).await?;

    for (link, (field, _)) in links.iter().zip(&targets) {
        upsert(recipe_id, link.target, link, ("recipeId", field.as_str()), &mut tr).await?;
    }

    commit(tr).await?;
    log::info!("Stored {} ingredient row(s) for recipe {recipe_id}", links.len());

    Ok(etag)
}

/// Adds or updates every `recipe -> amount, unit` row of the ingredient.
pub async fn add_ingredient_recipes(
    ingredient_id: Id,
    links: &[QuantityLink],
    precondition: Option<&Precondition>,
    pool: &Pool<Sqlite>,
) -> Result<EntityTag, ApiError> {
    let mut tr = begin(pool).await?;

    let ingredient = lock_ingredient(ingredient_id, &mut tr).await?;
    let etag = owner_tag(&ingredient, precondition)?;

    let targets = link_targets(links, "recipeId");
    resolve_targets(&targets, Recipe::TABLE, Recipe::NAME, &mut tr).await?;

    for (link, (field, _)) in links.iter().zip(&targets) {
        upsert(link.target, ingredient_id, link, (field.as_str(), "ingredientId"), &mut tr).await?;
    }

    commit(tr).await?;
    log::info!("Stored {} recipe row(s) for ingredient {ingredient_id}", links.len());

    Ok(etag)
}

pub async fn remove_recipe_ingredient(
    recipe_id: Id,
    ingredient_id: Id,
    precondition: &Precondition,
    pool: &Pool<Sqlite>,
) -> Result<EntityTag, ApiError> {
    let mut tr = begin(pool).await?;

    let recipe = lock_recipe(recipe_id, &mut tr).await?;
    let etag = precondition.check(&recipe)?;

    if !remove(recipe_id, ingredient_id, &mut tr).await? {
        return Err(absent_link(
            "ingredientId",
            (Recipe::NAME, recipe_id),
            (Ingredient::NAME, ingredient_id),
        ));
    }

    commit(tr).await?;
    log::info!("Removed ingredient {ingredient_id} from recipe {recipe_id}");

    Ok(etag)
}

pub async fn remove_ingredient_recipe(
    ingredient_id: Id,
    recipe_id: Id,
    precondition: &Precondition,
    pool: &Pool<Sqlite>,
) -> Result<EntityTag, ApiError> {
    let mut tr = begin(pool).await?;

    let ingredient = lock_ingredient(ingredient_id, &mut tr).await?;
    let etag = precondition.check(&ingredient)?;

    if !remove(recipe_id, ingredient_id, &mut tr).await? {
        return Err(absent_link(
            "recipeId",
            (Ingredient::NAME, ingredient_id),
            (Recipe::NAME, recipe_id),
        ));
    }

    commit(tr).await?;
    log::info!("Removed recipe {recipe_id} from ingredient {ingredient_id}");

    Ok(etag)
}
