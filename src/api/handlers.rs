use std::collections::HashMap;

use serde_json::Value;
use sqlx::{Pool, Sqlite};
use warp::{
    http::StatusCode,
    hyper::body::Bytes,
    reply::Response,
};

use super::reply;
use crate::{
    associations::{item_ingredient, recipe_ingredients, recipe_tags},
    actions::{ingredients, items, recipes, tags},
    concurrency::{etag::EntityTag, precondition::Precondition},
    error::{ApiError, FieldErrors},
    form::{
        IngredientDraft, IngredientLink, IngredientQuery, IngredientRecipeLinks, ItemDraft,
        ItemQuery, RecipeDraft, RecipeIds, RecipeIngredientLinks, RecipeQuery, TagDraft, TagIds,
        TagQuery, SCHEMA_FIELD,
    },
    schema::Id,
};

pub type Query = HashMap<String, String>;

/// Decodes and validates a JSON body. Nothing touches storage before this.
fn parse_body<T>(body: &Bytes) -> Result<T, ApiError>
where
    T: TryFrom<Value, Error = FieldErrors>,
{
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        log::debug!("Rejected malformed body ({e})");
        ApiError::invalid_json(FieldErrors::single(SCHEMA_FIELD, "Invalid JSON body"))
    })?;

    T::try_from(value).map_err(ApiError::invalid_json)
}

fn parse_query<T>(query: Query) -> Result<T, ApiError>
where
    T: TryFrom<Query, Error = FieldErrors>,
{
    T::try_from(query).map_err(ApiError::invalid_query)
}

fn optional_precondition(header: Option<String>) -> Option<Precondition> {
    Precondition::parse(header.as_deref())
}

fn required_precondition(header: Option<String>) -> Result<Precondition, ApiError> {
    Precondition::required(header.as_deref())
}

fn linked(tag: EntityTag) -> Response {
    reply::no_content(Some(&tag))
}

// Ingredients

pub async fn list_ingredients(query: Query, pool: Pool<Sqlite>) -> Result<Response, ApiError> {
    let query: IngredientQuery = parse_query(query)?;
    let page = ingredients::list_ingredients(&query, &pool).await?;
    Ok(reply::page(page))
}

pub async fn get_ingredient(
    id: Id,
    if_none_match: Option<String>,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let ingredient = ingredients::get_ingredient(id, &pool).await?;
    Ok(reply::conditional(&ingredient, if_none_match.as_deref()))
}

pub async fn create_ingredient(body: Bytes, pool: Pool<Sqlite>) -> Result<Response, ApiError> {
    let draft: IngredientDraft = parse_body(&body)?;
    let ingredient = ingredients::create_ingredient(&draft, &pool).await?;
    Ok(reply::entity(&ingredient, StatusCode::CREATED))
}

pub async fn update_ingredient(
    id: Id,
    if_match: Option<String>,
    body: Bytes,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let draft: IngredientDraft = parse_body(&body)?;
    let precondition = required_precondition(if_match)?;
    let ingredient = ingredients::update_ingredient(id, &draft, &precondition, &pool).await?;
    Ok(reply::entity(&ingredient, StatusCode::OK))
}

pub async fn delete_ingredient(
    id: Id,
    if_match: Option<String>,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let precondition = required_precondition(if_match)?;
    ingredients::delete_ingredient(id, &precondition, &pool).await?;
    Ok(reply::no_content(None))
}

pub async fn list_ingredient_items(id: Id, pool: Pool<Sqlite>) -> Result<Response, ApiError> {
    let items = item_ingredient::list_ingredient_items(id, &pool).await?;
    Ok(reply::json(&items))
}

pub async fn list_ingredient_recipes(id: Id, pool: Pool<Sqlite>) -> Result<Response, ApiError> {
    let recipes = recipe_ingredients::list_ingredient_recipes(id, &pool).await?;
    Ok(reply::json(&recipes))
}

pub async fn add_ingredient_recipes(
    id: Id,
    if_match: Option<String>,
    body: Bytes,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let links: IngredientRecipeLinks = parse_body(&body)?;
    let precondition = optional_precondition(if_match);
    let tag =
        recipe_ingredients::add_ingredient_recipes(id, &links.0, precondition.as_ref(), &pool)
            .await?;
    Ok(linked(tag))
}

pub async fn remove_ingredient_recipe(
    id: Id,
    recipe_id: Id,
    if_match: Option<String>,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let precondition = required_precondition(if_match)?;
    let tag =
        recipe_ingredients::remove_ingredient_recipe(id, recipe_id, &precondition, &pool).await?;
    Ok(linked(tag))
}

// Items

pub async fn list_items(query: Query, pool: Pool<Sqlite>) -> Result<Response, ApiError> {
    let query: ItemQuery = parse_query(query)?;
    let page = items::list_items(&query, &pool).await?;
    Ok(reply::page(page))
}

pub async fn get_item(
    id: Id,
    if_none_match: Option<String>,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let item = items::get_item(id, &pool).await?;
    Ok(reply::conditional(&item, if_none_match.as_deref()))
}

pub async fn create_item(body: Bytes, pool: Pool<Sqlite>) -> Result<Response, ApiError> {
    let draft: ItemDraft = parse_body(&body)?;
    let item = items::create_item(&draft, &pool).await?;
    Ok(reply::entity(&item, StatusCode::CREATED))
}

pub async fn update_item(
    id: Id,
    if_match: Option<String>,
    body: Bytes,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let draft: ItemDraft = parse_body(&body)?;
    let precondition = required_precondition(if_match)?;
    let item = items::update_item(id, &draft, &precondition, &pool).await?;
    Ok(reply::entity(&item, StatusCode::OK))
}

pub async fn delete_item(
    id: Id,
    if_match: Option<String>,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let precondition = required_precondition(if_match)?;
    items::delete_item(id, &precondition, &pool).await?;
    Ok(reply::no_content(None))
}

pub async fn get_item_ingredient(id: Id, pool: Pool<Sqlite>) -> Result<Response, ApiError> {
    let response = match item_ingredient::get_item_ingredient(id, &pool).await? {
        Some(ingredient) => reply::entity(&ingredient, StatusCode::OK),
        None => reply::json(&Value::Null),
    };
    Ok(response)
}

pub async fn link_item_ingredient(
    id: Id,
    if_match: Option<String>,
    body: Bytes,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let link: IngredientLink = parse_body(&body)?;
    let precondition = optional_precondition(if_match);
    let item = item_ingredient::link_item_ingredient(
        id,
        link.ingredient_id,
        precondition.as_ref(),
        &pool,
    )
    .await?;
    Ok(linked(EntityTag::of(&item)))
}

pub async fn unlink_item_ingredient(
    id: Id,
    if_match: Option<String>,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let precondition = required_precondition(if_match)?;
    let item = item_ingredient::unlink_item_ingredient(id, &precondition, &pool).await?;
    Ok(linked(EntityTag::of(&item)))
}

// Recipes

pub async fn list_recipes(query: Query, pool: Pool<Sqlite>) -> Result<Response, ApiError> {
    let query: RecipeQuery = parse_query(query)?;
    let page = recipes::list_recipes(&query, &pool).await?;
    Ok(reply::page(page))
}

pub async fn get_recipe(
    id: Id,
    if_none_match: Option<String>,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let recipe = recipes::get_recipe(id, &pool).await?;
    Ok(reply::conditional(&recipe, if_none_match.as_deref()))
}

pub async fn create_recipe(body: Bytes, pool: Pool<Sqlite>) -> Result<Response, ApiError> {
    let draft: RecipeDraft = parse_body(&body)?;
    let recipe = recipes::create_recipe(&draft, &pool).await?;
    Ok(reply::entity(&recipe, StatusCode::CREATED))
}

pub async fn update_recipe(
    id: Id,
    if_match: Option<String>,
    body: Bytes,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let draft: RecipeDraft = parse_body(&body)?;
    let precondition = required_precondition(if_match)?;
    let recipe = recipes::update_recipe(id, &draft, &precondition, &pool).await?;
    Ok(reply::entity(&recipe, StatusCode::OK))
}

pub async fn delete_recipe(
    id: Id,
    if_match: Option<String>,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let precondition = required_precondition(if_match)?;
    recipes::delete_recipe(id, &precondition, &pool).await?;
    Ok(reply::no_content(None))
}

pub async fn list_recipe_ingredients(id: Id, pool: Pool<Sqlite>) -> Result<Response, ApiError> {
    let rows = recipe_ingredients::list_recipe_ingredients(id, &pool).await?;
    Ok(reply::json(&rows))
}

pub async fn add_recipe_ingredients(
    id: Id,
    if_match: Option<String>,
    body: Bytes,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let links: RecipeIngredientLinks = parse_body(&body)?;
    let precondition = optional_precondition(if_match);
    let tag =
        recipe_ingredients::add_recipe_ingredients(id, &links.0, precondition.as_ref(), &pool)
            .await?;
    Ok(linked(tag))
}

pub async fn remove_recipe_ingredient(
    id: Id,
    ingredient_id: Id,
    if_match: Option<String>,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let precondition = required_precondition(if_match)?;
    let tag =
        recipe_ingredients::remove_recipe_ingredient(id, ingredient_id, &precondition, &pool)
            .await?;
    Ok(linked(tag))
}

pub async fn list_recipe_tags(id: Id, pool: Pool<Sqlite>) -> Result<Response, ApiError> {
    let tags = recipe_tags::list_recipe_tags(id, &pool).await?;
    Ok(reply::json(&tags))
}

pub async fn add_recipe_tags(
    id: Id,
    if_match: Option<String>,
    body: Bytes,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let ids: TagIds = parse_body(&body)?;
    let precondition = optional_precondition(if_match);
    let tag = recipe_tags::add_recipe_tags(id, &ids.0, precondition.as_ref(), &pool).await?;
    Ok(linked(tag))
}

pub async fn remove_recipe_tag(
    id: Id,
    tag_id: Id,
    if_match: Option<String>,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let precondition = required_precondition(if_match)?;
    let tag = recipe_tags::remove_recipe_tag(id, tag_id, &precondition, &pool).await?;
    Ok(linked(tag))
}

// Tags

pub async fn list_tags(query: Query, pool: Pool<Sqlite>) -> Result<Response, ApiError> {
    let query: TagQuery = parse_query(query)?;
    let page = tags::list_tags(&query, &pool).await?;
    Ok(reply::page(page))
}

pub async fn get_tag(
    id: Id,
    if_none_match: Option<String>,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let tag = tags::get_tag(id, &pool).await?;
    Ok(reply::conditional(&tag, if_none_match.as_deref()))
}

pub async fn create_tag(body: Bytes, pool: Pool<Sqlite>) -> Result<Response, ApiError> {
    let draft: TagDraft = parse_body(&body)?;
    let tag = tags::create_tag(&draft, &pool).await?;
    Ok(reply::entity(&tag, StatusCode::CREATED))
}

pub async fn update_tag(
    id: Id,
    if_match: Option<String>,
    body: Bytes,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let draft: TagDraft = parse_body(&body)?;
    let precondition = required_precondition(if_match)?;
    let tag = tags::update_tag(id, &draft, &precondition, &pool).await?;
    Ok(reply::entity(&tag, StatusCode::OK))
}

pub async fn delete_tag(
    id: Id,
    if_match: Option<String>,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let precondition = required_precondition(if_match)?;
    tags::delete_tag(id, &precondition, &pool).await?;
    Ok(reply::no_content(None))
}

pub async fn list_tag_recipes(id: Id, pool: Pool<Sqlite>) -> Result<Response, ApiError> {
    let recipes = recipe_tags::list_tag_recipes(id, &pool).await?;
    Ok(reply::json(&recipes))
}

pub async fn add_tag_recipes(
    id: Id,
    if_match: Option<String>,
    body: Bytes,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let ids: RecipeIds = parse_body(&body)?;
    let precondition = optional_precondition(if_match);
    let tag = recipe_tags::add_tag_recipes(id, &ids.0, precondition.as_ref(), &pool).await?;
    Ok(linked(tag))
}

pub async fn remove_tag_recipe(
    id: Id,
    recipe_id: Id,
    if_match: Option<String>,
    pool: Pool<Sqlite>,
) -> Result<Response, ApiError> {
    let precondition = required_precondition(if_match)?;
    let tag = recipe_tags::remove_tag_recipe(id, recipe_id, &precondition, &pool).await?;
    Ok(linked(tag))
}
