use std::convert::Infallible;

use sqlx::{Pool, Sqlite};
use warp::{hyper::body::Bytes, reject::Rejection, Filter, Reply};

use super::{handlers, reply};
use crate::{
    constants::{IF_MATCH_HEADER, IF_NONE_MATCH_HEADER, MAX_BODY_BYTES},
    schema::Id,
};

pub fn with_pool(
    pool: Pool<Sqlite>,
) -> impl Filter<Extract = (Pool<Sqlite>,), Error = Infallible> + Clone {
    warp::any().map(move || pool.clone())
}

pub fn with_if_match() -> impl Filter<Extract = (Option<String>,), Error = Rejection> + Copy {
    warp::header::optional::<String>(IF_MATCH_HEADER)
}

pub fn with_if_none_match() -> impl Filter<Extract = (Option<String>,), Error = Rejection> + Copy {
    warp::header::optional::<String>(IF_NONE_MATCH_HEADER)
}

pub fn with_body() -> impl Filter<Extract = (Bytes,), Error = Rejection> + Copy {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::bytes())
}

pub fn with_query() -> impl Filter<Extract = (handlers::Query,), Error = Rejection> + Copy {
    warp::query::<handlers::Query>()
}

fn ingredients(
    pool: Pool<Sqlite>,
) -> impl Filter<Extract = (warp::reply::Response,), Error = Rejection> + Clone {
    let list = warp::path!("ingredients")
        .and(warp::get())
        .and(with_query())
        .and(with_pool(pool.clone()))
        .then(handlers::list_ingredients);
    let create = warp::path!("ingredients")
        .and(warp::post())
        .and(with_body())
        .and(with_pool(pool.clone()))
        .then(handlers::create_ingredient);
    let get = warp::path!("ingredients" / Id)
        .and(warp::get())
        .and(with_if_none_match())
        .and(with_pool(pool.clone()))
        .then(handlers::get_ingredient);
    let update = warp::path!("ingredients" / Id)
        .and(warp::put())
        .and(with_if_match())
        .and(with_body())
        .and(with_pool(pool.clone()))
        .then(handlers::update_ingredient);
    let delete = warp::path!("ingredients" / Id)
        .and(warp::delete())
        .and(with_if_match())
        .and(with_pool(pool.clone()))
        .then(handlers::delete_ingredient);
    let items = warp::path!("ingredients" / Id / "items")
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .then(handlers::list_ingredient_items);
    let recipes = warp::path!("ingredients" / Id / "recipes")
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .then(handlers::list_ingredient_recipes);
    let add_recipes = warp::path!("ingredients" / Id / "recipes")
        .and(warp::post())
        .and(with_if_match())
        .and(with_body())
        .and(with_pool(pool.clone()))
        .then(handlers::add_ingredient_recipes);
    let remove_recipe = warp::path!("ingredients" / Id / "recipes" / Id)
        .and(warp::delete())
        .and(with_if_match())
        .and(with_pool(pool))
        .then(handlers::remove_ingredient_recipe);

    list.or(create)
        .unify()
        .or(get)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(items)
        .unify()
        .or(recipes)
        .unify()
        .or(add_recipes)
        .unify()
        .or(remove_recipe)
        .unify()
        .map(reply::finish)
}

fn items(
    pool: Pool<Sqlite>,
) -> impl Filter<Extract = (warp::reply::Response,), Error = Rejection> + Clone {
    let list = warp::path!("items")
        .and(warp::get())
        .and(with_query())
        .and(with_pool(pool.clone()))
        .then(handlers::list_items);
    let create = warp::path!("items")
        .and(warp::post())
        .and(with_body())
        .and(with_pool(pool.clone()))
        .then(handlers::create_item);
    let get = warp::path!("items" / Id)
        .and(warp::get())
        .and(with_if_none_match())
        .and(with_pool(pool.clone()))
        .then(handlers::get_item);
    let update = warp::path!("items" / Id)
        .and(warp::put())
        .and(with_if_match())
        .and(with_body())
        .and(with_pool(pool.clone()))
        .then(handlers::update_item);
    let delete = warp::path!("items" / Id)
        .and(warp::delete())
        .and(with_if_match())
        .and(with_pool(pool.clone()))
        .then(handlers::delete_item);
    let ingredient = warp::path!("items" / Id / "ingredient")
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .then(handlers::get_item_ingredient);
    let link = warp::path!("items" / Id / "ingredient")
        .and(warp::post())
        .and(with_if_match())
        .and(with_body())
        .and(with_pool(pool.clone()))
        .then(handlers::link_item_ingredient);
    let unlink = warp::path!("items" / Id / "ingredient")
        .and(warp::delete())
        .and(with_if_match())
        .and(with_pool(pool))
        .then(handlers::unlink_item_ingredient);

    list.or(create)
        .unify()
        .or(get)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(ingredient)
        .unify()
        .or(link)
        .unify()
        .or(unlink)
        .unify()
        .map(reply::finish)
}

fn recipes(
    pool: Pool<Sqlite>,
) -> impl Filter<Extract = (warp::reply::Response,), Error = Rejection> + Clone {
    let list = warp::path!("recipes")
        .and(warp::get())
        .and(with_query())
        .and(with_pool(pool.clone()))
        .then(handlers::list_recipes);
    let create = warp::path!("recipes")
        .and(warp::post())
        .and(with_body())
        .and(with_pool(pool.clone()))
        .then(handlers::create_recipe);
    let get = warp::path!("recipes" / Id)
        .and(warp::get())
        .and(with_if_none_match())
        .and(with_pool(pool.clone()))
        .then(handlers::get_recipe);
    let update = warp::path!("recipes" / Id)
        .and(warp::put())
        .and(with_if_match())
        .and(with_body())
        .and(with_pool(pool.clone()))
        .then(handlers::update_recipe);
    let delete = warp::path!("recipes" / Id)
        .and(warp::delete())
        .and(with_if_match())
        .and(with_pool(pool.clone()))
        .then(handlers::delete_recipe);
    let ingredients = warp::path!("recipes" / Id / "ingredients")
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .then(handlers::list_recipe_ingredients);
    let add_ingredients = warp::path!("recipes" / Id / "ingredients")
        .and(warp::post())
        .and(with_if_match())
        .and(with_body())
        .and(with_pool(pool.clone()))
        .then(handlers::add_recipe_ingredients);
    let remove_ingredient = warp::path!("recipes" / Id / "ingredients" / Id)
        .and(warp::delete())
        .and(with_if_match())
        .and(with_pool(pool.clone()))
        .then(handlers::remove_recipe_ingredient);
    let tags = warp::path!("recipes" / Id / "tags")
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .then(handlers::list_recipe_tags);
    let add_tags = warp::path!("recipes" / Id / "tags")
        .and(warp::post())
        .and(with_if_match())
        .and(with_body())
        .and(with_pool(pool.clone()))
        .then(handlers::add_recipe_tags);
    let remove_tag = warp::path!("recipes" / Id / "tags" / Id)
        .and(warp::delete())
        .and(with_if_match())
        .and(with_pool(pool))
        .then(handlers::remove_recipe_tag);

    list.or(create)
        .unify()
        .or(get)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(ingredients)
        .unify()
        .or(add_ingredients)
        .unify()
        .or(remove_ingredient)
        .unify()
        .or(tags)
        .unify()
        .or(add_tags)
        .unify()
        .or(remove_tag)
        .unify()
        .map(reply::finish)
}

fn tags(
    pool: Pool<Sqlite>,
) -> impl Filter<Extract = (warp::reply::Response,), Error = Rejection> + Clone {
    let list = warp::path!("tags")
        .and(warp::get())
        .and(with_query())
        .and(with_pool(pool.clone()))
        .then(handlers::list_tags);
    let create = warp::path!("tags")
        .and(warp::post())
        .and(with_body())
        .and(with_pool(pool.clone()))
        .then(handlers::create_tag);
    let get = warp::path!("tags" / Id)
        .and(warp::get())
        .and(with_if_none_match())
        .and(with_pool(pool.clone()))
        .then(handlers::get_tag);
    let update = warp::path!("tags" / Id)
        .and(warp::put())
        .and(with_if_match())
        .and(with_body())
        .and(with_pool(pool.clone()))
        .then(handlers::update_tag);
    let delete = warp::path!("tags" / Id)
        .and(warp::delete())
        .and(with_if_match())
        .and(with_pool(pool.clone()))
        .then(handlers::delete_tag);
    let recipes = warp::path!("tags" / Id / "recipes")
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .then(handlers::list_tag_recipes);
    let add_recipes = warp::path!("tags" / Id / "recipes")
        .and(warp::post())
        .and(with_if_match())
        .and(with_body())
        .and(with_pool(pool.clone()))
        .then(handlers::add_tag_recipes);
    let remove_recipe = warp::path!("tags" / Id / "recipes" / Id)
        .and(warp::delete())
        .and(with_if_match())
        .and(with_pool(pool))
        .then(handlers::remove_tag_recipe);

    list.or(create)
        .unify()
        .or(get)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(recipes)
        .unify()
        .or(add_recipes)
        .unify()
        .or(remove_recipe)
        .unify()
        .map(reply::finish)
}

/// The whole API, with rejections turned into JSON error bodies and every
/// request logged under `pantry_api::access`.
pub fn routes(
    pool: Pool<Sqlite>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    ingredients(pool.clone())
        .or(items(pool.clone()))
        .unify()
        .or(recipes(pool.clone()))
        .unify()
        .or(tags(pool))
        .unify()
        .recover(reply::handle_rejection)
        .with(warp::log("pantry_api::access"))
}
