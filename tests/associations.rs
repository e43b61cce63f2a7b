mod common;

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{body, create, current_tag, etag, pool, request, with_body};
use pantry_api::filters::routes;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn updated_at(entity: &Value) -> DateTime<Utc> {
    entity["updatedAt"].as_str().unwrap().parse().unwrap()
}

fn pancakes() -> Value {
    json!({ "name": "Pancakes", "steps": "Mix and fry" })
}

#[tokio::test]
async fn deleting_an_ingredient_clears_the_item_reference() {
    let api = routes(pool().await);
    create(&api, "/ingredients", json!({ "name": "Eggs" })).await;
    let (item, item_tag) = create(
        &api,
        "/items",
        json!({ "name": "Kroger Eggs", "amount": 12, "product_id": 123456, "ingredient_id": 1 }),
    )
    .await;

    let response = request("GET", "/items/1/ingredient").reply(&api).await;
    assert_eq!(response.status(), 200);
    assert_eq!(body(&response), json!({ "id": 1, "name": "Eggs" }));

    tokio::time::sleep(Duration::from_millis(5)).await;

    let tag = current_tag(&api, "/ingredients/1").await;
    let response = request("DELETE", "/ingredients/1")
        .header("if-match", &tag)
        .reply(&api)
        .await;
    assert_eq!(response.status(), 204);

    let response = request("GET", "/items/1").reply(&api).await;
    assert_eq!(response.status(), 200);
    assert_ne!(etag(&response), item_tag);

    let unlinked = body(&response);
    assert_eq!(unlinked["ingredient"], Value::Null);
    assert_eq!(unlinked["ingredientId"], Value::Null);
    assert!(updated_at(&unlinked) > updated_at(&item));

    let response = request("GET", "/items/1/ingredient").reply(&api).await;
    assert_eq!(response.status(), 200);
    assert_eq!(body(&response), Value::Null);
}

#[tokio::test]
async fn recipe_ingredient_lifecycle() {
    let api = routes(pool().await);
    let (recipe, _) = create(&api, "/recipes", pancakes()).await;
    let (ingredient, _) = create(&api, "/ingredients", json!({ "name": "Flour" })).await;
    let recipe_path = format!("/recipes/{}/ingredients", recipe["id"]);

    let response = with_body(
        "POST",
        &recipe_path,
        &json!({
            "recipe_ingredients": [
                { "ingredient_id": ingredient["id"], "amount": 2, "unit": "cups" }
            ]
        }),
    )
    .reply(&api)
    .await;
    assert_eq!(response.status(), 204);

    let response = request("GET", &recipe_path).reply(&api).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        body(&response),
        json!([{ "ingredient": { "id": 1, "name": "Flour" }, "amount": 2.0, "unit": "cups" }])
    );

    let link_path = format!("{recipe_path}/{}", ingredient["id"]);
    let tag = current_tag(&api, "/recipes/1").await;

    let response = request("DELETE", &link_path)
        .header("if-match", &tag)
        .reply(&api)
        .await;
    assert_eq!(response.status(), 204);

    let response = request("DELETE", &link_path)
        .header("if-match", &tag)
        .reply(&api)
        .await;
    assert_eq!(response.status(), 422);
    assert!(body(&response)["errors"]["json"]["ingredientId"].is_array());
}

#[tokio::test]
async fn repeated_recipe_ingredient_updates_the_quantity() {
    let api = routes(pool().await);
    create(&api, "/recipes", pancakes()).await;
    create(&api, "/ingredients", json!({ "name": "Milk" })).await;

    for (amount, unit) in [(1.5, "cups"), (300.0, "ml")] {
        let response = with_body(
            "POST",
            "/recipes/1/ingredients",
            &json!({ "recipeIngredients": [{ "ingredientId": 1, "amount": amount, "unit": unit }] }),
        )
        .reply(&api)
        .await;
        assert_eq!(response.status(), 204);
    }

    let response = request("GET", "/recipes/1/ingredients").reply(&api).await;
    let rows = body(&response);
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["amount"], 300.0);
    assert_eq!(rows[0]["unit"], "ml");
}

#[tokio::test]
async fn bulk_add_with_a_missing_target_persists_nothing() {
    let api = routes(pool().await);
    create(&api, "/recipes", pancakes()).await;
    create(&api, "/ingredients", json!({ "name": "Flour" })).await;

    let response = with_body(
        "POST",
        "/recipes/1/ingredients",
        &json!({
            "recipeIngredients": [
                { "ingredientId": 1, "amount": 2, "unit": "cups" },
                { "ingredientId": 99, "amount": 1, "unit": "pinch" }
            ]
        }),
    )
    .reply(&api)
    .await;
    assert_eq!(response.status(), 422);
    assert_eq!(
        body(&response)["errors"]["json"],
        json!({ "recipeIngredients.1.ingredientId": ["No ingredient exists with id 99"] })
    );

    let response = request("GET", "/recipes/1/ingredients").reply(&api).await;
    assert_eq!(body(&response), json!([]));
}

#[tokio::test]
async fn duplicate_targets_in_one_request_are_rejected() {
    let api = routes(pool().await);
    create(&api, "/recipes", pancakes()).await;
    create(&api, "/tags", json!({ "name": "breakfast" })).await;

    let response = with_body("POST", "/recipes/1/tags", &json!({ "tagIds": [1, 1] }))
        .reply(&api)
        .await;
    assert_eq!(response.status(), 422);
    assert_eq!(
        body(&response)["errors"]["json"],
        json!({ "tagIds.1": ["Duplicate id in request."] })
    );
}

#[tokio::test]
async fn adding_a_tag_twice_is_idempotent() {
    let api = routes(pool().await);
    create(&api, "/recipes", pancakes()).await;
    create(&api, "/tags", json!({ "name": "breakfast" })).await;

    for _ in 0..2 {
        let response = with_body("POST", "/recipes/1/tags", &json!({ "tagIds": [1] }))
            .reply(&api)
            .await;
        assert_eq!(response.status(), 204);
    }

    let response = request("GET", "/recipes/1/tags").reply(&api).await;
    assert_eq!(body(&response), json!([{ "id": 1, "name": "breakfast" }]));

    let response = request("GET", "/tags/1/recipes").reply(&api).await;
    let recipes = body(&response);
    assert_eq!(recipes.as_array().unwrap().len(), 1);
    assert_eq!(recipes[0]["name"], "Pancakes");
}

#[tokio::test]
async fn association_post_honours_a_supplied_precondition() {
    let api = routes(pool().await);
    let (_, recipe_tag) = create(&api, "/recipes", pancakes()).await;
    create(&api, "/tags", json!({ "name": "breakfast" })).await;

    let response = with_body("POST", "/recipes/1/tags", &json!({ "tagIds": [1] }))
        .header("if-match", "\"stale\"")
        .reply(&api)
        .await;
    assert_eq!(response.status(), 412);

    let response = with_body("POST", "/recipes/1/tags", &json!({ "tagIds": [1] }))
        .header("if-match", &recipe_tag)
        .reply(&api)
        .await;
    assert_eq!(response.status(), 204);
    assert_eq!(etag(&response), recipe_tag);
}

#[tokio::test]
async fn association_delete_requires_if_match() {
    let api = routes(pool().await);
    create(&api, "/recipes", pancakes()).await;
    create(&api, "/tags", json!({ "name": "breakfast" })).await;
    with_body("POST", "/tags/1/recipes", &json!({ "recipeIds": [1] }))
        .reply(&api)
        .await;

    let response = request("DELETE", "/tags/1/recipes/1").reply(&api).await;
    assert_eq!(response.status(), 428);

    let tag = current_tag(&api, "/tags/1").await;
    let response = request("DELETE", "/tags/1/recipes/1")
        .header("if-match", &tag)
        .reply(&api)
        .await;
    assert_eq!(response.status(), 204);

    let response = request("GET", "/recipes/1/tags").reply(&api).await;
    assert_eq!(body(&response), json!([]));
}

#[tokio::test]
async fn association_on_a_missing_owner_is_not_found() {
    let api = routes(pool().await);

    let response = with_body("POST", "/recipes/5/tags", &json!({ "tagIds": [1] }))
        .reply(&api)
        .await;
    assert_eq!(response.status(), 404);

    let response = request("GET", "/ingredients/5/recipes").reply(&api).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn ingredient_side_of_recipe_links() {
    let api = routes(pool().await);
    create(&api, "/recipes", pancakes()).await;
    create(&api, "/ingredients", json!({ "name": "Butter" })).await;

    let response = with_body(
        "POST",
        "/ingredients/1/recipes",
        &json!({ "recipeIngredients": [{ "recipeId": 1, "amount": 50, "unit": "g" }] }),
    )
    .reply(&api)
    .await;
    assert_eq!(response.status(), 204);

    let response = request("GET", "/ingredients/1/recipes").reply(&api).await;
    let rows = body(&response);
    assert_eq!(rows[0]["recipe"]["name"], "Pancakes");
    assert_eq!(rows[0]["unit"], "g");

    let response = request("GET", "/recipes?ingredientId=1").reply(&api).await;
    assert_eq!(body(&response).as_array().unwrap().len(), 1);

    let response = request("GET", "/ingredients?recipeId=1").reply(&api).await;
    assert_eq!(body(&response), json!([{ "id": 1, "name": "Butter" }]));
}

#[tokio::test]
async fn deleting_a_recipe_cascades_its_links() {
    let api = routes(pool().await);
    create(&api, "/recipes", pancakes()).await;
    create(&api, "/tags", json!({ "name": "breakfast" })).await;
    with_body("POST", "/recipes/1/tags", &json!({ "tagIds": [1] }))
        .reply(&api)
        .await;

    let tag = current_tag(&api, "/recipes/1").await;
    let response = request("DELETE", "/recipes/1")
        .header("if-match", &tag)
        .reply(&api)
        .await;
    assert_eq!(response.status(), 204);

    let response = request("GET", "/tags/1/recipes").reply(&api).await;
    assert_eq!(body(&response), json!([]));
}

#[tokio::test]
async fn item_ingredient_link_rules() {
    let api = routes(pool().await);
    create(&api, "/ingredients", json!({ "name": "Eggs" })).await;
    create(&api, "/ingredients", json!({ "name": "Milk" })).await;
    let (_, created_tag) = create(&api, "/items", json!({ "name": "Carton", "amount": 1 })).await;

    let response = request("DELETE", "/items/1/ingredient")
        .header("if-match", &created_tag)
        .reply(&api)
        .await;
    assert_eq!(response.status(), 422);

    let response = with_body("POST", "/items/1/ingredient", &json!({ "ingredientId": 1 }))
        .reply(&api)
        .await;
    assert_eq!(response.status(), 204);
    let linked_tag = etag(&response);
    assert_ne!(linked_tag, created_tag);
    assert_eq!(current_tag(&api, "/items/1").await, linked_tag);

    let response = with_body("POST", "/items/1/ingredient", &json!({ "ingredientId": 1 }))
        .reply(&api)
        .await;
    assert_eq!(response.status(), 204);
    assert_eq!(etag(&response), linked_tag);

    let response = with_body("POST", "/items/1/ingredient", &json!({ "ingredientId": 2 }))
        .reply(&api)
        .await;
    assert_eq!(response.status(), 422);
    assert!(body(&response)["errors"]["json"]["ingredientId"].is_array());

    let response = request("GET", "/ingredients/1/items").reply(&api).await;
    assert_eq!(body(&response)[0]["name"], "Carton");

    let response = request("GET", "/items?ingredientId=1").reply(&api).await;
    assert_eq!(body(&response).as_array().unwrap().len(), 1);

    let response = request("DELETE", "/items/1/ingredient")
        .header("if-match", &linked_tag)
        .reply(&api)
        .await;
    assert_eq!(response.status(), 204);
    assert_eq!(etag(&response), created_tag);
}

#[tokio::test]
async fn tag_filter_on_recipes() {
    let api = routes(pool().await);
    create(&api, "/recipes", pancakes()).await;
    create(&api, "/recipes", json!({ "name": "Omelette", "steps": "Whisk and cook" })).await;
    create(&api, "/tags", json!({ "name": "sweet" })).await;
    with_body("POST", "/tags/1/recipes", &json!({ "recipeIds": [1] }))
        .reply(&api)
        .await;

    let response = request("GET", "/recipes?tagId=1").reply(&api).await;
    let recipes = body(&response);
    assert_eq!(recipes.as_array().unwrap().len(), 1);
    assert_eq!(recipes[0]["name"], "Pancakes");

    let response = request("GET", "/tags?recipeId=2").reply(&api).await;
    assert_eq!(body(&response), json!([]));
}
