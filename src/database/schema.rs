use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::concurrency::etag::Taggable;

pub type Id = i64;

/// A persisted row addressable by a surrogate id.
pub trait Entity {
    /// Singular name used in client-facing messages.
    const NAME: &'static str;
    const TABLE: &'static str;

    fn id(&self) -> Id;
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize)]
pub struct Ingredient {
    pub id: Id,
    pub name: String,
}

impl Entity for Ingredient {
    const NAME: &'static str = "ingredient";
    const TABLE: &'static str = "ingredients";

    fn id(&self) -> Id {
        self.id
    }
}

impl Taggable for Ingredient {
    fn tagged_state(&self) -> Value {
        json!({ "id": self.id, "name": self.name })
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ItemRow {
    pub id: Id,
    pub name: String,
    pub amount: i64,
    pub product_id: Option<i64>,
    pub ingredient_id: Option<Id>,
    pub ingredient_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: Id,
    pub name: String,
    pub amount: i64,
    pub product_id: Option<i64>,
    pub ingredient_id: Option<Id>,
    pub ingredient: Option<Ingredient>,
    pub updated_at: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        let ingredient = match (row.ingredient_id, row.ingredient_name) {
            (Some(id), Some(name)) => Some(Ingredient { id, name }),
            _ => None,
        };

        Self {
            id: row.id,
            name: row.name,
            amount: row.amount,
            product_id: row.product_id,
            ingredient_id: ingredient.as_ref().map(|ingredient| ingredient.id),
            ingredient,
            updated_at: row.updated_at,
        }
    }
}

impl Entity for Item {
    const NAME: &'static str = "item";
    const TABLE: &'static str = "items";

    fn id(&self) -> Id {
        self.id
    }
}

impl Taggable for Item {
    fn tagged_state(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "amount": self.amount,
            "productId": self.product_id,
            "ingredientId": self.ingredient_id,
        })
    }
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: Id,
    pub name: String,
    pub steps: String,
    pub notes: Option<String>,
    pub rating: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Recipe {
    const NAME: &'static str = "recipe";
    const TABLE: &'static str = "recipes";

    fn id(&self) -> Id {
        self.id
    }
}

impl Taggable for Recipe {
    fn tagged_state(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "steps": self.steps,
            "notes": self.notes,
            "rating": self.rating,
        })
    }
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub id: Id,
    pub name: String,
}

impl Entity for Tag {
    const NAME: &'static str = "tag";
    const TABLE: &'static str = "tags";

    fn id(&self) -> Id {
        self.id
    }
}

impl Taggable for Tag {
    fn tagged_state(&self) -> Value {
        json!({ "id": self.id, "name": self.name })
    }
}

/// Recipe/ingredient association joined with the ingredient it points at.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct RecipeIngredientRow {
    pub recipe_id: Id,
    pub ingredient_id: Id,
    pub ingredient_name: String,
    pub amount: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeIngredient {
    pub ingredient: Ingredient,
    pub amount: f64,
    pub unit: String,
}

impl From<RecipeIngredientRow> for RecipeIngredient {
    fn from(row: RecipeIngredientRow) -> Self {
        Self {
            ingredient: Ingredient {
                id: row.ingredient_id,
                name: row.ingredient_name,
            },
            amount: row.amount,
            unit: row.unit,
        }
    }
}

/// Recipe/ingredient association joined with the recipe it belongs to.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct IngredientRecipeRow {
    pub id: Id,
    pub name: String,
    pub steps: String,
    pub notes: Option<String>,
    pub rating: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub amount: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngredientRecipe {
    pub recipe: Recipe,
    pub amount: f64,
    pub unit: String,
}

impl From<IngredientRecipeRow> for IngredientRecipe {
    fn from(row: IngredientRecipeRow) -> Self {
        Self {
            recipe: Recipe {
                id: row.id,
                name: row.name,
                steps: row.steps,
                notes: row.notes,
                rating: row.rating,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            amount: row.amount,
            unit: row.unit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row() -> ItemRow {
        ItemRow {
            id: 1,
            name: String::from("Kroger Eggs"),
            amount: 12,
            product_id: Some(123456),
            ingredient_id: Some(1),
            ingredient_name: Some(String::from("Eggs")),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn item_expands_its_ingredient() {
        let item = Item::from(row());

        assert_eq!(
            item.ingredient,
            Some(Ingredient {
                id: 1,
                name: String::from("Eggs")
            })
        );

        let body = serde_json::to_value(&item).unwrap();
        assert_eq!(body["productId"], 123456);
        assert_eq!(body["ingredientId"], 1);
        assert_eq!(body["ingredient"]["name"], "Eggs");
        assert!(body.get("updatedAt").is_some());
    }

    #[test]
    fn unlinked_item_serializes_null_ingredient() {
        let item = Item::from(ItemRow {
            ingredient_id: None,
            ingredient_name: None,
            ..row()
        });

        let body = serde_json::to_value(&item).unwrap();
        assert_eq!(body["ingredient"], Value::Null);
        assert_eq!(body["ingredientId"], Value::Null);
    }
}
