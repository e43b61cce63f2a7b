//! Links between entities.
//!
//! Every mutation runs in one transaction that starts by locking the owning
//! row, so an association write and the owner's precondition check see the
//! same committed state. Targets are resolved before anything is written and
//! a batch either applies completely or not at all.

pub mod item_ingredient;
pub mod recipe_ingredients;
pub mod recipe_tags;

use sqlx::SqliteConnection;

use super::{
    actions::row_exists,
    error::{ApiError, FieldErrors},
    schema::Id,
};
use crate::concurrency::{
    etag::{EntityTag, Taggable},
    precondition::Precondition,
};

/// Current tag of the owner, checked against `precondition` when one was sent.
pub fn owner_tag<T: Taggable>(
    owner: &T,
    precondition: Option<&Precondition>,
) -> Result<EntityTag, ApiError> {
    match precondition {
        Some(precondition) => precondition.check(owner),
        None => Ok(EntityTag::of(owner)),
    }
}

/// Verifies that every `(field, id)` names a row of `table`. All misses are
/// reported together, each under its own field.
pub async fn resolve_targets(
    targets: &[(String, Id)],
    table: &str,
    entity: &str,
    conn: &mut SqliteConnection,
) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();

    for (field, id) in targets {
        if !row_exists(table, *id, conn).await? {
            errors.add(field.as_str(), format!("No {entity} exists with id {id}"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        log::warn!("Unresolved {entity} targets: {errors}");
        Err(ApiError::Unprocessable(errors))
    }
}

/// `<list>.<index>` or `<list>.<index>.<member>` for each id of a batch.
pub fn indexed_targets(list: &str, member: Option<&str>, ids: &[Id]) -> Vec<(String, Id)> {
    ids.iter()
        .enumerate()
        .map(|(index, id)| {
            let field = match member {
                Some(member) => format!("{list}.{index}.{member}"),
                None => format!("{list}.{index}"),
            };
            (field, *id)
        })
        .collect()
}

pub fn absent_link(field: &str, owner: (&str, Id), target: (&str, Id)) -> ApiError {
    log::warn!(
        "No association between {} {} and {} {}",
        owner.0,
        owner.1,
        target.0,
        target.1
    );
    ApiError::unprocessable(
        field,
        format!(
            "{} {} is not associated with {} {}",
            owner.0, owner.1, target.0, target.1
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn batch_fields_carry_their_index() {
        assert_eq!(
            indexed_targets("recipeIngredients", Some("ingredientId"), &[4, 9]),
            vec![
                (String::from("recipeIngredients.0.ingredientId"), 4),
                (String::from("recipeIngredients.1.ingredientId"), 9),
            ]
        );
        assert_eq!(
            indexed_targets("tagIds", None, &[2]),
            vec![(String::from("tagIds.0"), 2)]
        );
    }

    #[test]
    fn absent_link_is_unprocessable() {
        let error = absent_link("tagId", ("recipe", 1), ("tag", 2));

        assert_eq!(
            error.body()["errors"]["json"]["tagId"][0],
            "recipe 1 is not associated with tag 2"
        );
    }
}
