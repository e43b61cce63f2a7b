//! Entity tags: deterministic fingerprints of an entity's persisted state.
//!
//! The fingerprint covers the entity kind, its id and every client-mutable
//! field. Server-managed timestamps and expanded relations are left out, so the
//! same stored values always produce the same tag.

use std::fmt::{self, Display};

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::schema::Entity;

pub trait Taggable: Entity {
    /// Canonical view of the fields the tag is computed over.
    fn tagged_state(&self) -> Value;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityTag(String);

impl EntityTag {
    pub fn of<T: Taggable>(entity: &T) -> Self {
        // serde_json maps keep their keys sorted, so this serialization is stable
        let state = entity.tagged_state().to_string();

        let mut hasher = Sha256::new();
        hasher.update(T::NAME.as_bytes());
        hasher.update([0u8]);
        hasher.update(state.as_bytes());

        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Strong validator form used in the `ETag` header.
    pub fn header_value(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::schema::{Ingredient, Recipe, Tag};

    fn recipe() -> Recipe {
        let now = Utc::now();
        Recipe {
            id: 4,
            name: String::from("Cheesecake"),
            steps: String::from("steps here"),
            notes: None,
            rating: Some(9),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn same_state_same_tag() {
        assert_eq!(EntityTag::of(&recipe()), EntityTag::of(&recipe()));
    }

    #[test]
    fn timestamps_do_not_change_the_tag() {
        let mut later = recipe();
        later.updated_at = later.updated_at + Duration::minutes(5);

        assert_eq!(EntityTag::of(&recipe()), EntityTag::of(&later));
    }

    #[test]
    fn every_mutable_field_changes_the_tag() {
        let base = EntityTag::of(&recipe());

        let variants = [
            Recipe {
                name: String::from("Cheescak"),
                ..recipe()
            },
            Recipe {
                steps: String::from("other steps"),
                ..recipe()
            },
            Recipe {
                notes: Some(String::new()),
                ..recipe()
            },
            Recipe {
                rating: None,
                ..recipe()
            },
            Recipe { id: 5, ..recipe() },
        ];

        for variant in variants {
            assert_ne!(base, EntityTag::of(&variant), "{variant:?}");
        }
    }

    #[test]
    fn kinds_with_identical_fields_differ() {
        let ingredient = Ingredient {
            id: 1,
            name: String::from("salad"),
        };
        let tag = Tag {
            id: 1,
            name: String::from("salad"),
        };

        assert_ne!(EntityTag::of(&ingredient), EntityTag::of(&tag));
    }

    #[test]
    fn header_value_is_quoted_hex() {
        let tag = EntityTag::of(&recipe());
        let header = tag.header_value();

        assert!(header.starts_with('"') && header.ends_with('"'));
        assert_eq!(tag.as_str().len(), 64);
        assert!(tag.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
