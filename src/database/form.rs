//! Request validation: untyped JSON or query strings in, typed drafts out.
//!
//! A [`Form`] hands out one value per declared [`Key`], records a message for
//! every field that fails, and rejects whatever keys were never asked for.

use std::{
    collections::{BTreeSet, HashMap},
    str::FromStr,
};

use serde_json::{Map, Value};

use super::{error::FieldErrors, pagination::PageRequest, schema::Id};
use crate::constants::{
    DEFAULT_PAGE_SIZE, INGREDIENT_NAME_MAX_LENGTH, MAX_PAGE_SIZE, PRODUCT_ID_MAX,
};

pub type FormData = Map<String, Value>;

pub const SCHEMA_FIELD: &str = "_schema";

const MISSING: &str = "Missing data for required field.";
const NULL: &str = "Field may not be null.";
const UNKNOWN: &str = "Unknown field.";

/// Wire name of a field plus the snake_case spelling accepted as an alias.
#[derive(Debug, Clone, Copy)]
pub struct Key {
    pub name: &'static str,
    pub alias: &'static str,
}

impl Key {
    pub const fn new(name: &'static str) -> Self {
        Self { name, alias: name }
    }

    pub const fn aliased(name: &'static str, alias: &'static str) -> Self {
        Self { name, alias }
    }
}

pub const NAME: Key = Key::new("name");
pub const AMOUNT: Key = Key::new("amount");
pub const UNIT: Key = Key::new("unit");
pub const STEPS: Key = Key::new("steps");
pub const NOTES: Key = Key::new("notes");
pub const RATING: Key = Key::new("rating");
pub const PRODUCT_ID: Key = Key::aliased("productId", "product_id");
pub const INGREDIENT_ID: Key = Key::aliased("ingredientId", "ingredient_id");
pub const RECIPE_ID: Key = Key::aliased("recipeId", "recipe_id");
pub const TAG_ID: Key = Key::aliased("tagId", "tag_id");
pub const RECIPE_INGREDIENTS: Key = Key::aliased("recipeIngredients", "recipe_ingredients");
pub const TAG_IDS: Key = Key::aliased("tagIds", "tag_ids");
pub const RECIPE_IDS: Key = Key::aliased("recipeIds", "recipe_ids");
pub const PAGE: Key = Key::new("page");
pub const PAGE_SIZE: Key = Key::aliased("pageSize", "page_size");

pub struct Form {
    inner: FormData,
    errors: FieldErrors,
}

impl Form {
    pub fn from_data(data: FormData) -> Self {
        Self {
            inner: data,
            errors: FieldErrors::new(),
        }
    }

    pub fn from_value(value: Value) -> Result<Self, FieldErrors> {
        match value {
            Value::Object(data) => Ok(Self::from_data(data)),
            _ => Err(FieldErrors::single(SCHEMA_FIELD, "Invalid input type.")),
        }
    }

    pub fn from_query(query: HashMap<String, String>) -> Self {
        Self::from_data(
            query
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect(),
        )
    }

    pub fn error(&mut self, key: Key, message: impl Into<String>) {
        self.errors.add(key.name, message);
    }

    /// Takes the raw value for `key`. The outer `None` means the key is absent.
    ///
    /// Only one spelling is taken, so a body carrying both gets the alias
    /// reported as an unknown field.
    fn take(&mut self, key: Key) -> Option<Value> {
        self.inner
            .remove(key.name)
            .or_else(|| self.inner.remove(key.alias))
    }

    /// Distinguishes missing, null and present values, recording an error for
    /// the first two when the field is required.
    fn present(&mut self, key: Key, required: bool) -> Option<Option<Value>> {
        match self.take(key) {
            None if required => {
                self.error(key, MISSING);
                None
            }
            Some(Value::Null) if required => {
                self.error(key, NULL);
                None
            }
            None | Some(Value::Null) => Some(None),
            Some(value) => Some(Some(value)),
        }
    }

    fn string(&mut self, key: Key, value: Value, min: usize, max: Option<usize>) -> Option<String> {
        let Value::String(value) = value else {
            self.error(key, "Not a valid string.");
            return None;
        };

        let length = value.chars().count();
        if length < min {
            if min == 1 {
                self.error(key, "Field may not be empty.");
            } else {
                self.error(key, format!("Shorter than minimum length {min}."));
            }
            return None;
        }
        if let Some(max) = max {
            if length > max {
                self.error(key, format!("Longer than maximum length {max}."));
                return None;
            }
        }

        Some(value)
    }

    fn integer(&mut self, key: Key, value: Value, min: i64, max: Option<i64>) -> Option<i64> {
        let parsed = match &value {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.trim().parse::<i64>().ok(),
            _ => None,
        };
        let Some(parsed) = parsed else {
            self.error(key, "Not a valid integer.");
            return None;
        };

        let in_range = parsed >= min && max.map_or(true, |max| parsed <= max);
        if !in_range {
            let message = match max {
                Some(max) => format!(
                    "Must be greater than or equal to {min} and less than or equal to {max}."
                ),
                None => format!("Must be greater than or equal to {min}."),
            };
            self.error(key, message);
            return None;
        }

        Some(parsed)
    }

    fn number<T: FromStr>(&mut self, key: Key, value: Value) -> Option<T> {
        let text = match value {
            Value::Number(number) => number.to_string(),
            Value::String(text) => text,
            _ => String::new(),
        };

        match text.trim().parse() {
            Ok(number) => Some(number),
            Err(_) => {
                self.error(key, "Not a valid number.");
                None
            }
        }
    }

    pub fn required_str(&mut self, key: Key, min: usize, max: Option<usize>) -> Option<String> {
        let value = self.present(key, true)??;
        self.string(key, value, min, max)
    }

    /// `Some(None)` when the field is absent or null.
    pub fn optional_str(&mut self, key: Key) -> Option<Option<String>> {
        match self.present(key, false)? {
            Some(value) => self.string(key, value, 0, None).map(Some),
            None => Some(None),
        }
    }

    pub fn required_int(&mut self, key: Key, min: i64, max: Option<i64>) -> Option<i64> {
        let value = self.present(key, true)??;
        self.integer(key, value, min, max)
    }

    pub fn optional_int(&mut self, key: Key, min: i64, max: Option<i64>) -> Option<Option<i64>> {
        match self.present(key, false)? {
            Some(value) => self.integer(key, value, min, max).map(Some),
            None => Some(None),
        }
    }

    pub fn required_non_negative(&mut self, key: Key) -> Option<f64> {
        let value = self.present(key, true)??;
        let number: f64 = self.number(key, value)?;

        if !number.is_finite() || number < 0.0 {
            self.error(key, "Must be greater than or equal to 0.");
            return None;
        }

        Some(number)
    }

    pub fn required_list(&mut self, key: Key) -> Option<Vec<Value>> {
        match self.present(key, true)?? {
            Value::Array(values) => Some(values),
            _ => {
                self.error(key, "Not a valid list.");
                None
            }
        }
    }

    /// Nests errors from an element of a list field under `<field>.<index>`.
    pub fn nested(&mut self, key: Key, index: usize, errors: FieldErrors) {
        self.errors.merge(&format!("{}.{index}", key.name), errors);
    }

    /// Rejects keys no getter took and builds the result once every field passed.
    pub fn finish<T>(mut self, build: impl FnOnce() -> Option<T>) -> Result<T, FieldErrors> {
        for key in self.inner.keys() {
            self.errors.add(key.as_str(), UNKNOWN);
        }

        if !self.errors.is_empty() {
            return Err(self.errors);
        }

        build().ok_or_else(|| FieldErrors::single(SCHEMA_FIELD, "Invalid input."))
    }
}

fn id_list(form: &mut Form, key: Key) -> Option<Vec<Id>> {
    let values = form.required_list(key)?;
    let mut ids = Vec::with_capacity(values.len());
    let mut seen = BTreeSet::new();

    for (index, value) in values.into_iter().enumerate() {
        let element = Key::new("");
        let mut inner = Form::from_data(FormData::new());
        match inner.integer(element, value, 0, None) {
            Some(id) if !seen.insert(id) => {
                form.errors
                    .add(format!("{}.{index}", key.name), "Duplicate id in request.");
            }
            Some(id) => ids.push(id),
            None => {
                for message in inner.errors.get("").unwrap_or_default() {
                    form.errors.add(format!("{}.{index}", key.name), message);
                }
            }
        }
    }

    Some(ids)
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngredientDraft {
    pub name: String,
}

impl TryFrom<Value> for IngredientDraft {
    type Error = FieldErrors;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut form = Form::from_value(value)?;
        let name = form.required_str(NAME, 1, Some(INGREDIENT_NAME_MAX_LENGTH));

        form.finish(|| Some(Self { name: name? }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagDraft {
    pub name: String,
}

impl TryFrom<Value> for TagDraft {
    type Error = FieldErrors;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut form = Form::from_value(value)?;
        let name = form.required_str(NAME, 1, None);

        form.finish(|| Some(Self { name: name? }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemDraft {
    pub name: String,
    pub amount: i64,
    pub product_id: Option<i64>,
    pub ingredient_id: Option<Id>,
}

impl TryFrom<Value> for ItemDraft {
    type Error = FieldErrors;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut form = Form::from_value(value)?;
        let name = form.required_str(NAME, 1, None);
        let amount = form.required_int(AMOUNT, 0, None);
        let product_id = form.optional_int(PRODUCT_ID, 0, Some(PRODUCT_ID_MAX));
        let ingredient_id = form.optional_int(INGREDIENT_ID, 0, None);

        form.finish(|| {
            Some(Self {
                name: name?,
                amount: amount?,
                product_id: product_id?,
                ingredient_id: ingredient_id?,
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeDraft {
    pub name: String,
    pub steps: String,
    pub notes: Option<String>,
    pub rating: Option<i64>,
}

impl TryFrom<Value> for RecipeDraft {
    type Error = FieldErrors;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut form = Form::from_value(value)?;
        let name = form.required_str(NAME, 1, None);
        let steps = form.required_str(STEPS, 1, None);
        let notes = form.optional_str(NOTES);
        let rating = form.optional_int(RATING, 0, None);

        form.finish(|| {
            Some(Self {
                name: name?,
                steps: steps?,
                notes: notes?,
                rating: rating?,
            })
        })
    }
}

/// Body of `POST /items/{id}/ingredient`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngredientLink {
    pub ingredient_id: Id,
}

impl TryFrom<Value> for IngredientLink {
    type Error = FieldErrors;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut form = Form::from_value(value)?;
        let ingredient_id = form.required_int(INGREDIENT_ID, 0, None);

        form.finish(|| {
            Some(Self {
                ingredient_id: ingredient_id?,
            })
        })
    }
}

/// One recipe/ingredient pairing seen from the owner's side: `target` is the
/// ingredient for a recipe owner and the recipe for an ingredient owner.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantityLink {
    pub target: Id,
    pub amount: f64,
    pub unit: String,
}

impl QuantityLink {
    fn parse(value: Value, target_key: Key) -> Result<Self, FieldErrors> {
        let mut form = Form::from_value(value)?;
        let target = form.required_int(target_key, 0, None);
        let amount = form.required_non_negative(AMOUNT);
        let unit = form.required_str(UNIT, 1, None);

        form.finish(|| {
            Some(Self {
                target: target?,
                amount: amount?,
                unit: unit?,
            })
        })
    }
}

fn quantity_links(value: Value, target_key: Key) -> Result<Vec<QuantityLink>, FieldErrors> {
    let mut form = Form::from_value(value)?;
    let mut links = Vec::new();
    let mut seen = BTreeSet::new();

    if let Some(values) = form.required_list(RECIPE_INGREDIENTS) {
        for (index, value) in values.into_iter().enumerate() {
            match QuantityLink::parse(value, target_key) {
                Ok(link) if !seen.insert(link.target) => form.nested(
                    RECIPE_INGREDIENTS,
                    index,
                    FieldErrors::single(target_key.name, "Duplicate id in request."),
                ),
                Ok(link) => links.push(link),
                Err(errors) => form.nested(RECIPE_INGREDIENTS, index, errors),
            }
        }
    }

    form.finish(|| Some(links))
}

/// Body of `POST /recipes/{id}/ingredients`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeIngredientLinks(pub Vec<QuantityLink>);

impl TryFrom<Value> for RecipeIngredientLinks {
    type Error = FieldErrors;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        quantity_links(value, INGREDIENT_ID).map(Self)
    }
}

/// Body of `POST /ingredients/{id}/recipes`.
#[derive(Debug, Clone, PartialEq)]
pub struct IngredientRecipeLinks(pub Vec<QuantityLink>);

impl TryFrom<Value> for IngredientRecipeLinks {
    type Error = FieldErrors;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        quantity_links(value, RECIPE_ID).map(Self)
    }
}

/// Body of `POST /recipes/{id}/tags`.
#[derive(Debug, Clone, PartialEq)]
pub struct TagIds(pub Vec<Id>);

impl TryFrom<Value> for TagIds {
    type Error = FieldErrors;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut form = Form::from_value(value)?;
        let ids = id_list(&mut form, TAG_IDS);

        form.finish(|| ids.map(Self))
    }
}

/// Body of `POST /tags/{id}/recipes`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeIds(pub Vec<Id>);

impl TryFrom<Value> for RecipeIds {
    type Error = FieldErrors;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut form = Form::from_value(value)?;
        let ids = id_list(&mut form, RECIPE_IDS);

        form.finish(|| ids.map(Self))
    }
}

fn page_request(form: &mut Form) -> Option<PageRequest> {
    let page = form.optional_int(PAGE, 1, None);
    let page_size = form.optional_int(PAGE_SIZE, 1, Some(MAX_PAGE_SIZE));

    Some(PageRequest {
        page: page?.unwrap_or(1),
        page_size: page_size?.unwrap_or(DEFAULT_PAGE_SIZE),
    })
}

/// Substring filter on `name`; an empty value is rejected rather than ignored.
fn name_filter(form: &mut Form) -> Option<Option<String>> {
    match form.present(NAME, false)? {
        Some(value) => form.string(NAME, value, 1, None).map(Some),
        None => Some(None),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngredientQuery {
    pub name: Option<String>,
    pub recipe_id: Option<Id>,
    pub page: PageRequest,
}

impl TryFrom<HashMap<String, String>> for IngredientQuery {
    type Error = FieldErrors;

    fn try_from(query: HashMap<String, String>) -> Result<Self, Self::Error> {
        let mut form = Form::from_query(query);
        let name = name_filter(&mut form);
        let recipe_id = form.optional_int(RECIPE_ID, 0, None);
        let page = page_request(&mut form);

        form.finish(|| {
            Some(Self {
                name: name?,
                recipe_id: recipe_id?,
                page: page?,
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemQuery {
    pub name: Option<String>,
    pub product_id: Option<i64>,
    pub ingredient_id: Option<Id>,
    pub page: PageRequest,
}

impl TryFrom<HashMap<String, String>> for ItemQuery {
    type Error = FieldErrors;

    fn try_from(query: HashMap<String, String>) -> Result<Self, Self::Error> {
        let mut form = Form::from_query(query);
        let name = name_filter(&mut form);
        let product_id = form.optional_int(PRODUCT_ID, 0, None);
        let ingredient_id = form.optional_int(INGREDIENT_ID, 0, None);
        let page = page_request(&mut form);

        form.finish(|| {
            Some(Self {
                name: name?,
                product_id: product_id?,
                ingredient_id: ingredient_id?,
                page: page?,
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeQuery {
    pub name: Option<String>,
    pub tag_id: Option<Id>,
    pub ingredient_id: Option<Id>,
    pub page: PageRequest,
}

impl TryFrom<HashMap<String, String>> for RecipeQuery {
    type Error = FieldErrors;

    fn try_from(query: HashMap<String, String>) -> Result<Self, Self::Error> {
        let mut form = Form::from_query(query);
        let name = name_filter(&mut form);
        let tag_id = form.optional_int(TAG_ID, 0, None);
        let ingredient_id = form.optional_int(INGREDIENT_ID, 0, None);
        let page = page_request(&mut form);

        form.finish(|| {
            Some(Self {
                name: name?,
                tag_id: tag_id?,
                ingredient_id: ingredient_id?,
                page: page?,
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagQuery {
    pub name: Option<String>,
    pub recipe_id: Option<Id>,
    pub page: PageRequest,
}

impl TryFrom<HashMap<String, String>> for TagQuery {
    type Error = FieldErrors;

    fn try_from(query: HashMap<String, String>) -> Result<Self, Self::Error> {
        let mut form = Form::from_query(query);
        let name = name_filter(&mut form);
        let recipe_id = form.optional_int(RECIPE_ID, 0, None);
        let page = page_request(&mut form);

        form.finish(|| {
            Some(Self {
                name: name?,
                recipe_id: recipe_id?,
                page: page?,
            })
        })
    }
}
