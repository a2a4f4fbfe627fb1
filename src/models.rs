use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use validator::Validate;

use crate::media::MediaStore;
use crate::ownership::{OwnedResource, OwnerScope};
use crate::storage::RecipeBook;
use crate::user_models::UserId;
use crate::validation::{
    decimal_field, integer_field, validate_link, validate_price, FieldErrors,
};

pub type EntityId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: EntityId,
    pub user_id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: EntityId,
    pub user_id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: EntityId,
    pub user_id: UserId,
    pub title: String,
    pub time_minutes: u32,
    pub price: Decimal,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub tags: Vec<EntityId>,
    #[serde(default)]
    pub ingredients: Vec<EntityId>,
    /// Path below the media root, e.g. `uploads/recipe/<uuid>.jpg`.
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

macro_rules! owned {
    ($($ty:ty),*) => {$(
        impl OwnedResource for $ty {
            fn id(&self) -> EntityId {
                self.id
            }

            fn owner(&self) -> UserId {
                self.user_id
            }
        }
    )*};
}

owned!(Tag, Ingredient, Recipe);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Display for Ingredient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

// Tag and ingredient wire shapes

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrResponse {
    pub id: EntityId,
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AttrPayload {
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub name: Option<String>,
}

impl AttrPayload {
    pub fn check(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.require_text("name", self.name.as_deref(), false);
        errors.absorb(self.validate());
        errors.into_result()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AttrQuery {
    /// Integer flag; any non-zero value keeps only rows used by a recipe.
    #[serde(default)]
    pub assigned_only: Option<String>,
}

impl AttrQuery {
    pub fn assigned_only(&self) -> Result<bool, FieldErrors> {
        match self.assigned_only.as_deref().map(str::trim) {
            None | Some("") => Ok(false),
            Some(raw) => raw
                .parse::<i64>()
                .map(|flag| flag != 0)
                .map_err(|_| FieldErrors::single("assigned_only", "A valid integer is required.")),
        }
    }
}

// Recipe wire shapes

/// How a write treats fields missing from the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    /// PUT: required fields must be present, optional ones reset.
    Replace,
    /// PATCH: absent fields keep their stored value.
    Merge,
}

/// A recipe body as sent. Numeric fields are kept raw so a badly typed
/// value is reported against its own field.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeInput {
    pub title: Option<String>,
    pub time_minutes: Option<Value>,
    pub price: Option<Value>,
    pub link: Option<String>,
    pub tags: Option<Vec<EntityId>>,
    pub ingredients: Option<Vec<EntityId>>,
}

impl RecipeInput {
    /// Converts and validates the body for `mode`.
    pub fn parse(self, mode: WriteMode) -> Result<RecipePayload, FieldErrors> {
        let mut errors = FieldErrors::new();
        let payload = RecipePayload {
            title: self.title,
            time_minutes: integer_field("time_minutes", self.time_minutes, &mut errors),
            price: decimal_field("price", self.price, &mut errors),
            link: self.link,
            tags: self.tags,
            ingredients: self.ingredients,
        };

        if let Err(more) = payload.check(mode) {
            errors.merge(more);
        }
        errors.into_result().map(|_| payload)
    }
}

#[derive(Debug, Default, Validate)]
pub struct RecipePayload {
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub title: Option<String>,

    #[validate(range(
        min = 0,
        max = 2_147_483_647,
        message = "Ensure this value is between 0 and 2147483647."
    ))]
    pub time_minutes: Option<i64>,

    #[validate(custom(function = "validate_price"))]
    pub price: Option<Decimal>,

    #[validate(
        length(max = 255, message = "Ensure this field has no more than 255 characters."),
        custom(function = "validate_link")
    )]
    pub link: Option<String>,

    pub tags: Option<Vec<EntityId>>,

    pub ingredients: Option<Vec<EntityId>>,
}

impl RecipePayload {
    pub fn check(&self, mode: WriteMode) -> Result<(), FieldErrors> {
        let partial = mode == WriteMode::Merge;
        let mut errors = FieldErrors::new();
        errors.require_text("title", self.title.as_deref(), partial);
        errors.require("time_minutes", self.time_minutes.as_ref(), partial);
        errors.require("price", self.price.as_ref(), partial);
        errors.absorb(self.validate());
        errors.into_result()
    }
}

/// Comma-separated id filters on the recipe list.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeQuery {
    pub tags: Option<String>,
    pub ingredients: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecipeFilter {
    pub tags: Option<Vec<EntityId>>,
    pub ingredients: Option<Vec<EntityId>>,
}

impl RecipeFilter {
    pub fn matches(&self, recipe: &Recipe) -> bool {
        let any_of = |wanted: &Option<Vec<EntityId>>, have: &[EntityId]| {
            wanted
                .as_ref()
                .map_or(true, |ids| ids.iter().any(|id| have.contains(id)))
        };
        any_of(&self.tags, &recipe.tags) && any_of(&self.ingredients, &recipe.ingredients)
    }
}

impl TryFrom<RecipeQuery> for RecipeFilter {
    type Error = FieldErrors;

    fn try_from(query: RecipeQuery) -> Result<Self, FieldErrors> {
        fn ids(field: &str, raw: Option<String>, errors: &mut FieldErrors) -> Option<Vec<EntityId>> {
            let raw = raw?;
            let mut parsed = Vec::new();
            for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                match part.parse() {
                    Ok(id) => parsed.push(id),
                    Err(_) => errors.add(field, format!("\"{part}\" is not a valid id.")),
                }
            }
            Some(parsed)
        }

        let mut errors = FieldErrors::new();
        let filter = RecipeFilter {
            tags: ids("tags", query.tags, &mut errors),
            ingredients: ids("ingredients", query.ingredients, &mut errors),
        };
        errors.into_result().map(|_| filter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeAction {
    List,
    Create,
    Retrieve,
    Update,
    PartialUpdate,
    UploadImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeSerializer {
    /// Identifying fields only.
    List,
    /// Full tag and ingredient objects plus the image.
    Detail,
    Image,
}

pub fn serializer_for(action: RecipeAction) -> RecipeSerializer {
    match action {
        RecipeAction::Retrieve => RecipeSerializer::Detail,
        RecipeAction::UploadImage => RecipeSerializer::Image,
        RecipeAction::List
        | RecipeAction::Create
        | RecipeAction::Update
        | RecipeAction::PartialUpdate => RecipeSerializer::List,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub id: EntityId,
    pub title: String,
    pub time_minutes: u32,
    pub price: Decimal,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeDetail {
    pub id: EntityId,
    pub title: String,
    pub time_minutes: u32,
    pub price: Decimal,
    pub link: String,
    pub tags: Vec<AttrResponse>,
    pub ingredients: Vec<AttrResponse>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeImage {
    pub id: EntityId,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecipeRepresentation {
    List(RecipeSummary),
    Detail(RecipeDetail),
    Image(RecipeImage),
}

impl RecipeSerializer {
    /// Renders `recipe`. Related rows are resolved through the owner's scope,
    /// so a dangling or foreign id is silently left out.
    pub fn represent(self, recipe: &Recipe, book: &RecipeBook, media: &MediaStore) -> RecipeRepresentation {
        let image = recipe.image.as_deref().map(|path| media.url_for(path));

        match self {
            RecipeSerializer::List => RecipeRepresentation::List(RecipeSummary {
                id: recipe.id,
                title: recipe.title.clone(),
                time_minutes: recipe.time_minutes,
                price: recipe.price,
                link: recipe.link.clone(),
            }),
            RecipeSerializer::Detail => {
                let scope = Recipe::scope(recipe.user_id);
                RecipeRepresentation::Detail(RecipeDetail {
                    id: recipe.id,
                    title: recipe.title.clone(),
                    time_minutes: recipe.time_minutes,
                    price: recipe.price,
                    link: recipe.link.clone(),
                    tags: related(&scope, &book.tags, &recipe.tags, |t| &t.name),
                    ingredients: related(&scope, &book.ingredients, &recipe.ingredients, |i| &i.name),
                    image,
                })
            }
            RecipeSerializer::Image => RecipeRepresentation::Image(RecipeImage {
                id: recipe.id,
                image,
            }),
        }
    }
}

fn related<R: OwnedResource>(
    scope: &OwnerScope,
    rows: &[R],
    ids: &[EntityId],
    name: impl Fn(&R) -> &String,
) -> Vec<AttrResponse> {
    ids.iter()
        .filter_map(|id| scope.get(rows, *id))
        .map(|row| AttrResponse {
            id: row.id(),
            name: name(row).clone(),
        })
        .collect()
}
