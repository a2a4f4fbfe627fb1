use crate::media::{recipe_image_path, verify_image, MediaStore, Upload};
use crate::models::{
    AttrResponse, EntityId, Ingredient, Recipe, RecipeFilter, RecipePayload, RecipeRepresentation,
    RecipeSerializer, Tag, WriteMode,
};
use crate::ownership::{OwnedResource, OwnerScope};
use crate::store::JsonStore;
use crate::user_models::UserId;
use crate::validation::FieldErrors;
use anyhow::Context;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found.")]
    NotFound,

    #[error("Invalid input: {0:?}")]
    Invalid(FieldErrors),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<FieldErrors> for StoreError {
    fn from(errors: FieldErrors) -> Self {
        StoreError::Invalid(errors)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeBook {
    pub(crate) tags: Vec<Tag>,
    pub(crate) ingredients: Vec<Ingredient>,
    pub(crate) recipes: Vec<Recipe>,
    last_tag_id: EntityId,
    last_ingredient_id: EntityId,
    last_recipe_id: EntityId,
}

/// Name-only records that recipes point at: tags and ingredients.
pub trait RecipeAttr: OwnedResource + Clone + Sized {
    const KIND: &'static str;

    fn new(id: EntityId, owner: UserId, name: String) -> Self;

    fn name(&self) -> &str;

    fn table(book: &RecipeBook) -> &Vec<Self>;

    fn table_mut(book: &mut RecipeBook) -> &mut Vec<Self>;

    fn last_id(book: &mut RecipeBook) -> &mut EntityId;

    /// Ids of this kind referenced by `recipe`.
    fn referenced_by(recipe: &Recipe) -> &[EntityId];

    fn response(&self) -> AttrResponse {
        AttrResponse {
            id: self.id(),
            name: self.name().to_string(),
        }
    }
}

impl RecipeAttr for Tag {
    const KIND: &'static str = "tag";

    fn new(id: EntityId, owner: UserId, name: String) -> Self {
        Tag { id, user_id: owner, name }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn table(book: &RecipeBook) -> &Vec<Self> {
        &book.tags
    }

    fn table_mut(book: &mut RecipeBook) -> &mut Vec<Self> {
        &mut book.tags
    }

    fn last_id(book: &mut RecipeBook) -> &mut EntityId {
        &mut book.last_tag_id
    }

    fn referenced_by(recipe: &Recipe) -> &[EntityId] {
        &recipe.tags
    }
}

impl RecipeAttr for Ingredient {
    const KIND: &'static str = "ingredient";

    fn new(id: EntityId, owner: UserId, name: String) -> Self {
        Ingredient { id, user_id: owner, name }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn table(book: &RecipeBook) -> &Vec<Self> {
        &book.ingredients
    }

    fn table_mut(book: &mut RecipeBook) -> &mut Vec<Self> {
        &mut book.ingredients
    }

    fn last_id(book: &mut RecipeBook) -> &mut EntityId {
        &mut book.last_ingredient_id
    }

    fn referenced_by(recipe: &Recipe) -> &[EntityId] {
        &recipe.ingredients
    }
}

impl RecipeBook {
    /// The caller's tags or ingredients, name descending. With
    /// `assigned_only` only rows used by at least one of the caller's recipes
    /// are kept, each once.
    pub fn attrs<A: RecipeAttr>(&self, scope: OwnerScope, assigned_only: bool) -> Vec<A> {
        let assigned: Option<HashSet<EntityId>> = assigned_only.then(|| {
            scope
                .filter(&self.recipes)
                .flat_map(|recipe| A::referenced_by(recipe).iter().copied())
                .collect()
        });

        let mut rows: Vec<A> = scope
            .filter(A::table(self))
            .filter(|row| assigned.as_ref().map_or(true, |ids| ids.contains(&row.id())))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.name().cmp(a.name()).then(b.id().cmp(&a.id())));
        rows
    }

    pub fn add_attr<A: RecipeAttr>(&mut self, scope: OwnerScope, name: &str) -> A {
        let id = {
            let last = A::last_id(self);
            *last += 1;
            *last
        };
        let row = A::new(id, scope.owner(), name.trim().to_string());
        A::table_mut(self).push(row.clone());
        row
    }

    /// The caller's recipes, newest first.
    pub fn recipes(&self, scope: OwnerScope, filter: &RecipeFilter) -> Vec<&Recipe> {
        let mut recipes: Vec<&Recipe> = scope
            .filter(&self.recipes)
            .filter(|recipe| filter.matches(recipe))
            .collect();
        recipes.sort_by(|a, b| b.id.cmp(&a.id));
        recipes
    }

    /// Checks that every id names one of the caller's rows and returns the
    /// list without duplicates.
    fn owned_ids<A: RecipeAttr>(
        &self,
        scope: OwnerScope,
        field: &str,
        ids: &[EntityId],
        errors: &mut FieldErrors,
    ) -> Vec<EntityId> {
        let mut seen = Vec::with_capacity(ids.len());
        for id in ids {
            if scope.get(A::table(self), *id).is_none() {
                errors.add(field, format!("Invalid pk \"{id}\" - object does not exist."));
            } else if !seen.contains(id) {
                seen.push(*id);
            }
        }
        seen
    }

    /// Applies a validated payload to `recipe` according to `mode`.
    fn apply(
        &self,
        scope: OwnerScope,
        recipe: &mut Recipe,
        payload: RecipePayload,
        mode: WriteMode,
    ) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        let reset = mode != WriteMode::Merge;

        let tags = payload
            .tags
            .map(|ids| self.owned_ids::<Tag>(scope, "tags", &ids, &mut errors));
        let ingredients = payload
            .ingredients
            .map(|ids| self.owned_ids::<Ingredient>(scope, "ingredients", &ids, &mut errors));
        errors.into_result()?;

        if let Some(title) = payload.title {
            recipe.title = title.trim().to_string();
        }
        if let Some(minutes) = payload.time_minutes {
            recipe.time_minutes = u32::try_from(minutes).unwrap_or(u32::MAX);
        }
        if let Some(price) = payload.price {
            let mut price = price.normalize();
            price.rescale(2);
            recipe.price = price;
        }
        match payload.link {
            Some(link) => recipe.link = link.trim().to_string(),
            None if reset => recipe.link.clear(),
            None => {}
        }
        match tags {
            Some(ids) => recipe.tags = ids,
            None if reset => recipe.tags.clear(),
            None => {}
        }
        match ingredients {
            Some(ids) => recipe.ingredients = ids,
            None if reset => recipe.ingredients.clear(),
            None => {}
        }
        Ok(())
    }
}

pub struct RecipeStorage {
    store: JsonStore<RecipeBook>,
    media: MediaStore,
}

impl RecipeStorage {
    pub fn open(path: &Path, media: MediaStore) -> anyhow::Result<Self> {
        Ok(Self {
            store: JsonStore::open(path)?,
            media,
        })
    }

    pub fn in_memory(media: MediaStore) -> Self {
        Self {
            store: JsonStore::in_memory(),
            media,
        }
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    pub async fn list_attrs<A: RecipeAttr>(&self, owner: UserId, assigned_only: bool) -> Vec<A> {
        let book = self.store.read().await;
        book.attrs(A::scope(owner), assigned_only)
    }

    pub async fn create_attr<A: RecipeAttr>(&self, owner: UserId, name: &str) -> StoreResult<A> {
        let mut tx = self.store.begin().await;
        let row: A = tx.add_attr(A::scope(owner), name);
        tx.commit()?;

        info!(user_id = owner, id = row.id(), kind = A::KIND, "Created {}", A::KIND);
        Ok(row)
    }

    pub async fn list_recipes(
        &self,
        owner: UserId,
        filter: &RecipeFilter,
        serializer: RecipeSerializer,
    ) -> Vec<RecipeRepresentation> {
        let book = self.store.read().await;
        book.recipes(Recipe::scope(owner), filter)
            .into_iter()
            .map(|recipe| serializer.represent(recipe, &book, &self.media))
            .collect()
    }

    pub async fn get_recipe(
        &self,
        owner: UserId,
        id: EntityId,
        serializer: RecipeSerializer,
    ) -> StoreResult<RecipeRepresentation> {
        let book = self.store.read().await;
        let recipe = Recipe::scope(owner)
            .get(&book.recipes, id)
            .ok_or(StoreError::NotFound)?;
        Ok(serializer.represent(recipe, &book, &self.media))
    }

    pub async fn create_recipe(
        &self,
        owner: UserId,
        payload: RecipePayload,
        serializer: RecipeSerializer,
    ) -> StoreResult<RecipeRepresentation> {
        let scope = Recipe::scope(owner);
        let mut tx = self.store.begin().await;

        let mut recipe = Recipe {
            id: 0,
            user_id: owner,
            title: String::new(),
            time_minutes: 0,
            price: Decimal::ZERO,
            link: String::new(),
            tags: Vec::new(),
            ingredients: Vec::new(),
            image: None,
            created_at: Utc::now(),
        };
        tx.apply(scope, &mut recipe, payload, WriteMode::Create)?;

        tx.last_recipe_id += 1;
        recipe.id = tx.last_recipe_id;
        tx.recipes.push(recipe.clone());

        let repr = serializer.represent(&recipe, &tx, &self.media);
        tx.commit()?;

        info!(user_id = owner, recipe_id = recipe.id, "Created recipe");
        Ok(repr)
    }

    pub async fn update_recipe(
        &self,
        owner: UserId,
        id: EntityId,
        payload: RecipePayload,
        mode: WriteMode,
        serializer: RecipeSerializer,
    ) -> StoreResult<RecipeRepresentation> {
        let scope = Recipe::scope(owner);
        let mut tx = self.store.begin().await;

        let mut recipe = scope
            .get(&tx.recipes, id)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        tx.apply(scope, &mut recipe, payload, mode)?;

        let repr = serializer.represent(&recipe, &tx, &self.media);
        if let Some(slot) = scope.get_mut(&mut tx.recipes, id) {
            *slot = recipe;
        }
        tx.commit()?;

        info!(user_id = owner, recipe_id = id, ?mode, "Updated recipe");
        Ok(repr)
    }

    pub async fn delete_recipe(&self, owner: UserId, id: EntityId) -> StoreResult<()> {
        let scope = Recipe::scope(owner);
        let mut tx = self.store.begin().await;

        let index = scope.position(&tx.recipes, id).ok_or(StoreError::NotFound)?;
        let removed = tx.recipes.remove(index);
        tx.commit()?;

        if let Some(image) = removed.image {
            if let Err(e) = self.media.remove(&image).await {
                warn!(recipe_id = id, error = %e, "Failed to remove recipe image");
            }
        }

        info!(user_id = owner, recipe_id = id, "Deleted recipe");
        Ok(())
    }

    /// Stores the upload under a fresh name and points the recipe at it. The
    /// recipe must exist in the caller's scope before the payload is
    /// inspected.
    pub async fn upload_image(
        &self,
        owner: UserId,
        id: EntityId,
        upload: Option<Upload>,
        serializer: RecipeSerializer,
    ) -> StoreResult<RecipeRepresentation> {
        let scope = Recipe::scope(owner);
        {
            let book = self.store.read().await;
            scope.get(&book.recipes, id).ok_or(StoreError::NotFound)?;
        }

        let upload = upload.ok_or_else(|| FieldErrors::single("image", "No file was submitted."))?;
        let format = verify_image(upload.data.clone()).await?.map_err(|e| {
            warn!(recipe_id = id, error = %e, "Rejected image upload");
            FieldErrors::single(
                "image",
                "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
            )
        })?;

        let path = recipe_image_path(&upload.filename, format).map_err(|e| {
            warn!(recipe_id = id, filename = %upload.filename, "Rejected image extension");
            FieldErrors::single("image", e.to_string())
        })?;
        self.media
            .save(&path, &upload.data)
            .await
            .with_context(|| format!("Failed to store image for recipe {id}"))?;

        let mut tx = self.store.begin().await;
        let Some(index) = scope.position(&tx.recipes, id) else {
            drop(tx);
            self.discard(&path).await;
            return Err(StoreError::NotFound);
        };
        let previous = tx.recipes[index].image.replace(path.clone());
        let recipe = tx.recipes[index].clone();

        let repr = serializer.represent(&recipe, &tx, &self.media);
        if let Err(e) = tx.commit() {
            self.discard(&path).await;
            return Err(e.into());
        }

        if let Some(previous) = previous {
            self.discard(&previous).await;
        }

        info!(user_id = owner, recipe_id = id, image = %path, "Uploaded recipe image");
        Ok(repr)
    }

    async fn discard(&self, path: &str) {
        if let Err(e) = self.media.remove(path).await {
            warn!(path, error = %e, "Failed to remove image");
        }
    }
}
