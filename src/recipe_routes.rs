use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::auth::CurrentUser;
use crate::error::AppResult;
use crate::extract::{ApiJson, ApiMultipart, ApiPath, ApiQuery};
use crate::media::Upload;
use crate::models::{
    serializer_for, AttrPayload, AttrQuery, AttrResponse, EntityId, Ingredient, RecipeAction,
    RecipeFilter, RecipeInput, RecipeQuery, RecipeRepresentation, Tag, WriteMode,
};
use crate::state::SharedState;
use crate::storage::RecipeAttr;

const IMAGE_FIELD: &str = "image";

pub fn router(max_upload_bytes: usize) -> Router<SharedState> {
    Router::new()
        .route("/tags", get(list_attrs::<Tag>).post(create_attr::<Tag>))
        .route(
            "/ingredients",
            get(list_attrs::<Ingredient>).post(create_attr::<Ingredient>),
        )
        .route("/recipes", get(list_recipes).post(create_recipe))
        .route(
            "/recipes/:id",
            get(retrieve_recipe)
                .put(replace_recipe)
                .patch(partial_update_recipe)
                .delete(delete_recipe),
        )
        .route(
            "/recipes/:id/upload-image",
            post(upload_image).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
}

async fn list_attrs<A>(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<AttrQuery>,
) -> AppResult<Json<Vec<AttrResponse>>>
where
    A: RecipeAttr + Send + Sync + 'static,
{
    let assigned_only = query.assigned_only()?;
    let rows = state.recipes.list_attrs::<A>(user.id, assigned_only).await;
    Ok(Json(rows.iter().map(A::response).collect()))
}

async fn create_attr<A>(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    ApiJson(payload): ApiJson<AttrPayload>,
) -> AppResult<(StatusCode, Json<AttrResponse>)>
where
    A: RecipeAttr + Send + Sync + 'static,
{
    payload.check()?;
    let name = payload.name.as_deref().unwrap_or_default();
    let row = state.recipes.create_attr::<A>(user.id, name).await?;
    Ok((StatusCode::CREATED, Json(row.response())))
}

async fn list_recipes(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<RecipeQuery>,
) -> AppResult<Json<Vec<RecipeRepresentation>>> {
    let filter = RecipeFilter::try_from(query)?;
    let recipes = state
        .recipes
        .list_recipes(user.id, &filter, serializer_for(RecipeAction::List))
        .await;
    Ok(Json(recipes))
}

async fn create_recipe(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    ApiJson(input): ApiJson<RecipeInput>,
) -> AppResult<(StatusCode, Json<RecipeRepresentation>)> {
    let payload = input.parse(WriteMode::Create)?;
    let recipe = state
        .recipes
        .create_recipe(user.id, payload, serializer_for(RecipeAction::Create))
        .await?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn retrieve_recipe(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<EntityId>,
) -> AppResult<Json<RecipeRepresentation>> {
    let recipe = state
        .recipes
        .get_recipe(user.id, id, serializer_for(RecipeAction::Retrieve))
        .await?;
    Ok(Json(recipe))
}

async fn replace_recipe(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<EntityId>,
    ApiJson(input): ApiJson<RecipeInput>,
) -> AppResult<Json<RecipeRepresentation>> {
    let payload = input.parse(WriteMode::Replace)?;
    let recipe = state
        .recipes
        .update_recipe(
            user.id,
            id,
            payload,
            WriteMode::Replace,
            serializer_for(RecipeAction::Update),
        )
        .await?;
    Ok(Json(recipe))
}

async fn partial_update_recipe(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<EntityId>,
    ApiJson(input): ApiJson<RecipeInput>,
) -> AppResult<Json<RecipeRepresentation>> {
    let payload = input.parse(WriteMode::Merge)?;
    let recipe = state
        .recipes
        .update_recipe(
            user.id,
            id,
            payload,
            WriteMode::Merge,
            serializer_for(RecipeAction::PartialUpdate),
        )
        .await?;
    Ok(Json(recipe))
}

async fn delete_recipe(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<EntityId>,
) -> AppResult<StatusCode> {
    state.recipes.delete_recipe(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_image(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<EntityId>,
    ApiMultipart(mut multipart): ApiMultipart,
) -> AppResult<Json<RecipeRepresentation>> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        if !data.is_empty() {
            upload = Some(Upload { filename, data });
        }
        break;
    }

    let recipe = state
        .recipes
        .upload_image(user.id, id, upload, serializer_for(RecipeAction::UploadImage))
        .await?;
    Ok(Json(recipe))
}
