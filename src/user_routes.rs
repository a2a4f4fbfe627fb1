use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use crate::auth::CurrentUser;
use crate::error::AppResult;
use crate::extract::ApiJson;
use crate::state::SharedState;
use crate::user_models::{
    CreateUserRequest, TokenRequest, TokenResponse, UpdateUserRequest, UserResponse,
};
use crate::user_storage::UserChanges;
use crate::validation::{FieldErrors, NON_FIELD};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/create", post(create_user))
        .route("/token", post(create_token))
        .route(
            "/me",
            get(get_profile).put(replace_profile).patch(update_profile),
        )
}

async fn create_user(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    payload.check()?;

    let user = state
        .users
        .create_user(
            payload.email.as_deref().unwrap_or_default(),
            payload.password.as_deref().unwrap_or_default(),
            payload.name.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

async fn create_token(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<TokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    payload.check()?;

    let token = state
        .users
        .issue_token(
            payload.email.as_deref().unwrap_or_default(),
            payload.password.as_deref().unwrap_or_default(),
        )
        .await?
        .ok_or_else(|| {
            FieldErrors::single(NON_FIELD, "Unable to authenticate with provided credentials")
        })?;

    Ok(Json(TokenResponse { token: token.key }))
}

async fn get_profile(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from(&user))
}

async fn replace_profile(
    State(state): State<SharedState>,
    user: CurrentUser,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    save_profile(state, user, payload, false).await
}

async fn update_profile(
    State(state): State<SharedState>,
    user: CurrentUser,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    save_profile(state, user, payload, true).await
}

async fn save_profile(
    state: SharedState,
    CurrentUser(user): CurrentUser,
    payload: UpdateUserRequest,
    partial: bool,
) -> AppResult<Json<UserResponse>> {
    payload.check(partial)?;

    let changes = UserChanges {
        email: payload.email,
        name: payload.name,
        password: payload.password,
    };
    let updated = state.users.update_user(user.id, changes).await?;

    info!(user_id = user.id, partial, "Profile saved");
    Ok(Json(UserResponse::from(&updated)))
}
