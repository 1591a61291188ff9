use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};

use crate::{
    audit,
    dto::profile::{ChangePasswordRequest, UpdateProfileRequest},
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::User,
    policy::{Capability, authorize},
    response::{ApiResponse, Meta},
    services::auth_service::{hash_password, normalize_email, validate_password, verify_password},
    state::AppState,
};

pub async fn get_profile(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    authorize(user, Capability::ManageProfile)?;
    let model = find_user(state, user).await?;
    Ok(ApiResponse::success("Profile", User::from(model), Some(Meta::empty())))
}

#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id))]
pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<User>> {
    authorize(user, Capability::ManageProfile)?;
    let existing = find_user(state, user).await?;

    let mut active: UserActive = existing.into();
    if let Some(email) = payload.email {
        let email = normalize_email(&email)?;
        let taken = Users::find()
            .filter(UserCol::Email.eq(email.as_str()))
            .filter(UserCol::Id.ne(user.user_id))
            .one(&state.orm)
            .await?;
        if taken.is_some() {
            return Err(AppError::Conflict("Email is already taken".into()));
        }
        active.email = Set(email);
    }
    if let Some(first_name) = payload.first_name {
        active.first_name = Set(first_name.trim().to_string());
    }
    if let Some(last_name) = payload.last_name {
        active.last_name = Set(last_name.trim().to_string());
    }
    if let Some(phone) = payload.phone {
        let phone = phone.trim().to_string();
        active.phone = Set((!phone.is_empty()).then_some(phone));
    }

    let updated = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "profile_update",
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::success("Profile updated", User::from(updated), Some(Meta::empty())))
}

#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id))]
pub async fn change_password(
    state: &AppState,
    user: &AuthUser,
    payload: ChangePasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    authorize(user, Capability::ManageProfile)?;
    let existing = find_user(state, user).await?;

    if !verify_password(&payload.current_password, &existing.password_hash)? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }
    validate_password(&payload.new_password)?;

    let mut active: UserActive = existing.into();
    active.password_hash = Set(hash_password(&payload.new_password)?);
    active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "password_change",
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::message("Password updated successfully"))
}

async fn find_user(state: &AppState, user: &AuthUser) -> AppResult<UserModel> {
    Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("User"))
}
