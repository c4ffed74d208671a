//! Member management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::member::{CreateMember, Member, UpdateMember},
    AppState,
};

use super::AuthenticatedUser;

/// Member list filters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct MemberQuery {
    /// Exact email match
    pub email: Option<String>,
    /// Exact member code match
    pub code: Option<String>,
}

/// List members
#[utoipa::path(
    get,
    path = "/members",
    tag = "members",
    security(("bearer_auth" = [])),
    params(MemberQuery),
    responses(
        (status = 200, description = "List of members", body = Vec<Member>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_members(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<MemberQuery>,
) -> AppResult<Json<Vec<Member>>> {
    let members = &state.services.members;

    let found = match (query.email, query.code) {
        (None, None) => return Ok(Json(members.list_members().await?)),
        (Some(email), None) => members.get_member_by_email(&email).await,
        (None, Some(code)) => members.get_member_by_code(&code).await,
        (Some(email), Some(code)) => members
            .get_member_by_email(&email)
            .await
            .and_then(|m| {
                if m.member_code == code {
                    Ok(m)
                } else {
                    Err(AppError::NotFound(format!("Member with code {} not found", code)))
                }
            }),
    };

    match found {
        Ok(member) => Ok(Json(vec![member])),
        Err(AppError::NotFound(_)) => Ok(Json(Vec::new())),
        Err(e) => Err(e),
    }
}

/// Get member details by ID
#[utoipa::path(
    get,
    path = "/members/{id}",
    tag = "members",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Member ID")),
    responses(
        (status = 200, description = "Member details", body = Member),
        (status = 404, description = "Member not found")
    )
)]
pub async fn get_member(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Member>> {
    let member = state.services.members.get_member(id).await?;
    Ok(Json(member))
}

/// Enroll a new member
#[utoipa::path(
    post,
    path = "/members",
    tag = "members",
    security(("bearer_auth" = [])),
    request_body = CreateMember,
    responses(
        (status = 201, description = "Member enrolled", body = Member),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Email already exists")
    )
)]
pub async fn create_member(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(request): Json<CreateMember>,
) -> AppResult<(StatusCode, Json<Member>)> {
    request.validate()?;

    tracing::debug!("{} enrolls member {}", user.username, request.email);
    let member = state.services.members.enroll(request).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

/// Update a member, including suspending or reactivating them
#[utoipa::path(
    put,
    path = "/members/{id}",
    tag = "members",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Member ID")),
    request_body = UpdateMember,
    responses(
        (status = 200, description = "Member updated", body = Member),
        (status = 404, description = "Member not found"),
        (status = 409, description = "Email already exists")
    )
)]
pub async fn update_member(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateMember>,
) -> AppResult<Json<Member>> {
    request.validate()?;

    tracing::debug!("{} updates member {}", user.username, id);
    let member = state.services.members.update_member(id, request).await?;
    Ok(Json(member))
}

/// Delete a member
#[utoipa::path(
    delete,
    path = "/members/{id}",
    tag = "members",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Member ID")),
    responses(
        (status = 204, description = "Member deleted"),
        (status = 404, description = "Member not found")
    )
)]
pub async fn delete_member(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    tracing::debug!("{} deletes member {}", user.username, id);
    state.services.members.delete_member(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
