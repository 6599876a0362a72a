use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common::CanvasState;
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Func, LikeExpr, LockType};
use sea_orm::*;
use serde_json::Value;
use tracing::instrument;

use crate::entity::project;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::project::*;
use crate::models::shared::normalize_optional;
use crate::state::AppState;

/// Load a project the caller owns.
pub(crate) async fn find_owned_project<C: ConnectionTrait>(
    db: &C,
    id: i32,
    auth_user: &AuthUser,
) -> Result<project::Model, AppError> {
    let model = project::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".into()))?;
    auth_user.require_owner(model.user_id)?;
    Ok(model)
}

/// Load a project the caller owns with a row lock held until `txn` ends.
pub(crate) async fn lock_owned_project(
    txn: &DatabaseTransaction,
    id: i32,
    auth_user: &AuthUser,
) -> Result<project::Model, AppError> {
    let model = project::Entity::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".into()))?;
    auth_user.require_owner(model.user_id)?;
    Ok(model)
}

/// Persist a new canvas state, bumping `updated_at`.
pub(crate) async fn save_canvas<C: ConnectionTrait>(
    db: &C,
    model: project::Model,
    canvas: CanvasState,
) -> Result<project::Model, AppError> {
    let mut active: project::ActiveModel = model.into();
    active.canvas_state = Set(canvas.into_value());
    active.updated_at = Set(chrono::Utc::now());
    Ok(active.update(db).await?)
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Projects",
    operation_id = "createProject",
    summary = "Create a project",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = ProjectResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn create_project(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateProjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_create_project(&payload)?;

    let now = chrono::Utc::now();
    let new_project = project::ActiveModel {
        name: Set(payload.name.trim().to_string()),
        user_id: Set(auth_user.user_id),
        base_image_url: Set(normalize_optional(payload.base_image_url)),
        canvas_state: Set(payload
            .canvas_state
            .unwrap_or_else(|| Value::Object(Default::default()))),
        style: Set(normalize_optional(payload.style)),
        material: Set(normalize_optional(payload.material)),
        lighting: Set(normalize_optional(payload.lighting)),
        camera: Set(normalize_optional(payload.camera)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let model = new_project.insert(&state.db).await?;
    tracing::info!(project_id = model.id, "Created project");

    Ok((StatusCode::CREATED, Json(ProjectResponse::from(model))))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Projects",
    operation_id = "listProjects",
    summary = "List the caller's projects",
    description = "Paginated, newest first by default. Canvas state is omitted from list results.",
    params(ProjectListQuery),
    responses(
        (status = 200, description = "List of projects", body = ProjectListResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(user_id = auth_user.user_id))]
pub async fn list_projects(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ProjectListQuery>,
) -> Result<Json<ProjectListResponse>, AppError> {
    let page = Ord::max(query.page.unwrap_or(1), 1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);

    let mut select =
        project::Entity::find().filter(project::Column::UserId.eq(auth_user.user_id));

    if let Some(ref search) = query.search {
        let term = escape_like(search.trim());
        if !term.is_empty() {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(project::Column::Name)))
                    .like(LikeExpr::new(format!("%{}%", term.to_lowercase())).escape('\\')),
            );
        }
    }

    let sort_order = if query.sort_order.as_deref() == Some("asc") {
        Order::Asc
    } else {
        Order::Desc
    };
    let sort_column = match query.sort_by.as_deref().unwrap_or("updated_at") {
        "updated_at" => project::Column::UpdatedAt,
        "created_at" => project::Column::CreatedAt,
        "name" => project::Column::Name,
        _ => {
            return Err(AppError::Validation(
                "sort_by must be one of: updated_at, created_at, name".into(),
            ));
        }
    };

    let total = select
        .clone()
        .paginate(&state.db, per_page)
        .num_items()
        .await?;
    let total_pages = total.div_ceil(per_page);

    let data = select
        .order_by(sort_column, sort_order.clone())
        .order_by(project::Column::Id, sort_order)
        .select_only()
        .column(project::Column::Id)
        .column(project::Column::Name)
        .column(project::Column::BaseImageUrl)
        .column(project::Column::CreatedAt)
        .column(project::Column::UpdatedAt)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .into_model::<ProjectListItem>()
        .all(&state.db)
        .await?;

    Ok(Json(ProjectListResponse {
        data,
        pagination: Pagination {
            page,
            per_page,
            total,
            total_pages,
        },
    }))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Projects",
    operation_id = "getProject",
    summary = "Get a project with its canvas state",
    params(("id" = i32, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project details", body = ProjectResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn get_project(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ProjectResponse>, AppError> {
    let model = find_owned_project(&state.db, id, &auth_user).await?;
    Ok(Json(model.into()))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Projects",
    operation_id = "updateProject",
    summary = "Update a project",
    description = "Partially updates a project. `canvas_state` replaces the stored state as a whole; last write wins. An empty payload returns the current resource unchanged.",
    params(("id" = i32, Path, description = "Project ID")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Project updated", body = ProjectResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn update_project(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateProjectRequest>,
) -> Result<Json<ProjectResponse>, AppError> {
    validate_update_project(&payload)?;

    if payload == UpdateProjectRequest::default() {
        let existing = find_owned_project(&state.db, id, &auth_user).await?;
        return Ok(Json(existing.into()));
    }

    let txn = state.db.begin().await?;

    let existing = lock_owned_project(&txn, id, &auth_user).await?;
    let mut active: project::ActiveModel = existing.into();

    if let Some(ref name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(url) = payload.base_image_url {
        active.base_image_url = Set(normalize_optional(url));
    }
    if let Some(canvas_state) = payload.canvas_state {
        active.canvas_state = Set(canvas_state);
    }
    active.updated_at = Set(chrono::Utc::now());

    let model = active.update(&txn).await?;
    txn.commit().await?;

    Ok(Json(model.into()))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Projects",
    operation_id = "deleteProject",
    summary = "Delete a project",
    params(("id" = i32, Path, description = "Project ID")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn delete_project(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let model = find_owned_project(&state.db, id, &auth_user).await?;
    project::Entity::delete_by_id(model.id)
        .exec(&state.db)
        .await?;
    tracing::info!(project_id = id, "Deleted project");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/{id}/settings",
    tag = "Projects",
    operation_id = "getProjectSettings",
    summary = "Get a project's generation settings",
    params(("id" = i32, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project settings", body = ProjectSettings),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn get_settings(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ProjectSettings>, AppError> {
    let model = find_owned_project(&state.db, id, &auth_user).await?;
    Ok(Json(ProjectSettings::from(&model)))
}

#[utoipa::path(
    patch,
    path = "/{id}/settings",
    tag = "Projects",
    operation_id = "updateProjectSettings",
    summary = "Update a project's generation settings",
    description = "Absent fields are unchanged; `null` or a blank string clears a setting.",
    params(("id" = i32, Path, description = "Project ID")),
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings updated", body = ProjectSettings),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn update_settings(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateSettingsRequest>,
) -> Result<Json<ProjectSettings>, AppError> {
    validate_update_settings(&payload)?;

    let txn = state.db.begin().await?;
    let existing = lock_owned_project(&txn, id, &auth_user).await?;

    if payload == UpdateSettingsRequest::default() {
        return Ok(Json(ProjectSettings::from(&existing)));
    }

    let mut active: project::ActiveModel = existing.into();
    if let Some(v) = payload.style {
        active.style = Set(normalize_optional(v));
    }
    if let Some(v) = payload.material {
        active.material = Set(normalize_optional(v));
    }
    if let Some(v) = payload.lighting {
        active.lighting = Set(normalize_optional(v));
    }
    if let Some(v) = payload.camera {
        active.camera = Set(normalize_optional(v));
    }
    active.updated_at = Set(chrono::Utc::now());

    let model = active.update(&txn).await?;
    txn.commit().await?;

    Ok(Json(ProjectSettings::from(&model)))
}

#[utoipa::path(
    get,
    path = "/{id}/versions/{version_id}/path",
    tag = "Versions",
    operation_id = "getVersionPath",
    summary = "Root-to-version path in the legacy version list",
    description = "Walks parent pointers from the version to a root. A parent that no longer exists ends the walk.",
    params(
        ("id" = i32, Path, description = "Project ID"),
        ("version_id" = String, Path, description = "Version ID"),
    ),
    responses(
        (status = 200, description = "Path to the version", body = VersionPathResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Project or version not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn get_version_path(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((id, version_id)): Path<(i32, String)>,
) -> Result<Json<VersionPathResponse>, AppError> {
    let model = find_owned_project(&state.db, id, &auth_user).await?;
    let canvas = CanvasState::from_value(model.canvas_state)?;
    let tree = canvas.version_tree()?;

    let path = tree.select(&version_id);
    if path.is_empty() {
        return Err(AppError::NotFound(format!("Version '{version_id}' not found")));
    }
    let versions = path.iter().filter_map(|v| tree.get(v)).cloned().collect();

    Ok(Json(VersionPathResponse {
        version_id,
        path,
        versions,
    }))
}
