use chrono::{DateTime, Utc};
use common::Version;
use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::project;
use crate::error::AppError;

pub use super::shared::{Pagination, escape_like};
use super::shared::{double_option, validate_name, validate_optional_url, validate_setting};

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateProjectRequest {
    #[schema(example = "Lake house")]
    pub name: String,
    /// Uploaded floor plan or photo the project starts from.
    #[schema(example = "https://cdn.example.com/uploads/plan.png")]
    pub base_image_url: Option<String>,
    /// Initial canvas state; defaults to an empty object.
    #[schema(value_type = Option<Object>)]
    pub canvas_state: Option<Value>,
    pub style: Option<String>,
    pub material: Option<String>,
    pub lighting: Option<String>,
    pub camera: Option<String>,
}

pub fn validate_create_project(payload: &CreateProjectRequest) -> Result<(), AppError> {
    validate_name(&payload.name)?;
    validate_optional_url("base_image_url", payload.base_image_url.as_deref())?;
    validate_canvas_state(payload.canvas_state.as_ref())?;
    validate_setting("style", payload.style.as_deref())?;
    validate_setting("material", payload.material.as_deref())?;
    validate_setting("lighting", payload.lighting.as_deref())?;
    validate_setting("camera", payload.camera.as_deref())?;
    Ok(())
}

/// Canvas state is stored opaquely but must be a JSON object.
pub fn validate_canvas_state(state: Option<&Value>) -> Result<(), AppError> {
    match state {
        None | Some(Value::Object(_)) => Ok(()),
        Some(_) => Err(AppError::Validation(
            "canvas_state must be a JSON object".into(),
        )),
    }
}

/// Partial project update. Absent fields are left unchanged.
#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    /// `null` clears the base image.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub base_image_url: Option<Option<String>>,
    /// Replaces the whole canvas state.
    #[schema(value_type = Option<Object>)]
    pub canvas_state: Option<Value>,
}

pub fn validate_update_project(payload: &UpdateProjectRequest) -> Result<(), AppError> {
    if let Some(name) = &payload.name {
        validate_name(name)?;
    }
    if let Some(Some(url)) = &payload.base_image_url {
        validate_optional_url("base_image_url", Some(url))?;
    }
    validate_canvas_state(payload.canvas_state.as_ref())
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ProjectResponse {
    #[schema(example = 1)]
    pub id: i32,
    #[schema(example = "Lake house")]
    pub name: String,
    pub user_id: i32,
    pub base_image_url: Option<String>,
    #[schema(value_type = Object)]
    pub canvas_state: Value,
    pub style: Option<String>,
    pub material: Option<String>,
    pub lighting: Option<String>,
    pub camera: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<project::Model> for ProjectResponse {
    fn from(p: project::Model) -> Self {
        Self {
            id: p.id,
            name: p.name,
            user_id: p.user_id,
            base_image_url: p.base_image_url,
            canvas_state: p.canvas_state,
            style: p.style,
            material: p.material,
            lighting: p.lighting,
            camera: p.camera,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Project summary without the canvas state.
#[derive(Serialize, FromQueryResult, utoipa::ToSchema)]
pub struct ProjectListItem {
    pub id: i32,
    pub name: String,
    pub base_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ProjectListResponse {
    pub data: Vec<ProjectListItem>,
    pub pagination: Pagination,
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProjectListQuery {
    /// Page number (default 1).
    pub page: Option<u64>,
    /// Items per page (default 20, max 100).
    pub per_page: Option<u64>,
    /// Case-insensitive name search.
    pub search: Option<String>,
    /// One of `updated_at` (default), `created_at`, `name`.
    pub sort_by: Option<String>,
    /// `asc` or `desc` (default).
    pub sort_order: Option<String>,
}

/// Generation settings applied to every render in the project.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ProjectSettings {
    #[schema(example = "scandinavian")]
    pub style: Option<String>,
    #[schema(example = "oak, linen")]
    pub material: Option<String>,
    #[schema(example = "golden hour")]
    pub lighting: Option<String>,
    #[schema(example = "eye level, 35mm")]
    pub camera: Option<String>,
}

impl From<&project::Model> for ProjectSettings {
    fn from(p: &project::Model) -> Self {
        Self {
            style: p.style.clone(),
            material: p.material.clone(),
            lighting: p.lighting.clone(),
            camera: p.camera.clone(),
        }
    }
}

/// Partial settings update. `null` clears a setting.
#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateSettingsRequest {
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub style: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub material: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub lighting: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub camera: Option<Option<String>>,
}

pub fn validate_update_settings(payload: &UpdateSettingsRequest) -> Result<(), AppError> {
    let fields = [
        ("style", &payload.style),
        ("material", &payload.material),
        ("lighting", &payload.lighting),
        ("camera", &payload.camera),
    ];
    for (label, value) in fields {
        if let Some(Some(v)) = value {
            validate_setting(label, Some(v))?;
        }
    }
    Ok(())
}

/// Root-to-version path through the legacy version list.
#[derive(Serialize, utoipa::ToSchema)]
pub struct VersionPathResponse {
    pub version_id: String,
    /// Version ids from the root to `version_id`, inclusive.
    pub path: Vec<String>,
    /// The versions on the path, in the same order.
    pub versions: Vec<Version>,
}
