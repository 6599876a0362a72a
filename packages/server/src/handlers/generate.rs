use axum::Json;
use axum::extract::State;
use common::render::RenderParams;
use common::scene::SceneInput;
use common::{CanvasState, Version};
use sea_orm::TransactionTrait;
use serde_json::json;
use tracing::instrument;

use super::project::{find_owned_project, lock_owned_project, save_canvas};
use crate::entity::project;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::scene::{GenerateRequest, GenerateResponse};
use crate::state::AppState;

/// Fill unset style settings from the project's saved settings.
pub(crate) fn apply_project_settings(input: &mut SceneInput, project: &project::Model) {
    let pairs = [
        (&mut input.style, &project.style),
        (&mut input.material, &project.material),
        (&mut input.lighting, &project.lighting),
        (&mut input.camera, &project.camera),
    ];
    for (slot, saved) in pairs {
        if slot.as_deref().is_none_or(|s| s.trim().is_empty()) {
            slot.clone_from(saved);
        }
    }
    if input.reference_images.is_empty()
        && let Some(base) = &project.base_image_url
    {
        input.reference_images.push(base.clone());
    }
}

#[utoipa::path(
    post,
    path = "/generate",
    tag = "Scene",
    operation_id = "generateVersion",
    summary = "Generate a scene and one image as a new version",
    description = "Legacy one-shot flow: scene JSON generation followed by a single render. The result is appended to the project's version list under `parent_id` and selected. When the parent exists its scene JSON is passed to the model as the prior scene.",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "New version", body = GenerateResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
        (status = 502, description = "Model or render backend failed (UPSTREAM_ERROR)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id, project_id = payload.project_id))]
pub async fn generate(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    let project = find_owned_project(&state.db, payload.project_id, &auth_user).await?;
    let canvas = CanvasState::from_value(project.canvas_state.clone())?;

    let mut input = payload.scene;
    if input.kind.as_deref().is_none_or(|k| k.trim().is_empty()) {
        input.kind = Some("generate".into());
    }
    apply_project_settings(&mut input, &project);

    let tree = canvas.version_tree()?;
    if input.prior.is_none()
        && let Some(parent) = input.parent_id.as_deref().and_then(|id| tree.get(id))
        && let Some(prior) = parent.config.get("json_prompt")
    {
        input.prior = Some(prior.clone());
    }

    let scene = state.scenes.generate(&input).await?;

    let params = RenderParams {
        variants: 1,
        seed: payload.seed.unwrap_or(-1),
        aspect_ratio: payload
            .aspect_ratio
            .unwrap_or_else(|| RenderParams::default().aspect_ratio),
        ..Default::default()
    };
    let rendered = state.renderer.render(&scene.json_prompt, &params).await?;
    let image = rendered
        .images
        .first()
        .ok_or_else(|| AppError::Upstream("render returned no images".into()))?;

    // Re-read inside a transaction so concurrent canvas edits are not lost.
    let txn = state.db.begin().await?;
    let project = lock_owned_project(&txn, payload.project_id, &auth_user).await?;
    let mut canvas = CanvasState::from_value(project.canvas_state.clone())?;
    let mut tree = canvas.version_tree()?;

    let version = Version {
        id: uuid::Uuid::new_v4().to_string(),
        parent_id: input.parent_id.clone(),
        image_url: image.url.clone(),
        config: json!({
            "scene_id": scene.id,
            "style": scene.style,
            "json_prompt": scene.json_prompt,
            "seed": image.seed,
            "aspect_ratio": params.aspect_ratio,
            "request_id": rendered.request_id,
        }),
        name: payload
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Version {}", tree.versions().len() + 1)),
        kind: scene.kind.clone(),
        created_at: chrono::Utc::now(),
    };

    let path = tree.finish_generation(version.clone());
    canvas.set_versions(tree)?;
    save_canvas(&txn, project, canvas).await?;
    txn.commit().await?;

    tracing::info!(version_id = %version.id, depth = path.len(), "Appended version");

    Ok(Json(GenerateResponse {
        version,
        path,
        scene,
    }))
}
