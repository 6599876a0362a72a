use axum::Json;
use axum::extract::State;
use common::scene::{SceneInput, SceneResult};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::scene::{RenderRequest, RenderResponse};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/generate-json",
    tag = "Scene",
    operation_id = "generateSceneJson",
    summary = "Generate a structured scene JSON for a stage",
    description = "Builds the stage prompt, calls the hosted language model and validates its answer against the scene schema. A missing or unknown `type` is rejected before the model is called. Invalid model output is reported as UPSTREAM_ERROR and not retried.",
    request_body = SceneInput,
    responses(
        (status = 200, description = "Validated scene", body = SceneResult),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 502, description = "Model failed or returned invalid JSON (UPSTREAM_ERROR)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn generate_json(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<SceneInput>,
) -> Result<Json<SceneResult>, AppError> {
    let result = state.scenes.generate(&payload).await?;
    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/render",
    tag = "Scene",
    operation_id = "renderScene",
    summary = "Render a structured prompt into seeded image variants",
    description = "Issues exactly `variants` concurrent backend calls. If any call fails the request fails and no images are returned. With `rehost` (default) each image is copied into owned storage.",
    request_body = RenderRequest,
    responses(
        (status = 200, description = "Rendered variants", body = RenderResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 502, description = "Render backend or storage failed (UPSTREAM_ERROR)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn render(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<RenderRequest>,
) -> Result<Json<RenderResponse>, AppError> {
    let response = state
        .renderer
        .render(&payload.json_prompt, &payload.params)
        .await?;
    Ok(Json(response))
}
