use axum::Json;
use axum::extract::{Path, State};
use common::canvas::{IMAGE_URL, Node, SCENE_ID, SCENE_JSON};
use common::render::RenderParams;
use common::scene::{SceneInput, SceneResult};
use common::{CanvasState, NodeStatus};
use sea_orm::TransactionTrait;
use serde_json::Value;
use tracing::instrument;

use super::generate::apply_project_settings;
use super::project::{lock_owned_project, save_canvas};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::scene::{NodeRunRequest, NodeRunResponse, RenderResponse};
use crate::state::AppState;

const DEFAULT_STAGE: &str = "visualize";

/// Everything a run needs, read from the node and its upstream inputs.
struct RunPlan {
    input: SceneInput,
    params: RenderParams,
}

fn plan_run(canvas: &CanvasState, node: Node<'_>, overrides: NodeRunRequest) -> RunPlan {
    let upstream = canvas.upstream_nodes(node.id());

    let kind = overrides
        .kind
        .or_else(|| node.data_str("stage").map(str::to_string))
        .or_else(|| node.data_str("type").map(str::to_string))
        .unwrap_or_else(|| DEFAULT_STAGE.to_string());

    let prompt = overrides
        .prompt
        .or_else(|| node.data_str("prompt").map(str::to_string))
        .or_else(|| {
            upstream
                .iter()
                .find_map(|n| n.data_str("prompt"))
                .map(str::to_string)
        })
        .unwrap_or_default();

    let mut reference_images: Vec<String> = upstream
        .iter()
        .filter_map(|n| n.data_str(IMAGE_URL))
        .map(str::to_string)
        .collect();
    if let Some(Value::Array(refs)) = node.data_value("referenceImages") {
        reference_images.extend(refs.iter().filter_map(Value::as_str).map(str::to_string));
    }

    // Re-running a populated node refines its own scene; otherwise build on
    // the first upstream scene.
    let own_scene = node.data_value(SCENE_JSON);
    let upstream_scene = upstream
        .iter()
        .find_map(|n| n.data_value(SCENE_JSON).map(|scene| (scene, n.data_str(SCENE_ID))));
    let (prior, parent_id) = match (own_scene, upstream_scene) {
        (Some(own), _) => (Some(own.clone()), node.data_str(SCENE_ID)),
        (None, Some((scene, id))) => (Some(scene.clone()), id),
        (None, None) => (None, None),
    };

    let params = overrides
        .params
        .unwrap_or_else(|| RenderParams::default().merged_with(node.data_value("config")));

    RunPlan {
        input: SceneInput {
            kind: Some(kind),
            prompt,
            prior,
            parent_id: parent_id.map(str::to_string),
            reference_images,
            ..Default::default()
        },
        params,
    }
}

#[utoipa::path(
    post,
    path = "/{id}/nodes/{node_id}/run",
    tag = "Nodes",
    operation_id = "runNode",
    summary = "Run a canvas node",
    description = "Marks the node `generating` and saves, generates the scene JSON for the node's stage (default `visualize`), renders it, then writes the image URLs and scene JSON into the node and marks it `populated`. On failure the node is marked `error` with the message. Input nodes cannot be run; a node that is already generating is rejected with CONFLICT.",
    params(
        ("id" = i32, Path, description = "Project ID"),
        ("node_id" = String, Path, description = "Canvas node ID"),
    ),
    request_body = NodeRunRequest,
    responses(
        (status = 200, description = "Node populated", body = NodeRunResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Project or node not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Node is already generating (CONFLICT)", body = ErrorBody),
        (status = 502, description = "Model or render backend failed (UPSTREAM_ERROR)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn run_node(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((id, node_id)): Path<(i32, String)>,
    payload: Option<AppJson<NodeRunRequest>>,
) -> Result<Json<NodeRunResponse>, AppError> {
    let overrides = payload.map(|AppJson(p)| p).unwrap_or_default();

    // Runs of the same project serialize on the row lock; a second run of this
    // node sees `generating`.
    let txn = state.db.begin().await?;
    let project = lock_owned_project(&txn, id, &auth_user).await?;
    let mut canvas = CanvasState::from_value(project.canvas_state.clone())?;

    let node = canvas
        .node(&node_id)
        .ok_or_else(|| AppError::NotFound(format!("Node '{node_id}' not found")))?;
    let mut plan = plan_run(&canvas, node, overrides);

    // Input errors leave the node untouched.
    plan.input.validate()?;
    plan.params.validate()?;
    apply_project_settings(&mut plan.input, &project);

    canvas.node_mut(&node_id)?.begin_run()?;
    save_canvas(&txn, project, canvas).await?;
    txn.commit().await?;
    tracing::info!(node_id = %node_id, "Node generating");

    let result = match execute(&state, &plan).await {
        Ok((scene, rendered)) => {
            let urls: Vec<String> = rendered.images.iter().map(|i| i.url.clone()).collect();
            record_result(&state, id, &auth_user, &node_id, &urls, &scene)
                .await
                .map(|status| (status, urls, scene, rendered))
        }
        Err(err) => Err(err),
    };

    match result {
        Ok((status, urls, scene, rendered)) => {
            tracing::info!(node_id = %node_id, images = urls.len(), "Node populated");
            Ok(Json(NodeRunResponse {
                node_id,
                status,
                image_url: urls.first().cloned(),
                images: rendered.images,
                scene,
            }))
        }
        Err(err) => {
            let message = error_message(&err);
            if let Err(e) = mark_failed(&state, id, &auth_user, &node_id, &message).await {
                tracing::warn!(node_id = %node_id, "Failed to record node error: {:?}", e);
            }
            Err(err)
        }
    }
}

#[utoipa::path(
    post,
    path = "/{id}/nodes/{node_id}/reset",
    tag = "Nodes",
    operation_id = "resetNode",
    summary = "Reset a canvas node to idle",
    description = "Clears the node's error and returns it to `idle`. Generated images and scene JSON are kept. A node that is generating cannot be reset.",
    params(
        ("id" = i32, Path, description = "Project ID"),
        ("node_id" = String, Path, description = "Canvas node ID"),
    ),
    responses(
        (status = 200, description = "Node reset", body = NodeStatus),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Project or node not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Node is generating (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn reset_node(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((id, node_id)): Path<(i32, String)>,
) -> Result<Json<NodeStatus>, AppError> {
    let txn = state.db.begin().await?;
    let project = lock_owned_project(&txn, id, &auth_user).await?;
    let mut canvas = CanvasState::from_value(project.canvas_state.clone())?;
    let status = canvas.node_mut(&node_id)?.reset()?;
    save_canvas(&txn, project, canvas).await?;
    txn.commit().await?;
    Ok(Json(status))
}

async fn execute(
    state: &AppState,
    plan: &RunPlan,
) -> Result<(SceneResult, RenderResponse), AppError> {
    let scene = state.scenes.generate(&plan.input).await?;
    let rendered = state.renderer.render(&scene.json_prompt, &plan.params).await?;
    Ok((scene, rendered))
}

/// Write a finished run into the node, re-reading the canvas so edits made
/// while the run was in flight are kept.
async fn record_result(
    state: &AppState,
    id: i32,
    auth_user: &AuthUser,
    node_id: &str,
    urls: &[String],
    scene: &SceneResult,
) -> Result<NodeStatus, AppError> {
    let txn = state.db.begin().await?;
    let project = lock_owned_project(&txn, id, auth_user).await?;
    let mut canvas = CanvasState::from_value(project.canvas_state.clone())?;
    let status = canvas
        .node_mut(node_id)?
        .complete_run(urls, &scene.id, &scene.json_prompt);
    save_canvas(&txn, project, canvas).await?;
    txn.commit().await?;
    Ok(status)
}

async fn mark_failed(
    state: &AppState,
    id: i32,
    auth_user: &AuthUser,
    node_id: &str,
    message: &str,
) -> Result<NodeStatus, AppError> {
    let txn = state.db.begin().await?;
    let project = lock_owned_project(&txn, id, auth_user).await?;
    let mut canvas = CanvasState::from_value(project.canvas_state.clone())?;
    let status = canvas.node_mut(node_id)?.fail_run(message);
    save_canvas(&txn, project, canvas).await?;
    txn.commit().await?;
    tracing::info!(node_id = %node_id, "Node marked error");
    Ok(status)
}

fn error_message(err: &AppError) -> String {
    match err {
        AppError::Validation(m) | AppError::Upstream(m) | AppError::NotFound(m) => m.clone(),
        AppError::Conflict(m) => m.clone(),
        _ => "Generation failed".to_string(),
    }
}
