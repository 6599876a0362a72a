use std::collections::BTreeMap;

use common::render::RenderParams;
use common::scene::{SceneInput, SceneResult};
use common::{NodeStatus, Version};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Render a structured prompt into one or more seeded variants.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct RenderRequest {
    /// Structured prompt, usually the `json_prompt` of a generated scene.
    #[schema(value_type = Object)]
    pub json_prompt: Value,
    #[serde(flatten)]
    pub params: RenderParams,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RenderedImage {
    #[schema(example = "https://cdn.example.com/generations/0b6c-0.png")]
    pub url: String,
    #[schema(example = 42)]
    pub seed: u64,
    /// Position of the variant within the request.
    #[schema(example = 0)]
    pub index: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RenderResponse {
    pub request_id: String,
    /// One entry per variant, ordered by index.
    pub images: Vec<RenderedImage>,
    /// The structured prompt that was rendered.
    #[schema(value_type = Object)]
    pub json_prompt: Value,
}

/// Legacy one-shot generation into a project's version list.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct GenerateRequest {
    #[schema(example = 1)]
    pub project_id: i32,
    /// Scene input. `type` defaults to `generate`; `parent_id` names the
    /// version this one branches from.
    #[serde(flatten)]
    pub scene: SceneInput,
    /// Display name of the new version.
    pub name: Option<String>,
    pub aspect_ratio: Option<String>,
    pub seed: Option<i64>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct GenerateResponse {
    pub version: Version,
    /// Root-to-new-version path, now selected.
    pub path: Vec<String>,
    pub scene: SceneResult,
}

/// Optional overrides for a node run. Anything absent is read from the node.
#[derive(Deserialize, Default, utoipa::ToSchema)]
pub struct NodeRunRequest {
    /// Stage tag; defaults to the node's `type`/`stage` data, then `visualize`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub prompt: Option<String>,
    #[serde(default)]
    pub params: Option<RenderParams>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct NodeRunResponse {
    pub node_id: String,
    pub status: NodeStatus,
    pub image_url: Option<String>,
    pub images: Vec<RenderedImage>,
    pub scene: SceneResult,
}

/// Output size for one supported aspect ratio.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AspectRatioInfo {
    #[schema(example = 1344)]
    pub width: u32,
    #[schema(example = 768)]
    pub height: u32,
    #[schema(example = "1344x768")]
    pub resolution: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AspectRatiosResponse {
    /// Keyed by ratio, e.g. `16:9`.
    pub aspect_ratios: BTreeMap<String, AspectRatioInfo>,
}

impl AspectRatiosResponse {
    pub fn from_table(table: &[(&str, (u32, u32))]) -> Self {
        let aspect_ratios = table
            .iter()
            .map(|&(ratio, (width, height))| {
                (
                    ratio.to_string(),
                    AspectRatioInfo {
                        width,
                        height,
                        resolution: format!("{width}x{height}"),
                    },
                )
            })
            .collect();
        Self { aspect_ratios }
    }
}
