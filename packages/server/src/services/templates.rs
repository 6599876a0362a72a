use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

const SCHEMA_NOTE: &str = r#"Return exactly one JSON object with this shape:
{
  "id": string,
  "style": string,
  "json_prompt": {
    "short_description": string,
    "objects": [ { "description": string, "location": string, "relationship": string } ],
    "background_setting": string,
    "lighting": { "conditions": string, "direction": string, "shadows": string },
    "aesthetics": { "composition": string, "color_scheme": string, "mood_atmosphere": string },
    "photographic_characteristics": { "depth_of_field": string, "focus": string, "camera_angle": string, "lens_focal_length": string },
    "style_medium": string,
    "context": string
  }
}
Do not wrap the object in markdown."#;

const STRUCTURE: &str = "You are an architectural planner. Turn the user's description or floor plan \
into a precise spatial layout: rooms, walls, openings, circulation and furniture placement. \
Describe geometry and adjacency, not decoration.";

const VISUALIZE: &str = "You are an architectural visualization director. Turn the layout into a \
photorealistic interior or exterior scene: materials, finishes, lighting, camera placement and \
mood, while keeping the spatial layout unchanged.";

const REFINE: &str = "You are refining an existing architectural scene. Apply only the changes the \
user asks for to the previous scene JSON and keep every other field as it was.";

const GENERATE: &str = "You are an architectural visualization assistant. Produce a complete scene \
description that a text-to-image model can render in a single pass.";

const FLOOR_PLAN: &str = "You are drafting an architectural floor plan. Describe a clean, top-down \
plan drawing: wall thickness, room labels, door swings, window openings and dimension lines. \
Match the requested dimensionality (2D line drawing or 3D cutaway).";

fn builtin(key: &str) -> Option<&'static str> {
    match key {
        "structure" => Some(STRUCTURE),
        "visualize" => Some(VISUALIZE),
        "refine" => Some(REFINE),
        "generate" => Some(GENERATE),
        "floor_plan" => Some(FLOOR_PLAN),
        _ => None,
    }
}

/// Per-stage system prompts.
///
/// `<dir>/<key>.txt` overrides the built-in text. Loaded templates are cached
/// for the life of the process.
pub struct TemplateCache {
    dir: Option<PathBuf>,
    cache: DashMap<String, Arc<str>>,
}

impl TemplateCache {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            cache: DashMap::new(),
        }
    }

    /// System prompt for a stage template key, or `None` for an unknown key.
    pub async fn get(&self, key: &str) -> Option<Arc<str>> {
        if let Some(hit) = self.cache.get(key) {
            return Some(hit.clone());
        }

        let body = match self.load_override(key).await {
            Some(text) => text,
            None => builtin(key)?.to_string(),
        };
        let template: Arc<str> = Arc::from(format!("{}\n\n{}", body.trim(), SCHEMA_NOTE));

        // Two loaders racing on the same key produce identical text.
        self.cache.insert(key.to_string(), template.clone());
        Some(template)
    }

    async fn load_override(&self, key: &str) -> Option<String> {
        let path = self.dir.as_ref()?.join(format!("{key}.txt"));
        match tokio::fs::read_to_string(&path).await {
            Ok(text) if !text.trim().is_empty() => {
                tracing::info!(path = %path.display(), "Loaded prompt template override");
                Some(text)
            }
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read prompt template");
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
