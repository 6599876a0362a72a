//! Scene JSON: stage tags, request validation, prompt assembly and the fixed
//! output schema the hosted model must satisfy.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_STYLE: &str = "photorealistic";

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("type is required")]
    MissingType,

    #[error("unknown scene type '{0}'")]
    UnknownStage(String),

    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("stage '{0}' requires a prior scene")]
    MissingPrior(String),

    #[error("model returned invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("scene JSON failed validation: {0}")]
    Schema(String),

    #[error("model request failed: {0}")]
    Upstream(String),
}

impl SceneError {
    /// Errors caused by the caller's input rather than the hosted model.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingType | Self::UnknownStage(_) | Self::EmptyPrompt | Self::MissingPrior(_)
        )
    }
}

/// Generation stage. Selects the system prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Structure,
    Visualize,
    Refine,
    /// Legacy single-shot generation.
    Generate,
    /// Legacy `floor plan *` tags; holds the suffix (e.g. `3d`), possibly empty.
    FloorPlan(String),
}

impl Stage {
    /// Parse a stage tag. Case-insensitive; `_` and `-` count as spaces.
    pub fn parse(tag: &str) -> Result<Self, SceneError> {
        let normalized = tag
            .trim()
            .to_lowercase()
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        match normalized.as_str() {
            "" => Err(SceneError::MissingType),
            "structure" => Ok(Self::Structure),
            "visualize" | "visualise" => Ok(Self::Visualize),
            "refine" => Ok(Self::Refine),
            "generate" => Ok(Self::Generate),
            other => match other.strip_prefix("floor plan") {
                Some(rest) if rest.is_empty() || rest.starts_with(' ') => {
                    Ok(Self::FloorPlan(rest.trim().to_string()))
                }
                _ => Err(SceneError::UnknownStage(tag.trim().to_string())),
            },
        }
    }

    /// Canonical tag written into results.
    pub fn tag(&self) -> String {
        match self {
            Self::Structure => "structure".into(),
            Self::Visualize => "visualize".into(),
            Self::Refine => "refine".into(),
            Self::Generate => "generate".into(),
            Self::FloorPlan(v) if v.is_empty() => "floor plan".into(),
            Self::FloorPlan(v) => format!("floor plan {v}"),
        }
    }

    /// Template cache key.
    pub fn template_key(&self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Visualize => "visualize",
            Self::Refine => "refine",
            Self::Generate => "generate",
            Self::FloorPlan(_) => "floor_plan",
        }
    }

    pub fn needs_prior(&self) -> bool {
        matches!(self, Self::Refine)
    }
}

/// Input to one scene-generation call.
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct SceneInput {
    /// Stage tag: `structure`, `visualize`, `refine`, `generate` or `floor plan *`.
    #[serde(rename = "type", default)]
    #[schema(example = "structure")]
    pub kind: Option<String>,
    #[schema(example = "Open-plan two bedroom apartment with a south-facing balcony")]
    pub prompt: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub camera: Option<String>,
    #[serde(default)]
    pub lighting: Option<String>,
    #[serde(default)]
    pub material: Option<String>,
    /// Scene JSON from the previous stage.
    #[serde(default)]
    pub prior: Option<Value>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub reference_images: Vec<String>,
}

impl SceneInput {
    /// Everything that can be rejected without calling the model.
    pub fn validate(&self) -> Result<Stage, SceneError> {
        let tag = self.kind.as_deref().ok_or(SceneError::MissingType)?;
        let stage = Stage::parse(tag)?;
        if self.prompt.trim().is_empty() {
            return Err(SceneError::EmptyPrompt);
        }
        if stage.needs_prior() && self.prior.as_ref().is_none_or(Value::is_null) {
            return Err(SceneError::MissingPrior(stage.tag()));
        }
        Ok(stage)
    }

    /// User message sent alongside the stage's system template.
    pub fn user_prompt(&self, stage: &Stage) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Stage: {}", stage.tag());
        let _ = writeln!(out, "Request: {}", self.prompt.trim());

        let settings = [
            ("Style", &self.style),
            ("Theme", &self.theme),
            ("Camera", &self.camera),
            ("Lighting", &self.lighting),
            ("Materials", &self.material),
        ];
        for (label, value) in settings {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                let _ = writeln!(out, "{label}: {v}");
            }
        }

        if !self.reference_images.is_empty() {
            let _ = writeln!(out, "Reference images:");
            for url in &self.reference_images {
                let _ = writeln!(out, "- {url}");
            }
        }

        if let Some(prior) = self.prior.as_ref().filter(|p| !p.is_null()) {
            let pretty = serde_json::to_string_pretty(prior).unwrap_or_else(|_| prior.to_string());
            let _ = writeln!(out, "Previous scene JSON:\n{pretty}");
        }

        out.push_str("Respond with a single JSON object only.");
        out
    }
}

/// Validated scene-generation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SceneResult {
    pub id: String,
    pub parent_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub style: String,
    /// Structured prompt consumed by the diffusion stage.
    pub json_prompt: Value,
}

impl SceneResult {
    /// Clean, parse and validate raw model output.
    ///
    /// The model may answer with the full `{id, parent_id, type, style,
    /// json_prompt}` envelope or with the bare structured prompt. `parent_id`
    /// and `type` always come from the request.
    pub fn from_model_output(
        raw: &str,
        stage: &Stage,
        parent_id: Option<String>,
        style: Option<&str>,
    ) -> Result<Self, SceneError> {
        let cleaned = strip_markdown_fences(raw);
        let value: Value = serde_json::from_str(cleaned).map_err(SceneError::InvalidJson)?;
        let Value::Object(mut obj) = value else {
            return Err(SceneError::Schema("expected a JSON object".into()));
        };

        let request_style = style.map(str::trim).filter(|s| !s.is_empty());

        let (id, model_style, json_prompt) = match obj.remove("json_prompt") {
            Some(prompt) => {
                let prompt = match prompt {
                    // Some models double-encode the nested prompt.
                    Value::String(s) => serde_json::from_str(strip_markdown_fences(&s))
                        .map_err(SceneError::InvalidJson)?,
                    other => other,
                };
                let id = take_string(&mut obj, "id");
                let model_style = take_string(&mut obj, "style");
                (id, model_style, prompt)
            }
            None => (None, None, Value::Object(obj)),
        };

        validate_json_prompt(&json_prompt)?;

        Ok(Self {
            id: id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            parent_id,
            kind: stage.tag(),
            style: request_style
                .map(str::to_string)
                .or(model_style)
                .unwrap_or_else(|| DEFAULT_STYLE.to_string()),
            json_prompt,
        })
    }
}

fn take_string(obj: &mut Map<String, Value>, key: &str) -> Option<String> {
    match obj.remove(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_markdown_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json).
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

#[derive(Clone, Copy)]
enum Kind {
    Str,
    Arr,
    StrOrObj,
}

const KNOWN_KEYS: &[(&str, Kind)] = &[
    ("objects", Kind::Arr),
    ("background_setting", Kind::Str),
    ("lighting", Kind::StrOrObj),
    ("aesthetics", Kind::StrOrObj),
    ("photographic_characteristics", Kind::StrOrObj),
    ("style_medium", Kind::Str),
    ("artistic_style", Kind::Str),
    ("context", Kind::Str),
    ("text_render", Kind::Arr),
];

/// Check a structured prompt against the fixed schema.
///
/// `short_description` is required; known optional keys must have the right
/// JSON kind; unknown keys are allowed.
pub fn validate_json_prompt(prompt: &Value) -> Result<(), SceneError> {
    let Value::Object(obj) = prompt else {
        return Err(SceneError::Schema("json_prompt must be an object".into()));
    };

    match obj.get("short_description") {
        Some(Value::String(s)) if !s.trim().is_empty() => {}
        Some(Value::String(_)) => {
            return Err(SceneError::Schema("short_description must not be empty".into()));
        }
        Some(_) => {
            return Err(SceneError::Schema("short_description must be a string".into()));
        }
        None => return Err(SceneError::Schema("short_description is required".into())),
    }

    for &(key, kind) in KNOWN_KEYS {
        let Some(value) = obj.get(key) else { continue };
        let ok = match kind {
            Kind::Str => value.is_string(),
            Kind::Arr => value.is_array(),
            Kind::StrOrObj => value.is_string() || value.is_object(),
        };
        if !ok {
            let expected = match kind {
                Kind::Str => "a string",
                Kind::Arr => "an array",
                Kind::StrOrObj => "a string or an object",
            };
            return Err(SceneError::Schema(format!("{key} must be {expected}")));
        }
    }

    Ok(())
}
