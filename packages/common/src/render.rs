//! Render parameters shared by the render orchestrator and the diffusion
//! backends: bounds, aspect-ratio table, seed derivation and response parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_VARIANTS: u32 = 10;
pub const MAX_STEPS: u32 = 100;

/// Aspect ratio → (width, height).
pub const ASPECT_RATIOS: &[(&str, (u32, u32))] = &[
    ("1:1", (1024, 1024)),
    ("16:9", (1344, 768)),
    ("9:16", (768, 1344)),
    ("4:3", (1152, 896)),
    ("3:4", (896, 1152)),
    ("21:9", (1280, 800)),
    ("9:21", (800, 1280)),
    ("5:4", (1088, 960)),
    ("4:5", (960, 1088)),
    ("3:2", (1216, 832)),
    ("2:3", (832, 1216)),
];

const SQUARE: (u32, u32) = (1024, 1024);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("variants must be between 1 and {MAX_VARIANTS}")]
    Variants,
    #[error("steps must be between 1 and {MAX_STEPS}")]
    Steps,
    #[error("guidance_scale must be a finite, non-negative number")]
    GuidanceScale,
}

/// Resolve an aspect ratio to a supported resolution.
///
/// Table entries match exactly; free-form `W:H` or `WxH` snaps to the first
/// entry whose ratio is within 0.1; anything else is square.
pub fn resolve_resolution(aspect_ratio: Option<&str>) -> (u32, u32) {
    let Some(ratio) = aspect_ratio.map(str::trim).filter(|r| !r.is_empty()) else {
        return SQUARE;
    };

    if let Some(&(_, res)) = ASPECT_RATIOS.iter().find(|(name, _)| *name == ratio) {
        return res;
    }

    let normalized = ratio.replace('x', ":");
    let parts: Vec<_> = normalized.split(':').collect();
    if let [w, h] = parts.as_slice()
        && let (Ok(w), Ok(h)) = (w.trim().parse::<u32>(), h.trim().parse::<u32>())
        && h > 0
    {
        let wanted = w as f64 / h as f64;
        if let Some(&(_, res)) = ASPECT_RATIOS
            .iter()
            .find(|(_, (tw, th))| (wanted - *tw as f64 / *th as f64).abs() < 0.1)
        {
            return res;
        }
    }

    SQUARE
}

/// Seed for each variant.
///
/// A non-negative base seed gives `seed, seed+1, ...`; a negative one draws an
/// independent random seed per variant.
pub fn variant_seeds(seed: i64, variants: u32) -> Vec<u64> {
    (0..variants)
        .map(|i| {
            if seed >= 0 {
                seed as u64 + u64::from(i)
            } else {
                u64::from(rand::random::<u32>())
            }
        })
        .collect()
}

fn default_variants() -> u32 {
    1
}
fn default_seed() -> i64 {
    -1
}
fn default_steps() -> u32 {
    50
}
fn default_aspect_ratio() -> String {
    "1:1".into()
}
fn default_guidance_scale() -> f64 {
    5.0
}
fn default_rehost() -> bool {
    true
}

/// User-facing render parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RenderParams {
    /// Number of independently seeded images (1-10).
    #[serde(default = "default_variants")]
    #[schema(example = 3)]
    pub variants: u32,
    /// Base seed; negative means random per variant.
    #[serde(default = "default_seed")]
    #[schema(example = 42)]
    pub seed: i64,
    /// Inference steps (1-100).
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_aspect_ratio")]
    #[schema(example = "16:9")]
    pub aspect_ratio: String,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f64,
    #[serde(default)]
    pub negative_prompt: String,
    /// Copy rendered images into owned storage before returning URLs.
    #[serde(default = "default_rehost")]
    pub rehost: bool,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            variants: default_variants(),
            seed: default_seed(),
            steps: default_steps(),
            aspect_ratio: default_aspect_ratio(),
            guidance_scale: default_guidance_scale(),
            negative_prompt: String::new(),
            rehost: default_rehost(),
        }
    }
}

impl RenderParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.variants < 1 || self.variants > MAX_VARIANTS {
            return Err(ParamError::Variants);
        }
        if self.steps < 1 || self.steps > MAX_STEPS {
            return Err(ParamError::Steps);
        }
        if !self.guidance_scale.is_finite() || self.guidance_scale < 0.0 {
            return Err(ParamError::GuidanceScale);
        }
        Ok(())
    }

    /// Overlay generation config stored on a canvas node (`{variants, seed, ...}`).
    /// Unknown or mistyped keys are ignored.
    pub fn merged_with(mut self, config: Option<&Value>) -> Self {
        let Some(Value::Object(cfg)) = config else {
            return self;
        };
        if let Some(v) = cfg.get("variants").and_then(Value::as_u64) {
            self.variants = v.min(u64::from(u32::MAX)) as u32;
        }
        if let Some(v) = cfg.get("seed").and_then(Value::as_i64) {
            self.seed = v;
        }
        if let Some(v) = cfg.get("steps").and_then(Value::as_u64) {
            self.steps = v.min(u64::from(u32::MAX)) as u32;
        }
        if let Some(v) = cfg
            .get("aspect_ratio")
            .or_else(|| cfg.get("aspectRatio"))
            .and_then(Value::as_str)
        {
            self.aspect_ratio = v.to_string();
        }
        if let Some(v) = cfg
            .get("guidance_scale")
            .or_else(|| cfg.get("guidanceScale"))
            .and_then(Value::as_f64)
        {
            self.guidance_scale = v;
        }
        if let Some(v) = cfg
            .get("negative_prompt")
            .or_else(|| cfg.get("negativePrompt"))
            .and_then(Value::as_str)
        {
            self.negative_prompt = v.to_string();
        }
        self
    }
}

/// One backend call: a single seeded image.
#[derive(Debug, Clone, Serialize)]
pub struct RenderJob {
    /// Serialized structured prompt.
    pub json_prompt: String,
    pub seed: u64,
    pub steps: u32,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: String,
    pub guidance_scale: f64,
    pub negative_prompt: String,
}

/// Pull an image URL out of a loosely typed backend response.
///
/// Tried in order: `images[0].url`, `image.url`, `output.images[0].url`,
/// `output.image_url`, `output[0]`, `image_url`, `url`.
pub fn extract_image_url(response: &Value) -> Option<String> {
    const POINTERS: &[&str] = &[
        "/images/0/url",
        "/image/url",
        "/output/images/0/url",
        "/output/image_url",
        "/output/0",
        "/image_url",
        "/url",
    ];

    POINTERS
        .iter()
        .filter_map(|p| response.pointer(p))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
