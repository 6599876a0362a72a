use std::sync::Arc;

use common::scene::{SceneError, SceneInput, SceneResult};
use tracing::instrument;

use super::llm::SceneModel;
use super::templates::TemplateCache;

/// Builds stage prompts, calls the hosted model and validates its answer.
pub struct SceneGenerator {
    model: Arc<dyn SceneModel>,
    templates: TemplateCache,
}

impl SceneGenerator {
    pub fn new(model: Arc<dyn SceneModel>, templates: TemplateCache) -> Self {
        Self { model, templates }
    }

    /// Input errors are returned before the model is contacted. Model output
    /// that fails validation is surfaced as is; nothing is retried.
    #[instrument(skip(self, input), fields(kind = ?input.kind))]
    pub async fn generate(&self, input: &SceneInput) -> Result<SceneResult, SceneError> {
        let stage = input.validate()?;

        let system = self
            .templates
            .get(stage.template_key())
            .await
            .ok_or_else(|| SceneError::UnknownStage(stage.tag()))?;
        let user = input.user_prompt(&stage);

        let raw = self.model.generate_json(&system, &user).await?;
        let result = SceneResult::from_model_output(
            &raw,
            &stage,
            input.parent_id.clone(),
            input.style.as_deref(),
        )?;

        tracing::info!(scene_id = %result.id, stage = %result.kind, "Generated scene JSON");
        Ok(result)
    }
}
