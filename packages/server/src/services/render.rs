use std::sync::Arc;
use std::time::Instant;

use common::render::{
    ParamError, RenderJob, RenderParams, extract_image_url, resolve_resolution, variant_seeds,
};
use common::storage::{ObjectStore, StorageError, generation_key};
use futures::future::try_join_all;
use reqwest::Client;
use serde_json::Value;
use tracing::instrument;

use super::diffusion::ImageBackend;
use crate::models::scene::{RenderResponse, RenderedImage};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Params(#[from] ParamError),

    #[error("json_prompt must be a non-empty JSON object")]
    InvalidPrompt,

    #[error("image backend failed: {0}")]
    Upstream(String),

    #[error("image backend returned no image URL")]
    MissingImage,

    #[error("failed to download rendered image: {0}")]
    Download(String),

    #[error("rendered image exceeds the {limit} byte limit")]
    ImageTooLarge { limit: u64 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Fans one render request out into seeded variants and collects their URLs.
pub struct Renderer {
    backend: Arc<dyn ImageBackend>,
    store: Arc<dyn ObjectStore>,
    http: Client,
    max_image_size: u64,
}

impl Renderer {
    /// `max_image_size` caps each rehosted download.
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        store: Arc<dyn ObjectStore>,
        http: Client,
        max_image_size: u64,
    ) -> Self {
        Self {
            backend,
            store,
            http,
            max_image_size,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Render `params.variants` images concurrently.
    ///
    /// The first failing variant fails the whole call; no partial results
    /// are returned and images already rehosted for the call are deleted.
    #[instrument(skip(self, json_prompt, params), fields(variants = params.variants, backend = self.backend.name()))]
    pub async fn render(
        &self,
        json_prompt: &Value,
        params: &RenderParams,
    ) -> Result<RenderResponse, RenderError> {
        params.validate()?;
        match json_prompt {
            Value::Object(obj) if !obj.is_empty() => {}
            _ => return Err(RenderError::InvalidPrompt),
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let prompt_text = json_prompt.to_string();
        let (width, height) = resolve_resolution(Some(&params.aspect_ratio));
        let seeds = variant_seeds(params.seed, params.variants);
        let started = Instant::now();

        tracing::info!(request_id = %request_id, ?seeds, width, height, "Rendering variants");

        let variants = seeds.iter().enumerate().map(|(index, &seed)| {
            let job = RenderJob {
                json_prompt: prompt_text.clone(),
                seed,
                steps: params.steps,
                width,
                height,
                aspect_ratio: params.aspect_ratio.clone(),
                guidance_scale: params.guidance_scale,
                negative_prompt: params.negative_prompt.clone(),
            };
            let request_id = request_id.as_str();
            async move {
                let response = self.backend.render(&job).await?;
                let url = extract_image_url(&response).ok_or(RenderError::MissingImage)?;
                let url = if params.rehost {
                    self.rehost(&url, request_id, index).await?
                } else {
                    url
                };
                Ok::<_, RenderError>(RenderedImage { url, seed, index })
            }
        });

        let images = match try_join_all(variants).await {
            Ok(images) => images,
            Err(err) => {
                if params.rehost {
                    self.purge(&request_id, seeds.len()).await;
                }
                return Err(err);
            }
        };

        tracing::info!(
            request_id = %request_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Render finished"
        );

        Ok(RenderResponse {
            request_id,
            images,
            json_prompt: json_prompt.clone(),
        })
    }

    /// Copy a provider-hosted image into owned storage.
    async fn rehost(&self, url: &str, request_id: &str, index: usize) -> Result<String, RenderError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RenderError::Download(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RenderError::Download(format!(
                "{url} returned HTTP {}",
                response.status()
            )));
        }
        let bytes = self.read_capped(response).await?;

        let key = generation_key(request_id, index);
        let public = self.store.put_public(&key, &bytes, "image/png").await?;
        tracing::debug!(key = %key, size = bytes.len(), "Rehosted rendered image");
        Ok(public)
    }

    async fn read_capped(&self, mut response: reqwest::Response) -> Result<Vec<u8>, RenderError> {
        let limit = self.max_image_size;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(RenderError::ImageTooLarge { limit });
        }
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| RenderError::Download(e.to_string()))?
        {
            if (bytes.len() + chunk.len()) as u64 > limit {
                return Err(RenderError::ImageTooLarge { limit });
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }

    /// Delete every rehost key of a failed call. Variants that never reached
    /// storage simply report nothing to delete.
    async fn purge(&self, request_id: &str, variants: usize) {
        let mut removed = 0;
        for index in 0..variants {
            let key = generation_key(request_id, index);
            match self.store.delete(&key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(key = %key, "Failed to delete rehosted image: {}", e),
            }
        }
        if removed > 0 {
            tracing::info!(request_id = %request_id, removed, "Removed images of failed render");
        }
    }
}
