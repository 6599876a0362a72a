use std::time::Duration;

use async_trait::async_trait;
use common::render::RenderJob;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};

use super::render::RenderError;
use crate::config::{RenderConfig, RenderProvider};

const FAL_BASE_URL: &str = "https://fal.run";
const RUNPOD_BASE_URL: &str = "https://api.runpod.ai/v2";

/// Hosted diffusion backend. One call renders one seeded image.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Render a single image and return the provider's raw response.
    async fn render(&self, job: &RenderJob) -> Result<Value, RenderError>;
}

pub fn build_backend(config: &RenderConfig) -> Result<Box<dyn ImageBackend>, RenderError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| RenderError::Upstream(format!("HTTP client setup failed: {e}")))?;

    let backend: Box<dyn ImageBackend> = match config.provider {
        RenderProvider::Fal => Box::new(FalBackend::new(client, config)),
        RenderProvider::Runpod => Box::new(RunPodBackend::new(client, config)),
    };
    Ok(backend)
}

fn base_or(configured: &str, fallback: &str) -> String {
    let base = if configured.trim().is_empty() {
        fallback
    } else {
        configured
    };
    base.trim_end_matches('/').to_string()
}

async fn send_json(request: RequestBuilder) -> Result<Value, RenderError> {
    let response = request
        .send()
        .await
        .map_err(|e| RenderError::Upstream(e.to_string()))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| RenderError::Upstream(e.to_string()))?;

    if !status.is_success() {
        return Err(RenderError::Upstream(format!("HTTP {status}: {text}")));
    }
    serde_json::from_str(&text)
        .map_err(|e| RenderError::Upstream(format!("response is not JSON: {e}")))
}

/// fal.ai synchronous endpoint.
pub struct FalBackend {
    client: Client,
    url: String,
    api_key: String,
}

impl FalBackend {
    pub fn new(client: Client, config: &RenderConfig) -> Self {
        Self {
            client,
            url: format!(
                "{}/{}",
                base_or(&config.base_url, FAL_BASE_URL),
                config.endpoint.trim_matches('/')
            ),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl ImageBackend for FalBackend {
    fn name(&self) -> &'static str {
        "fal"
    }

    async fn render(&self, job: &RenderJob) -> Result<Value, RenderError> {
        let body = json!({
            "structured_prompt": job.json_prompt,
            "seed": job.seed,
            "num_inference_steps": job.steps,
            "guidance_scale": job.guidance_scale,
            "negative_prompt": job.negative_prompt,
            "aspect_ratio": job.aspect_ratio,
            "image_size": {"width": job.width, "height": job.height},
            "num_images": 1,
            "sync_mode": false,
        });

        send_json(
            self.client
                .post(&self.url)
                .header("Authorization", format!("Key {}", self.api_key))
                .json(&body),
        )
        .await
    }
}

/// RunPod serverless endpoint running the FIBO handler: submit, then poll.
pub struct RunPodBackend {
    client: Client,
    base: String,
    api_key: String,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Deserialize)]
struct JobStatus {
    #[serde(default)]
    id: Option<String>,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl RunPodBackend {
    pub fn new(client: Client, config: &RenderConfig) -> Self {
        Self {
            client,
            base: format!(
                "{}/{}",
                base_or(&config.base_url, RUNPOD_BASE_URL),
                config.endpoint.trim_matches('/')
            ),
            api_key: config.api_key.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_polls: config.max_polls,
        }
    }

    fn finished(job: JobStatus) -> Result<Option<Value>, RenderError> {
        match job.status.as_str() {
            "COMPLETED" => {
                let output = job.output.unwrap_or(Value::Null);
                if let Some(err) = output.get("error").and_then(Value::as_str) {
                    return Err(RenderError::Upstream(format!("worker error: {err}")));
                }
                Ok(Some(json!({ "output": output })))
            }
            "FAILED" | "CANCELLED" | "TIMED_OUT" => Err(RenderError::Upstream(format!(
                "job {}: {}",
                job.status.to_lowercase(),
                job.error.map(|e| e.to_string()).unwrap_or_default()
            ))),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl ImageBackend for RunPodBackend {
    fn name(&self) -> &'static str {
        "runpod"
    }

    async fn render(&self, job: &RenderJob) -> Result<Value, RenderError> {
        let body = json!({
            "input": {
                "json_prompt": job.json_prompt,
                "seed": job.seed,
                "steps": job.steps,
                "variants": 1,
                "aspect_ratio": job.aspect_ratio,
                "guidance_scale": job.guidance_scale,
                "negative_prompt": job.negative_prompt,
            }
        });

        let submitted = send_json(
            self.client
                .post(format!("{}/run", self.base))
                .bearer_auth(&self.api_key)
                .json(&body),
        )
        .await?;
        let submitted: JobStatus = serde_json::from_value(submitted)
            .map_err(|e| RenderError::Upstream(format!("unexpected submit response: {e}")))?;
        let job_id = submitted
            .id
            .clone()
            .ok_or_else(|| RenderError::Upstream("submit response has no job id".into()))?;
        tracing::debug!(job_id = %job_id, seed = job.seed, "Submitted RunPod job");

        if let Some(done) = Self::finished(submitted)? {
            return Ok(done);
        }

        for _ in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;

            let status = send_json(
                self.client
                    .get(format!("{}/status/{job_id}", self.base))
                    .bearer_auth(&self.api_key),
            )
            .await?;
            let status: JobStatus = serde_json::from_value(status)
                .map_err(|e| RenderError::Upstream(format!("unexpected status response: {e}")))?;

            if let Some(done) = Self::finished(status)? {
                return Ok(done);
            }
        }

        Err(RenderError::Upstream(format!(
            "job {job_id} did not finish after {} polls",
            self.max_polls
        )))
    }
}
