use std::path::PathBuf;

use common::config::StorageAppConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    #[serde(default)]
    pub allow_origins: Vec<String>,
    #[serde(default = "default_cors_max_age")]
    pub max_age: u64,
}

fn default_cors_max_age() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Lifetime of a login session and its bearer token.
    pub session_days: i64,
    pub magic_link_minutes: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Directory of `<stage>.txt` system prompts overriding the built-in ones.
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RenderProvider {
    Fal,
    Runpod,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderConfig {
    pub provider: RenderProvider,
    #[serde(default)]
    pub api_key: String,
    /// fal.ai model path or RunPod endpoint id.
    pub endpoint: String,
    /// Empty selects the provider's public API.
    #[serde(default)]
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    pub render: RenderConfig,
    #[serde(default)]
    pub storage: StorageAppConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("ARCHFLOW_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.cors.allow_origins", Vec::<String>::new())?
            .set_default("server.cors.max_age", 3600)?
            .set_default("database.url", "sqlite://./data/archflow.db?mode=rwc")?
            .set_default("auth.session_days", 30)?
            .set_default("auth.magic_link_minutes", 15)?
            .set_default("llm.model", "gemini-2.0-flash")?
            .set_default(
                "llm.base_url",
                "https://generativelanguage.googleapis.com/v1beta",
            )?
            .set_default("llm.timeout_secs", 60)?
            .set_default("render.provider", "fal")?
            .set_default("render.endpoint", "fal-ai/bria/fibo/generate")?
            .set_default("render.poll_interval_ms", 2000)?
            .set_default("render.max_polls", 150)?
            .set_default("render.timeout_secs", 120)?
            .add_source(File::with_name(&config_path).required(false))
            // e.g. ARCHFLOW__STORAGE__PUBLIC_URL
            .add_source(Environment::with_prefix("ARCHFLOW").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
