use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::http::header;
use axum::routing::get;
use common::config::{StorageAppConfig, StorageBackend};
use common::render::RenderJob;
use common::scene::SceneError;
use common::storage::filesystem::FilesystemObjectStore;
use reqwest::Client;
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use tempfile::TempDir;

use server::config::{
    AppConfig, AuthConfig, CorsConfig, DatabaseConfig, LlmConfig, RenderConfig, RenderProvider,
    ServerConfig,
};
use server::services::diffusion::ImageBackend;
use server::services::llm::SceneModel;
use server::services::render::{RenderError, Renderer};
use server::services::scene::SceneGenerator;
use server::services::templates::TemplateCache;
use server::state::AppState;

/// Public base every stored object URL starts with.
pub const PUBLIC_BASE: &str = "https://cdn.test";

/// Bytes served by the stub image host. Not a real PNG; only copied around.
pub const IMAGE_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nstub-image";

pub mod routes {
    pub const REGISTER: &str = "/api/v1/auth/register";
    pub const LOGIN: &str = "/api/v1/auth/login";
    pub const LOGOUT: &str = "/api/v1/auth/logout";
    pub const ME: &str = "/api/v1/auth/me";
    pub const MAGIC_LINK: &str = "/api/v1/auth/magic-link";
    pub const MAGIC_LINK_VERIFY: &str = "/api/v1/auth/magic-link/verify";
    pub const PROJECTS: &str = "/api/v1/projects";
    pub const GENERATE_JSON: &str = "/api/v1/scene/generate-json";
    pub const RENDER: &str = "/api/v1/scene/render";
    pub const GENERATE: &str = "/api/v1/generate";
    pub const UPLOADS: &str = "/api/v1/uploads";
    pub const ASPECT_RATIOS: &str = "/api/v1/aspect-ratios";

    pub fn project(id: i32) -> String {
        format!("/api/v1/projects/{id}")
    }

    pub fn project_settings(id: i32) -> String {
        format!("/api/v1/projects/{id}/settings")
    }

    pub fn version_path(id: i32, version_id: &str) -> String {
        format!("/api/v1/projects/{id}/versions/{version_id}/path")
    }

    pub fn run_node(id: i32, node_id: &str) -> String {
        format!("/api/v1/projects/{id}/nodes/{node_id}/run")
    }

    pub fn reset_node(id: i32, node_id: &str) -> String {
        format!("/api/v1/projects/{id}/nodes/{node_id}/reset")
    }
}

/// Language model stub that answers with the same valid scene, or fails
/// while `failing` is set.
pub struct StubModel {
    pub calls: AtomicUsize,
    pub failing: AtomicBool,
}

#[async_trait]
impl SceneModel for StubModel {
    async fn generate_json(&self, _system: &str, _user: &str) -> Result<String, SceneError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SceneError::Upstream("model quota exhausted".into()));
        }
        Ok(json!({
            "json_prompt": {
                "short_description": "A bright living room with a bay window",
                "objects": [{"description": "sofa"}],
                "lighting": {"conditions": "soft daylight"}
            }
        })
        .to_string())
    }
}

/// Render backend stub pointing every image at the local image host.
///
/// The call numbered `fail_on` (zero-based, counted across the app's lifetime)
/// fails; `usize::MAX` means none does. Each call first sleeps `delay_ms`.
pub struct StubBackend {
    pub calls: AtomicUsize,
    pub fail_on: AtomicUsize,
    pub delay_ms: AtomicU64,
    image_host: SocketAddr,
}

#[async_trait]
impl ImageBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn render(&self, job: &RenderJob) -> Result<Value, RenderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if n == self.fail_on.load(Ordering::SeqCst) {
            return Err(RenderError::Upstream("GPU unavailable".into()));
        }
        Ok(json!({
            "images": [{"url": format!("http://{}/img/{}.png", self.image_host, job.seed)}]
        }))
    }
}

/// A running test server.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub db: DatabaseConnection,
    pub model: Arc<StubModel>,
    pub backend: Arc<StubBackend>,
    pub storage_root: PathBuf,
    _dir: TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

async fn spawn_image_host() -> SocketAddr {
    let app = Router::new().route(
        "/img/{name}",
        get(|| async { ([(header::CONTENT_TYPE, "image/png")], IMAGE_BYTES) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind image host");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

impl TestApp {
    pub async fn spawn() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let db = server::database::init_db(&db_url)
            .await
            .expect("Failed to initialize test database");

        let storage_root = dir.path().join("objects");
        let storage_config = StorageAppConfig {
            backend: StorageBackend::Filesystem,
            root: storage_root.display().to_string(),
            public_url: PUBLIC_BASE.to_string(),
            ..Default::default()
        };

        let app_config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig {
                    allow_origins: vec![],
                    max_age: 3600,
                },
            },
            database: DatabaseConfig { url: db_url },
            auth: AuthConfig {
                jwt_secret: "test-secret-for-integration-tests".to_string(),
                session_days: 30,
                magic_link_minutes: 15,
            },
            llm: LlmConfig {
                api_key: String::new(),
                model: "stub".to_string(),
                base_url: "http://127.0.0.1:9".to_string(),
                timeout_secs: 5,
                templates_dir: None,
            },
            render: RenderConfig {
                provider: RenderProvider::Fal,
                api_key: String::new(),
                endpoint: "stub".to_string(),
                base_url: String::new(),
                poll_interval_ms: 10,
                max_polls: 3,
                timeout_secs: 5,
            },
            storage: storage_config.clone(),
        };

        let storage = Arc::new(
            FilesystemObjectStore::new(
                storage_root.clone(),
                storage_config.public_url.clone(),
                storage_config.max_upload_size,
            )
            .await
            .expect("Failed to create object store"),
        );

        let model = Arc::new(StubModel {
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        });
        let backend = Arc::new(StubBackend {
            calls: AtomicUsize::new(0),
            fail_on: AtomicUsize::new(usize::MAX),
            delay_ms: AtomicU64::new(0),
            image_host: spawn_image_host().await,
        });

        let state = AppState {
            db: db.clone(),
            config: app_config,
            scenes: Arc::new(SceneGenerator::new(model.clone(), TemplateCache::new(None))),
            renderer: Arc::new(Renderer::new(
                backend.clone(),
                storage.clone(),
                Client::new(),
                storage_config.max_upload_size,
            )),
            storage,
        };

        let app = server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            db,
            model,
            backend,
            storage_root,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn model_calls(&self) -> usize {
        self.model.calls.load(Ordering::SeqCst)
    }

    pub fn backend_calls(&self) -> usize {
        self.backend.calls.load(Ordering::SeqCst)
    }

    pub fn set_model_failing(&self, failing: bool) {
        self.model.failing.store(failing, Ordering::SeqCst);
    }

    /// Make the `n`-th render call from now fail (zero-based).
    pub fn fail_render_call(&self, n: usize) {
        self.backend
            .fail_on
            .store(self.backend_calls() + n, Ordering::SeqCst);
    }

    pub fn set_render_delay(&self, delay: Duration) {
        self.backend
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of rehosted render outputs currently in storage.
    pub fn stored_generations(&self) -> usize {
        std::fs::read_dir(self.storage_root.join("generations"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub async fn post_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn post_without_token(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn get_without_token(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn patch_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .patch(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send PATCH request");

        TestResponse::from_response(res).await
    }

    pub async fn delete_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }

    pub async fn upload_with_token(
        &self,
        path: &str,
        file_name: &str,
        file_bytes: Vec<u8>,
        token: &str,
    ) -> TestResponse {
        let part = reqwest::multipart::Part::bytes(file_bytes)
            .file_name(file_name.to_string())
            .mime_str("image/png")
            .expect("Failed to set MIME type");
        let form = reqwest::multipart::Form::new().part("file", part);

        let res = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send multipart upload request");

        TestResponse::from_response(res).await
    }

    /// Register a user and log in, returning the auth token.
    pub async fn create_authenticated_user(&self, email: &str, password: &str) -> String {
        let body = json!({
            "email": email,
            "password": password,
        });

        let reg = self.post_without_token(routes::REGISTER, &body).await;
        assert_eq!(reg.status, 201, "Registration failed: {}", reg.text);

        let res = self.post_without_token(routes::LOGIN, &body).await;
        assert_eq!(res.status, 200, "Login failed: {}", res.text);

        res.body["token"]
            .as_str()
            .expect("Login response should contain a token")
            .to_string()
    }

    /// Create a project via the API and return its `id`.
    pub async fn create_project(&self, token: &str, body: &Value) -> i32 {
        let res = self.post_with_token(routes::PROJECTS, body, token).await;
        assert_eq!(res.status, 201, "create_project failed: {}", res.text);
        res.id()
    }
}

impl TestResponse {
    pub async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, text, body }
    }

    /// Extract the `id` field from the response body as `i32`.
    pub fn id(&self) -> i32 {
        self.body["id"]
            .as_i64()
            .unwrap_or_else(|| panic!("Response should contain numeric 'id': {}", self.text))
            as i32
    }
}
