use std::sync::Arc;

use common::storage::ObjectStore;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::services::render::Renderer;
use crate::services::scene::SceneGenerator;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: AppConfig,
    pub scenes: Arc<SceneGenerator>,
    pub renderer: Arc<Renderer>,
    pub storage: Arc<dyn ObjectStore>,
}
