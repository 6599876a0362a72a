use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/projects", project_routes())
        .nest("/scene", scene_routes())
        .nest("/uploads", upload_routes(config))
        .routes(routes!(handlers::generate::generate))
        .routes(routes!(handlers::reference::list_aspect_ratios))
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::auth::register))
        .routes(routes!(handlers::auth::login))
        .routes(routes!(handlers::auth::logout))
        .routes(routes!(handlers::auth::me))
        .routes(routes!(handlers::auth::request_magic_link))
        .routes(routes!(handlers::auth::verify_magic_link))
}

fn project_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::project::list_projects,
            handlers::project::create_project
        ))
        .routes(routes!(
            handlers::project::get_project,
            handlers::project::update_project,
            handlers::project::delete_project
        ))
        .routes(routes!(
            handlers::project::get_settings,
            handlers::project::update_settings
        ))
        .routes(routes!(handlers::project::get_version_path))
        .routes(routes!(handlers::node::run_node))
        .routes(routes!(handlers::node::reset_node))
}

fn scene_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::scene::generate_json))
        .routes(routes!(handlers::scene::render))
}

fn upload_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::upload::upload_file))
        .layer(handlers::upload::upload_body_limit(
            config.storage.max_upload_size,
        ))
}
