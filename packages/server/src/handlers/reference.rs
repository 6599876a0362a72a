use axum::Json;
use common::render::ASPECT_RATIOS;

use crate::models::scene::AspectRatiosResponse;

#[utoipa::path(
    get,
    path = "/aspect-ratios",
    tag = "Reference",
    operation_id = "listAspectRatios",
    summary = "List supported aspect ratios",
    description = "Ratios accepted by `aspect_ratio` and the output size each one renders at. Unlisted ratios snap to the closest entry, or to 1:1.",
    responses(
        (status = 200, description = "Supported aspect ratios", body = AspectRatiosResponse),
    ),
)]
pub async fn list_aspect_ratios() -> Json<AspectRatiosResponse> {
    Json(AspectRatiosResponse::from_table(ASPECT_RATIOS))
}
