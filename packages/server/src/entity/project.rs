use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,

    pub user_id: i32,
    #[sea_orm(belongs_to, from = "user_id", to = "id", on_delete = "Cascade")]
    pub user: HasOne<super::user::Entity>,

    pub base_image_url: Option<String>,

    /// Graph-editor state: `{nodes, edges}` and/or legacy `{versions}`.
    /// Stored opaquely; last write wins.
    #[sea_orm(column_type = "JsonBinary")]
    pub canvas_state: Json,

    pub style: Option<String>,
    pub material: Option<String>,
    pub lighting: Option<String>,
    pub camera: Option<String>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
