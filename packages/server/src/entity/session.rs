use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "session")]
pub struct Model {
    /// Random hex token; also embedded as `sid` in the bearer JWT.
    #[sea_orm(primary_key, auto_increment = false)]
    pub session_token: String,

    pub user_id: i32,
    #[sea_orm(belongs_to, from = "user_id", to = "id", on_delete = "Cascade")]
    pub user: HasOne<super::user::Entity>,

    pub expires: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
