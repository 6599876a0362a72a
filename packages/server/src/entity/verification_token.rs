use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Single-use magic-link token.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "verification_token")]
pub struct Model {
    /// Lowercased email the link was issued for.
    #[sea_orm(primary_key, auto_increment = false)]
    pub identifier: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub token: String,

    pub expires: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
