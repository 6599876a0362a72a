use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Provider name for email/password accounts.
pub const CREDENTIALS_PROVIDER: &str = "credentials";
/// Provider name for accounts created by redeeming a magic link.
pub const EMAIL_PROVIDER: &str = "email";

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "account")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,
    #[sea_orm(belongs_to, from = "user_id", to = "id", on_delete = "Cascade")]
    pub user: HasOne<super::user::Entity>,

    #[sea_orm(unique_key = "provider_account")]
    pub provider: String,
    /// Email for `credentials`/`email`, the provider's subject id otherwise.
    #[sea_orm(unique_key = "provider_account")]
    pub provider_account_id: String,

    /// Argon2 PHC string; only set for the `credentials` provider.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
