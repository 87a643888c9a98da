use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub username: String,
    /// Onboarding token string currently granting access
    pub token: Option<String>,
    pub token_removed: bool,
    #[serde(skip_serializing)]
    pub session_token: Option<String>,
    #[serde(skip_serializing)]
    pub session_id: Option<String>,
    pub last_login: Option<DateTimeUtc>,
    pub last_logout: Option<DateTimeUtc>,
    pub deploy_timestamp: Option<DateTimeUtc>,
    pub active_form_number: Option<i32>,
    pub active_run_id: Option<i64>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::token::Entity")]
    Tokens,
}

impl Related<super::token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tokens.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
