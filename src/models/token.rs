use chrono::Months;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of an onboarding token. Expiry is derived from `expires_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum TokenStatus {
    #[sea_orm(string_value = "Active")]
    Active,
    #[sea_orm(string_value = "InUse")]
    InUse,
}

/// Validity class of an onboarding token
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum TokenDuration {
    #[sea_orm(string_value = "3month")]
    #[serde(rename = "3month")]
    ThreeMonths,
    #[sea_orm(string_value = "6month")]
    #[serde(rename = "6month")]
    SixMonths,
    #[sea_orm(string_value = "1year")]
    #[serde(rename = "1year")]
    OneYear,
}

impl TokenDuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenDuration::ThreeMonths => "3month",
            TokenDuration::SixMonths => "6month",
            TokenDuration::OneYear => "1year",
        }
    }

    pub fn months(&self) -> Months {
        match self {
            TokenDuration::ThreeMonths => Months::new(3),
            TokenDuration::SixMonths => Months::new(6),
            TokenDuration::OneYear => Months::new(12),
        }
    }
}

impl std::fmt::Display for TokenDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TokenDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3month" => Ok(TokenDuration::ThreeMonths),
            "6month" => Ok(TokenDuration::SixMonths),
            "1year" => Ok(TokenDuration::OneYear),
            other => Err(format!("Invalid duration '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub token: String,
    pub status: TokenStatus,
    pub duration: TokenDuration,
    pub user_id: Option<i64>,
    pub created_at: DateTimeUtc,
    pub expires_at: DateTimeUtc,
}

impl Model {
    pub fn is_expired(&self, now: DateTimeUtc) -> bool {
        now >= self.expires_at
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "SetNull"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
