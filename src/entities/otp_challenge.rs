use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What an OTP challenge was issued for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OtpPurpose {
    /// Operational OTP for staff-facing flows.
    #[sea_orm(string_value = "GENERAL")]
    General,
    /// Public "check my order" flow; validation mints a lookup token.
    #[sea_orm(string_value = "CONSULTATION")]
    Consultation,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "otp_challenges")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: String,
    pub purpose: OtpPurpose,
    #[serde(skip_serializing)]
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub validated_at: Option<DateTime<Utc>>,
    pub valid: bool,
    pub attempt_count: i32,
    pub max_attempts: i32,
    #[sea_orm(unique, nullable)]
    #[serde(skip_serializing)]
    pub lookup_token: Option<String>,
    #[sea_orm(nullable)]
    pub token_expires_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Remaining token lifetime in whole seconds, if the token is still live at `now`.
    pub fn live_token_ttl(&self, now: DateTime<Utc>) -> Option<i64> {
        match (&self.lookup_token, self.token_expires_at) {
            (Some(_), Some(expires_at)) if self.valid && expires_at > now => {
                Some((expires_at - now).num_seconds())
            }
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
