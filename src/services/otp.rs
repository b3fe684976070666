use crate::{
    clock::Clock,
    config::ConfigHandle,
    entities::{otp_challenge, Client, OtpChallenge, OtpPurpose, Technician},
    errors::ServiceError,
    events::{Event, EventSender, OtpRejection},
    notifications::{otp_message, NotificationDispatcher},
    random::SecureRandom,
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Outcome of an OTP validation.
///
/// Failures are values, not errors: the public caller shows different
/// guidance for each [`OtpRejection`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpValidationResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<OtpRejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_ttl_seconds: Option<i64>,
}

impl OtpValidationResult {
    fn rejected(reason: OtpRejection, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            reason: Some(reason),
            token: None,
            token_ttl_seconds: None,
        }
    }

    fn accepted(token: Option<String>, token_ttl_seconds: Option<i64>) -> Self {
        Self {
            success: true,
            message: "Code verified".to_string(),
            reason: None,
            token,
            token_ttl_seconds,
        }
    }
}

/// Confirmation of an issued challenge. The code itself only travels by mail.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedChallenge {
    pub challenge_id: Uuid,
    pub purpose: OtpPurpose,
    pub expires_at: DateTime<Utc>,
}

struct Recipient {
    name: String,
    email: String,
}

/// Compares codes without short-circuiting on the first differing byte.
fn codes_match(expected: &str, submitted: &str) -> bool {
    let (a, b) = (expected.as_bytes(), submitted.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// One-time codes and the consultation tokens they unlock.
#[derive(Clone)]
pub struct OtpService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: ConfigHandle,
    clock: Arc<dyn Clock>,
    random: Arc<dyn SecureRandom>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl OtpService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: ConfigHandle,
        clock: Arc<dyn Clock>,
        random: Arc<dyn SecureRandom>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            clock,
            random,
            dispatcher,
        }
    }

    /// Issues a fresh code for `user_id` and mails it to the address on file.
    ///
    /// Consultation codes are bound to clients and require `email` to match
    /// the client's address (case-insensitive). General codes are bound to
    /// technicians. If mailing fails the challenge stays stored and the
    /// failure is returned, so the caller can simply ask again.
    #[instrument(skip(self, email))]
    pub async fn issue(
        &self,
        user_id: &str,
        purpose: OtpPurpose,
        email: Option<&str>,
    ) -> Result<IssuedChallenge, ServiceError> {
        let recipient = self.resolve_recipient(user_id, purpose).await?;

        if purpose == OtpPurpose::Consultation {
            let supplied = email
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .ok_or_else(|| {
                    ServiceError::ValidationError("email is required for consultation".to_string())
                })?;
            if !supplied.eq_ignore_ascii_case(recipient.email.trim()) {
                warn!(user_id, "Consultation OTP requested with non-matching email");
                return Err(ServiceError::Unauthorized(
                    "email does not match our records".to_string(),
                ));
            }
        }

        let cfg = self.config.current().await;
        let now = self.clock.now();
        let code = self.random.otp_code();
        let expires_at = now + Duration::seconds(cfg.otp.code_ttl_secs);

        let challenge = otp_challenge::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id.to_string()),
            purpose: Set(purpose),
            code: Set(code.clone()),
            issued_at: Set(now),
            expires_at: Set(expires_at),
            validated_at: Set(None),
            valid: Set(false),
            attempt_count: Set(0),
            max_attempts: Set(cfg.otp.max_attempts),
            lookup_token: Set(None),
            token_expires_at: Set(None),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::OtpIssued {
                user_id: user_id.to_string(),
                purpose,
                challenge_id: challenge.id,
            })
            .await;

        let message = otp_message(
            &cfg.mail,
            &recipient.email,
            &recipient.name,
            &code,
            cfg.otp.code_ttl_secs / 60,
        );
        if let Err(e) = self.dispatcher.send(message).await {
            warn!(user_id, challenge_id = %challenge.id, error = %e, "OTP mail could not be sent");
            return Err(e.into());
        }

        info!(user_id, challenge_id = %challenge.id, "OTP issued");
        Ok(IssuedChallenge {
            challenge_id: challenge.id,
            purpose,
            expires_at,
        })
    }

    /// Checks `submitted_code` against the most recent challenge of `user_id`.
    ///
    /// A validated consultation challenge answers repeat submissions of the
    /// same code with its still-live token. Once that token expired, the code
    /// is spent and a new one must be issued.
    #[instrument(skip(self, submitted_code))]
    pub async fn validate(
        &self,
        user_id: &str,
        purpose: OtpPurpose,
        submitted_code: &str,
    ) -> Result<OtpValidationResult, ServiceError> {
        let result = self.evaluate(user_id, purpose, submitted_code).await?;
        match result.reason {
            Some(reason) => {
                self.event_sender
                    .send_or_log(Event::OtpRejected {
                        user_id: user_id.to_string(),
                        reason,
                    })
                    .await;
            }
            None => info!(user_id, "OTP validated"),
        }
        Ok(result)
    }

    /// Maps a live consultation token back to the client it was minted for.
    #[instrument(skip(self, token))]
    pub async fn resolve_token(&self, token: &str) -> Result<String, ServiceError> {
        let invalid = || ServiceError::Unauthorized("invalid or expired token".to_string());
        if token.is_empty() {
            return Err(invalid());
        }

        let challenge = OtpChallenge::find()
            .filter(otp_challenge::Column::LookupToken.eq(token))
            .filter(otp_challenge::Column::Valid.eq(true))
            .filter(otp_challenge::Column::Purpose.eq(OtpPurpose::Consultation))
            .one(&*self.db)
            .await?
            .ok_or_else(invalid)?;

        match challenge.token_expires_at {
            Some(expires_at) if expires_at > self.clock.now() => Ok(challenge.user_id),
            _ => Err(invalid()),
        }
    }

    async fn evaluate(
        &self,
        user_id: &str,
        purpose: OtpPurpose,
        submitted_code: &str,
    ) -> Result<OtpValidationResult, ServiceError> {
        let Some(challenge) = self.latest_challenge(user_id).await? else {
            return Ok(OtpValidationResult::rejected(
                OtpRejection::NotFound,
                "No code was requested for this user",
            ));
        };

        if challenge.purpose != purpose {
            return Ok(OtpValidationResult::rejected(
                OtpRejection::PurposeMismatch,
                "The latest code was issued for a different purpose",
            ));
        }

        let now = self.clock.now();

        if challenge.valid {
            let Some(ttl) = challenge.live_token_ttl(now) else {
                return Ok(OtpValidationResult::rejected(
                    OtpRejection::AlreadyUsed,
                    "This code was already used; request a new one",
                ));
            };
            if let Some(rejection) = self.check_code(&challenge, submitted_code).await? {
                return Ok(rejection);
            }
            return Ok(OtpValidationResult::accepted(
                challenge.lookup_token.clone(),
                Some(ttl),
            ));
        }

        if challenge.expires_at <= now {
            return Ok(OtpValidationResult::rejected(
                OtpRejection::Expired,
                "The code has expired; request a new one",
            ));
        }

        if let Some(rejection) = self.check_code(&challenge, submitted_code).await? {
            return Ok(rejection);
        }

        self.mark_validated(challenge, now).await
    }

    /// Enforces the attempt limit and compares the code; wrong codes count.
    async fn check_code(
        &self,
        challenge: &otp_challenge::Model,
        submitted_code: &str,
    ) -> Result<Option<OtpValidationResult>, ServiceError> {
        if challenge.attempt_count >= challenge.max_attempts {
            return Ok(Some(OtpValidationResult::rejected(
                OtpRejection::Locked,
                "Too many failed attempts; contact the shop or request a new code",
            )));
        }

        if codes_match(&challenge.code, submitted_code.trim()) {
            return Ok(None);
        }

        // Conditional increment: the counter can never pass the limit even
        // when wrong codes arrive concurrently.
        OtpChallenge::update_many()
            .col_expr(
                otp_challenge::Column::AttemptCount,
                Expr::col(otp_challenge::Column::AttemptCount).add(1),
            )
            .filter(otp_challenge::Column::Id.eq(challenge.id))
            .filter(otp_challenge::Column::AttemptCount.lt(challenge.max_attempts))
            .exec(&*self.db)
            .await?;

        let remaining = (challenge.max_attempts - challenge.attempt_count - 1).max(0);
        Ok(Some(OtpValidationResult::rejected(
            OtpRejection::Incorrect,
            format!("Incorrect code; {} attempt(s) left", remaining),
        )))
    }

    async fn mark_validated(
        &self,
        challenge: otp_challenge::Model,
        now: DateTime<Utc>,
    ) -> Result<OtpValidationResult, ServiceError> {
        let (token, token_expires_at, ttl) = match challenge.purpose {
            OtpPurpose::Consultation => {
                let ttl = self.config.current().await.otp.consultation_token_ttl_secs;
                (
                    Some(self.random.lookup_token()),
                    Some(now + Duration::seconds(ttl)),
                    Some(ttl),
                )
            }
            OtpPurpose::General => (None, None, None),
        };

        // Only the first concurrent winner flips `valid`.
        let updated = OtpChallenge::update_many()
            .col_expr(otp_challenge::Column::Valid, Expr::value(true))
            .col_expr(otp_challenge::Column::ValidatedAt, Expr::value(Some(now)))
            .col_expr(otp_challenge::Column::LookupToken, Expr::value(token.clone()))
            .col_expr(
                otp_challenge::Column::TokenExpiresAt,
                Expr::value(token_expires_at),
            )
            .filter(otp_challenge::Column::Id.eq(challenge.id))
            .filter(otp_challenge::Column::Valid.eq(false))
            .exec(&*self.db)
            .await?;

        if updated.rows_affected == 0 {
            let current = OtpChallenge::find_by_id(challenge.id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::not_found("OTP challenge", challenge.id))?;
            return Ok(match current.live_token_ttl(now) {
                Some(ttl) => OtpValidationResult::accepted(current.lookup_token.clone(), Some(ttl)),
                None => OtpValidationResult::rejected(
                    OtpRejection::AlreadyUsed,
                    "This code was already used; request a new one",
                ),
            });
        }

        self.event_sender
            .send_or_log(Event::OtpValidated {
                user_id: challenge.user_id.clone(),
                challenge_id: challenge.id,
            })
            .await;

        Ok(OtpValidationResult::accepted(token, ttl))
    }

    async fn latest_challenge(
        &self,
        user_id: &str,
    ) -> Result<Option<otp_challenge::Model>, ServiceError> {
        Ok(OtpChallenge::find()
            .filter(otp_challenge::Column::UserId.eq(user_id))
            .order_by_desc(otp_challenge::Column::IssuedAt)
            .one(&*self.db)
            .await?)
    }

    async fn resolve_recipient(
        &self,
        user_id: &str,
        purpose: OtpPurpose,
    ) -> Result<Recipient, ServiceError> {
        let db = &*self.db;
        match purpose {
            OtpPurpose::Consultation => {
                let client = Client::find_by_id(user_id.to_string())
                    .one(db)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Client", user_id))?;
                Ok(Recipient {
                    name: client.name,
                    email: client.email,
                })
            }
            OtpPurpose::General => {
                let technician = Technician::find_by_id(user_id.to_string())
                    .one(db)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Technician", user_id))?;
                Ok(Recipient {
                    name: technician.name,
                    email: technician.email,
                })
            }
        }
    }
}
