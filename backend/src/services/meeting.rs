//! Video meeting links.
//!
//! Links point at a Jitsi-compatible conferencing service and carry an HS256
//! JWT whose validity equals the appointment's access window. The token is
//! only issued while that window is open.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::api::*;
use crate::config::MeetingSettings;
use crate::models::normalize_email;
use crate::scheduler::{access_window, AccessWindow};

use super::{Practice, ServiceError, ServiceResult};

type HmacSha256 = Hmac<Sha256>;

/// Audience expected by the conferencing service.
pub const MEETING_AUDIENCE: &str = "jitsi";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingUser {
    pub name: String,
    pub email: String,
    pub moderator: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingContext {
    pub user: MeetingUser,
}

/// JWT payload understood by the conferencing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub room: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub context: MeetingContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingLink {
    pub url: String,
    pub token: String,
    pub room: String,
    pub moderator: bool,
    pub opens_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Meeting secret is not configured")]
    MissingSecret,
    #[error("Malformed meeting token")]
    Malformed,
    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Meeting token signature does not match")]
    BadSignature,
    #[error("Meeting token was issued for {0}")]
    WrongAudience(String),
    #[error("Meeting token is not valid yet")]
    NotYetValid,
    #[error("Meeting token has expired")]
    Expired,
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::MissingSecret => ServiceError::Internal(err.to_string()),
            other => ServiceError::Forbidden(other.to_string()),
        }
    }
}

fn signer(secret: &str) -> Result<HmacSha256, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::MissingSecret);
    }
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::MissingSecret)
}

fn encode_part<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let bytes = serde_json::to_vec(value).map_err(|_| TokenError::Malformed)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn decode_part<T: for<'de> Deserialize<'de>>(part: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

/// Sign `claims` as a compact HS256 JWT.
pub fn sign_token(claims: &MeetingClaims, secret: &str) -> Result<String, TokenError> {
    let header = TokenHeader {
        alg: "HS256".to_string(),
        typ: "JWT".to_string(),
    };
    let signing_input = format!("{}.{}", encode_part(&header)?, encode_part(claims)?);

    let mut mac = signer(secret)?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{}.{}", signing_input, signature))
}

/// Check signature, issuer, audience and time claims of `token` at `now`.
pub fn decode_token(
    token: &str,
    settings: &MeetingSettings,
    now: DateTime<Utc>,
) -> Result<MeetingClaims, TokenError> {
    let mut parts = token.trim().split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };

    let parsed: TokenHeader = decode_part(header)?;
    if parsed.alg != "HS256" {
        return Err(TokenError::UnsupportedAlgorithm(parsed.alg));
    }

    let expected = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenError::Malformed)?;
    let mut mac = signer(&settings.app_secret)?;
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| TokenError::BadSignature)?;

    let claims: MeetingClaims = decode_part(payload)?;
    if claims.aud != MEETING_AUDIENCE || claims.iss != settings.app_id {
        return Err(TokenError::WrongAudience(format!(
            "{}/{}",
            claims.iss, claims.aud
        )));
    }
    let now = now.timestamp();
    if now < claims.nbf {
        return Err(TokenError::NotYetValid);
    }
    if now > claims.exp {
        return Err(TokenError::Expired);
    }
    Ok(claims)
}

/// The access window of `appointment` under the configured margins.
pub fn appointment_window(settings: &MeetingSettings, appointment: &Appointment) -> AccessWindow {
    access_window(
        appointment.start_time,
        appointment.end_time,
        Duration::minutes(settings.access_before_minutes),
        Duration::minutes(settings.access_after_minutes),
    )
}

fn issue_for(
    practice: &Practice,
    appointment: &Appointment,
    client: &Client,
    participant: Participant,
    now: DateTime<Utc>,
) -> ServiceResult<MeetingLink> {
    if appointment.appointment_type != AppointmentType::Online {
        return Err(ServiceError::validation(format!(
            "Appointment {} is not an online session",
            appointment.id
        )));
    }
    if appointment.is_cancelled() {
        return Err(ServiceError::forbidden(format!(
            "Appointment {} is cancelled",
            appointment.id
        )));
    }
    let room = appointment.meeting_room.clone().ok_or_else(|| {
        ServiceError::Internal(format!("Appointment {} has no meeting room", appointment.id))
    })?;

    let settings = &practice.config().meeting;
    let window = appointment_window(settings, appointment);
    match window.state_at(now) {
        AccessState::Open => {}
        AccessState::TooEarly => {
            return Err(ServiceError::forbidden(format!(
                "The meeting opens at {}",
                window.opens_at
            )))
        }
        AccessState::Closed => {
            return Err(ServiceError::forbidden("The meeting has ended"));
        }
    }

    let practice_settings = &practice.config().practice;
    let user = match participant {
        Participant::Host => MeetingUser {
            name: practice_settings.practitioner_name.clone(),
            email: practice_settings.practitioner_email.clone(),
            moderator: true,
        },
        Participant::Client => MeetingUser {
            name: client.full_name(),
            email: client.email.clone(),
            moderator: false,
        },
    };
    let moderator = user.moderator;
    let claims = MeetingClaims {
        iss: settings.app_id.clone(),
        aud: MEETING_AUDIENCE.to_string(),
        sub: settings.domain.clone(),
        room: room.clone(),
        iat: now.timestamp(),
        nbf: window.opens_at.timestamp(),
        exp: window.closes_at.timestamp(),
        context: MeetingContext { user },
    };
    let token = sign_token(&claims, &settings.app_secret)?;

    tracing::info!(
        appointment_id = %appointment.id,
        participant = %participant,
        "Meeting link issued"
    );
    Ok(MeetingLink {
        url: format!("https://{}/{}?jwt={}", settings.domain, room, token),
        token,
        room,
        moderator,
        opens_at: window.opens_at,
        expires_at: window.closes_at,
    })
}

/// Issue a link for `participant` of appointment `id`.
pub async fn issue_link(
    practice: &Practice,
    id: AppointmentId,
    participant: Participant,
    now: DateTime<Utc>,
) -> ServiceResult<MeetingLink> {
    let appointment = practice.repo().get_appointment(id).await?;
    let client = practice.repo().get_client(appointment.client_id).await?;
    issue_for(practice, &appointment, &client, participant, now)
}

/// Public join: the caller proves who they are with the client's email.
pub async fn join_as_client(
    practice: &Practice,
    id: AppointmentId,
    email: &str,
    now: DateTime<Utc>,
) -> ServiceResult<MeetingLink> {
    let appointment = practice.repo().get_appointment(id).await?;
    let client = practice.repo().get_client(appointment.client_id).await?;
    if normalize_email(email) != client.email {
        tracing::warn!(appointment_id = %id, "Meeting join with mismatching email");
        return Err(ServiceError::forbidden(
            "Email does not match the appointment",
        ));
    }
    issue_for(practice, &appointment, &client, Participant::Client, now)
}

/// Decode and check a token issued by this practice.
pub fn verify_token(
    practice: &Practice,
    token: &str,
    now: DateTime<Utc>,
) -> ServiceResult<MeetingClaims> {
    Ok(decode_token(token, &practice.config().meeting, now)?)
}
