//! Admission token validation.
//!
//! Authentication proper lives outside the core: a bearer token arrives
//! on the upgrade request, and this module turns it into a validated
//! [`Participant`] or a rejection before the connection is admitted.
//! Tokens are HMAC-SHA256 JWTs signed with `CHAT_JWT_SECRET`.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ChatError;
use crate::identity::{AccountKind, User};
use crate::participant::{Participant, Role};

/// Claims carried by an admission token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub exp: i64,
}

/// Validates admission tokens into participants.
pub struct Authenticator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl Authenticator {
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Validate a bearer token and construct the participant it admits.
    ///
    /// `Moderator` and `Bot` roles are honored from the claim. A `Muted`
    /// claim is admitted as `Common`: muting is room-local state, not an
    /// account property.
    pub fn admit(&self, token: &str) -> Result<Participant, ChatError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                warn!(target: "chat.auth", error = %e, "admission token rejected");
                ChatError::Unauthorized("invalid or expired token".to_string())
            })?;

        let claims = data.claims;
        let role = match claims.role {
            Some(Role::Muted) | None => Role::Common,
            Some(role) => role,
        };

        let user = User::new(claims.user_id, claims.name, AccountKind::Member);
        let nickname = claims.nickname.unwrap_or_default();

        Ok(Participant::new(user, nickname, role))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "admission-test-secret";

    fn sign(claims: &Claims) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn authenticator() -> Authenticator {
        Authenticator::new(&SecretString::from(SECRET))
    }

    fn claims(role: Option<Role>) -> Claims {
        Claims {
            user_id: "u-1".to_string(),
            name: "alice".to_string(),
            nickname: Some("wonderland".to_string()),
            role,
            exp: chrono::Utc::now().timestamp() + 3600,
        }
    }

    #[test]
    fn test_admit_valid_token() {
        let token = sign(&claims(None));
        let participant = authenticator().admit(&token).unwrap();

        assert_eq!(participant.id(), "u-1");
        assert_eq!(participant.nickname(), "wonderland");
        assert_eq!(participant.role(), Role::Common);
    }

    #[test]
    fn test_admit_honors_moderator_claim() {
        let token = sign(&claims(Some(Role::Moderator)));
        let participant = authenticator().admit(&token).unwrap();
        assert!(participant.is_moderator());
    }

    #[test]
    fn test_admit_honors_bot_claim() {
        let token = sign(&claims(Some(Role::Bot)));
        let participant = authenticator().admit(&token).unwrap();
        assert_eq!(participant.role(), Role::Bot);
    }

    #[test]
    fn test_admit_downgrades_muted_claim_to_common() {
        let token = sign(&claims(Some(Role::Muted)));
        let participant = authenticator().admit(&token).unwrap();
        assert_eq!(participant.role(), Role::Common);
    }

    #[test]
    fn test_admit_rejects_expired_token() {
        let mut expired = claims(None);
        expired.exp = chrono::Utc::now().timestamp() - 3600;
        let token = sign(&expired);

        let result = authenticator().admit(&token);
        assert!(matches!(result, Err(ChatError::Unauthorized(_))));
    }

    #[test]
    fn test_admit_rejects_wrong_signature() {
        let token = encode(
            &Header::default(),
            &claims(None),
            &EncodingKey::from_secret(b"some-other-secret"),
        )
        .unwrap();

        let result = authenticator().admit(&token);
        assert!(matches!(result, Err(ChatError::Unauthorized(_))));
    }
}
