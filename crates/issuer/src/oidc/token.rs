//! Authorization codes and access/refresh tokens as the issuer sees them.

use crate::entity::{oidc_code, oidc_token, split_scope};
use crate::error::IssuerError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use time::OffsetDateTime;

/// PKCE code challenge method (RFC 7636).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeChallengeMethod {
    S256,
    Plain,
}

impl CodeChallengeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeChallengeMethod::S256 => "S256",
            CodeChallengeMethod::Plain => "plain",
        }
    }

    /// Verify `verifier` against a stored `challenge`.
    pub fn verify(&self, challenge: &str, verifier: &str) -> bool {
        match self {
            CodeChallengeMethod::S256 => {
                let hash = Sha256::digest(verifier.as_bytes());
                URL_SAFE_NO_PAD.encode(hash) == challenge
            }
            CodeChallengeMethod::Plain => verifier == challenge,
        }
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = IssuerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S256" => Ok(CodeChallengeMethod::S256),
            "plain" => Ok(CodeChallengeMethod::Plain),
            other => Err(IssuerError::InvalidRequest(format!(
                "unsupported code_challenge_method '{other}'"
            ))),
        }
    }
}

/// A single-use authorization code.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub user_id: String,
    pub scope: Vec<String>,
    pub nonce: Option<String>,
    pub is_authentication: bool,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<CodeChallengeMethod>,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl AuthorizationCode {
    pub fn has_expired(&self) -> bool {
        self.has_expired_at(OffsetDateTime::now_utc())
    }

    pub fn has_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Check a PKCE verifier. A code issued without a challenge accepts any
    /// (or no) verifier; a code with a challenge requires a matching one.
    pub fn verify_pkce(&self, code_verifier: Option<&str>) -> bool {
        match (&self.code_challenge, code_verifier) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(challenge), Some(verifier)) => self
                .code_challenge_method
                .unwrap_or(CodeChallengeMethod::Plain)
                .verify(challenge, verifier),
        }
    }
}

impl TryFrom<oidc_code::Model> for AuthorizationCode {
    type Error = IssuerError;

    fn try_from(model: oidc_code::Model) -> Result<Self, Self::Error> {
        let code_challenge_method = model
            .code_challenge_method
            .as_deref()
            .map(str::parse)
            .transpose()?;
        Ok(Self {
            scope: split_scope(&model.scope),
            code: model.code,
            client_id: model.client_id,
            user_id: model.user_id,
            nonce: model.nonce,
            is_authentication: model.is_authentication,
            code_challenge: model.code_challenge,
            code_challenge_method,
            expires_at: model.expires_at,
            created_at: model.created_at,
        })
    }
}

/// An access/refresh token pair.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub id: String,
    pub client_id: String,
    pub user_id: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    pub scope: Vec<String>,
    /// Decoded ID token claims, if an ID token was issued with this pair.
    pub id_token: Option<serde_json::Value>,
    pub access_expires_at: OffsetDateTime,
    pub issued_at: OffsetDateTime,
}

impl Token {
    pub fn access_has_expired(&self) -> bool {
        self.access_has_expired_at(OffsetDateTime::now_utc())
    }

    pub fn access_has_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.access_expires_at
    }

    pub fn at_hash(&self) -> String {
        at_hash(&self.access_token)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.iter().any(|s| s == scope)
    }
}

impl TryFrom<oidc_token::Model> for Token {
    type Error = IssuerError;

    fn try_from(model: oidc_token::Model) -> Result<Self, Self::Error> {
        let id_token = if model.id_token.is_empty() {
            None
        } else {
            Some(serde_json::from_str(&model.id_token)?)
        };
        Ok(Self {
            scope: split_scope(&model.scope),
            id: model.id,
            client_id: model.client_id,
            user_id: model.user_id,
            access_token: model.access_token,
            refresh_token: model.refresh_token,
            id_token,
            access_expires_at: model.access_expires_at,
            issued_at: model.issued_at,
        })
    }
}

/// The `at_hash` ID token claim: left half of the SHA-256 digest of the access
/// token, base64url without padding. Only 256-bit digests are supported.
pub fn at_hash(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

/// `now + lifetime`, or a `Validation` error when that is not representable.
pub fn expires_after(now: OffsetDateTime, lifetime: time::Duration) -> Result<OffsetDateTime, IssuerError> {
    now.checked_add(lifetime).ok_or_else(|| {
        IssuerError::Validation(format!(
            "lifetime of {} seconds is out of range",
            lifetime.whole_seconds()
        ))
    })
}

/// A freshly minted token together with its encoded ID token, if any.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub token: Token,
    pub id_token: Option<String>,
}

impl IssuedToken {
    /// Seconds until the access token expires, as reported in `expires_in`.
    pub fn expires_in(&self) -> i64 {
        (self.token.access_expires_at - OffsetDateTime::now_utc())
            .whole_seconds()
            .max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_with_challenge(challenge: Option<&str>, method: Option<CodeChallengeMethod>) -> AuthorizationCode {
        let now = OffsetDateTime::now_utc();
        AuthorizationCode {
            code: "c".into(),
            client_id: "client".into(),
            user_id: "user".into(),
            scope: vec!["openid".into()],
            nonce: None,
            is_authentication: true,
            code_challenge: challenge.map(String::from),
            code_challenge_method: method,
            expires_at: now + time::Duration::minutes(10),
            created_at: now,
        }
    }

    #[test]
    fn at_hash_is_half_digest_unpadded() {
        let hash = at_hash("jHkWEdUXMU1BwAsC4vtUsZwnNvTIxEl0z9K3vx5KF0Y");
        assert!(!hash.contains('='));
        let decoded = URL_SAFE_NO_PAD.decode(&hash).unwrap();
        assert_eq!(decoded.len(), 16);
        assert_eq!(hash, at_hash("jHkWEdUXMU1BwAsC4vtUsZwnNvTIxEl0z9K3vx5KF0Y"));
    }

    #[test]
    fn at_hash_matches_left_half_of_sha256() {
        let digest = Sha256::digest(b"access-token");
        assert_eq!(at_hash("access-token"), URL_SAFE_NO_PAD.encode(&digest[..16]));
    }

    #[test]
    fn pkce_s256() {
        // RFC 7636 appendix B
        let code = code_with_challenge(
            Some("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"),
            Some(CodeChallengeMethod::S256),
        );
        assert!(code.verify_pkce(Some("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk")));
        assert!(!code.verify_pkce(Some("wrong")));
        assert!(!code.verify_pkce(None));
    }

    #[test]
    fn pkce_plain_and_absent() {
        let plain = code_with_challenge(Some("verifier"), Some(CodeChallengeMethod::Plain));
        assert!(plain.verify_pkce(Some("verifier")));
        assert!(!plain.verify_pkce(Some("other")));

        let none = code_with_challenge(None, None);
        assert!(none.verify_pkce(None));
        assert!(none.verify_pkce(Some("anything")));
    }

    #[test]
    fn expiry_is_inclusive() {
        let code = code_with_challenge(None, None);
        assert!(!code.has_expired_at(code.expires_at - time::Duration::seconds(1)));
        assert!(code.has_expired_at(code.expires_at));
    }

    #[test]
    fn unknown_challenge_method_rejected() {
        assert!(matches!(
            "S512".parse::<CodeChallengeMethod>(),
            Err(IssuerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn expiry_overflow_is_an_error() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            expires_after(now, time::Duration::minutes(1)).unwrap(),
            now + time::Duration::minutes(1)
        );
        assert!(matches!(
            expires_after(now, time::Duration::seconds(i64::MAX / 2)),
            Err(IssuerError::Validation(_))
        ));
    }
}
