//! ID token claims and signing.

use crate::error::IssuerError;
use crate::keys::{KeyStore, SigningKey, active_signing_key};
use crate::oidc::client::{Client, JwtAlg};
use crate::oidc::token::{at_hash, expires_after};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub auth_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
}

/// Who the ID token is about and how they authenticated.
#[derive(Clone, Debug)]
pub struct IdTokenSubject<'a> {
    pub user_id: &'a str,
    pub nonce: Option<&'a str>,
    pub auth_time: OffsetDateTime,
}

#[derive(Clone)]
pub struct IdTokenSigner {
    issuer: String,
    lifetime: time::Duration,
    key_store: Arc<dyn KeyStore>,
}

impl IdTokenSigner {
    pub fn new(issuer: impl Into<String>, lifetime: time::Duration, key_store: Arc<dyn KeyStore>) -> Self {
        Self {
            issuer: issuer.into(),
            lifetime,
            key_store,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn key_store(&self) -> &Arc<dyn KeyStore> {
        &self.key_store
    }

    /// Claims for an ID token issued alongside `access_token`.
    pub fn claims(
        &self,
        client: &Client,
        subject: &IdTokenSubject<'_>,
        access_token: &str,
        now: OffsetDateTime,
    ) -> Result<IdTokenClaims, IssuerError> {
        Ok(IdTokenClaims {
            iss: self.issuer.clone(),
            sub: subject.user_id.to_string(),
            aud: client.id.clone(),
            exp: expires_after(now, self.lifetime)?.unix_timestamp(),
            iat: now.unix_timestamp(),
            auth_time: subject.auth_time.unix_timestamp(),
            nonce: subject.nonce.map(String::from),
            at_hash: Some(at_hash(access_token)),
        })
    }

    /// Fail the way [`sign`](Self::sign) would if the client's algorithm has
    /// no usable key material, without signing anything.
    pub async fn ensure_can_sign(&self, client: &Client) -> Result<(), IssuerError> {
        match client.jwt_alg {
            JwtAlg::HS256 => hs256_secret(client).map(|_| ()),
            JwtAlg::RS256 => self.rs256_key().await.map(|_| ()),
        }
    }

    async fn rs256_key(&self) -> Result<SigningKey, IssuerError> {
        active_signing_key(self.key_store.as_ref())
            .await?
            .ok_or_else(|| {
                IssuerError::MisconfiguredStorage(
                    "no RSA signing key available for RS256 ID tokens".into(),
                )
            })
    }

    /// Encode `claims` as a compact JWS using the client's algorithm.
    ///
    /// HS256 signs with the client secret. RS256 signs with the active key
    /// from the key store, read fresh for every token; its `kid` goes into the
    /// header.
    pub async fn sign(&self, client: &Client, claims: &IdTokenClaims) -> Result<String, IssuerError> {
        match client.jwt_alg {
            JwtAlg::HS256 => {
                let secret = hs256_secret(client)?;
                let header = Header::new(Algorithm::HS256);
                Ok(jsonwebtoken::encode(
                    &header,
                    claims,
                    &EncodingKey::from_secret(secret.as_bytes()),
                )?)
            }
            JwtAlg::RS256 => {
                let key = self.rs256_key().await?;
                let der = key
                    .rsa_private_key()?
                    .to_pkcs1_der()
                    .map_err(|e| IssuerError::Validation(format!("cannot encode signing key: {e}")))?;

                let mut header = Header::new(Algorithm::RS256);
                header.kid = Some(key.kid.clone());
                tracing::debug!(kid = %key.kid, client_id = %client.id, "Signing ID token");
                Ok(jsonwebtoken::encode(
                    &header,
                    claims,
                    &EncodingKey::from_rsa_der(der.as_bytes()),
                )?)
            }
        }
    }
}

fn hs256_secret(client: &Client) -> Result<&str, IssuerError> {
    client.secret.as_deref().ok_or_else(|| {
        IssuerError::Validation(format!(
            "client '{}' uses HS256 but has no secret",
            client.id
        ))
    })
}
