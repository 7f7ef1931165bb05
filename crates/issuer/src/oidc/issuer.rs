//! Authorization codes, access/refresh tokens and ID tokens.
//!
//! Codes are single use: redeeming one is a conditional delete, and only the
//! caller whose delete removed the row gets tokens. Refresh works the same way
//! on the old token pair. Concurrent redemptions of one code therefore yield
//! at most one token.

use crate::config::LifetimeConfig;
use crate::entity::{join_scope, oidc_code, oidc_token};
use crate::error::IssuerError;
use crate::oidc::client::{Client, ClientType};
use crate::oidc::events::{EventBus, GrantType, IssuerEvent};
use crate::oidc::id_token::{IdTokenClaims, IdTokenSigner, IdTokenSubject};
use crate::oidc::policy::{RefreshContext, RefreshPolicy};
use crate::oidc::token::{
    AuthorizationCode, CodeChallengeMethod, IssuedToken, Token, expires_after,
};
use base64::Engine;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use time::OffsetDateTime;

/// Generate a secure random token (32 bytes, base64url).
pub fn generate_token() -> Result<String, IssuerError> {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes)
        .map_err(|e| IssuerError::Io(std::io::Error::other(e.to_string())))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Parameters of an approved authorization request.
#[derive(Clone, Debug)]
pub struct CodeRequest<'a> {
    pub client: &'a Client,
    pub user_id: &'a str,
    pub scope: Vec<String>,
    pub nonce: Option<String>,
    pub is_authentication: bool,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

#[derive(Clone)]
pub struct CredentialIssuer {
    db: Arc<DatabaseConnection>,
    lifetimes: LifetimeConfig,
    signer: IdTokenSigner,
    refresh_policy: Arc<dyn RefreshPolicy>,
    events: EventBus,
}

impl CredentialIssuer {
    pub fn new(
        db: Arc<DatabaseConnection>,
        lifetimes: LifetimeConfig,
        signer: IdTokenSigner,
        refresh_policy: Arc<dyn RefreshPolicy>,
        events: EventBus,
    ) -> Self {
        Self {
            db,
            lifetimes,
            signer,
            refresh_policy,
            events,
        }
    }

    pub fn signer(&self) -> &IdTokenSigner {
        &self.signer
    }

    pub fn refresh_policy(&self) -> &Arc<dyn RefreshPolicy> {
        &self.refresh_policy
    }

    /// Persist a new authorization code and announce it.
    #[tracing::instrument(skip(self, request), fields(client_id = %request.client.id, user_id = %request.user_id))]
    pub async fn create_code(&self, request: CodeRequest<'_>) -> Result<AuthorizationCode, IssuerError> {
        let client = request.client;
        let method = match (&request.code_challenge, request.code_challenge_method.as_deref()) {
            (None, _) => {
                if client.client_type == ClientType::Public && client.require_pkce {
                    return Err(IssuerError::InvalidRequest(
                        "code_challenge is required for this client".into(),
                    ));
                }
                None
            }
            // RFC 7636: a challenge without a method is "plain".
            (Some(_), None) => Some(CodeChallengeMethod::Plain),
            (Some(_), Some(method)) => Some(method.parse::<CodeChallengeMethod>()?),
        };

        let now = OffsetDateTime::now_utc();
        let code = AuthorizationCode {
            code: generate_token()?,
            client_id: client.id.clone(),
            user_id: request.user_id.to_string(),
            scope: request.scope,
            nonce: request.nonce,
            is_authentication: request.is_authentication,
            code_challenge: request.code_challenge,
            code_challenge_method: method,
            expires_at: expires_after(now, self.lifetimes.code())?,
            created_at: now,
        };

        oidc_code::ActiveModel {
            code: Set(code.code.clone()),
            client_id: Set(code.client_id.clone()),
            user_id: Set(code.user_id.clone()),
            scope: Set(join_scope(&code.scope)),
            nonce: Set(code.nonce.clone()),
            is_authentication: Set(code.is_authentication),
            code_challenge: Set(code.code_challenge.clone()),
            code_challenge_method: Set(method.map(|m| m.as_str().to_string())),
            expires_at: Set(code.expires_at),
            created_at: Set(code.created_at),
        }
        .insert(self.db.as_ref())
        .await?;

        tracing::info!("Authorization code created");
        self.events.publish(IssuerEvent::CodeCreated {
            code: code.code.clone(),
            user_id: code.user_id.clone(),
            client_id: code.client_id.clone(),
        });
        Ok(code)
    }

    /// Exchange a code for a token pair, plus an ID token for authentication
    /// requests. Fails with `InvalidGrant` if the code is unknown, expired,
    /// bound to another client, fails PKCE, or was redeemed concurrently.
    ///
    /// Missing signing material is reported before the code is consumed, so
    /// the code stays redeemable once the key store is fixed. Failures after
    /// that point (database, encoding) leave the code spent.
    #[tracing::instrument(skip(self, client, code, code_verifier), fields(client_id = %client.id))]
    pub async fn redeem_code(
        &self,
        client: &Client,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<IssuedToken, IssuerError> {
        let stored: AuthorizationCode = oidc_code::Entity::find_by_id(code)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| IssuerError::invalid_grant("authorization code not found"))?
            .try_into()?;

        if stored.has_expired() {
            oidc_code::Entity::delete_by_id(code)
                .exec(self.db.as_ref())
                .await?;
            return Err(IssuerError::invalid_grant("authorization code expired"));
        }
        if stored.client_id != client.id {
            return Err(IssuerError::invalid_grant("authorization code was issued to another client"));
        }
        if !stored.verify_pkce(code_verifier) {
            return Err(IssuerError::invalid_grant("PKCE verification failed"));
        }
        if stored.is_authentication {
            self.signer.ensure_can_sign(client).await?;
        }

        // Whoever deletes the row owns the redemption.
        let deleted = oidc_code::Entity::delete_many()
            .filter(oidc_code::Column::Code.eq(code))
            .exec(self.db.as_ref())
            .await?;
        if deleted.rows_affected == 0 {
            tracing::warn!("Authorization code redeemed concurrently");
            return Err(IssuerError::invalid_grant("authorization code already used"));
        }

        let subject = stored.is_authentication.then(|| IdTokenSubject {
            user_id: &stored.user_id,
            nonce: stored.nonce.as_deref(),
            auth_time: stored.created_at,
        });
        let issued = self
            .mint(client, Some(&stored.user_id), &stored.scope, subject)
            .await?;

        tracing::info!(token_id = %issued.token.id, "Code redeemed for token");
        self.events.publish(IssuerEvent::TokenCreated {
            token_id: issued.token.id.clone(),
            grant_type: GrantType::AuthorizationCode,
            user_id: issued.token.user_id.clone(),
            client_id: client.id.clone(),
            code: Some(stored.code),
            refresh_token: None,
        });
        Ok(issued)
    }

    /// Rotate a refresh token. The old pair is consumed; the new pair carries
    /// `scope` (or the old scope when empty), which must be a subset of the
    /// old scope.
    #[tracing::instrument(skip(self, client, refresh_token), fields(client_id = %client.id))]
    pub async fn refresh(
        &self,
        client: &Client,
        refresh_token: &str,
        scope: &[String],
    ) -> Result<IssuedToken, IssuerError> {
        let token = self
            .find_by_refresh_token(refresh_token)
            .await?
            .ok_or_else(|| IssuerError::invalid_grant("refresh token not found"))?;

        if token.client_id != client.id {
            return Err(IssuerError::invalid_grant("refresh token was issued to another client"));
        }
        if !self.refresh_is_alive(&token).await? {
            return Err(IssuerError::invalid_grant("refresh token is no longer valid"));
        }

        let scope: Vec<String> = if scope.is_empty() {
            token.scope.clone()
        } else {
            if let Some(extra) = scope.iter().find(|s| !token.has_scope(s)) {
                return Err(IssuerError::InvalidScope(format!(
                    "scope '{extra}' was not granted to the original token"
                )));
            }
            scope.to_vec()
        };

        let previous_claims = token
            .id_token
            .clone()
            .map(serde_json::from_value::<IdTokenClaims>)
            .transpose()?;
        if previous_claims.is_some() {
            self.signer.ensure_can_sign(client).await?;
        }

        let deleted = oidc_token::Entity::delete_many()
            .filter(oidc_token::Column::Id.eq(&token.id))
            .filter(oidc_token::Column::RefreshToken.eq(refresh_token))
            .exec(self.db.as_ref())
            .await?;
        if deleted.rows_affected == 0 {
            tracing::warn!("Refresh token used concurrently");
            return Err(IssuerError::invalid_grant("refresh token already used"));
        }

        let subject = match (&previous_claims, token.user_id.as_deref()) {
            (Some(claims), Some(user_id)) => Some(IdTokenSubject {
                user_id,
                nonce: claims.nonce.as_deref(),
                auth_time: OffsetDateTime::from_unix_timestamp(claims.auth_time)
                    .unwrap_or(token.issued_at),
            }),
            _ => None,
        };
        let issued = self
            .mint(client, token.user_id.as_deref(), &scope, subject)
            .await?;

        tracing::info!(token_id = %issued.token.id, "Refresh token rotated");
        self.events.publish(IssuerEvent::TokenCreated {
            token_id: issued.token.id.clone(),
            grant_type: GrantType::RefreshToken,
            user_id: issued.token.user_id.clone(),
            client_id: client.id.clone(),
            code: None,
            refresh_token: Some(refresh_token.to_string()),
        });
        Ok(issued)
    }

    /// Look up a live access token.
    pub async fn validate_access_token(&self, access_token: &str) -> Result<Token, IssuerError> {
        let token: Token = oidc_token::Entity::find()
            .filter(oidc_token::Column::AccessToken.eq(access_token))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| IssuerError::invalid_grant("access token not found"))?
            .try_into()?;
        if token.access_has_expired() {
            return Err(IssuerError::invalid_grant("access token expired"));
        }
        Ok(token)
    }

    /// Ask the refresh policy whether `token` may still be refreshed. A
    /// negative answer deletes the token.
    pub async fn refresh_is_alive(&self, token: &Token) -> Result<bool, IssuerError> {
        let ctx = RefreshContext {
            issued_at: token.issued_at,
            user_id: token.user_id.as_deref(),
            id_token: token.id_token.as_ref(),
            access_has_expired: token.access_has_expired(),
        };
        if self.refresh_policy.is_alive(&ctx) {
            return Ok(true);
        }
        tracing::info!(token_id = %token.id, "Refresh policy rejected token, deleting");
        oidc_token::Entity::delete_by_id(token.id.as_str())
            .exec(self.db.as_ref())
            .await?;
        Ok(false)
    }

    /// Delete the pair an access or refresh token belongs to. Returns whether
    /// anything was deleted; unknown tokens are not an error.
    pub async fn revoke(&self, token: &str) -> Result<bool, IssuerError> {
        let deleted = oidc_token::Entity::delete_many()
            .filter(
                oidc_token::Column::AccessToken
                    .eq(token)
                    .or(oidc_token::Column::RefreshToken.eq(token)),
            )
            .exec(self.db.as_ref())
            .await?;
        if deleted.rows_affected > 0 {
            tracing::info!("Token revoked");
        }
        Ok(deleted.rows_affected > 0)
    }

    async fn find_by_refresh_token(&self, refresh_token: &str) -> Result<Option<Token>, IssuerError> {
        oidc_token::Entity::find()
            .filter(oidc_token::Column::RefreshToken.eq(refresh_token))
            .one(self.db.as_ref())
            .await?
            .map(Token::try_from)
            .transpose()
    }

    async fn mint(
        &self,
        client: &Client,
        user_id: Option<&str>,
        scope: &[String],
        subject: Option<IdTokenSubject<'_>>,
    ) -> Result<IssuedToken, IssuerError> {
        let now = OffsetDateTime::now_utc();
        let access_token = generate_token()?;

        let (claims, encoded) = match subject {
            Some(subject) => {
                let claims = self.signer.claims(client, &subject, &access_token, now)?;
                let encoded = self.signer.sign(client, &claims).await?;
                (Some(serde_json::to_value(&claims)?), Some(encoded))
            }
            None => (None, None),
        };

        let token = Token {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: client.id.clone(),
            user_id: user_id.map(String::from),
            access_token,
            refresh_token: generate_token()?,
            scope: scope.to_vec(),
            id_token: claims,
            access_expires_at: expires_after(now, self.lifetimes.access_token())?,
            issued_at: now,
        };

        oidc_token::ActiveModel {
            id: Set(token.id.clone()),
            access_token: Set(token.access_token.clone()),
            refresh_token: Set(token.refresh_token.clone()),
            client_id: Set(token.client_id.clone()),
            user_id: Set(token.user_id.clone()),
            scope: Set(join_scope(&token.scope)),
            id_token: Set(match &token.id_token {
                Some(claims) => serde_json::to_string(claims)?,
                None => String::new(),
            }),
            access_expires_at: Set(token.access_expires_at),
            issued_at: Set(token.issued_at),
        }
        .insert(self.db.as_ref())
        .await?;

        Ok(IssuedToken {
            token,
            id_token: encoded,
        })
    }
}
