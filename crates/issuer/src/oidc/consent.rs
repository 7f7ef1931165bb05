//! User consent ledger.
//!
//! At most one consent row exists per (user, client). Recording consent again
//! replaces the scope and pushes the expiry out; expired rows are ignored on
//! read and reclaimed by the sweep.

use crate::entity::{join_scope, oidc_user_consent, split_scope};
use crate::error::IssuerError;
use crate::oidc::client::Client;
use crate::oidc::events::{EventBus, IssuerEvent};
use crate::oidc::token::expires_after;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq)]
pub struct UserConsent {
    pub id: String,
    pub user_id: String,
    pub client_id: String,
    pub scope: Vec<String>,
    pub date_given: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl UserConsent {
    pub fn has_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }

    /// True when every requested scope was consented to.
    pub fn covers(&self, scope: &[String]) -> bool {
        scope.iter().all(|s| self.scope.contains(s))
    }
}

impl From<oidc_user_consent::Model> for UserConsent {
    fn from(model: oidc_user_consent::Model) -> Self {
        Self {
            scope: split_scope(&model.scope),
            id: model.id,
            user_id: model.user_id,
            client_id: model.client_id,
            date_given: model.date_given,
            expires_at: model.expires_at,
        }
    }
}

#[derive(Clone)]
pub struct ConsentLedger {
    db: Arc<DatabaseConnection>,
    lifetime: time::Duration,
    events: EventBus,
}

impl ConsentLedger {
    pub fn new(db: Arc<DatabaseConnection>, lifetime: time::Duration, events: EventBus) -> Self {
        Self {
            db,
            lifetime,
            events,
        }
    }

    /// The stored consent, expired or not.
    pub async fn find(&self, user_id: &str, client_id: &str) -> Result<Option<UserConsent>, IssuerError> {
        Ok(oidc_user_consent::Entity::find()
            .filter(oidc_user_consent::Column::UserId.eq(user_id))
            .filter(oidc_user_consent::Column::ClientId.eq(client_id))
            .one(self.db.as_ref())
            .await?
            .map(UserConsent::from))
    }

    /// Unexpired consent exists and covers every requested scope.
    pub async fn has_valid_consent(
        &self,
        user_id: &str,
        client_id: &str,
        scope: &[String],
    ) -> Result<bool, IssuerError> {
        Ok(self
            .find(user_id, client_id)
            .await?
            .is_some_and(|consent| !consent.has_expired() && consent.covers(scope)))
    }

    /// Whether the user must be shown a consent prompt for this request.
    pub async fn requires_consent_prompt(
        &self,
        client: &Client,
        user_id: &str,
        scope: &[String],
    ) -> Result<bool, IssuerError> {
        if !client.require_consent {
            return Ok(false);
        }
        if !client.reuse_consent {
            return Ok(true);
        }
        Ok(!self.has_valid_consent(user_id, &client.id, scope).await?)
    }

    /// Store (or replace) the user's consent and announce it.
    #[tracing::instrument(skip(self, scope))]
    pub async fn record_consent(
        &self,
        user_id: &str,
        client_id: &str,
        scope: &[String],
    ) -> Result<UserConsent, IssuerError> {
        let now = OffsetDateTime::now_utc();
        let row = oidc_user_consent::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            user_id: Set(user_id.to_string()),
            client_id: Set(client_id.to_string()),
            scope: Set(join_scope(scope)),
            date_given: Set(now),
            expires_at: Set(expires_after(now, self.lifetime)?),
        };

        oidc_user_consent::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    oidc_user_consent::Column::UserId,
                    oidc_user_consent::Column::ClientId,
                ])
                .update_columns([
                    oidc_user_consent::Column::Scope,
                    oidc_user_consent::Column::DateGiven,
                    oidc_user_consent::Column::ExpiresAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;

        let consent = self.find(user_id, client_id).await?.ok_or_else(|| {
            IssuerError::Database(sea_orm::DbErr::RecordNotFound(
                "consent row missing after upsert".into(),
            ))
        })?;

        tracing::info!("Consent recorded");
        self.events.publish(IssuerEvent::ConsentAccepted {
            user_id: user_id.to_string(),
            client_id: client_id.to_string(),
            scope: scope.to_vec(),
        });
        Ok(consent)
    }

    /// Announce that the user declined. Nothing is stored.
    pub fn decline_consent(&self, user_id: &str, client_id: &str, scope: &[String]) {
        tracing::info!(user_id, client_id, "Consent declined");
        self.events.publish(IssuerEvent::ConsentDeclined {
            user_id: user_id.to_string(),
            client_id: client_id.to_string(),
            scope: scope.to_vec(),
        });
    }

    /// Withdraw consent. Returns whether a row existed.
    pub async fn revoke_consent(&self, user_id: &str, client_id: &str) -> Result<bool, IssuerError> {
        let deleted = oidc_user_consent::Entity::delete_many()
            .filter(oidc_user_consent::Column::UserId.eq(user_id))
            .filter(oidc_user_consent::Column::ClientId.eq(client_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(deleted.rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consent(scope: &[&str], expires_in: time::Duration) -> UserConsent {
        let now = OffsetDateTime::now_utc();
        UserConsent {
            id: "1".into(),
            user_id: "u".into(),
            client_id: "c".into(),
            scope: scope.iter().map(|s| s.to_string()).collect(),
            date_given: now,
            expires_at: now + expires_in,
        }
    }

    #[test]
    fn covers_requires_superset() {
        let c = consent(&["openid", "email"], time::Duration::days(1));
        assert!(c.covers(&["openid".into()]));
        assert!(c.covers(&[]));
        assert!(!c.covers(&["openid".into(), "profile".into()]));
    }

    #[test]
    fn expiry() {
        assert!(consent(&[], time::Duration::seconds(-1)).has_expired());
        assert!(!consent(&[], time::Duration::hours(1)).has_expired());
    }
}
