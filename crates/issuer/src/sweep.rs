//! Periodic removal of expired codes, consents and dead token pairs.
//!
//! Reads already treat expired rows as absent; the sweep only reclaims space.

use crate::entity::{oidc_code, oidc_token, oidc_user_consent};
use crate::error::IssuerError;
use crate::oidc::IssuerState;
use crate::oidc::policy::{RefreshContext, RefreshPolicy};
use crate::oidc::token::Token;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Token rows loaded per query while sweeping.
pub const SWEEP_PAGE_SIZE: u64 = 256;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub codes: u64,
    pub consents: u64,
    pub tokens: u64,
}

/// Delete expired codes and consents, and token pairs whose access token has
/// expired and whose refresh token the policy no longer considers alive.
#[tracing::instrument(skip(db, refresh_policy))]
pub async fn sweep_expired(
    db: &DatabaseConnection,
    refresh_policy: &dyn RefreshPolicy,
    now: OffsetDateTime,
) -> Result<SweepReport, IssuerError> {
    let codes = oidc_code::Entity::delete_many()
        .filter(oidc_code::Column::ExpiresAt.lte(now))
        .exec(db)
        .await?
        .rows_affected;

    let consents = oidc_user_consent::Entity::delete_many()
        .filter(oidc_user_consent::Column::ExpiresAt.lte(now))
        .exec(db)
        .await?
        .rows_affected;

    let tokens = if refresh_policy.never_expires() {
        0
    } else {
        sweep_dead_tokens(db, refresh_policy, now).await?
    };

    Ok(SweepReport {
        codes,
        consents,
        tokens,
    })
}

/// Walk expired-access rows in id order, one page at a time. Keyset paging
/// keeps deletions from shifting later pages.
async fn sweep_dead_tokens(
    db: &DatabaseConnection,
    refresh_policy: &dyn RefreshPolicy,
    now: OffsetDateTime,
) -> Result<u64, IssuerError> {
    let mut tokens = 0;
    let mut after: Option<String> = None;
    loop {
        let mut query = oidc_token::Entity::find()
            .filter(oidc_token::Column::AccessExpiresAt.lte(now))
            .order_by_asc(oidc_token::Column::Id)
            .limit(SWEEP_PAGE_SIZE);
        if let Some(last) = &after {
            query = query.filter(oidc_token::Column::Id.gt(last.as_str()));
        }
        let page = query.all(db).await?;
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.id.clone());
        let full_page = page.len() as u64 == SWEEP_PAGE_SIZE;

        for model in page {
            let token = match Token::try_from(model) {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable token row");
                    continue;
                }
            };
            let ctx = RefreshContext {
                issued_at: token.issued_at,
                user_id: token.user_id.as_deref(),
                id_token: token.id_token.as_ref(),
                access_has_expired: true,
            };
            if refresh_policy.is_alive(&ctx) {
                continue;
            }
            tokens += oidc_token::Entity::delete_by_id(token.id)
                .exec(db)
                .await?
                .rows_affected;
        }

        if !full_page {
            break;
        }
    }
    Ok(tokens)
}

/// Run [`sweep_expired`] every `every`. A zero interval disables the sweep.
pub fn spawn_expiry_sweep(state: Arc<IssuerState>, every: Duration) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match sweep_expired(
                state.db.as_ref(),
                state.issuer.refresh_policy().as_ref(),
                OffsetDateTime::now_utc(),
            )
            .await
            {
                Ok(report) => tracing::info!(
                    codes = report.codes,
                    consents = report.consents,
                    tokens = report.tokens,
                    "Expiry sweep finished"
                ),
                Err(e) => tracing::warn!(
                    name: "sweep.expired",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    "Expiry sweep failed"
                ),
            }
        }
    }))
}
