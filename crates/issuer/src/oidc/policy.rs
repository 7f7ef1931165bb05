//! Refresh-token liveness hooks.
//!
//! Refresh tokens carry no expiry of their own. Whether one is still usable is
//! decided by a [`RefreshPolicy`], which may look at session state, risk signals
//! or an external revocation service. A policy that answers `false` causes the
//! whole token row to be deleted.

use crate::config::RefreshPolicyConfig;
use std::sync::Arc;
use time::OffsetDateTime;

/// Everything a policy gets to see about the token being refreshed.
#[derive(Clone, Copy, Debug)]
pub struct RefreshContext<'a> {
    pub issued_at: OffsetDateTime,
    pub user_id: Option<&'a str>,
    pub id_token: Option<&'a serde_json::Value>,
    pub access_has_expired: bool,
}

/// Called synchronously. Implementations needing a timeout must enforce it
/// themselves.
pub trait RefreshPolicy: Send + Sync {
    fn is_alive(&self, ctx: &RefreshContext<'_>) -> bool;

    /// True when `is_alive` can never answer `false`. Lets the expiry sweep
    /// skip token rows entirely.
    fn never_expires(&self) -> bool {
        false
    }
}

impl<F> RefreshPolicy for F
where
    F: Fn(&RefreshContext<'_>) -> bool + Send + Sync,
{
    fn is_alive(&self, ctx: &RefreshContext<'_>) -> bool {
        self(ctx)
    }
}

/// Refresh tokens live until revoked.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysAlive;

impl RefreshPolicy for AlwaysAlive {
    fn is_alive(&self, _ctx: &RefreshContext<'_>) -> bool {
        true
    }

    fn never_expires(&self) -> bool {
        true
    }
}

/// Refresh tokens die a fixed time after the pair was issued.
#[derive(Clone, Copy, Debug)]
pub struct MaxAge(pub time::Duration);

impl RefreshPolicy for MaxAge {
    fn is_alive(&self, ctx: &RefreshContext<'_>) -> bool {
        // An end beyond the representable range counts as already dead.
        ctx.issued_at
            .checked_add(self.0)
            .is_some_and(|end| OffsetDateTime::now_utc() < end)
    }
}

pub fn policy_from_config(config: &RefreshPolicyConfig) -> Arc<dyn RefreshPolicy> {
    match config {
        RefreshPolicyConfig::Always => Arc::new(AlwaysAlive),
        RefreshPolicyConfig::MaxAge { seconds } => {
            Arc::new(MaxAge(time::Duration::seconds(*seconds)))
        }
    }
}
