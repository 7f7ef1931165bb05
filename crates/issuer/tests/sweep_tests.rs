mod common;

use common::*;
use oidc_issuer::entity::{oidc_code, oidc_token, oidc_user_consent};
use oidc_issuer::oidc::policy::{AlwaysAlive, RefreshContext, RefreshPolicy};
use oidc_issuer::oidc::{CodeRequest, IssuerState};
use oidc_issuer::sweep::{SWEEP_PAGE_SIZE, SweepReport, sweep_expired};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait, PaginatorTrait};
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

async fn issue_pair(state: &IssuerState, user_id: &str) {
    let client = confidential_client("rp");
    let code = state
        .issuer
        .create_code(CodeRequest {
            client: &client,
            user_id,
            scope: scope(&["openid"]),
            nonce: None,
            is_authentication: true,
            code_challenge: None,
            code_challenge_method: None,
        })
        .await
        .unwrap();
    state
        .issuer
        .redeem_code(&client, &code.code, None)
        .await
        .unwrap();
}

async fn seed(state: &IssuerState) {
    issue_pair(state, "user-1").await;
    let client = confidential_client("rp");
    state
        .issuer
        .create_code(CodeRequest {
            client: &client,
            user_id: "user-2",
            scope: scope(&["openid"]),
            nonce: None,
            is_authentication: false,
            code_challenge: None,
            code_challenge_method: None,
        })
        .await
        .unwrap();
    state
        .consent
        .record_consent("user-1", "rp", &scope(&["openid"]))
        .await
        .unwrap();
}

#[tokio::test]
async fn nothing_is_swept_before_expiry() {
    let db = test_db().await;
    let state = test_state(db.clone()).await;
    seed(&state).await;

    let report = sweep_expired(db.as_ref(), &AlwaysAlive, OffsetDateTime::now_utc())
        .await
        .unwrap();
    assert_eq!(report, SweepReport::default());
}

#[tokio::test]
async fn expired_rows_are_swept_and_live_refresh_tokens_kept() {
    let db = test_db().await;
    let state = test_state(db.clone()).await;
    seed(&state).await;

    // Past every code, consent and access token lifetime.
    let later = OffsetDateTime::now_utc() + time::Duration::days(365);
    let report = sweep_expired(db.as_ref(), &AlwaysAlive, later).await.unwrap();
    assert_eq!(report.codes, 1);
    assert_eq!(report.consents, 1);
    assert_eq!(report.tokens, 0);

    assert_eq!(oidc_code::Entity::find().count(db.as_ref()).await.unwrap(), 0);
    assert_eq!(oidc_user_consent::Entity::find().count(db.as_ref()).await.unwrap(), 0);
    assert_eq!(oidc_token::Entity::find().count(db.as_ref()).await.unwrap(), 1);
}

#[tokio::test]
async fn dead_token_pairs_are_swept() {
    let db = test_db().await;
    let state = test_state(db.clone()).await;
    seed(&state).await;

    let later = OffsetDateTime::now_utc() + time::Duration::days(365);
    let never = |_: &RefreshContext<'_>| false;
    let report = sweep_expired(db.as_ref(), &never, later).await.unwrap();
    assert_eq!(report.tokens, 1);
    assert_eq!(oidc_token::Entity::find().count(db.as_ref()).await.unwrap(), 0);
}

async fn insert_expired_token(db: &DatabaseConnection, n: u64) {
    let issued_at = OffsetDateTime::now_utc() - time::Duration::days(2);
    oidc_token::ActiveModel {
        id: Set(format!("token-{n:05}")),
        access_token: Set(format!("access-{n}")),
        refresh_token: Set(format!("refresh-{n}")),
        client_id: Set("rp".into()),
        user_id: Set(Some("user-1".into())),
        scope: Set("openid".into()),
        id_token: Set(String::new()),
        access_expires_at: Set(issued_at + time::Duration::hours(1)),
        issued_at: Set(issued_at),
    }
    .insert(db)
    .await
    .unwrap();
}

#[tokio::test]
async fn dead_tokens_are_swept_across_pages() {
    let db = test_db().await;
    let total = SWEEP_PAGE_SIZE * 2 + 7;
    for n in 0..total {
        insert_expired_token(db.as_ref(), n).await;
    }

    let calls = AtomicU64::new(0);
    // Keep every third token alive.
    let policy = |ctx: &RefreshContext<'_>| {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        assert!(ctx.access_has_expired);
        n % 3 == 0
    };
    let report = sweep_expired(db.as_ref(), &policy, OffsetDateTime::now_utc())
        .await
        .unwrap();

    let kept = total.div_ceil(3);
    assert_eq!(calls.load(Ordering::SeqCst), total);
    assert_eq!(report.tokens, total - kept);
    assert_eq!(oidc_token::Entity::find().count(db.as_ref()).await.unwrap(), kept);
}

struct Immortal;

impl RefreshPolicy for Immortal {
    fn is_alive(&self, _ctx: &RefreshContext<'_>) -> bool {
        panic!("token rows should not be visited")
    }

    fn never_expires(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn never_expiring_policy_skips_token_rows() {
    let db = test_db().await;
    insert_expired_token(db.as_ref(), 1).await;

    let report = sweep_expired(db.as_ref(), &Immortal, OffsetDateTime::now_utc())
        .await
        .unwrap();
    assert_eq!(report.tokens, 0);
    assert_eq!(oidc_token::Entity::find().count(db.as_ref()).await.unwrap(), 1);
}
