mod common;

use common::*;
use oidc_issuer::IssuerError;
use oidc_issuer::entity::oidc_client;
use oidc_issuer::oidc::{ClientRegistry, ClientType, JwtAlg};

#[tokio::test]
async fn registered_client_round_trips_through_the_registry() {
    let db = test_db().await;
    let mut client = public_client("native-app");
    client.redirect_uris = vec![
        "http://127.0.0.1/callback".into(),
        "com.example.app:/oauth".into(),
    ];
    client.post_logout_redirect_uris = vec!["https://native.example.com/bye".into()];
    client.response_types = vec!["code".into(), "id_token token".into()];
    client.jwt_alg = JwtAlg::HS256;
    insert_client(&db, &client).await;

    let registry = ClientRegistry::new(db.clone());
    let found = registry.get("native-app").await.unwrap();
    assert_eq!(found.client_type, ClientType::Public);
    assert_eq!(found.redirect_uris, client.redirect_uris);
    assert_eq!(found.response_types, client.response_types);
    assert_eq!(found.default_redirect_uri(), "http://127.0.0.1/callback");
    assert!(found.is_response_type_allowed("id_token token"));
    assert!(!found.is_response_type_allowed("token"));

    // Loopback entries accept any port.
    assert!(found.is_allowed_redirect_uri("http://127.0.0.1:53117/callback"));
    assert!(!found.is_allowed_redirect_uri("http://127.0.0.1:53117/other"));
    assert!(found.is_allowed_post_logout_redirect_uri("https://native.example.com/bye"));
    assert!(!found.is_allowed_post_logout_redirect_uri("https://native.example.com/bye/"));
}

#[tokio::test]
async fn unknown_client_is_invalid_client() {
    let db = test_db().await;
    let registry = ClientRegistry::new(db);
    assert!(registry.find("nobody").await.unwrap().is_none());
    let err = registry.get("nobody").await.unwrap_err();
    assert!(matches!(err, IssuerError::InvalidClient(_)));
    assert_eq!(err.oauth_error_code(), "invalid_client");
}

#[test]
fn malformed_registration_is_rejected() {
    let mut client = confidential_client("rp");
    client.redirect_uris.push("https://a.example/cb\nhttps://evil.example/cb".into());
    assert!(matches!(
        oidc_client::ActiveModel::try_from(&client),
        Err(IssuerError::Validation(_))
    ));
}

#[test]
fn secrets_are_checked_for_confidential_clients_only() {
    let confidential = confidential_client("rp");
    assert!(confidential.verify_secret("rp-secret"));
    assert!(!confidential.verify_secret("rp-secret "));

    let public = public_client("spa");
    assert!(!public.verify_secret(""));
}
