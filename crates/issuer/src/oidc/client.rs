//! Registered relying parties.
//!
//! [`ClientRegistry`] is a read-only projection over the `oidc_client` table.
//! Creating and editing clients belongs to the administrative layer; the
//! conversion into an [`oidc_client::ActiveModel`] is provided for it and
//! validates the registration on the way in.

use crate::entity::{join_lines, join_scope, oidc_client, split_lines, split_scope};
use crate::error::IssuerError;
use crate::oidc::redirect::is_allowed_redirect_uri;
use sea_orm::{ActiveValue::Set, DatabaseConnection, EntityTrait};
use std::str::FromStr;
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientType {
    Confidential,
    Public,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Confidential => "confidential",
            ClientType::Public => "public",
        }
    }
}

impl FromStr for ClientType {
    type Err = IssuerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confidential" => Ok(ClientType::Confidential),
            "public" => Ok(ClientType::Public),
            other => Err(IssuerError::Validation(format!("unknown client type '{other}'"))),
        }
    }
}

/// Algorithm used to sign ID tokens for a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JwtAlg {
    HS256,
    RS256,
}

impl JwtAlg {
    pub fn as_str(&self) -> &'static str {
        match self {
            JwtAlg::HS256 => "HS256",
            JwtAlg::RS256 => "RS256",
        }
    }
}

impl FromStr for JwtAlg {
    type Err = IssuerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HS256" => Ok(JwtAlg::HS256),
            "RS256" => Ok(JwtAlg::RS256),
            other => Err(IssuerError::Validation(format!("unsupported JWT algorithm '{other}'"))),
        }
    }
}

/// A registered relying party.
#[derive(Clone, Debug, PartialEq)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub secret: Option<String>,
    pub client_type: ClientType,
    /// Ordered, the first entry is the default.
    pub redirect_uris: Vec<String>,
    pub post_logout_redirect_uris: Vec<String>,
    pub response_types: Vec<String>,
    pub scope: Vec<String>,
    pub jwt_alg: JwtAlg,
    pub require_consent: bool,
    pub reuse_consent: bool,
    pub require_pkce: bool,
    pub created_at: OffsetDateTime,
}

impl Client {
    /// A client with the same defaults the admin layer applies: confidential,
    /// RS256, consent required and reused, PKCE required for public clients.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            secret: None,
            client_type: ClientType::Confidential,
            redirect_uris: Vec::new(),
            post_logout_redirect_uris: Vec::new(),
            response_types: vec!["code".to_string()],
            scope: Vec::new(),
            jwt_alg: JwtAlg::RS256,
            require_consent: true,
            reuse_consent: true,
            require_pkce: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// First configured redirect URI, or an empty string when none is
    /// configured. Callers must treat empty as "no valid default".
    pub fn default_redirect_uri(&self) -> &str {
        self.redirect_uris.first().map(String::as_str).unwrap_or("")
    }

    pub fn is_allowed_redirect_uri(&self, redirect_uri: &str) -> bool {
        is_allowed_redirect_uri(&self.redirect_uris, redirect_uri)
    }

    pub fn is_allowed_post_logout_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.post_logout_redirect_uris
            .iter()
            .any(|uri| uri == redirect_uri)
    }

    pub fn is_response_type_allowed(&self, response_type: &str) -> bool {
        self.response_types.iter().any(|r| r == response_type)
    }

    pub fn is_confidential(&self) -> bool {
        self.client_type == ClientType::Confidential
    }

    /// Check a presented secret. Public clients have nothing to verify and
    /// always fail; confidential clients without a stored secret fail too.
    pub fn verify_secret(&self, provided: &str) -> bool {
        if !self.is_confidential() {
            return false;
        }
        match &self.secret {
            Some(stored) if !stored.is_empty() => {
                let (a, b) = (stored.as_bytes(), provided.as_bytes());
                a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
            }
            _ => false,
        }
    }

    /// Reject registrations the matcher cannot work with.
    pub fn validate(&self) -> Result<(), IssuerError> {
        if self.id.trim().is_empty() {
            return Err(IssuerError::Validation("client id must not be empty".into()));
        }
        for uri in self.redirect_uris.iter().chain(&self.post_logout_redirect_uris) {
            if uri.trim().is_empty() || uri.contains(['\n', '\r']) {
                return Err(IssuerError::Validation(format!(
                    "malformed redirect URI registration for client '{}': {uri:?}",
                    self.id
                )));
            }
        }
        for response_type in &self.response_types {
            if response_type.trim().is_empty() || response_type.contains(['\n', '\r']) {
                return Err(IssuerError::Validation(format!(
                    "malformed response type for client '{}'",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

impl TryFrom<oidc_client::Model> for Client {
    type Error = IssuerError;

    fn try_from(model: oidc_client::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            client_type: model.client_type.parse()?,
            jwt_alg: model.jwt_alg.parse()?,
            redirect_uris: split_lines(&model.redirect_uris),
            post_logout_redirect_uris: split_lines(&model.post_logout_redirect_uris),
            response_types: split_lines(&model.response_types),
            scope: split_scope(&model.scopes),
            id: model.id,
            name: model.name,
            secret: model.secret.filter(|s| !s.is_empty()),
            require_consent: model.require_consent,
            reuse_consent: model.reuse_consent,
            require_pkce: model.require_pkce,
            created_at: model.created_at,
        })
    }
}

impl TryFrom<&Client> for oidc_client::ActiveModel {
    type Error = IssuerError;

    fn try_from(client: &Client) -> Result<Self, Self::Error> {
        client.validate()?;
        Ok(Self {
            id: Set(client.id.clone()),
            secret: Set(client.secret.clone()),
            name: Set(client.name.clone()),
            client_type: Set(client.client_type.as_str().to_string()),
            redirect_uris: Set(join_lines(&client.redirect_uris)),
            post_logout_redirect_uris: Set(join_lines(&client.post_logout_redirect_uris)),
            response_types: Set(join_lines(&client.response_types)),
            scopes: Set(join_scope(&client.scope)),
            jwt_alg: Set(client.jwt_alg.as_str().to_string()),
            require_consent: Set(client.require_consent),
            reuse_consent: Set(client.reuse_consent),
            require_pkce: Set(client.require_pkce),
            created_at: Set(client.created_at),
        })
    }
}

/// Read-only lookup of registered clients.
#[derive(Clone)]
pub struct ClientRegistry {
    db: Arc<DatabaseConnection>,
}

impl ClientRegistry {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[tracing::instrument(skip(self))]
    pub async fn find(&self, client_id: &str) -> Result<Option<Client>, IssuerError> {
        oidc_client::Entity::find_by_id(client_id)
            .one(self.db.as_ref())
            .await?
            .map(Client::try_from)
            .transpose()
    }

    /// Like [`find`](Self::find) but an unknown client is an `InvalidClient` error.
    pub async fn get(&self, client_id: &str) -> Result<Client, IssuerError> {
        self.find(client_id)
            .await?
            .ok_or_else(|| IssuerError::InvalidClient(format!("unknown client '{client_id}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_uris(uris: &[&str]) -> Client {
        let mut client = Client::new("test-client", "Test Client");
        client.redirect_uris = uris.iter().map(|s| s.to_string()).collect();
        client
    }

    #[test]
    fn default_redirect_uri_is_first_entry() {
        let client = client_with_uris(&["https://a.example/cb", "https://b.example/cb"]);
        assert_eq!(client.default_redirect_uri(), "https://a.example/cb");
    }

    #[test]
    fn default_redirect_uri_empty_without_registration() {
        assert_eq!(client_with_uris(&[]).default_redirect_uri(), "");
    }

    #[test]
    fn model_roundtrip_splits_delimited_fields() {
        let model = oidc_client::Model {
            id: "c1".into(),
            secret: Some("s3cret".into()),
            name: "Client One".into(),
            client_type: "confidential".into(),
            redirect_uris: "https://a.example/cb\nhttp://127.0.0.1/cb".into(),
            post_logout_redirect_uris: String::new(),
            response_types: "code\ncode id_token".into(),
            scopes: "openid email".into(),
            jwt_alg: "HS256".into(),
            require_consent: true,
            reuse_consent: false,
            require_pkce: true,
            created_at: OffsetDateTime::now_utc(),
        };
        let client = Client::try_from(model).unwrap();
        assert_eq!(client.redirect_uris.len(), 2);
        assert!(client.post_logout_redirect_uris.is_empty());
        assert_eq!(client.response_types, vec!["code", "code id_token"]);
        assert_eq!(client.scope, vec!["openid", "email"]);
        assert_eq!(client.jwt_alg, JwtAlg::HS256);
        assert!(client.is_response_type_allowed("code id_token"));
        assert!(!client.is_response_type_allowed("id_token"));
    }

    #[test]
    fn unknown_algorithm_is_validation_error() {
        assert!(matches!(
            "ES512".parse::<JwtAlg>(),
            Err(IssuerError::Validation(_))
        ));
    }

    #[test]
    fn multiline_redirect_uri_rejected() {
        let client = client_with_uris(&["https://a.example/cb\nhttps://evil.example"]);
        assert!(matches!(client.validate(), Err(IssuerError::Validation(_))));
        assert!(oidc_client::ActiveModel::try_from(&client).is_err());
    }

    #[test]
    fn blank_redirect_uri_rejected() {
        assert!(client_with_uris(&["  "]).validate().is_err());
    }

    #[test]
    fn secret_verification() {
        let mut client = client_with_uris(&["https://a.example/cb"]);
        client.secret = Some("secret123".into());
        assert!(client.verify_secret("secret123"));
        assert!(!client.verify_secret("secret124"));
        assert!(!client.verify_secret(""));

        client.client_type = ClientType::Public;
        assert!(!client.verify_secret("secret123"));
    }

    #[test]
    fn post_logout_uris_match_exactly() {
        let mut client = client_with_uris(&[]);
        client.post_logout_redirect_uris = vec!["http://127.0.0.1/bye".into()];
        assert!(client.is_allowed_post_logout_redirect_uri("http://127.0.0.1/bye"));
        assert!(!client.is_allowed_post_logout_redirect_uri("http://127.0.0.1:5000/bye"));
    }
}
