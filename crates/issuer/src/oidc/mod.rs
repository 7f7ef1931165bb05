//! OpenID Connect issuance core.
//!
//! - [`redirect`]: redirect URI matching, including loopback port leniency
//! - [`client`]: registered relying parties
//! - [`consent`]: per-user, per-client consent
//! - [`issuer`]: codes, token pairs and ID tokens
//! - [`policy`]: refresh-token liveness hooks
//! - [`events`]: notifications for consent and issuance

pub mod client;
pub mod consent;
pub mod events;
pub mod id_token;
pub mod issuer;
pub mod policy;
pub mod redirect;
mod state;
pub mod token;

pub use client::{Client, ClientRegistry, ClientType, JwtAlg};
pub use consent::{ConsentLedger, UserConsent};
pub use events::{EventBus, GrantType, IssuerEvent};
pub use id_token::{IdTokenClaims, IdTokenSigner};
pub use issuer::{CodeRequest, CredentialIssuer, generate_token};
pub use policy::{AlwaysAlive, MaxAge, RefreshContext, RefreshPolicy};
pub use state::IssuerState;
pub use token::{AuthorizationCode, CodeChallengeMethod, IssuedToken, Token};
