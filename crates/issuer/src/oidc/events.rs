//! Issuer notifications.
//!
//! Events are published on a broadcast channel owned by whoever builds the
//! issuer. Publishing never waits and never fails: with no subscribers the
//! event is dropped, and a slow subscriber only loses its own backlog.

use tokio::sync::broadcast;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum IssuerEvent {
    ConsentAccepted {
        user_id: String,
        client_id: String,
        scope: Vec<String>,
    },
    ConsentDeclined {
        user_id: String,
        client_id: String,
        scope: Vec<String>,
    },
    CodeCreated {
        code: String,
        user_id: String,
        client_id: String,
    },
    TokenCreated {
        token_id: String,
        grant_type: GrantType,
        user_id: Option<String>,
        client_id: String,
        /// Code redeemed for this token (authorization_code grant).
        code: Option<String>,
        /// Refresh token that was exchanged (refresh_token grant).
        refresh_token: Option<String>,
    },
}

#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<IssuerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IssuerEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: IssuerEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }
}
