use tracing::{info, warn};

use crate::api::ApiGateway;
use crate::db::TokenStore;
use crate::error::ApiError;
use crate::models::{AuthToken, LoginResponse};

/// Owns the auth token and its durable storage.
///
/// Passed by reference to whatever needs the token; there is no
/// process-global copy.
pub struct AuthSession {
    store: Box<dyn TokenStore>,
}

impl AuthSession {
    pub fn new(store: Box<dyn TokenStore>) -> Self {
        Self { store }
    }

    pub async fn authenticate(
        &mut self,
        gateway: &ApiGateway,
        email: &str,
    ) -> Result<LoginResponse, ApiError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(ApiError::AuthenticationRejected("Email is required".to_string()));
        }

        let login = gateway.login(&email).await?;
        self.store.save(&login.access)?;
        info!(token = %login.access, "authenticated");
        Ok(login)
    }

    /// The stored token, if any. Storage failures read as "no token".
    pub fn token(&self) -> Option<AuthToken> {
        match self.store.load() {
            Ok(token) => token,
            Err(e) => {
                warn!("could not read stored token: {}", e);
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn sign_out(&mut self) -> Result<(), ApiError> {
        self.store.clear()
    }

    /// Drops the stored token once the service has refused it, so the
    /// session no longer reports itself as logged in.
    pub fn forget_if_rejected(&mut self, error: &ApiError) {
        if *error != ApiError::AuthenticationRequired || !self.is_authenticated() {
            return;
        }
        match self.sign_out() {
            Ok(()) => info!("stored token refused by the service; cleared"),
            Err(e) => warn!("could not clear refused token: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::RecordingTransport;
    use crate::api::RequestBody;
    use crate::db::Database;
    use serde_json::json;

    fn session() -> AuthSession {
        AuthSession::new(Box::new(Database::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_authenticate_stores_token() {
        let transport = RecordingTransport::new().respond(200, r#"{"access": "t1"}"#);
        let gateway = transport.gateway();
        let mut session = session();
        assert_eq!(session.token(), None);

        let login = session.authenticate(&gateway, "a@b.com").await.unwrap();
        assert_eq!(login.access, AuthToken::new("t1"));
        assert_eq!(session.token(), Some(AuthToken::new("t1")));
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_authenticate_normalizes_email() {
        let transport = RecordingTransport::new().respond(200, r#"{"access": "t1"}"#);
        let gateway = transport.gateway();
        let mut session = session();

        session.authenticate(&gateway, "  Someone@Example.COM ").await.unwrap();
        assert_eq!(
            transport.request(0).body,
            RequestBody::Json(json!({"email": "someone@example.com"}))
        );
    }

    #[tokio::test]
    async fn test_empty_email_rejected_locally() {
        let transport = RecordingTransport::new();
        let gateway = transport.gateway();
        let mut session = session();

        let err = session.authenticate(&gateway, "   ").await.unwrap_err();
        assert_eq!(err, ApiError::AuthenticationRejected("Email is required".into()));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_login_keeps_previous_token() {
        let transport = RecordingTransport::new()
            .respond(200, r#"{"access": "t1"}"#)
            .respond(400, r#"{"error": "Email is required"}"#);
        let gateway = transport.gateway();
        let mut session = session();

        session.authenticate(&gateway, "a@b.com").await.unwrap();
        let err = session.authenticate(&gateway, "b@c.com").await.unwrap_err();
        assert!(matches!(err, ApiError::AuthenticationRejected(_)));
        assert_eq!(session.token(), Some(AuthToken::new("t1")));
    }

    #[tokio::test]
    async fn test_sign_out_clears_token() {
        let transport = RecordingTransport::new().respond(200, r#"{"access": "t1"}"#);
        let gateway = transport.gateway();
        let mut session = session();

        session.authenticate(&gateway, "a@b.com").await.unwrap();
        session.sign_out().unwrap();
        assert_eq!(session.token(), None);
    }

    #[tokio::test]
    async fn test_login_returns_confirmed_email() {
        let transport = RecordingTransport::new()
            .respond(200, r#"{"access": "t1", "email": "a@b.com", "user_id": 7}"#);
        let gateway = transport.gateway();
        let mut session = session();

        let login = session.authenticate(&gateway, "A@B.com").await.unwrap();
        assert_eq!(login.email.as_deref(), Some("a@b.com"));
    }

    #[tokio::test]
    async fn test_refused_token_is_forgotten() {
        let transport = RecordingTransport::new().respond(200, r#"{"access": "t1"}"#);
        let gateway = transport.gateway();
        let mut session = session();
        session.authenticate(&gateway, "a@b.com").await.unwrap();

        session.forget_if_rejected(&ApiError::NetworkFailure("reset".into()));
        assert!(session.is_authenticated());

        session.forget_if_rejected(&ApiError::AuthenticationRequired);
        assert!(!session.is_authenticated());
    }
}
