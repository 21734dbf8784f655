use crate::domain::models::{AuthUser, StoredSession};
use crate::infrastructure::auth_client::{AuthGrant, AuthHttpClient, LoginRequest, RegisterRequest};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum RestoreSessionResult {
    NoSession,
    Verified(StoredSession),
    Offline(StoredSession),
    Rejected,
}

pub struct SessionManager<S, C>
where
    S: CredentialStore + ?Sized,
    C: AuthHttpClient + ?Sized,
{
    credential_store: Arc<S>,
    auth_client: Arc<C>,
    now_provider: NowProvider,
}

impl<S, C> SessionManager<S, C>
where
    S: CredentialStore + ?Sized,
    C: AuthHttpClient + ?Sized,
{
    pub fn new(credential_store: Arc<S>, auth_client: Arc<C>) -> Self {
        Self {
            credential_store,
            auth_client,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<StoredSession, InfraError> {
        let grant = self
            .auth_client
            .login(LoginRequest {
                username: username.trim().to_string(),
                password: password.to_string(),
            })
            .await?;
        self.store_grant(grant)
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<StoredSession, InfraError> {
        let grant = self
            .auth_client
            .register(RegisterRequest {
                username: username.trim().to_string(),
                email: email.trim().to_string(),
                password: password.to_string(),
            })
            .await?;
        self.store_grant(grant)
    }

    pub async fn restore(&self) -> Result<RestoreSessionResult, InfraError> {
        let Some(stored) = self.credential_store.load_session()? else {
            return Ok(RestoreSessionResult::NoSession);
        };

        match self.auth_client.verify(&stored.token).await {
            Ok(user) => {
                let refreshed = StoredSession {
                    token: stored.token,
                    user,
                    saved_at: (self.now_provider)(),
                };
                self.credential_store.save_session(&refreshed)?;
                info!(username = %refreshed.user.username, "restored session");
                Ok(RestoreSessionResult::Verified(refreshed))
            }
            Err(error) if error.is_auth_rejection() => {
                warn!(error = %error, "stored session rejected");
                self.credential_store.delete_session()?;
                Ok(RestoreSessionResult::Rejected)
            }
            Err(error) => {
                warn!(error = %error, "could not verify stored session; starting offline");
                Ok(RestoreSessionResult::Offline(stored))
            }
        }
    }

    pub fn current_session(&self) -> Result<Option<StoredSession>, InfraError> {
        self.credential_store.load_session()
    }

    pub fn current_user(&self) -> Result<Option<AuthUser>, InfraError> {
        Ok(self.current_session()?.map(|session| session.user))
    }

    pub fn logout(&self) -> Result<(), InfraError> {
        self.credential_store.delete_session()
    }

    fn store_grant(&self, grant: AuthGrant) -> Result<StoredSession, InfraError> {
        let session = StoredSession {
            token: grant.token,
            user: grant.user,
            saved_at: (self.now_provider)(),
        };
        self.credential_store.save_session(&session)?;
        info!(username = %session.user.username, "session stored");
        Ok(session)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone)]
    pub(crate) enum FakeAuthResponse {
        Success(AuthGrant),
        Rejected(String),
        Unreachable,
    }

    impl FakeAuthResponse {
        fn into_result(self) -> Result<AuthGrant, InfraError> {
            match self {
                Self::Success(grant) => Ok(grant),
                Self::Rejected(message) => Err(InfraError::Auth(message)),
                Self::Unreachable => Err(InfraError::Transient("connection refused".to_string())),
            }
        }
    }

    pub(crate) fn grant(token: &str, username: &str) -> AuthGrant {
        AuthGrant {
            token: token.to_string(),
            user: AuthUser {
                id: Some(serde_json::json!(1)),
                username: username.to_string(),
                email: None,
            },
        }
    }

    impl Default for FakeAuthResponse {
        fn default() -> Self {
            Self::Success(grant("fake-token", "mei"))
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct FakeAuthHttpClient {
        login_response: Mutex<FakeAuthResponse>,
        register_response: Mutex<FakeAuthResponse>,
        verify_response: Mutex<FakeAuthResponse>,
        pub(crate) verify_calls: AtomicUsize,
    }

    impl FakeAuthHttpClient {
        pub(crate) fn set_login_response(&self, response: FakeAuthResponse) {
            *self.login_response.lock().expect("login mutex poisoned") = response;
        }

        pub(crate) fn set_register_response(&self, response: FakeAuthResponse) {
            *self.register_response.lock().expect("register mutex poisoned") = response;
        }

        pub(crate) fn set_verify_response(&self, response: FakeAuthResponse) {
            *self.verify_response.lock().expect("verify mutex poisoned") = response;
        }
    }

    #[async_trait]
    impl AuthHttpClient for FakeAuthHttpClient {
        async fn login(&self, _request: LoginRequest) -> Result<AuthGrant, InfraError> {
            self.login_response
                .lock()
                .expect("login mutex poisoned")
                .clone()
                .into_result()
        }

        async fn register(&self, _request: RegisterRequest) -> Result<AuthGrant, InfraError> {
            self.register_response
                .lock()
                .expect("register mutex poisoned")
                .clone()
                .into_result()
        }

        async fn verify(&self, _token: &str) -> Result<AuthUser, InfraError> {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            self.verify_response
                .lock()
                .expect("verify mutex poisoned")
                .clone()
                .into_result()
                .map(|grant| grant.user)
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T08:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn manager(
        store: &Arc<InMemoryCredentialStore>,
        client: &Arc<FakeAuthHttpClient>,
    ) -> SessionManager<InMemoryCredentialStore, FakeAuthHttpClient> {
        SessionManager::new(Arc::clone(store), Arc::clone(client))
            .with_now_provider(Arc::new(fixed_now))
    }

    fn stored_session(token: &str) -> StoredSession {
        StoredSession {
            token: token.to_string(),
            user: grant(token, "mei").user,
            saved_at: fixed_now(),
        }
    }

    #[tokio::test]
    async fn login_saves_session() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let client = Arc::new(FakeAuthHttpClient::default());
        client.set_login_response(FakeAuthResponse::Success(grant("login-token", "ana")));

        let session = manager(&store, &client)
            .login(" ana ", "secret")
            .await
            .expect("login");

        assert_eq!(session.token, "login-token");
        assert_eq!(session.saved_at, fixed_now());
        assert_eq!(store.load_session().expect("load"), Some(session));
    }

    #[tokio::test]
    async fn rejected_login_leaves_store_untouched() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let client = Arc::new(FakeAuthHttpClient::default());
        client.set_register_response(FakeAuthResponse::Rejected("username taken".to_string()));

        let result = manager(&store, &client)
            .register("ana", "ana@example.com", "secret")
            .await;

        assert!(matches!(result, Err(InfraError::Auth(_))));
        assert_eq!(store.load_session().expect("load"), None);
    }

    #[tokio::test]
    async fn restore_without_session_skips_verify() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let client = Arc::new(FakeAuthHttpClient::default());

        let result = manager(&store, &client).restore().await.expect("restore");

        assert_eq!(result, RestoreSessionResult::NoSession);
        assert_eq!(client.verify_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn restore_offline_keeps_session() {
        let store = Arc::new(InMemoryCredentialStore::default());
        store.save_session(&stored_session("kept")).expect("seed");
        let client = Arc::new(FakeAuthHttpClient::default());
        client.set_verify_response(FakeAuthResponse::Unreachable);

        let result = manager(&store, &client).restore().await.expect("restore");

        assert_eq!(result, RestoreSessionResult::Offline(stored_session("kept")));
        assert!(store.load_session().expect("load").is_some());
    }

    // Feature: review-scheduler, Property 10: a rejected stored token never survives restore
    proptest! {
        #[test]
        fn property10_rejected_token_is_removed(token in "[A-Za-z0-9._\\-]{1,64}") {
            let runtime = tokio::runtime::Runtime::new().expect("runtime");
            runtime.block_on(async move {
                let store = Arc::new(InMemoryCredentialStore::default());
                store.save_session(&stored_session(&token)).expect("seed");
                let client = Arc::new(FakeAuthHttpClient::default());
                client.set_verify_response(FakeAuthResponse::Rejected("expired".to_string()));

                let result = manager(&store, &client).restore().await.expect("restore");

                assert_eq!(result, RestoreSessionResult::Rejected);
                assert_eq!(store.load_session().expect("load"), None);
            });
        }
    }

    #[tokio::test]
    async fn restore_verified_refreshes_user() {
        let store = Arc::new(InMemoryCredentialStore::default());
        store.save_session(&stored_session("valid")).expect("seed");
        let client = Arc::new(FakeAuthHttpClient::default());
        client.set_verify_response(FakeAuthResponse::Success(grant("ignored", "renamed")));

        let manager = manager(&store, &client);
        let result = manager.restore().await.expect("restore");

        match result {
            RestoreSessionResult::Verified(session) => {
                assert_eq!(session.token, "valid");
                assert_eq!(session.user.username, "renamed");
            }
            other => panic!("expected verified session, got {other:?}"),
        }
        assert_eq!(
            manager.current_user().expect("user").map(|user| user.username),
            Some("renamed".to_string())
        );

        manager.logout().expect("logout");
        assert_eq!(manager.current_session().expect("session"), None);
    }
}
