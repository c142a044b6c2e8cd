use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;

use super::callback::CallbackServer;
use super::store::{TokenDocument, TokenStore};
use crate::backend::error::{BotError, Result};

/// Outcome of asking the provider whether a token is still accepted
#[derive(Debug, Clone, PartialEq)]
pub struct TokenValidation {
    pub valid: bool,
    pub scopes: Vec<String>,
}

/// OAuth endpoints of one remote service
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Short service name used in logs
    fn name(&self) -> &'static str;

    /// Consent page the user is redirected to from `/login`
    fn authorize_url(&self, redirect_uri: &str) -> String;

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenDocument>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenDocument>;

    async fn validate(&self, document: &TokenDocument) -> Result<TokenValidation>;
}

/// Lifecycle of a credential
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialState {
    Unauthenticated,
    PendingAuth,
    Authenticated,
    Refreshing,
    /// Token usable for base calls, but a declared capability is unavailable
    Degraded { reason: String },
}

impl CredentialState {
    fn has_token(&self) -> bool {
        !matches!(
            self,
            CredentialState::Unauthenticated | CredentialState::PendingAuth
        )
    }
}

#[derive(Debug, Default)]
struct Session {
    document: Option<TokenDocument>,
    /// Bumped every time a new token pair is installed
    generation: u64,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<()>>>;

struct Inner {
    provider: Arc<dyn OAuthProvider>,
    store: TokenStore,
    callback_port: u16,
    required_scopes: Vec<String>,
    session: RwLock<Session>,
    state: RwLock<CredentialState>,
    in_flight: Mutex<Option<RefreshFuture>>,
}

/// Owns the token pair of one remote service.
///
/// Cloning is cheap and every clone shares the same tokens, state and
/// in-flight refresh.
#[derive(Clone)]
pub struct CredentialManager {
    inner: Arc<Inner>,
}

impl CredentialManager {
    pub fn new(provider: Arc<dyn OAuthProvider>, store: TokenStore, callback_port: u16) -> Self {
        Self::with_required_scopes(provider, store, callback_port, Vec::new())
    }

    /// Scopes that must be granted for the credential to count as fully authenticated
    pub fn with_required_scopes(
        provider: Arc<dyn OAuthProvider>,
        store: TokenStore,
        callback_port: u16,
        required_scopes: Vec<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                callback_port,
                required_scopes,
                session: RwLock::new(Session::default()),
                state: RwLock::new(CredentialState::Unauthenticated),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.provider.name()
    }

    pub async fn state(&self) -> CredentialState {
        self.inner.state.read().await.clone()
    }

    /// True when the token may be used and every required scope is granted
    pub async fn is_fully_authenticated(&self) -> bool {
        matches!(
            *self.inner.state.read().await,
            CredentialState::Authenticated | CredentialState::Refreshing
        )
    }

    pub async fn access_token(&self) -> Option<String> {
        self.inner
            .session
            .read()
            .await
            .document
            .as_ref()
            .map(|d| d.access_token.clone())
    }

    /// Install a previously persisted token pair without validating it
    pub async fn restore(&self, document: TokenDocument) {
        self.install(document).await;
        *self.inner.state.write().await = CredentialState::Authenticated;
    }

    /// Load the saved document or run the interactive flow, then validate.
    pub async fn acquire(&self) -> Result<()> {
        let name = self.name();

        if let Some(document) = self.inner.store.load() {
            log::info!("Loaded saved {} token", name);
            self.restore(document).await;
            match self.ensure_valid().await {
                Ok(()) => return Ok(()),
                Err(e) => log::warn!(
                    "Saved {} token is unusable ({}), starting OAuth flow...",
                    name,
                    e
                ),
            }
        } else {
            log::info!("No saved {} token found, starting OAuth flow...", name);
        }

        self.authorize_interactively().await?;
        self.ensure_valid().await
    }

    /// Run the authorization-code flow through a temporary local listener.
    pub async fn authorize_interactively(&self) -> Result<()> {
        let name = self.name();
        *self.inner.state.write().await = CredentialState::PendingAuth;

        let result = self.exchange_through_callback().await;
        match result {
            Ok(document) => {
                if let Err(e) = self.inner.store.save(&document) {
                    log::error!("Failed to persist {} token: {}", name, e);
                }
                self.install(document).await;
                *self.inner.state.write().await = CredentialState::Authenticated;
                log::info!("{} authorization complete", name);
                Ok(())
            }
            Err(e) => {
                *self.inner.state.write().await = CredentialState::Unauthenticated;
                log::error!("{} authorization failed: {}", name, e);
                Err(BotError::AuthError(format!("{} authorization failed: {}", name, e)))
            }
        }
    }

    async fn exchange_through_callback(&self) -> Result<TokenDocument> {
        let port = self.inner.callback_port;
        let redirect_uri = format!("http://localhost:{}/callback", port);
        let server = CallbackServer::bind(port).await?;
        let code = server
            .wait_for_code(self.inner.provider.authorize_url(&redirect_uri))
            .await?;
        self.inner.provider.exchange_code(&code, &redirect_uri).await
    }

    /// Validate the current token; on invalidity attempt exactly one refresh.
    pub async fn ensure_valid(&self) -> Result<()> {
        let (document, generation) = {
            let session = self.inner.session.read().await;
            match &session.document {
                Some(document) => (document.clone(), session.generation),
                None => {
                    return Err(BotError::Unavailable(format!(
                        "no {} token available",
                        self.name()
                    )))
                }
            }
        };

        match self.inner.provider.validate(&document).await {
            Ok(validation) if validation.valid => {
                self.apply_scopes(validation.scopes).await;
                Ok(())
            }
            Ok(_) | Err(BotError::AuthExpired(_)) => {
                log::warn!("{} token invalid, attempting refresh...", self.name());
                self.refresh_after(generation).await?;

                let refreshed = self.current_document().await?;
                let validation = self.inner.provider.validate(&refreshed).await?;
                if !validation.valid {
                    let reason = format!("refreshed {} token was rejected", self.name());
                    *self.inner.state.write().await = CredentialState::Degraded {
                        reason: reason.clone(),
                    };
                    return Err(BotError::AuthError(reason));
                }
                self.apply_scopes(validation.scopes).await;
                Ok(())
            }
            Err(e) => {
                log::error!("{} token validation error: {}", self.name(), e);
                Err(e)
            }
        }
    }

    /// Invoke `op` with the current access token. If it fails with an
    /// expired authorization, refresh once and invoke it exactly once more.
    pub async fn with_token<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (token, generation) = self.current_token().await?;
        match op(token).await {
            Err(e) if e.is_auth_expired() => {
                log::warn!("{} call got 401, refreshing token and retrying...", self.name());
                self.refresh_after(generation).await?;
                let (token, _) = self.current_token().await?;
                op(token).await
            }
            result => result,
        }
    }

    /// Refresh unless a newer token than `seen_generation` is already
    /// installed. Concurrent callers share one in-flight refresh.
    pub async fn refresh_after(&self, seen_generation: u64) -> Result<()> {
        let refresh = {
            let mut slot = self.inner.in_flight.lock().await;
            if self.inner.session.read().await.generation != seen_generation {
                return Ok(());
            }
            match slot.as_ref() {
                Some(refresh) => refresh.clone(),
                None => {
                    let this = self.clone();
                    let refresh = async move {
                        let outcome = this.perform_refresh().await;
                        this.inner.in_flight.lock().await.take();
                        outcome
                    }
                    .boxed()
                    .shared();
                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };
        refresh.await
    }

    async fn perform_refresh(&self) -> Result<()> {
        let name = self.name();
        let previous = self.current_document().await?;
        *self.inner.state.write().await = CredentialState::Refreshing;

        let result = self.inner.provider.refresh(&previous.refresh_token).await;
        match result {
            Ok(mut document) => {
                if document.refresh_token.is_empty() {
                    document.refresh_token = previous.refresh_token.clone();
                }
                if document.scopes.is_empty() {
                    document.scopes = previous.scopes.clone();
                }
                if let Err(e) = self.inner.store.save(&document) {
                    log::error!("Failed to persist refreshed {} token: {}", name, e);
                }
                let scopes = document.scopes.clone();
                self.install(document).await;
                self.apply_scopes(scopes).await;
                log::info!("{} access token refreshed successfully", name);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to refresh {} access token: {}", name, e);
                *self.inner.state.write().await = CredentialState::Degraded {
                    reason: format!("token refresh failed: {}", e),
                };
                Err(BotError::AuthError(format!("{} token refresh failed: {}", name, e)))
            }
        }
    }

    /// Re-run [`ensure_valid`](Self::ensure_valid) on a fixed interval, starting now.
    pub fn spawn_periodic_validation(&self, every: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(e) = this.ensure_valid().await {
                    log::error!("Scheduled {} token validation failed: {}", this.name(), e);
                }
            }
        })
    }

    async fn install(&self, document: TokenDocument) {
        let mut session = self.inner.session.write().await;
        session.document = Some(document);
        session.generation += 1;
    }

    async fn apply_scopes(&self, scopes: Vec<String>) {
        let missing: Vec<&String> = self
            .inner
            .required_scopes
            .iter()
            .filter(|required| !scopes.contains(required))
            .collect();

        let state = if missing.is_empty() {
            CredentialState::Authenticated
        } else {
            let reason = format!(
                "missing scope(s): {}",
                missing
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            log::warn!("{} token is valid, but {}", self.name(), reason);
            CredentialState::Degraded { reason }
        };

        if let Some(document) = self.inner.session.write().await.document.as_mut() {
            if !scopes.is_empty() {
                document.scopes = scopes;
            }
        }
        *self.inner.state.write().await = state;
    }

    async fn current_document(&self) -> Result<TokenDocument> {
        self.inner
            .session
            .read()
            .await
            .document
            .clone()
            .ok_or_else(|| BotError::Unavailable(format!("no {} token available", self.name())))
    }

    async fn current_token(&self) -> Result<(String, u64)> {
        let state = self.inner.state.read().await.clone();
        if !state.has_token() {
            return Err(BotError::Unavailable(format!(
                "{} is not authenticated",
                self.name()
            )));
        }
        let session = self.inner.session.read().await;
        match &session.document {
            Some(document) => Ok((document.access_token.clone(), session.generation)),
            None => Err(BotError::Unavailable(format!(
                "no {} token available",
                self.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::{token, FakeProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager(provider: Arc<FakeProvider>, dir: &tempfile::TempDir) -> CredentialManager {
        CredentialManager::with_required_scopes(
            provider,
            TokenStore::new(dir.path().join("token.json")),
            0,
            vec!["channel:manage:redemptions".to_string()],
        )
    }

    async fn call(credential: &CredentialManager, calls: &AtomicUsize) -> Result<String> {
        credential
            .with_token(|token| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if token == "old" {
                    Err(BotError::AuthExpired("HTTP 401".to_string()))
                } else {
                    Ok(token)
                }
            })
            .await
    }

    #[tokio::test]
    async fn test_unauthenticated_calls_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let credential = manager(Arc::new(FakeProvider::new()), &dir);
        let calls = AtomicUsize::new(0);

        let result = call(&credential, &calls).await;
        assert!(matches!(result, Err(BotError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_retried_once() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::new());
        let credential = manager(provider.clone(), &dir);
        credential.restore(token("old")).await;
        let calls = AtomicUsize::new(0);

        let result = call(&credential, &calls).await.unwrap();
        assert_eq!(result, "new");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.refresh_count(), 1);

        // The refreshed pair is persisted as a whole document
        let saved = TokenStore::new(dir.path().join("token.json")).load().unwrap();
        assert_eq!(saved.access_token, "new");
        assert_eq!(saved.refresh_token, "refresh-old");
    }

    #[tokio::test]
    async fn test_second_auth_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::new());
        let credential = manager(provider.clone(), &dir);
        credential.restore(token("old")).await;
        let calls = AtomicUsize::new(0);
        let calls_ref = &calls;

        let result: Result<()> = credential
            .with_token(|_| async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                Err(BotError::AuthExpired("HTTP 401".to_string()))
            })
            .await;

        assert!(result.unwrap_err().is_auth_expired());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::new());
        let credential = manager(provider.clone(), &dir);
        credential.restore(token("old")).await;
        let calls = AtomicUsize::new(0);
        let calls_ref = &calls;

        let result: Result<()> = credential
            .with_token(|_| async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                Err(BotError::Forbidden("HTTP 403".to_string()))
            })
            .await;

        assert!(matches!(result, Err(BotError::Forbidden(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_are_coalesced() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::new().with_refresh_delay(Duration::from_millis(20)));
        let credential = manager(provider.clone(), &dir);
        credential.restore(token("old")).await;
        let calls = AtomicUsize::new(0);

        let (first, second) = tokio::join!(call(&credential, &calls), call(&credential, &calls));

        assert_eq!(first.unwrap(), "new");
        assert_eq!(second.unwrap(), "new");
        assert_eq!(provider.refresh_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_late_failure_after_refresh_reuses_new_token() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::new());
        let credential = manager(provider.clone(), &dir);
        credential.restore(token("old")).await;

        let (_, stale_generation) = credential.current_token().await.unwrap();
        credential.refresh_after(stale_generation).await.unwrap();
        credential.refresh_after(stale_generation).await.unwrap();

        assert_eq!(provider.refresh_count(), 1);
        assert_eq!(credential.access_token().await.unwrap(), "new");
    }

    #[tokio::test]
    async fn test_missing_scope_degrades_credential() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::new().with_scopes(vec!["chat:read"]));
        let credential = manager(provider, &dir);
        credential.restore(token("new")).await;

        credential.ensure_valid().await.unwrap();

        assert!(matches!(
            credential.state().await,
            CredentialState::Degraded { .. }
        ));
        assert!(!credential.is_fully_authenticated().await);
        // Base calls still go through
        let calls = AtomicUsize::new(0);
        assert_eq!(call(&credential, &calls).await.unwrap(), "new");
    }

    #[tokio::test]
    async fn test_invalid_token_refreshes_once_during_validation() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::new());
        let credential = manager(provider.clone(), &dir);
        credential.restore(token("old")).await;

        credential.ensure_valid().await.unwrap();

        assert_eq!(provider.refresh_count(), 1);
        assert_eq!(credential.state().await, CredentialState::Authenticated);
    }

    #[tokio::test]
    async fn test_failed_refresh_degrades_without_dropping_token() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::new().failing_refresh());
        let credential = manager(provider.clone(), &dir);
        credential.restore(token("old")).await;

        assert!(credential.ensure_valid().await.is_err());
        assert_eq!(provider.refresh_count(), 1);
        assert!(matches!(
            credential.state().await,
            CredentialState::Degraded { .. }
        ));
        assert_eq!(credential.access_token().await.unwrap(), "old");
    }
}
