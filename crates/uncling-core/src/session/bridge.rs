//! Identity bridge: turns the provider's asynchronous session lifecycle into
//! the store's auth status.
//!
//! Every provider call is bounded by a timeout. Any failure settles the
//! session as anonymous, is logged, and reaches the user only as a generic
//! [`AuthNotice`].

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::callback::{OAuthCallback, strip_callback_params};
use super::shell::Navigator;
use super::state::Identity;
use super::store::SessionStore;
use crate::providers::{AuthSession, IdentityProvider, ProviderError, SessionEvent};

const NOT_INITIALIZED: u64 = u64::MAX;

/// User-facing outcome of a failed auth step. Never carries provider text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthNotice {
    SignInFailed,
    SessionCheckFailed,
}

impl fmt::Display for AuthNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthNotice::SignInFailed => {
                f.write_str("We couldn't finish signing you in. Please try again.")
            }
            AuthNotice::SessionCheckFailed => {
                f.write_str("We couldn't check your session. You can sign in again.")
            }
        }
    }
}

pub struct IdentityBridge<P> {
    provider: Arc<P>,
    store: SessionStore,
    timeout: Duration,
    session: Mutex<Option<AuthSession>>,
    initialized_epoch: AtomicU64,
}

impl<P: IdentityProvider> IdentityBridge<P> {
    pub fn new(provider: Arc<P>, store: SessionStore, timeout: Duration) -> Self {
        Self {
            provider,
            store,
            timeout,
            session: Mutex::new(None),
            initialized_epoch: AtomicU64::new(NOT_INITIALIZED),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Session currently backing the authenticated state, if any.
    pub fn current_session(&self) -> Option<AuthSession> {
        self.lock_session().clone()
    }

    /// Initial auth check for the current page load.
    ///
    /// Consumes OAuth callback credentials in the address if present,
    /// otherwise asks the provider for an existing session. Runs once per
    /// store epoch; repeated calls return `None` without touching anything.
    pub async fn initialize(&self, nav: &mut impl Navigator) -> Option<AuthNotice> {
        let epoch = self.store.epoch();
        if self.initialized_epoch.swap(epoch, Ordering::SeqCst) == epoch {
            tracing::debug!(epoch, "Identity bridge already initialized");
            return None;
        }

        match OAuthCallback::detect(nav.location()) {
            Some(callback) => self.consume_callback(epoch, &callback, nav).await,
            None => self.check_existing_session(epoch).await,
        }
    }

    async fn consume_callback(
        &self,
        epoch: u64,
        callback: &OAuthCallback,
        nav: &mut impl Navigator,
    ) -> Option<AuthNotice> {
        self.store.set_pending_callback(epoch, true);
        tracing::info!(kind = callback.kind(), "Consuming OAuth callback");

        let result = self
            .bounded("exchange callback", self.provider.exchange_callback(callback))
            .await;
        let notice = match result {
            Ok(session) => {
                self.settle_session(epoch, session).await;
                None
            }
            Err(e) => {
                tracing::warn!(kind = callback.kind(), error = %e, "OAuth callback rejected");
                self.store.set_anonymous(epoch);
                Some(AuthNotice::SignInFailed)
            }
        };

        let cleaned = strip_callback_params(nav.location());
        nav.replace(cleaned);
        self.store.set_pending_callback(epoch, false);
        notice
    }

    async fn check_existing_session(&self, epoch: u64) -> Option<AuthNotice> {
        match self
            .bounded("get session", self.provider.get_session())
            .await
        {
            Ok(Some(session)) => {
                self.settle_session(epoch, session).await;
                None
            }
            Ok(None) => {
                tracing::debug!("No existing session");
                self.store.set_anonymous(epoch);
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session check failed");
                self.store.set_anonymous(epoch);
                Some(AuthNotice::SessionCheckFailed)
            }
        }
    }

    /// Fetches the profile for `session` and settles as authenticated.
    /// A failed profile read falls back to the session's own user.
    async fn settle_session(&self, epoch: u64, session: AuthSession) {
        let identity = match self
            .bounded("fetch identity", self.provider.fetch_identity(&session))
            .await
        {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, "Profile fetch failed, using session user");
                Identity::from(&session.user)
            }
        };
        *self.lock_session() = Some(session);
        self.store.set_authenticated(epoch, identity);
    }

    /// Re-reads the profile of the current session (e.g. after onboarding
    /// wrote the attachment style). Returns whether the snapshot changed.
    pub async fn refresh_identity(&self) -> bool {
        let Some(session) = self.current_session() else {
            return false;
        };
        let epoch = self.store.epoch();
        match self
            .bounded("fetch identity", self.provider.fetch_identity(&session))
            .await
        {
            Ok(identity) => self.store.set_authenticated(epoch, identity),
            Err(e) => {
                tracing::warn!(error = %e, "Profile refresh failed, keeping cached identity");
                false
            }
        }
    }

    /// Signs out with the provider. Local state is anonymous either way.
    pub async fn sign_out(&self) {
        let epoch = self.store.epoch();
        if let Err(e) = self.bounded("sign out", self.provider.sign_out()).await {
            tracing::warn!(error = %e, "Provider sign-out failed");
        }
        *self.lock_session() = None;
        self.store.set_anonymous(epoch);
    }

    /// Authorize URL for an external sign-in provider.
    ///
    /// # Errors
    /// Returns an error if the provider cannot prepare the flow.
    pub fn sign_in_url(&self, provider: &str, redirect_to: &str) -> Result<String, ProviderError> {
        self.provider.sign_in_url(provider, redirect_to)
    }

    /// Applies one provider-pushed session change.
    pub async fn apply_event(&self, event: SessionEvent) {
        let epoch = self.store.epoch();
        tracing::debug!(event = event.name(), epoch, "Session event");

        match event {
            SessionEvent::SignedOut => {
                *self.lock_session() = None;
                self.store.set_anonymous(epoch);
            }
            SessionEvent::TokenRefreshed(session) if self.is_current_user(&session) => {
                *self.lock_session() = Some(session);
            }
            SessionEvent::SignedIn(session)
            | SessionEvent::TokenRefreshed(session)
            | SessionEvent::UserUpdated(session) => {
                self.settle_session(epoch, session).await;
            }
        }
    }

    /// Registers for provider session changes until the returned guard is
    /// dropped or shut down.
    pub fn subscribe(self: &Arc<Self>) -> SessionSubscription {
        let mut rx = self.provider.subscribe();
        let token = CancellationToken::new();
        let cancel = token.clone();
        let bridge = Arc::clone(self);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => bridge.apply_event(event).await,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Missed session events, re-checking session");
                            bridge.resync().await;
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            tracing::debug!("Session subscription ended");
        });

        SessionSubscription {
            token,
            handle: Some(handle),
        }
    }

    /// Re-queries the provider after missed events.
    async fn resync(&self) {
        let epoch = self.store.epoch();
        match self.bounded("get session", self.provider.get_session()).await {
            Ok(Some(session)) => self.settle_session(epoch, session).await,
            Ok(None) => {
                *self.lock_session() = None;
                self.store.set_anonymous(epoch);
            }
            Err(e) => tracing::warn!(error = %e, "Session re-check failed"),
        }
    }

    fn is_current_user(&self, session: &AuthSession) -> bool {
        self.store
            .snapshot()
            .auth
            .identity()
            .is_some_and(|identity| identity.id == session.user.id)
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ProviderError::timeout(format!(
                "{operation} timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<AuthSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Live provider subscription. Dropping it cancels the listener task.
#[derive(Debug)]
pub struct SessionSubscription {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SessionSubscription {
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancels the listener and waits for it to stop.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            tracing::debug!(error = %e, "Session subscription task failed");
        }
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
