//! Session store: one snapshot, explicit setters, change notification.
//!
//! Durable mutations write the flag store first and the in-memory snapshot
//! second, inside the same call. A failed durable write leaves the snapshot
//! untouched, so storage and memory never disagree across a render pass.
//!
//! Auth setters are stamped with the page-load `epoch` they belong to;
//! writes from a superseded load are dropped.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use super::flags::{FlagKey, FlagStore};
use super::state::{AuthStatus, Identity, SessionState};
use crate::features::attachment::AttachmentStyle;

struct Inner {
    flags: Box<dyn FlagStore>,
    tx: watch::Sender<SessionState>,
}

/// Shared handle to the session snapshot.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.inner.tx.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Starts a page load: durable flags from storage, auth `Unknown`.
    ///
    /// # Errors
    /// Returns an error if the flag store cannot be read.
    pub fn load(flags: impl FlagStore + 'static) -> Result<Self> {
        let state = SessionState::initial(
            flags.is_set(FlagKey::SplashSeen)?,
            flags.is_set(FlagKey::OnboardingComplete)?,
            0,
        );
        let (tx, _rx) = watch::channel(state);
        Ok(Self {
            inner: Arc::new(Inner {
                flags: Box::new(flags),
                tx,
            }),
        })
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> SessionState {
        self.inner.tx.borrow().clone()
    }

    /// Receiver notified after every effective change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.tx.subscribe()
    }

    pub fn epoch(&self) -> u64 {
        self.inner.tx.borrow().epoch
    }

    /// Cached attachment style from durable storage, if any.
    ///
    /// # Errors
    /// Returns an error if the flag store cannot be read.
    pub fn attachment_style(&self) -> Result<Option<AttachmentStyle>> {
        Ok(self
            .inner
            .flags
            .get(FlagKey::AttachmentStyle)?
            .and_then(|v| v.parse().ok()))
    }

    /// Marks the splash screen as dismissed.
    ///
    /// # Errors
    /// Returns an error if the durable write fails; the snapshot is unchanged.
    pub fn set_splash_seen(&self) -> Result<()> {
        self.set_durable_flag(FlagKey::SplashSeen, |s| &mut s.splash_seen)
    }

    /// Marks the onboarding questionnaire as complete.
    ///
    /// # Errors
    /// Returns an error if the durable write fails; the snapshot is unchanged.
    pub fn set_onboarding_complete(&self) -> Result<()> {
        self.set_durable_flag(FlagKey::OnboardingComplete, |s| &mut s.onboarding_complete)
    }

    /// Caches the attachment style locally. Not part of the snapshot.
    ///
    /// # Errors
    /// Returns an error if the durable write fails.
    pub fn set_attachment_style(&self, style: AttachmentStyle) -> Result<()> {
        if self.attachment_style()? == Some(style) {
            return Ok(());
        }
        self.inner.flags.set(FlagKey::AttachmentStyle, style.as_str())
    }

    /// Forgets the cached attachment style (retake quiz).
    ///
    /// # Errors
    /// Returns an error if the durable write fails.
    pub fn clear_attachment_style(&self) -> Result<()> {
        self.inner.flags.remove(FlagKey::AttachmentStyle)
    }

    /// Wipes every durable flag and restarts the page load.
    ///
    /// The new snapshot has auth `Unknown` and a bumped epoch; the identity
    /// bridge must be initialized again.
    ///
    /// # Errors
    /// Returns an error if storage cannot be cleared; the snapshot is unchanged.
    pub fn clear_all(&self) -> Result<()> {
        self.inner.flags.clear()?;
        self.inner.tx.send_modify(|state| {
            *state = SessionState::initial(false, false, state.epoch + 1);
        });
        tracing::info!(epoch = self.epoch(), "Session data cleared");
        Ok(())
    }

    /// Settles auth as signed in. Returns whether the snapshot changed.
    pub fn set_authenticated(&self, epoch: u64, identity: Identity) -> bool {
        self.set_auth(epoch, AuthStatus::Authenticated(identity))
    }

    /// Settles auth as signed out. Returns whether the snapshot changed.
    pub fn set_anonymous(&self, epoch: u64) -> bool {
        self.set_auth(epoch, AuthStatus::Anonymous)
    }

    /// Marks whether OAuth credentials in the address are still unconsumed.
    pub fn set_pending_callback(&self, epoch: u64, pending: bool) -> bool {
        self.inner.tx.send_if_modified(|state| {
            if state.epoch != epoch || state.pending_callback == pending {
                return false;
            }
            state.pending_callback = pending;
            true
        })
    }

    fn set_auth(&self, epoch: u64, auth: AuthStatus) -> bool {
        let label = auth.label();
        let changed = self.inner.tx.send_if_modified(|state| {
            if state.epoch != epoch {
                tracing::debug!(
                    stale = epoch,
                    current = state.epoch,
                    "Dropping auth update from a previous load"
                );
                return false;
            }
            if state.auth == auth {
                return false;
            }
            state.auth = auth;
            true
        });
        if changed {
            tracing::debug!(epoch, auth = label, "Auth status changed");
        }
        changed
    }

    fn set_durable_flag(
        &self,
        key: FlagKey,
        field: impl Fn(&mut SessionState) -> &mut bool,
    ) -> Result<()> {
        let mut current = self.snapshot();
        if *field(&mut current) {
            return Ok(());
        }

        self.inner.flags.set(key, "true")?;
        self.inner.tx.send_if_modified(|state| {
            let flag = field(state);
            if *flag {
                return false;
            }
            *flag = true;
            true
        });
        Ok(())
    }
}
