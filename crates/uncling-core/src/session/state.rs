//! Session snapshot types.

use serde::{Deserialize, Serialize};

use crate::features::attachment::AttachmentStyle;
use crate::providers::SessionUser;

/// Signed-in user as known to the identity/persistence provider.
///
/// Read-through cache only: replaced wholesale by re-fetching, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: Option<String>,
    pub attachment_style: Option<AttachmentStyle>,
}

impl From<&SessionUser> for Identity {
    fn from(user: &SessionUser) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            attachment_style: None,
        }
    }
}

/// Authentication status of the current page load.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthStatus {
    /// Initial check still in flight.
    #[default]
    Unknown,
    Authenticated(Identity),
    Anonymous,
}

impl AuthStatus {
    pub fn is_unknown(&self) -> bool {
        matches!(self, AuthStatus::Unknown)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthStatus::Authenticated(_))
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            AuthStatus::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    /// Short label used in logs and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            AuthStatus::Unknown => "unknown",
            AuthStatus::Authenticated(_) => "authenticated",
            AuthStatus::Anonymous => "anonymous",
        }
    }
}

/// Immutable snapshot of everything the redirect resolver reads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    /// Durable: splash dismissed once on this device.
    pub splash_seen: bool,
    pub auth: AuthStatus,
    /// Durable: questionnaire finished and persisted.
    pub onboarding_complete: bool,
    /// The address still carries OAuth credentials the bridge has not consumed.
    pub pending_callback: bool,
    /// Page-load counter; bumped by a data-clear reload.
    pub epoch: u64,
}

impl SessionState {
    /// State at the start of a page load: auth unknown, durable flags as stored.
    pub fn initial(splash_seen: bool, onboarding_complete: bool, epoch: u64) -> Self {
        Self {
            splash_seen,
            auth: AuthStatus::Unknown,
            onboarding_complete,
            pending_callback: false,
            epoch,
        }
    }
}
