//! Session lifecycle: durable flags, auth status, redirects, and routing.
//!
//! [`SessionStore`] owns the state. [`IdentityBridge`] is the only writer of
//! auth status. [`resolve`] is the pure redirect table and [`RouteShell`]
//! applies it to a [`Navigator`].

pub mod bridge;
pub mod callback;
pub mod flags;
pub mod resolver;
pub mod shell;
pub mod state;
pub mod store;

pub use bridge::{AuthNotice, IdentityBridge, SessionSubscription};
pub use callback::OAuthCallback;
pub use flags::{FileFlagStore, FlagKey, FlagStore, MemoryFlagStore};
pub use resolver::resolve;
pub use shell::{MemoryHistory, Navigator, RenderDecision, Route, RouteShell};
pub use state::{AuthStatus, Identity, SessionState};
pub use store::SessionStore;
