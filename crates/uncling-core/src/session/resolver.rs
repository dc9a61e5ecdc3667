//! Redirect resolver: where should the shell be, given the session snapshot?
//!
//! First matching rule wins:
//!
//! 1. auth unknown: stay put (loading)
//! 2. OAuth callback still pending: stay put
//! 3. authenticated: `/onboarding` until onboarding is complete, then `/dashboard`
//! 4. anonymous: `/` (splash) until the splash was seen, then `/auth`
//! 5. already at the target: stay put
//!
//! Signed-in users are checked before the splash flag so a returning user
//! on a fresh device lands on their dashboard, not the splash.

use super::shell::Route;
use super::state::{AuthStatus, SessionState};

/// Computes the gating target for `current_path`, or `None` when no
/// navigation is needed.
pub fn resolve(state: &SessionState, current_path: &str) -> Option<Route> {
    if state.pending_callback {
        return None;
    }

    let target = gating_target(state)?;
    if normalize(current_path) == target.path() {
        return None;
    }
    Some(target)
}

/// The route a snapshot gates to, ignoring where the shell currently is.
pub fn gating_target(state: &SessionState) -> Option<Route> {
    match &state.auth {
        AuthStatus::Unknown => None,
        AuthStatus::Authenticated(_) => Some(if state.onboarding_complete {
            Route::Dashboard
        } else {
            Route::Onboarding
        }),
        AuthStatus::Anonymous => Some(anonymous_target(state)),
    }
}

/// Where a signed-out user belongs.
pub fn anonymous_target(state: &SessionState) -> Route {
    if state.splash_seen {
        Route::Auth
    } else {
        Route::Splash
    }
}

fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::state::Identity;

    const PATHS: &[&str] = &[
        "/",
        "/auth",
        "/onboarding",
        "/dashboard",
        "/check-in",
        "/rescue-me",
        "/secure-chat",
        "/before-you-rest",
        "/progress",
        "/settings",
        "/nope",
    ];

    fn identity() -> Identity {
        Identity {
            id: "user-1".into(),
            email: Some("user@example.com".into()),
            attachment_style: None,
        }
    }

    fn state(splash_seen: bool, auth: AuthStatus, onboarding_complete: bool) -> SessionState {
        SessionState {
            splash_seen,
            auth,
            onboarding_complete,
            pending_callback: false,
            epoch: 0,
        }
    }

    /// Every combination of the snapshot's inputs.
    fn all_states() -> Vec<SessionState> {
        let mut states = Vec::new();
        for auth in [
            AuthStatus::Unknown,
            AuthStatus::Anonymous,
            AuthStatus::Authenticated(identity()),
        ] {
            for splash in [false, true] {
                for onboarding in [false, true] {
                    for pending in [false, true] {
                        let mut s = state(splash, auth.clone(), onboarding);
                        s.pending_callback = pending;
                        states.push(s);
                    }
                }
            }
        }
        states
    }

    #[test]
    fn test_resolve_is_idempotent() {
        for s in all_states() {
            for path in PATHS {
                assert_eq!(resolve(&s, path), resolve(&s, path), "{s:?} at {path}");
            }
        }
    }

    #[test]
    fn test_following_the_target_settles() {
        for s in all_states() {
            for path in PATHS {
                if let Some(target) = resolve(&s, path) {
                    assert_eq!(resolve(&s, target.path()), None, "{s:?} from {path}");
                }
            }
        }
    }

    #[test]
    fn test_authenticated_never_goes_to_sign_in() {
        for s in all_states()
            .into_iter()
            .filter(|s| s.auth.is_authenticated())
        {
            for path in PATHS {
                assert_ne!(resolve(&s, path), Some(Route::Auth), "{s:?} at {path}");
            }
        }
    }

    #[test]
    fn test_anonymous_never_goes_to_gated_route() {
        for s in all_states()
            .into_iter()
            .filter(|s| s.auth == AuthStatus::Anonymous)
        {
            for path in PATHS {
                if let Some(target) = resolve(&s, path) {
                    assert!(!target.is_gated(), "{s:?} at {path} -> {target:?}");
                }
            }
        }
    }

    #[test]
    fn test_pending_callback_always_waits() {
        for s in all_states().into_iter().filter(|s| s.pending_callback) {
            for path in PATHS {
                assert_eq!(resolve(&s, path), None, "{s:?} at {path}");
            }
        }
    }

    #[test]
    fn test_unknown_always_waits() {
        for s in all_states().into_iter().filter(|s| s.auth.is_unknown()) {
            for path in PATHS {
                assert_eq!(resolve(&s, path), None);
            }
        }
    }

    #[test]
    fn test_scenario_loading_before_auth_settles() {
        let s = state(false, AuthStatus::Unknown, false);
        assert_eq!(resolve(&s, "/"), None);
    }

    #[test]
    fn test_scenario_anonymous_on_dashboard_goes_to_sign_in() {
        let s = state(true, AuthStatus::Anonymous, false);
        assert_eq!(resolve(&s, "/dashboard"), Some(Route::Auth));
    }

    #[test]
    fn test_scenario_anonymous_without_splash_goes_to_splash() {
        let s = state(false, AuthStatus::Anonymous, true);
        assert_eq!(resolve(&s, "/auth"), Some(Route::Splash));
        assert_eq!(resolve(&s, "/"), None);
    }

    #[test]
    fn test_scenario_authenticated_beats_unseen_splash() {
        let s = state(false, AuthStatus::Authenticated(identity()), false);
        assert_eq!(resolve(&s, "/"), Some(Route::Onboarding));
    }

    #[test]
    fn test_scenario_already_at_dashboard() {
        let s = state(true, AuthStatus::Authenticated(identity()), true);
        assert_eq!(resolve(&s, "/dashboard"), None);
        assert_eq!(resolve(&s, "/dashboard/"), None);
        assert_eq!(resolve(&s, "/auth"), Some(Route::Dashboard));
    }
}
