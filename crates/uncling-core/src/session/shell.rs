//! Route shell: route table, navigation history, render guard.

use std::fmt;

use url::Url;

use super::resolver::{anonymous_target, resolve};
use super::state::{AuthStatus, SessionState};

/// Screens of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Splash,
    Auth,
    Onboarding,
    Dashboard,
    CheckIn,
    RescueMe,
    SecureChat,
    BeforeYouRest,
    Progress,
    Settings,
    NotFound,
}

impl Route {
    pub fn all() -> &'static [Route] {
        &[
            Route::Splash,
            Route::Auth,
            Route::Onboarding,
            Route::Dashboard,
            Route::CheckIn,
            Route::RescueMe,
            Route::SecureChat,
            Route::BeforeYouRest,
            Route::Progress,
            Route::Settings,
        ]
    }

    pub fn path(self) -> &'static str {
        match self {
            Route::Splash => "/",
            Route::Auth => "/auth",
            Route::Onboarding => "/onboarding",
            Route::Dashboard => "/dashboard",
            Route::CheckIn => "/check-in",
            Route::RescueMe => "/rescue-me",
            Route::SecureChat => "/secure-chat",
            Route::BeforeYouRest => "/before-you-rest",
            Route::Progress => "/progress",
            Route::Settings => "/settings",
            Route::NotFound => "/404",
        }
    }

    /// Maps an address path to a route. Trailing slashes are ignored.
    pub fn from_path(path: &str) -> Self {
        let trimmed = path.trim_end_matches('/');
        let normalized = if trimmed.is_empty() { "/" } else { trimmed };
        Route::all()
            .iter()
            .copied()
            .find(|route| route.path() == normalized)
            .unwrap_or(Route::NotFound)
    }

    /// Routes that require a signed-in user.
    pub fn is_gated(self) -> bool {
        !matches!(self, Route::Splash | Route::Auth | Route::NotFound)
    }

    pub fn title(self) -> &'static str {
        match self {
            Route::Splash => "Welcome",
            Route::Auth => "Sign in",
            Route::Onboarding => "Getting to know you",
            Route::Dashboard => "Dashboard",
            Route::CheckIn => "Check-in",
            Route::RescueMe => "Rescue me",
            Route::SecureChat => "Secure self chat",
            Route::BeforeYouRest => "Before you rest",
            Route::Progress => "Progress",
            Route::Settings => "Settings",
            Route::NotFound => "Not found",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Browser-style history the shell navigates.
pub trait Navigator {
    /// The current address.
    fn location(&self) -> &Url;

    /// Adds a history entry (user navigation).
    fn push(&mut self, url: Url);

    /// Rewrites the current entry in place (gating, callback cleanup).
    fn replace(&mut self, url: Url);
}

/// In-memory history stack.
#[derive(Debug, Clone)]
pub struct MemoryHistory {
    entries: Vec<Url>,
    index: usize,
    replacements: usize,
}

impl MemoryHistory {
    pub fn new(start: Url) -> Self {
        Self {
            entries: vec![start],
            index: 0,
            replacements: 0,
        }
    }

    /// Entries up to and including the current one.
    pub fn entries(&self) -> &[Url] {
        &self.entries[..=self.index]
    }

    /// Steps back one entry. Returns `false` at the start of history.
    pub fn back(&mut self) -> bool {
        if self.index == 0 {
            return false;
        }
        self.index -= 1;
        true
    }

    /// Number of in-place rewrites performed so far.
    pub fn replacements(&self) -> usize {
        self.replacements
    }
}

impl Navigator for MemoryHistory {
    fn location(&self) -> &Url {
        &self.entries[self.index]
    }

    fn push(&mut self, url: Url) {
        self.entries.truncate(self.index + 1);
        self.entries.push(url);
        self.index = self.entries.len() - 1;
    }

    fn replace(&mut self, url: Url) {
        tracing::debug!(from = %self.location(), to = %url, "History replace");
        self.entries[self.index] = url;
        self.replacements += 1;
    }
}

/// What the shell shows for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderDecision {
    /// Neutral placeholder while auth is unsettled.
    Loading,
    Screen(Route),
    /// The guard refused the route; navigate here instead.
    Redirect(Route),
}

impl fmt::Display for RenderDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderDecision::Loading => f.write_str("loading"),
            RenderDecision::Screen(route) => write!(f, "screen {route}"),
            RenderDecision::Redirect(route) => write!(f, "redirect {route}"),
        }
    }
}

/// Applies gating navigations whenever the session snapshot changes.
///
/// Identical snapshots are skipped, so a user who pushes to a feature screen
/// is not bounced back to the dashboard until something actually changes.
#[derive(Debug, Default)]
pub struct RouteShell {
    last_seen: Option<SessionState>,
}

impl RouteShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-evaluates the resolver if `state` differs from the last one seen.
    /// Returns the route replaced to, if any.
    pub fn sync(&mut self, state: &SessionState, nav: &mut impl Navigator) -> Option<Route> {
        if self.last_seen.as_ref() == Some(state) {
            return None;
        }
        self.force_sync(state, nav)
    }

    /// Re-evaluates the resolver unconditionally.
    pub fn force_sync(&mut self, state: &SessionState, nav: &mut impl Navigator) -> Option<Route> {
        self.last_seen = Some(state.clone());

        let target = resolve(state, nav.location().path())?;
        let url = route_url(nav.location(), target);
        tracing::debug!(to = %target, auth = state.auth.label(), "Gating redirect");
        nav.replace(url);
        Some(target)
    }

    /// Render-time guard for `path`.
    pub fn render(state: &SessionState, path: &str) -> RenderDecision {
        let route = Route::from_path(path);
        if !route.is_gated() {
            return RenderDecision::Screen(route);
        }

        match &state.auth {
            AuthStatus::Unknown => RenderDecision::Loading,
            AuthStatus::Anonymous => RenderDecision::Redirect(anonymous_target(state)),
            AuthStatus::Authenticated(_)
                if !state.onboarding_complete && route != Route::Onboarding =>
            {
                RenderDecision::Redirect(Route::Onboarding)
            }
            AuthStatus::Authenticated(_) => RenderDecision::Screen(route),
        }
    }

    /// User navigation to `route` (history push).
    pub fn open(nav: &mut impl Navigator, route: Route) {
        let url = route_url(nav.location(), route);
        nav.push(url);
    }
}

/// Same origin as `base`, path of `route`, no query or fragment.
pub fn route_url(base: &Url, route: Route) -> Url {
    let mut url = base.clone();
    url.set_path(route.path());
    url.set_query(None);
    url.set_fragment(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::state::Identity;

    fn history(path: &str) -> MemoryHistory {
        MemoryHistory::new(Url::parse(&format!("http://localhost:5173{path}")).unwrap())
    }

    fn signed_in(onboarding_complete: bool) -> SessionState {
        SessionState {
            splash_seen: true,
            auth: AuthStatus::Authenticated(Identity {
                id: "u1".into(),
                email: None,
                attachment_style: None,
            }),
            onboarding_complete,
            pending_callback: false,
            epoch: 0,
        }
    }

    #[test]
    fn test_route_table_roundtrip() {
        for route in Route::all() {
            assert_eq!(Route::from_path(route.path()), *route);
        }
        assert_eq!(Route::from_path("/settings/"), Route::Settings);
        assert_eq!(Route::from_path("/unknown"), Route::NotFound);
        assert_eq!(Route::from_path(""), Route::Splash);
    }

    #[test]
    fn test_gated_routes() {
        assert!(!Route::Splash.is_gated());
        assert!(!Route::Auth.is_gated());
        assert!(!Route::NotFound.is_gated());
        assert!(Route::Onboarding.is_gated());
        assert!(Route::Settings.is_gated());
    }

    #[test]
    fn test_sync_replaces_instead_of_pushing() {
        let mut shell = RouteShell::new();
        let mut nav = history("/auth?tab=x");

        let target = shell.sync(&signed_in(true), &mut nav);

        assert_eq!(target, Some(Route::Dashboard));
        assert_eq!(nav.location().as_str(), "http://localhost:5173/dashboard");
        assert_eq!(nav.entries().len(), 1);
        assert!(!nav.back());
    }

    #[test]
    fn test_sync_skips_unchanged_snapshot() {
        let mut shell = RouteShell::new();
        let mut nav = history("/");
        let state = signed_in(true);

        shell.sync(&state, &mut nav);
        RouteShell::open(&mut nav, Route::CheckIn);
        assert_eq!(shell.sync(&state, &mut nav), None);
        assert_eq!(nav.location().path(), "/check-in");
        assert_eq!(nav.replacements(), 1);
    }

    #[test]
    fn test_user_navigation_is_pushed() {
        let mut nav = history("/dashboard");
        RouteShell::open(&mut nav, Route::Progress);
        assert_eq!(nav.entries().len(), 2);
        assert!(nav.back());
        assert_eq!(nav.location().path(), "/dashboard");
    }

    #[test]
    fn test_render_unknown_shows_loading_on_gated_routes() {
        let state = SessionState::default();
        assert_eq!(RouteShell::render(&state, "/dashboard"), RenderDecision::Loading);
        assert_eq!(
            RouteShell::render(&state, "/auth"),
            RenderDecision::Screen(Route::Auth)
        );
    }

    #[test]
    fn test_render_anonymous_redirects_from_gated_routes() {
        let mut state = SessionState::initial(true, true, 0);
        state.auth = AuthStatus::Anonymous;
        assert_eq!(
            RouteShell::render(&state, "/settings"),
            RenderDecision::Redirect(Route::Auth)
        );

        state.splash_seen = false;
        assert_eq!(
            RouteShell::render(&state, "/settings"),
            RenderDecision::Redirect(Route::Splash)
        );
    }

    #[test]
    fn test_render_requires_onboarding_first() {
        let state = signed_in(false);
        assert_eq!(
            RouteShell::render(&state, "/check-in"),
            RenderDecision::Redirect(Route::Onboarding)
        );
        assert_eq!(
            RouteShell::render(&state, "/onboarding"),
            RenderDecision::Screen(Route::Onboarding)
        );
        assert_eq!(
            RouteShell::render(&signed_in(true), "/check-in"),
            RenderDecision::Screen(Route::CheckIn)
        );
    }
}
