//! One running client: session store, identity bridge, route shell, and
//! the feature services wired together.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::sync::watch;
use url::Url;

use crate::features::attachment::AttachmentStyle;
use crate::features::check_in::{self, CheckIn, CheckInReply};
use crate::features::progress::{self, ProgressReport};
use crate::features::self_chat;
use crate::providers::persistence::{
    ChatTurnRecord, DashboardProfile, Persistence, ProfileUpdate, best_effort,
};
use crate::providers::{IdentityProvider, TextGenerator, Turn};
use crate::session::shell::route_url;
use crate::session::{
    AuthNotice, IdentityBridge, MemoryHistory, Navigator, RenderDecision, Route, RouteShell,
    SessionState, SessionStore, SessionSubscription,
};

/// Outcome of a page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootReport {
    pub notice: Option<AuthNotice>,
    pub redirected: Option<Route>,
    pub decision: RenderDecision,
}

/// Dashboard header data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    pub attachment_style: AttachmentStyle,
    pub encouragement: &'static str,
    pub streak: u32,
}

pub struct App<P, D, G> {
    store: SessionStore,
    bridge: Arc<IdentityBridge<P>>,
    db: D,
    generator: G,
    shell: RouteShell,
    history: MemoryHistory,
    changes: watch::Receiver<SessionState>,
    subscription: Option<SessionSubscription>,
}

impl<P, D, G> App<P, D, G>
where
    P: IdentityProvider,
    D: Persistence,
    G: TextGenerator,
{
    pub fn new(
        store: SessionStore,
        provider: Arc<P>,
        db: D,
        generator: G,
        start: Url,
        auth_timeout: Duration,
    ) -> Self {
        let bridge = Arc::new(IdentityBridge::new(provider, store.clone(), auth_timeout));
        let changes = store.subscribe();
        Self {
            store,
            bridge,
            db,
            generator,
            shell: RouteShell::new(),
            history: MemoryHistory::new(start),
            changes,
            subscription: None,
        }
    }

    /// Page load: subscribe to provider events, settle auth, apply gating.
    pub async fn boot(&mut self) -> BootReport {
        if self.subscription.as_ref().is_none_or(|s| !s.is_active()) {
            self.subscription = Some(self.bridge.subscribe());
        }

        let notice = self.bridge.initialize(&mut self.history).await;
        let redirected = self.sync();
        let decision = self.render();
        tracing::info!(
            location = %self.location(),
            auth = self.store.snapshot().auth.label(),
            %decision,
            "Booted"
        );
        BootReport {
            notice,
            redirected,
            decision,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn bridge(&self) -> &Arc<IdentityBridge<P>> {
        &self.bridge
    }

    pub fn persistence(&self) -> &D {
        &self.db
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn history(&self) -> &MemoryHistory {
        &self.history
    }

    pub fn location(&self) -> &Url {
        self.history.location()
    }

    pub fn state(&self) -> SessionState {
        self.store.snapshot()
    }

    /// What the shell shows at the current location.
    pub fn render(&self) -> RenderDecision {
        RouteShell::render(&self.store.snapshot(), self.location().path())
    }

    /// Applies the resolver if the snapshot changed since the last sync.
    pub fn sync(&mut self) -> Option<Route> {
        self.changes.borrow_and_update();
        let state = self.store.snapshot();
        self.shell.sync(&state, &mut self.history)
    }

    /// User navigation.
    pub fn navigate(&mut self, route: Route) -> RenderDecision {
        RouteShell::open(&mut self.history, route);
        self.sync();
        self.render()
    }

    /// Waits up to `timeout` for a session change, then syncs.
    /// Returns `false` on timeout.
    pub async fn wait_for_change(&mut self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.changes.changed()).await {
            Ok(Ok(())) => {
                self.sync();
                true
            }
            Ok(Err(_)) | Err(_) => false,
        }
    }

    /// Stops the provider subscription.
    pub async fn shutdown(mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.shutdown().await;
        }
    }

    /// Signed-in user id.
    ///
    /// # Errors
    /// Returns an error when nobody is signed in.
    pub fn user_id(&self) -> Result<String> {
        self.store
            .snapshot()
            .auth
            .identity()
            .map(|identity| identity.id.clone())
            .ok_or_else(|| anyhow!("Not signed in. Run `uncling login` first."))
    }

    /// Profile style, then the locally cached one, then `Secure`.
    pub fn attachment_style(&self) -> AttachmentStyle {
        let state = self.store.snapshot();
        if let Some(style) = state.auth.identity().and_then(|i| i.attachment_style) {
            return style;
        }
        match self.store.attachment_style() {
            Ok(style) => style.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Attachment style flag unreadable");
                AttachmentStyle::default()
            }
        }
    }

    /// # Errors
    /// Returns an error if the flag cannot be written.
    pub fn dismiss_splash(&mut self) -> Result<Option<Route>> {
        self.store.set_splash_seen()?;
        Ok(self.sync())
    }

    /// Finishes the questionnaire: caches the style, writes the profile
    /// best-effort, marks onboarding done, and re-reads the identity.
    ///
    /// # Errors
    /// Returns an error if a durable flag cannot be written.
    pub async fn complete_onboarding(&mut self, style: AttachmentStyle) -> Result<Option<Route>> {
        self.store.set_attachment_style(style)?;
        if let Ok(user_id) = self.user_id() {
            best_effort(
                "update_profile",
                self.db.update_profile(&user_id, &ProfileUpdate::for_style(style)),
            )
            .await;
        }
        self.store.set_onboarding_complete()?;
        self.bridge.refresh_identity().await;
        tracing::info!(%style, "Onboarding complete");

        // A retake leaves the snapshot unchanged, so sync unconditionally.
        let state = self.store.snapshot();
        Ok(self.shell.force_sync(&state, &mut self.history))
    }

    /// Forgets the cached style and reopens the questionnaire.
    ///
    /// # Errors
    /// Returns an error if the flag cannot be removed.
    pub fn retake_quiz(&mut self) -> Result<RenderDecision> {
        self.store.clear_attachment_style()?;
        Ok(self.navigate(Route::Onboarding))
    }

    pub async fn sign_out(&mut self) -> Option<Route> {
        self.bridge.sign_out().await;
        self.sync()
    }

    /// Wipes local data and reloads from the root.
    ///
    /// # Errors
    /// Returns an error if the flag store cannot be cleared.
    pub async fn clear_data(&mut self) -> Result<BootReport> {
        self.bridge.sign_out().await;
        self.store.clear_all()?;
        let root = route_url(self.location(), Route::Splash);
        self.history.push(root);
        Ok(self.boot().await)
    }

    /// Style, encouragement, and streak for the dashboard header.
    pub async fn dashboard(&self) -> Dashboard {
        let profile = match self.user_id() {
            Ok(user_id) => best_effort("fetch_dashboard", self.db.fetch_dashboard(&user_id))
                .await
                .unwrap_or_default(),
            Err(_) => DashboardProfile::default(),
        };
        let attachment_style = profile
            .attachment_style
            .unwrap_or_else(|| self.attachment_style());
        Dashboard {
            attachment_style,
            encouragement: attachment_style.encouragement(),
            streak: profile.streak.unwrap_or_default(),
        }
    }

    /// Validates, reflects on, and saves a check-in.
    ///
    /// # Errors
    /// Returns an error if nobody is signed in or the check-in is invalid.
    pub async fn check_in(&self, mood: &str, intensity: u8) -> Result<CheckInReply> {
        let user_id = self.user_id()?;
        let entry = CheckIn::new(mood, intensity)?;
        let style = self.attachment_style();
        let reply = check_in::reflect(&self.generator, &entry, style).await;
        check_in::save(&self.db, &user_id, &entry, style).await;
        Ok(reply)
    }

    /// Saved self-chat history, greeting first.
    ///
    /// # Errors
    /// Returns an error if nobody is signed in.
    pub async fn chat_history(&self) -> Result<Vec<Turn>> {
        let user_id = self.user_id()?;
        Ok(self_chat::load_history(&self.db, &user_id).await)
    }

    /// One self-chat exchange.
    ///
    /// # Errors
    /// Returns an error if nobody is signed in or the message is blank.
    pub async fn secure_chat(&self, message: &str) -> Result<ChatTurnRecord> {
        let user_id = self.user_id()?;
        self_chat::exchange(&self.generator, &self.db, &user_id, message).await
    }

    /// Past entries plus a one-line insight over the check-in notes.
    ///
    /// # Errors
    /// Returns an error if nobody is signed in.
    pub async fn progress(&self) -> Result<(ProgressReport, String)> {
        let user_id = self.user_id()?;
        let report = ProgressReport::load(&self.db, &user_id).await;
        let insight = progress::insight(&self.generator, &report.check_in_notes()).await;
        Ok((report, insight))
    }
}
