//! Application state container and the login-flow driver.
//!
//! `App` owns the flow state machine, the session store, and the API
//! client. The state machine itself is pure (`crate::auth::flow`); this
//! module carries out its effects: spawning timers and network round trips
//! on tokio, rendering the scannable code, persisting the token, and
//! switching to the authenticated home view on hand-off.
//!
//! Spawned tasks never touch `App` directly. They send events through an
//! MPSC channel which the run loop drains every tick (`check_events`), so
//! all state transitions happen on the main loop. A task completing late,
//! after its correlation state was replaced or the mode switched, is
//! neutralized by the reducer's guards.

use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, LoginStatus};
use crate::auth::{
    CredentialStore, Effect, FlowError, FlowEvent, LoginFlow, LoginMode, PollOutcome, Session,
    SessionData,
};
use crate::config::Config;
use crate::models::UserProfile;
use crate::qr;

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the event channel between spawned tasks and the app
const CHANNEL_BUFFER_SIZE: usize = 32;

/// Maximum OpenID input length
const MAX_OPEN_ID_LEN: usize = 64;

/// Maximum password input length
const MAX_PASSWORD_LEN: usize = 128;

// ============================================================================
// UI state types
// ============================================================================

/// Overall application state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// The login view (QR code or password form, per the flow's mode)
    Login,
    /// The authenticated home view
    Home,
    Quitting,
}

/// Password form focus state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoginFocus {
    OpenId,
    Password,
    Button,
}

/// Events sent back to the main loop by spawned tasks.
enum AppEvent {
    /// An input for the login flow reducer
    Flow(FlowEvent),
    /// The post-login profile fetch completed
    Profile(Result<UserProfile, ApiError>),
}

// ============================================================================
// Input validation
// ============================================================================

/// Whether a character may be appended to the OpenID field
pub fn can_add_open_id_char(current_len: usize, c: char) -> bool {
    current_len < MAX_OPEN_ID_LEN && !c.is_control()
}

/// Whether a character may be appended to the password field
pub fn can_add_password_char(current_len: usize, c: char) -> bool {
    current_len < MAX_PASSWORD_LEN && !c.is_control()
}

// ============================================================================
// Main application struct
// ============================================================================

/// Main application state container
pub struct App {
    // Core services
    pub config: Config,
    pub session: Session,
    pub api: ApiClient,

    // Login flow
    pub state: AppState,
    pub flow: LoginFlow,

    // QR pane
    pub qr_code: Option<String>,
    pub login_error: Option<String>,
    pub status_message: Option<String>,

    // Password form state
    pub open_id_input: String,
    pub password_input: String,
    pub login_focus: LoginFocus,
    pub login_busy: bool,

    // Authenticated context
    pub profile: Option<UserProfile>,

    // Flow driver plumbing
    events_rx: mpsc::Receiver<AppEvent>,
    events_tx: mpsc::Sender<AppEvent>,
    poll_timer: Option<JoinHandle<()>>,
    refresh_timer: Option<JoinHandle<()>>,
}

impl App {
    /// Create a new application instance
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };

        let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));

        // Restore a stored session if one exists. No expiry check: the
        // token is trusted until the platform rejects it.
        let mut session = Session::new(cache_dir);
        if let Err(e) = session.load() {
            warn!(error = %e, "Failed to load session");
        }

        let mut api = ApiClient::new(&config)?;
        if let Some(token) = session.token() {
            api.set_token(token.to_string());
        }

        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        // Prefill the form from env vars or the last successful login
        let open_id_input = std::env::var("INKDESK_OPEN_ID")
            .ok()
            .or_else(|| config.last_open_id.clone())
            .or_else(|| session.open_id().map(str::to_string))
            .unwrap_or_default();
        let mut password_input = std::env::var("INKDESK_PASSWORD").unwrap_or_default();
        if password_input.is_empty()
            && !open_id_input.is_empty()
            && CredentialStore::has_credentials(&open_id_input)
        {
            match CredentialStore::get_password(&open_id_input) {
                Ok(stored) => password_input = stored,
                Err(e) => debug!(error = %e, "No stored password for prefill"),
            }
        }

        Ok(Self {
            config,
            session,
            api,

            state: AppState::Login,
            flow: LoginFlow::default(),

            qr_code: None,
            login_error: None,
            status_message: None,

            open_id_input,
            password_input,
            login_focus: LoginFocus::OpenId,
            login_busy: false,

            profile: None,

            events_rx: rx,
            events_tx: tx,
            poll_timer: None,
            refresh_timer: None,
        })
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Whether a stored session token exists
    pub fn is_authenticated(&self) -> bool {
        self.session.token().is_some()
    }

    /// Begin the login flow in the requested mode
    pub fn start_login(&mut self, password_mode: bool) {
        self.state = AppState::Login;
        if password_mode {
            self.login_focus = if self.open_id_input.is_empty() {
                LoginFocus::OpenId
            } else {
                LoginFocus::Password
            };
            self.dispatch(FlowEvent::SwitchToPassword);
        } else {
            self.dispatch(FlowEvent::StartQr);
        }
    }

    /// Switch from the QR code to the password form
    pub fn switch_to_password(&mut self) {
        self.login_error = None;
        self.login_busy = false;
        self.login_focus = if self.open_id_input.is_empty() {
            LoginFocus::OpenId
        } else {
            LoginFocus::Password
        };
        self.dispatch(FlowEvent::SwitchToPassword);
    }

    /// Switch from the password form back to the QR code
    pub fn switch_to_qr(&mut self) {
        self.login_error = None;
        // A password round trip still in flight is orphaned by the mode
        // switch; its result will be dropped, so unstick the form now.
        self.login_busy = false;
        self.dispatch(FlowEvent::SwitchToQr);
    }

    /// Manually request a fresh code (also recovers from a failed one)
    pub fn refresh_code(&mut self) {
        self.login_error = None;
        self.dispatch(FlowEvent::StartQr);
    }

    /// Submit the password form
    pub fn submit_password_form(&mut self) {
        if self.login_busy {
            return;
        }
        self.login_error = None;
        self.dispatch(FlowEvent::SubmitPassword {
            open_id: self.open_id_input.clone(),
            password: self.password_input.clone(),
        });
    }

    /// Drop the session and return to the login flow
    pub fn sign_out(&mut self) {
        info!("Signing out");
        if let Err(e) = self.session.clear() {
            warn!(error = %e, "Failed to clear session");
        }
        self.api.clear_token();
        self.profile = None;
        self.status_message = None;
        self.flow = LoginFlow::default();
        self.start_login(self.config.prefer_password_login);
    }

    /// Enter the authenticated home view and fetch the profile
    pub fn enter_home(&mut self) {
        self.state = AppState::Home;
        self.status_message = Some("Loading profile...".to_string());

        let api = self.api.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = api.fetch_profile().await;
            Self::send_event(&tx, AppEvent::Profile(result)).await;
        });
    }

    /// Cancel the flow and quit
    pub fn quit(&mut self) {
        if !self.flow.is_authenticated() {
            self.dispatch(FlowEvent::Cancel);
        }
        self.stop_timers();
        self.state = AppState::Quitting;
    }

    // =========================================================================
    // Flow driving
    // =========================================================================

    /// Drain events sent by spawned tasks. Called from the run loop every
    /// tick, after input handling.
    pub fn check_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                AppEvent::Flow(flow_event) => self.dispatch(flow_event),
                AppEvent::Profile(result) => self.on_profile_result(result),
            }
        }
    }

    /// Feed one event through the reducer and carry out its effects.
    ///
    /// Synchronous effects (rendering) produce follow-up events that are
    /// processed in the same call; async work reports back via the channel.
    pub fn dispatch(&mut self, event: FlowEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(ev) = queue.pop_front() {
            for effect in self.flow.handle(ev) {
                self.run_effect(effect, &mut queue);
            }
        }
    }

    fn run_effect(&mut self, effect: Effect, queue: &mut VecDeque<FlowEvent>) {
        match effect {
            Effect::RequestCode => {
                self.qr_code = None;
                self.status_message = Some("Requesting a login code...".to_string());

                let api = self.api.clone();
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let event = match api.get_login_url().await {
                        Ok(challenge) => FlowEvent::CodeIssued {
                            url: challenge.authorize_url,
                            state: challenge.state,
                        },
                        Err(e) => FlowEvent::CodeIssueFailed {
                            error: e.to_string(),
                        },
                    };
                    Self::send_event(&tx, AppEvent::Flow(event)).await;
                });
            }

            Effect::RenderCode { url, state } => match qr::render_scannable_code(&url) {
                Ok(rendered) => {
                    self.qr_code = Some(rendered);
                    self.status_message = None;
                    queue.push_back(FlowEvent::Rendered { state });
                }
                Err(e) => {
                    warn!(error = %e, "Could not render login code");
                    queue.push_back(FlowEvent::RenderFailed {
                        state,
                        error: e.to_string(),
                    });
                }
            },

            Effect::StartTimers { state } => self.start_timers(state),

            Effect::StopTimers => self.stop_timers(),

            Effect::Poll { state } => {
                let api = self.api.clone();
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let outcome = match api.check_login_status(&state).await {
                        Ok(LoginStatus::Pending) => PollOutcome::Pending,
                        Ok(LoginStatus::Authorized(token)) => PollOutcome::Token(token),
                        Err(e) => {
                            debug!(error = %e, "Status check failed");
                            PollOutcome::TransportError(e.to_string())
                        }
                    };
                    Self::send_event(&tx, AppEvent::Flow(FlowEvent::PollResult { state, outcome }))
                        .await;
                });
            }

            Effect::SubmitLogin { open_id, password } => {
                self.login_busy = true;
                self.status_message = Some("Signing in...".to_string());

                let api = self.api.clone();
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = match api.login_with_password(&open_id, &password).await {
                        Ok(token) => Ok(token),
                        Err(e) if e.is_rejection() => {
                            Err(FlowError::Auth("Invalid OpenID or password".to_string()))
                        }
                        Err(e) => Err(FlowError::Transport(e.to_string())),
                    };
                    Self::send_event(&tx, AppEvent::Flow(FlowEvent::PasswordResult { result }))
                        .await;
                });
            }

            Effect::PersistToken { token } => self.persist_token(token),

            Effect::HandOff { token } => {
                info!("Authenticated, handing off");
                self.api.set_token(token);
                self.login_busy = false;
                self.login_error = None;
                self.qr_code = None;
                self.password_input.clear();
                self.enter_home();
            }

            Effect::Report { error } => {
                warn!(error = %error, "Login flow error");
                self.login_busy = false;
                self.status_message = None;
                self.login_error = Some(error.to_string());
            }
        }
    }

    fn persist_token(&mut self, token: String) {
        let open_id = match self.flow.mode() {
            LoginMode::Password => {
                let trimmed = self.open_id_input.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            LoginMode::Qr => None,
        };

        if let Some(ref open_id) = open_id {
            // Remember working password-mode credentials for next time
            if let Err(e) = CredentialStore::store(open_id, self.password_input.trim()) {
                warn!(error = %e, "Failed to store credentials");
            }
            self.config.last_open_id = Some(open_id.clone());
            if let Err(e) = self.config.save() {
                warn!(error = %e, "Failed to save config");
            }
        }

        self.session.update(SessionData::new(token, open_id));
        if let Err(e) = self.session.save() {
            warn!(error = %e, "Failed to save session");
        }
    }

    fn on_profile_result(&mut self, result: Result<UserProfile, ApiError>) {
        match result {
            Ok(profile) => {
                debug!(nickname = %profile.nickname, "Profile loaded");
                self.status_message = None;
                self.profile = Some(profile);
            }
            Err(ApiError::Unauthorized) => {
                // Post-hoc token rejection: the stored token is dead.
                warn!("Stored token rejected by the platform");
                self.sign_out();
                self.status_message = Some("Session expired - please sign in again".to_string());
            }
            Err(e) => {
                warn!(error = %e, "Failed to load profile");
                self.status_message = Some(format!("Could not load profile: {}", e));
            }
        }
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Arm the poll ticker and the hard-refresh timer for one correlation
    /// state. Any previously armed timers are stopped first.
    fn start_timers(&mut self, state: String) {
        self.stop_timers();

        let poll_interval = self.flow.config().poll_interval;
        let refresh_interval = self.flow.config().refresh_interval;

        let tx = self.events_tx.clone();
        self.poll_timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.tick().await; // first tick completes immediately
            loop {
                ticker.tick().await;
                if tx.send(AppEvent::Flow(FlowEvent::PollTick)).await.is_err() {
                    break;
                }
            }
        }));

        let tx = self.events_tx.clone();
        self.refresh_timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let due = FlowEvent::RefreshDue {
                    state: state.clone(),
                };
                if tx.send(AppEvent::Flow(due)).await.is_err() {
                    break;
                }
            }
        }));
    }

    /// Disarm both timers. Callbacks already queued in the channel are
    /// neutralized by the reducer's state and correlation guards.
    fn stop_timers(&mut self) {
        if let Some(handle) = self.poll_timer.take() {
            handle.abort();
        }
        if let Some(handle) = self.refresh_timer.take() {
            handle.abort();
        }
    }

    /// Helper to send an event, logging if the channel is gone
    async fn send_event(tx: &mpsc::Sender<AppEvent>, event: AppEvent) {
        if tx.send(event).await.is_err() {
            debug!("Event channel closed, dropping event");
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.stop_timers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Input validation tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_can_add_open_id_char() {
        // Valid chars within length
        assert!(can_add_open_id_char(0, 'a'));
        assert!(can_add_open_id_char(63, 'z'));
        // Exceeds max length
        assert!(!can_add_open_id_char(64, 'a'));
        assert!(!can_add_open_id_char(100, 'a'));
        // Control characters rejected
        assert!(!can_add_open_id_char(0, '\x00'));
        assert!(!can_add_open_id_char(0, '\n'));
        assert!(!can_add_open_id_char(0, '\t'));
    }

    #[test]
    fn test_can_add_password_char() {
        // Valid chars within length
        assert!(can_add_password_char(0, 'a'));
        assert!(can_add_password_char(127, '!'));
        // Exceeds max length
        assert!(!can_add_password_char(128, 'a'));
        assert!(!can_add_password_char(200, 'a'));
        // Control characters rejected
        assert!(!can_add_password_char(0, '\x00'));
        assert!(!can_add_password_char(0, '\r'));
    }
}
