//! Login flow state machine.
//!
//! Owns every piece of login-session state: the active correlation state,
//! the poll-attempt counter, the transport-error counter, and the QR vs
//! password mode. The machine is a pure reducer - `handle` consumes one
//! `FlowEvent` and returns the `Effect`s the driver must perform (start or
//! stop timers, hit the network, render a code, persist the token). Nothing
//! in this module touches a clock, a socket, or the terminal, so every
//! transition is unit-testable without tokio.
//!
//! The driver side (timers, spawned requests, rendering) lives in
//! `crate::app`.

use std::time::Duration;

use thiserror::Error;

/// How many consecutive PENDING polls before the code is regenerated.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 30;

/// Cadence of the scan-status poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Hard-refresh cadence. A code is replaced at this age no matter how the
/// polling has been going, so a displayed code can never go stale.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(55_000);

/// How many consecutive transport failures are tolerated before the user is
/// told and the code regenerated. Transport failures are deliberately not
/// counted as scan attempts.
pub const DEFAULT_MAX_TRANSPORT_ERRORS: u32 = 15;

/// One automatic regeneration after a render failure; a second consecutive
/// failure parks the flow in `Failed` until the user acts.
const RENDER_RETRY_LIMIT: u32 = 2;

/// Tuning knobs for the login flow.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub max_poll_attempts: u32,
    pub poll_interval: Duration,
    pub refresh_interval: Duration,
    pub max_transport_errors: u32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            max_transport_errors: DEFAULT_MAX_TRANSPORT_ERRORS,
        }
    }
}

/// Which login path the user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    Qr,
    Password,
}

/// Where the flow currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Nothing in flight. Password mode idles here between submissions.
    Idle,
    /// A login challenge has been requested; waiting for issue + render.
    AwaitingScan,
    /// Code on screen, status polling running.
    Polling,
    /// Token obtained and handed off. The machine is inert from here on.
    Authenticated,
    /// Challenge issue or render failed twice; waiting for the user.
    Failed,
}

/// Outcome of one status poll against the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Not scanned/confirmed yet.
    Pending,
    /// Scan confirmed; the platform resolved the correlation state.
    Token(String),
    /// The check itself failed (network, bad response).
    TransportError(String),
}

/// Inputs to the reducer. Events produced by async work carry the
/// correlation state they were issued under so late arrivals for a replaced
/// code can be dropped.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// Enter QR mode, or manually refresh the code.
    StartQr,
    /// The platform issued a login URL and correlation state.
    CodeIssued { url: String, state: String },
    /// The platform could not issue a challenge.
    CodeIssueFailed { error: String },
    /// The code for `state` is on screen.
    Rendered { state: String },
    /// The code for `state` could not be rendered.
    RenderFailed { state: String, error: String },
    /// The poll timer fired.
    PollTick,
    /// A status check completed.
    PollResult { state: String, outcome: PollOutcome },
    /// The hard-refresh timer for `state` fired.
    RefreshDue { state: String },
    /// User switched to the password form.
    SwitchToPassword,
    /// User switched back to the QR code.
    SwitchToQr,
    /// User submitted the password form.
    SubmitPassword { open_id: String, password: String },
    /// The password login round trip completed.
    PasswordResult { result: Result<String, FlowError> },
    /// The hosting view is going away; stop everything.
    Cancel,
}

/// Side effects for the driver to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Ask the platform for a fresh login URL + correlation state.
    RequestCode,
    /// Render `url` as a scannable code; report back with
    /// `Rendered`/`RenderFailed` carrying `state`.
    RenderCode { url: String, state: String },
    /// Arm the poll ticker and the hard-refresh timer for `state`.
    StartTimers { state: String },
    /// Disarm both timers.
    StopTimers,
    /// Check the scan status of `state` once.
    Poll { state: String },
    /// Perform the password login round trip.
    SubmitLogin { open_id: String, password: String },
    /// Write the session token to the token store.
    PersistToken { token: String },
    /// Hand the authenticated session over to the rest of the app.
    /// Emitted exactly once per flow.
    HandOff { token: String },
    /// Surface a recoverable error to the user.
    Report { error: FlowError },
}

/// Errors surfaced by the flow. All recoverable; none abort the controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    /// Empty credential field, caught before any network call.
    #[error("{0}")]
    Validation(String),
    /// The login URL could not be rendered as a code.
    #[error("Could not display the login code: {0}")]
    Render(String),
    /// The platform failed to issue a login challenge.
    #[error("Could not get a login code: {0}")]
    Challenge(String),
    /// The platform rejected the credentials.
    #[error("Sign-in failed: {0}")]
    Auth(String),
    /// Network failure reaching the platform.
    #[error("Network trouble: {0}")]
    Transport(String),
}

/// The login flow controller.
///
/// At most one correlation state is active at a time; issuing a new one
/// invalidates the old, and the reducer drops any event that carries a
/// correlation state other than the current one.
pub struct LoginFlow {
    config: FlowConfig,
    mode: LoginMode,
    state: FlowState,
    correlation: Option<String>,
    poll_attempts: u32,
    transport_errors: u32,
    render_failures: u32,
}

impl LoginFlow {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            config,
            mode: LoginMode::Qr,
            state: FlowState::Idle,
            correlation: None,
            poll_attempts: 0,
            transport_errors: 0,
            render_failures: 0,
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn mode(&self) -> LoginMode {
        self.mode
    }

    pub fn poll_attempts(&self) -> u32 {
        self.poll_attempts
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == FlowState::Authenticated
    }

    /// Feed one event through the machine and collect the effects the
    /// driver must perform.
    pub fn handle(&mut self, event: FlowEvent) -> Vec<Effect> {
        // Once authenticated the controller is inert: no timer callback,
        // late poll result, or user input may produce further effects.
        if self.state == FlowState::Authenticated {
            return Vec::new();
        }

        match event {
            FlowEvent::StartQr => {
                self.mode = LoginMode::Qr;
                self.render_failures = 0;
                self.regenerate()
            }

            FlowEvent::CodeIssued { url, state } => {
                if self.mode != LoginMode::Qr || self.state != FlowState::AwaitingScan {
                    return Vec::new();
                }
                self.correlation = Some(state.clone());
                vec![Effect::RenderCode { url, state }]
            }

            FlowEvent::CodeIssueFailed { error } => {
                if self.state != FlowState::AwaitingScan {
                    return Vec::new();
                }
                self.state = FlowState::Failed;
                vec![Effect::Report {
                    error: FlowError::Challenge(error),
                }]
            }

            FlowEvent::Rendered { state } => {
                if !self.is_current(&state) || self.state != FlowState::AwaitingScan {
                    return Vec::new();
                }
                self.state = FlowState::Polling;
                self.render_failures = 0;
                vec![Effect::StartTimers { state }]
            }

            FlowEvent::RenderFailed { state, error } => {
                if !self.is_current(&state) || self.state != FlowState::AwaitingScan {
                    return Vec::new();
                }
                self.render_failures += 1;
                let report = Effect::Report {
                    error: FlowError::Render(error),
                };
                if self.render_failures >= RENDER_RETRY_LIMIT {
                    self.state = FlowState::Failed;
                    self.correlation = None;
                    return vec![report];
                }
                let mut effects = vec![report];
                effects.extend(self.regenerate());
                effects
            }

            FlowEvent::PollTick => match (&self.state, &self.correlation) {
                (FlowState::Polling, Some(state)) => vec![Effect::Poll {
                    state: state.clone(),
                }],
                _ => Vec::new(),
            },

            FlowEvent::PollResult { state, outcome } => {
                if !self.is_current(&state) || self.state != FlowState::Polling {
                    return Vec::new();
                }
                self.on_poll_outcome(outcome)
            }

            FlowEvent::RefreshDue { state } => {
                if !self.is_current(&state) || self.state != FlowState::Polling {
                    return Vec::new();
                }
                self.regenerate()
            }

            FlowEvent::SwitchToPassword => {
                self.mode = LoginMode::Password;
                self.state = FlowState::Idle;
                self.correlation = None;
                self.poll_attempts = 0;
                self.transport_errors = 0;
                vec![Effect::StopTimers]
            }

            FlowEvent::SwitchToQr => {
                self.mode = LoginMode::Qr;
                self.render_failures = 0;
                self.regenerate()
            }

            FlowEvent::SubmitPassword { open_id, password } => {
                if self.mode != LoginMode::Password {
                    return Vec::new();
                }
                let open_id = open_id.trim().to_string();
                let password = password.trim().to_string();
                if open_id.is_empty() {
                    return vec![Effect::Report {
                        error: FlowError::Validation("Please enter your OpenID".to_string()),
                    }];
                }
                if password.is_empty() {
                    return vec![Effect::Report {
                        error: FlowError::Validation("Please enter your password".to_string()),
                    }];
                }
                vec![Effect::SubmitLogin { open_id, password }]
            }

            FlowEvent::PasswordResult { result } => {
                if self.mode != LoginMode::Password {
                    return Vec::new();
                }
                match result {
                    Ok(token) => self.authenticate(token),
                    Err(error) => vec![Effect::Report { error }],
                }
            }

            FlowEvent::Cancel => {
                self.state = FlowState::Idle;
                self.correlation = None;
                self.poll_attempts = 0;
                self.transport_errors = 0;
                vec![Effect::StopTimers]
            }
        }
    }

    fn on_poll_outcome(&mut self, outcome: PollOutcome) -> Vec<Effect> {
        match outcome {
            PollOutcome::Pending => {
                self.poll_attempts += 1;
                if self.poll_attempts >= self.config.max_poll_attempts {
                    return self.regenerate();
                }
                Vec::new()
            }
            PollOutcome::Token(token) => self.authenticate(token),
            PollOutcome::TransportError(message) => {
                // Tolerated as "not scanned yet", but counted on its own so
                // a dead network cannot stay invisible forever.
                self.transport_errors += 1;
                if self.transport_errors >= self.config.max_transport_errors {
                    let mut effects = vec![Effect::Report {
                        error: FlowError::Transport(message),
                    }];
                    effects.extend(self.regenerate());
                    return effects;
                }
                Vec::new()
            }
        }
    }

    /// Invalidate the current correlation state and ask for a fresh code.
    /// Both counters reset: each code gets the full allowance of attempts.
    fn regenerate(&mut self) -> Vec<Effect> {
        self.correlation = None;
        self.poll_attempts = 0;
        self.transport_errors = 0;
        self.state = FlowState::AwaitingScan;
        vec![Effect::StopTimers, Effect::RequestCode]
    }

    fn authenticate(&mut self, token: String) -> Vec<Effect> {
        self.state = FlowState::Authenticated;
        self.correlation = None;
        vec![
            Effect::StopTimers,
            Effect::PersistToken {
                token: token.clone(),
            },
            Effect::HandOff { token },
        ]
    }

    fn is_current(&self, state: &str) -> bool {
        self.correlation.as_deref() == Some(state)
    }
}

impl Default for LoginFlow {
    fn default() -> Self {
        Self::new(FlowConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> LoginFlow {
        LoginFlow::default()
    }

    /// Drive a flow to the Polling state with correlation state `state`.
    fn polling_flow(state: &str) -> LoginFlow {
        let mut f = flow();
        f.handle(FlowEvent::StartQr);
        f.handle(FlowEvent::CodeIssued {
            url: format!("https://auth.example.com/scan?s={state}"),
            state: state.to_string(),
        });
        f.handle(FlowEvent::Rendered {
            state: state.to_string(),
        });
        assert_eq!(f.state(), FlowState::Polling);
        f
    }

    fn pending(f: &mut LoginFlow, state: &str) -> Vec<Effect> {
        f.handle(FlowEvent::PollResult {
            state: state.to_string(),
            outcome: PollOutcome::Pending,
        })
    }

    fn has_request_code(effects: &[Effect]) -> bool {
        effects.contains(&Effect::RequestCode)
    }

    fn hand_off_count(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::HandOff { .. }))
            .count()
    }

    // -------------------------------------------------------------------------
    // QR happy path
    // -------------------------------------------------------------------------

    #[test]
    fn test_start_qr_requests_code() {
        let mut f = flow();
        let effects = f.handle(FlowEvent::StartQr);
        assert!(has_request_code(&effects));
        assert_eq!(f.state(), FlowState::AwaitingScan);
    }

    #[test]
    fn test_code_issued_then_rendered_starts_polling() {
        let mut f = flow();
        f.handle(FlowEvent::StartQr);

        let effects = f.handle(FlowEvent::CodeIssued {
            url: "https://auth.example.com/scan?s=S1".to_string(),
            state: "S1".to_string(),
        });
        assert_eq!(
            effects,
            vec![Effect::RenderCode {
                url: "https://auth.example.com/scan?s=S1".to_string(),
                state: "S1".to_string(),
            }]
        );

        let effects = f.handle(FlowEvent::Rendered {
            state: "S1".to_string(),
        });
        assert_eq!(
            effects,
            vec![Effect::StartTimers {
                state: "S1".to_string()
            }]
        );
        assert_eq!(f.state(), FlowState::Polling);
    }

    #[test]
    fn test_poll_tick_polls_current_state() {
        let mut f = polling_flow("S1");
        let effects = f.handle(FlowEvent::PollTick);
        assert_eq!(
            effects,
            vec![Effect::Poll {
                state: "S1".to_string()
            }]
        );
    }

    #[test]
    fn test_token_persists_hands_off_and_stops_timers() {
        let mut f = polling_flow("S1");
        pending(&mut f, "S1");
        pending(&mut f, "S1");

        let effects = f.handle(FlowEvent::PollResult {
            state: "S1".to_string(),
            outcome: PollOutcome::Token("abc".to_string()),
        });
        assert_eq!(
            effects,
            vec![
                Effect::StopTimers,
                Effect::PersistToken {
                    token: "abc".to_string()
                },
                Effect::HandOff {
                    token: "abc".to_string()
                },
            ]
        );
        assert!(f.is_authenticated());
    }

    #[test]
    fn test_flow_inert_after_authentication() {
        let mut f = polling_flow("S1");
        f.handle(FlowEvent::PollResult {
            state: "S1".to_string(),
            outcome: PollOutcome::Token("abc".to_string()),
        });

        // No timer callback or user input may produce effects afterwards.
        assert!(f.handle(FlowEvent::PollTick).is_empty());
        assert!(f
            .handle(FlowEvent::RefreshDue {
                state: "S1".to_string()
            })
            .is_empty());
        assert!(f
            .handle(FlowEvent::PollResult {
                state: "S1".to_string(),
                outcome: PollOutcome::Token("def".to_string()),
            })
            .is_empty());
        assert!(f.handle(FlowEvent::StartQr).is_empty());
    }

    #[test]
    fn test_hand_off_fires_exactly_once() {
        let mut f = polling_flow("S1");
        let first = f.handle(FlowEvent::PollResult {
            state: "S1".to_string(),
            outcome: PollOutcome::Token("abc".to_string()),
        });
        let second = f.handle(FlowEvent::PollResult {
            state: "S1".to_string(),
            outcome: PollOutcome::Token("abc".to_string()),
        });
        assert_eq!(hand_off_count(&first), 1);
        assert_eq!(hand_off_count(&second), 0);
    }

    // -------------------------------------------------------------------------
    // Attempt counting and regeneration
    // -------------------------------------------------------------------------

    #[test]
    fn test_pending_below_cap_keeps_polling() {
        let mut f = polling_flow("S1");
        for _ in 0..(DEFAULT_MAX_POLL_ATTEMPTS - 1) {
            let effects = pending(&mut f, "S1");
            assert!(effects.is_empty());
        }
        assert_eq!(f.state(), FlowState::Polling);
        assert_eq!(f.poll_attempts(), DEFAULT_MAX_POLL_ATTEMPTS - 1);
    }

    #[test]
    fn test_attempt_exhaustion_regenerates() {
        let mut f = polling_flow("S1");
        for _ in 0..(DEFAULT_MAX_POLL_ATTEMPTS - 1) {
            pending(&mut f, "S1");
        }
        // The 30th consecutive PENDING forces a new code without a token.
        let effects = pending(&mut f, "S1");
        assert!(effects.contains(&Effect::StopTimers));
        assert!(has_request_code(&effects));
        assert_eq!(f.state(), FlowState::AwaitingScan);
        assert_eq!(f.poll_attempts(), 0);
    }

    #[test]
    fn test_attempts_reset_on_new_correlation_state() {
        let mut f = polling_flow("S1");
        for _ in 0..5 {
            pending(&mut f, "S1");
        }
        assert_eq!(f.poll_attempts(), 5);

        f.handle(FlowEvent::RefreshDue {
            state: "S1".to_string(),
        });
        f.handle(FlowEvent::CodeIssued {
            url: "https://auth.example.com/scan?s=S2".to_string(),
            state: "S2".to_string(),
        });
        f.handle(FlowEvent::Rendered {
            state: "S2".to_string(),
        });
        assert_eq!(f.poll_attempts(), 0);

        pending(&mut f, "S2");
        assert_eq!(f.poll_attempts(), 1);
    }

    #[test]
    fn test_hard_refresh_regenerates_regardless_of_attempts() {
        let mut f = polling_flow("S1");
        for _ in 0..5 {
            pending(&mut f, "S1");
        }

        // Refresh fires well below the attempt cap and still forces a
        // regeneration.
        let effects = f.handle(FlowEvent::RefreshDue {
            state: "S1".to_string(),
        });
        assert!(effects.contains(&Effect::StopTimers));
        assert!(has_request_code(&effects));
        assert_eq!(f.poll_attempts(), 0);

        // A late poll against the invalidated S1 is a no-op.
        f.handle(FlowEvent::CodeIssued {
            url: "https://auth.example.com/scan?s=S2".to_string(),
            state: "S2".to_string(),
        });
        f.handle(FlowEvent::Rendered {
            state: "S2".to_string(),
        });
        let stale = pending(&mut f, "S1");
        assert!(stale.is_empty());
        assert_eq!(f.poll_attempts(), 0);
    }

    #[test]
    fn test_stale_refresh_ignored() {
        let mut f = polling_flow("S1");
        f.handle(FlowEvent::RefreshDue {
            state: "S1".to_string(),
        });
        f.handle(FlowEvent::CodeIssued {
            url: "https://auth.example.com/scan?s=S2".to_string(),
            state: "S2".to_string(),
        });
        f.handle(FlowEvent::Rendered {
            state: "S2".to_string(),
        });

        // The old code's refresh timer firing late must not replace S2.
        let effects = f.handle(FlowEvent::RefreshDue {
            state: "S1".to_string(),
        });
        assert!(effects.is_empty());
        assert_eq!(f.state(), FlowState::Polling);
    }

    #[test]
    fn test_stale_token_ignored() {
        let mut f = polling_flow("S1");
        f.handle(FlowEvent::RefreshDue {
            state: "S1".to_string(),
        });

        // Even a token for a replaced correlation state is dropped: only
        // the active code may resolve the session.
        let effects = f.handle(FlowEvent::PollResult {
            state: "S1".to_string(),
            outcome: PollOutcome::Token("abc".to_string()),
        });
        assert!(effects.is_empty());
        assert!(!f.is_authenticated());
    }

    // -------------------------------------------------------------------------
    // Transport errors
    // -------------------------------------------------------------------------

    #[test]
    fn test_transport_error_not_counted_as_attempt() {
        let mut f = polling_flow("S1");
        pending(&mut f, "S1");

        let effects = f.handle(FlowEvent::PollResult {
            state: "S1".to_string(),
            outcome: PollOutcome::TransportError("connection reset".to_string()),
        });
        assert!(effects.is_empty());
        assert_eq!(f.poll_attempts(), 1);
        assert_eq!(f.state(), FlowState::Polling);
    }

    #[test]
    fn test_transport_error_cap_surfaces_and_regenerates() {
        let mut f = polling_flow("S1");
        for _ in 0..(DEFAULT_MAX_TRANSPORT_ERRORS - 1) {
            let effects = f.handle(FlowEvent::PollResult {
                state: "S1".to_string(),
                outcome: PollOutcome::TransportError("timeout".to_string()),
            });
            assert!(effects.is_empty());
        }

        let effects = f.handle(FlowEvent::PollResult {
            state: "S1".to_string(),
            outcome: PollOutcome::TransportError("timeout".to_string()),
        });
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Report {
                error: FlowError::Transport(_)
            }
        )));
        assert!(has_request_code(&effects));
        assert_eq!(f.state(), FlowState::AwaitingScan);
    }

    // -------------------------------------------------------------------------
    // Mode switching and cancellation
    // -------------------------------------------------------------------------

    #[test]
    fn test_switch_to_password_cancels_timers() {
        let mut f = polling_flow("S1");
        let effects = f.handle(FlowEvent::SwitchToPassword);
        assert_eq!(effects, vec![Effect::StopTimers]);
        assert_eq!(f.mode(), LoginMode::Password);
        assert_eq!(f.state(), FlowState::Idle);

        // Late timer callbacks after the switch are no-ops.
        assert!(f.handle(FlowEvent::PollTick).is_empty());
        assert!(pending(&mut f, "S1").is_empty());
        assert!(f
            .handle(FlowEvent::RefreshDue {
                state: "S1".to_string()
            })
            .is_empty());
    }

    #[test]
    fn test_switch_back_to_qr_regenerates() {
        let mut f = polling_flow("S1");
        f.handle(FlowEvent::SwitchToPassword);
        let effects = f.handle(FlowEvent::SwitchToQr);
        assert!(has_request_code(&effects));
        assert_eq!(f.mode(), LoginMode::Qr);
        assert_eq!(f.state(), FlowState::AwaitingScan);
    }

    #[test]
    fn test_cancel_stops_timers_and_discards_state() {
        let mut f = polling_flow("S1");
        let effects = f.handle(FlowEvent::Cancel);
        assert_eq!(effects, vec![Effect::StopTimers]);
        assert_eq!(f.state(), FlowState::Idle);

        // Pending callbacks that were already in flight do nothing.
        assert!(f.handle(FlowEvent::PollTick).is_empty());
        assert!(pending(&mut f, "S1").is_empty());
    }

    // -------------------------------------------------------------------------
    // Password mode
    // -------------------------------------------------------------------------

    #[test]
    fn test_password_validation_fails_fast() {
        let mut f = flow();
        f.handle(FlowEvent::SwitchToPassword);

        let effects = f.handle(FlowEvent::SubmitPassword {
            open_id: String::new(),
            password: "x".to_string(),
        });
        assert_eq!(
            effects,
            vec![Effect::Report {
                error: FlowError::Validation("Please enter your OpenID".to_string())
            }]
        );

        let effects = f.handle(FlowEvent::SubmitPassword {
            open_id: "x".to_string(),
            password: "   ".to_string(),
        });
        assert_eq!(
            effects,
            vec![Effect::Report {
                error: FlowError::Validation("Please enter your password".to_string())
            }]
        );
    }

    #[test]
    fn test_password_submit_trims_and_logs_in() {
        let mut f = flow();
        f.handle(FlowEvent::SwitchToPassword);

        let effects = f.handle(FlowEvent::SubmitPassword {
            open_id: "  open-123  ".to_string(),
            password: " hunter2 ".to_string(),
        });
        assert_eq!(
            effects,
            vec![Effect::SubmitLogin {
                open_id: "open-123".to_string(),
                password: "hunter2".to_string(),
            }]
        );

        let effects = f.handle(FlowEvent::PasswordResult {
            result: Ok("tok-9".to_string()),
        });
        assert_eq!(hand_off_count(&effects), 1);
        assert!(effects.contains(&Effect::PersistToken {
            token: "tok-9".to_string()
        }));
        assert!(f.is_authenticated());
    }

    #[test]
    fn test_password_rejection_reprompts() {
        let mut f = flow();
        f.handle(FlowEvent::SwitchToPassword);

        let effects = f.handle(FlowEvent::PasswordResult {
            result: Err(FlowError::Auth("Invalid OpenID or password".to_string())),
        });
        assert_eq!(
            effects,
            vec![Effect::Report {
                error: FlowError::Auth("Invalid OpenID or password".to_string())
            }]
        );
        assert_eq!(f.state(), FlowState::Idle);

        // The user can immediately try again.
        let effects = f.handle(FlowEvent::SubmitPassword {
            open_id: "open-123".to_string(),
            password: "hunter2".to_string(),
        });
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::SubmitLogin { .. })));
    }

    // -------------------------------------------------------------------------
    // Render and challenge failures
    // -------------------------------------------------------------------------

    #[test]
    fn test_render_failure_retries_once_then_waits() {
        let mut f = flow();
        f.handle(FlowEvent::StartQr);
        f.handle(FlowEvent::CodeIssued {
            url: "nonsense".to_string(),
            state: "S1".to_string(),
        });

        // First failure: reported, then automatically regenerated.
        let effects = f.handle(FlowEvent::RenderFailed {
            state: "S1".to_string(),
            error: "unsupported scheme".to_string(),
        });
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Report {
                error: FlowError::Render(_)
            }
        )));
        assert!(has_request_code(&effects));

        // Second consecutive failure: parked until the user acts.
        f.handle(FlowEvent::CodeIssued {
            url: "nonsense".to_string(),
            state: "S2".to_string(),
        });
        let effects = f.handle(FlowEvent::RenderFailed {
            state: "S2".to_string(),
            error: "unsupported scheme".to_string(),
        });
        assert!(!has_request_code(&effects));
        assert_eq!(f.state(), FlowState::Failed);

        // A manual refresh recovers.
        let effects = f.handle(FlowEvent::StartQr);
        assert!(has_request_code(&effects));
    }

    #[test]
    fn test_challenge_failure_parks_flow() {
        let mut f = flow();
        f.handle(FlowEvent::StartQr);
        let effects = f.handle(FlowEvent::CodeIssueFailed {
            error: "503 from auth service".to_string(),
        });
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Report {
                error: FlowError::Challenge(_)
            }
        )));
        assert_eq!(f.state(), FlowState::Failed);

        // Poll callbacks never fire in Failed.
        assert!(f.handle(FlowEvent::PollTick).is_empty());
    }
}
