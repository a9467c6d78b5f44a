// ===============================
// src/handshake.rs
// ===============================
//
// Session lifecycle state machines. They only decide; the sessions perform the
// returned `Step` against the venue API.
//
// Trading:  Disconnected -> Connecting -> [Authenticating] -> LoggingIn
//           -> SettlementConfirming -> QueryingInstruments -> Ready
//           AuthFailed / LoginFailed are permanent for the connection object.
// Md:       Disconnected -> Connecting -> LoggingIn -> Ready
//
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::metrics::{SESSION_STATE, THROTTLE_RETRIES};
use crate::venue::{codes, RspInfo, RspUserLogin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TdState {
    Disconnected,
    Connecting,
    Authenticating,
    LoggingIn,
    SettlementConfirming,
    QueryingInstruments,
    Ready,
    AuthFailed,
    LoginFailed,
}

impl TdState {
    fn ordinal(self) -> i64 {
        match self {
            TdState::Disconnected => 0,
            TdState::Connecting => 1,
            TdState::Authenticating => 2,
            TdState::LoggingIn => 3,
            TdState::SettlementConfirming => 4,
            TdState::QueryingInstruments => 5,
            TdState::Ready => 6,
            TdState::AuthFailed => -1,
            TdState::LoginFailed => -2,
        }
    }
}

/// Request the session must issue after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    None,
    Authenticate,
    Login,
    ConfirmSettlement,
    QueryInstruments,
    ReplayPending,
}

#[derive(Debug)]
pub struct TdHandshake {
    state: TdState,
    auth_required: bool,
    auth_failed: bool,
    login_failed: bool,
    auth_status: bool,
    login_status: bool,
    front_id: i32,
    session_id: i32,
}

impl TdHandshake {
    pub fn new(auth_required: bool) -> Self {
        Self {
            state: TdState::Disconnected,
            auth_required,
            auth_failed: false,
            login_failed: false,
            auth_status: false,
            login_status: false,
            front_id: 0,
            session_id: 0,
        }
    }

    pub fn state(&self) -> TdState { self.state }
    pub fn front_id(&self) -> i32 { self.front_id }
    pub fn session_id(&self) -> i32 { self.session_id }
    pub fn login_status(&self) -> bool { self.login_status }
    pub fn auth_status(&self) -> bool { self.auth_status }
    pub fn auth_failed(&self) -> bool { self.auth_failed }
    pub fn login_failed(&self) -> bool { self.login_failed }

    fn set(&mut self, state: TdState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "td handshake");
            self.state = state;
            SESSION_STATE.with_label_values(&["td"]).set(state.ordinal());
        }
    }

    // the permanent failures win over any attempt to proceed
    fn next_after_connect(&mut self) -> Step {
        if self.auth_failed {
            self.set(TdState::AuthFailed);
            Step::None
        } else if self.auth_required {
            self.set(TdState::Authenticating);
            Step::Authenticate
        } else {
            self.begin_login()
        }
    }

    fn begin_login(&mut self) -> Step {
        if self.login_failed {
            self.set(TdState::LoginFailed);
            return Step::None;
        }
        self.set(TdState::LoggingIn);
        Step::Login
    }

    pub fn on_connect_requested(&mut self) {
        if self.state == TdState::Disconnected {
            self.set(TdState::Connecting);
        }
    }

    pub fn on_front_connected(&mut self) -> Step {
        self.set(TdState::Connecting);
        self.next_after_connect()
    }

    /// Repeat `connect` on a live API: authentication is simply re-issued.
    pub fn on_reauthenticate(&mut self) -> Step {
        if self.auth_failed {
            self.set(TdState::AuthFailed);
            return Step::None;
        }
        self.set(TdState::Authenticating);
        Step::Authenticate
    }

    pub fn on_authenticate(&mut self, info: &RspInfo) -> Step {
        if info.is_ok() {
            self.auth_status = true;
            return self.begin_login();
        }
        if info.error_id == codes::ERR_INVALID_AUTH_CODE {
            self.auth_failed = true;
            self.set(TdState::AuthFailed);
        }
        Step::None
    }

    pub fn on_login(&mut self, rsp: &RspUserLogin, info: &RspInfo) -> Step {
        if !info.is_ok() {
            self.login_failed = true;
            self.set(TdState::LoginFailed);
            return Step::None;
        }
        self.front_id = rsp.front_id;
        self.session_id = rsp.session_id;
        self.login_status = true;
        info!(front_id = rsp.front_id, session_id = rsp.session_id, "td login ok");
        self.set(TdState::SettlementConfirming);
        Step::ConfirmSettlement
    }

    pub fn on_settlement_confirmed(&mut self, info: &RspInfo) -> Step {
        if !info.is_ok() || self.state != TdState::SettlementConfirming {
            return Step::None;
        }
        self.set(TdState::QueryingInstruments);
        Step::QueryInstruments
    }

    pub fn on_instruments_complete(&mut self) -> Step {
        if self.state != TdState::QueryingInstruments {
            return Step::None;
        }
        self.set(TdState::Ready);
        Step::ReplayPending
    }

    pub fn on_disconnected(&mut self) {
        self.login_status = false;
        self.auth_status = false;
        self.set(TdState::Disconnected);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MdState {
    Disconnected,
    Connecting,
    LoggingIn,
    Ready,
}

#[derive(Debug)]
pub struct MdHandshake {
    state: MdState,
}

impl Default for MdHandshake {
    fn default() -> Self { Self { state: MdState::Disconnected } }
}

impl MdHandshake {
    pub fn new() -> Self { Self::default() }

    pub fn state(&self) -> MdState { self.state }

    pub fn is_ready(&self) -> bool { self.state == MdState::Ready }

    fn set(&mut self, state: MdState) {
        self.state = state;
        let ordinal = match state {
            MdState::Disconnected => 0,
            MdState::Connecting => 1,
            MdState::LoggingIn => 2,
            MdState::Ready => 3,
        };
        SESSION_STATE.with_label_values(&["md"]).set(ordinal);
    }

    pub fn on_connect_requested(&mut self) {
        if self.state == MdState::Disconnected {
            self.set(MdState::Connecting);
        }
    }

    pub fn on_front_connected(&mut self) -> Step {
        self.set(MdState::LoggingIn);
        Step::Login
    }

    /// `true` when the session became ready and must resubscribe.
    pub fn on_login(&mut self, info: &RspInfo) -> bool {
        if !info.is_ok() {
            return false;
        }
        self.set(MdState::Ready);
        true
    }

    pub fn on_disconnected(&mut self) { self.set(MdState::Disconnected); }
}

// ---- Throttled query admission ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleMode {
    /// Sleep and resubmit inside the callback until admitted.
    Blocking,
    /// Arm a retry deadline and resubmit from `Gateway::on_timer`.
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempts: u32,
    pub next_retry_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted { attempts: u32 },
    Deferred { attempts: u32, next_retry_at: Instant },
}

#[derive(Debug)]
pub struct QueryThrottle {
    mode: ThrottleMode,
    backoff: Duration,
    retry: Option<RetryState>,
}

impl QueryThrottle {
    pub fn new(mode: ThrottleMode, backoff: Duration) -> Self {
        Self { mode, backoff, retry: None }
    }

    pub fn mode(&self) -> ThrottleMode { self.mode }

    pub fn retry(&self) -> Option<RetryState> { self.retry }

    pub fn clear(&mut self) { self.retry = None; }

    /// `submit` returns the transport code: 0 admitted, anything else throttled.
    pub fn admit(&mut self, now: Instant, mut submit: impl FnMut() -> i32) -> Admission {
        match self.mode {
            ThrottleMode::Blocking => {
                let mut attempts = 0;
                loop {
                    attempts += 1;
                    let code = submit();
                    if code == 0 {
                        return Admission::Accepted { attempts };
                    }
                    THROTTLE_RETRIES.inc();
                    debug!(code, attempts, "query throttled, backing off");
                    std::thread::sleep(self.backoff);
                }
            }
            ThrottleMode::Scheduled => {
                let attempts = self.retry.map_or(0, |r| r.attempts) + 1;
                let code = submit();
                if code == 0 {
                    self.retry = None;
                    return Admission::Accepted { attempts };
                }
                THROTTLE_RETRIES.inc();
                debug!(code, attempts, "query throttled, retry scheduled");
                let next_retry_at = now + self.backoff;
                self.retry = Some(RetryState { attempts, next_retry_at });
                Admission::Deferred { attempts, next_retry_at }
            }
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.retry.is_some_and(|r| now >= r.next_retry_at)
    }
}
