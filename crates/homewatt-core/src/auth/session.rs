//! Session state, login/logout and the background expiry sweep.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::error::UNUSABLE_TOKEN;
use super::{AuthError, Clock, SystemClock, TokenCodec, TokenStore};
use crate::models::AuthResponse;

/// How often an authenticated session is re-checked in the background.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Buffer for session-change notifications. Transitions are rare; a slow
/// subscriber that falls this far behind only loses old events.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// The remote login endpoint.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Unauthenticated,
    Authenticated { token: String },
}

/// Token-free view of the session for UI consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated { expires_at: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    LoggedOut,
    Expired,
}

struct Inner {
    session: Session,
    sweep: Option<JoinHandle<()>>,
}

struct Shared {
    store: TokenStore,
    clock: Arc<dyn Clock>,
    authenticator: Arc<dyn Authenticator>,
    sweep_interval: Duration,
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionEvent>,
}

/// Owner of the client's session. Construct one per process and share it
/// behind an `Arc`.
///
/// Dropping the controller cancels the sweep.
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    /// Controller on the system clock with the default sweep interval
    pub fn new(store: TokenStore, authenticator: Arc<dyn Authenticator>) -> Self {
        Self::with_options(store, authenticator, Arc::new(SystemClock), DEFAULT_SWEEP_INTERVAL)
    }

    /// Restores the stored token if it is still valid, otherwise starts
    /// unauthenticated and purges whatever was stored.
    ///
    /// The sweep needs a tokio runtime. Outside one the controller still works
    /// but expiry is only noticed when somebody asks.
    pub fn with_options(
        store: TokenStore,
        authenticator: Arc<dyn Authenticator>,
        clock: Arc<dyn Clock>,
        sweep_interval: Duration,
    ) -> Self {
        let sweep_interval = if sweep_interval.is_zero() {
            warn!("Zero sweep interval requested, using default");
            DEFAULT_SWEEP_INTERVAL
        } else {
            sweep_interval
        };

        let session = match store.load() {
            Some(token) if !TokenCodec::is_expired(&token, clock.now()) => {
                info!("Restored session from stored token");
                Session::Authenticated { token }
            }
            Some(_) => {
                info!("Stored token is expired or unreadable, clearing it");
                store.clear();
                Session::Unauthenticated
            }
            None => Session::Unauthenticated,
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            store,
            clock,
            authenticator,
            sweep_interval,
            inner: Mutex::new(Inner {
                session,
                sweep: None,
            }),
            events,
        });

        {
            let mut inner = shared.lock();
            if matches!(inner.session, Session::Authenticated { .. }) {
                shared.restart_sweep(&mut inner);
            }
        }

        Self { shared }
    }

    /// Log in through the authenticator. The session is untouched until the
    /// call completes, and untouched entirely if it fails.
    ///
    /// Authenticator errors are returned as-is. A token that is already
    /// expired or cannot be decoded is refused with `AuthError::Unreachable`
    /// carrying its own detail, so `user_message` does not report it as a
    /// network failure.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let response = match self.shared.authenticator.login(email, password).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Login failed");
                return Err(e);
            }
        };

        let token = response.access_token;
        if TokenCodec::is_expired(&token, self.shared.clock.now()) {
            warn!("Authenticator issued an expired or unreadable token");
            return Err(AuthError::Unreachable(UNUSABLE_TOKEN.to_string()));
        }

        let mut inner = self.shared.lock();
        self.shared.begin_session(&mut inner, token);
        info!("Logged in");
        Ok(())
    }

    /// End the session and purge the stored token. Safe to call repeatedly.
    pub fn logout(&self) {
        let mut inner = self.shared.lock();
        self.shared.end_session(&mut inner, SessionEvent::LoggedOut);
    }

    /// Re-checks expiry on every call; an expired session is ended on the spot.
    pub fn is_authenticated(&self) -> bool {
        self.shared.valid_token().is_some()
    }

    /// Token to attach to outgoing requests
    pub fn current_token(&self) -> Option<String> {
        self.shared.valid_token()
    }

    pub fn state(&self) -> SessionState {
        match self.shared.valid_token() {
            Some(token) => match TokenCodec::decode(&token) {
                Ok(decoded) => SessionState::Authenticated {
                    expires_at: decoded.expires_at,
                },
                Err(_) => SessionState::Unauthenticated,
            },
            None => SessionState::Unauthenticated,
        }
    }

    /// Seconds until the current token expires
    pub fn expires_in(&self) -> Option<i64> {
        match self.state() {
            SessionState::Authenticated { expires_at } => {
                Some(expires_at - self.shared.clock.now())
            }
            SessionState::Unauthenticated => None,
        }
    }

    /// Raw snapshot, without an expiry check
    pub fn session(&self) -> Session {
        self.shared.lock().session.clone()
    }

    /// Notifications of every transition. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    #[cfg(test)]
    fn sweep_active(&self) -> bool {
        self.shared
            .lock()
            .sweep
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(handle) = self.shared.lock().sweep.take() {
            handle.abort();
            debug!("Session sweep cancelled on teardown");
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn valid_token(&self) -> Option<String> {
        let mut inner = self.lock();
        let token = match &inner.session {
            Session::Authenticated { token } => token,
            Session::Unauthenticated => return None,
        };

        if !TokenCodec::is_expired(token, self.clock.now()) {
            return Some(token.clone());
        }

        info!("Session token expired");
        self.end_session(&mut inner, SessionEvent::Expired);
        None
    }

    fn begin_session(self: &Arc<Self>, inner: &mut Inner, token: String) {
        self.store.save(&token);
        inner.session = Session::Authenticated { token };
        self.restart_sweep(inner);
        let _ = self.events.send(SessionEvent::LoggedIn);
    }

    fn end_session(&self, inner: &mut Inner, event: SessionEvent) {
        self.store.clear();
        if let Some(handle) = inner.sweep.take() {
            handle.abort();
        }

        let was_authenticated = matches!(inner.session, Session::Authenticated { .. });
        inner.session = Session::Unauthenticated;
        if was_authenticated {
            info!(?event, "Session ended");
            let _ = self.events.send(event);
        }
    }

    /// Replace any running sweep with a fresh one, so at most one exists.
    fn restart_sweep(self: &Arc<Self>, inner: &mut Inner) {
        if let Some(handle) = inner.sweep.take() {
            handle.abort();
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("No async runtime, session expiry will only be checked on demand");
                return;
            }
        };

        let period = self.sweep_interval;
        let first_tick = Instant::now() + period;
        let shared = Arc::downgrade(self);
        inner.sweep = Some(runtime.spawn(run_sweep(shared, first_tick, period)));
        debug!(interval_secs = period.as_secs(), "Session sweep started");
    }
}

/// Holds only a weak reference so a dropped controller is never kept alive.
async fn run_sweep(shared: Weak<Shared>, first_tick: Instant, period: Duration) {
    let mut ticker = time::interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(strong) = shared.upgrade() else {
            break;
        };
        if strong.valid_token().is_none() {
            debug!("Sweep found no valid session, stopping");
            break;
        }
        trace!("Sweep: session still valid");
    }
}
