//! Process-wide client state.
//!
//! `App` is built once at startup and owns the single `SessionController`
//! for this process, the API client that reads its token, and the route guard
//! every protected command goes through.

use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use homewatt_core::{
    Access, ApiClient, ChatHistory, Config, HttpAuthenticator, KeyValueStore, Route, RouteGuard,
    SessionController, SessionEvent, SystemClock, TokenStore,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use homewatt_core::chat::DEFAULT_HISTORY_KEY;

pub struct App {
    pub config: Config,
    pub session: Arc<SessionController>,
    pub api: ApiClient,
    pub guard: RouteGuard,
    data_store: Arc<dyn KeyValueStore>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let base_url = config.api_base_url();
        info!(base_url = %base_url, "Using API");

        let api = ApiClient::new(&base_url)?;
        let token_store = TokenStore::new(config.token_store_backend()?);
        let session = Arc::new(SessionController::with_options(
            token_store,
            Arc::new(HttpAuthenticator::new(&api)),
            Arc::new(SystemClock),
            config.sweep_interval(),
        ));

        Ok(Self {
            api: api.with_session(Arc::clone(&session)),
            guard: RouteGuard::new(Arc::clone(&session)),
            data_store: config.data_store()?,
            session,
            config,
        })
    }

    pub fn chat_history(&self) -> ChatHistory {
        ChatHistory::open(Arc::clone(&self.data_store), DEFAULT_HISTORY_KEY)
    }

    /// Run `view` only if the guard lets `route` through.
    pub async fn guarded<F, Fut, T>(&self, route: Route, view: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.guard.check(route, view) {
            Access::Granted(view) => view.await,
            Access::Redirect(to) => {
                debug!(%route, %to, "Access denied");
                Err(anyhow!(
                    "You are not logged in (or your session expired). Run `homewatt login` first."
                ))
            }
        }
    }

    /// Remember the email used for a successful login
    pub fn remember_email(&self, email: &str) {
        let mut config = self.config.clone();
        config.last_email = Some(email.to_string());
        if let Err(e) = config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }
}

/// Report session transitions that happen while a command is running.
pub fn spawn_session_watcher(mut events: broadcast::Receiver<SessionEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Expired) => {
                    eprintln!("Your session has expired. Run `homewatt login` to continue.");
                }
                Ok(event) => debug!(?event, "Session changed"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Session watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
