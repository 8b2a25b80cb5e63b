use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::SessionController;

/// Views of the client. Mirrors the pages of the web dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Dashboard,
    DeviceDetails,
    Conversation,
    Login,
    Register,
}

impl Route {
    pub fn is_protected(&self) -> bool {
        matches!(self, Route::Dashboard | Route::DeviceDetails | Route::Conversation)
    }

    pub fn path(&self) -> &'static str {
        match self {
            Route::Dashboard => "/",
            Route::DeviceDetails => "/device/:deviceId",
            Route::Conversation => "/conversation",
            Route::Login => "/login",
            Route::Register => "/register",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Outcome of asking to render a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access<T> {
    Granted(T),
    Redirect(Route),
}

/// Gate in front of protected views. Holds no state of its own: every call
/// asks the controller again.
#[derive(Clone)]
pub struct RouteGuard {
    session: Arc<SessionController>,
}

impl RouteGuard {
    pub fn new(session: Arc<SessionController>) -> Self {
        Self { session }
    }

    pub fn allow(&self) -> bool {
        self.session.is_authenticated()
    }

    /// Run `render` only if `route` may be shown right now; otherwise send the
    /// caller to the login page without rendering anything.
    pub fn check<T>(&self, route: Route, render: impl FnOnce() -> T) -> Access<T> {
        if !route.is_protected() || self.allow() {
            return Access::Granted(render());
        }
        debug!(%route, "Redirecting unauthenticated user to login");
        Access::Redirect(Route::Login)
    }
}
