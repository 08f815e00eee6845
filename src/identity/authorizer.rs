use serde::Serialize;

use super::claims::Role;

/// Navigation targets the guard hands back to the page layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Home,
    Login,
    AdminDashboard,
    ProductHome,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::AdminDashboard => "/admin/product/dashboard",
            Route::ProductHome => "/product/home",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.path()) }
}

/// Outcome of a role gate. Mismatches redirect silently; they are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Allow,
    Redirect(Route),
}

impl Gate {
    pub fn is_allowed(&self) -> bool { matches!(self, Gate::Allow) }
}

/// Where an authenticated user with the wrong role is sent, on every gated page.
pub const ROLE_MISMATCH_REDIRECT: Route = Route::Home;

/// Decide a gate from the caller's current role (`None` when unauthenticated).
pub fn gate_for(current: Option<&Role>, required: &Role) -> Gate {
    match current {
        None => Gate::Redirect(Route::Login),
        Some(role) if role == required => Gate::Allow,
        Some(_) => Gate::Redirect(ROLE_MISMATCH_REDIRECT),
    }
}

/// Page to open right after a successful login.
pub fn landing_route(role: &Role) -> Route {
    if role.is_admin() { Route::AdminDashboard } else { Route::ProductHome }
}
