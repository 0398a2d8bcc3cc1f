use std::fmt;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Landing,
    Login,
    Register,
    Dashboard,
    Category(Uuid),
    NewTask,
    EditTask(Uuid),
    Categories,
    Profile,
}

impl Route {
    pub fn requires_auth(&self) -> bool {
        !matches!(self, Route::Landing | Route::Login | Route::Register)
    }

    /// Public-only screens bounce signed-in users to the dashboard.
    fn public_only(&self) -> bool {
        matches!(self, Route::Login | Route::Register)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Landing => write!(f, "/"),
            Route::Login => write!(f, "/login"),
            Route::Register => write!(f, "/register"),
            Route::Dashboard => write!(f, "/dashboard"),
            Route::Category(id) => write!(f, "/category/{id}"),
            Route::NewTask => write!(f, "/task/new"),
            Route::EditTask(id) => write!(f, "/task/edit/{id}"),
            Route::Categories => write!(f, "/categories"),
            Route::Profile => write!(f, "/profile"),
        }
    }
}

/// Where a request for `route` actually lands given the session state.
pub fn guard(route: Route, authenticated: bool) -> Route {
    if route.requires_auth() && !authenticated {
        Route::Login
    } else if route.public_only() && authenticated {
        Route::Dashboard
    } else {
        route
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{Route, guard};

    #[test]
    fn private_routes_redirect_to_login() {
        let id = Uuid::new_v4();
        assert_eq!(guard(Route::EditTask(id), false), Route::Login);
        assert_eq!(guard(Route::EditTask(id), true), Route::EditTask(id));
        assert_eq!(guard(Route::Landing, false), Route::Landing);
    }

    #[test]
    fn public_forms_redirect_signed_in_users() {
        assert_eq!(guard(Route::Login, true), Route::Dashboard);
        assert_eq!(guard(Route::Register, true), Route::Dashboard);
        assert_eq!(guard(Route::Landing, true), Route::Landing);
    }

    #[test]
    fn display_matches_paths() {
        let id = Uuid::nil();
        assert_eq!(
            Route::EditTask(id).to_string(),
            "/task/edit/00000000-0000-0000-0000-000000000000"
        );
    }
}
