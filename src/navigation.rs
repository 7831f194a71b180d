//! Route tables and the root-stack switch.

/// Top-level tree shown for the current auth state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootStack {
    /// Launch check still running
    Splash,
    Onboarding,
    Auth,
    App,
}

impl RootStack {
    pub fn select(bootstrapped: bool, is_authenticated: bool, is_first_launch: bool) -> Self {
        if !bootstrapped {
            RootStack::Splash
        } else if is_authenticated {
            RootStack::App
        } else if is_first_launch {
            RootStack::Onboarding
        } else {
            RootStack::Auth
        }
    }

    pub fn initial_route(self) -> Option<Route> {
        match self {
            RootStack::Splash | RootStack::Onboarding => None,
            RootStack::Auth => Some(Route::Login),
            RootStack::App => Some(Route::Home),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    Home,
    QrScanner,
    PrepareCapture { qr_data: String },
    TopUpPoints,
    PhotoboothControl { session_id: String, photobooth_id: String },
    History,
    SessionDetail { session_id: String },
    Settings,
}

impl Route {
    pub fn name(&self) -> &'static str {
        match self {
            Route::Login => "LoginScreen",
            Route::Register => "RegisterScreen",
            Route::Home => "HomeScreen",
            Route::QrScanner => "QRScanner",
            Route::PrepareCapture { .. } => "PrepareCapture",
            Route::TopUpPoints => "TopUpPoints",
            Route::PhotoboothControl { .. } => "PhotoboothControl",
            Route::History => "History",
            Route::SessionDetail { .. } => "SessionDetail",
            Route::Settings => "Settings",
        }
    }
}

/// Navigation requests emitted by the state machines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavCommand {
    Navigate(Route),
    GoBack,
    /// Replace the whole stack with a single root
    Reset(Route),
}

/// Route stack of the active tree
#[derive(Debug, Clone)]
pub struct Navigator {
    stack: Vec<Route>,
}

impl Navigator {
    pub fn new(root: Route) -> Self {
        Self { stack: vec![root] }
    }

    pub fn current(&self) -> &Route {
        // The stack always keeps its root.
        &self.stack[self.stack.len() - 1]
    }

    pub fn stack(&self) -> &[Route] {
        &self.stack
    }

    pub fn navigate(&mut self, route: Route) {
        log::debug!("Navigate to {}", route.name());
        self.stack.push(route);
    }

    /// Pops the top route; the root is never popped
    pub fn go_back(&mut self) -> bool {
        if self.stack.len() > 1 {
            self.stack.pop();
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self, root: Route) {
        log::debug!("Reset navigation to {}", root.name());
        self.stack.clear();
        self.stack.push(root);
    }

    pub fn apply(&mut self, command: NavCommand) {
        match command {
            NavCommand::Navigate(route) => self.navigate(route),
            NavCommand::GoBack => {
                self.go_back();
            }
            NavCommand::Reset(route) => self.reset(route),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_stack_selection() {
        assert_eq!(RootStack::select(false, true, false), RootStack::Splash);
        assert_eq!(RootStack::select(true, true, true), RootStack::App);
        assert_eq!(RootStack::select(true, false, true), RootStack::Onboarding);
        assert_eq!(RootStack::select(true, false, false), RootStack::Auth);
        assert_eq!(RootStack::Auth.initial_route(), Some(Route::Login));
    }

    #[test]
    fn test_stack_operations() {
        let mut nav = Navigator::new(Route::Home);
        nav.navigate(Route::QrScanner);
        nav.navigate(Route::PrepareCapture { qr_data: "booth-42".into() });
        assert_eq!(nav.stack().len(), 3);

        assert!(nav.go_back());
        assert_eq!(nav.current(), &Route::QrScanner);

        nav.apply(NavCommand::Reset(Route::History));
        assert_eq!(nav.stack(), &[Route::History]);
        assert!(!nav.go_back());
        assert_eq!(nav.current().name(), "History");
    }
}
