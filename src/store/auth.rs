//! Auth store: token and user profile, persisted across launches.
//!
//! All transitions go through [`AuthState::reduce`]. The store applies a
//! transition, mirrors the resulting token into the HTTP client's
//! [`TokenSlot`] and persists the durable fields in one critical section, so
//! there is never a window where requests carry a token the store no longer
//! holds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::api::{ApiError, Backend, TokenSlot, User};
use crate::config;
use crate::storage::{self, KeyValueStore};

/// What the store is waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Busy {
    /// Validating a persisted token at launch
    Bootstrap,
    /// Login or registration in flight
    SignIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Anonymous,
    Bootstrapping,
    Authenticating,
    Authenticated,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub token: Option<String>,
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub busy: Option<Busy>,
    /// Set once the launch check has finished
    pub bootstrapped: bool,
}

/// The durable part of [`AuthState`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedAuth {
    pub token: Option<String>,
    pub user: Option<User>,
    pub is_authenticated: bool,
}

#[derive(Debug, Clone)]
pub enum AuthAction {
    Begin(Busy),
    SignedIn { token: String, user: User },
    SignInFailed,
    Restored(PersistedAuth),
    Verified(User),
    Invalidated,
    /// Profile fetched under `token`; dropped once that token is gone
    UserRefreshed { token: String, user: User },
    SignedOut,
}

impl AuthState {
    pub fn is_loading(&self) -> bool {
        self.busy.is_some()
    }

    pub fn phase(&self) -> AuthPhase {
        match self.busy {
            Some(Busy::Bootstrap) => AuthPhase::Bootstrapping,
            Some(Busy::SignIn) => AuthPhase::Authenticating,
            None if self.is_authenticated && self.token.is_some() => AuthPhase::Authenticated,
            None => AuthPhase::Anonymous,
        }
    }

    pub fn points(&self) -> Option<u64> {
        self.user.as_ref().map(|u| u.points)
    }

    pub fn persisted(&self) -> PersistedAuth {
        PersistedAuth {
            token: self.token.clone(),
            user: self.user.clone(),
            is_authenticated: self.is_authenticated,
        }
    }

    /// Pure transition function
    pub fn reduce(&self, action: AuthAction) -> AuthState {
        let cleared = AuthState {
            bootstrapped: self.bootstrapped,
            ..AuthState::default()
        };

        match action {
            AuthAction::Begin(busy) => AuthState {
                busy: Some(busy),
                ..self.clone()
            },
            AuthAction::SignedIn { token, user } => AuthState {
                token: Some(token),
                user: Some(user),
                is_authenticated: true,
                busy: None,
                bootstrapped: self.bootstrapped,
            },
            AuthAction::SignInFailed | AuthAction::SignedOut => cleared,
            AuthAction::Restored(persisted) => AuthState {
                is_authenticated: persisted.is_authenticated && persisted.token.is_some(),
                token: persisted.token,
                user: persisted.user,
                busy: self.busy,
                bootstrapped: self.bootstrapped,
            },
            AuthAction::Verified(user) => AuthState {
                user: Some(user),
                is_authenticated: self.token.is_some(),
                busy: None,
                bootstrapped: true,
                token: self.token.clone(),
            },
            AuthAction::Invalidated => AuthState {
                bootstrapped: true,
                ..AuthState::default()
            },
            AuthAction::UserRefreshed { token, user } => {
                if self.token.as_deref() != Some(token.as_str()) {
                    return self.clone();
                }
                AuthState {
                    user: Some(user),
                    ..self.clone()
                }
            }
        }
    }
}

/// Process-wide auth state
pub struct AuthStore {
    state: watch::Sender<AuthState>,
    backend: Arc<dyn Backend>,
    token_slot: TokenSlot,
    storage: Arc<dyn KeyValueStore>,
}

impl AuthStore {
    pub fn new(backend: Arc<dyn Backend>, token_slot: TokenSlot, storage: Arc<dyn KeyValueStore>) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        token_slot.set(None);
        Self {
            state,
            backend,
            token_slot,
            storage,
        }
    }

    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    fn dispatch(&self, action: AuthAction) -> AuthState {
        let mut next = AuthState::default();
        self.state.send_modify(|state| {
            let before = state.persisted();
            *state = state.reduce(action);
            self.token_slot.set(state.token.clone());

            let after = state.persisted();
            if before != after {
                self.persist(&after);
            }
            next = state.clone();
        });
        next
    }

    fn persist(&self, record: &PersistedAuth) {
        let result = if record.token.is_none() && record.user.is_none() {
            self.storage.remove(config::AUTH_STORAGE_KEY)
        } else {
            storage::save_json(self.storage.as_ref(), config::AUTH_STORAGE_KEY, record)
        };
        if let Err(e) = result {
            log::error!("Failed to persist auth state: {}", e);
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        self.dispatch(AuthAction::Begin(Busy::SignIn));
        match self.backend.login(email, password).await {
            Ok(result) => {
                log::info!("{}", result.message);
                self.dispatch(AuthAction::SignedIn {
                    token: result.token,
                    user: result.user.clone(),
                });
                Ok(result.user)
            }
            Err(e) => {
                log::warn!("Login failed: {}", e);
                self.dispatch(AuthAction::SignInFailed);
                Err(e)
            }
        }
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User, ApiError> {
        self.dispatch(AuthAction::Begin(Busy::SignIn));
        match self.backend.register(name, email, password).await {
            Ok(result) => {
                log::info!("Registered {}", email);
                self.dispatch(AuthAction::SignedIn {
                    token: result.token,
                    user: result.user.clone(),
                });
                Ok(result.user)
            }
            Err(e) => {
                log::warn!("Registration failed: {}", e);
                self.dispatch(AuthAction::SignInFailed);
                Err(e)
            }
        }
    }

    /// Launch check: restore the persisted record and re-validate its token.
    /// Returns whether the user ends up authenticated.
    pub async fn check_auth_state(&self) -> bool {
        self.dispatch(AuthAction::Begin(Busy::Bootstrap));

        let persisted: Option<PersistedAuth> =
            match storage::load_json(self.storage.as_ref(), config::AUTH_STORAGE_KEY) {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("Discarding unreadable auth record: {}", e);
                    None
                }
            };

        let Some(record) = persisted.filter(|r| r.token.is_some()) else {
            log::info!("No stored token");
            return self.dispatch(AuthAction::Invalidated).is_authenticated;
        };

        self.dispatch(AuthAction::Restored(record));

        match self.backend.current_user().await {
            Ok(user) => {
                log::info!("Restored session for {}", user.display_name());
                self.dispatch(AuthAction::Verified(user)).is_authenticated
            }
            Err(e) => {
                log::warn!("Stored token rejected: {}", e);
                self.dispatch(AuthAction::Invalidated).is_authenticated
            }
        }
    }

    /// Re-fetch the profile (and points balance) without touching the token
    pub async fn current_user(&self) -> Result<User, ApiError> {
        let token = self.state.borrow().token.clone();
        let user = self.backend.current_user().await?;
        match token {
            Some(token) => {
                self.dispatch(AuthAction::UserRefreshed {
                    token,
                    user: user.clone(),
                });
            }
            None => log::debug!("Profile fetched without a token, not stored"),
        }
        Ok(user)
    }

    /// No-op while anonymous
    pub fn set_user(&self, user: User) {
        let Some(token) = self.state.borrow().token.clone() else {
            return;
        };
        self.dispatch(AuthAction::UserRefreshed { token, user });
    }

    /// Always ends anonymous
    pub async fn logout(&self) {
        log::info!("Logging out");
        self.dispatch(AuthAction::SignedOut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::testing::{user_with_points, FakeBackend};

    fn store_with(backend: Arc<FakeBackend>, storage: Arc<MemoryStore>) -> (AuthStore, TokenSlot) {
        let slot = TokenSlot::default();
        (AuthStore::new(backend, slot.clone(), storage), slot)
    }

    #[test]
    fn test_reducer_phases() {
        let state = AuthState::default();
        assert_eq!(state.phase(), AuthPhase::Anonymous);

        let state = state.reduce(AuthAction::Begin(Busy::SignIn));
        assert_eq!(state.phase(), AuthPhase::Authenticating);
        assert!(state.is_loading());

        let state = state.reduce(AuthAction::SignedIn {
            token: "t".into(),
            user: user_with_points(5),
        });
        assert_eq!(state.phase(), AuthPhase::Authenticated);
        assert_eq!(state.points(), Some(5));

        let state = state.reduce(AuthAction::SignedOut);
        assert_eq!(state.phase(), AuthPhase::Anonymous);
        assert!(state.user.is_none());
    }

    #[test]
    fn test_restored_without_token_is_not_authenticated() {
        let state = AuthState::default().reduce(AuthAction::Restored(PersistedAuth {
            token: None,
            user: Some(user_with_points(1)),
            is_authenticated: true,
        }));
        assert!(!state.is_authenticated);
    }

    #[tokio::test]
    async fn test_login_sets_token_everywhere() {
        let backend = Arc::new(FakeBackend::new(15_000));
        let storage = Arc::new(MemoryStore::new());
        let (store, slot) = store_with(backend.clone(), storage.clone());

        let user = store.login("ana@example.com", "secret").await.unwrap();
        assert_eq!(user.points, 15_000);
        assert!(store.is_authenticated());
        assert!(!store.snapshot().is_loading());
        assert_eq!(slot.get().as_deref(), Some("token-1"));

        let saved: PersistedAuth = storage::load_json(storage.as_ref(), config::AUTH_STORAGE_KEY)
            .unwrap()
            .unwrap();
        assert_eq!(saved.token.as_deref(), Some("token-1"));
        assert!(saved.is_authenticated);
    }

    #[tokio::test]
    async fn test_failed_login_clears_state_and_returns_error() {
        let backend = Arc::new(FakeBackend::new(0));
        backend.fail("login", ApiError::with_status("Invalid credentials", 401));
        let (store, slot) = store_with(backend, Arc::new(MemoryStore::new()));

        let err = store.login("ana@example.com", "wrong").await.unwrap_err();
        assert_eq!(err.message, "Invalid credentials");
        assert!(!store.is_authenticated());
        assert!(store.snapshot().token.is_none());
        assert!(!slot.is_set());
        assert!(!store.snapshot().is_loading());
    }

    #[tokio::test]
    async fn test_persisted_state_roundtrips_across_restart() {
        let backend = Arc::new(FakeBackend::new(15_000));
        let storage = Arc::new(MemoryStore::new());
        {
            let (store, _) = store_with(backend.clone(), storage.clone());
            store.register("Ana", "ana@example.com", "secret").await.unwrap();
        }

        let (restarted, slot) = store_with(backend.clone(), storage);
        assert!(!restarted.is_authenticated());
        assert!(restarted.check_auth_state().await);

        let state = restarted.snapshot();
        assert_eq!(state.phase(), AuthPhase::Authenticated);
        assert_eq!(state.token.as_deref(), Some("token-1"));
        assert_eq!(state.points(), Some(15_000));
        assert!(state.bootstrapped);
        assert_eq!(slot.get().as_deref(), Some("token-1"));
        assert_eq!(backend.count("current_user"), 1);
    }

    #[tokio::test]
    async fn test_rejected_token_is_cleared_on_launch() {
        let backend = Arc::new(FakeBackend::new(15_000));
        let storage = Arc::new(MemoryStore::new());
        storage::save_json(
            storage.as_ref(),
            config::AUTH_STORAGE_KEY,
            &PersistedAuth {
                token: Some("expired".into()),
                user: Some(user_with_points(1)),
                is_authenticated: true,
            },
        )
        .unwrap();
        backend.fail("current_user", ApiError::with_status("Unauthorized", 401));

        let (store, slot) = store_with(backend, storage.clone());
        assert!(!store.check_auth_state().await);
        assert_eq!(store.snapshot().phase(), AuthPhase::Anonymous);
        assert!(store.snapshot().user.is_none());
        assert!(!slot.is_set());
        assert!(storage.get(config::AUTH_STORAGE_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_launch_without_token_is_anonymous() {
        let backend = Arc::new(FakeBackend::new(0));
        let (store, _) = store_with(backend.clone(), Arc::new(MemoryStore::new()));
        assert!(!store.check_auth_state().await);
        assert!(store.snapshot().bootstrapped);
        assert_eq!(backend.count("current_user"), 0);
    }

    #[tokio::test]
    async fn test_refresh_keeps_token() {
        let backend = Arc::new(FakeBackend::new(5_000));
        let (store, slot) = store_with(backend.clone(), Arc::new(MemoryStore::new()));
        store.login("ana@example.com", "secret").await.unwrap();

        backend.set_points(25_000);
        let user = store.current_user().await.unwrap();
        assert_eq!(user.points, 25_000);
        assert_eq!(store.snapshot().points(), Some(25_000));
        assert_eq!(slot.get().as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn test_set_user_persists_profile() {
        let backend = Arc::new(FakeBackend::new(5_000));
        let storage = Arc::new(MemoryStore::new());
        let (store, slot) = store_with(backend, storage.clone());
        store.login("ana@example.com", "secret").await.unwrap();

        let mut user = user_with_points(7_000);
        user.name = Some("Bao".into());
        store.set_user(user);

        let record: PersistedAuth = storage::load_json(storage.as_ref(), config::AUTH_STORAGE_KEY)
            .unwrap()
            .unwrap();
        assert_eq!(record.user.and_then(|u| u.name).as_deref(), Some("Bao"));
        assert_eq!(record.token.as_deref(), Some("token-1"));
        assert_eq!(slot.get().as_deref(), Some("token-1"));
    }

    #[test]
    fn test_profile_for_another_token_is_dropped() {
        let anonymous = AuthState::default();
        let next = anonymous.reduce(AuthAction::UserRefreshed {
            token: "token-1".into(),
            user: user_with_points(5),
        });
        assert!(next.user.is_none());
        assert!(next.token.is_none());

        let signed_in = anonymous.reduce(AuthAction::SignedIn {
            token: "token-2".into(),
            user: user_with_points(5),
        });
        let next = signed_in.reduce(AuthAction::UserRefreshed {
            token: "token-1".into(),
            user: user_with_points(9_000),
        });
        assert_eq!(next.points(), Some(5));
        assert_eq!(next.token.as_deref(), Some("token-2"));
    }

    #[tokio::test]
    async fn test_late_profile_after_logout_stays_anonymous() {
        let backend = Arc::new(FakeBackend::new(5_000));
        let storage = Arc::new(MemoryStore::new());
        let (store, slot) = store_with(backend, storage.clone());
        store.login("ana@example.com", "secret").await.unwrap();
        let token = store.snapshot().token.unwrap();

        store.logout().await;
        store.dispatch(AuthAction::UserRefreshed {
            token,
            user: user_with_points(5_000),
        });
        store.set_user(user_with_points(5_000));

        let state = store.snapshot();
        assert!(state.token.is_none());
        assert!(state.user.is_none());
        assert!(!state.is_authenticated);
        assert!(!slot.is_set());
        assert!(storage.get(config::AUTH_STORAGE_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_while_anonymous_returns_profile_without_storing() {
        let backend = Arc::new(FakeBackend::new(5_000));
        let storage = Arc::new(MemoryStore::new());
        let (store, _slot) = store_with(backend, storage.clone());

        let user = store.current_user().await.unwrap();
        assert_eq!(user.points, 5_000);
        assert!(store.user().is_none());
        assert!(storage.get(config::AUTH_STORAGE_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_logout_is_unconditional() {
        let backend = Arc::new(FakeBackend::new(5_000));
        let storage = Arc::new(MemoryStore::new());
        let (store, slot) = store_with(backend, storage.clone());
        store.login("ana@example.com", "secret").await.unwrap();

        let mut rx = store.subscribe();
        store.logout().await;
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().is_authenticated);
        assert!(!slot.is_set());
        assert!(storage.get(config::AUTH_STORAGE_KEY).unwrap().is_none());
    }
}
