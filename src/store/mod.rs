//! Application stores shared across screens.

pub mod auth;
pub mod onboarding;

pub use auth::{AuthPhase, AuthState, AuthStore};
pub use onboarding::OnboardingStore;
