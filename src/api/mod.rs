//! API clients for the photobooth backend.

pub mod assets;
pub mod auth;
pub mod bank;
pub mod http;
pub mod photobooth;
pub mod types;
pub mod user;

pub use assets::AssetApi;
pub use auth::AuthApi;
pub use bank::BankApi;
pub use http::{ApiClient, ApiError, TokenSlot};
pub use photobooth::SessionApi;
pub use types::*;
pub use user::UserApi;

/// Every backend operation the client uses
pub trait Backend: AuthApi + UserApi + BankApi + AssetApi + SessionApi {}

impl<T> Backend for T where T: AuthApi + UserApi + BankApi + AssetApi + SessionApi {}
