//! Points top-up by manual bank transfer.
//!
//! The client never moves money. It shows a transfer QR carrying the user's
//! payment reference; the balance changes once the backend reconciles the
//! transfer, which the user picks up by refreshing their profile.

use thiserror::Error;
use url::Url;

use crate::api::{ApiError, BankApi, BankInfo, User};
use crate::config::{BANK_QR_BASE, MIN_TOPUP_AMOUNT, TRANSFER_PREFIX};
use crate::store::AuthStore;

pub const TRANSFER_NOTICE: &str =
    "Please transfer using the QR code. Points are added once the payment is confirmed.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Please enter a valid amount")]
    Invalid,
    #[error("Minimum top-up is 1,000 VND")]
    BelowMinimum,
}

#[derive(Error, Debug)]
pub enum TopUpError {
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error("Bank transfer details are not available")]
    NoBankInfo,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Invalid QR address: {0}")]
    Url(#[from] url::ParseError),
}

/// Payment reference the backend matches incoming transfers against
pub fn transfer_description(user: &User) -> String {
    match user.payment_code.as_deref().filter(|c| !c.is_empty()) {
        Some(code) => format!("{}{}", TRANSFER_PREFIX, code),
        None => format!("{}{}", TRANSFER_PREFIX, user.id.chars().take(8).collect::<String>()),
    }
}

/// Amount typed by the user; everything but digits is ignored
pub fn parse_amount(input: &str) -> Result<u64, AmountError> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    let amount: u64 = digits.parse().map_err(|_| AmountError::Invalid)?;
    if amount == 0 {
        return Err(AmountError::Invalid);
    }
    if amount < MIN_TOPUP_AMOUNT {
        return Err(AmountError::BelowMinimum);
    }
    Ok(amount)
}

pub fn bank_qr_url(bank: &BankInfo, amount: u64, description: &str) -> Result<Url, url::ParseError> {
    let amount = amount.to_string();
    Url::parse_with_params(
        BANK_QR_BASE,
        &[
            ("acc", bank.account_number.as_str()),
            ("bank", bank.bank_code.as_str()),
            ("amount", amount.as_str()),
            ("des", description),
        ],
    )
}

/// Group thousands with dots, as balances are shown in VND
pub fn format_points(points: u64) -> String {
    let digits = points.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

/// Everything needed to show the transfer screen
#[derive(Debug, Clone, PartialEq)]
pub struct TransferPlan {
    pub bank: BankInfo,
    pub amount: u64,
    pub description: String,
    pub qr_url: Url,
}

/// Validate the amount and build the transfer QR for `user`
pub async fn plan_transfer<B>(bank_api: &B, user: &User, input: &str) -> Result<TransferPlan, TopUpError>
where
    B: BankApi + ?Sized,
{
    let amount = parse_amount(input)?;
    let bank = bank_api.bank_info().await?.ok_or(TopUpError::NoBankInfo)?;
    let description = transfer_description(user);
    let qr_url = bank_qr_url(&bank, amount, &description)?;

    log::info!("Top-up of {} VND to {} ({})", amount, bank.bank_name, description);
    Ok(TransferPlan {
        bank,
        amount,
        description,
        qr_url,
    })
}

/// The user says they transferred: pull the latest balance
pub async fn confirm_transfer(auth: &AuthStore) -> Result<User, ApiError> {
    match auth.current_user().await {
        Ok(user) => {
            log::info!("Balance after top-up: {}", user.points);
            Ok(user)
        }
        Err(e) => {
            log::error!("Error refreshing user: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TokenSlot;
    use crate::storage::MemoryStore;
    use crate::testing::{user_with_points, FakeBackend};
    use std::sync::Arc;

    fn bank() -> BankInfo {
        BankInfo {
            id: "b-1".into(),
            bank_code: "MB".into(),
            bank_name: "MB Bank".into(),
            account_number: "0123456789".into(),
            account_holder_name: "PHOTOBOOTH".into(),
            branch: None,
            qr_code_url: None,
        }
    }

    #[test]
    fn test_description_prefers_payment_code() {
        let mut user = user_with_points(0);
        assert_eq!(transfer_description(&user), "PTBAB12CD");

        user.payment_code = None;
        assert_eq!(transfer_description(&user), "PTBuser-012");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("50.000"), Ok(50_000));
        assert_eq!(parse_amount(" 1000 đ"), Ok(1_000));
        assert_eq!(parse_amount(""), Err(AmountError::Invalid));
        assert_eq!(parse_amount("0"), Err(AmountError::Invalid));
        assert_eq!(parse_amount("abc"), Err(AmountError::Invalid));
        assert_eq!(parse_amount("999"), Err(AmountError::BelowMinimum));
        assert_eq!(AmountError::BelowMinimum.to_string(), "Minimum top-up is 1,000 VND");
    }

    #[test]
    fn test_qr_url() {
        let url = bank_qr_url(&bank(), 50_000, "PTBAB12CD").unwrap();
        assert_eq!(
            url.as_str(),
            "https://qr.sepay.vn/img?acc=0123456789&bank=MB&amount=50000&des=PTBAB12CD"
        );
    }

    #[test]
    fn test_format_points() {
        assert_eq!(format_points(0), "0");
        assert_eq!(format_points(999), "999");
        assert_eq!(format_points(10_000), "10.000");
        assert_eq!(format_points(1_234_567), "1.234.567");
    }

    #[tokio::test]
    async fn test_plan_requires_bank_info() {
        let backend = FakeBackend::new(0);
        let user = user_with_points(0);

        let err = plan_transfer(&backend, &user, "20000").await.unwrap_err();
        assert!(matches!(err, TopUpError::NoBankInfo));

        backend.set_bank(Some(bank()));
        let plan = plan_transfer(&backend, &user, "20.000").await.unwrap();
        assert_eq!(plan.amount, 20_000);
        assert_eq!(plan.description, "PTBAB12CD");
        assert!(plan.qr_url.as_str().contains("amount=20000"));
    }

    #[tokio::test]
    async fn test_plan_validates_before_fetching() {
        let backend = FakeBackend::new(0);
        let err = plan_transfer(&backend, &user_with_points(0), "500").await.unwrap_err();
        assert!(matches!(err, TopUpError::Amount(AmountError::BelowMinimum)));
        assert_eq!(backend.count("bank_info"), 0);
    }

    #[tokio::test]
    async fn test_confirm_refreshes_balance() {
        let backend = Arc::new(FakeBackend::new(0));
        let auth = AuthStore::new(backend.clone(), TokenSlot::default(), Arc::new(MemoryStore::new()));
        auth.login("ana@example.com", "secret").await.unwrap();

        backend.set_points(50_000);
        let user = confirm_transfer(&auth).await.unwrap();
        assert_eq!(user.points, 50_000);
        assert_eq!(auth.snapshot().points(), Some(50_000));
    }
}
