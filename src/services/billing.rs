//! Money arithmetic for bookings, payouts and withdrawals. Stored amounts
//! are whole paise (`i64`); rupee `f64`s only appear at the API boundary.

use crate::models::WalletTransaction;

/// Rupees from a request body to paise, rounded to the nearest paisa.
pub fn to_paise(rupees: f64) -> i64 {
    (rupees * 100.0).round() as i64
}

pub fn to_rupees(paise: i64) -> f64 {
    paise as f64 / 100.0
}

/// Display form, e.g. `₹1234.50`.
pub fn format_rupees(paise: i64) -> String {
    let sign = if paise < 0 { "-" } else { "" };
    let abs = paise.unsigned_abs();
    format!("{}₹{}.{:02}", sign, abs / 100, abs % 100)
}

/// Price in paise of a session of `minutes` at `hourly_rate` rupees.
pub fn session_price(hourly_rate: f64, minutes: i32) -> i64 {
    let per_hour = to_paise(hourly_rate);
    (per_hour * minutes as i64 + 30) / 60
}

pub fn percent_of(amount: i64, percent: f64) -> i64 {
    (amount as f64 * percent / 100.0).round() as i64
}

/// Split of a payment between the platform and the achiever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payout {
    pub platform_fee: i64,
    pub achiever_share: i64,
}

pub fn payout(amount: i64, platform_fee_percent: f64) -> Payout {
    let platform_fee = percent_of(amount, platform_fee_percent);
    Payout {
        platform_fee,
        achiever_share: amount - platform_fee,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalBreakdown {
    pub amount: i64,
    pub processing_fee: i64,
    pub net_amount: i64,
}

/// `amount` and `minimum` are rupees as entered; `balance` is paise.
pub fn withdrawal_breakdown(
    amount: f64,
    fee_percent: f64,
    minimum: f64,
    balance: i64,
) -> Result<WithdrawalBreakdown, String> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err("Amount must be positive".to_string());
    }
    let amount = to_paise(amount);
    let minimum = to_paise(minimum);
    if amount < minimum {
        return Err(format!("Minimum withdrawal amount is {}", format_rupees(minimum)));
    }
    if amount > balance {
        return Err("Insufficient wallet balance".to_string());
    }
    let processing_fee = percent_of(amount, fee_percent);
    Ok(WithdrawalBreakdown {
        amount,
        processing_fee,
        net_amount: amount - processing_fee,
    })
}

pub const MAX_TOP_UP: f64 = 100_000.0;

/// Checks a top-up request in rupees and returns it in paise.
pub fn validate_top_up(amount: f64) -> Result<i64, String> {
    if !amount.is_finite() || amount < 1.0 {
        return Err("Top-up amount must be at least ₹1".to_string());
    }
    if amount > MAX_TOP_UP {
        return Err(format!("Top-up amount cannot exceed ₹{}", MAX_TOP_UP));
    }
    Ok(to_paise(amount))
}

/// Balance implied by a wallet's transaction ledger.
pub fn ledger_balance(transactions: &[WalletTransaction]) -> i64 {
    transactions.iter().map(WalletTransaction::delta).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TransactionCategory, TransactionType};

    #[test]
    fn session_price_is_pro_rata() {
        assert_eq!(session_price(600.0, 60), 60_000);
        assert_eq!(session_price(600.0, 45), 45_000);
        assert_eq!(session_price(999.0, 30), 49_950);
        assert_eq!(session_price(100.0, 50), 8_333);
    }

    #[test]
    fn payout_adds_back_to_amount() {
        let p = payout(83_333, 10.0);
        assert_eq!(p.platform_fee, 8_333);
        assert_eq!(p.achiever_share, 75_000);
        assert_eq!(p.platform_fee + p.achiever_share, 83_333);
    }

    #[test]
    fn withdrawal_fee_and_limits() {
        let w = withdrawal_breakdown(1000.0, 2.0, 100.0, 150_000).unwrap();
        assert_eq!(w.amount, 100_000);
        assert_eq!(w.processing_fee, 2_000);
        assert_eq!(w.net_amount, 98_000);

        assert!(withdrawal_breakdown(50.0, 2.0, 100.0, 150_000).is_err());
        assert!(withdrawal_breakdown(2000.0, 2.0, 100.0, 150_000).is_err());
        assert!(withdrawal_breakdown(-5.0, 2.0, 100.0, 150_000).is_err());
        assert!(withdrawal_breakdown(f64::NAN, 2.0, 100.0, 150_000).is_err());
    }

    #[test]
    fn exact_balance_built_from_fractional_top_ups_can_be_withdrawn() {
        let balance = validate_top_up(100.10).unwrap() + validate_top_up(200.20).unwrap();
        assert_eq!(balance, 30_030);

        let w = withdrawal_breakdown(300.30, 2.0, 100.0, balance).unwrap();
        assert_eq!(w.amount, balance);
        assert_eq!(w.processing_fee + w.net_amount, balance);
        assert!(withdrawal_breakdown(300.31, 2.0, 100.0, balance).is_err());
    }

    #[test]
    fn top_up_bounds() {
        assert_eq!(validate_top_up(500.0), Ok(50_000));
        assert_eq!(validate_top_up(0.1 + 0.2 + 1.0), Ok(130));
        assert!(validate_top_up(0.5).is_err());
        assert!(validate_top_up(100_000.01).is_err());
        assert!(validate_top_up(f64::INFINITY).is_err());
    }

    #[test]
    fn rupee_conversions() {
        assert_eq!(to_paise(499.0), 49_900);
        assert_eq!(to_paise(10.5), 1_050);
        assert_eq!(to_rupees(30_030), 300.3);
        assert_eq!(format_rupees(30_030), "₹300.30");
        assert_eq!(format_rupees(5), "₹0.05");
        assert_eq!(format_rupees(-1_250), "-₹12.50");
    }

    #[test]
    fn ledger_sums_credits_minus_debits() {
        let txs = vec![
            WalletTransaction::new(TransactionType::Credit, TransactionCategory::TopUp, 100_000, "Top-up", None),
            WalletTransaction::new(TransactionType::Debit, TransactionCategory::BookingPayment, 45_000, "Booking", None),
            WalletTransaction::new(TransactionType::Credit, TransactionCategory::BookingRefund, 45_000, "Refund", None),
            WalletTransaction::new(TransactionType::Debit, TransactionCategory::MasterClassPayment, 19_999, "Class", None),
        ];
        assert_eq!(ledger_balance(&txs), 80_001);
        assert_eq!(ledger_balance(&[]), 0);
    }
}
