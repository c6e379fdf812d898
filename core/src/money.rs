//! Monetary primitives for the Vela ledger.
//!
//! Every amount in the system is an integer count of a currency's smallest
//! indivisible unit -- kobo, cents, pesewas. No floating point anywhere near
//! money: binary floats cannot represent 0.10 exactly, and a ledger that
//! drifts by rounding is a ledger that gets audited by regulators.
//!
//! The `decimals` value on [`Currency`] exists purely for display
//! formatting. The core never divides an amount.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Currency
// ---------------------------------------------------------------------------

/// Supported currency denominations.
///
/// These are the currencies the platform natively understands for wallet
/// denomination and display formatting. Platform tokens (loyalty points,
/// in-app credits) use [`Currency::Custom`] with an arbitrary ticker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// Nigerian Naira (smallest unit: kobo, 10^-2).
    NGN,
    /// United States Dollar (smallest unit: cent, 10^-2).
    USD,
    /// Ghanaian Cedi (smallest unit: pesewa, 10^-2).
    GHS,
    /// Kenyan Shilling (smallest unit: cent, 10^-2).
    KES,
    /// Arbitrary token identifier for platform-issued assets.
    Custom(String),
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NGN => write!(f, "NGN"),
            Self::USD => write!(f, "USD"),
            Self::GHS => write!(f, "GHS"),
            Self::KES => write!(f, "KES"),
            Self::Custom(ticker) => write!(f, "{}", ticker),
        }
    }
}

impl Currency {
    /// Returns the number of decimal places for display formatting.
    ///
    /// This is purely for human-readable output. The core always operates
    /// on integer amounts in the smallest unit.
    pub fn decimals(&self) -> u8 {
        match self {
            Self::NGN | Self::USD | Self::GHS | Self::KES => 2,
            Self::Custom(_) => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A monetary amount expressed in the smallest indivisible unit of a currency.
///
/// `value` is always an integer. For NGN, `value = 150_000` means
/// ₦1,500.00. The `currency` field determines the denomination.
///
/// # Examples
///
/// ```
/// use vela_core::money::{Amount, Currency};
///
/// let airtime = Amount::new(50_000, Currency::NGN); // ₦500.00
/// let one_dollar = Amount::new(100, Currency::USD);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    /// Value in the smallest indivisible unit of the currency.
    pub value: u64,
    /// The currency denomination.
    pub currency: Currency,
}

impl Amount {
    /// Creates a new amount.
    pub fn new(value: u64, currency: Currency) -> Self {
        Self { value, currency }
    }

    /// Returns `true` if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// Returns a human-readable string with decimal formatting.
    ///
    /// Example: `Amount { value: 150_000, currency: NGN }` becomes
    /// `"1500.00 NGN"`.
    pub fn display_decimal(&self) -> String {
        let decimals = self.currency.decimals() as u32;
        let divisor = 10u64.pow(decimals);
        let whole = self.value / divisor;
        let frac = self.value % divisor;
        format!(
            "{}.{:0>width$} {}",
            whole,
            frac,
            self.currency,
            width = decimals as usize
        )
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
