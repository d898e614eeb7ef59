//! Type-safe price representation using decimal arithmetic.
//!
//! Money is held as a [`Decimal`] rounded to whole cents. Floating point is
//! never used, so `12.99 * 2` is exactly `25.98` and percentage charges are
//! rounded once, half away from zero, at the point they are derived.
//!
//! Conversion to integer minor units only happens at the payment boundary
//! ([`Price::to_minor_units`]).

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, Mul};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is below zero.
    #[error("price cannot be negative")]
    Negative,
    /// The amount does not fit in `i64` minor units.
    #[error("price is too large")]
    Overflow,
}

/// A non-negative amount of money in the shop currency, rounded to cents.
///
/// ## Examples
///
/// ```
/// use lamplight_core::Price;
///
/// let book = Price::from_cents(1299);
/// assert_eq!((book * 2).to_string(), "$25.98");
/// assert_eq!((book * 2).to_minor_units().ok(), Some(2598));
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Zero dollars.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price from a decimal amount, rounding to cents.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` if the amount is below zero.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        Ok(Self(round_cents(amount)))
    }

    /// Create a price from a whole number of cents.
    #[must_use]
    pub const fn from_cents(cents: u32) -> Self {
        Self(Decimal::from_parts(cents, 0, 0, false, 2))
    }

    /// Returns the decimal amount (e.g. `12.99`).
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns `true` if the price is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns `rate` of this price (e.g. `0.08` for 8%), rounded to cents.
    #[must_use]
    pub fn percentage(&self, rate: Decimal) -> Self {
        Self(round_cents(self.0 * rate))
    }

    /// Convert to integer minor units (cents) for payment providers.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` if the amount does not fit in `i64`.
    pub fn to_minor_units(&self) -> Result<i64, PriceError> {
        (self.0 * Decimal::ONE_HUNDRED)
            .trunc()
            .to_i64()
            .ok_or(PriceError::Overflow)
    }
}

fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Mul<u32> for Price {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self::Output {
        Self(self.0 * Decimal::from(rhs))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// ISO 4217 currency codes accepted by the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    CAD,
    GBP,
    EUR,
    AUD,
}

impl CurrencyCode {
    /// Lowercase code as expected by Stripe (e.g. `"usd"`).
    #[must_use]
    pub const fn as_stripe_code(&self) -> &'static str {
        match self {
            Self::USD => "usd",
            Self::CAD => "cad",
            Self::GBP => "gbp",
            Self::EUR => "eur",
            Self::AUD => "aud",
        }
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::USD),
            "cad" => Ok(Self::CAD),
            "gbp" => Ok(Self::GBP),
            "eur" => Ok(Self::EUR),
            "aud" => Ok(Self::AUD),
            _ => Err(format!("unsupported currency: {s}")),
        }
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Price {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Price {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Price {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
