//! Value objects for the order domain.

use common::ProductId;
use serde::{Deserialize, Serialize};

use super::OrderError;

/// Money amount with two decimal places, stored in cents to avoid floating point issues.
///
/// Serialized as a decimal string (`"20.00"`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Money {
    cents: i64,
}

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    pub fn cents(&self) -> i64 {
        self.cents
    }

    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity, or `None` when the amount does not fit.
    pub fn checked_mul(&self, quantity: u32) -> Option<Money> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Money::from_cents)
    }

    pub fn checked_add(&self, rhs: Money) -> Option<Money> {
        self.cents.checked_add(rhs.cents).map(Money::from_cents)
    }

    /// Multiplies by a quantity, clamping at the representable range.
    pub fn saturating_mul(&self, quantity: u32) -> Money {
        Money::from_cents(self.cents.saturating_mul(i64::from(quantity)))
    }
}

/// Error returned when a string is not a valid two-decimal amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid money amount: {0}")]
pub struct InvalidMoney(pub String);

impl std::str::FromStr for Money {
    type Err = InvalidMoney;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidMoney(s.to_string());
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));

        if whole.is_empty()
            || fraction.len() > 2
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(fraction))
            .ok_or_else(invalid)?;

        Ok(Money {
            cents: if negative { -cents } else { cents },
        })
    }
}

impl TryFrom<String> for Money {
    type Error = InvalidMoney;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Money> for String {
    fn from(money: Money) -> Self {
        money.to_string()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// A product line of an order: what was ordered and at which unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProduct {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

impl OrderProduct {
    /// Creates a product line, validating quantity, price and the line total.
    pub fn new(product_id: ProductId, quantity: u32, price: Money) -> Result<Self, OrderError> {
        if quantity < 1 {
            return Err(OrderError::InvalidQuantity { product_id });
        }
        if price.is_negative() {
            return Err(OrderError::InvalidPrice { product_id });
        }
        let line = Self {
            product_id,
            quantity,
            price,
        };
        line.checked_total()?;
        Ok(line)
    }

    /// Returns `quantity * price`.
    pub fn checked_total(&self) -> Result<Money, OrderError> {
        self.price
            .checked_mul(self.quantity)
            .ok_or(OrderError::AmountOverflow)
    }

    /// Returns `quantity * price` for display; lines built through
    /// [`OrderProduct::new`] never reach the clamp.
    pub fn total(&self) -> Money {
        self.price.saturating_mul(self.quantity)
    }
}

/// Sums the line totals of an order.
pub fn order_sum(products: &[OrderProduct]) -> Result<Money, OrderError> {
    products.iter().try_fold(Money::zero(), |sum, line| {
        sum.checked_add(line.checked_total()?)
            .ok_or(OrderError::AmountOverflow)
    })
}

/// Contact and delivery details of the client who placed the order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDetails {
    pub client_name: String,
    pub client_surname: String,
    pub client_email: String,
    pub client_phone: String,
    pub delivery_address: String,
}
