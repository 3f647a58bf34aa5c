//! Checkout totals.
//!
//! All arithmetic is done in paise (`i64`). Rupee `Decimal`s only appear at the
//! API boundary via [`paise_to_rupees`] / [`rupees_to_paise`].

use crate::config::PricingConfig;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

const BASIS_POINTS: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    pub tax_rate_bp: i64,
    pub shipping_fee_paise: i64,
    pub free_shipping_threshold_paise: i64,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self::from(&PricingConfig::default())
    }
}

impl From<&PricingConfig> for PricingPolicy {
    fn from(cfg: &PricingConfig) -> Self {
        Self {
            tax_rate_bp: cfg.tax_rate_bp,
            shipping_fee_paise: cfg.shipping_fee_paise,
            free_shipping_threshold_paise: cfg.free_shipping_threshold_paise,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmount {
    pub quantity: i32,
    pub unit_price_paise: i64,
}

impl LineAmount {
    pub fn new(quantity: i32, unit_price_paise: i64) -> Self {
        Self {
            quantity,
            unit_price_paise,
        }
    }

    pub fn total(&self) -> i64 {
        i64::from(self.quantity.max(0)) * self.unit_price_paise.max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: i64,
    pub tax: i64,
    pub shipping: i64,
    pub discount: i64,
    pub total: i64,
}

impl Totals {
    /// Applies a discount, clamped to `[0, subtotal]`, and recomputes the total.
    pub fn with_discount(self, discount_paise: i64) -> Self {
        let discount = discount_paise.clamp(0, self.subtotal);
        Self {
            discount,
            total: self.subtotal + self.tax + self.shipping - discount,
            ..self
        }
    }
}

/// Multiplies by a basis-point rate, rounding half away from zero.
pub fn apply_basis_points(amount_paise: i64, bp: i64) -> i64 {
    let product = i128::from(amount_paise) * i128::from(bp);
    let half = i128::from(BASIS_POINTS / 2);
    let rounded = if product >= 0 {
        (product + half) / i128::from(BASIS_POINTS)
    } else {
        (product - half) / i128::from(BASIS_POINTS)
    };
    rounded as i64
}

pub fn subtotal(items: &[LineAmount]) -> i64 {
    items.iter().map(LineAmount::total).sum()
}

pub fn tax_for(subtotal_paise: i64, policy: &PricingPolicy) -> i64 {
    apply_basis_points(subtotal_paise, policy.tax_rate_bp)
}

pub fn shipping_for(subtotal_paise: i64, policy: &PricingPolicy) -> i64 {
    if subtotal_paise <= 0 || subtotal_paise >= policy.free_shipping_threshold_paise {
        0
    } else {
        policy.shipping_fee_paise
    }
}

/// Totals before any coupon. Tax is charged on the undiscounted subtotal.
pub fn calculate_totals(items: &[LineAmount], policy: &PricingPolicy) -> Totals {
    let subtotal = subtotal(items);
    let tax = tax_for(subtotal, policy);
    let shipping = shipping_for(subtotal, policy);
    Totals {
        subtotal,
        tax,
        shipping,
        discount: 0,
        total: subtotal + tax + shipping,
    }
}

pub fn paise_to_rupees(paise: i64) -> Decimal {
    Decimal::new(paise, 2)
}

/// Converts a rupee amount to paise, rounding half away from zero. Returns
/// `None` when the value does not fit.
pub fn rupees_to_paise(rupees: Decimal) -> Option<i64> {
    (rupees * Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Rupee view of [`Totals`] used in API payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TotalsView {
    pub subtotal: Decimal,
    pub estimated_tax: Decimal,
    pub estimated_shipping: Decimal,
    pub discount: Decimal,
    pub estimated_total: Decimal,
}

impl From<Totals> for TotalsView {
    fn from(t: Totals) -> Self {
        Self {
            subtotal: paise_to_rupees(t.subtotal),
            estimated_tax: paise_to_rupees(t.tax),
            estimated_shipping: paise_to_rupees(t.shipping),
            discount: paise_to_rupees(t.discount),
            estimated_total: paise_to_rupees(t.total),
        }
    }
}
