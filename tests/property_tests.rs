//! Property-based tests for pricing, coupon and formatting invariants.

use chrono::Utc;
use proptest::prelude::*;
use sea_orm::Iterable;
use storefront_api::{
    entities::{
        coupon::{self, DiscountType},
        order::OrderStatus,
    },
    notifications::{format_e164, templates::group_indian},
    services::{
        coupons::discount_for,
        orders::{can_transition, generate_confirmation_number},
        pricing::{
            apply_basis_points, calculate_totals, paise_to_rupees, rupees_to_paise, LineAmount,
            PricingPolicy,
        },
    },
};
use uuid::Uuid;

fn line_strategy() -> impl Strategy<Value = LineAmount> {
    (1i32..=100, 100i64..=50_000_000).prop_map(|(qty, price)| LineAmount::new(qty, price))
}

fn coupon(kind: DiscountType, value: i64, cap: Option<i64>) -> coupon::Model {
    let now = Utc::now();
    coupon::Model {
        id: Uuid::new_v4(),
        code: "PROPTEST".into(),
        description: None,
        discount_type: kind,
        discount_value: value,
        minimum_order_paise: None,
        maximum_discount_paise: cap,
        valid_from: None,
        valid_until: None,
        usage_limit: None,
        user_usage_limit: None,
        usage_count: 0,
        allowed_users: None,
        excluded_users: None,
        applicable_products: None,
        excluded_products: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn totals_always_add_up(
        lines in prop::collection::vec(line_strategy(), 1..20),
        discount in 0i64..10_000_000,
    ) {
        let policy = PricingPolicy::default();
        let totals = calculate_totals(&lines, &policy).with_discount(discount);

        let subtotal: i64 = lines.iter().map(LineAmount::total).sum();
        prop_assert_eq!(totals.subtotal, subtotal);
        prop_assert!(totals.discount <= totals.subtotal);
        prop_assert_eq!(
            totals.total,
            totals.subtotal + totals.tax + totals.shipping - totals.discount
        );
        prop_assert!(totals.total >= totals.tax);
    }

    #[test]
    fn shipping_is_free_above_threshold(lines in prop::collection::vec(line_strategy(), 1..10)) {
        let policy = PricingPolicy::default();
        let totals = calculate_totals(&lines, &policy);
        if totals.subtotal >= policy.free_shipping_threshold_paise {
            prop_assert_eq!(totals.shipping, 0);
        } else {
            prop_assert_eq!(totals.shipping, policy.shipping_fee_paise);
        }
    }

    #[test]
    fn tax_is_within_half_a_paisa(subtotal in 0i64..1_000_000_000) {
        let tax = apply_basis_points(subtotal, 1800);
        let exact = subtotal as f64 * 0.18;
        prop_assert!((tax as f64 - exact).abs() <= 0.5 + f64::EPSILON * exact);
    }

    #[test]
    fn percentage_discount_respects_cap(
        subtotal in 0i64..100_000_000,
        bp in 1i64..=10_000,
        cap in prop::option::of(1i64..1_000_000),
    ) {
        let discount = discount_for(&coupon(DiscountType::Percentage, bp, cap), subtotal);
        prop_assert!(discount >= 0);
        prop_assert!(discount <= subtotal);
        if let Some(cap) = cap {
            prop_assert!(discount <= cap);
        }
    }

    #[test]
    fn fixed_discount_never_exceeds_subtotal(
        subtotal in 0i64..10_000_000,
        amount in 1i64..10_000_000,
    ) {
        let discount = discount_for(&coupon(DiscountType::FixedAmount, amount, None), subtotal);
        prop_assert_eq!(discount, amount.min(subtotal));
    }

    #[test]
    fn paise_survive_the_api_boundary(paise in -1_000_000_000i64..1_000_000_000) {
        prop_assert_eq!(rupees_to_paise(paise_to_rupees(paise)), Some(paise));
    }

    #[test]
    fn local_numbers_gain_country_code(number in "[6-9][0-9]{9}") {
        let formatted = format_e164(&number, "+91").unwrap();
        prop_assert_eq!(formatted, format!("+91{}", number));
    }

    #[test]
    fn indian_grouping_keeps_digits(n in 0u64..10_000_000_000_000) {
        let grouped = group_indian(n);
        prop_assert_eq!(grouped.replace(',', ""), n.to_string());
        if let Some(last) = grouped.rsplit(',').next() {
            if grouped.contains(',') {
                prop_assert_eq!(last.len(), 3);
            }
        }
    }
}

#[test]
fn confirmation_numbers_are_unique_and_shaped() {
    let mut seen = std::collections::HashSet::new();
    for _ in 0..1_000 {
        let cn = generate_confirmation_number();
        let parts: Vec<&str> = cn.split('-').collect();
        assert_eq!(parts.len(), 3, "{cn}");
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[2].len(), 6);
        assert!(cn
            .chars()
            .all(|c| c == '-' || c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert!(seen.insert(cn));
    }
}

#[test]
fn terminal_states_have_no_exits() {
    for terminal in [OrderStatus::Delivered, OrderStatus::Cancelled, OrderStatus::Refunded] {
        for to in OrderStatus::iter().filter(|s| *s != terminal) {
            assert!(
                !can_transition(terminal, to),
                "{terminal} -> {to} must be refused"
            );
        }
    }
}
