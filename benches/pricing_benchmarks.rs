use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use storefront_api::{
    entities::coupon::{self, DiscountType},
    services::{
        coupons::{evaluate_coupon, CouponContext},
        pricing::{calculate_totals, paise_to_rupees, LineAmount, PricingPolicy},
    },
};
use uuid::Uuid;

fn lines(count: usize) -> Vec<LineAmount> {
    (0..count)
        .map(|i| LineAmount::new((i % 3 + 1) as i32, 45_000 + (i as i64) * 1_250))
        .collect()
}

fn totals_benchmark(c: &mut Criterion) {
    let policy = PricingPolicy::default();
    let mut group = c.benchmark_group("checkout_totals");

    for size in [1usize, 5, 20, 100].iter() {
        let items = lines(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &items, |b, items| {
            b.iter(|| calculate_totals(black_box(items), black_box(&policy)));
        });
    }

    group.finish();
}

fn scoped_coupon(products: &[Uuid]) -> coupon::Model {
    let now = Utc::now();
    coupon::Model {
        id: Uuid::new_v4(),
        code: "FESTIVE10".into(),
        description: None,
        discount_type: DiscountType::Percentage,
        discount_value: 1_000,
        minimum_order_paise: Some(100_000),
        maximum_discount_paise: Some(15_000),
        valid_from: Some(now - Duration::days(1)),
        valid_until: Some(now + Duration::days(30)),
        usage_limit: Some(1_000),
        user_usage_limit: Some(2),
        usage_count: 10,
        allowed_users: None,
        excluded_users: Some(serde_json::json!([Uuid::new_v4()])),
        applicable_products: Some(serde_json::json!(products)),
        excluded_products: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

fn coupon_benchmark(c: &mut Criterion) {
    let products: Vec<Uuid> = (0..10).map(|_| Uuid::new_v4()).collect();
    let coupon = scoped_coupon(&products);
    let user = Uuid::new_v4();
    let now = Utc::now();

    c.bench_function("evaluate_coupon", |b| {
        b.iter(|| {
            let ctx = CouponContext {
                code: "FESTIVE10",
                user_id: Some(user),
                subtotal_paise: black_box(250_000),
                product_ids: &products,
            };
            evaluate_coupon(black_box(&coupon), &ctx, 0, now)
        });
    });
}

fn rupee_conversion_benchmark(c: &mut Criterion) {
    c.bench_function("paise_to_rupees", |b| {
        b.iter(|| paise_to_rupees(black_box(1_234_567)));
    });
}

criterion_group!(
    benches,
    totals_benchmark,
    coupon_benchmark,
    rupee_conversion_benchmark
);
criterion_main!(benches);
