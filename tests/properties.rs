//! Property tests for structural invariants: determinism, the zero-delta
//! baseline, ranking order, field-claim disjointness and confidence
//! bounds, across randomly composed returns.

use proptest::prelude::{prop_assert, prop_assert_eq, proptest};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use taxplan::core::{
    analyze, calculate, compare, Business, EntityType, FilingStatus, Income, RateTable, Scenario,
    TaxReturn, Taxpayer,
};

/// Compose a valid return from plain integers. Contribution inputs stay
/// inside the 2024 under-50 limits so validation always passes.
#[allow(clippy::too_many_arguments)]
fn sample_return(
    status_pick: usize,
    wages_cents: u64,
    se_cents: u64,
    capital: i32,
    salt: u32,
    charitable: u32,
    deferral_401k: u32,
    ira: u32,
    dependents: u32,
    children: u32,
    business_net: u32,
) -> TaxReturn {
    let mut ret = TaxReturn {
        taxpayer: Taxpayer {
            filing_status: FilingStatus::all()[status_pick % 4],
            dependents,
            qualifying_children: children.min(dependents),
            age: Some(40),
            spouse: None,
        },
        income: Income {
            wages: Decimal::new(wages_cents as i64, 2),
            self_employment: Decimal::new(se_cents as i64, 2),
            capital_gains: Decimal::from(capital),
            ..Income::default()
        },
        adjustments: Default::default(),
        deductions: Default::default(),
        credits: Default::default(),
        business: None,
        estimated_fields: Default::default(),
    };
    ret.adjustments.retirement_401k = Decimal::from(deferral_401k);
    ret.adjustments.traditional_ira = Decimal::from(ira);
    ret.deductions.state_local_taxes = Decimal::from(salt);
    ret.deductions.charitable_cash = Decimal::from(charitable);
    if business_net > 0 {
        ret.business = Some(Business {
            entity_type: EntityType::SoleProprietorship,
            net_income: Decimal::from(business_net),
            elected_salary: None,
            specified_service: false,
        });
    }
    ret
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(64))]

    #[test]
    fn prop_calculate_is_deterministic(
        status_pick in 0usize..4,
        wages_cents in 0u64..40_000_000,
        se_cents in 0u64..20_000_000,
        capital in -20_000i32..50_000,
        salt in 0u32..30_000,
        charitable in 0u32..20_000,
        deferral_401k in 0u32..23_001,
        ira in 0u32..7_001,
        dependents in 0u32..4,
        children in 0u32..4,
    ) {
        let ret = sample_return(
            status_pick, wages_cents, se_cents, capital, salt, charitable,
            deferral_401k, ira, dependents, children, 0,
        );
        let rates = RateTable::year_2024();
        let first = calculate(&ret, &rates).unwrap();
        let second = calculate(&ret, &rates).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert!(first.taxable_income >= Decimal::ZERO);
        prop_assert!(first.effective_rate >= Decimal::ZERO);
    }

    #[test]
    fn prop_no_change_scenario_saves_exactly_zero(
        status_pick in 0usize..4,
        wages_cents in 0u64..40_000_000,
        se_cents in 0u64..20_000_000,
        salt in 0u32..30_000,
        charitable in 0u32..20_000,
    ) {
        let ret = sample_return(
            status_pick, wages_cents, se_cents, 0, salt, charitable, 0, 0, 0, 0, 0,
        );
        let rates = RateTable::year_2024();
        let comparison = compare(&ret, &[Scenario::new("no change")], &rates).unwrap();
        prop_assert_eq!(comparison.outcomes[0].savings, Decimal::ZERO);
        prop_assert_eq!(
            &comparison.outcomes[0].breakdown,
            &comparison.baseline
        );
    }
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(32))]

    #[test]
    fn prop_plan_is_ranked_with_disjoint_claims(
        status_pick in 0usize..4,
        wages_cents in 0u64..40_000_000,
        salt in 0u32..30_000,
        charitable in 0u32..20_000,
        deferral_401k in 0u32..23_001,
        dependents in 0u32..4,
        business_net in 0u32..250_000,
    ) {
        let ret = sample_return(
            status_pick, wages_cents, 0, 0, salt, charitable,
            deferral_401k, 0, dependents, dependents, business_net,
        );
        let plan = analyze(&ret, &RateTable::year_2024()).unwrap();

        prop_assert!(plan.optimized.total_liability <= plan.current.total_liability);
        for (i, a) in plan.recommendations.iter().enumerate() {
            prop_assert!(a.estimated_savings >= Decimal::ZERO);
            prop_assert!(a.confidence >= dec!(0.05) && a.confidence <= dec!(0.99));
            if let Some([low, high]) = a.savings_range {
                prop_assert!(low <= a.estimated_savings && a.estimated_savings <= high);
            }
            for b in &plan.recommendations[i + 1..] {
                prop_assert!(a.estimated_savings >= b.estimated_savings);
                prop_assert!(a.fields.is_disjoint(&b.fields));
            }
        }
    }
}
