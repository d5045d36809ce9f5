//! Multi-year liability projection.
//!
//! Every projected year is derived fresh from the baseline return by
//! compounding the growth assumptions, never by mutating the previous
//! year's state, so re-running a projection (or a shorter prefix of it)
//! reproduces the same numbers.

use super::calculator::{calculate_unchecked, round_currency, LiabilityBreakdown};
use super::model::{TaxReturn, ValidationError};
use super::rates::{ConfigurationError, RateTable};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Longest supported projection horizon
const MAX_HORIZON_YEARS: u32 = 100;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("base return is invalid: {0}")]
    BaseInvalid(#[from] ValidationError),
    #[error("invalid projection assumption: {0}")]
    InvalidAssumption(&'static str),
}

/// Growth and conversion assumptions for a projection run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectionAssumptions {
    pub start_year: u16,
    /// Horizon length in years, from one to a hundred
    pub years: u32,
    /// Annual growth applied to every income field
    #[schemars(with = "f64")]
    pub income_growth: Decimal,
    /// Annual growth applied to itemizable deductions
    #[schemars(with = "f64")]
    pub deduction_growth: Decimal,
    /// Optional Roth conversion ladder drawn from a traditional balance
    #[serde(default)]
    pub roth: Option<RothLadder>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RothLadder {
    /// Traditional (pre-tax) balance available to convert
    #[schemars(with = "f64")]
    pub traditional_balance: Decimal,
}

impl ProjectionAssumptions {
    /// Check the assumptions alone, before any rate tables are built
    pub fn validate(&self) -> Result<(), ProjectionError> {
        if self.years == 0 {
            return Err(ProjectionError::InvalidAssumption(
                "horizon must cover at least one year",
            ));
        }
        if self.years > MAX_HORIZON_YEARS {
            return Err(ProjectionError::InvalidAssumption(
                "horizon cannot cover more than 100 years",
            ));
        }
        if self.start_year.checked_add((self.years - 1) as u16).is_none() {
            return Err(ProjectionError::InvalidAssumption(
                "horizon runs past the representable year range",
            ));
        }
        if self.income_growth <= dec!(-1) || self.deduction_growth <= dec!(-1) {
            return Err(ProjectionError::InvalidAssumption(
                "growth cannot be -100% or lower",
            ));
        }
        if let Some(roth) = &self.roth {
            if roth.traditional_balance < Decimal::ZERO {
                return Err(ProjectionError::InvalidAssumption(
                    "traditional balance cannot be negative",
                ));
            }
        }
        Ok(())
    }
}

/// One projected year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct YearProjection {
    pub year: u16,
    pub breakdown: LiabilityBreakdown,
    /// Roth principal converted this year (bracket-headroom fill)
    #[schemars(with = "f64")]
    pub roth_converted: Decimal,
    /// Ordinary tax on the conversion, at the bracket rate it filled
    #[schemars(with = "f64")]
    pub conversion_tax: Decimal,
    /// Year liability including conversion tax
    #[schemars(with = "f64")]
    pub combined_liability: Decimal,
    /// Running total through this year
    #[schemars(with = "f64")]
    pub cumulative_liability: Decimal,
}

/// Full projection output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Projection {
    pub years: Vec<YearProjection>,
    #[schemars(with = "f64")]
    pub total_liability: Decimal,
    #[schemars(with = "f64")]
    pub total_converted: Decimal,
    /// Traditional balance left after the ladder
    #[schemars(with = "f64")]
    pub remaining_balance: Decimal,
}

/// Project the return across the horizon.
///
/// Each projected year needs its own entry in `tables`; a gap is a
/// configuration error rather than a silent reuse of a stale year.
pub fn project(
    ret: &TaxReturn,
    tables: &BTreeMap<u16, RateTable>,
    assumptions: &ProjectionAssumptions,
) -> Result<Projection, ProjectionError> {
    assumptions.validate()?;
    let first_table = tables
        .get(&assumptions.start_year)
        .ok_or(ConfigurationError::MissingYear(assumptions.start_year))?;
    ret.validate(first_table)?;

    let mut years = Vec::with_capacity(assumptions.years as usize);
    let mut balance = assumptions
        .roth
        .as_ref()
        .map(|r| r.traditional_balance)
        .unwrap_or(Decimal::ZERO);
    let mut cumulative = Decimal::ZERO;
    let mut total_converted = Decimal::ZERO;

    for offset in 0..assumptions.years {
        let year = assumptions.start_year + offset as u16;
        let rates = tables
            .get(&year)
            .ok_or(ConfigurationError::MissingYear(year))?;

        let income_factor = compound(assumptions.income_growth, offset);
        let deduction_factor = compound(assumptions.deduction_growth, offset);
        let scaled = scaled_return(ret, rates, income_factor, deduction_factor);
        let breakdown = calculate_unchecked(&scaled, rates);

        let (roth_converted, conversion_tax) = if balance > Decimal::ZERO {
            convert_into_headroom(&breakdown, rates, balance)
        } else {
            (Decimal::ZERO, Decimal::ZERO)
        };
        balance -= roth_converted;
        total_converted += roth_converted;

        let combined_liability = round_currency(breakdown.total_liability + conversion_tax);
        cumulative += combined_liability;
        log::debug!(
            "year {year} liability {} converted {}",
            combined_liability,
            roth_converted
        );

        years.push(YearProjection {
            year,
            breakdown,
            roth_converted,
            conversion_tax,
            combined_liability,
            cumulative_liability: cumulative,
        });
    }

    Ok(Projection {
        total_liability: cumulative,
        total_converted,
        remaining_balance: balance,
        years,
    })
}

/// (1 + growth)^periods by repeated multiplication
fn compound(growth: Decimal, periods: u32) -> Decimal {
    let base = Decimal::ONE + growth;
    let mut factor = Decimal::ONE;
    for _ in 0..periods {
        factor *= base;
    }
    factor
}

/// Baseline return advanced to a projected year: income and deductions
/// compound, contributions persist but are clamped to the year's limits
/// (future statutory limits may differ from the baseline year's).
fn scaled_return(
    ret: &TaxReturn,
    rates: &RateTable,
    income_factor: Decimal,
    deduction_factor: Decimal,
) -> TaxReturn {
    let mut scaled = ret.clone();

    let income = &mut scaled.income;
    income.wages *= income_factor;
    income.self_employment *= income_factor;
    income.investment *= income_factor;
    income.capital_gains *= income_factor;
    income.rental *= income_factor;
    if let Some(spouse) = &mut scaled.taxpayer.spouse {
        spouse.wages *= income_factor;
    }
    if let Some(business) = &mut scaled.business {
        business.net_income *= income_factor;
        if let Some(salary) = &mut business.elected_salary {
            *salary *= income_factor;
        }
    }

    let deductions = &mut scaled.deductions;
    deductions.state_local_taxes *= deduction_factor;
    deductions.mortgage_interest *= deduction_factor;
    deductions.charitable_cash *= deduction_factor;
    deductions.medical_expenses *= deduction_factor;
    deductions.other_itemized *= deduction_factor;

    let age = scaled.taxpayer.age;
    let limits = &rates.limits;
    let adjustments = &mut scaled.adjustments;
    adjustments.retirement_401k = adjustments.retirement_401k.min(limits.max_401k(age));
    adjustments.traditional_ira = adjustments.traditional_ira.min(limits.max_ira(age));
    adjustments.hsa = adjustments
        .hsa
        .min(limits.max_hsa(age, scaled.credits.hsa_family_coverage));

    scaled
}

/// Greedy ladder step: convert up to the distance between taxable income
/// and the current bracket's upper edge, so the conversion never spills
/// into a higher bracket. Returns (converted, tax on it).
fn convert_into_headroom(
    breakdown: &LiabilityBreakdown,
    rates: &RateTable,
    balance: Decimal,
) -> (Decimal, Decimal) {
    match rates.bracket_headroom(breakdown.filing_status, breakdown.taxable_income) {
        Some((headroom, _)) if headroom > Decimal::ZERO => {
            let converted = balance.min(headroom);
            let rate = rates.marginal_rate(breakdown.filing_status, breakdown.taxable_income);
            (converted, converted * rate)
        }
        _ => (Decimal::ZERO, Decimal::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{FilingStatus, Income, Taxpayer};
    use std::collections::BTreeSet;

    fn wage_earner(wages: Decimal) -> TaxReturn {
        TaxReturn {
            taxpayer: Taxpayer {
                filing_status: FilingStatus::Single,
                dependents: 0,
                qualifying_children: 0,
                age: Some(40),
                spouse: None,
            },
            income: Income {
                wages,
                ..Income::default()
            },
            adjustments: Default::default(),
            deductions: Default::default(),
            credits: Default::default(),
            business: None,
            estimated_fields: BTreeSet::new(),
        }
    }

    fn two_year_tables() -> BTreeMap<u16, RateTable> {
        BTreeMap::from([(2024, RateTable::year_2024()), (2025, RateTable::year_2025())])
    }

    fn assumptions(years: u32, growth: Decimal) -> ProjectionAssumptions {
        ProjectionAssumptions {
            start_year: 2024,
            years,
            income_growth: growth,
            deduction_growth: growth,
            roth: None,
        }
    }

    #[test]
    fn missing_year_table_is_configuration_error() {
        let ret = wage_earner(dec!(85000));
        let mut tables = two_year_tables();
        tables.remove(&2025);
        let err = project(&ret, &tables, &assumptions(2, dec!(0.03))).unwrap_err();
        assert_eq!(
            err,
            ProjectionError::Configuration(ConfigurationError::MissingYear(2025))
        );
    }

    #[test]
    fn zero_year_horizon_rejected() {
        let ret = wage_earner(dec!(85000));
        let err = project(&ret, &two_year_tables(), &assumptions(0, dec!(0.03))).unwrap_err();
        assert!(matches!(err, ProjectionError::InvalidAssumption(_)));
    }

    #[test]
    fn overlong_horizon_rejected() {
        let ret = wage_earner(dec!(85000));
        let err = project(&ret, &two_year_tables(), &assumptions(101, dec!(0.03))).unwrap_err();
        assert!(matches!(err, ProjectionError::InvalidAssumption(_)));
    }

    #[test]
    fn horizon_past_the_year_range_rejected() {
        let mut assumptions = assumptions(100, dec!(0.03));
        assumptions.start_year = u16::MAX - 10;
        assert!(matches!(
            assumptions.validate(),
            Err(ProjectionError::InvalidAssumption(_))
        ));
    }

    #[test]
    fn first_year_matches_direct_calculation() {
        let ret = wage_earner(dec!(85000));
        let projection = project(&ret, &two_year_tables(), &assumptions(2, dec!(0.03))).unwrap();
        assert_eq!(projection.years[0].breakdown.total_liability, dec!(10541.00));
        assert_eq!(projection.years[0].year, 2024);
        assert_eq!(projection.years[1].year, 2025);
    }

    #[test]
    fn agi_strictly_increases_with_positive_growth() {
        let ret = wage_earner(dec!(85000));
        let tables = BTreeMap::from([
            (2024, RateTable::year_2024()),
            (2025, RateTable::year_2025()),
            // Reuse the 2025 table shape for later hypothetical years
            (2026, with_year(2026)),
            (2027, with_year(2027)),
        ]);
        let projection = project(&ret, &tables, &assumptions(4, dec!(0.04))).unwrap();
        for pair in projection.years.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(b.breakdown.agi > a.breakdown.agi);
            // Liability grows slower than AGI: the marginal rate is
            // always below 100%
            let delta_agi = b.breakdown.agi - a.breakdown.agi;
            let delta_tax = b.combined_liability - a.combined_liability;
            assert!(delta_tax < delta_agi);
        }
    }

    fn with_year(year: u16) -> RateTable {
        let mut table = RateTable::year_2025();
        table.year = year;
        table
    }

    #[test]
    fn rerun_is_identical_and_prefix_stable() {
        let ret = wage_earner(dec!(110000));
        let tables = two_year_tables();
        let a = project(&ret, &tables, &assumptions(2, dec!(0.03))).unwrap();
        let b = project(&ret, &tables, &assumptions(2, dec!(0.03))).unwrap();
        assert_eq!(a, b);

        let shorter = project(&ret, &tables, &assumptions(1, dec!(0.03))).unwrap();
        assert_eq!(shorter.years[0], a.years[0]);
    }

    #[test]
    fn cumulative_totals_add_up() {
        let ret = wage_earner(dec!(95000));
        let projection = project(&ret, &two_year_tables(), &assumptions(2, dec!(0.02))).unwrap();
        let sum: Decimal = projection
            .years
            .iter()
            .map(|y| y.combined_liability)
            .sum();
        assert_eq!(projection.total_liability, sum);
        assert_eq!(
            projection.years.last().unwrap().cumulative_liability,
            sum
        );
    }

    #[test]
    fn roth_ladder_fills_bracket_headroom() {
        let ret = wage_earner(dec!(85000));
        let mut assumptions = assumptions(2, Decimal::ZERO);
        assumptions.roth = Some(RothLadder {
            traditional_balance: dec!(500000),
        });
        let projection = project(&ret, &two_year_tables(), &assumptions).unwrap();

        // 2024: taxable 70,400 sits in the 22% bracket with 30,125 of
        // headroom to the 100,525 edge
        let first = &projection.years[0];
        assert_eq!(first.roth_converted, dec!(30125));
        assert_eq!(first.conversion_tax, dec!(30125) * dec!(0.22));
        assert_eq!(
            projection.remaining_balance,
            dec!(500000) - projection.total_converted
        );
        assert!(projection.total_converted > dec!(30125));
    }

    #[test]
    fn roth_ladder_stops_at_balance() {
        let ret = wage_earner(dec!(85000));
        let mut assumptions = assumptions(2, Decimal::ZERO);
        assumptions.roth = Some(RothLadder {
            traditional_balance: dec!(10000),
        });
        let projection = project(&ret, &two_year_tables(), &assumptions).unwrap();
        assert_eq!(projection.years[0].roth_converted, dec!(10000));
        assert_eq!(projection.years[1].roth_converted, Decimal::ZERO);
        assert_eq!(projection.remaining_balance, Decimal::ZERO);
    }

    #[test]
    fn contributions_clamped_to_future_limits() {
        let mut ret = wage_earner(dec!(120000));
        ret.adjustments.retirement_401k = dec!(23000);
        // Hypothetical future year with a lower limit
        let mut tight = RateTable::year_2025();
        tight.year = 2025;
        tight.limits.retirement_401k = dec!(20000);
        tight.limits.retirement_401k_catch_up = Decimal::ZERO;
        let tables = BTreeMap::from([(2024, RateTable::year_2024()), (2025, tight)]);

        let projection = project(&ret, &tables, &assumptions(2, Decimal::ZERO)).unwrap();
        let agi_2024 = projection.years[0].breakdown.agi;
        let agi_2025 = projection.years[1].breakdown.agi;
        // 3,000 less deferred in the tight year
        assert_eq!(agi_2025 - agi_2024, dec!(3000));
    }
}
