//! Entity structure comparison: sole proprietorship, pass-through LLC and
//! S-corp at a grid of owner salaries, evaluated on the whole return so
//! wages, deductions and credits interact correctly.

use super::calculator::{calculate_unchecked, round_currency, LiabilityBreakdown};
use super::model::{EntityType, TaxReturn};
use super::rates::RateTable;
use super::scenario::{FieldPath, FieldValue, Scenario, ScenarioError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Salary fractions of net income tried for the S-corp rows, on top of
/// the reasonable-salary floor and any currently elected salary
const SALARY_FRACTIONS: [Decimal; 4] = [dec!(0.5), dec!(0.6), dec!(0.7), dec!(0.8)];

/// Iteration cap for the breakeven bisection
const BREAKEVEN_STEPS: u32 = 64;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EntityError {
    #[error("the return has no business activity to compare")]
    NoBusiness,
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}

/// One candidate structure evaluated against the full return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntityOption {
    pub entity_type: EntityType,
    #[schemars(with = "Option<f64>")]
    pub salary: Option<Decimal>,
    /// Salary sits below the reasonable-salary floor; kept for context
    /// but never picked as best
    pub below_salary_floor: bool,
    /// Annual non-tax cost of running this structure
    #[schemars(with = "f64")]
    pub overhead: Decimal,
    pub breakdown: LiabilityBreakdown,
}

impl EntityOption {
    /// Tax liability plus structure overhead
    pub fn total_cost(&self) -> Decimal {
        self.breakdown.total_liability + self.overhead
    }
}

/// Full comparison output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntityAnalysis {
    /// Index into `options` matching the return's current structure
    pub current: usize,
    /// Index of the cheapest defensible option
    pub best: usize,
    pub options: Vec<EntityOption>,
    /// Cost reduction of moving from current to best; zero when already
    /// optimal
    #[schemars(with = "f64")]
    pub savings_vs_current: Decimal,
    /// QBI deduction under best minus under current (usually negative
    /// when moving into an S-corp, since wages are not qualified income)
    #[schemars(with = "f64")]
    pub qbi_change: Decimal,
    /// Salary at which the S-corp's total tax catches the sole
    /// proprietorship's; the election helps only below it. `None` when
    /// the advantage never changes sign between the salary floor and
    /// net income
    #[schemars(with = "Option<f64>")]
    pub breakeven_salary: Option<Decimal>,
}

impl EntityAnalysis {
    pub fn current_option(&self) -> &EntityOption {
        &self.options[self.current]
    }

    pub fn best_option(&self) -> &EntityOption {
        &self.options[self.best]
    }
}

/// Compare entity structures for the return's business.
///
/// Candidate order is fixed (sole proprietorship, LLC, then S-corp rows
/// by ascending salary), so the analysis is deterministic. Options whose
/// salary falls below the floor are flagged and skipped when picking the
/// best, not silently dropped.
pub fn optimize(ret: &TaxReturn, rates: &RateTable) -> Result<EntityAnalysis, EntityError> {
    optimize_with(ret, rates, &[])
}

/// [`optimize`] with extra S-corp salary rows for what-if comparisons
pub fn optimize_with(
    ret: &TaxReturn,
    rates: &RateTable,
    extra_salaries: &[Decimal],
) -> Result<EntityAnalysis, EntityError> {
    let business = ret.business.as_ref().ok_or(EntityError::NoBusiness)?;
    ret.validate(rates).map_err(ScenarioError::BaseInvalid)?;

    let net = business.net_income;
    let floor = round_currency(net * rates.entity.reasonable_salary_floor);
    let overhead = rates.entity.scorp_annual_overhead;

    let mut salaries: Vec<Decimal> = SALARY_FRACTIONS
        .iter()
        .map(|fraction| round_currency(net * fraction))
        .collect();
    salaries.push(floor);
    if business.entity_type == EntityType::SCorp {
        // The current election is always among the rows, even when it
        // sits below the floor
        salaries.push(business.elected_salary.unwrap_or(Decimal::ZERO));
    }
    salaries.extend(extra_salaries.iter().map(|salary| round_currency(*salary)));
    salaries.sort();
    salaries.dedup();

    let mut options = Vec::with_capacity(salaries.len() + 2);
    for entity in [EntityType::SoleProprietorship, EntityType::Llc] {
        options.push(EntityOption {
            entity_type: entity,
            salary: None,
            below_salary_floor: false,
            overhead: Decimal::ZERO,
            breakdown: evaluate(ret, rates, entity, None)?,
        });
    }
    for salary in salaries {
        options.push(EntityOption {
            entity_type: EntityType::SCorp,
            salary: Some(salary),
            below_salary_floor: salary < floor,
            overhead,
            breakdown: evaluate(ret, rates, EntityType::SCorp, Some(salary))?,
        });
    }

    let current = options
        .iter()
        .position(|option| {
            option.entity_type == business.entity_type
                && option.salary
                    == match business.entity_type {
                        EntityType::SCorp => {
                            Some(business.elected_salary.unwrap_or(Decimal::ZERO))
                        }
                        _ => None,
                    }
        })
        .unwrap_or(0);

    let best = options
        .iter()
        .enumerate()
        .filter(|(_, option)| !option.below_salary_floor)
        .min_by(|(_, a), (_, b)| a.total_cost().cmp(&b.total_cost()))
        .map(|(i, _)| i)
        .unwrap_or(current);

    let savings_vs_current = options[current].total_cost() - options[best].total_cost();
    let qbi_change =
        options[best].breakdown.qbi_deduction - options[current].breakdown.qbi_deduction;
    log::debug!(
        "entity best {} salary {:?} saves {}",
        options[best].entity_type,
        options[best].salary,
        savings_vs_current
    );

    let breakeven_salary = breakeven_salary(ret, rates, net)?;

    Ok(EntityAnalysis {
        current,
        best,
        options,
        savings_vs_current,
        qbi_change,
        breakeven_salary,
    })
}

fn evaluate(
    ret: &TaxReturn,
    rates: &RateTable,
    entity: EntityType,
    salary: Option<Decimal>,
) -> Result<LiabilityBreakdown, EntityError> {
    let mut scenario = Scenario::new(format!("entity {entity}"))
        .with(FieldPath::BusinessEntityType, FieldValue::Entity(entity));
    if let Some(salary) = salary {
        scenario = scenario.amount(FieldPath::ElectedSalary, salary);
    }
    let derived = scenario.apply(ret)?;
    derived
        .validate(rates)
        .map_err(|source| ScenarioError::InvalidDerived {
            name: scenario.name.clone(),
            source,
        })?;
    Ok(calculate_unchecked(&derived, rates))
}

/// Salary at which the S-corp's total tax meets the sole proprietorship's,
/// found by bisection between the reasonable-salary floor and net income.
/// Payroll, QBI and bracket effects pull the liability in different
/// directions across the range, so the crossing is searched, not solved.
fn breakeven_salary(
    ret: &TaxReturn,
    rates: &RateTable,
    net: Decimal,
) -> Result<Option<Decimal>, EntityError> {
    if net <= Decimal::ZERO {
        return Ok(None);
    }
    let sole = evaluate(ret, rates, EntityType::SoleProprietorship, None)?.total_liability;
    let advantage = |salary: Decimal| -> Result<Decimal, EntityError> {
        Ok(sole - evaluate(ret, rates, EntityType::SCorp, Some(salary))?.total_liability)
    };

    let mut lo = round_currency(net * rates.entity.reasonable_salary_floor);
    let mut hi = net;
    // No crossing inside the domain: the election either never pays at a
    // defensible salary, or still pays with every dollar drawn as salary
    if advantage(lo)? <= Decimal::ZERO || advantage(hi)? > Decimal::ZERO {
        return Ok(None);
    }

    let tolerance = rates.entity.breakeven_tolerance;
    for _ in 0..BREAKEVEN_STEPS {
        if hi - lo <= tolerance {
            break;
        }
        let mid = (lo + hi) / dec!(2);
        if advantage(mid)? > Decimal::ZERO {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(Some(round_currency(hi)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Business, FilingStatus, Income, Taxpayer};
    use std::collections::BTreeSet;

    fn business_owner(entity: EntityType, net: Decimal, salary: Option<Decimal>) -> TaxReturn {
        TaxReturn {
            taxpayer: Taxpayer {
                filing_status: FilingStatus::Single,
                dependents: 0,
                qualifying_children: 0,
                age: Some(45),
                spouse: None,
            },
            income: Income::default(),
            adjustments: Default::default(),
            deductions: Default::default(),
            credits: Default::default(),
            business: Some(Business {
                entity_type: entity,
                net_income: net,
                elected_salary: salary,
                specified_service: false,
            }),
            estimated_fields: BTreeSet::new(),
        }
    }

    #[test]
    fn no_business_is_an_error() {
        let mut ret = business_owner(EntityType::SoleProprietorship, dec!(100000), None);
        ret.business = None;
        assert_eq!(
            optimize(&ret, &RateTable::year_2024()),
            Err(EntityError::NoBusiness)
        );
    }

    #[test]
    fn scorp_at_floor_beats_sole_proprietorship() {
        let rates = RateTable::year_2024();
        let ret = business_owner(EntityType::SoleProprietorship, dec!(120000), None);
        let analysis = optimize(&ret, &rates).unwrap();

        let current = analysis.current_option();
        assert_eq!(current.entity_type, EntityType::SoleProprietorship);
        assert_eq!(current.breakdown.total_liability, dec!(29066.78));

        let best = analysis.best_option();
        assert_eq!(best.entity_type, EntityType::SCorp);
        // The floor salary carries the least payroll tax
        assert_eq!(best.salary, Some(dec!(48000.00)));
        assert!(!best.below_salary_floor);
        assert_eq!(analysis.savings_vs_current, dec!(4296.05));
        // Moving wages out of qualified business income shrinks QBI
        assert!(analysis.qbi_change < Decimal::ZERO);
    }

    #[test]
    fn elected_salary_row_kept_with_exact_liability() {
        let rates = RateTable::year_2024();
        let ret = business_owner(EntityType::SCorp, dec!(120000), Some(dec!(65000)));
        let analysis = optimize(&ret, &rates).unwrap();

        let current = analysis.current_option();
        assert_eq!(current.salary, Some(dec!(65000)));
        assert_eq!(current.breakdown.payroll_tax, dec!(9945));
        assert_eq!(current.breakdown.total_liability, dec!(24890.84));
        // A lower defensible salary still wins
        assert_eq!(analysis.best_option().salary, Some(dec!(48000.00)));
    }

    #[test]
    fn below_floor_salary_flagged_and_never_best() {
        let rates = RateTable::year_2024();
        let ret = business_owner(EntityType::SCorp, dec!(120000), Some(dec!(20000)));
        let analysis = optimize(&ret, &rates).unwrap();

        let current = analysis.current_option();
        assert!(current.below_salary_floor);
        assert_ne!(analysis.best, analysis.current);
        assert!(!analysis.best_option().below_salary_floor);
    }

    #[test]
    fn llc_taxed_like_sole_proprietorship() {
        let rates = RateTable::year_2024();
        let ret = business_owner(EntityType::SoleProprietorship, dec!(90000), None);
        let analysis = optimize(&ret, &rates).unwrap();
        let sole = &analysis.options[0];
        let llc = &analysis.options[1];
        assert_eq!(sole.entity_type, EntityType::SoleProprietorship);
        assert_eq!(llc.entity_type, EntityType::Llc);
        assert_eq!(
            sole.breakdown.total_liability,
            llc.breakdown.total_liability
        );
    }

    #[test]
    fn breakeven_salary_marks_where_the_election_stops_paying() {
        let rates = RateTable::year_2024();
        let ret = business_owner(EntityType::SoleProprietorship, dec!(120000), None);
        let analysis = optimize(&ret, &rates).unwrap();

        let crossing = analysis.breakeven_salary.unwrap();
        assert_eq!(crossing, dec!(87752.93));

        // Below the crossing the S-corp owes less tax than the sole
        // proprietorship; above it the ordering flips
        let sole = analysis.options[0].breakdown.total_liability;
        let below = evaluate(&ret, &rates, EntityType::SCorp, Some(crossing - dec!(500)))
            .unwrap()
            .total_liability;
        let above = evaluate(&ret, &rates, EntityType::SCorp, Some(crossing + dec!(500)))
            .unwrap()
            .total_liability;
        assert!(below < sole);
        assert!(above > sole);
    }

    #[test]
    fn no_breakeven_without_salary_room() {
        let mut rates = RateTable::year_2024();
        // Floor at 100% of net leaves the bisection no domain
        rates.entity.reasonable_salary_floor = Decimal::ONE;
        let ret = business_owner(EntityType::SoleProprietorship, dec!(120000), None);
        let analysis = optimize(&ret, &rates).unwrap();
        assert_eq!(analysis.breakeven_salary, None);
    }

    #[test]
    fn other_income_shifts_the_comparison() {
        let rates = RateTable::year_2024();
        let mut ret = business_owner(EntityType::SoleProprietorship, dec!(80000), None);
        ret.income.wages = dec!(160000);
        let analysis = optimize(&ret, &rates).unwrap();
        // W-2 wages eat the social security base, so the sole
        // proprietorship's SS exposure is already small; the S-corp edge
        // narrows but the comparison still runs on the whole return
        assert_eq!(
            analysis.current_option().entity_type,
            EntityType::SoleProprietorship
        );
        assert!(analysis.savings_vs_current >= Decimal::ZERO);
    }
}
