//! What-if scenarios: named field overrides applied to an immutable base
//! return, compared against the baseline liability.

use super::calculator::{calculate_unchecked, LiabilityBreakdown};
use super::model::{EntityType, FilingStatus, TaxReturn, ValidationError};
use super::rates::RateTable;
use rayon::prelude::*;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// A scenario failed to produce a comparable return
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("unrecognized field path: {0}")]
    UnknownField(String),
    #[error("override for {field} expects {expected}")]
    TypeMismatch {
        field: FieldPath,
        expected: &'static str,
    },
    #[error("override for {field} requires a business on the base return")]
    NoBusiness { field: FieldPath },
    #[error("base return is invalid: {0}")]
    BaseInvalid(#[from] ValidationError),
    #[error("scenario '{name}' produced an invalid return: {source}")]
    InvalidDerived {
        name: String,
        source: ValidationError,
    },
}

/// The closed set of override-able fields.
///
/// Serialized by dotted path, the same spelling accepted on the command
/// line, so an unrecognized path fails loudly at the boundary instead of
/// being silently dropped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum FieldPath {
    #[serde(rename = "income.wages")]
    Wages,
    #[serde(rename = "income.self_employment")]
    SelfEmployment,
    #[serde(rename = "income.investment")]
    Investment,
    #[serde(rename = "income.capital_gains")]
    CapitalGains,
    #[serde(rename = "income.rental")]
    Rental,
    #[serde(rename = "adjustments.retirement_401k")]
    Retirement401k,
    #[serde(rename = "adjustments.traditional_ira")]
    TraditionalIra,
    #[serde(rename = "adjustments.hsa")]
    Hsa,
    #[serde(rename = "deductions.state_local_taxes")]
    StateLocalTaxes,
    #[serde(rename = "deductions.mortgage_interest")]
    MortgageInterest,
    #[serde(rename = "deductions.charitable_cash")]
    CharitableCash,
    #[serde(rename = "deductions.medical_expenses")]
    MedicalExpenses,
    #[serde(rename = "deductions.other_itemized")]
    OtherItemized,
    #[serde(rename = "credits.child_care_expenses")]
    ChildCareExpenses,
    #[serde(rename = "credits.education_expenses")]
    EducationExpenses,
    #[serde(rename = "credits.hsa_eligible")]
    HsaEligible,
    #[serde(rename = "taxpayer.filing_status")]
    FilingStatusField,
    #[serde(rename = "taxpayer.spouse.wages")]
    SpouseWages,
    #[serde(rename = "business.entity_type")]
    BusinessEntityType,
    #[serde(rename = "business.net_income")]
    BusinessNetIncome,
    #[serde(rename = "business.elected_salary")]
    ElectedSalary,
}

impl FieldPath {
    pub fn all() -> &'static [FieldPath] {
        use FieldPath::*;
        &[
            Wages,
            SelfEmployment,
            Investment,
            CapitalGains,
            Rental,
            Retirement401k,
            TraditionalIra,
            Hsa,
            StateLocalTaxes,
            MortgageInterest,
            CharitableCash,
            MedicalExpenses,
            OtherItemized,
            ChildCareExpenses,
            EducationExpenses,
            HsaEligible,
            FilingStatusField,
            SpouseWages,
            BusinessEntityType,
            BusinessNetIncome,
            ElectedSalary,
        ]
    }

    pub fn path(&self) -> &'static str {
        use FieldPath::*;
        match self {
            Wages => "income.wages",
            SelfEmployment => "income.self_employment",
            Investment => "income.investment",
            CapitalGains => "income.capital_gains",
            Rental => "income.rental",
            Retirement401k => "adjustments.retirement_401k",
            TraditionalIra => "adjustments.traditional_ira",
            Hsa => "adjustments.hsa",
            StateLocalTaxes => "deductions.state_local_taxes",
            MortgageInterest => "deductions.mortgage_interest",
            CharitableCash => "deductions.charitable_cash",
            MedicalExpenses => "deductions.medical_expenses",
            OtherItemized => "deductions.other_itemized",
            ChildCareExpenses => "credits.child_care_expenses",
            EducationExpenses => "credits.education_expenses",
            HsaEligible => "credits.hsa_eligible",
            FilingStatusField => "taxpayer.filing_status",
            SpouseWages => "taxpayer.spouse.wages",
            BusinessEntityType => "business.entity_type",
            BusinessNetIncome => "business.net_income",
            ElectedSalary => "business.elected_salary",
        }
    }

    /// Value kind an override must carry, as shown in the field listing
    pub fn value_type(&self) -> &'static str {
        use FieldPath::*;
        match self {
            HsaEligible => "flag",
            FilingStatusField => "status",
            BusinessEntityType => "entity",
            _ => "amount",
        }
    }

    /// One-line description for the field listing
    pub fn description(&self) -> &'static str {
        use FieldPath::*;
        match self {
            Wages => "W-2 wages",
            SelfEmployment => "Net self-employment income (Schedule C)",
            Investment => "Interest and dividends",
            CapitalGains => "Net capital gain, negative for a loss",
            Rental => "Net rental income",
            Retirement401k => "Elective 401(k) deferral",
            TraditionalIra => "Deductible traditional IRA contribution",
            Hsa => "HSA contribution",
            StateLocalTaxes => "State and local taxes paid, before the cap",
            MortgageInterest => "Mortgage interest paid",
            CharitableCash => "Cash charitable contributions",
            MedicalExpenses => "Unreimbursed medical expenses",
            OtherItemized => "Other itemizable deductions",
            ChildCareExpenses => "Qualifying child and dependent care expenses",
            EducationExpenses => "Qualified education expenses",
            HsaEligible => "HDHP coverage all year",
            FilingStatusField => "Single, MarriedJoint, MarriedSeparate or HeadOfHousehold",
            SpouseWages => "Spouse W-2 wages",
            BusinessEntityType => "SoleProprietorship, Llc or SCorp",
            BusinessNetIncome => "Net business income before owner salary",
            ElectedSalary => "Owner W-2 salary under an S-corp election",
        }
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

impl FromStr for FieldPath {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldPath::all()
            .iter()
            .find(|field| field.path() == s)
            .copied()
            .ok_or_else(|| ScenarioError::UnknownField(s.to_string()))
    }
}

/// An override value; the variant must match the target field's type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Amount(#[schemars(with = "f64")] Decimal),
    Status(FilingStatus),
    Entity(EntityType),
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Flag(v) => write!(f, "{v}"),
            FieldValue::Amount(v) => write!(f, "{v}"),
            FieldValue::Status(v) => write!(f, "{v}"),
            FieldValue::Entity(v) => write!(f, "{v}"),
        }
    }
}

/// A named set of overrides against a base return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub overrides: BTreeMap<FieldPath, FieldValue>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Scenario {
        Scenario {
            name: name.into(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: FieldPath, value: FieldValue) -> Scenario {
        self.overrides.insert(field, value);
        self
    }

    pub fn amount(self, field: FieldPath, value: Decimal) -> Scenario {
        self.with(field, FieldValue::Amount(value))
    }

    /// Produce the derived return. The base is never mutated.
    pub fn apply(&self, base: &TaxReturn) -> Result<TaxReturn, ScenarioError> {
        let mut ret = base.clone();
        for (field, value) in &self.overrides {
            apply_override(&mut ret, *field, value)?;
        }
        Ok(ret)
    }
}

fn amount_of(field: FieldPath, value: &FieldValue) -> Result<Decimal, ScenarioError> {
    match value {
        FieldValue::Amount(v) => Ok(*v),
        _ => Err(ScenarioError::TypeMismatch {
            field,
            expected: "an amount",
        }),
    }
}

fn apply_override(
    ret: &mut TaxReturn,
    field: FieldPath,
    value: &FieldValue,
) -> Result<(), ScenarioError> {
    use FieldPath::*;
    match field {
        Wages => ret.income.wages = amount_of(field, value)?,
        SelfEmployment => ret.income.self_employment = amount_of(field, value)?,
        Investment => ret.income.investment = amount_of(field, value)?,
        CapitalGains => ret.income.capital_gains = amount_of(field, value)?,
        Rental => ret.income.rental = amount_of(field, value)?,
        Retirement401k => ret.adjustments.retirement_401k = amount_of(field, value)?,
        TraditionalIra => ret.adjustments.traditional_ira = amount_of(field, value)?,
        Hsa => ret.adjustments.hsa = amount_of(field, value)?,
        StateLocalTaxes => ret.deductions.state_local_taxes = amount_of(field, value)?,
        MortgageInterest => ret.deductions.mortgage_interest = amount_of(field, value)?,
        CharitableCash => ret.deductions.charitable_cash = amount_of(field, value)?,
        MedicalExpenses => ret.deductions.medical_expenses = amount_of(field, value)?,
        OtherItemized => ret.deductions.other_itemized = amount_of(field, value)?,
        ChildCareExpenses => ret.credits.child_care_expenses = amount_of(field, value)?,
        EducationExpenses => ret.credits.education_expenses = amount_of(field, value)?,
        HsaEligible => match value {
            FieldValue::Flag(v) => ret.credits.hsa_eligible = *v,
            _ => {
                return Err(ScenarioError::TypeMismatch {
                    field,
                    expected: "a boolean",
                })
            }
        },
        FilingStatusField => match value {
            FieldValue::Status(status) => ret.taxpayer.filing_status = *status,
            _ => {
                return Err(ScenarioError::TypeMismatch {
                    field,
                    expected: "a filing status",
                })
            }
        },
        SpouseWages => {
            let wages = amount_of(field, value)?;
            match &mut ret.taxpayer.spouse {
                Some(spouse) => spouse.wages = wages,
                None => ret.taxpayer.spouse = Some(super::model::Spouse { wages }),
            }
        }
        BusinessEntityType => {
            let entity = match value {
                FieldValue::Entity(entity) => *entity,
                _ => {
                    return Err(ScenarioError::TypeMismatch {
                        field,
                        expected: "an entity type",
                    })
                }
            };
            let business = ret
                .business
                .as_mut()
                .ok_or(ScenarioError::NoBusiness { field })?;
            business.entity_type = entity;
            // A salary election only makes sense under an S-corp
            if entity != EntityType::SCorp {
                business.elected_salary = None;
            }
        }
        BusinessNetIncome => {
            let amount = amount_of(field, value)?;
            ret.business
                .as_mut()
                .ok_or(ScenarioError::NoBusiness { field })?
                .net_income = amount;
        }
        ElectedSalary => {
            let amount = amount_of(field, value)?;
            ret.business
                .as_mut()
                .ok_or(ScenarioError::NoBusiness { field })?
                .elected_salary = Some(amount);
        }
    }
    Ok(())
}

/// One scenario's result against the baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScenarioOutcome {
    pub name: String,
    pub breakdown: LiabilityBreakdown,
    /// Baseline liability minus this scenario's; positive is an improvement
    #[schemars(with = "f64")]
    pub savings: Decimal,
}

/// Baseline plus per-scenario outcomes, in input order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScenarioComparison {
    pub baseline: LiabilityBreakdown,
    pub outcomes: Vec<ScenarioOutcome>,
}

impl ScenarioComparison {
    /// Highest-savings outcome; earlier input order wins ties
    pub fn best(&self) -> Option<&ScenarioOutcome> {
        self.outcomes
            .iter()
            .reduce(|best, candidate| if candidate.savings > best.savings { candidate } else { best })
    }
}

/// Evaluate scenarios sequentially against the baseline
pub fn compare(
    base: &TaxReturn,
    scenarios: &[Scenario],
    rates: &RateTable,
) -> Result<ScenarioComparison, ScenarioError> {
    let baseline = baseline_breakdown(base, rates)?;
    let outcomes = scenarios
        .iter()
        .map(|scenario| evaluate(scenario, base, &baseline, rates))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ScenarioComparison { baseline, outcomes })
}

/// Evaluate scenarios across a thread pool. Outcomes keep input order, so
/// the result is identical to [`compare`].
pub fn compare_parallel(
    base: &TaxReturn,
    scenarios: &[Scenario],
    rates: &RateTable,
) -> Result<ScenarioComparison, ScenarioError> {
    let baseline = baseline_breakdown(base, rates)?;
    let outcomes = scenarios
        .par_iter()
        .map(|scenario| evaluate(scenario, base, &baseline, rates))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ScenarioComparison { baseline, outcomes })
}

fn baseline_breakdown(
    base: &TaxReturn,
    rates: &RateTable,
) -> Result<LiabilityBreakdown, ScenarioError> {
    base.validate(rates)?;
    Ok(calculate_unchecked(base, rates))
}

fn evaluate(
    scenario: &Scenario,
    base: &TaxReturn,
    baseline: &LiabilityBreakdown,
    rates: &RateTable,
) -> Result<ScenarioOutcome, ScenarioError> {
    let derived = scenario.apply(base)?;
    derived
        .validate(rates)
        .map_err(|source| ScenarioError::InvalidDerived {
            name: scenario.name.clone(),
            source,
        })?;
    let breakdown = calculate_unchecked(&derived, rates);
    log::debug!(
        "scenario '{}' liability {} vs baseline {}",
        scenario.name,
        breakdown.total_liability,
        baseline.total_liability
    );
    Ok(ScenarioOutcome {
        name: scenario.name.clone(),
        savings: baseline.total_liability - breakdown.total_liability,
        breakdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Business, Income, Taxpayer};
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn base_return() -> TaxReturn {
        TaxReturn {
            taxpayer: Taxpayer {
                filing_status: FilingStatus::Single,
                dependents: 0,
                qualifying_children: 0,
                age: Some(40),
                spouse: None,
            },
            income: Income {
                wages: dec!(85000),
                ..Income::default()
            },
            adjustments: Default::default(),
            deductions: Default::default(),
            credits: Default::default(),
            business: None,
            estimated_fields: BTreeSet::new(),
        }
    }

    #[test]
    fn apply_leaves_base_untouched() {
        let base = base_return();
        let scenario = Scenario::new("raise").amount(FieldPath::Wages, dec!(95000));
        let derived = scenario.apply(&base).unwrap();
        assert_eq!(derived.income.wages, dec!(95000));
        assert_eq!(base.income.wages, dec!(85000));
    }

    #[test]
    fn type_mismatch_is_an_error() {
        let base = base_return();
        let scenario = Scenario::new("bad").with(
            FieldPath::Wages,
            FieldValue::Status(FilingStatus::MarriedJoint),
        );
        assert_eq!(
            scenario.apply(&base),
            Err(ScenarioError::TypeMismatch {
                field: FieldPath::Wages,
                expected: "an amount"
            })
        );
    }

    #[test]
    fn business_override_without_business_is_an_error() {
        let base = base_return();
        let scenario = Scenario::new("salary").amount(FieldPath::ElectedSalary, dec!(50000));
        assert_eq!(
            scenario.apply(&base),
            Err(ScenarioError::NoBusiness {
                field: FieldPath::ElectedSalary
            })
        );
    }

    #[test]
    fn entity_change_away_from_scorp_drops_salary() {
        let mut base = base_return();
        base.business = Some(Business {
            entity_type: EntityType::SCorp,
            net_income: dec!(120000),
            elected_salary: Some(dec!(60000)),
            specified_service: false,
        });
        let scenario = Scenario::new("revert").with(
            FieldPath::BusinessEntityType,
            FieldValue::Entity(EntityType::SoleProprietorship),
        );
        let derived = scenario.apply(&base).unwrap();
        let business = derived.business.unwrap();
        assert_eq!(business.entity_type, EntityType::SoleProprietorship);
        assert_eq!(business.elected_salary, None);
    }

    #[test]
    fn empty_scenario_matches_baseline() {
        let base = base_return();
        let rates = RateTable::year_2024();
        let comparison = compare(&base, &[Scenario::new("unchanged")], &rates).unwrap();
        assert_eq!(comparison.outcomes[0].savings, Decimal::ZERO);
        assert_eq!(
            comparison.outcomes[0].breakdown,
            comparison.baseline
        );
    }

    #[test]
    fn outcomes_keep_input_order() {
        let base = base_return();
        let rates = RateTable::year_2024();
        let scenarios = vec![
            Scenario::new("c").amount(FieldPath::Wages, dec!(70000)),
            Scenario::new("a").amount(FieldPath::Wages, dec!(90000)),
            Scenario::new("b").amount(FieldPath::Wages, dec!(80000)),
        ];
        let comparison = compare(&base, &scenarios, &rates).unwrap();
        let names: Vec<&str> = comparison.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn parallel_matches_sequential() {
        let base = base_return();
        let rates = RateTable::year_2024();
        let scenarios: Vec<Scenario> = (0..32)
            .map(|i| {
                Scenario::new(format!("wages {i}"))
                    .amount(FieldPath::Wages, dec!(50000) + Decimal::from(i * 5000))
            })
            .collect();
        let sequential = compare(&base, &scenarios, &rates).unwrap();
        let parallel = compare_parallel(&base, &scenarios, &rates).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn best_outcome_savings_positive_for_max_retirement() {
        let base = base_return();
        let rates = RateTable::year_2024();
        let scenarios = vec![
            Scenario::new("max 401k").amount(FieldPath::Retirement401k, dec!(23000)),
            Scenario::new("unchanged"),
        ];
        let comparison = compare(&base, &scenarios, &rates).unwrap();
        let best = comparison.best().unwrap();
        assert_eq!(best.name, "max 401k");
        // 23,000 less taxable income, all inside the 22% bracket
        assert_eq!(best.savings, dec!(5060.00));
    }

    #[test]
    fn invalid_derived_return_names_the_scenario() {
        let base = base_return();
        let rates = RateTable::year_2024();
        let scenarios =
            vec![Scenario::new("overshoot").amount(FieldPath::Retirement401k, dec!(99000))];
        let err = compare(&base, &scenarios, &rates).unwrap_err();
        assert!(matches!(
            err,
            ScenarioError::InvalidDerived { ref name, .. } if name == "overshoot"
        ));
    }

    #[test]
    fn field_paths_round_trip() {
        for field in FieldPath::all() {
            let parsed: FieldPath = field.path().parse().unwrap();
            assert_eq!(parsed, *field);
        }
        assert!(matches!(
            "income.bogus".parse::<FieldPath>(),
            Err(ScenarioError::UnknownField(_))
        ));
    }

    #[test]
    fn every_field_is_described() {
        for field in FieldPath::all() {
            assert!(!field.description().is_empty(), "{field} lacks a description");
            assert!(matches!(
                field.value_type(),
                "amount" | "flag" | "status" | "entity"
            ));
        }
    }

    #[test]
    fn scenario_json_round_trip() {
        let scenario = Scenario::new("mix")
            .amount(FieldPath::Wages, dec!(90000))
            .with(FieldPath::HsaEligible, FieldValue::Flag(true))
            .with(
                FieldPath::FilingStatusField,
                FieldValue::Status(FilingStatus::HeadOfHousehold),
            );
        let json = serde_json::to_string(&scenario).unwrap();
        assert!(json.contains("income.wages"));
        let back: Scenario = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scenario);
    }
}
