use super::rates::RateTable;
use super::scenario::FieldPath;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Rejection reasons for a malformed or out-of-domain return.
///
/// Validation runs before any calculation; amounts are never silently
/// clamped into range.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("negative amount in field: {field}")]
    NegativeAmount { field: &'static str },
    #[error("qualifying children ({children}) exceed dependent count ({dependents})")]
    ChildrenExceedDependents { children: u32, dependents: u32 },
    #[error("elected salary requires an S-corp entity type")]
    SalaryWithoutScorp,
    #[error("elected salary {salary} exceeds net business income {net_income}")]
    SalaryExceedsIncome {
        salary: Decimal,
        net_income: Decimal,
    },
    #[error("{field} contribution {amount} exceeds the annual limit of {limit}")]
    ContributionOverLimit {
        field: &'static str,
        amount: Decimal,
        limit: Decimal,
    },
    #[error("HSA contribution recorded without HDHP eligibility")]
    HsaWithoutEligibility,
}

/// Federal filing status
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum FilingStatus {
    Single,
    MarriedJoint,
    MarriedSeparate,
    HeadOfHousehold,
}

impl FilingStatus {
    pub fn display(&self) -> &'static str {
        match self {
            FilingStatus::Single => "Single",
            FilingStatus::MarriedJoint => "Married Filing Jointly",
            FilingStatus::MarriedSeparate => "Married Filing Separately",
            FilingStatus::HeadOfHousehold => "Head of Household",
        }
    }

    /// Whether this status requires a married taxpayer
    pub fn is_married(&self) -> bool {
        matches!(
            self,
            FilingStatus::MarriedJoint | FilingStatus::MarriedSeparate
        )
    }

    pub fn all() -> [FilingStatus; 4] {
        [
            FilingStatus::Single,
            FilingStatus::MarriedJoint,
            FilingStatus::MarriedSeparate,
            FilingStatus::HeadOfHousehold,
        ]
    }
}

impl std::fmt::Display for FilingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Spouse details, required for the married statuses to be compared
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Spouse {
    #[serde(default)]
    #[schemars(with = "f64")]
    pub wages: Decimal,
}

/// Taxpayer identity and household composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Taxpayer {
    pub filing_status: FilingStatus,
    /// Total dependents claimed on the return
    #[serde(default)]
    pub dependents: u32,
    /// Dependents qualifying for the child tax credit (under 17)
    #[serde(default)]
    pub qualifying_children: u32,
    /// Taxpayer age at year end; drives catch-up contribution limits
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub spouse: Option<Spouse>,
}

/// Income sub-totals. All non-negative except `capital_gains`, which is
/// signed (losses are negative and limited during AGI computation).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Income {
    #[serde(default)]
    #[schemars(with = "f64")]
    pub wages: Decimal,
    /// Net self-employment income (Schedule C)
    #[serde(default)]
    #[schemars(with = "f64")]
    pub self_employment: Decimal,
    /// Interest and dividends
    #[serde(default)]
    #[schemars(with = "f64")]
    pub investment: Decimal,
    /// Net capital gain or loss (negative for a loss)
    #[serde(default)]
    #[schemars(with = "f64")]
    pub capital_gains: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub rental: Decimal,
}

/// Above-the-line adjustments to income
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Adjustments {
    /// Elective deferrals to a traditional 401(k)
    #[serde(default)]
    #[schemars(with = "f64")]
    pub retirement_401k: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub traditional_ira: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub hsa: Decimal,
}

impl Adjustments {
    pub fn total(&self) -> Decimal {
        self.retirement_401k + self.traditional_ira + self.hsa
    }
}

/// Itemizable deduction categories plus standard-deduction eligibility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Deductions {
    /// State and local taxes paid (capped by the rate table)
    #[serde(default)]
    #[schemars(with = "f64")]
    pub state_local_taxes: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub mortgage_interest: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub charitable_cash: Decimal,
    /// Unreimbursed medical expenses (only the portion above the AGI floor
    /// is deductible)
    #[serde(default)]
    #[schemars(with = "f64")]
    pub medical_expenses: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub other_itemized: Decimal,
    /// False when the taxpayer must itemize (e.g. MFS with an itemizing
    /// spouse)
    #[serde(default = "default_true")]
    pub standard_eligible: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Deductions {
    fn default() -> Self {
        Deductions {
            state_local_taxes: Decimal::ZERO,
            mortgage_interest: Decimal::ZERO,
            charitable_cash: Decimal::ZERO,
            medical_expenses: Decimal::ZERO,
            other_itemized: Decimal::ZERO,
            standard_eligible: true,
        }
    }
}

/// Credit eligibility flags and qualifying amounts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Credits {
    /// Qualifying child and dependent care expenses paid
    #[serde(default)]
    #[schemars(with = "f64")]
    pub child_care_expenses: Decimal,
    /// Qualified education expenses paid
    #[serde(default)]
    #[schemars(with = "f64")]
    pub education_expenses: Decimal,
    #[serde(default)]
    pub education_credit_eligible: bool,
    /// Covered by a high-deductible health plan
    #[serde(default)]
    pub hsa_eligible: bool,
    #[serde(default)]
    pub hsa_family_coverage: bool,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub other_nonrefundable: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub other_refundable: Decimal,
}

/// Business entity form for self-employment income
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum EntityType {
    SoleProprietorship,
    /// Single-member LLC taxed as a disregarded entity
    Llc,
    SCorp,
}

impl EntityType {
    pub fn display(&self) -> &'static str {
        match self {
            EntityType::SoleProprietorship => "Sole Proprietorship",
            EntityType::Llc => "LLC (pass-through)",
            EntityType::SCorp => "S-Corporation",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Business activity attached to the return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Business {
    pub entity_type: EntityType,
    /// Net business income before owner payroll
    #[schemars(with = "f64")]
    pub net_income: Decimal,
    /// Owner salary under an S-corp election
    #[serde(default)]
    #[schemars(with = "f64")]
    pub elected_salary: Option<Decimal>,
    /// Specified service trade or business (QBI phases out entirely)
    #[serde(default)]
    pub specified_service: bool,
}

/// Aggregate root for a single filing period.
///
/// Immutable once constructed; what-if analysis goes through
/// [`super::scenario::Scenario`] overrides, never in-place mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaxReturn {
    pub taxpayer: Taxpayer,
    #[serde(default)]
    pub income: Income,
    #[serde(default)]
    pub adjustments: Adjustments,
    #[serde(default)]
    pub deductions: Deductions,
    #[serde(default)]
    pub credits: Credits,
    #[serde(default)]
    pub business: Option<Business>,
    /// Fields the caller flagged as estimated rather than confirmed;
    /// lowers the confidence of recommendations that depend on them
    #[serde(default)]
    pub estimated_fields: BTreeSet<FieldPath>,
}

impl TaxReturn {
    /// Check structural invariants and contribution limits.
    ///
    /// Catch-up limits apply when the taxpayer's age is known and at or
    /// above the catch-up threshold; with an unknown age the larger limit
    /// is allowed rather than rejecting a possibly valid return.
    pub fn validate(&self, rates: &RateTable) -> Result<(), ValidationError> {
        self.check_non_negative()?;

        let t = &self.taxpayer;
        if t.qualifying_children > t.dependents {
            return Err(ValidationError::ChildrenExceedDependents {
                children: t.qualifying_children,
                dependents: t.dependents,
            });
        }

        if let Some(business) = &self.business {
            if let Some(salary) = business.elected_salary {
                if business.entity_type != EntityType::SCorp {
                    return Err(ValidationError::SalaryWithoutScorp);
                }
                if salary > business.net_income {
                    return Err(ValidationError::SalaryExceedsIncome {
                        salary,
                        net_income: business.net_income,
                    });
                }
            }
        }

        let limits = &rates.limits;
        let k401_limit = limits.max_401k(t.age);
        if self.adjustments.retirement_401k > k401_limit {
            return Err(ValidationError::ContributionOverLimit {
                field: "adjustments.retirement_401k",
                amount: self.adjustments.retirement_401k,
                limit: k401_limit,
            });
        }
        let ira_limit = limits.max_ira(t.age);
        if self.adjustments.traditional_ira > ira_limit {
            return Err(ValidationError::ContributionOverLimit {
                field: "adjustments.traditional_ira",
                amount: self.adjustments.traditional_ira,
                limit: ira_limit,
            });
        }

        if self.adjustments.hsa > Decimal::ZERO {
            if !self.credits.hsa_eligible {
                return Err(ValidationError::HsaWithoutEligibility);
            }
            let hsa_limit = limits.max_hsa(t.age, self.credits.hsa_family_coverage);
            if self.adjustments.hsa > hsa_limit {
                return Err(ValidationError::ContributionOverLimit {
                    field: "adjustments.hsa",
                    amount: self.adjustments.hsa,
                    limit: hsa_limit,
                });
            }
        }

        Ok(())
    }

    fn check_non_negative(&self) -> Result<(), ValidationError> {
        // capital_gains is the one signed field and is deliberately absent
        let checks: [(&'static str, Decimal); 15] = [
            ("income.wages", self.income.wages),
            ("income.self_employment", self.income.self_employment),
            ("income.investment", self.income.investment),
            ("income.rental", self.income.rental),
            (
                "adjustments.retirement_401k",
                self.adjustments.retirement_401k,
            ),
            (
                "adjustments.traditional_ira",
                self.adjustments.traditional_ira,
            ),
            ("adjustments.hsa", self.adjustments.hsa),
            (
                "deductions.state_local_taxes",
                self.deductions.state_local_taxes,
            ),
            (
                "deductions.mortgage_interest",
                self.deductions.mortgage_interest,
            ),
            (
                "deductions.charitable_cash",
                self.deductions.charitable_cash,
            ),
            (
                "deductions.medical_expenses",
                self.deductions.medical_expenses,
            ),
            ("deductions.other_itemized", self.deductions.other_itemized),
            (
                "credits.child_care_expenses",
                self.credits.child_care_expenses,
            ),
            (
                "credits.education_expenses",
                self.credits.education_expenses,
            ),
            (
                "credits.other_nonrefundable",
                self.credits.other_nonrefundable,
            ),
        ];
        for (field, amount) in checks {
            if amount < Decimal::ZERO {
                return Err(ValidationError::NegativeAmount { field });
            }
        }
        if self.credits.other_refundable < Decimal::ZERO {
            return Err(ValidationError::NegativeAmount {
                field: "credits.other_refundable",
            });
        }
        if let Some(spouse) = &self.taxpayer.spouse {
            if spouse.wages < Decimal::ZERO {
                return Err(ValidationError::NegativeAmount {
                    field: "taxpayer.spouse.wages",
                });
            }
        }
        if let Some(business) = &self.business {
            if business.net_income < Decimal::ZERO {
                return Err(ValidationError::NegativeAmount {
                    field: "business.net_income",
                });
            }
            if let Some(salary) = business.elected_salary {
                if salary < Decimal::ZERO {
                    return Err(ValidationError::NegativeAmount {
                        field: "business.elected_salary",
                    });
                }
            }
        }
        Ok(())
    }

    /// Whether the caller flagged this field as an estimate
    pub fn is_estimated(&self, field: FieldPath) -> bool {
        self.estimated_fields.contains(&field)
    }

    pub fn has_business_income(&self) -> bool {
        self.business
            .as_ref()
            .map(|b| b.net_income > Decimal::ZERO)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rates::RateTable;
    use rust_decimal_macros::dec;

    fn single_wage_earner(wages: Decimal) -> TaxReturn {
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
            adjustments: Adjustments::default(),
            deductions: Deductions::default(),
            credits: Credits::default(),
            business: None,
            estimated_fields: BTreeSet::new(),
        }
    }

    #[test]
    fn valid_return_passes() {
        let rates = RateTable::year_2024();
        let ret = single_wage_earner(dec!(85000));
        assert!(ret.validate(&rates).is_ok());
    }

    #[test]
    fn negative_wages_rejected() {
        let rates = RateTable::year_2024();
        let ret = single_wage_earner(dec!(-1));
        assert_eq!(
            ret.validate(&rates),
            Err(ValidationError::NegativeAmount {
                field: "income.wages"
            })
        );
    }

    #[test]
    fn capital_loss_allowed() {
        let rates = RateTable::year_2024();
        let mut ret = single_wage_earner(dec!(85000));
        ret.income.capital_gains = dec!(-12000);
        assert!(ret.validate(&rates).is_ok());
    }

    #[test]
    fn children_cannot_exceed_dependents() {
        let rates = RateTable::year_2024();
        let mut ret = single_wage_earner(dec!(85000));
        ret.taxpayer.dependents = 1;
        ret.taxpayer.qualifying_children = 2;
        assert_eq!(
            ret.validate(&rates),
            Err(ValidationError::ChildrenExceedDependents {
                children: 2,
                dependents: 1
            })
        );
    }

    #[test]
    fn salary_requires_scorp() {
        let rates = RateTable::year_2024();
        let mut ret = single_wage_earner(Decimal::ZERO);
        ret.business = Some(Business {
            entity_type: EntityType::SoleProprietorship,
            net_income: dec!(100000),
            elected_salary: Some(dec!(50000)),
            specified_service: false,
        });
        assert_eq!(ret.validate(&rates), Err(ValidationError::SalaryWithoutScorp));
    }

    #[test]
    fn salary_capped_by_net_income() {
        let rates = RateTable::year_2024();
        let mut ret = single_wage_earner(Decimal::ZERO);
        ret.business = Some(Business {
            entity_type: EntityType::SCorp,
            net_income: dec!(100000),
            elected_salary: Some(dec!(120000)),
            specified_service: false,
        });
        assert!(matches!(
            ret.validate(&rates),
            Err(ValidationError::SalaryExceedsIncome { .. })
        ));
    }

    #[test]
    fn retirement_contribution_over_limit_rejected() {
        let rates = RateTable::year_2024();
        let mut ret = single_wage_earner(dec!(200000));
        // 2024 limit is 23,000 with no catch-up below age 50
        ret.adjustments.retirement_401k = dec!(24000);
        assert!(matches!(
            ret.validate(&rates),
            Err(ValidationError::ContributionOverLimit {
                field: "adjustments.retirement_401k",
                ..
            })
        ));
    }

    #[test]
    fn catch_up_allowed_at_fifty() {
        let rates = RateTable::year_2024();
        let mut ret = single_wage_earner(dec!(200000));
        ret.taxpayer.age = Some(52);
        ret.adjustments.retirement_401k = dec!(30000);
        assert!(ret.validate(&rates).is_ok());
    }

    #[test]
    fn unknown_age_allows_catch_up() {
        let rates = RateTable::year_2024();
        let mut ret = single_wage_earner(dec!(200000));
        ret.taxpayer.age = None;
        ret.adjustments.retirement_401k = dec!(30000);
        assert!(ret.validate(&rates).is_ok());
    }

    #[test]
    fn hsa_requires_eligibility() {
        let rates = RateTable::year_2024();
        let mut ret = single_wage_earner(dec!(85000));
        ret.adjustments.hsa = dec!(1000);
        assert_eq!(
            ret.validate(&rates),
            Err(ValidationError::HsaWithoutEligibility)
        );

        ret.credits.hsa_eligible = true;
        assert!(ret.validate(&rates).is_ok());
    }

    #[test]
    fn married_status_display() {
        assert_eq!(FilingStatus::MarriedJoint.to_string(), "Married Filing Jointly");
        assert!(FilingStatus::MarriedJoint.is_married());
        assert!(FilingStatus::MarriedSeparate.is_married());
        assert!(!FilingStatus::Single.is_married());
        assert!(!FilingStatus::HeadOfHousehold.is_married());
    }
}
