use super::model::FilingStatus;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Problems with a rate table, raised at load time rather than deep
/// inside a calculation.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("no built-in rate table for tax year {0}")]
    MissingYear(u16),
    #[error("malformed rate table: {0}")]
    Malformed(String),
    #[error("no brackets defined for {status}")]
    EmptyBrackets { status: FilingStatus },
    #[error("brackets for {status} must ascend by upper bound")]
    BracketsNotAscending { status: FilingStatus },
    #[error("top bracket for {status} must be unbounded")]
    BoundedTopBracket { status: FilingStatus },
    #[error("invalid rate table constant {field}: {reason}")]
    InvalidConstant {
        field: &'static str,
        reason: String,
    },
}

/// One marginal bracket: `rate` applies up to `upper`, `None` meaning
/// unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TaxBracket {
    #[schemars(with = "f64")]
    pub rate: Decimal,
    #[schemars(with = "Option<f64>")]
    pub upper: Option<Decimal>,
}

impl TaxBracket {
    fn new(rate: Decimal, upper: Decimal) -> Self {
        TaxBracket {
            rate,
            upper: Some(upper),
        }
    }

    fn top(rate: Decimal) -> Self {
        TaxBracket { rate, upper: None }
    }
}

/// A value that varies by filing status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ByStatus<T> {
    pub single: T,
    pub married_joint: T,
    pub married_separate: T,
    pub head_of_household: T,
}

impl<T> ByStatus<T> {
    pub fn get(&self, status: FilingStatus) -> &T {
        match status {
            FilingStatus::Single => &self.single,
            FilingStatus::MarriedJoint => &self.married_joint,
            FilingStatus::MarriedSeparate => &self.married_separate,
            FilingStatus::HeadOfHousehold => &self.head_of_household,
        }
    }
}

/// Self-employment tax constants (IRC §1401)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SeTaxRates {
    /// Portion of net SE earnings subject to the tax (92.35%)
    #[schemars(with = "f64")]
    pub net_earnings_factor: Decimal,
    #[schemars(with = "f64")]
    pub social_security_rate: Decimal,
    /// Social security wage base; W-2 wages count against it first
    #[schemars(with = "f64")]
    pub social_security_wage_base: Decimal,
    #[schemars(with = "f64")]
    pub medicare_rate: Decimal,
    #[schemars(with = "f64")]
    pub additional_medicare_rate: Decimal,
    #[schemars(with = "ByStatus<f64>")]
    pub additional_medicare_threshold: ByStatus<Decimal>,
}

/// Qualified business income deduction constants (IRC §199A)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QbiRates {
    #[schemars(with = "f64")]
    pub rate: Decimal,
    #[schemars(with = "ByStatus<f64>")]
    pub phase_out_start: ByStatus<Decimal>,
    /// Width of the linear phase-out band for specified service businesses
    #[schemars(with = "ByStatus<f64>")]
    pub phase_out_range: ByStatus<Decimal>,
}

/// Alternative minimum tax constants (IRC §55)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AmtRates {
    #[schemars(with = "ByStatus<f64>")]
    pub exemption: ByStatus<Decimal>,
    #[schemars(with = "ByStatus<f64>")]
    pub exemption_phase_out_start: ByStatus<Decimal>,
    /// Exemption reduction per dollar of AMTI above the phase-out start
    #[schemars(with = "f64")]
    pub exemption_phase_out_rate: Decimal,
    #[schemars(with = "f64")]
    pub low_rate: Decimal,
    #[schemars(with = "f64")]
    pub high_rate: Decimal,
    /// AMTI level where the high rate takes over
    #[schemars(with = "ByStatus<f64>")]
    pub rate_threshold: ByStatus<Decimal>,
}

/// Net investment income tax constants (IRC §1411)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NiitRates {
    #[schemars(with = "f64")]
    pub rate: Decimal,
    #[schemars(with = "ByStatus<f64>")]
    pub magi_threshold: ByStatus<Decimal>,
}

/// Credit amounts, caps and phase-outs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreditRates {
    /// Child tax credit per qualifying child (IRC §24)
    #[schemars(with = "f64")]
    pub ctc_per_child: Decimal,
    #[schemars(with = "ByStatus<f64>")]
    pub ctc_phase_out_start: ByStatus<Decimal>,
    /// Credit reduction per $1,000 (or fraction) of AGI over the start
    #[schemars(with = "f64")]
    pub ctc_phase_out_step: Decimal,
    /// Dependent care credit rate (IRC §21); flat rate over the sliding
    /// scale that applies only below ~$43k AGI
    #[schemars(with = "f64")]
    pub dependent_care_rate: Decimal,
    #[schemars(with = "f64")]
    pub dependent_care_cap_one_child: Decimal,
    #[schemars(with = "f64")]
    pub dependent_care_cap_multi: Decimal,
    /// Maximum American Opportunity credit (IRC §25A)
    #[schemars(with = "f64")]
    pub education_cap: Decimal,
    /// Zero start disables the credit for a status (MFS is ineligible)
    #[schemars(with = "ByStatus<f64>")]
    pub education_phase_out_start: ByStatus<Decimal>,
    #[schemars(with = "ByStatus<f64>")]
    pub education_phase_out_range: ByStatus<Decimal>,
}

/// Statutory contribution limits used by validation and headroom rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContributionLimits {
    #[schemars(with = "f64")]
    pub retirement_401k: Decimal,
    #[schemars(with = "f64")]
    pub retirement_401k_catch_up: Decimal,
    pub retirement_catch_up_age: u32,
    #[schemars(with = "f64")]
    pub ira: Decimal,
    #[schemars(with = "f64")]
    pub ira_catch_up: Decimal,
    #[schemars(with = "f64")]
    pub hsa_self: Decimal,
    #[schemars(with = "f64")]
    pub hsa_family: Decimal,
    #[schemars(with = "f64")]
    pub hsa_catch_up: Decimal,
    pub hsa_catch_up_age: u32,
}

impl ContributionLimits {
    /// An unknown age gets the benefit of the doubt on catch-up room
    fn catch_up(age: Option<u32>, threshold: u32, amount: Decimal) -> Decimal {
        match age {
            Some(age) if age < threshold => Decimal::ZERO,
            _ => amount,
        }
    }

    pub fn max_401k(&self, age: Option<u32>) -> Decimal {
        self.retirement_401k
            + Self::catch_up(age, self.retirement_catch_up_age, self.retirement_401k_catch_up)
    }

    pub fn max_ira(&self, age: Option<u32>) -> Decimal {
        self.ira + Self::catch_up(age, self.retirement_catch_up_age, self.ira_catch_up)
    }

    pub fn max_hsa(&self, age: Option<u32>, family_coverage: bool) -> Decimal {
        let base = if family_coverage {
            self.hsa_family
        } else {
            self.hsa_self
        };
        base + Self::catch_up(age, self.hsa_catch_up_age, self.hsa_catch_up)
    }
}

/// Deduction caps and floors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeductionRates {
    /// State and local tax deduction cap (IRC §164(b)(6))
    #[schemars(with = "ByStatus<f64>")]
    pub salt_cap: ByStatus<Decimal>,
    /// Medical expenses deductible only above this fraction of AGI
    #[schemars(with = "f64")]
    pub medical_agi_floor: Decimal,
    /// Net capital loss deductible against ordinary income per year
    #[schemars(with = "ByStatus<f64>")]
    pub capital_loss_limit: ByStatus<Decimal>,
    /// Years of charitable giving combined by a bunching recommendation
    pub bunching_window_years: u32,
}

/// Entity comparison parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EntityRates {
    /// Minimum owner salary as a fraction of net income for an S-corp
    /// comparison to be treated as defensible
    #[schemars(with = "f64")]
    pub reasonable_salary_floor: Decimal,
    /// Estimated annual payroll, bookkeeping and filing cost an S-corp
    /// carries; counted against its tax savings
    #[schemars(with = "f64")]
    pub scorp_annual_overhead: Decimal,
    /// Salary-domain width, in dollars, at which the breakeven bisection
    /// stops refining
    #[schemars(with = "f64")]
    pub breakeven_tolerance: Decimal,
}

/// All statutory constants for one tax year.
///
/// Calculations never hard-code a rate or threshold; everything flows
/// from an instance of this table so alternative years (or hypothetical
/// law) can be swapped in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RateTable {
    pub year: u16,
    pub brackets: ByStatus<Vec<TaxBracket>>,
    #[schemars(with = "ByStatus<f64>")]
    pub standard_deduction: ByStatus<Decimal>,
    pub deductions: DeductionRates,
    pub se: SeTaxRates,
    pub qbi: QbiRates,
    pub amt: AmtRates,
    pub niit: NiitRates,
    pub credits: CreditRates,
    pub limits: ContributionLimits,
    pub entity: EntityRates,
}

impl RateTable {
    /// Built-in table for a supported year
    pub fn for_year(year: u16) -> Result<RateTable, ConfigurationError> {
        match year {
            2024 => Ok(Self::year_2024()),
            2025 => Ok(Self::year_2025()),
            other => Err(ConfigurationError::MissingYear(other)),
        }
    }

    pub fn supported_years() -> &'static [u16] {
        &[2024, 2025]
    }

    /// Tax year 2024 constants, per Rev. Proc. 2023-34
    pub fn year_2024() -> RateTable {
        RateTable {
            year: 2024,
            brackets: ByStatus {
                single: vec![
                    TaxBracket::new(dec!(0.10), dec!(11600)),
                    TaxBracket::new(dec!(0.12), dec!(47150)),
                    TaxBracket::new(dec!(0.22), dec!(100525)),
                    TaxBracket::new(dec!(0.24), dec!(191950)),
                    TaxBracket::new(dec!(0.32), dec!(243725)),
                    TaxBracket::new(dec!(0.35), dec!(609350)),
                    TaxBracket::top(dec!(0.37)),
                ],
                married_joint: vec![
                    TaxBracket::new(dec!(0.10), dec!(23200)),
                    TaxBracket::new(dec!(0.12), dec!(94300)),
                    TaxBracket::new(dec!(0.22), dec!(201050)),
                    TaxBracket::new(dec!(0.24), dec!(383900)),
                    TaxBracket::new(dec!(0.32), dec!(487450)),
                    TaxBracket::new(dec!(0.35), dec!(731200)),
                    TaxBracket::top(dec!(0.37)),
                ],
                married_separate: vec![
                    TaxBracket::new(dec!(0.10), dec!(11600)),
                    TaxBracket::new(dec!(0.12), dec!(47150)),
                    TaxBracket::new(dec!(0.22), dec!(100525)),
                    TaxBracket::new(dec!(0.24), dec!(191950)),
                    TaxBracket::new(dec!(0.32), dec!(243725)),
                    TaxBracket::new(dec!(0.35), dec!(365600)),
                    TaxBracket::top(dec!(0.37)),
                ],
                head_of_household: vec![
                    TaxBracket::new(dec!(0.10), dec!(16550)),
                    TaxBracket::new(dec!(0.12), dec!(63100)),
                    TaxBracket::new(dec!(0.22), dec!(100500)),
                    TaxBracket::new(dec!(0.24), dec!(191950)),
                    TaxBracket::new(dec!(0.32), dec!(243700)),
                    TaxBracket::new(dec!(0.35), dec!(609350)),
                    TaxBracket::top(dec!(0.37)),
                ],
            },
            standard_deduction: ByStatus {
                single: dec!(14600),
                married_joint: dec!(29200),
                married_separate: dec!(14600),
                head_of_household: dec!(21900),
            },
            deductions: DeductionRates {
                salt_cap: ByStatus {
                    single: dec!(10000),
                    married_joint: dec!(10000),
                    married_separate: dec!(5000),
                    head_of_household: dec!(10000),
                },
                medical_agi_floor: dec!(0.075),
                capital_loss_limit: ByStatus {
                    single: dec!(3000),
                    married_joint: dec!(3000),
                    married_separate: dec!(1500),
                    head_of_household: dec!(3000),
                },
                bunching_window_years: 2,
            },
            se: SeTaxRates {
                net_earnings_factor: dec!(0.9235),
                social_security_rate: dec!(0.124),
                social_security_wage_base: dec!(168600),
                medicare_rate: dec!(0.029),
                additional_medicare_rate: dec!(0.009),
                additional_medicare_threshold: ByStatus {
                    single: dec!(200000),
                    married_joint: dec!(250000),
                    married_separate: dec!(125000),
                    head_of_household: dec!(200000),
                },
            },
            qbi: QbiRates {
                rate: dec!(0.20),
                phase_out_start: ByStatus {
                    single: dec!(191950),
                    married_joint: dec!(383900),
                    married_separate: dec!(191950),
                    head_of_household: dec!(191950),
                },
                phase_out_range: ByStatus {
                    single: dec!(50000),
                    married_joint: dec!(100000),
                    married_separate: dec!(50000),
                    head_of_household: dec!(50000),
                },
            },
            amt: AmtRates {
                exemption: ByStatus {
                    single: dec!(85700),
                    married_joint: dec!(133300),
                    married_separate: dec!(66650),
                    head_of_household: dec!(85700),
                },
                exemption_phase_out_start: ByStatus {
                    single: dec!(609350),
                    married_joint: dec!(1218700),
                    married_separate: dec!(609350),
                    head_of_household: dec!(609350),
                },
                exemption_phase_out_rate: dec!(0.25),
                low_rate: dec!(0.26),
                high_rate: dec!(0.28),
                rate_threshold: ByStatus {
                    single: dec!(232600),
                    married_joint: dec!(232600),
                    married_separate: dec!(116300),
                    head_of_household: dec!(232600),
                },
            },
            niit: NiitRates {
                rate: dec!(0.038),
                magi_threshold: ByStatus {
                    single: dec!(200000),
                    married_joint: dec!(250000),
                    married_separate: dec!(125000),
                    head_of_household: dec!(200000),
                },
            },
            credits: CreditRates {
                ctc_per_child: dec!(2000),
                ctc_phase_out_start: ByStatus {
                    single: dec!(200000),
                    married_joint: dec!(400000),
                    married_separate: dec!(200000),
                    head_of_household: dec!(200000),
                },
                ctc_phase_out_step: dec!(50),
                dependent_care_rate: dec!(0.20),
                dependent_care_cap_one_child: dec!(3000),
                dependent_care_cap_multi: dec!(6000),
                education_cap: dec!(2500),
                education_phase_out_start: ByStatus {
                    single: dec!(80000),
                    married_joint: dec!(160000),
                    married_separate: Decimal::ZERO,
                    head_of_household: dec!(80000),
                },
                education_phase_out_range: ByStatus {
                    single: dec!(10000),
                    married_joint: dec!(20000),
                    married_separate: dec!(10000),
                    head_of_household: dec!(10000),
                },
            },
            limits: ContributionLimits {
                retirement_401k: dec!(23000),
                retirement_401k_catch_up: dec!(7500),
                retirement_catch_up_age: 50,
                ira: dec!(7000),
                ira_catch_up: dec!(1000),
                hsa_self: dec!(4150),
                hsa_family: dec!(8300),
                hsa_catch_up: dec!(1000),
                hsa_catch_up_age: 55,
            },
            entity: EntityRates {
                reasonable_salary_floor: dec!(0.40),
                scorp_annual_overhead: dec!(3000),
                breakeven_tolerance: dec!(1),
            },
        }
    }

    /// Tax year 2025 constants, per Rev. Proc. 2024-40 as amended by the
    /// July 2025 reconciliation act (standard deduction, CTC, SALT cap)
    pub fn year_2025() -> RateTable {
        RateTable {
            year: 2025,
            brackets: ByStatus {
                single: vec![
                    TaxBracket::new(dec!(0.10), dec!(11925)),
                    TaxBracket::new(dec!(0.12), dec!(48475)),
                    TaxBracket::new(dec!(0.22), dec!(103350)),
                    TaxBracket::new(dec!(0.24), dec!(197300)),
                    TaxBracket::new(dec!(0.32), dec!(250525)),
                    TaxBracket::new(dec!(0.35), dec!(626350)),
                    TaxBracket::top(dec!(0.37)),
                ],
                married_joint: vec![
                    TaxBracket::new(dec!(0.10), dec!(23850)),
                    TaxBracket::new(dec!(0.12), dec!(96950)),
                    TaxBracket::new(dec!(0.22), dec!(206700)),
                    TaxBracket::new(dec!(0.24), dec!(394600)),
                    TaxBracket::new(dec!(0.32), dec!(501050)),
                    TaxBracket::new(dec!(0.35), dec!(751600)),
                    TaxBracket::top(dec!(0.37)),
                ],
                married_separate: vec![
                    TaxBracket::new(dec!(0.10), dec!(11925)),
                    TaxBracket::new(dec!(0.12), dec!(48475)),
                    TaxBracket::new(dec!(0.22), dec!(103350)),
                    TaxBracket::new(dec!(0.24), dec!(197300)),
                    TaxBracket::new(dec!(0.32), dec!(250525)),
                    TaxBracket::new(dec!(0.35), dec!(375800)),
                    TaxBracket::top(dec!(0.37)),
                ],
                head_of_household: vec![
                    TaxBracket::new(dec!(0.10), dec!(17000)),
                    TaxBracket::new(dec!(0.12), dec!(64850)),
                    TaxBracket::new(dec!(0.22), dec!(103350)),
                    TaxBracket::new(dec!(0.24), dec!(197300)),
                    TaxBracket::new(dec!(0.32), dec!(250500)),
                    TaxBracket::new(dec!(0.35), dec!(626350)),
                    TaxBracket::top(dec!(0.37)),
                ],
            },
            standard_deduction: ByStatus {
                single: dec!(15750),
                married_joint: dec!(31500),
                married_separate: dec!(15750),
                head_of_household: dec!(23625),
            },
            deductions: DeductionRates {
                salt_cap: ByStatus {
                    single: dec!(40000),
                    married_joint: dec!(40000),
                    married_separate: dec!(20000),
                    head_of_household: dec!(40000),
                },
                medical_agi_floor: dec!(0.075),
                capital_loss_limit: ByStatus {
                    single: dec!(3000),
                    married_joint: dec!(3000),
                    married_separate: dec!(1500),
                    head_of_household: dec!(3000),
                },
                bunching_window_years: 2,
            },
            se: SeTaxRates {
                net_earnings_factor: dec!(0.9235),
                social_security_rate: dec!(0.124),
                social_security_wage_base: dec!(176100),
                medicare_rate: dec!(0.029),
                additional_medicare_rate: dec!(0.009),
                additional_medicare_threshold: ByStatus {
                    single: dec!(200000),
                    married_joint: dec!(250000),
                    married_separate: dec!(125000),
                    head_of_household: dec!(200000),
                },
            },
            qbi: QbiRates {
                rate: dec!(0.20),
                phase_out_start: ByStatus {
                    single: dec!(197300),
                    married_joint: dec!(394600),
                    married_separate: dec!(197300),
                    head_of_household: dec!(197300),
                },
                phase_out_range: ByStatus {
                    single: dec!(50000),
                    married_joint: dec!(100000),
                    married_separate: dec!(50000),
                    head_of_household: dec!(50000),
                },
            },
            amt: AmtRates {
                exemption: ByStatus {
                    single: dec!(88100),
                    married_joint: dec!(137000),
                    married_separate: dec!(68500),
                    head_of_household: dec!(88100),
                },
                exemption_phase_out_start: ByStatus {
                    single: dec!(626350),
                    married_joint: dec!(1252700),
                    married_separate: dec!(626350),
                    head_of_household: dec!(626350),
                },
                exemption_phase_out_rate: dec!(0.25),
                low_rate: dec!(0.26),
                high_rate: dec!(0.28),
                rate_threshold: ByStatus {
                    single: dec!(239100),
                    married_joint: dec!(239100),
                    married_separate: dec!(119550),
                    head_of_household: dec!(239100),
                },
            },
            niit: NiitRates {
                rate: dec!(0.038),
                magi_threshold: ByStatus {
                    single: dec!(200000),
                    married_joint: dec!(250000),
                    married_separate: dec!(125000),
                    head_of_household: dec!(200000),
                },
            },
            credits: CreditRates {
                ctc_per_child: dec!(2200),
                ctc_phase_out_start: ByStatus {
                    single: dec!(200000),
                    married_joint: dec!(400000),
                    married_separate: dec!(200000),
                    head_of_household: dec!(200000),
                },
                ctc_phase_out_step: dec!(50),
                dependent_care_rate: dec!(0.20),
                dependent_care_cap_one_child: dec!(3000),
                dependent_care_cap_multi: dec!(6000),
                education_cap: dec!(2500),
                education_phase_out_start: ByStatus {
                    single: dec!(80000),
                    married_joint: dec!(160000),
                    married_separate: Decimal::ZERO,
                    head_of_household: dec!(80000),
                },
                education_phase_out_range: ByStatus {
                    single: dec!(10000),
                    married_joint: dec!(20000),
                    married_separate: dec!(10000),
                    head_of_household: dec!(10000),
                },
            },
            limits: ContributionLimits {
                retirement_401k: dec!(23500),
                retirement_401k_catch_up: dec!(7500),
                retirement_catch_up_age: 50,
                ira: dec!(7000),
                ira_catch_up: dec!(1000),
                hsa_self: dec!(4300),
                hsa_family: dec!(8550),
                hsa_catch_up: dec!(1000),
                hsa_catch_up_age: 55,
            },
            entity: EntityRates {
                reasonable_salary_floor: dec!(0.40),
                scorp_annual_overhead: dec!(3000),
                breakeven_tolerance: dec!(1),
            },
        }
    }

    /// Load a table from JSON, e.g. a projected future year or a
    /// hypothetical law change. The table is validated before use.
    pub fn load_json<R: Read>(reader: R) -> Result<RateTable, ConfigurationError> {
        let table: RateTable = serde_json::from_reader(reader)
            .map_err(|e| ConfigurationError::Malformed(e.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    /// Check structural soundness of the table
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for status in FilingStatus::all() {
            let brackets = self.brackets.get(status);
            if brackets.is_empty() {
                return Err(ConfigurationError::EmptyBrackets { status });
            }
            let mut prev = Decimal::ZERO;
            for (i, bracket) in brackets.iter().enumerate() {
                let last = i == brackets.len() - 1;
                match bracket.upper {
                    Some(upper) => {
                        if last {
                            return Err(ConfigurationError::BoundedTopBracket { status });
                        }
                        if upper <= prev {
                            return Err(ConfigurationError::BracketsNotAscending { status });
                        }
                        prev = upper;
                    }
                    None => {
                        if !last {
                            return Err(ConfigurationError::BracketsNotAscending { status });
                        }
                    }
                }
                if bracket.rate < Decimal::ZERO || bracket.rate >= Decimal::ONE {
                    return Err(ConfigurationError::InvalidConstant {
                        field: "brackets.rate",
                        reason: format!("rate {} outside [0, 1)", bracket.rate),
                    });
                }
            }
            if self.standard_deduction.get(status) < &Decimal::ZERO {
                return Err(ConfigurationError::InvalidConstant {
                    field: "standard_deduction",
                    reason: "must be non-negative".into(),
                });
            }
        }
        let fractions: [(&'static str, Decimal); 6] = [
            ("se.net_earnings_factor", self.se.net_earnings_factor),
            ("qbi.rate", self.qbi.rate),
            ("amt.exemption_phase_out_rate", self.amt.exemption_phase_out_rate),
            ("niit.rate", self.niit.rate),
            ("deductions.medical_agi_floor", self.deductions.medical_agi_floor),
            ("entity.reasonable_salary_floor", self.entity.reasonable_salary_floor),
        ];
        for (field, value) in fractions {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(ConfigurationError::InvalidConstant {
                    field,
                    reason: format!("{value} outside [0, 1]"),
                });
            }
        }
        if self.se.social_security_wage_base <= Decimal::ZERO {
            return Err(ConfigurationError::InvalidConstant {
                field: "se.social_security_wage_base",
                reason: "must be positive".into(),
            });
        }
        if self.entity.scorp_annual_overhead < Decimal::ZERO {
            return Err(ConfigurationError::InvalidConstant {
                field: "entity.scorp_annual_overhead",
                reason: "must be non-negative".into(),
            });
        }
        if self.entity.breakeven_tolerance <= Decimal::ZERO {
            return Err(ConfigurationError::InvalidConstant {
                field: "entity.breakeven_tolerance",
                reason: "must be positive".into(),
            });
        }
        if self.deductions.bunching_window_years < 2 {
            return Err(ConfigurationError::InvalidConstant {
                field: "deductions.bunching_window_years",
                reason: "bunching needs at least two years".into(),
            });
        }
        Ok(())
    }

    /// Tax on `taxable` under the progressive bracket schedule for
    /// `status`. Unrounded; the caller rounds the final liability.
    pub fn tax_from_brackets(&self, status: FilingStatus, taxable: Decimal) -> Decimal {
        if taxable <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let mut tax = Decimal::ZERO;
        let mut lower = Decimal::ZERO;
        for bracket in self.brackets.get(status) {
            let upper = bracket.upper.unwrap_or(taxable);
            let slice = taxable.min(upper) - lower;
            if slice <= Decimal::ZERO {
                break;
            }
            tax += slice * bracket.rate;
            lower = upper;
        }
        tax
    }

    /// Rate of the bracket `taxable` falls in
    pub fn marginal_rate(&self, status: FilingStatus, taxable: Decimal) -> Decimal {
        let brackets = self.brackets.get(status);
        for bracket in brackets {
            match bracket.upper {
                Some(upper) if taxable > upper => continue,
                _ => return bracket.rate,
            }
        }
        // validate() guarantees a top bracket
        brackets.last().map(|b| b.rate).unwrap_or(Decimal::ZERO)
    }

    /// Distance from `taxable` to the upper edge of its bracket, with the
    /// rate of the next bracket up. `None` when already in the top bracket.
    pub fn bracket_headroom(
        &self,
        status: FilingStatus,
        taxable: Decimal,
    ) -> Option<(Decimal, Decimal)> {
        let brackets = self.brackets.get(status);
        let mut iter = brackets.iter().peekable();
        while let Some(bracket) = iter.next() {
            match bracket.upper {
                Some(upper) if taxable > upper => continue,
                Some(upper) => {
                    let next_rate = iter.peek().map(|b| b.rate).unwrap_or(bracket.rate);
                    return Some((upper - taxable.max(Decimal::ZERO), next_rate));
                }
                None => return None,
            }
        }
        None
    }

    pub fn standard_deduction_for(&self, status: FilingStatus) -> Decimal {
        *self.standard_deduction.get(status)
    }
}
