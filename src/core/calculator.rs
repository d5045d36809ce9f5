//! Federal liability calculation.
//!
//! [`calculate`] is pure and deterministic: the same return and rate table
//! always produce the same breakdown. Intermediate amounts are carried at
//! full precision; only the final liability is rounded, half-up to cents.

use super::model::{EntityType, FilingStatus, TaxReturn, ValidationError};
use super::rates::RateTable;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Round a currency amount to cents, half away from zero
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a rate to four decimal places
pub fn round_rate(rate: Decimal) -> Decimal {
    rate.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// Which deduction won the standard-vs-itemized comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DeductionKind {
    Standard,
    Itemized,
}

impl std::fmt::Display for DeductionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeductionKind::Standard => write!(f, "standard"),
            DeductionKind::Itemized => write!(f, "itemized"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeductionTaken {
    pub kind: DeductionKind,
    #[schemars(with = "f64")]
    pub amount: Decimal,
}

/// Credit amounts actually applied, after phase-outs and clamping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreditsApplied {
    #[schemars(with = "f64")]
    pub child_tax_credit: Decimal,
    #[schemars(with = "f64")]
    pub dependent_care: Decimal,
    #[schemars(with = "f64")]
    pub education: Decimal,
    #[schemars(with = "f64")]
    pub other_nonrefundable: Decimal,
    #[schemars(with = "f64")]
    pub refundable: Decimal,
}

impl CreditsApplied {
    pub fn total_nonrefundable(&self) -> Decimal {
        self.child_tax_credit + self.dependent_care + self.education + self.other_nonrefundable
    }
}

/// Itemized liability components for one return under one rate table.
///
/// `total_liability` is rounded to cents and may be negative when
/// refundable credits exceed the tax due. Everything else is unrounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LiabilityBreakdown {
    pub year: u16,
    pub filing_status: FilingStatus,
    #[schemars(with = "f64")]
    pub gross_income: Decimal,
    #[schemars(with = "f64")]
    pub agi: Decimal,
    pub deduction: DeductionTaken,
    #[schemars(with = "f64")]
    pub qbi_deduction: Decimal,
    #[schemars(with = "f64")]
    pub taxable_income: Decimal,
    #[schemars(with = "f64")]
    pub ordinary_tax: Decimal,
    #[schemars(with = "f64")]
    pub self_employment_tax: Decimal,
    /// Combined FICA (both halves) on an S-corp owner salary
    #[schemars(with = "f64")]
    pub payroll_tax: Decimal,
    #[schemars(with = "f64")]
    pub additional_medicare: Decimal,
    /// Alternative minimum tax add-on, zero when the regular tax is higher
    #[schemars(with = "f64")]
    pub amt: Decimal,
    #[schemars(with = "f64")]
    pub niit: Decimal,
    pub credits: CreditsApplied,
    #[schemars(with = "f64")]
    pub total_liability: Decimal,
    #[schemars(with = "f64")]
    pub effective_rate: Decimal,
    #[schemars(with = "f64")]
    pub marginal_rate: Decimal,
}

/// Compute the full liability breakdown for a validated return.
///
/// Validation runs first; a malformed return is rejected rather than
/// clamped. A zero-income return is valid and yields a zero breakdown.
pub fn calculate(
    ret: &TaxReturn,
    rates: &RateTable,
) -> Result<LiabilityBreakdown, ValidationError> {
    ret.validate(rates)?;
    Ok(calculate_unchecked(ret, rates))
}

/// Calculation body, shared with callers that have already validated
/// (the scenario engine re-validates overridden returns itself).
pub(crate) fn calculate_unchecked(ret: &TaxReturn, rates: &RateTable) -> LiabilityBreakdown {
    let status = ret.taxpayer.filing_status;

    // Spouse wages are household income; the filing status picks the
    // schedule, not the income base
    let spouse_wages = ret
        .taxpayer
        .spouse
        .as_ref()
        .map(|spouse| spouse.wages)
        .unwrap_or(Decimal::ZERO);

    let scorp = ret
        .business
        .as_ref()
        .filter(|b| b.entity_type == EntityType::SCorp);
    let scorp_salary = scorp
        .and_then(|b| b.elected_salary)
        .unwrap_or(Decimal::ZERO);

    // Payroll tax on the owner salary, both halves; the employer half is
    // deductible by the business before the distribution flows through
    let payroll_tax = payroll_tax_on_salary(ret, rates, scorp_salary);
    let distribution = scorp
        .map(|b| b.net_income - scorp_salary - payroll_tax / dec!(2))
        .unwrap_or(Decimal::ZERO);

    // Sole proprietorship and LLC profits are self-employment earnings;
    // an S-corp distribution is not
    let non_scorp_profit = ret
        .business
        .as_ref()
        .filter(|b| b.entity_type != EntityType::SCorp)
        .map(|b| b.net_income)
        .unwrap_or(Decimal::ZERO);
    let se_income = ret.income.self_employment + non_scorp_profit;

    let se = se_tax_parts(ret, rates, se_income, scorp_salary);
    log::debug!(
        "se income {} net earnings {} se tax {}",
        se_income,
        se.net_earnings,
        se.tax
    );

    let capital = limited_capital(ret, rates);
    let gross_income = ret.income.wages
        + spouse_wages
        + scorp_salary
        + distribution
        + se_income
        + ret.income.investment
        + ret.income.rental
        + capital;

    let agi = gross_income - ret.adjustments.total() - se.half_deduction;
    log::debug!("gross income {} agi {}", gross_income, agi);

    let deduction = choose_deduction(ret, rates, agi);
    log::debug!("{} deduction {}", deduction.0.kind, deduction.0.amount);
    let (deduction, salt_deducted) = deduction;

    let taxable_before_qbi = (agi - deduction.amount).max(Decimal::ZERO);
    let qbi_deduction = qbi_deduction(
        ret,
        rates,
        taxable_before_qbi,
        se_income,
        se.half_deduction,
        distribution,
    );
    let taxable_income = (taxable_before_qbi - qbi_deduction).max(Decimal::ZERO);
    log::debug!("qbi {} taxable {}", qbi_deduction, taxable_income);

    let ordinary_tax = rates.tax_from_brackets(status, taxable_income);

    let amt = amt_addon(
        rates,
        status,
        taxable_income,
        &deduction,
        salt_deducted,
        ordinary_tax,
    );

    let additional_medicare = additional_medicare(
        rates,
        status,
        ret.income.wages + scorp_salary + spouse_wages,
        se.net_earnings,
    );

    let niit = niit(ret, rates, agi, capital);

    let income_tax = ordinary_tax + amt;
    let credits = credits_applied(ret, rates, agi, income_tax);

    let total = income_tax - credits.total_nonrefundable()
        + se.tax
        + payroll_tax
        + additional_medicare
        + niit
        - credits.refundable;
    let total_liability = round_currency(total);

    let effective_rate = if gross_income > Decimal::ZERO {
        round_rate(total_liability / gross_income)
    } else {
        Decimal::ZERO
    };

    LiabilityBreakdown {
        year: rates.year,
        filing_status: status,
        gross_income,
        agi,
        deduction,
        qbi_deduction,
        taxable_income,
        ordinary_tax,
        self_employment_tax: se.tax,
        payroll_tax,
        additional_medicare,
        amt,
        niit,
        credits,
        total_liability,
        effective_rate,
        marginal_rate: rates.marginal_rate(status, taxable_income),
    }
}

/// Net capital gain, or a loss limited to the per-year deductible amount
fn limited_capital(ret: &TaxReturn, rates: &RateTable) -> Decimal {
    let gains = ret.income.capital_gains;
    if gains >= Decimal::ZERO {
        gains
    } else {
        let limit = *rates
            .deductions
            .capital_loss_limit
            .get(ret.taxpayer.filing_status);
        gains.max(-limit)
    }
}

struct SeTaxParts {
    tax: Decimal,
    half_deduction: Decimal,
    net_earnings: Decimal,
}

/// SE tax per IRC §1401: 92.35% of net earnings, social security portion
/// coordinated with W-2 wages already counted against the wage base.
fn se_tax_parts(
    ret: &TaxReturn,
    rates: &RateTable,
    se_income: Decimal,
    scorp_salary: Decimal,
) -> SeTaxParts {
    if se_income <= Decimal::ZERO {
        return SeTaxParts {
            tax: Decimal::ZERO,
            half_deduction: Decimal::ZERO,
            net_earnings: Decimal::ZERO,
        };
    }
    let se = &rates.se;
    let net_earnings = se_income * se.net_earnings_factor;
    let wages_against_base = ret.income.wages + scorp_salary;
    let ss_room = (se.social_security_wage_base - wages_against_base).max(Decimal::ZERO);
    let ss_tax = net_earnings.min(ss_room) * se.social_security_rate;
    let medicare_tax = net_earnings * se.medicare_rate;
    let tax = ss_tax + medicare_tax;
    SeTaxParts {
        tax,
        half_deduction: tax / dec!(2),
        net_earnings,
    }
}

/// Combined employer + employee FICA on an S-corp owner salary
fn payroll_tax_on_salary(ret: &TaxReturn, rates: &RateTable, salary: Decimal) -> Decimal {
    if salary <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let se = &rates.se;
    let ss_room = (se.social_security_wage_base - ret.income.wages).max(Decimal::ZERO);
    let ss_taxable = salary.min(ss_room);
    ss_taxable * se.social_security_rate + salary * se.medicare_rate
}

/// Additional Medicare (IRC §3101(b)(2)) on wages plus SE earnings above
/// the household threshold
fn additional_medicare(
    rates: &RateTable,
    status: FilingStatus,
    household_wages: Decimal,
    se_net_earnings: Decimal,
) -> Decimal {
    let threshold = *rates.se.additional_medicare_threshold.get(status);
    let base = household_wages + se_net_earnings;
    (base - threshold).max(Decimal::ZERO) * rates.se.additional_medicare_rate
}

/// Standard-vs-itemized choice. Returns the winner plus the SALT amount
/// actually deducted (needed for the AMT addback).
fn choose_deduction(
    ret: &TaxReturn,
    rates: &RateTable,
    agi: Decimal,
) -> (DeductionTaken, Decimal) {
    let status = ret.taxpayer.filing_status;
    let d = &ret.deductions;
    let salt_deducted = d
        .state_local_taxes
        .min(*rates.deductions.salt_cap.get(status));
    let medical_floor = agi.max(Decimal::ZERO) * rates.deductions.medical_agi_floor;
    let medical = (d.medical_expenses - medical_floor).max(Decimal::ZERO);
    let itemized =
        salt_deducted + d.mortgage_interest + d.charitable_cash + medical + d.other_itemized;
    let standard = rates.standard_deduction_for(status);

    if d.standard_eligible && standard >= itemized {
        (
            DeductionTaken {
                kind: DeductionKind::Standard,
                amount: standard,
            },
            Decimal::ZERO,
        )
    } else {
        (
            DeductionTaken {
                kind: DeductionKind::Itemized,
                amount: itemized,
            },
            salt_deducted,
        )
    }
}

/// QBI deduction (IRC §199A), limited to 20% of taxable income before the
/// deduction. Specified service business income phases out linearly over
/// the statutory range; the W-2/UBIA limitation is not modelled.
fn qbi_deduction(
    ret: &TaxReturn,
    rates: &RateTable,
    taxable_before_qbi: Decimal,
    se_income: Decimal,
    se_half_deduction: Decimal,
    distribution: Decimal,
) -> Decimal {
    let se_base = (se_income - se_half_deduction).max(Decimal::ZERO);
    if se_base.is_zero() && distribution <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let status = ret.taxpayer.filing_status;
    let sstb = ret
        .business
        .as_ref()
        .map(|b| b.specified_service)
        .unwrap_or(false);

    let (sstb_base, plain_base) = match &ret.business {
        Some(b) if sstb && b.entity_type == EntityType::SCorp => {
            (distribution.max(Decimal::ZERO), se_base)
        }
        Some(b) if sstb => {
            // Split the SE base between the flagged business and any other
            // freelance income in proportion to profit
            if se_income > Decimal::ZERO {
                let share = b.net_income / se_income;
                let flagged = se_base * share;
                (flagged, se_base - flagged + distribution.max(Decimal::ZERO))
            } else {
                (Decimal::ZERO, distribution.max(Decimal::ZERO))
            }
        }
        _ => (Decimal::ZERO, se_base + distribution.max(Decimal::ZERO)),
    };

    let factor = sstb_phase_out_factor(rates, status, taxable_before_qbi);
    let qualified = plain_base + sstb_base * factor;
    let tentative = qualified * rates.qbi.rate;
    let limit = taxable_before_qbi * rates.qbi.rate;
    tentative.min(limit).max(Decimal::ZERO)
}

/// 1 below the phase-out start, 0 past the end of the range, linear between
fn sstb_phase_out_factor(
    rates: &RateTable,
    status: FilingStatus,
    taxable_before_qbi: Decimal,
) -> Decimal {
    let start = *rates.qbi.phase_out_start.get(status);
    let range = *rates.qbi.phase_out_range.get(status);
    if taxable_before_qbi <= start {
        Decimal::ONE
    } else if range.is_zero() || taxable_before_qbi >= start + range {
        Decimal::ZERO
    } else {
        Decimal::ONE - (taxable_before_qbi - start) / range
    }
}

/// AMT add-on (IRC §55). AMTI reconstructs taxable income without the
/// deduction AMT disallows: the standard deduction, or the SALT portion
/// of itemized deductions. The add-on is the excess of tentative minimum
/// tax over the regular tax, never negative.
fn amt_addon(
    rates: &RateTable,
    status: FilingStatus,
    taxable_income: Decimal,
    deduction: &DeductionTaken,
    salt_deducted: Decimal,
    ordinary_tax: Decimal,
) -> Decimal {
    let addback = match deduction.kind {
        DeductionKind::Standard => deduction.amount,
        DeductionKind::Itemized => salt_deducted,
    };
    let amti = taxable_income + addback;

    let amt = &rates.amt;
    let phase_out_start = *amt.exemption_phase_out_start.get(status);
    let reduction = (amti - phase_out_start).max(Decimal::ZERO) * amt.exemption_phase_out_rate;
    let exemption = (*amt.exemption.get(status) - reduction).max(Decimal::ZERO);
    let base = (amti - exemption).max(Decimal::ZERO);

    let threshold = *amt.rate_threshold.get(status);
    let tentative = if base <= threshold {
        base * amt.low_rate
    } else {
        threshold * amt.low_rate + (base - threshold) * amt.high_rate
    };
    let addon = (tentative - ordinary_tax).max(Decimal::ZERO);
    if addon > Decimal::ZERO {
        log::debug!("amt triggered: amti {} tentative {}", amti, tentative);
    }
    addon
}

/// NIIT (IRC §1411): 3.8% of the lesser of net investment income and the
/// MAGI excess over the threshold
fn niit(ret: &TaxReturn, rates: &RateTable, agi: Decimal, capital: Decimal) -> Decimal {
    let status = ret.taxpayer.filing_status;
    let nii = (ret.income.investment + ret.income.rental + capital).max(Decimal::ZERO);
    let excess = (agi - *rates.niit.magi_threshold.get(status)).max(Decimal::ZERO);
    nii.min(excess) * rates.niit.rate
}

/// Apply credits in a fixed order: child tax credit, dependent care,
/// education, then other nonrefundable, each clamped to the income tax
/// remaining. Refundable credits come last at full value.
fn credits_applied(
    ret: &TaxReturn,
    rates: &RateTable,
    agi: Decimal,
    income_tax: Decimal,
) -> CreditsApplied {
    let status = ret.taxpayer.filing_status;
    let cr = &rates.credits;
    let mut remaining = income_tax.max(Decimal::ZERO);

    // Child tax credit with the per-$1,000-over phase-out, IRC §24(b)
    let children = Decimal::from(ret.taxpayer.qualifying_children);
    let ctc = if ret.taxpayer.qualifying_children > 0 {
        let base = cr.ctc_per_child * children;
        let over = (agi - *cr.ctc_phase_out_start.get(status)).max(Decimal::ZERO);
        let steps = (over / dec!(1000)).ceil();
        (base - cr.ctc_phase_out_step * steps).max(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };
    let child_tax_credit = ctc.min(remaining);
    remaining -= child_tax_credit;

    let care = if ret.taxpayer.qualifying_children > 0
        && ret.credits.child_care_expenses > Decimal::ZERO
    {
        let cap = if ret.taxpayer.qualifying_children >= 2 {
            cr.dependent_care_cap_multi
        } else {
            cr.dependent_care_cap_one_child
        };
        ret.credits.child_care_expenses.min(cap) * cr.dependent_care_rate
    } else {
        Decimal::ZERO
    };
    let dependent_care = care.min(remaining);
    remaining -= dependent_care;

    let education = education_credit(ret, rates, agi).min(remaining);
    remaining -= education;

    let other_nonrefundable = ret.credits.other_nonrefundable.min(remaining);

    CreditsApplied {
        child_tax_credit,
        dependent_care,
        education,
        other_nonrefundable,
        refundable: ret.credits.other_refundable,
    }
}

/// American Opportunity style education credit: 100% of the first $2,000
/// of expenses plus 25% of the next $2,000, phased out linearly over the
/// MAGI range. A zero phase-out start means the status is ineligible.
fn education_credit(ret: &TaxReturn, rates: &RateTable, agi: Decimal) -> Decimal {
    if !ret.credits.education_credit_eligible
        || ret.credits.education_expenses <= Decimal::ZERO
    {
        return Decimal::ZERO;
    }
    let status = ret.taxpayer.filing_status;
    let cr = &rates.credits;
    let start = *cr.education_phase_out_start.get(status);
    if start.is_zero() {
        return Decimal::ZERO;
    }
    let expenses = ret.credits.education_expenses;
    let first = expenses.min(dec!(2000));
    let second = (expenses - dec!(2000)).clamp(Decimal::ZERO, dec!(2000)) * dec!(0.25);
    let credit = (first + second).min(cr.education_cap);

    let range = *cr.education_phase_out_range.get(status);
    let factor = if agi <= start {
        Decimal::ONE
    } else if range.is_zero() || agi >= start + range {
        Decimal::ZERO
    } else {
        Decimal::ONE - (agi - start) / range
    };
    credit * factor
}
