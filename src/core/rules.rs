//! Threshold-based planning rules.
//!
//! Each rule is a declarative entry: metadata plus a pure evaluation
//! function over the return, its baseline breakdown and the rate table.
//! A rule fires at most once, savings estimates come from re-running the
//! calculator on an overridden return rather than hand-derived formulas,
//! and a rule that cannot decide eligibility degrades to a low-confidence
//! finding instead of failing the whole evaluation.

use super::calculator::{calculate_unchecked, LiabilityBreakdown};
use super::model::{EntityType, TaxReturn, ValidationError};
use super::rates::RateTable;
use super::scenario::{FieldPath, FieldValue, Scenario};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Recommendation grouping used for presentation and filtering
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum RecommendationCategory {
    Retirement,
    HealthSavings,
    Deductions,
    Credits,
    EntityStructure,
    FilingStatus,
    Investment,
}

impl RecommendationCategory {
    pub fn display(&self) -> &'static str {
        match self {
            RecommendationCategory::Retirement => "Retirement",
            RecommendationCategory::HealthSavings => "Health Savings",
            RecommendationCategory::Deductions => "Deductions",
            RecommendationCategory::Credits => "Credits",
            RecommendationCategory::EntityStructure => "Entity Structure",
            RecommendationCategory::FilingStatus => "Filing Status",
            RecommendationCategory::Investment => "Investment",
        }
    }
}

impl std::fmt::Display for RecommendationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// How much work acting on a recommendation takes. The ordering is the
/// ranking tie-break: lower complexity sorts first at equal savings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum ImplementationComplexity {
    /// A contribution or election the taxpayer can make directly
    Low,
    /// Requires coordination, e.g. payroll changes or multi-year planning
    Medium,
    /// Requires professional help, e.g. an entity restructuring
    High,
}

impl std::fmt::Display for ImplementationComplexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImplementationComplexity::Low => write!(f, "low"),
            ImplementationComplexity::Medium => write!(f, "medium"),
            ImplementationComplexity::High => write!(f, "high"),
        }
    }
}

/// Inputs every rule evaluates against
pub struct RuleContext<'a> {
    pub ret: &'a TaxReturn,
    pub baseline: &'a LiabilityBreakdown,
    pub rates: &'a RateTable,
}

/// What a fired rule produced, before metadata is attached
pub struct RuleFire {
    pub savings: Decimal,
    pub note: String,
    /// Fields an implementation of this advice would change; the
    /// deduplication pass collapses findings with overlapping sets
    pub fields: BTreeSet<FieldPath>,
    /// Fraction of required inputs present for this estimate
    pub completeness: Decimal,
    /// Normalized distance to the phase-out edge that would flip the
    /// advice; near zero means a cliff
    pub phase_out_proximity: Option<Decimal>,
    /// Present when eligibility could not be determined
    pub ambiguous: Option<String>,
    /// The override set the savings estimate came from, when one exists;
    /// informational findings have none
    pub scenario: Option<Scenario>,
}

/// A declarative rule: metadata plus evaluation function
pub struct RuleDefinition {
    pub id: &'static str,
    pub category: RecommendationCategory,
    pub title: &'static str,
    pub irs_reference: &'static str,
    pub complexity: ImplementationComplexity,
    pub evaluate: fn(&RuleContext) -> Option<RuleFire>,
}

/// A rule that fired against a specific return
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub rule_id: &'static str,
    pub category: RecommendationCategory,
    pub title: &'static str,
    pub irs_reference: &'static str,
    pub complexity: ImplementationComplexity,
    pub savings: Decimal,
    pub note: String,
    pub fields: BTreeSet<FieldPath>,
    pub completeness: Decimal,
    pub phase_out_proximity: Option<Decimal>,
    pub ambiguous: Option<String>,
    pub scenario: Option<Scenario>,
}

/// Evaluate every built-in rule in table order.
///
/// Deterministic: rule order is fixed and each rule is pure.
pub fn evaluate(ret: &TaxReturn, rates: &RateTable) -> Result<Vec<Finding>, ValidationError> {
    evaluate_with(ret, rates, builtin_rules())
}

/// [`evaluate`] over a caller-supplied rule table, so a deployment can
/// swap or extend the table without code changes
pub fn evaluate_with(
    ret: &TaxReturn,
    rates: &RateTable,
    rules: &[RuleDefinition],
) -> Result<Vec<Finding>, ValidationError> {
    ret.validate(rates)?;
    let baseline = calculate_unchecked(ret, rates);
    let ctx = RuleContext {
        ret,
        baseline: &baseline,
        rates,
    };
    let findings = rules
        .iter()
        .filter_map(|rule| {
            (rule.evaluate)(&ctx).map(|fire| {
                log::debug!("rule {} fired, savings {}", rule.id, fire.savings);
                Finding {
                    rule_id: rule.id,
                    category: rule.category,
                    title: rule.title,
                    irs_reference: rule.irs_reference,
                    complexity: rule.complexity,
                    savings: fire.savings,
                    note: fire.note,
                    fields: fire.fields,
                    completeness: fire.completeness,
                    phase_out_proximity: fire.phase_out_proximity,
                    ambiguous: fire.ambiguous,
                    scenario: fire.scenario,
                }
            })
        })
        .collect();
    Ok(findings)
}

pub fn builtin_rules() -> &'static [RuleDefinition] {
    &BUILTIN
}

static BUILTIN: [RuleDefinition; 12] = [
    RuleDefinition {
        id: "retirement-401k-headroom",
        category: RecommendationCategory::Retirement,
        title: "Increase 401(k) contributions to the annual limit",
        irs_reference: "IRC §402(g)",
        complexity: ImplementationComplexity::Low,
        evaluate: rule_401k_headroom,
    },
    RuleDefinition {
        id: "traditional-ira-deduction",
        category: RecommendationCategory::Retirement,
        title: "Contribute to a traditional IRA",
        irs_reference: "IRC §219",
        complexity: ImplementationComplexity::Low,
        evaluate: rule_ira_deduction,
    },
    RuleDefinition {
        id: "hsa-headroom",
        category: RecommendationCategory::HealthSavings,
        title: "Fund the HSA to the annual limit",
        irs_reference: "IRC §223",
        complexity: ImplementationComplexity::Low,
        evaluate: rule_hsa_headroom,
    },
    RuleDefinition {
        id: "salt-cap-workaround",
        category: RecommendationCategory::Deductions,
        title: "State taxes exceed the SALT cap",
        irs_reference: "IRC §164(b)(6)",
        complexity: ImplementationComplexity::High,
        evaluate: rule_salt_cap,
    },
    RuleDefinition {
        id: "charitable-bunching",
        category: RecommendationCategory::Deductions,
        title: "Bunch charitable giving into alternating years",
        irs_reference: "IRC §170",
        complexity: ImplementationComplexity::Medium,
        evaluate: rule_charitable_bunching,
    },
    RuleDefinition {
        id: "scorp-election",
        category: RecommendationCategory::EntityStructure,
        title: "Consider an S-corp election for the business",
        irs_reference: "IRC §1362",
        complexity: ImplementationComplexity::High,
        evaluate: rule_scorp_election,
    },
    RuleDefinition {
        id: "qbi-phase-out-proximity",
        category: RecommendationCategory::Retirement,
        title: "Defer income to preserve the QBI deduction",
        irs_reference: "IRC §199A",
        complexity: ImplementationComplexity::Medium,
        evaluate: rule_qbi_proximity,
    },
    RuleDefinition {
        id: "niit-exposure",
        category: RecommendationCategory::Investment,
        title: "Shift investment income out of NIIT exposure",
        irs_reference: "IRC §1411",
        complexity: ImplementationComplexity::Medium,
        evaluate: rule_niit_exposure,
    },
    RuleDefinition {
        id: "capital-loss-carryforward",
        category: RecommendationCategory::Investment,
        title: "Capital loss exceeds the annual deduction limit",
        irs_reference: "IRC §1211(b)",
        complexity: ImplementationComplexity::Low,
        evaluate: rule_capital_loss,
    },
    RuleDefinition {
        id: "ctc-phase-out-proximity",
        category: RecommendationCategory::Credits,
        title: "Lower AGI to restore the child tax credit",
        irs_reference: "IRC §24(b)",
        complexity: ImplementationComplexity::Medium,
        evaluate: rule_ctc_proximity,
    },
    RuleDefinition {
        id: "ambiguous-filing-status",
        category: RecommendationCategory::FilingStatus,
        title: "Joint-versus-separate comparison needs spouse data",
        irs_reference: "IRC §7703",
        complexity: ImplementationComplexity::Low,
        evaluate: rule_ambiguous_filing_status,
    },
    RuleDefinition {
        id: "education-credit-magi-proximity",
        category: RecommendationCategory::Credits,
        title: "Lower MAGI to restore the education credit",
        irs_reference: "IRC §25A",
        complexity: ImplementationComplexity::Medium,
        evaluate: rule_education_proximity,
    },
];

fn field_set(fields: &[FieldPath]) -> BTreeSet<FieldPath> {
    fields.iter().copied().collect()
}

/// Liability saved by applying `scenario` to the context's return.
/// `None` when the derived return is invalid or saves nothing.
fn savings_for(ctx: &RuleContext, scenario: &Scenario) -> Option<Decimal> {
    let derived = match scenario.apply(ctx.ret) {
        Ok(derived) => derived,
        Err(e) => {
            log::warn!("rule scenario '{}' not applicable: {e}", scenario.name);
            return None;
        }
    };
    if let Err(e) = derived.validate(ctx.rates) {
        log::warn!("rule scenario '{}' produced invalid return: {e}", scenario.name);
        return None;
    }
    let breakdown = calculate_unchecked(&derived, ctx.rates);
    let savings = ctx.baseline.total_liability - breakdown.total_liability;
    (savings > Decimal::ZERO).then_some(savings)
}

fn earned_income(ret: &TaxReturn) -> Decimal {
    let business = ret
        .business
        .as_ref()
        .map(|b| b.net_income)
        .unwrap_or(Decimal::ZERO);
    ret.income.wages + ret.income.self_employment + business
}

/// 401(k) target: the statutory limit (with catch-up only at a known
/// qualifying age) capped by earned income
fn target_401k(ctx: &RuleContext) -> (Decimal, Decimal) {
    let limits = &ctx.rates.limits;
    let catch_up = match ctx.ret.taxpayer.age {
        Some(age) if age >= limits.retirement_catch_up_age => limits.retirement_401k_catch_up,
        _ => Decimal::ZERO,
    };
    let completeness = if ctx.ret.taxpayer.age.is_none() {
        dec!(0.85)
    } else {
        Decimal::ONE
    };
    let target = (limits.retirement_401k + catch_up).min(earned_income(ctx.ret));
    (target, completeness)
}

fn rule_401k_headroom(ctx: &RuleContext) -> Option<RuleFire> {
    let (target, completeness) = target_401k(ctx);
    let current = ctx.ret.adjustments.retirement_401k;
    let headroom = target - current;
    if headroom <= Decimal::ZERO {
        return None;
    }
    let scenario = Scenario::new("max 401k").amount(FieldPath::Retirement401k, target);
    let savings = savings_for(ctx, &scenario)?;
    Some(RuleFire {
        savings,
        note: format!(
            "Deferring another {headroom} (to {target}) avoids tax at the {}% marginal rate.",
            ctx.baseline.marginal_rate * dec!(100)
        ),
        fields: field_set(&[FieldPath::Retirement401k]),
        completeness,
        phase_out_proximity: None,
        ambiguous: None,
        scenario: Some(scenario),
    })
}

fn rule_ira_deduction(ctx: &RuleContext) -> Option<RuleFire> {
    let limits = &ctx.rates.limits;
    let catch_up = match ctx.ret.taxpayer.age {
        Some(age) if age >= limits.retirement_catch_up_age => limits.ira_catch_up,
        _ => Decimal::ZERO,
    };
    let target = (limits.ira + catch_up).min(earned_income(ctx.ret));
    let headroom = target - ctx.ret.adjustments.traditional_ira;
    if headroom <= Decimal::ZERO {
        return None;
    }
    let scenario = Scenario::new("max IRA").amount(FieldPath::TraditionalIra, target);
    let savings = savings_for(ctx, &scenario)?;
    Some(RuleFire {
        savings,
        note: format!(
            "Contributing another {headroom} to a traditional IRA reduces taxable income. \
             Deductibility may phase out when an employer plan also covers the taxpayer."
        ),
        fields: field_set(&[FieldPath::TraditionalIra]),
        // Employer-plan coverage is not in the model, so the deduction is
        // not certain
        completeness: dec!(0.85),
        phase_out_proximity: None,
        ambiguous: None,
        scenario: Some(scenario),
    })
}

fn rule_hsa_headroom(ctx: &RuleContext) -> Option<RuleFire> {
    if !ctx.ret.credits.hsa_eligible {
        return None;
    }
    let limits = &ctx.rates.limits;
    let base = if ctx.ret.credits.hsa_family_coverage {
        limits.hsa_family
    } else {
        limits.hsa_self
    };
    let catch_up = match ctx.ret.taxpayer.age {
        Some(age) if age >= limits.hsa_catch_up_age => limits.hsa_catch_up,
        _ => Decimal::ZERO,
    };
    let target = base + catch_up;
    let headroom = target - ctx.ret.adjustments.hsa;
    if headroom <= Decimal::ZERO {
        return None;
    }
    let scenario = Scenario::new("max HSA").amount(FieldPath::Hsa, target);
    let savings = savings_for(ctx, &scenario)?;
    Some(RuleFire {
        savings,
        note: format!(
            "Another {headroom} of HSA contributions is deductible, and withdrawals for \
             qualified medical costs stay tax-free."
        ),
        fields: field_set(&[FieldPath::Hsa]),
        completeness: Decimal::ONE,
        phase_out_proximity: None,
        ambiguous: None,
        scenario: Some(scenario),
    })
}

fn rule_salt_cap(ctx: &RuleContext) -> Option<RuleFire> {
    let cap = *ctx
        .rates
        .deductions
        .salt_cap
        .get(ctx.ret.taxpayer.filing_status);
    let excess = ctx.ret.deductions.state_local_taxes - cap;
    if excess <= Decimal::ZERO || !ctx.ret.has_business_income() {
        return None;
    }
    // A pass-through entity tax election moves the state tax above the
    // line, worth roughly the marginal rate on the trapped excess
    let savings = excess * ctx.baseline.marginal_rate;
    Some(RuleFire {
        savings,
        note: format!(
            "{excess} of state and local tax is above the deduction cap. A state \
             pass-through entity tax election could deduct it at the business level."
        ),
        fields: field_set(&[FieldPath::StateLocalTaxes]),
        completeness: dec!(0.7),
        phase_out_proximity: None,
        ambiguous: None,
        scenario: None,
    })
}

fn rule_charitable_bunching(ctx: &RuleContext) -> Option<RuleFire> {
    use super::calculator::DeductionKind;
    if ctx.baseline.deduction.kind != DeductionKind::Standard {
        return None;
    }
    let charitable = ctx.ret.deductions.charitable_cash;
    if charitable <= Decimal::ZERO {
        return None;
    }
    let window = Decimal::from(ctx.rates.deductions.bunching_window_years);
    let scenario = Scenario::new("bunch charitable giving")
        .amount(FieldPath::CharitableCash, charitable * window);
    let savings = savings_for(ctx, &scenario)?;
    Some(RuleFire {
        savings,
        note: format!(
            "Combining {window} years of giving into one itemized year beats taking the \
             standard deduction every year; off years fall back to the standard deduction."
        ),
        fields: field_set(&[FieldPath::CharitableCash]),
        completeness: Decimal::ONE,
        phase_out_proximity: None,
        ambiguous: None,
        scenario: Some(scenario),
    })
}

fn rule_scorp_election(ctx: &RuleContext) -> Option<RuleFire> {
    let business = ctx.ret.business.as_ref()?;
    if business.entity_type == EntityType::SCorp || business.net_income <= Decimal::ZERO {
        return None;
    }
    let salary = business.net_income * ctx.rates.entity.reasonable_salary_floor;
    let scenario = Scenario::new("scorp election")
        .with(FieldPath::BusinessEntityType, FieldValue::Entity(EntityType::SCorp))
        .amount(FieldPath::ElectedSalary, salary);
    let overhead = ctx.rates.entity.scorp_annual_overhead;
    let savings = savings_for(ctx, &scenario)? - overhead;
    if savings <= Decimal::ZERO {
        return None;
    }
    Some(RuleFire {
        savings,
        note: format!(
            "At a reasonable salary of {salary}, distributions escape self-employment \
             tax; the estimate already nets out {overhead} of annual payroll and \
             filing overhead."
        ),
        fields: field_set(&[FieldPath::BusinessEntityType, FieldPath::ElectedSalary]),
        completeness: dec!(0.9),
        phase_out_proximity: None,
        ambiguous: None,
        scenario: Some(scenario),
    })
}

fn rule_qbi_proximity(ctx: &RuleContext) -> Option<RuleFire> {
    let business = ctx.ret.business.as_ref()?;
    if !business.specified_service {
        return None;
    }
    let status = ctx.ret.taxpayer.filing_status;
    let start = *ctx.rates.qbi.phase_out_start.get(status);
    let range = *ctx.rates.qbi.phase_out_range.get(status);
    let taxable_before_qbi = ctx.baseline.agi - ctx.baseline.deduction.amount;
    if taxable_before_qbi <= start || taxable_before_qbi >= start + range || range.is_zero() {
        return None;
    }
    let (target, completeness) = target_401k(ctx);
    if target <= ctx.ret.adjustments.retirement_401k {
        return None;
    }
    let scenario = Scenario::new("defer below QBI phase-out")
        .amount(FieldPath::Retirement401k, target);
    let savings = savings_for(ctx, &scenario)?;
    // How much of the band is still below; a thin remainder is a cliff
    let proximity = Decimal::ONE - (taxable_before_qbi - start) / range;
    Some(RuleFire {
        savings,
        note: format!(
            "Taxable income sits {} into the service-business phase-out band; \
             pre-tax deferrals claw back the QBI deduction.",
            taxable_before_qbi - start
        ),
        fields: field_set(&[FieldPath::Retirement401k]),
        completeness,
        phase_out_proximity: Some(proximity),
        ambiguous: None,
        scenario: Some(scenario),
    })
}

fn rule_niit_exposure(ctx: &RuleContext) -> Option<RuleFire> {
    if ctx.baseline.niit <= Decimal::ZERO {
        return None;
    }
    Some(RuleFire {
        // Upper bound: what disappears if investment income moves into
        // exempt or deferred vehicles
        savings: ctx.baseline.niit,
        note: "Municipal bond interest and tax-deferred accounts fall outside net \
               investment income; the estimate is the full surtax currently paid."
            .to_string(),
        fields: field_set(&[FieldPath::Investment]),
        completeness: dec!(0.7),
        phase_out_proximity: None,
        ambiguous: None,
        scenario: None,
    })
}

fn rule_capital_loss(ctx: &RuleContext) -> Option<RuleFire> {
    let limit = *ctx
        .rates
        .deductions
        .capital_loss_limit
        .get(ctx.ret.taxpayer.filing_status);
    let gains = ctx.ret.income.capital_gains;
    if gains >= -limit {
        return None;
    }
    let excess = -gains - limit;
    Some(RuleFire {
        savings: excess * ctx.baseline.marginal_rate,
        note: format!(
            "{excess} of this year's loss carries forward; it offsets future gains \
             or up to {limit} of ordinary income per year."
        ),
        fields: field_set(&[FieldPath::CapitalGains]),
        // Value realizes over future years at uncertain rates
        completeness: dec!(0.8),
        phase_out_proximity: None,
        ambiguous: None,
        scenario: None,
    })
}

fn rule_ctc_proximity(ctx: &RuleContext) -> Option<RuleFire> {
    if ctx.ret.taxpayer.qualifying_children == 0 {
        return None;
    }
    let status = ctx.ret.taxpayer.filing_status;
    let start = *ctx.rates.credits.ctc_phase_out_start.get(status);
    if ctx.baseline.agi <= start {
        return None;
    }
    let (target, completeness) = target_401k(ctx);
    if target <= ctx.ret.adjustments.retirement_401k {
        return None;
    }
    let scenario = Scenario::new("lower AGI below CTC phase-out")
        .amount(FieldPath::Retirement401k, target);
    let savings = savings_for(ctx, &scenario)?;
    // Full phase-out spans credit / step thousands of AGI
    let full_credit =
        ctx.rates.credits.ctc_per_child * Decimal::from(ctx.ret.taxpayer.qualifying_children);
    let width = full_credit / ctx.rates.credits.ctc_phase_out_step * dec!(1000);
    let over = ctx.baseline.agi - start;
    let proximity = (Decimal::ONE - over / width).max(Decimal::ZERO);
    Some(RuleFire {
        savings,
        note: format!(
            "AGI is {over} over the child tax credit phase-out start; pre-tax \
             deferrals recover {} of credit per $1,000.",
            ctx.rates.credits.ctc_phase_out_step
        ),
        fields: field_set(&[FieldPath::Retirement401k]),
        completeness,
        phase_out_proximity: Some(proximity),
        ambiguous: None,
        scenario: Some(scenario),
    })
}

fn rule_ambiguous_filing_status(ctx: &RuleContext) -> Option<RuleFire> {
    if !ctx.ret.taxpayer.filing_status.is_married() || ctx.ret.taxpayer.spouse.is_some() {
        return None;
    }
    Some(RuleFire {
        savings: Decimal::ZERO,
        note: "The return claims a married status without spouse income data, so the \
               joint-versus-separate comparison cannot be run. Provide spouse wages to \
               complete it."
            .to_string(),
        fields: field_set(&[FieldPath::FilingStatusField]),
        completeness: dec!(0.5),
        phase_out_proximity: None,
        ambiguous: Some("spouse income missing for a married filing status".to_string()),
        scenario: None,
    })
}

fn rule_education_proximity(ctx: &RuleContext) -> Option<RuleFire> {
    let credits = &ctx.ret.credits;
    if !credits.education_credit_eligible || credits.education_expenses <= Decimal::ZERO {
        return None;
    }
    let status = ctx.ret.taxpayer.filing_status;
    let start = *ctx.rates.credits.education_phase_out_start.get(status);
    let range = *ctx.rates.credits.education_phase_out_range.get(status);
    if start.is_zero() || range.is_zero() {
        return None;
    }
    let agi = ctx.baseline.agi;
    if agi <= start || agi >= start + range {
        return None;
    }
    let limits = &ctx.rates.limits;
    let target = limits.ira.min(earned_income(ctx.ret));
    if target <= ctx.ret.adjustments.traditional_ira {
        return None;
    }
    let scenario =
        Scenario::new("lower MAGI below education phase-out").amount(FieldPath::TraditionalIra, target);
    let savings = savings_for(ctx, &scenario)?;
    let proximity = Decimal::ONE - (agi - start) / range;
    Some(RuleFire {
        savings,
        note: format!(
            "MAGI is {} into the education credit phase-out; IRA contributions pull \
             it back toward full credit.",
            agi - start
        ),
        fields: field_set(&[FieldPath::TraditionalIra]),
        completeness: Decimal::ONE,
        phase_out_proximity: Some(proximity),
        ambiguous: None,
        scenario: Some(scenario),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Business, FilingStatus, Income, Spouse, Taxpayer};
    use std::collections::BTreeSet;

    fn single_earner(wages: Decimal) -> TaxReturn {
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

    fn findings_for(ret: &TaxReturn) -> Vec<Finding> {
        evaluate(ret, &RateTable::year_2024()).unwrap()
    }

    fn find<'a>(findings: &'a [Finding], id: &str) -> Option<&'a Finding> {
        findings.iter().find(|f| f.rule_id == id)
    }

    #[test]
    fn headroom_rules_fire_for_wage_earner() {
        let ret = single_earner(dec!(85000));
        let findings = findings_for(&ret);

        let k401 = find(&findings, "retirement-401k-headroom").unwrap();
        // 23,000 deferred, most of it at the 22% rate
        assert_eq!(k401.savings, dec!(5060.00));
        assert_eq!(k401.completeness, Decimal::ONE);

        assert!(find(&findings, "traditional-ira-deduction").is_some());
        // Not HSA eligible
        assert!(find(&findings, "hsa-headroom").is_none());
    }

    #[test]
    fn maxed_contributions_do_not_fire() {
        let mut ret = single_earner(dec!(85000));
        ret.adjustments.retirement_401k = dec!(23000);
        let findings = findings_for(&ret);
        assert!(find(&findings, "retirement-401k-headroom").is_none());
    }

    #[test]
    fn hsa_rule_respects_coverage() {
        let mut ret = single_earner(dec!(85000));
        ret.credits.hsa_eligible = true;
        ret.credits.hsa_family_coverage = true;
        let findings = findings_for(&ret);
        let hsa = find(&findings, "hsa-headroom").unwrap();
        assert!(hsa.note.contains("8300"));
    }

    #[test]
    fn bunching_fires_when_close_to_standard() {
        let mut ret = single_earner(dec!(150000));
        ret.taxpayer.filing_status = FilingStatus::MarriedJoint;
        ret.deductions.state_local_taxes = dec!(10000);
        ret.deductions.mortgage_interest = dec!(8000);
        ret.deductions.charitable_cash = dec!(9000);
        let findings = findings_for(&ret);
        // 27,000 itemized loses to the 29,200 standard deduction, but two
        // years of giving pushes 36,000 over it
        let bunch = find(&findings, "charitable-bunching").unwrap();
        assert!(bunch.savings > Decimal::ZERO);
        assert_eq!(bunch.irs_reference, "IRC §170");
    }

    #[test]
    fn bunching_silent_when_already_itemizing() {
        let mut ret = single_earner(dec!(150000));
        ret.deductions.state_local_taxes = dec!(10000);
        ret.deductions.mortgage_interest = dec!(12000);
        ret.deductions.charitable_cash = dec!(9000);
        let findings = findings_for(&ret);
        assert!(find(&findings, "charitable-bunching").is_none());
    }

    #[test]
    fn scorp_rule_fires_for_sole_proprietor() {
        let mut ret = single_earner(Decimal::ZERO);
        ret.business = Some(Business {
            entity_type: EntityType::SoleProprietorship,
            net_income: dec!(120000),
            elected_salary: None,
            specified_service: false,
        });
        let findings = findings_for(&ret);
        let scorp = find(&findings, "scorp-election").unwrap();
        assert!(scorp.savings > Decimal::ZERO);
        assert_eq!(scorp.complexity, ImplementationComplexity::High);
        assert!(scorp.fields.contains(&FieldPath::BusinessEntityType));
        assert!(scorp.fields.contains(&FieldPath::ElectedSalary));
    }

    #[test]
    fn ambiguous_married_status_degrades_not_fails() {
        let mut ret = single_earner(dec!(95000));
        ret.taxpayer.filing_status = FilingStatus::MarriedJoint;
        ret.taxpayer.spouse = None;
        let findings = findings_for(&ret);
        let ambiguous = find(&findings, "ambiguous-filing-status").unwrap();
        assert!(ambiguous.ambiguous.is_some());
        assert_eq!(ambiguous.savings, Decimal::ZERO);

        ret.taxpayer.spouse = Some(Spouse {
            wages: dec!(40000),
        });
        let findings = findings_for(&ret);
        assert!(find(&findings, "ambiguous-filing-status").is_none());
    }

    #[test]
    fn niit_rule_estimates_full_surtax() {
        let mut ret = single_earner(dec!(180000));
        ret.income.investment = dec!(50000);
        let findings = findings_for(&ret);
        let niit = find(&findings, "niit-exposure").unwrap();
        assert_eq!(niit.savings, dec!(1140.000));
    }

    #[test]
    fn capital_loss_rule_reports_carryforward() {
        let mut ret = single_earner(dec!(85000));
        ret.income.capital_gains = dec!(-12000);
        let findings = findings_for(&ret);
        let loss = find(&findings, "capital-loss-carryforward").unwrap();
        // 9,000 over the limit at a 22% marginal rate
        assert_eq!(loss.savings, dec!(9000) * dec!(0.22));
        assert!(loss.note.contains("9000"));
    }

    #[test]
    fn qbi_proximity_sets_cliff_distance() {
        let mut ret = single_earner(Decimal::ZERO);
        ret.business = Some(Business {
            entity_type: EntityType::SoleProprietorship,
            net_income: dec!(245000),
            elected_salary: None,
            specified_service: true,
        });
        let findings = findings_for(&ret);
        let qbi = find(&findings, "qbi-phase-out-proximity").unwrap();
        let proximity = qbi.phase_out_proximity.unwrap();
        assert!(proximity > Decimal::ZERO && proximity < Decimal::ONE);
    }

    #[test]
    fn ctc_proximity_fires_above_start() {
        let mut ret = single_earner(dec!(215000));
        ret.taxpayer.dependents = 2;
        ret.taxpayer.qualifying_children = 2;
        let findings = findings_for(&ret);
        let ctc = find(&findings, "ctc-phase-out-proximity").unwrap();
        assert!(ctc.savings > Decimal::ZERO);
        assert!(ctc.phase_out_proximity.is_some());
    }

    #[test]
    fn rules_are_deterministic() {
        let mut ret = single_earner(dec!(150000));
        ret.income.investment = dec!(60000);
        ret.credits.hsa_eligible = true;
        let a = findings_for(&ret);
        let b = findings_for(&ret);
        assert_eq!(a, b);
    }

    #[test]
    fn caller_supplied_table_replaces_the_builtin_rules() {
        fn fire_529(_ctx: &RuleContext) -> Option<RuleFire> {
            Some(RuleFire {
                savings: dec!(100),
                note: "Contributions are deductible on the state return.".to_string(),
                fields: field_set(&[FieldPath::EducationExpenses]),
                completeness: Decimal::ONE,
                phase_out_proximity: None,
                ambiguous: None,
                scenario: None,
            })
        }
        let table = [RuleDefinition {
            id: "state-529-deduction",
            category: RecommendationCategory::Deductions,
            title: "Contribute to a state 529 plan",
            irs_reference: "IRC §529",
            complexity: ImplementationComplexity::Low,
            evaluate: fire_529,
        }];

        let ret = single_earner(dec!(85000));
        let findings = evaluate_with(&ret, &RateTable::year_2024(), &table).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, "state-529-deduction");
        assert_eq!(findings[0].savings, dec!(100));

        // The built-in table is untouched
        let builtin = findings_for(&ret);
        assert!(find(&builtin, "retirement-401k-headroom").is_some());
    }
}
