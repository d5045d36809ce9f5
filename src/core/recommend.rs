//! The analysis orchestrator.
//!
//! Runs every planning pass over a single return (the rules table, the
//! filing-status comparison, the entity comparison and deduction timing),
//! then scores, deduplicates and ranks the findings into one plan. The
//! header carries a timestamp and a digest of the input so a stored plan
//! can be matched back to the return it was produced from.

use super::calculator::{
    calculate, calculate_unchecked, round_currency, round_rate, DeductionKind, LiabilityBreakdown,
};
use super::entity::{self, EntityError};
use super::model::{FilingStatus, Income, TaxReturn, Taxpayer, ValidationError};
use super::rates::{ConfigurationError, RateTable};
use super::rules::{
    self, Finding, ImplementationComplexity, RecommendationCategory, RuleDefinition,
};
use super::scenario::{FieldPath, FieldValue, Scenario, ScenarioError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// A failure that aborts the whole analysis. Incomplete data never lands
/// here; it degrades the affected finding instead.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Entity(#[from] EntityError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// One actionable item in the final plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Recommendation {
    pub category: RecommendationCategory,
    pub title: String,
    #[schemars(with = "f64")]
    pub estimated_savings: Decimal,
    /// Low and high bounds, present when the point estimate rests on
    /// incomplete data
    #[schemars(with = "Option<[f64; 2]>")]
    pub savings_range: Option<[Decimal; 2]>,
    /// Between zero and one; discounted for missing inputs, estimated
    /// amounts and phase-out cliffs
    #[schemars(with = "f64")]
    pub confidence: Decimal,
    pub complexity: ImplementationComplexity,
    pub irs_reference: String,
    pub note: String,
    /// Fields a taxpayer acting on this advice would change
    pub fields: BTreeSet<FieldPath>,
    /// The pass or rule that produced it
    pub source: String,
    /// True when eligibility could not be fully determined
    pub ambiguous: bool,
}

/// The full product of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ComprehensiveRecommendation {
    pub year: u16,
    pub generated_at: DateTime<Utc>,
    /// SHA-256 of the serialized input, for matching a stored plan to its
    /// return
    pub input_digest: String,
    pub current: LiabilityBreakdown,
    /// The baseline with every retained override applied together
    pub optimized: LiabilityBreakdown,
    /// Descending by estimated savings, ties broken by lower complexity
    pub recommendations: Vec<Recommendation>,
    /// Sum over the retained, non-overlapping recommendations; individual
    /// estimates are independent, so combining them can realize less
    #[schemars(with = "f64")]
    pub total_addressable_savings: Decimal,
}

/// A finding from any pass, before scoring and ranking
struct Candidate {
    source: String,
    category: RecommendationCategory,
    title: String,
    complexity: ImplementationComplexity,
    irs_reference: String,
    savings: Decimal,
    note: String,
    fields: BTreeSet<FieldPath>,
    completeness: Decimal,
    phase_out_proximity: Option<Decimal>,
    ambiguous: Option<String>,
    scenario: Option<Scenario>,
}

impl From<Finding> for Candidate {
    fn from(finding: Finding) -> Candidate {
        Candidate {
            source: finding.rule_id.to_string(),
            category: finding.category,
            title: finding.title.to_string(),
            complexity: finding.complexity,
            irs_reference: finding.irs_reference.to_string(),
            savings: finding.savings,
            note: finding.note,
            fields: finding.fields,
            completeness: finding.completeness,
            phase_out_proximity: finding.phase_out_proximity,
            ambiguous: finding.ambiguous,
            scenario: finding.scenario,
        }
    }
}

/// Run every pass over the return and produce the ranked plan.
pub fn analyze(
    ret: &TaxReturn,
    rates: &RateTable,
) -> Result<ComprehensiveRecommendation, AnalysisError> {
    analyze_with(ret, rates, rules::builtin_rules())
}

/// [`analyze`] over a caller-supplied rule table; the built-in passes
/// still run alongside it
pub fn analyze_with(
    ret: &TaxReturn,
    rates: &RateTable,
    rule_table: &[RuleDefinition],
) -> Result<ComprehensiveRecommendation, AnalysisError> {
    ret.validate(rates)?;
    let current = calculate_unchecked(ret, rates);
    log::debug!(
        "analysis baseline: {} filing {}, liability {}",
        rates.year,
        current.filing_status,
        current.total_liability
    );

    let mut candidates: Vec<Candidate> = rules::evaluate_with(ret, rates, rule_table)?
        .into_iter()
        .map(Candidate::from)
        .collect();
    candidates.extend(filing_status_pass(ret, rates, &current));
    if let Some(candidate) = entity_pass(ret, rates)? {
        candidates.push(candidate);
    }
    if let Some(candidate) = gift_timing_pass(ret, rates, &current) {
        candidates.push(candidate);
    }

    let retained = rank(candidates);
    let optimized = combined_outcome(ret, rates, &current, &retained);
    let total_addressable_savings = round_currency(retained.iter().map(|c| c.savings).sum());
    let recommendations = retained
        .into_iter()
        .map(|candidate| into_recommendation(candidate, ret))
        .collect();

    Ok(ComprehensiveRecommendation {
        year: rates.year,
        generated_at: Utc::now(),
        input_digest: input_digest(ret),
        current,
        optimized,
        recommendations,
        total_addressable_savings,
    })
}

/// [`analyze`] against the built-in table for `year`
pub fn analyze_for_year(
    ret: &TaxReturn,
    year: u16,
) -> Result<ComprehensiveRecommendation, AnalysisError> {
    let rates = RateTable::for_year(year)?;
    analyze(ret, &rates)
}

/// Statuses an unmarried filer could plausibly use instead
fn eligible_statuses(ret: &TaxReturn) -> Vec<FilingStatus> {
    let mut statuses = vec![FilingStatus::Single];
    if ret.taxpayer.dependents > 0 {
        statuses.push(FilingStatus::HeadOfHousehold);
    }
    statuses
}

fn filing_status_pass(
    ret: &TaxReturn,
    rates: &RateTable,
    baseline: &LiabilityBreakdown,
) -> Vec<Candidate> {
    if ret.taxpayer.filing_status.is_married() {
        return married_filing_comparison(ret, rates).into_iter().collect();
    }
    let current = ret.taxpayer.filing_status;
    let mut candidates = Vec::new();
    for status in eligible_statuses(ret) {
        if status == current {
            continue;
        }
        let scenario = Scenario::new(format!("file as {status}"))
            .with(FieldPath::FilingStatusField, FieldValue::Status(status));
        let Some(total) = scenario_total(ret, rates, &scenario) else {
            continue;
        };
        let savings = baseline.total_liability - total;
        log::debug!("{status} versus {current}: {savings}");
        if savings <= Decimal::ZERO {
            continue;
        }
        // The qualifying-person test behind head of household is outside
        // the model
        let completeness = if status == FilingStatus::HeadOfHousehold {
            dec!(0.9)
        } else {
            Decimal::ONE
        };
        let irs_reference = match status {
            FilingStatus::HeadOfHousehold => "IRC §2(b)",
            _ => "IRC §1(c)",
        };
        candidates.push(Candidate {
            source: "filing-status-comparison".to_string(),
            category: RecommendationCategory::FilingStatus,
            title: format!("File as {status}"),
            complexity: ImplementationComplexity::Low,
            irs_reference: irs_reference.to_string(),
            savings,
            note: format!(
                "Filing as {status} instead of {current} lowers the liability from {} to {total}.",
                baseline.total_liability
            ),
            fields: [FieldPath::FilingStatusField].into_iter().collect(),
            completeness,
            phase_out_proximity: None,
            ambiguous: None,
            scenario: Some(scenario),
        });
    }
    candidates
}

/// Joint versus separate, priced at the household level: one joint return
/// against the sum of two actual separate returns. A status flip on a
/// single return would keep taxing the household's income on one schedule
/// and miss what separate filing really costs.
fn married_filing_comparison(ret: &TaxReturn, rates: &RateTable) -> Option<Candidate> {
    let current = ret.taxpayer.filing_status;
    // The comparison needs spouse data; the ambiguity rule reports the
    // gap when it is missing
    let spouse_wages = ret.taxpayer.spouse.as_ref()?.wages;

    let joint_scenario = Scenario::new(format!("file as {}", FilingStatus::MarriedJoint)).with(
        FieldPath::FilingStatusField,
        FieldValue::Status(FilingStatus::MarriedJoint),
    );
    let joint_total = scenario_total(ret, rates, &joint_scenario)?;
    let separate_total = match household_separate_total(ret, rates, spouse_wages) {
        Ok(total) => total,
        Err(e) => {
            log::warn!("separate-filing comparison skipped: {e}");
            return None;
        }
    };
    log::debug!("household joint {joint_total} versus separate {separate_total}");

    let (status, savings, scenario) = if current == FilingStatus::MarriedJoint {
        // Recommending a split cannot hand the reader a single-return
        // scenario; the two separate returns are filed on their own
        (
            FilingStatus::MarriedSeparate,
            joint_total - separate_total,
            None,
        )
    } else {
        (
            FilingStatus::MarriedJoint,
            separate_total - joint_total,
            Some(joint_scenario),
        )
    };
    if savings <= Decimal::ZERO {
        return None;
    }
    Some(Candidate {
        source: "filing-status-comparison".to_string(),
        category: RecommendationCategory::FilingStatus,
        title: format!("File as {status}"),
        complexity: ImplementationComplexity::Low,
        irs_reference: "IRC §6013".to_string(),
        savings,
        note: format!(
            "Two separate returns total {separate_total}; one joint return totals {joint_total}."
        ),
        fields: [FieldPath::FilingStatusField].into_iter().collect(),
        // The separate split leaves every deduction, credit and business
        // item with the primary filer
        completeness: dec!(0.9),
        phase_out_proximity: None,
        ambiguous: None,
        scenario,
    })
}

/// Household liability across two separate returns: the primary keeps the
/// whole return except the spouse, who files on wages alone
fn household_separate_total(
    ret: &TaxReturn,
    rates: &RateTable,
    spouse_wages: Decimal,
) -> Result<Decimal, ValidationError> {
    let mut primary = ret.clone();
    primary.taxpayer.filing_status = FilingStatus::MarriedSeparate;
    primary.taxpayer.spouse = None;
    let primary_total = calculate(&primary, rates)?.total_liability;

    let spouse = TaxReturn {
        taxpayer: Taxpayer {
            filing_status: FilingStatus::MarriedSeparate,
            dependents: 0,
            qualifying_children: 0,
            age: None,
            spouse: None,
        },
        income: Income {
            wages: spouse_wages,
            ..Income::default()
        },
        adjustments: Default::default(),
        deductions: Default::default(),
        credits: Default::default(),
        business: None,
        estimated_fields: BTreeSet::new(),
    };
    let spouse_total = calculate(&spouse, rates)?.total_liability;
    Ok(primary_total + spouse_total)
}

fn entity_pass(ret: &TaxReturn, rates: &RateTable) -> Result<Option<Candidate>, AnalysisError> {
    if ret.business.is_none() {
        return Ok(None);
    }
    let analysis = entity::optimize(ret, rates)?;
    if analysis.savings_vs_current <= Decimal::ZERO {
        return Ok(None);
    }
    let best = analysis.best_option();
    let mut scenario = Scenario::new(format!("restructure as {}", best.entity_type)).with(
        FieldPath::BusinessEntityType,
        FieldValue::Entity(best.entity_type),
    );
    if let Some(salary) = best.salary {
        scenario = scenario.amount(FieldPath::ElectedSalary, salary);
    }
    let mut note = match best.salary {
        Some(salary) => format!(
            "An S-corp paying a {salary} salary costs {} less per year than the \
             current structure, net of {} in payroll and filing overhead; the QBI \
             deduction changes by {}.",
            analysis.savings_vs_current, best.overhead, analysis.qbi_change
        ),
        None => format!(
            "Operating as {} costs {} less per year than the current structure.",
            best.entity_type, analysis.savings_vs_current
        ),
    };
    if best.salary.is_some() {
        if let Some(breakeven) = analysis.breakeven_salary {
            note.push_str(&format!(
                " The election stays ahead on tax at salaries up to {breakeven}."
            ));
        }
    }
    Ok(Some(Candidate {
        source: "entity-structure-optimizer".to_string(),
        category: RecommendationCategory::EntityStructure,
        title: format!("Restructure the business as {}", best.entity_type),
        complexity: ImplementationComplexity::High,
        irs_reference: "IRC §1362".to_string(),
        savings: analysis.savings_vs_current,
        note,
        fields: scenario.overrides.keys().copied().collect(),
        completeness: dec!(0.9),
        phase_out_proximity: None,
        ambiguous: None,
        scenario: Some(scenario),
    }))
}

/// Alternating-year charitable timing for returns that already itemize.
///
/// The rules table prices bunching when the standard deduction is taken
/// and off years lose nothing. Here the off year gives up real itemized
/// deductions, so the whole cycle is priced: one bunched year plus bare
/// off years against level giving.
fn gift_timing_pass(
    ret: &TaxReturn,
    rates: &RateTable,
    baseline: &LiabilityBreakdown,
) -> Option<Candidate> {
    if baseline.deduction.kind != DeductionKind::Itemized {
        return None;
    }
    let charitable = ret.deductions.charitable_cash;
    if charitable <= Decimal::ZERO {
        return None;
    }
    // With a thick non-charitable base the off year keeps itemizing and
    // the cycle nets to zero
    let standard = rates.standard_deduction_for(ret.taxpayer.filing_status);
    if baseline.deduction.amount - charitable >= standard {
        return None;
    }
    let window = Decimal::from(rates.deductions.bunching_window_years);
    let bunched = Scenario::new("bunch charitable giving")
        .amount(FieldPath::CharitableCash, charitable * window);
    let off = Scenario::new("off-year giving").amount(FieldPath::CharitableCash, Decimal::ZERO);
    let bunched_total = scenario_total(ret, rates, &bunched)?;
    let off_total = scenario_total(ret, rates, &off)?;
    let level_cycle = baseline.total_liability * window;
    let bunched_cycle = bunched_total + off_total * (window - Decimal::ONE);
    let savings = round_currency(level_cycle - bunched_cycle);
    if savings <= Decimal::ZERO {
        return None;
    }
    Some(Candidate {
        source: "deduction-timing".to_string(),
        category: RecommendationCategory::Deductions,
        title: "Alternate charitable giving between years".to_string(),
        complexity: ImplementationComplexity::Medium,
        irs_reference: "IRC §170".to_string(),
        savings,
        note: format!(
            "Concentrating {window} years of gifts into one itemized year and taking \
             the standard deduction in between saves {savings} per cycle."
        ),
        fields: [FieldPath::CharitableCash].into_iter().collect(),
        completeness: Decimal::ONE,
        phase_out_proximity: None,
        ambiguous: None,
        scenario: Some(bunched),
    })
}

/// Liability under `scenario`, or `None` when it cannot be evaluated
fn scenario_total(ret: &TaxReturn, rates: &RateTable, scenario: &Scenario) -> Option<Decimal> {
    let derived = match scenario.apply(ret) {
        Ok(derived) => derived,
        Err(e) => {
            log::warn!("scenario '{}' skipped: {e}", scenario.name);
            return None;
        }
    };
    if let Err(e) = derived.validate(rates) {
        log::warn!("scenario '{}' produced an invalid return: {e}", scenario.name);
        return None;
    }
    Some(calculate_unchecked(&derived, rates).total_liability)
}

/// Order by savings and collapse overlapping override sets.
///
/// After sorting (savings descending, then complexity and source ascending
/// so ties are deterministic), a candidate survives only when its fields
/// are disjoint from every survivor above it. That leaves the single
/// strongest claim on each field.
fn rank(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.savings
            .cmp(&a.savings)
            .then_with(|| a.complexity.cmp(&b.complexity))
            .then_with(|| a.source.cmp(&b.source))
    });
    let mut retained: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if retained
            .iter()
            .any(|kept| !kept.fields.is_disjoint(&candidate.fields))
        {
            log::debug!(
                "dropping '{}': fields already claimed by a higher-ranked entry",
                candidate.source
            );
            continue;
        }
        retained.push(candidate);
    }
    retained
}

/// Weighted confidence score. Starts from the completeness of the inputs,
/// discounted when the touched fields are estimates and when the advice
/// sits close to a phase-out cliff; undecidable eligibility caps it low.
fn confidence_for(candidate: &Candidate, ret: &TaxReturn) -> Decimal {
    let mut confidence = dec!(0.95) * candidate.completeness;
    if candidate
        .fields
        .iter()
        .any(|field| ret.is_estimated(*field))
    {
        confidence *= dec!(0.75);
    }
    if let Some(proximity) = candidate.phase_out_proximity {
        let proximity = proximity.clamp(Decimal::ZERO, Decimal::ONE);
        confidence *= dec!(0.7) + dec!(0.3) * proximity;
    }
    if candidate.ambiguous.is_some() {
        confidence = confidence.min(dec!(0.35));
    }
    round_rate(confidence.clamp(dec!(0.05), dec!(0.99)))
}

fn into_recommendation(candidate: Candidate, ret: &TaxReturn) -> Recommendation {
    let confidence = confidence_for(&candidate, ret);
    let estimated_savings = round_currency(candidate.savings);
    let savings_range = (candidate.completeness < Decimal::ONE
        && estimated_savings > Decimal::ZERO)
        .then(|| {
            [
                round_currency(estimated_savings * candidate.completeness),
                estimated_savings,
            ]
        });
    Recommendation {
        category: candidate.category,
        title: candidate.title,
        estimated_savings,
        savings_range,
        confidence,
        complexity: candidate.complexity,
        irs_reference: candidate.irs_reference,
        note: candidate.note,
        fields: candidate.fields,
        source: candidate.source,
        ambiguous: candidate.ambiguous.is_some(),
    }
}

/// The baseline with every retained override applied at once.
///
/// Retained field sets are disjoint, so the merge cannot conflict. A
/// combination that still fails validation falls back to the baseline
/// rather than aborting a plan whose entries are individually sound.
fn combined_outcome(
    ret: &TaxReturn,
    rates: &RateTable,
    baseline: &LiabilityBreakdown,
    retained: &[Candidate],
) -> LiabilityBreakdown {
    let mut combined = Scenario::new("combined plan");
    for candidate in retained {
        if let Some(scenario) = &candidate.scenario {
            for (field, value) in &scenario.overrides {
                combined.overrides.insert(*field, value.clone());
            }
        }
    }
    if combined.overrides.is_empty() {
        return baseline.clone();
    }
    let derived = match combined.apply(ret) {
        Ok(derived) => derived,
        Err(e) => {
            log::warn!("combined plan not applicable, reporting the baseline: {e}");
            return baseline.clone();
        }
    };
    if let Err(e) = derived.validate(rates) {
        log::warn!("combined plan fails validation, reporting the baseline: {e}");
        return baseline.clone();
    }
    calculate_unchecked(&derived, rates)
}

/// SHA-256 over the canonical serialization. Map-backed fields keep key
/// order stable, so equal returns digest equally.
fn input_digest(ret: &TaxReturn) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(ret).unwrap_or_default());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Business, EntityType, Spouse};

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

    fn sole_proprietor(net: Decimal) -> TaxReturn {
        let mut ret = single_earner(Decimal::ZERO);
        ret.business = Some(Business {
            entity_type: EntityType::SoleProprietorship,
            net_income: net,
            elected_salary: None,
            specified_service: false,
        });
        ret
    }

    fn married_couple(primary_wages: Decimal, spouse_wages: Decimal) -> TaxReturn {
        let mut ret = single_earner(primary_wages);
        ret.taxpayer.filing_status = FilingStatus::MarriedJoint;
        ret.taxpayer.spouse = Some(Spouse {
            wages: spouse_wages,
        });
        ret
    }

    fn analyze_2024(ret: &TaxReturn) -> ComprehensiveRecommendation {
        analyze(ret, &RateTable::year_2024()).unwrap()
    }

    fn source<'a>(
        plan: &'a ComprehensiveRecommendation,
        source: &str,
    ) -> Option<&'a Recommendation> {
        plan.recommendations.iter().find(|r| r.source == source)
    }

    #[test]
    fn wage_earner_plan_is_ranked_and_priced() {
        let plan = analyze_2024(&single_earner(dec!(85000)));

        assert_eq!(plan.current.total_liability, dec!(10541.00));
        let sources: Vec<&str> = plan
            .recommendations
            .iter()
            .map(|r| r.source.as_str())
            .collect();
        assert_eq!(
            sources,
            ["retirement-401k-headroom", "traditional-ira-deduction"]
        );
        assert_eq!(plan.recommendations[0].estimated_savings, dec!(5060.00));
        assert_eq!(plan.recommendations[1].estimated_savings, dec!(1540.00));
        assert_eq!(plan.total_addressable_savings, dec!(6600.00));

        // Full data, no phase-outs: base confidence; the IRA entry is
        // discounted for unknown employer-plan coverage
        assert_eq!(plan.recommendations[0].confidence, dec!(0.95));
        assert_eq!(plan.recommendations[0].savings_range, None);
        assert_eq!(plan.recommendations[1].confidence, dec!(0.8075));
        assert_eq!(
            plan.recommendations[1].savings_range,
            Some([dec!(1309.00), dec!(1540.00)])
        );

        // 85,000 - 23,000 - 7,000 - 14,600 = 40,400 taxable
        assert_eq!(plan.optimized.total_liability, dec!(4616.00));
    }

    #[test]
    fn overlapping_field_claims_collapse_to_one() {
        let mut ret = sole_proprietor(dec!(220000));
        ret.business.as_mut().unwrap().specified_service = true;
        let plan = analyze_2024(&ret);

        // Three passes bid on retirement deferral with the same override;
        // only the cheapest-to-implement claim survives
        let retirement: Vec<&Recommendation> = plan
            .recommendations
            .iter()
            .filter(|r| r.fields.contains(&FieldPath::Retirement401k))
            .collect();
        assert_eq!(retirement.len(), 1);
        assert_eq!(retirement[0].source, "retirement-401k-headroom");

        // The optimizer outranks the rule-of-thumb election estimate on
        // the same field pair
        assert!(source(&plan, "entity-structure-optimizer").is_some());
        assert!(source(&plan, "scorp-election").is_none());

        for (i, a) in plan.recommendations.iter().enumerate() {
            for b in &plan.recommendations[i + 1..] {
                assert!(a.fields.is_disjoint(&b.fields));
                assert!(a.estimated_savings >= b.estimated_savings);
            }
        }
    }

    #[test]
    fn entity_savings_match_the_standalone_analysis() {
        let plan = analyze_2024(&sole_proprietor(dec!(120000)));

        let sources: Vec<&str> = plan
            .recommendations
            .iter()
            .map(|r| r.source.as_str())
            .collect();
        assert_eq!(
            sources,
            [
                "entity-structure-optimizer",
                "retirement-401k-headroom",
                "traditional-ira-deduction",
            ]
        );
        assert_eq!(plan.recommendations[0].estimated_savings, dec!(4296.05));
        assert_eq!(plan.recommendations[1].estimated_savings, dec!(4048.00));
        assert_eq!(plan.recommendations[2].estimated_savings, dec!(1232.00));
        assert_eq!(
            plan.recommendations[0].fields,
            [FieldPath::BusinessEntityType, FieldPath::ElectedSalary]
                .into_iter()
                .collect()
        );
        assert_eq!(
            plan.total_addressable_savings,
            dec!(4296.05) + dec!(4048.00) + dec!(1232.00)
        );
    }

    #[test]
    fn married_without_spouse_data_degrades_not_fails() {
        let mut ret = single_earner(dec!(150000));
        ret.taxpayer.filing_status = FilingStatus::MarriedJoint;
        let plan = analyze_2024(&ret);

        assert!(source(&plan, "filing-status-comparison").is_none());
        let gap = source(&plan, "ambiguous-filing-status").unwrap();
        assert_eq!(gap.estimated_savings, Decimal::ZERO);
        assert!(gap.ambiguous);
        assert_eq!(gap.confidence, dec!(0.35));
        // Zero savings ranks it last
        assert_eq!(
            plan.recommendations.last().unwrap().source,
            "ambiguous-filing-status"
        );
    }

    #[test]
    fn joint_filers_not_steered_into_a_costlier_split() {
        let plan = analyze_2024(&married_couple(dec!(90000), dec!(40000)));

        assert_eq!(plan.current.total_liability, dec!(12282.00));
        // Two separate returns would owe 14,457.00 together, so no
        // filing-status entry appears
        assert!(source(&plan, "filing-status-comparison").is_none());
    }

    #[test]
    fn separate_filers_pointed_back_to_the_joint_return() {
        let mut ret = married_couple(dec!(90000), dec!(40000));
        ret.taxpayer.filing_status = FilingStatus::MarriedSeparate;
        let plan = analyze_2024(&ret);

        let status = source(&plan, "filing-status-comparison").unwrap();
        assert_eq!(status.title, "File as Married Filing Jointly");
        // 14,457.00 across two separate returns against 12,282.00 joint
        assert_eq!(status.estimated_savings, dec!(2175.00));
        assert_eq!(status.confidence, dec!(0.855));
        assert_eq!(
            status.savings_range,
            Some([dec!(1957.50), dec!(2175.00)])
        );
        assert_eq!(plan.optimized.filing_status, FilingStatus::MarriedJoint);
    }

    #[test]
    fn rule_table_swaps_without_touching_the_passes() {
        let plan =
            analyze_with(&sole_proprietor(dec!(120000)), &RateTable::year_2024(), &[]).unwrap();

        // No rules, but the structural passes still report
        let sources: Vec<&str> = plan
            .recommendations
            .iter()
            .map(|r| r.source.as_str())
            .collect();
        assert_eq!(sources, ["entity-structure-optimizer"]);
    }

    #[test]
    fn head_of_household_compared_for_single_with_dependent() {
        let mut ret = single_earner(dec!(90000));
        ret.taxpayer.dependents = 1;
        let plan = analyze_2024(&ret);

        let status = source(&plan, "filing-status-comparison").unwrap();
        assert_eq!(status.category, RecommendationCategory::FilingStatus);
        assert_eq!(status.estimated_savings, dec!(3300.00));
        assert_eq!(status.irs_reference, "IRC §2(b)");
        assert_eq!(status.confidence, dec!(0.855));
        assert_eq!(
            status.savings_range,
            Some([dec!(2970.00), dec!(3300.00)])
        );

        // The combined view files as head of household with both
        // retirement accounts funded
        assert_eq!(
            plan.optimized.filing_status,
            FilingStatus::HeadOfHousehold
        );
        assert_eq!(plan.optimized.total_liability, dec!(4241.00));
    }

    #[test]
    fn estimated_inputs_discount_confidence() {
        let mut ret = single_earner(dec!(85000));
        ret.estimated_fields.insert(FieldPath::Retirement401k);
        let plan = analyze_2024(&ret);

        let deferral = source(&plan, "retirement-401k-headroom").unwrap();
        assert_eq!(deferral.confidence, dec!(0.7125));
        // Unrelated entries keep their score
        let ira = source(&plan, "traditional-ira-deduction").unwrap();
        assert_eq!(ira.confidence, dec!(0.8075));
    }

    #[test]
    fn gift_timing_priced_over_the_whole_cycle_when_itemizing() {
        let mut ret = single_earner(dec!(150000));
        ret.deductions.state_local_taxes = dec!(10000);
        ret.deductions.charitable_cash = dec!(9000);
        let plan = analyze_2024(&ret);

        // Itemizing already, so the standard-deduction bunching rule stays
        // quiet and the cycle-priced pass takes over
        assert!(source(&plan, "charitable-bunching").is_none());
        let timing = source(&plan, "deduction-timing").unwrap();
        assert_eq!(timing.category, RecommendationCategory::Deductions);
        // Bunch year saves 9,000 x 24%; the off year gives back
        // 4,400 x 24% falling to the standard deduction
        assert_eq!(timing.estimated_savings, dec!(1104.00));
    }

    #[test]
    fn invalid_return_aborts_the_analysis() {
        let mut ret = single_earner(dec!(85000));
        ret.income.wages = dec!(-1);
        let err = analyze(&ret, &RateTable::year_2024()).unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
    }

    #[test]
    fn unknown_year_is_a_configuration_error() {
        let err = analyze_for_year(&single_earner(dec!(85000)), 1999).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::Configuration(ConfigurationError::MissingYear(1999))
        );
    }

    #[test]
    fn digest_tracks_the_input() {
        let ret = single_earner(dec!(85000));
        let first = analyze_2024(&ret);
        let second = analyze_2024(&ret);
        assert_eq!(first.input_digest.len(), 64);
        assert_eq!(first.input_digest, second.input_digest);
        assert_eq!(first.recommendations, second.recommendations);

        let other = analyze_2024(&single_earner(dec!(85001)));
        assert_ne!(first.input_digest, other.input_digest);
    }
}
