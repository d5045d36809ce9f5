pub mod calculator;
pub mod entity;
pub mod model;
pub mod projection;
pub mod rates;
pub mod recommend;
pub mod rules;
pub mod scenario;

// Flat public surface for domain types and functions.
pub use calculator::{
    calculate, round_currency, round_rate, CreditsApplied, DeductionKind, DeductionTaken,
    LiabilityBreakdown,
};
pub use entity::{optimize, optimize_with, EntityAnalysis, EntityError, EntityOption};
pub use model::{
    Adjustments, Business, Credits, Deductions, EntityType, FilingStatus, Income, Spouse,
    TaxReturn, Taxpayer, ValidationError,
};
pub use projection::{
    project, Projection, ProjectionAssumptions, ProjectionError, RothLadder, YearProjection,
};
pub use rates::{ByStatus, ConfigurationError, RateTable, TaxBracket};
pub use recommend::{
    analyze, analyze_for_year, analyze_with, AnalysisError, ComprehensiveRecommendation,
    Recommendation,
};
pub use rules::{
    builtin_rules, evaluate, evaluate_with, Finding, ImplementationComplexity,
    RecommendationCategory, RuleContext, RuleDefinition, RuleFire,
};
pub use scenario::{
    compare, compare_parallel, FieldPath, FieldValue, Scenario, ScenarioComparison,
    ScenarioError, ScenarioOutcome,
};
