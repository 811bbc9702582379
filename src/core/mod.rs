mod engine;
mod error;
mod loan;
mod scenarios;
mod types;
mod upfront;

pub use engine::{project_years, run_projection};
pub use error::ProjectionError;
pub use loan::{LoanState, YearStep, amortize_year, annual_repayment};
pub use scenarios::{
    BASE_CASE, Perturbation, RiskAssessment, RiskScenario, RiskScenarioResult, STRESS_TEST,
    ScenarioOutcome, ScenarioSummary, assess_risk, comparison_series, run_risk_scenarios,
    standard_scenarios,
};
pub use types::{
    MAX_HORIZON_YEARS, MAX_LOAN_TERM_YEARS, PayoffPolicy, Projection, ProjectionMetrics,
    ScenarioInputs, UpfrontSummary, YearRecord,
};
pub use upfront::{DutyBracket, DutySchedule, LmiSchedule, LmiTier, calculate_upfront};
