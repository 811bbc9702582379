use log::warn;
use serde::Serialize;

use super::engine::run_projection;
use super::types::{ScenarioInputs, YearRecord};

pub const BASE_CASE: &str = "Base case";
pub const STRESS_TEST: &str = "Stress test";

/// A single override applied to a cloned copy of the baseline inputs.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Perturbation {
    ScaleEmploymentIncome(f64),
    ScaleRentalIncome(f64),
    ScaleAgistmentIncome(f64),
    ShiftInterestRate(f64),
    SetPropertyGrowth(f64),
}

impl Perturbation {
    fn apply(self, inputs: &mut ScenarioInputs) {
        match self {
            Perturbation::ScaleEmploymentIncome(f) => inputs.employment_income *= f,
            Perturbation::ScaleRentalIncome(f) => inputs.rental_income *= f,
            Perturbation::ScaleAgistmentIncome(f) => inputs.agistment_income *= f,
            Perturbation::ShiftInterestRate(delta) => inputs.interest_rate += delta,
            Perturbation::SetPropertyGrowth(rate) => inputs.property_growth_rate = rate,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RiskScenario {
    pub name: String,
    pub perturbations: Vec<Perturbation>,
}

impl RiskScenario {
    pub fn new(name: impl Into<String>, perturbations: Vec<Perturbation>) -> Self {
        Self {
            name: name.into(),
            perturbations,
        }
    }

    pub fn perturbed(&self, baseline: &ScenarioInputs) -> ScenarioInputs {
        let mut inputs = baseline.clone();
        for p in &self.perturbations {
            p.apply(&mut inputs);
        }
        inputs
    }
}

pub fn standard_scenarios() -> Vec<RiskScenario> {
    use Perturbation::*;
    vec![
        RiskScenario::new(BASE_CASE, vec![]),
        RiskScenario::new("Lose rental income", vec![ScaleRentalIncome(0.0)]),
        RiskScenario::new("Lose agistment income", vec![ScaleAgistmentIncome(0.0)]),
        RiskScenario::new("Agistment income halved", vec![ScaleAgistmentIncome(0.5)]),
        RiskScenario::new("Interest rate +2%", vec![ShiftInterestRate(0.02)]),
        RiskScenario::new("Interest rate +3%", vec![ShiftInterestRate(0.03)]),
        RiskScenario::new("Property value stagnant", vec![SetPropertyGrowth(0.0)]),
        RiskScenario::new(
            STRESS_TEST,
            vec![
                ScaleRentalIncome(0.5),
                ScaleAgistmentIncome(0.5),
                ShiftInterestRate(0.02),
            ],
        ),
    ]
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSummary {
    pub interest_rate: f64,
    pub annual_repayment: f64,
    pub first_year_surplus: f64,
    pub final_year_surplus: f64,
    pub final_cumulative_cashflow: f64,
    pub final_equity: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ScenarioOutcome {
    Feasible {
        summary: ScenarioSummary,
        years: Vec<YearRecord>,
    },
    Infeasible {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskScenarioResult {
    pub name: String,
    #[serde(flatten)]
    pub outcome: ScenarioOutcome,
}

impl RiskScenarioResult {
    pub fn is_feasible(&self) -> bool {
        matches!(self.outcome, ScenarioOutcome::Feasible { .. })
    }

    pub fn summary(&self) -> Option<&ScenarioSummary> {
        match &self.outcome {
            ScenarioOutcome::Feasible { summary, .. } => Some(summary),
            ScenarioOutcome::Infeasible { .. } => None,
        }
    }

    pub fn years(&self) -> Option<&[YearRecord]> {
        match &self.outcome {
            ScenarioOutcome::Feasible { years, .. } => Some(years),
            ScenarioOutcome::Infeasible { .. } => None,
        }
    }
}

/// Runs every scenario against its own clone of `baseline`. A scenario whose inputs fail
/// validation or whose output is not finite is reported as infeasible; the rest still run.
pub fn run_risk_scenarios(
    baseline: &ScenarioInputs,
    scenarios: &[RiskScenario],
) -> Vec<RiskScenarioResult> {
    scenarios
        .iter()
        .map(|scenario| {
            let outcome = evaluate_scenario(&scenario.perturbed(baseline));
            if let ScenarioOutcome::Infeasible { reason } = &outcome {
                warn!("risk scenario '{}' is infeasible: {reason}", scenario.name);
            }
            RiskScenarioResult {
                name: scenario.name.clone(),
                outcome,
            }
        })
        .collect()
}

fn evaluate_scenario(inputs: &ScenarioInputs) -> ScenarioOutcome {
    let projection = match run_projection(inputs) {
        Ok(projection) => projection,
        Err(e) => {
            return ScenarioOutcome::Infeasible {
                reason: e.to_string(),
            };
        }
    };

    if !projection.years.iter().all(record_is_finite) {
        return ScenarioOutcome::Infeasible {
            reason: "projection produced non-finite values".to_string(),
        };
    }

    let (Some(first), Some(last)) = (projection.years.first(), projection.years.last()) else {
        return ScenarioOutcome::Infeasible {
            reason: "projection produced no years".to_string(),
        };
    };

    ScenarioOutcome::Feasible {
        summary: ScenarioSummary {
            interest_rate: inputs.interest_rate,
            annual_repayment: projection.annual_repayment,
            first_year_surplus: first.surplus,
            final_year_surplus: last.surplus,
            final_cumulative_cashflow: last.cumulative_cashflow,
            final_equity: last.equity,
        },
        years: projection.years,
    }
}

fn record_is_finite(y: &YearRecord) -> bool {
    [
        y.total_income,
        y.total_expenses,
        y.surplus,
        y.cumulative_cashflow,
        y.property_value,
        y.loan_balance,
        y.equity,
        y.lvr,
    ]
    .iter()
    .all(|v| v.is_finite())
}

/// Name and first-year surplus of each feasible scenario, in input order.
pub fn comparison_series(results: &[RiskScenarioResult]) -> Vec<(&str, f64)> {
    results
        .iter()
        .filter_map(|r| r.summary().map(|s| (r.name.as_str(), s.first_year_surplus)))
        .collect()
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskAssessment {
    Robust,
    VulnerableToStress,
    SignificantRisk,
}

/// Classifies first-year resilience from the base case and the stress test. Falls back to
/// the base case when no feasible stress scenario is present.
pub fn assess_risk(results: &[RiskScenarioResult]) -> Option<RiskAssessment> {
    let base = results
        .iter()
        .find(|r| r.name == BASE_CASE)
        .and_then(|r| r.summary())?
        .first_year_surplus;
    let stress = results
        .iter()
        .find(|r| r.name == STRESS_TEST)
        .and_then(|r| r.summary())
        .map(|s| s.first_year_surplus)
        .unwrap_or(base);

    Some(if base < 0.0 {
        RiskAssessment::SignificantRisk
    } else if stress < 0.0 {
        RiskAssessment::VulnerableToStress
    } else {
        RiskAssessment::Robust
    })
}
