use std::fmt::Write;

use crate::core::{
    Projection, RiskAssessment, RiskScenarioResult, ScenarioOutcome, assess_risk,
};

pub(crate) fn render_report(projection: &Projection, risk: &[RiskScenarioResult]) -> String {
    let mut out = String::new();
    let u = &projection.upfront;
    let m = &projection.metrics;

    let _ = writeln!(out, "Upfront costs");
    let _ = writeln!(out, "  Purchase price        {:>14}", money(u.purchase_price));
    let _ = writeln!(out, "  Funds available       {:>14}", money(u.funds_available));
    let _ = writeln!(out, "  Stamp duty            {:>14}", money(u.stamp_duty));
    let _ = writeln!(out, "  LMI premium           {:>14}", money(u.lmi_premium));
    if u.lmi_capitalized > 0.0 {
        let _ = writeln!(out, "    added to loan       {:>14}", money(u.lmi_capitalized));
    }
    let _ = writeln!(out, "  Deposit paid          {:>14}", money(u.deposit_paid));
    let _ = writeln!(out, "  Other costs           {:>14}", money(u.other_upfront_costs));
    let _ = writeln!(out, "  Total upfront         {:>14}", money(u.total_upfront_cost));
    if u.shortfall > 0.0 {
        let _ = writeln!(out, "  Shortfall             {:>14}", money(u.shortfall));
    } else {
        let _ = writeln!(out, "  Surplus funds         {:>14}", money(u.surplus));
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Loan");
    let _ = writeln!(out, "  Principal             {:>14}", money(u.loan_principal));
    let _ = writeln!(
        out,
        "  Annual repayment      {:>14}",
        money(projection.annual_repayment)
    );
    let _ = writeln!(out, "  Initial LVR           {:>14}", percent(u.initial_lvr));

    let _ = writeln!(out);
    let _ = writeln!(out, "Metrics");
    let _ = writeln!(out, "  First-year surplus    {:>14}", money(m.first_year_surplus));
    let _ = writeln!(out, "  Break-even year       {:>14}", year_or_never(m.break_even_year));
    let _ = writeln!(out, "  Payoff year           {:>14}", year_or_never(m.payoff_year));
    let _ = writeln!(out, "  Debt to income        {:>14.2}", m.debt_to_income);
    let _ = writeln!(out, "  Expenses / income     {:>14}", percent(m.expense_to_income));
    let _ = writeln!(out, "  Repayment / income    {:>14}", percent(m.repayment_to_income));
    let _ = writeln!(out, "  Final equity          {:>14}", money(m.final_equity));
    let _ = writeln!(
        out,
        "  Final cumulative      {:>14}",
        money(m.final_cumulative_cashflow)
    );

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:>4} {:>12} {:>12} {:>12} {:>14} {:>14} {:>14} {:>14} {:>7}",
        "Year", "Income", "Expenses", "Surplus", "Cumulative", "Property", "Loan", "Equity", "LVR"
    );
    for y in &projection.years {
        let _ = writeln!(
            out,
            "{:>4} {:>12} {:>12} {:>12} {:>14} {:>14} {:>14} {:>14} {:>7}",
            y.year,
            money(y.total_income),
            money(y.total_expenses),
            money(y.surplus),
            money(y.cumulative_cashflow),
            money(y.property_value),
            money(y.loan_balance),
            money(y.equity),
            percent(y.lvr),
        );
    }

    if !risk.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Risk scenarios");
        for r in risk {
            match &r.outcome {
                ScenarioOutcome::Feasible { summary, .. } => {
                    let _ = writeln!(
                        out,
                        "  {:<26} first-year surplus {:>12}  final equity {:>14}",
                        r.name,
                        money(summary.first_year_surplus),
                        money(summary.final_equity)
                    );
                }
                ScenarioOutcome::Infeasible { reason } => {
                    let _ = writeln!(out, "  {:<26} infeasible: {reason}", r.name);
                }
            }
        }
        if let Some(assessment) = assess_risk(risk) {
            let _ = writeln!(out, "  Assessment: {}", describe(assessment));
        }
    }

    out
}

fn describe(assessment: RiskAssessment) -> &'static str {
    match assessment {
        RiskAssessment::Robust => "robust, surplus stays positive under stress",
        RiskAssessment::VulnerableToStress => "vulnerable, the stress test runs a deficit",
        RiskAssessment::SignificantRisk => "significant risk, the base case runs a deficit",
    }
}

fn year_or_never(year: Option<u32>) -> String {
    match year {
        Some(y) => format!("year {y}"),
        None => "not reached".to_string(),
    }
}

fn percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

/// Whole dollars with thousands separators, e.g. `-$1,234`.
fn money(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}
