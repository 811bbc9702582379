use log::debug;

use super::error::ProjectionError;
use super::loan::LoanState;
use super::types::{
    PayoffPolicy, Projection, ProjectionMetrics, ScenarioInputs, UpfrontSummary, YearRecord,
};
use super::upfront::calculate_upfront;

#[derive(Debug, Clone, Copy)]
struct IncomeFlow {
    employment: f64,
    rental: f64,
    agistment: f64,
    lump_sum: f64,
}

impl IncomeFlow {
    fn total(self) -> f64 {
        self.employment + self.rental + self.agistment + self.lump_sum
    }
}

#[derive(Debug, Clone, Copy)]
struct ExpenseFlow {
    living: f64,
    school_fees: f64,
    property_running: f64,
}

impl ExpenseFlow {
    fn total(self) -> f64 {
        self.living + self.school_fees + self.property_running
    }
}

pub fn run_projection(inputs: &ScenarioInputs) -> Result<Projection, ProjectionError> {
    inputs.validate()?;

    let upfront = calculate_upfront(inputs);
    let loan = LoanState::new(
        upfront.loan_principal,
        inputs.interest_rate,
        inputs.loan_term_years,
    )?;
    let annual_repayment = loan.annual_repayment();
    let years = project_years(inputs, &upfront, loan);
    let metrics = summarize(&upfront, &years);

    debug!(
        "projected {} years: loan {:.0}, repayment {:.0}, final equity {:.0}",
        years.len(),
        upfront.loan_principal,
        annual_repayment,
        metrics.final_equity
    );

    Ok(Projection {
        upfront,
        annual_repayment,
        metrics,
        years,
    })
}

/// Runs the yearly loop. Consumes `loan`; its balance is only ever advanced here.
pub fn project_years(
    inputs: &ScenarioInputs,
    upfront: &UpfrontSummary,
    mut loan: LoanState,
) -> Vec<YearRecord> {
    let mut years = Vec::with_capacity(inputs.horizon_years as usize);
    let mut cumulative_cashflow = 0.0;

    for year in 1..=inputs.horizon_years {
        let income = income_for_year(inputs, year);
        let expenses = expenses_for_year(inputs, year);

        let mut step = loan.advance_year();
        if inputs.lump_sum_payoff && inputs.retirement_year == Some(year) {
            let applied = loan.apply_lump_sum(inputs.retirement_lump_sum);
            step.principal += applied;
            step.repayment += applied;
            step.closing_balance = loan.balance();
        }

        let total_income = income.total();
        let total_expenses = expenses.total() + step.repayment;
        let surplus = total_income - total_expenses;
        cumulative_cashflow += surplus;

        let property_value =
            upfront.purchase_price * growth_factor(inputs.property_growth_rate, year);
        let loan_balance = loan.balance();

        years.push(YearRecord {
            year,
            employment_income: income.employment,
            rental_income: income.rental,
            agistment_income: income.agistment,
            lump_sum_income: income.lump_sum,
            total_income,
            living_expenses: expenses.living,
            school_fees: expenses.school_fees,
            property_running_costs: expenses.property_running,
            interest_paid: step.interest,
            principal_paid: step.principal,
            loan_repayment: step.repayment,
            total_expenses,
            surplus,
            cumulative_cashflow,
            property_value,
            loan_balance,
            equity: property_value - loan_balance,
            lvr: loan_to_value(loan_balance, property_value),
        });

        // A purchase with no loan has nothing to pay off, so it runs to the horizon.
        if inputs.payoff_policy == PayoffPolicy::StopAtPayoff
            && loan.principal() > 0.0
            && loan.is_paid_off()
        {
            break;
        }
    }

    years
}

fn growth_factor(rate: f64, year: u32) -> f64 {
    (1.0 + rate).powi(year as i32)
}

fn loan_to_value(balance: f64, property_value: f64) -> f64 {
    if property_value > 0.0 {
        (balance / property_value).max(0.0)
    } else {
        0.0
    }
}

fn income_for_year(inputs: &ScenarioInputs, year: u32) -> IncomeFlow {
    let mut employment =
        inputs.employment_income * growth_factor(inputs.employment_income_growth, year);
    let mut lump_sum = 0.0;

    if let Some(retire_year) = inputs.retirement_year {
        if year >= retire_year {
            employment = 0.0;
        }
        if year == retire_year {
            lump_sum += inputs.retirement_lump_sum;
        }
    }
    if inputs.partner_retirement_year == Some(year) {
        lump_sum += inputs.partner_lump_sum;
    }

    IncomeFlow {
        employment,
        rental: inputs.rental_income * growth_factor(inputs.rental_income_growth, year),
        agistment: inputs.agistment_income * growth_factor(inputs.inflation_rate, year),
        lump_sum,
    }
}

fn expenses_for_year(inputs: &ScenarioInputs, year: u32) -> ExpenseFlow {
    let inflation = growth_factor(inputs.inflation_rate, year);
    ExpenseFlow {
        living: inputs.living_expenses * inflation,
        school_fees: school_fees_base(inputs, year) * inflation,
        property_running: inputs.property_running_costs * inflation,
    }
}

// Current fees run through floor(change_after); the new fee follows for its duration,
// then education costs stop.
fn school_fees_base(inputs: &ScenarioInputs, year: u32) -> f64 {
    let Some(change_after) = inputs.education_change_after_years else {
        return inputs.school_fees;
    };
    let last_current_year = change_after.floor() as u32;
    let last_new_year = last_current_year.saturating_add(inputs.education_new_duration_years);

    if year <= last_current_year {
        inputs.school_fees
    } else if year <= last_new_year {
        inputs.education_new_annual_fees
    } else {
        0.0
    }
}

fn summarize(upfront: &UpfrontSummary, years: &[YearRecord]) -> ProjectionMetrics {
    let first = years.first();
    let first_income = first.map(|y| y.total_income).unwrap_or(0.0);
    let ratio = |amount: f64| {
        if first_income > 0.0 {
            amount / first_income
        } else {
            0.0
        }
    };

    let payoff_year = if upfront.loan_principal > 0.0 {
        years.iter().find(|y| y.loan_balance <= 0.0).map(|y| y.year)
    } else {
        None
    };

    ProjectionMetrics {
        first_year_surplus: first.map(|y| y.surplus).unwrap_or(0.0),
        break_even_year: years
            .iter()
            .find(|y| y.cumulative_cashflow >= 0.0)
            .map(|y| y.year),
        payoff_year,
        debt_to_income: ratio(upfront.loan_principal),
        expense_to_income: ratio(first.map(|y| y.total_expenses).unwrap_or(0.0)),
        repayment_to_income: ratio(first.map(|y| y.loan_repayment).unwrap_or(0.0)),
        final_equity: years.last().map(|y| y.equity).unwrap_or(0.0),
        final_cumulative_cashflow: years.last().map(|y| y.cumulative_cashflow).unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loan::annual_repayment;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_inputs() -> ScenarioInputs {
        ScenarioInputs {
            purchase_price: 800_000.0,
            cash_deposit: 200_000.0,
            equity_contribution: 0.0,
            other_upfront_costs: 0.0,
            interest_rate: 0.05,
            loan_term_years: 25,
            horizon_years: 30,
            property_growth_rate: 0.03,
            employment_income: 120_000.0,
            rental_income: 20_000.0,
            agistment_income: 5_000.0,
            living_expenses: 60_000.0,
            school_fees: 10_000.0,
            property_running_costs: 8_000.0,
            ..ScenarioInputs::default()
        }
    }

    fn assert_record_invariants(years: &[YearRecord]) {
        let mut previous_cumulative = 0.0;
        let mut previous_balance = f64::INFINITY;
        for (idx, y) in years.iter().enumerate() {
            assert_eq!(y.year, idx as u32 + 1);
            assert_eq!(y.cumulative_cashflow, previous_cumulative + y.surplus);
            assert_eq!(y.equity, y.property_value - y.loan_balance);
            assert!(y.loan_balance >= 0.0);
            assert!(y.loan_balance <= previous_balance);
            previous_cumulative = y.cumulative_cashflow;
            previous_balance = y.loan_balance;
        }
    }

    #[test]
    fn projection_covers_full_horizon_with_invariants() {
        let projection = run_projection(&sample_inputs()).expect("valid inputs");
        assert_eq!(projection.years.len(), 30);
        assert_record_invariants(&projection.years);
        assert_eq!(
            projection.years[0].cumulative_cashflow,
            projection.years[0].surplus
        );
    }

    #[test]
    fn oracle_first_year_matches_hand_calculation() {
        let projection = run_projection(&sample_inputs()).expect("valid inputs");
        let repayment = annual_repayment(600_000.0, 0.05, 25).expect("valid loan");
        let y1 = &projection.years[0];

        assert_approx(projection.upfront.loan_principal, 600_000.0);
        assert_approx(projection.upfront.lmi_premium, 0.0);
        assert_approx(projection.annual_repayment, repayment);
        assert_approx(y1.total_income, 145_000.0);
        assert_approx(y1.interest_paid, 30_000.0);
        assert_approx(y1.principal_paid, repayment - 30_000.0);
        assert_approx(y1.loan_repayment, repayment);
        assert_approx(y1.total_expenses, 78_000.0 + repayment);
        assert_approx(y1.surplus, 145_000.0 - 78_000.0 - repayment);
        assert_approx(y1.property_value, 824_000.0);
        assert_approx(y1.loan_balance, 600_000.0 - (repayment - 30_000.0));
        assert_approx(y1.lvr, y1.loan_balance / 824_000.0);
    }

    #[test]
    fn repayments_stop_after_loan_term_but_horizon_continues() {
        let projection = run_projection(&sample_inputs()).expect("valid inputs");
        let years = &projection.years;

        assert_eq!(years[24].loan_balance, 0.0);
        assert!(years[24].loan_repayment > 0.0);
        for y in &years[25..] {
            assert_eq!(y.loan_repayment, 0.0);
            assert_eq!(y.loan_balance, 0.0);
            assert_approx(y.lvr, 0.0);
            assert_approx(y.surplus, 145_000.0 - 78_000.0);
        }
        assert_eq!(projection.metrics.payoff_year, Some(25));
    }

    #[test]
    fn stop_at_payoff_truncates_after_final_repayment() {
        let mut inputs = sample_inputs();
        inputs.payoff_policy = PayoffPolicy::StopAtPayoff;
        let projection = run_projection(&inputs).expect("valid inputs");

        assert_eq!(projection.years.len(), 25);
        assert_eq!(projection.years[24].loan_balance, 0.0);
        assert_record_invariants(&projection.years);
    }

    #[test]
    fn retirement_lump_sum_pays_off_loan_and_stops_employment() {
        let mut inputs = sample_inputs();
        inputs.retirement_year = Some(5);
        inputs.retirement_lump_sum = 700_000.0;
        inputs.lump_sum_payoff = true;
        let projection = run_projection(&inputs).expect("valid inputs");
        let years = &projection.years;

        assert_approx(years[3].employment_income, 120_000.0);
        assert_approx(years[4].employment_income, 0.0);
        assert_approx(years[4].lump_sum_income, 700_000.0);
        assert_eq!(years[4].loan_balance, 0.0);
        let cleared = years[3].loan_balance;
        assert_approx(
            years[4].loan_repayment,
            cleared * 0.05 + cleared,
        );
        assert_approx(years[5].loan_repayment, 0.0);
        assert_approx(years[5].lump_sum_income, 0.0);
        assert_eq!(projection.metrics.payoff_year, Some(5));
        assert_record_invariants(years);
    }

    #[test]
    fn partial_lump_sum_payoff_keeps_amortizing() {
        let mut inputs = sample_inputs();
        inputs.retirement_year = Some(3);
        inputs.retirement_lump_sum = 100_000.0;
        inputs.lump_sum_payoff = true;
        let with_payoff = run_projection(&inputs).expect("valid inputs");

        inputs.lump_sum_payoff = false;
        let without = run_projection(&inputs).expect("valid inputs");

        assert_approx(
            without.years[2].loan_balance - with_payoff.years[2].loan_balance,
            100_000.0,
        );
        assert!(with_payoff.metrics.payoff_year < without.metrics.payoff_year);
        assert_record_invariants(&with_payoff.years);
    }

    #[test]
    fn partner_lump_sum_lands_in_partner_year_only() {
        let mut inputs = sample_inputs();
        inputs.partner_retirement_year = Some(8);
        inputs.partner_lump_sum = 250_000.0;
        let projection = run_projection(&inputs).expect("valid inputs");

        for y in &projection.years {
            let expected = if y.year == 8 { 250_000.0 } else { 0.0 };
            assert_approx(y.lump_sum_income, expected);
            assert_approx(y.employment_income, 120_000.0);
        }
    }

    #[test]
    fn education_costs_phase_over_to_new_fee_then_stop() {
        let mut inputs = sample_inputs();
        inputs.education_change_after_years = Some(3.5);
        inputs.education_new_annual_fees = 15_000.0;
        inputs.education_new_duration_years = 4;
        let projection = run_projection(&inputs).expect("valid inputs");

        let fees: Vec<f64> = projection.years.iter().map(|y| y.school_fees).collect();
        assert_eq!(&fees[..3], &[10_000.0; 3]);
        assert_eq!(&fees[3..7], &[15_000.0; 4]);
        assert!(fees[7..].iter().all(|f| *f == 0.0));
    }

    #[test]
    fn growth_rates_compound_by_year() {
        let mut inputs = sample_inputs();
        inputs.inflation_rate = 0.025;
        inputs.employment_income_growth = 0.03;
        inputs.rental_income_growth = 0.035;
        let projection = run_projection(&inputs).expect("valid inputs");
        let y2 = &projection.years[1];

        assert_approx(y2.living_expenses, 60_000.0 * 1.025_f64.powi(2));
        assert_approx(y2.agistment_income, 5_000.0 * 1.025_f64.powi(2));
        assert_approx(y2.employment_income, 120_000.0 * 1.03_f64.powi(2));
        assert_approx(y2.rental_income, 20_000.0 * 1.035_f64.powi(2));
        assert_approx(y2.property_value, 800_000.0 * 1.03_f64.powi(2));
    }

    #[test]
    fn flat_inputs_hold_income_and_costs_constant() {
        let projection = run_projection(&sample_inputs()).expect("valid inputs");
        for y in &projection.years {
            assert_eq!(y.total_income, 145_000.0);
            assert_eq!(
                y.living_expenses + y.school_fees + y.property_running_costs,
                78_000.0
            );
        }
    }

    #[test]
    fn metrics_report_break_even_and_ratios() {
        let projection = run_projection(&sample_inputs()).expect("valid inputs");
        let metrics = &projection.metrics;
        let y1 = &projection.years[0];

        assert_eq!(metrics.break_even_year, Some(1));
        assert_approx(metrics.first_year_surplus, y1.surplus);
        assert_approx(metrics.debt_to_income, 600_000.0 / 145_000.0);
        assert_approx(metrics.expense_to_income, y1.total_expenses / 145_000.0);
        assert_approx(metrics.repayment_to_income, y1.loan_repayment / 145_000.0);
        assert_approx(metrics.final_equity, projection.years[29].equity);
    }

    #[test]
    fn break_even_is_none_when_cashflow_never_recovers() {
        let mut inputs = sample_inputs();
        inputs.employment_income = 0.0;
        let projection = run_projection(&inputs).expect("valid inputs");
        assert_eq!(projection.metrics.break_even_year, None);
        assert!(projection.metrics.final_cumulative_cashflow < 0.0);
    }

    #[test]
    fn invalid_inputs_abort_the_run() {
        let mut inputs = sample_inputs();
        inputs.loan_term_years = 0;
        assert!(run_projection(&inputs).is_err());

        let mut inputs = sample_inputs();
        inputs.horizon_years = 0;
        assert!(run_projection(&inputs).is_err());

        let mut inputs = sample_inputs();
        inputs.purchase_price = -1.0;
        assert!(run_projection(&inputs).is_err());

        let mut inputs = sample_inputs();
        inputs.interest_rate = 1.5;
        assert!(run_projection(&inputs).is_err());
    }

    #[test]
    fn education_timing_beyond_horizon_is_rejected() {
        let mut inputs = sample_inputs();
        inputs.education_change_after_years = Some(5e9);
        inputs.education_new_duration_years = 10;
        let err = run_projection(&inputs).expect_err("change after must be bounded");
        assert!(err.to_string().contains("education_change_after_years"));

        let mut inputs = sample_inputs();
        inputs.education_change_after_years = Some(2.0);
        inputs.education_new_duration_years = u32::MAX;
        let err = run_projection(&inputs).expect_err("duration must be bounded");
        assert!(err.to_string().contains("education_new_duration_years"));
    }

    #[test]
    fn education_phase_end_saturates_instead_of_overflowing() {
        let mut inputs = sample_inputs();
        inputs.school_fees = 10_000.0;
        inputs.education_change_after_years = Some(f64::from(u32::MAX));
        inputs.education_new_annual_fees = 4_000.0;
        inputs.education_new_duration_years = 10;

        assert_eq!(school_fees_base(&inputs, 1), 10_000.0);
        assert_eq!(school_fees_base(&inputs, u32::MAX), 10_000.0);

        inputs.education_change_after_years = Some(2.0);
        inputs.education_new_duration_years = u32::MAX;
        assert_eq!(school_fees_base(&inputs, 3), 4_000.0);
        assert_eq!(school_fees_base(&inputs, u32::MAX), 4_000.0);
    }

    #[test]
    fn stop_at_payoff_without_a_loan_runs_to_horizon() {
        let mut inputs = sample_inputs();
        inputs.cash_deposit = 900_000.0;
        inputs.horizon_years = 10;
        inputs.payoff_policy = PayoffPolicy::StopAtPayoff;
        let projection = run_projection(&inputs).expect("valid inputs");

        assert_eq!(projection.upfront.loan_principal, 0.0);
        assert_eq!(projection.years.len(), 10);
        assert!(projection.years.iter().all(|y| y.loan_repayment == 0.0));
    }

    #[test]
    fn zero_property_value_reports_zero_lvr() {
        assert_eq!(loan_to_value(100_000.0, 0.0), 0.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_projection_invariants_hold(
            price in 100_000u32..4_000_000,
            deposit_pct in 0u32..101,
            rate_bp in 0u32..1200,
            term in 1u32..41,
            horizon in 1u32..41,
            growth_bp in -500i32..1000,
            employment in 0u32..300_000,
            rental in 0u32..60_000,
            living in 0u32..150_000,
            capitalize in proptest::bool::ANY,
        ) {
            let mut inputs = sample_inputs();
            inputs.purchase_price = price as f64;
            inputs.cash_deposit = price as f64 * deposit_pct as f64 / 100.0;
            inputs.interest_rate = rate_bp as f64 / 10_000.0;
            inputs.loan_term_years = term;
            inputs.horizon_years = horizon;
            inputs.property_growth_rate = growth_bp as f64 / 10_000.0;
            inputs.employment_income = employment as f64;
            inputs.rental_income = rental as f64;
            inputs.living_expenses = living as f64;
            inputs.capitalize_lmi = capitalize;

            let projection = run_projection(&inputs).expect("valid inputs");
            prop_assert_eq!(projection.years.len(), horizon as usize);

            let mut previous_cumulative = 0.0;
            let mut previous_balance = projection.upfront.loan_principal;
            for (idx, y) in projection.years.iter().enumerate() {
                prop_assert_eq!(y.year, idx as u32 + 1);
                prop_assert_eq!(y.cumulative_cashflow, previous_cumulative + y.surplus);
                prop_assert_eq!(y.equity, y.property_value - y.loan_balance);
                prop_assert!(y.loan_balance >= 0.0);
                prop_assert!(y.loan_balance <= previous_balance);
                prop_assert!(y.lvr >= 0.0);
                previous_cumulative = y.cumulative_cashflow;
                previous_balance = y.loan_balance;
            }
        }
    }
}
