use serde::{Deserialize, Serialize};

use super::error::ProjectionError;
use super::upfront::{DutySchedule, LmiSchedule};

pub const MAX_HORIZON_YEARS: u32 = 40;
pub const MAX_LOAN_TERM_YEARS: u32 = 50;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayoffPolicy {
    #[default]
    ContinueToHorizon,
    StopAtPayoff,
}

/// Every parameter of one affordability run. Rates are fractions (0.06 = 6%).
///
/// Serialized as a flat object with snake_case keys; missing keys fall back to the
/// defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioInputs {
    pub purchase_price: f64,
    pub cash_deposit: f64,
    pub equity_contribution: f64,
    pub other_upfront_costs: f64,
    pub loan_amount_override: Option<f64>,
    pub capitalize_lmi: bool,

    pub interest_rate: f64,
    pub loan_term_years: u32,
    pub horizon_years: u32,
    pub property_growth_rate: f64,
    pub payoff_policy: PayoffPolicy,

    pub employment_income: f64,
    pub rental_income: f64,
    pub agistment_income: f64,
    pub employment_income_growth: f64,
    pub rental_income_growth: f64,

    pub living_expenses: f64,
    pub school_fees: f64,
    pub property_running_costs: f64,
    pub inflation_rate: f64,

    pub retirement_year: Option<u32>,
    pub retirement_lump_sum: f64,
    pub partner_retirement_year: Option<u32>,
    pub partner_lump_sum: f64,
    pub lump_sum_payoff: bool,

    pub education_change_after_years: Option<f64>,
    pub education_new_annual_fees: f64,
    pub education_new_duration_years: u32,

    pub stamp_duty_schedule: DutySchedule,
    pub lmi_schedule: LmiSchedule,
}

impl Default for ScenarioInputs {
    fn default() -> Self {
        Self {
            purchase_price: 1_700_000.0,
            cash_deposit: 50_000.0,
            equity_contribution: 1_040_000.0,
            other_upfront_costs: 5_000.0,
            loan_amount_override: None,
            capitalize_lmi: true,
            interest_rate: 0.06,
            loan_term_years: 25,
            horizon_years: 25,
            property_growth_rate: 0.04,
            payoff_policy: PayoffPolicy::ContinueToHorizon,
            employment_income: 130_000.0,
            rental_income: 21_060.0,
            agistment_income: 8_320.0,
            employment_income_growth: 0.0,
            rental_income_growth: 0.0,
            living_expenses: 78_000.0,
            school_fees: 50_000.0,
            property_running_costs: 13_500.0,
            inflation_rate: 0.0,
            retirement_year: None,
            retirement_lump_sum: 0.0,
            partner_retirement_year: None,
            partner_lump_sum: 0.0,
            lump_sum_payoff: false,
            education_change_after_years: None,
            education_new_annual_fees: 0.0,
            education_new_duration_years: 0,
            stamp_duty_schedule: DutySchedule::nsw(),
            lmi_schedule: LmiSchedule::standard(),
        }
    }
}

impl ScenarioInputs {
    /// Boundary check run once before the engine sees the inputs.
    pub fn validate(&self) -> Result<(), ProjectionError> {
        if !self.purchase_price.is_finite() || self.purchase_price <= 0.0 {
            return Err(ProjectionError::invalid("purchase_price", "must be > 0"));
        }

        for (field, value) in [
            ("cash_deposit", self.cash_deposit),
            ("equity_contribution", self.equity_contribution),
            ("other_upfront_costs", self.other_upfront_costs),
            ("employment_income", self.employment_income),
            ("rental_income", self.rental_income),
            ("agistment_income", self.agistment_income),
            ("living_expenses", self.living_expenses),
            ("school_fees", self.school_fees),
            ("property_running_costs", self.property_running_costs),
            ("retirement_lump_sum", self.retirement_lump_sum),
            ("partner_lump_sum", self.partner_lump_sum),
            ("education_new_annual_fees", self.education_new_annual_fees),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ProjectionError::invalid(field, "must be >= 0"));
            }
        }

        if let Some(loan) = self.loan_amount_override {
            if !loan.is_finite() || loan < 0.0 {
                return Err(ProjectionError::invalid("loan_amount_override", "must be >= 0"));
            }
        }

        if !(0.0..=1.0).contains(&self.interest_rate) {
            return Err(ProjectionError::invalid(
                "interest_rate",
                "must be between 0 and 1",
            ));
        }

        for (field, rate) in [
            ("property_growth_rate", self.property_growth_rate),
            ("employment_income_growth", self.employment_income_growth),
            ("rental_income_growth", self.rental_income_growth),
            ("inflation_rate", self.inflation_rate),
        ] {
            if !rate.is_finite() || rate <= -1.0 || rate > 1.0 {
                return Err(ProjectionError::invalid(field, "must be > -1 and <= 1"));
            }
        }

        if self.loan_term_years == 0 || self.loan_term_years > MAX_LOAN_TERM_YEARS {
            return Err(ProjectionError::invalid(
                "loan_term_years",
                format!("must be between 1 and {MAX_LOAN_TERM_YEARS}"),
            ));
        }

        if self.horizon_years == 0 || self.horizon_years > MAX_HORIZON_YEARS {
            return Err(ProjectionError::invalid(
                "horizon_years",
                format!("must be between 1 and {MAX_HORIZON_YEARS}"),
            ));
        }

        for (field, year) in [
            ("retirement_year", self.retirement_year),
            ("partner_retirement_year", self.partner_retirement_year),
        ] {
            if year == Some(0) {
                return Err(ProjectionError::invalid(field, "must be >= 1"));
            }
        }

        if let Some(after) = self.education_change_after_years {
            if !after.is_finite() || after < 0.0 || after > f64::from(MAX_HORIZON_YEARS) {
                return Err(ProjectionError::invalid(
                    "education_change_after_years",
                    format!("must be between 0 and {MAX_HORIZON_YEARS}"),
                ));
            }
        }

        if self.education_new_duration_years > MAX_HORIZON_YEARS {
            return Err(ProjectionError::invalid(
                "education_new_duration_years",
                format!("must be at most {MAX_HORIZON_YEARS}"),
            ));
        }

        if !(0.0..1.0).contains(&self.lmi_schedule.lvr_threshold)
            || self.lmi_schedule.premium_duty_rate < 0.0
            || self.lmi_schedule.tiers.iter().any(|t| t.premium_rate < 0.0)
        {
            return Err(ProjectionError::invalid(
                "lmi_schedule",
                "threshold must be in [0, 1) and rates >= 0",
            ));
        }

        if self
            .stamp_duty_schedule
            .brackets
            .iter()
            .any(|b| b.lower < 0.0 || b.base < 0.0 || b.rate < 0.0)
        {
            return Err(ProjectionError::invalid(
                "stamp_duty_schedule",
                "bounds, bases and rates must be >= 0",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpfrontSummary {
    pub purchase_price: f64,
    pub funds_available: f64,
    pub base_loan: f64,
    pub stamp_duty: f64,
    pub lmi_premium: f64,
    pub lmi_capitalized: f64,
    pub lmi_payable_upfront: f64,
    pub deposit_paid: f64,
    pub other_upfront_costs: f64,
    pub total_upfront_cost: f64,
    pub surplus: f64,
    pub shortfall: f64,
    pub loan_principal: f64,
    pub initial_lvr: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearRecord {
    pub year: u32,
    pub employment_income: f64,
    pub rental_income: f64,
    pub agistment_income: f64,
    pub lump_sum_income: f64,
    pub total_income: f64,
    pub living_expenses: f64,
    pub school_fees: f64,
    pub property_running_costs: f64,
    pub interest_paid: f64,
    pub principal_paid: f64,
    pub loan_repayment: f64,
    pub total_expenses: f64,
    pub surplus: f64,
    pub cumulative_cashflow: f64,
    pub property_value: f64,
    pub loan_balance: f64,
    pub equity: f64,
    pub lvr: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionMetrics {
    pub first_year_surplus: f64,
    pub break_even_year: Option<u32>,
    pub payoff_year: Option<u32>,
    pub debt_to_income: f64,
    pub expense_to_income: f64,
    pub repayment_to_income: f64,
    pub final_equity: f64,
    pub final_cumulative_cashflow: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub upfront: UpfrontSummary,
    pub annual_repayment: f64,
    pub metrics: ProjectionMetrics,
    pub years: Vec<YearRecord>,
}
