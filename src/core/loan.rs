use super::error::ProjectionError;

// Balances this close to zero are treated as repaid.
const PAYOFF_EPSILON: f64 = 1e-6;

/// Fixed annual repayment that clears `principal` over `term_years` at `rate`.
pub fn annual_repayment(principal: f64, rate: f64, term_years: u32) -> Result<f64, ProjectionError> {
    if term_years == 0 {
        return Err(ProjectionError::invalid(
            "loan_term_years",
            "must be at least 1 year",
        ));
    }
    if !principal.is_finite() || principal < 0.0 {
        return Err(ProjectionError::invalid("loan_principal", "must be >= 0"));
    }
    if !rate.is_finite() || rate < 0.0 {
        return Err(ProjectionError::invalid("interest_rate", "must be >= 0"));
    }
    if principal == 0.0 {
        return Ok(0.0);
    }

    let years = term_years as f64;
    if rate.abs() < 1e-12 {
        return Ok(principal / years);
    }

    let denom = 1.0 - (1.0 + rate).powf(-years);
    if denom <= 1e-12 {
        Ok(principal / years)
    } else {
        Ok(principal * rate / denom)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct YearStep {
    pub opening_balance: f64,
    pub interest: f64,
    pub principal: f64,
    pub repayment: f64,
    pub closing_balance: f64,
}

/// One year of amortization. Interest is always covered; principal is clamped so the
/// balance cannot go negative, which shortens the final repayment.
pub fn amortize_year(balance: f64, rate: f64, repayment: f64) -> YearStep {
    if balance <= 0.0 {
        return YearStep::default();
    }

    let interest = balance * rate;
    let mut principal = (repayment - interest).clamp(0.0, balance);
    if balance - principal <= PAYOFF_EPSILON {
        principal = balance;
    }

    YearStep {
        opening_balance: balance,
        interest,
        principal,
        repayment: interest + principal,
        closing_balance: balance - principal,
    }
}

#[derive(Debug, Clone)]
pub struct LoanState {
    principal: f64,
    rate: f64,
    term_years: u32,
    annual_repayment: f64,
    balance: f64,
}

impl LoanState {
    pub fn new(principal: f64, rate: f64, term_years: u32) -> Result<Self, ProjectionError> {
        let annual_repayment = annual_repayment(principal, rate, term_years)?;
        Ok(Self {
            principal,
            rate,
            term_years,
            annual_repayment,
            balance: principal,
        })
    }

    pub fn principal(&self) -> f64 {
        self.principal
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn term_years(&self) -> u32 {
        self.term_years
    }

    pub fn annual_repayment(&self) -> f64 {
        self.annual_repayment
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn is_paid_off(&self) -> bool {
        self.balance <= 0.0
    }

    pub(crate) fn advance_year(&mut self) -> YearStep {
        let step = amortize_year(self.balance, self.rate, self.annual_repayment);
        self.balance = step.closing_balance;
        step
    }

    /// Pays down up to `amount` of the outstanding balance, returning what was applied.
    pub(crate) fn apply_lump_sum(&mut self, amount: f64) -> f64 {
        let applied = amount.max(0.0).min(self.balance);
        self.balance -= applied;
        if self.balance <= PAYOFF_EPSILON {
            self.balance = 0.0;
        }
        applied
    }
}
