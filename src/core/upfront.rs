use serde::{Deserialize, Serialize};

use super::types::{ScenarioInputs, UpfrontSummary};

/// One band of a progressive transfer-duty schedule. A price above `lower` pays
/// `base + (price - lower) * rate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DutyBracket {
    pub lower: f64,
    pub base: f64,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DutySchedule {
    pub brackets: Vec<DutyBracket>,
}

impl DutySchedule {
    /// NSW general transfer duty, including the premium band.
    pub fn nsw() -> Self {
        let bands = [
            (0.0, 0.0, 0.0125),
            (16_000.0, 200.0, 0.015),
            (35_000.0, 485.0, 0.0175),
            (93_000.0, 1_500.0, 0.035),
            (351_000.0, 10_530.0, 0.045),
            (1_168_000.0, 47_295.0, 0.055),
            (3_504_000.0, 175_775.0, 0.07),
        ];
        Self {
            brackets: bands
                .into_iter()
                .map(|(lower, base, rate)| DutyBracket { lower, base, rate })
                .collect(),
        }
    }

    /// Duty payable on `price`, rounded up to the whole dollar.
    pub fn duty(&self, price: f64) -> f64 {
        if price <= 0.0 {
            return 0.0;
        }
        let Some(bracket) = self
            .brackets
            .iter()
            .filter(|b| b.lower < price)
            .max_by(|a, b| a.lower.total_cmp(&b.lower))
        else {
            return 0.0;
        };
        ceil_dollars(bracket.base + (price - bracket.lower) * bracket.rate)
    }
}

impl Default for DutySchedule {
    fn default() -> Self {
        Self::nsw()
    }
}

/// Premium rate applied to the whole loan when LVR at purchase is at most `max_lvr`.
/// `None` marks the open-ended top tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LmiTier {
    pub max_lvr: Option<f64>,
    pub premium_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmiSchedule {
    pub lvr_threshold: f64,
    pub tiers: Vec<LmiTier>,
    pub premium_duty_rate: f64,
}

impl LmiSchedule {
    /// Rough lender-neutral tiers with NSW duty on the premium.
    pub fn standard() -> Self {
        Self {
            lvr_threshold: 0.80,
            tiers: vec![
                LmiTier {
                    max_lvr: Some(0.85),
                    premium_rate: 0.010,
                },
                LmiTier {
                    max_lvr: Some(0.90),
                    premium_rate: 0.018,
                },
                LmiTier {
                    max_lvr: Some(0.95),
                    premium_rate: 0.035,
                },
                LmiTier {
                    max_lvr: None,
                    premium_rate: 0.045,
                },
            ],
            premium_duty_rate: 0.095,
        }
    }

    /// Premium (including duty on the premium) for `loan` against `price`. Zero at or
    /// below the LVR threshold.
    pub fn premium(&self, loan: f64, price: f64) -> f64 {
        if price <= 0.0 || loan <= 0.0 {
            return 0.0;
        }
        let lvr = loan / price;
        if lvr <= self.lvr_threshold {
            return 0.0;
        }
        let Some(tier) = self.tier_for(lvr) else {
            return 0.0;
        };
        ceil_dollars(loan * tier.premium_rate * (1.0 + self.premium_duty_rate))
    }

    fn tier_for(&self, lvr: f64) -> Option<&LmiTier> {
        let cap = |t: &LmiTier| t.max_lvr.unwrap_or(f64::INFINITY);
        self.tiers
            .iter()
            .filter(|t| lvr <= cap(t))
            .min_by(|a, b| cap(a).total_cmp(&cap(b)))
            .or_else(|| self.tiers.iter().max_by(|a, b| cap(a).total_cmp(&cap(b))))
    }
}

impl Default for LmiSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

// Rounds to cents first so representation noise cannot push a whole-dollar amount up.
fn ceil_dollars(amount: f64) -> f64 {
    ((amount * 100.0).round() / 100.0).ceil()
}

pub fn calculate_upfront(inputs: &ScenarioInputs) -> UpfrontSummary {
    let price = inputs.purchase_price;
    let funds_available = inputs.cash_deposit + inputs.equity_contribution;
    let base_loan = (price - funds_available).max(0.0);

    let stamp_duty = inputs.stamp_duty_schedule.duty(price);
    let lmi_premium = inputs.lmi_schedule.premium(base_loan, price);
    let (lmi_capitalized, lmi_payable_upfront) = if inputs.capitalize_lmi {
        (lmi_premium, 0.0)
    } else {
        (0.0, lmi_premium)
    };

    let loan_principal = inputs
        .loan_amount_override
        .unwrap_or(base_loan + lmi_capitalized);
    let deposit_paid = (price - loan_principal).max(0.0);
    let total_upfront_cost =
        deposit_paid + stamp_duty + lmi_payable_upfront + inputs.other_upfront_costs;
    let position = funds_available - total_upfront_cost;

    UpfrontSummary {
        purchase_price: price,
        funds_available,
        base_loan,
        stamp_duty,
        lmi_premium,
        lmi_capitalized,
        lmi_payable_upfront,
        deposit_paid,
        other_upfront_costs: inputs.other_upfront_costs,
        total_upfront_cost,
        surplus: position.max(0.0),
        shortfall: (-position).max(0.0),
        loan_principal,
        initial_lvr: if price > 0.0 {
            loan_principal / price
        } else {
            0.0
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    fn inputs_for(price: f64, deposit: f64) -> ScenarioInputs {
        ScenarioInputs {
            purchase_price: price,
            cash_deposit: deposit,
            equity_contribution: 0.0,
            other_upfront_costs: 0.0,
            ..ScenarioInputs::default()
        }
    }

    #[test]
    fn nsw_duty_matches_published_bands() {
        let schedule = DutySchedule::nsw();
        assert_approx(schedule.duty(0.0), 0.0);
        assert_approx(schedule.duty(10_000.0), 125.0);
        assert_approx(schedule.duty(16_000.0), 200.0);
        assert_approx(schedule.duty(100_000.0), 1_745.0);
        assert_approx(schedule.duty(600_000.0), 21_735.0);
        assert_approx(schedule.duty(1_700_000.0), 76_555.0);
        assert_approx(schedule.duty(4_000_000.0), 210_495.0);
    }

    #[test]
    fn duty_schedule_can_be_replaced_with_flat_rate() {
        let flat = DutySchedule {
            brackets: vec![DutyBracket {
                lower: 0.0,
                base: 0.0,
                rate: 0.05,
            }],
        };
        assert_approx(flat.duty(500_000.0), 25_000.0);
    }

    #[test]
    fn lmi_applies_above_eighty_percent() {
        let upfront = calculate_upfront(&inputs_for(600_000.0, 60_000.0));
        assert_approx(upfront.base_loan, 540_000.0);
        assert!(upfront.lmi_premium > 0.0);
        // 540k * 1.8% * 1.095 = 10,643.40
        assert_approx(upfront.lmi_premium, 10_644.0);
    }

    #[test]
    fn lmi_is_zero_at_or_below_eighty_percent() {
        let upfront = calculate_upfront(&inputs_for(600_000.0, 150_000.0));
        assert_approx(upfront.lmi_premium, 0.0);

        let edge = calculate_upfront(&inputs_for(500_000.0, 100_000.0));
        assert_approx(edge.lmi_premium, 0.0);
    }

    #[test]
    fn lmi_top_tier_is_open_ended() {
        let schedule = LmiSchedule::standard();
        // 98% LVR: 490k * 4.5% * 1.095 = 24,144.75
        let premium = schedule.premium(490_000.0, 500_000.0);
        assert_approx(premium, 24_145.0);
    }

    #[test]
    fn capitalized_lmi_is_added_to_loan() {
        let mut inputs = inputs_for(600_000.0, 60_000.0);
        inputs.capitalize_lmi = true;
        let upfront = calculate_upfront(&inputs);
        assert_approx(upfront.lmi_capitalized, upfront.lmi_premium);
        assert_approx(upfront.lmi_payable_upfront, 0.0);
        assert_approx(upfront.loan_principal, 540_000.0 + upfront.lmi_premium);
    }

    #[test]
    fn upfront_lmi_counts_toward_settlement_funds() {
        let mut inputs = inputs_for(600_000.0, 60_000.0);
        inputs.capitalize_lmi = false;
        inputs.other_upfront_costs = 5_000.0;
        let upfront = calculate_upfront(&inputs);

        assert_approx(upfront.loan_principal, 540_000.0);
        assert_approx(upfront.deposit_paid, 60_000.0);
        assert_approx(
            upfront.total_upfront_cost,
            60_000.0 + 21_735.0 + 10_644.0 + 5_000.0,
        );
        assert_approx(upfront.surplus, 0.0);
        assert_approx(upfront.shortfall, 21_735.0 + 10_644.0 + 5_000.0);
    }

    #[test]
    fn excess_funds_report_surplus_and_no_loan() {
        let mut inputs = inputs_for(400_000.0, 500_000.0);
        inputs.other_upfront_costs = 2_000.0;
        let upfront = calculate_upfront(&inputs);

        assert_approx(upfront.loan_principal, 0.0);
        assert_approx(upfront.deposit_paid, 400_000.0);
        assert_approx(upfront.shortfall, 0.0);
        assert_approx(
            upfront.surplus,
            500_000.0 - 400_000.0 - upfront.stamp_duty - 2_000.0,
        );
        assert_approx(upfront.initial_lvr, 0.0);
    }

    #[test]
    fn loan_override_replaces_derived_principal() {
        let mut inputs = inputs_for(600_000.0, 150_000.0);
        inputs.loan_amount_override = Some(400_000.0);
        let upfront = calculate_upfront(&inputs);
        assert_approx(upfront.loan_principal, 400_000.0);
        assert_approx(upfront.deposit_paid, 200_000.0);
        assert_approx(upfront.initial_lvr, 400_000.0 / 600_000.0);
    }
}
