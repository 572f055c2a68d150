use serde::Deserialize;

use super::types::{FilingStatus, Gender, Scenario};

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScenarioPatch {
    pub current_age: Option<u32>,
    pub max_age: Option<u32>,
    pub retirement_age: Option<u32>,
    pub gender: Option<Gender>,
    pub state: Option<String>,
    pub filing_status: Option<FilingStatus>,
    pub initial_capital: Option<f64>,
    pub annual_spending: Option<f64>,
    pub social_security_monthly: Option<f64>,
    pub social_security_start_age: Option<u32>,
    pub pension_annual: Option<f64>,
    pub employment_income: Option<f64>,
    pub employment_growth_rate: Option<f64>,
    pub stock_allocation: Option<f64>,
    pub expected_return: Option<f64>,
    pub return_volatility: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub n_simulations: Option<u32>,
    pub include_mortality: Option<bool>,
    pub home_value: Option<f64>,
}

impl ScenarioPatch {
    pub fn is_empty(&self) -> bool {
        *self == ScenarioPatch::default()
    }

    pub fn apply_to(&self, scenario: &mut Scenario) {
        if let Some(v) = self.current_age {
            scenario.current_age = v;
        }
        if let Some(v) = self.max_age {
            scenario.max_age = v;
        }
        if let Some(v) = self.retirement_age {
            scenario.retirement_age = v;
        }
        if let Some(v) = self.gender {
            scenario.gender = v;
        }
        if let Some(v) = &self.state {
            scenario.state = v.trim().to_ascii_uppercase();
        }
        if let Some(v) = self.filing_status {
            scenario.filing_status = v;
        }
        if let Some(v) = self.initial_capital {
            scenario.initial_capital = v;
        }
        if let Some(v) = self.annual_spending {
            scenario.annual_spending = v;
        }
        if let Some(v) = self.social_security_monthly {
            scenario.social_security_monthly = v;
        }
        if let Some(v) = self.social_security_start_age {
            scenario.social_security_start_age = v;
        }
        if let Some(v) = self.pension_annual {
            scenario.pension_annual = v;
        }
        if let Some(v) = self.employment_income {
            scenario.employment_income = v;
        }
        if let Some(v) = self.employment_growth_rate {
            scenario.employment_growth_rate = v;
        }
        if let Some(v) = self.stock_allocation {
            scenario.stock_allocation = v;
        }
        if let Some(v) = self.expected_return {
            scenario.expected_return = v;
        }
        if let Some(v) = self.return_volatility {
            scenario.return_volatility = v;
        }
        if let Some(v) = self.dividend_yield {
            scenario.dividend_yield = v;
        }
        if let Some(v) = self.n_simulations {
            scenario.n_simulations = v;
        }
        if let Some(v) = self.include_mortality {
            scenario.include_mortality = v;
        }
        if let Some(v) = self.home_value {
            scenario.home_value = v;
        }
    }
}
