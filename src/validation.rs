use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scenario::{Holding, Scenario, SpouseInput, is_valid_state};

pub const MIN_AGE: u32 = 18;
pub const MAX_AGE: u32 = 100;
pub const MAX_HORIZON_AGE: u32 = 120;
pub const MIN_CLAIMING_AGE: u32 = 62;
pub const MAX_CLAIMING_AGE: u32 = 70;
pub const MIN_SIMULATIONS: u32 = 100;
pub const MAX_SIMULATIONS: u32 = 100_000;
pub const MAX_GUARANTEE_YEARS: u32 = 40;
pub const DEFAULT_GUARANTEE_YEARS: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Default)]
struct Rules {
    errors: Vec<ValidationError>,
}

impl Rules {
    fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.errors.push(ValidationError::new(field, message));
        }
    }

    fn non_negative(&mut self, value: f64, field: &str, label: &str) {
        self.check(
            value.is_finite() && value >= 0.0,
            field,
            &format!("{label} must be 0 or greater"),
        );
    }

    fn growth_rate(&mut self, value: f64, field: &str, label: &str) {
        self.check(
            value.is_finite() && value > -1.0,
            field,
            &format!("{label} must be greater than -100%"),
        );
    }

    fn claiming_age(&mut self, age: u32, field: &str, label: &str) {
        self.check(
            (MIN_CLAIMING_AGE..=MAX_CLAIMING_AGE).contains(&age),
            field,
            &format!("{label} must be between {MIN_CLAIMING_AGE} and {MAX_CLAIMING_AGE}"),
        );
    }
}

/// Evaluates every rule against the snapshot and returns the full, ordered error set.
///
/// `holdings` is `Some` in detailed portfolio mode; `initial_capital` is only checked
/// when it is `None`. Spouse and annuity rules run only when those blocks are enabled.
pub fn validate(scenario: &Scenario, holdings: Option<&[Holding]>) -> Vec<ValidationError> {
    let mut rules = Rules::default();
    let s = scenario;

    rules.check(
        (MIN_AGE..=MAX_AGE).contains(&s.current_age),
        "current_age",
        "Current age must be an integer between 18 and 100",
    );
    rules.check(
        s.max_age > s.current_age,
        "max_age",
        "Max age must be greater than current age",
    );
    rules.check(
        s.max_age <= MAX_HORIZON_AGE,
        "max_age",
        "Max age must be 120 or less",
    );
    rules.check(
        s.retirement_age > s.current_age,
        "retirement_age",
        "Retirement age must be greater than current age",
    );
    rules.check(
        s.retirement_age <= MAX_AGE,
        "retirement_age",
        "Retirement age must be 100 or less",
    );
    rules.check(is_valid_state(&s.state), "state", "State must be a valid state");

    rules.check(
        s.annual_spending.is_finite() && s.annual_spending > 0.0,
        "annual_spending",
        "Annual spending must be greater than 0",
    );
    match holdings {
        None => rules.non_negative(s.initial_capital, "initial_capital", "Initial capital"),
        Some(holdings) => {
            rules.check(!holdings.is_empty(), "holdings", "Add at least one holding");
            for (i, holding) in holdings.iter().enumerate() {
                rules.non_negative(holding.balance, &format!("holdings[{i}].balance"), "Balance");
            }
        }
    }
    rules.check(
        s.stock_allocation.is_finite() && (0.0..=1.0).contains(&s.stock_allocation),
        "stock_allocation",
        "Stock allocation must be between 0 and 1",
    );
    rules.growth_rate(s.expected_return, "expected_return", "Expected return");
    rules.non_negative(s.return_volatility, "return_volatility", "Return volatility");
    rules.check(
        s.dividend_yield.is_finite() && (0.0..=1.0).contains(&s.dividend_yield),
        "dividend_yield",
        "Dividend yield must be between 0 and 1",
    );
    rules.non_negative(s.home_value, "home_value", "Home value");
    rules.check(
        (MIN_SIMULATIONS..=MAX_SIMULATIONS).contains(&s.n_simulations),
        "n_simulations",
        "Number of simulations must be between 100 and 100000",
    );

    rules.non_negative(
        s.social_security_monthly,
        "social_security_monthly",
        "Social Security benefit",
    );
    rules.claiming_age(
        s.social_security_start_age,
        "social_security_start_age",
        "Social Security start age",
    );
    rules.non_negative(s.pension_annual, "pension_annual", "Pension income");
    rules.non_negative(s.employment_income, "employment_income", "Employment income");
    rules.growth_rate(
        s.employment_growth_rate,
        "employment_growth_rate",
        "Employment growth rate",
    );

    if let Some(spouse) = &s.spouse {
        validate_spouse(&mut rules, spouse);
    }

    if let Some(annuity) = &s.annuity {
        rules.check(
            annuity.monthly_payment.is_finite() && annuity.monthly_payment > 0.0,
            "annuity.monthly_payment",
            "Annuity payment must be greater than 0",
        );
        if annuity.annuity_type.uses_guarantee_years() {
            rules.check(
                (1..=MAX_GUARANTEE_YEARS).contains(&annuity.guarantee_years),
                "annuity.guarantee_years",
                "Guarantee period must be between 1 and 40 years",
            );
        }
    }

    rules.errors
}

fn validate_spouse(rules: &mut Rules, spouse: &SpouseInput) {
    rules.check(
        (MIN_AGE..=MAX_AGE).contains(&spouse.age),
        "spouse.age",
        "Spouse age must be an integer between 18 and 100",
    );
    rules.check(
        spouse.retirement_age > spouse.age,
        "spouse.retirement_age",
        "Spouse retirement age must be greater than spouse age",
    );
    rules.check(
        spouse.retirement_age <= MAX_AGE,
        "spouse.retirement_age",
        "Spouse retirement age must be 100 or less",
    );
    rules.non_negative(
        spouse.social_security_monthly,
        "spouse.social_security_monthly",
        "Spouse Social Security benefit",
    );
    rules.claiming_age(
        spouse.social_security_start_age,
        "spouse.social_security_start_age",
        "Spouse Social Security start age",
    );
    rules.non_negative(spouse.pension_annual, "spouse.pension_annual", "Spouse pension");
    rules.non_negative(
        spouse.employment_income,
        "spouse.employment_income",
        "Spouse employment income",
    );
    rules.growth_rate(
        spouse.employment_growth_rate,
        "spouse.employment_growth_rate",
        "Spouse employment growth rate",
    );
}

pub fn validate_annuity_offer(monthly_payment: f64, guarantee_years: u32) -> Vec<ValidationError> {
    let mut rules = Rules::default();
    rules.check(
        monthly_payment.is_finite() && monthly_payment > 0.0,
        "annuity_monthly_payment",
        "Annuity payment must be greater than 0",
    );
    rules.check(
        (1..=MAX_GUARANTEE_YEARS).contains(&guarantee_years),
        "annuity_guarantee_years",
        "Guarantee period must be between 1 and 40 years",
    );
    rules.errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{AccountType, AnnuityInput, AnnuityType, Fund};
    use proptest::prelude::{prop_assert, proptest};

    fn errors_for(errors: &[ValidationError], field: &str) -> usize {
        errors.iter().filter(|e| e.field == field).count()
    }

    #[test]
    fn default_scenario_is_valid() {
        assert_eq!(validate(&Scenario::default(), None), Vec::new());
    }

    #[test]
    fn current_age_bounds_are_inclusive() {
        for (age, expected) in [(18, 0), (100, 0), (17, 1), (101, 1)] {
            let mut scenario = Scenario::default();
            scenario.current_age = age;
            let errors = validate(&scenario, None);
            assert_eq!(errors_for(&errors, "current_age"), expected, "age {age}");
        }
    }

    #[test]
    fn retirement_age_equal_to_current_age_is_one_error() {
        let mut scenario = Scenario::default();
        scenario.retirement_age = scenario.current_age;
        let errors = validate(&scenario, None);
        assert_eq!(errors_for(&errors, "retirement_age"), 1);
        assert_eq!(
            errors[0].message,
            "Retirement age must be greater than current age"
        );
    }

    #[test]
    fn cross_field_and_range_failures_are_both_reported() {
        let mut scenario = Scenario::default();
        scenario.current_age = 100;
        scenario.retirement_age = 100;
        scenario.max_age = 121;
        let errors = validate(&scenario, None);
        assert_eq!(errors_for(&errors, "retirement_age"), 1);
        assert_eq!(errors_for(&errors, "max_age"), 1);

        scenario.retirement_age = 99;
        scenario.max_age = 99;
        let errors = validate(&scenario, None);
        assert_eq!(errors_for(&errors, "retirement_age"), 1);
        assert_eq!(errors_for(&errors, "max_age"), 1);

        scenario.current_age = 101;
        scenario.retirement_age = 101;
        let errors = validate(&scenario, None);
        assert_eq!(errors_for(&errors, "retirement_age"), 2);
    }

    #[test]
    fn stock_allocation_is_a_closed_unit_interval() {
        for (allocation, expected) in [(0.0, 0), (1.0, 0), (-0.01, 1), (1.01, 1), (f64::NAN, 1)] {
            let mut scenario = Scenario::default();
            scenario.stock_allocation = allocation;
            let errors = validate(&scenario, None);
            assert_eq!(
                errors_for(&errors, "stock_allocation"),
                expected,
                "allocation {allocation}"
            );
        }
    }

    #[test]
    fn spending_state_and_claiming_age_rules() {
        let mut scenario = Scenario::default();
        scenario.annual_spending = 0.0;
        scenario.state = "ZZ".to_string();
        scenario.social_security_start_age = 61;
        let errors = validate(&scenario, None);
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["state", "annual_spending", "social_security_start_age"]
        );
        assert_eq!(errors[0].message, "State must be a valid state");
    }

    #[test]
    fn spouse_rules_only_apply_when_enabled() {
        let mut scenario = Scenario::default();
        assert!(validate(&scenario, None).is_empty());

        scenario.spouse = Some(SpouseInput {
            age: 17,
            retirement_age: 17,
            social_security_start_age: 71,
            ..SpouseInput::default()
        });
        let errors = validate(&scenario, None);
        assert_eq!(errors_for(&errors, "spouse.age"), 1);
        assert_eq!(errors_for(&errors, "spouse.retirement_age"), 1);
        assert_eq!(errors_for(&errors, "spouse.social_security_start_age"), 1);
    }

    #[test]
    fn annuity_offer_needs_a_positive_payment_and_a_guarantee() {
        assert_eq!(validate_annuity_offer(2_000.0, DEFAULT_GUARANTEE_YEARS), Vec::new());
        assert_eq!(validate_annuity_offer(2_000.0, 40), Vec::new());

        let errors = validate_annuity_offer(-5.0, 0);
        assert_eq!(errors_for(&errors, "annuity_monthly_payment"), 1);
        assert_eq!(errors_for(&errors, "annuity_guarantee_years"), 1);

        assert_eq!(validate_annuity_offer(f64::NAN, 41).len(), 2);
    }

    #[test]
    fn annuity_guarantee_only_checked_for_guaranteed_types() {
        let mut scenario = Scenario::default();
        scenario.annuity = Some(AnnuityInput {
            monthly_payment: 1_500.0,
            annuity_type: AnnuityType::LifeOnly,
            guarantee_years: 0,
        });
        assert!(validate(&scenario, None).is_empty());

        if let Some(annuity) = scenario.annuity.as_mut() {
            annuity.annuity_type = AnnuityType::FixedPeriod;
            annuity.monthly_payment = 0.0;
        }
        let errors = validate(&scenario, None);
        assert_eq!(errors_for(&errors, "annuity.guarantee_years"), 1);
        assert_eq!(errors_for(&errors, "annuity.monthly_payment"), 1);
    }

    #[test]
    fn holdings_replace_initial_capital_rule() {
        let mut scenario = Scenario::default();
        scenario.initial_capital = -1.0;
        assert_eq!(errors_for(&validate(&scenario, None), "initial_capital"), 1);

        let holdings = vec![
            Holding {
                account_type: AccountType::RothIra,
                fund: Fund::Vt,
                balance: 10_000.0,
            },
            Holding {
                account_type: AccountType::Taxable,
                fund: Fund::Bnd,
                balance: -5.0,
            },
        ];
        let errors = validate(&scenario, Some(holdings.as_slice()));
        assert_eq!(errors_for(&errors, "initial_capital"), 0);
        assert_eq!(errors_for(&errors, "holdings[1].balance"), 1);
        assert_eq!(errors_for(&errors, "holdings[0].balance"), 0);

        assert_eq!(errors_for(&validate(&scenario, Some(&[][..])), "holdings"), 1);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_in_range_scenarios_have_no_errors(
            current_age in 18u32..=99,
            retirement_gap in 1u32..=20,
            horizon_gap in 1u32..=40,
            spending in 1u32..=500_000,
            capital in 0u32..=5_000_000,
            allocation_pct in 0u32..=100,
            claiming_age in 62u32..=70,
            state_index in 0usize..51,
        ) {
            let mut scenario = Scenario::default();
            scenario.current_age = current_age;
            scenario.retirement_age = (current_age + retirement_gap).min(MAX_AGE);
            scenario.max_age = (current_age + horizon_gap).min(MAX_HORIZON_AGE);
            scenario.annual_spending = f64::from(spending);
            scenario.initial_capital = f64::from(capital);
            scenario.stock_allocation = f64::from(allocation_pct) / 100.0;
            scenario.social_security_start_age = claiming_age;
            scenario.state = crate::scenario::STATE_CODES[state_index].to_string();

            let errors = validate(&scenario, None);
            prop_assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        }
    }
}
