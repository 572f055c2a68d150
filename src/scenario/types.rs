use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const STATE_CODES: [&str; 51] = [
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY",
];

pub const NO_INCOME_TAX_STATES: [&str; 9] = ["AK", "FL", "NV", "NH", "SD", "TN", "TX", "WA", "WY"];

pub fn is_valid_state(code: &str) -> bool {
    STATE_CODES.contains(&code)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseChoiceError {
    kind: &'static str,
    value: String,
}

impl ParseChoiceError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl FromStr for Gender {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(ParseChoiceError::new("gender", other)),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingStatus {
    #[default]
    Single,
    MarriedFilingJointly,
    MarriedFilingSeparately,
    HeadOfHousehold,
}

impl FilingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FilingStatus::Single => "single",
            FilingStatus::MarriedFilingJointly => "married_filing_jointly",
            FilingStatus::MarriedFilingSeparately => "married_filing_separately",
            FilingStatus::HeadOfHousehold => "head_of_household",
        }
    }
}

impl FromStr for FilingStatus {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(FilingStatus::Single),
            "married_filing_jointly" => Ok(FilingStatus::MarriedFilingJointly),
            "married_filing_separately" => Ok(FilingStatus::MarriedFilingSeparately),
            "head_of_household" => Ok(FilingStatus::HeadOfHousehold),
            other => Err(ParseChoiceError::new("filing status", other)),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[serde(rename = "traditional_401k")]
    Traditional401k,
    TraditionalIra,
    #[serde(rename = "roth_401k")]
    Roth401k,
    RothIra,
    Taxable,
}

impl AccountType {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountType::Traditional401k => "traditional_401k",
            AccountType::TraditionalIra => "traditional_ira",
            AccountType::Roth401k => "roth_401k",
            AccountType::RothIra => "roth_ira",
            AccountType::Taxable => "taxable",
        }
    }
}

impl FromStr for AccountType {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "traditional_401k" => Ok(AccountType::Traditional401k),
            "traditional_ira" => Ok(AccountType::TraditionalIra),
            "roth_401k" => Ok(AccountType::Roth401k),
            "roth_ira" => Ok(AccountType::RothIra),
            "taxable" => Ok(AccountType::Taxable),
            other => Err(ParseChoiceError::new("account type", other)),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fund {
    Vt,
    Sp500,
    Bnd,
    Treasury,
}

impl Fund {
    pub fn as_str(self) -> &'static str {
        match self {
            Fund::Vt => "vt",
            Fund::Sp500 => "sp500",
            Fund::Bnd => "bnd",
            Fund::Treasury => "treasury",
        }
    }
}

impl FromStr for Fund {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vt" => Ok(Fund::Vt),
            "sp500" => Ok(Fund::Sp500),
            "bnd" => Ok(Fund::Bnd),
            "treasury" => Ok(Fund::Treasury),
            other => Err(ParseChoiceError::new("fund", other)),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnuityType {
    #[default]
    LifeWithGuarantee,
    FixedPeriod,
    LifeOnly,
}

impl AnnuityType {
    pub fn as_str(self) -> &'static str {
        match self {
            AnnuityType::LifeWithGuarantee => "life_with_guarantee",
            AnnuityType::FixedPeriod => "fixed_period",
            AnnuityType::LifeOnly => "life_only",
        }
    }

    pub fn uses_guarantee_years(self) -> bool {
        matches!(self, AnnuityType::LifeWithGuarantee | AnnuityType::FixedPeriod)
    }
}

impl FromStr for AnnuityType {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "life_with_guarantee" => Ok(AnnuityType::LifeWithGuarantee),
            "fixed_period" => Ok(AnnuityType::FixedPeriod),
            "life_only" => Ok(AnnuityType::LifeOnly),
            other => Err(ParseChoiceError::new("annuity type", other)),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStrategy {
    #[default]
    TaxableFirst,
    TraditionalFirst,
    RothFirst,
}

impl WithdrawalStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            WithdrawalStrategy::TaxableFirst => "taxable_first",
            WithdrawalStrategy::TraditionalFirst => "traditional_first",
            WithdrawalStrategy::RothFirst => "roth_first",
        }
    }
}

impl FromStr for WithdrawalStrategy {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "taxable_first" => Ok(WithdrawalStrategy::TaxableFirst),
            "traditional_first" => Ok(WithdrawalStrategy::TraditionalFirst),
            "roth_first" => Ok(WithdrawalStrategy::RothFirst),
            other => Err(ParseChoiceError::new("withdrawal strategy", other)),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortfolioMode {
    #[default]
    Simple,
    Detailed,
}

impl fmt::Display for PortfolioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortfolioMode::Simple => f.write_str("simple"),
            PortfolioMode::Detailed => f.write_str("detailed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub account_type: AccountType,
    pub fund: Fund,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpouseInput {
    pub age: u32,
    pub gender: Gender,
    pub social_security_monthly: f64,
    pub social_security_start_age: u32,
    pub pension_annual: f64,
    pub employment_income: f64,
    pub employment_growth_rate: f64,
    pub retirement_age: u32,
}

impl Default for SpouseInput {
    fn default() -> Self {
        Self {
            age: 63,
            gender: Gender::Female,
            social_security_monthly: 1_500.0,
            social_security_start_age: 67,
            pension_annual: 0.0,
            employment_income: 0.0,
            employment_growth_rate: 0.03,
            retirement_age: 65,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnuityInput {
    pub monthly_payment: f64,
    pub annuity_type: AnnuityType,
    pub guarantee_years: u32,
}

impl Default for AnnuityInput {
    fn default() -> Self {
        Self {
            monthly_payment: 2_000.0,
            annuity_type: AnnuityType::LifeWithGuarantee,
            guarantee_years: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub current_age: u32,
    pub max_age: u32,
    pub retirement_age: u32,
    pub gender: Gender,
    pub state: String,
    pub filing_status: FilingStatus,
    pub initial_capital: f64,
    pub annual_spending: f64,
    pub social_security_monthly: f64,
    pub social_security_start_age: u32,
    pub pension_annual: f64,
    pub employment_income: f64,
    pub employment_growth_rate: f64,
    pub stock_allocation: f64,
    pub expected_return: f64,
    pub return_volatility: f64,
    pub dividend_yield: f64,
    pub n_simulations: u32,
    pub include_mortality: bool,
    pub home_value: f64,
    pub spouse: Option<SpouseInput>,
    pub annuity: Option<AnnuityInput>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            current_age: 65,
            max_age: 95,
            retirement_age: 67,
            gender: Gender::Male,
            state: "CA".to_string(),
            filing_status: FilingStatus::Single,
            initial_capital: 500_000.0,
            annual_spending: 60_000.0,
            social_security_monthly: 2_000.0,
            social_security_start_age: 67,
            pension_annual: 0.0,
            employment_income: 0.0,
            employment_growth_rate: 0.03,
            stock_allocation: 0.6,
            expected_return: 0.07,
            return_volatility: 0.16,
            dividend_yield: 0.02,
            n_simulations: 10_000,
            include_mortality: true,
            home_value: 0.0,
            spouse: None,
            annuity: None,
        }
    }
}

impl Scenario {
    pub fn has_spouse(&self) -> bool {
        self.spouse.is_some()
    }

    pub fn has_annuity(&self) -> bool {
        self.annuity.is_some()
    }
}
