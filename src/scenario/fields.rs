use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::types::{AnnuityInput, Scenario, SpouseInput};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ScenarioField {
    CurrentAge,
    MaxAge,
    RetirementAge,
    Gender,
    State,
    FilingStatus,
    InitialCapital,
    AnnualSpending,
    SocialSecurityMonthly,
    SocialSecurityStartAge,
    PensionAnnual,
    EmploymentIncome,
    EmploymentGrowthRate,
    StockAllocation,
    ExpectedReturn,
    ReturnVolatility,
    DividendYield,
    NSimulations,
    IncludeMortality,
    HomeValue,
    Spouse(SpouseField),
    Annuity(AnnuityField),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SpouseField {
    Age,
    Gender,
    SocialSecurityMonthly,
    SocialSecurityStartAge,
    PensionAnnual,
    EmploymentIncome,
    EmploymentGrowthRate,
    RetirementAge,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AnnuityField {
    MonthlyPayment,
    AnnuityType,
    GuaranteeYears,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Integer,
    Number,
    Flag,
    Choice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(true) => f.write_str("1"),
            FieldValue::Bool(false) => f.write_str("0"),
            FieldValue::Number(v) => write!(f, "{v}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldUpdateError {
    #[error("unknown scenario field '{0}'")]
    UnknownField(String),
    #[error("{field} expects {expected:?} value")]
    WrongType { field: ScenarioField, expected: FieldKind },
    #[error("{0} must be a whole non-negative number")]
    NotAnInteger(ScenarioField),
    #[error("{field}: {message}")]
    InvalidChoice { field: ScenarioField, message: String },
    #[error("{0} cannot be set while the spouse is disabled")]
    SpouseDisabled(ScenarioField),
    #[error("{0} cannot be set while the annuity is disabled")]
    AnnuityDisabled(ScenarioField),
}

const ROOT_FIELDS: [ScenarioField; 20] = [
    ScenarioField::CurrentAge,
    ScenarioField::MaxAge,
    ScenarioField::RetirementAge,
    ScenarioField::Gender,
    ScenarioField::State,
    ScenarioField::FilingStatus,
    ScenarioField::InitialCapital,
    ScenarioField::AnnualSpending,
    ScenarioField::SocialSecurityMonthly,
    ScenarioField::SocialSecurityStartAge,
    ScenarioField::PensionAnnual,
    ScenarioField::EmploymentIncome,
    ScenarioField::EmploymentGrowthRate,
    ScenarioField::StockAllocation,
    ScenarioField::ExpectedReturn,
    ScenarioField::ReturnVolatility,
    ScenarioField::DividendYield,
    ScenarioField::NSimulations,
    ScenarioField::IncludeMortality,
    ScenarioField::HomeValue,
];

const SPOUSE_FIELDS: [SpouseField; 8] = [
    SpouseField::Age,
    SpouseField::Gender,
    SpouseField::SocialSecurityMonthly,
    SpouseField::SocialSecurityStartAge,
    SpouseField::PensionAnnual,
    SpouseField::EmploymentIncome,
    SpouseField::EmploymentGrowthRate,
    SpouseField::RetirementAge,
];

const ANNUITY_FIELDS: [AnnuityField; 3] = [
    AnnuityField::MonthlyPayment,
    AnnuityField::AnnuityType,
    AnnuityField::GuaranteeYears,
];

impl ScenarioField {
    pub fn all() -> impl Iterator<Item = ScenarioField> {
        ROOT_FIELDS
            .into_iter()
            .chain(SPOUSE_FIELDS.into_iter().map(ScenarioField::Spouse))
            .chain(ANNUITY_FIELDS.into_iter().map(ScenarioField::Annuity))
    }

    pub fn path(self) -> &'static str {
        match self {
            ScenarioField::CurrentAge => "current_age",
            ScenarioField::MaxAge => "max_age",
            ScenarioField::RetirementAge => "retirement_age",
            ScenarioField::Gender => "gender",
            ScenarioField::State => "state",
            ScenarioField::FilingStatus => "filing_status",
            ScenarioField::InitialCapital => "initial_capital",
            ScenarioField::AnnualSpending => "annual_spending",
            ScenarioField::SocialSecurityMonthly => "social_security_monthly",
            ScenarioField::SocialSecurityStartAge => "social_security_start_age",
            ScenarioField::PensionAnnual => "pension_annual",
            ScenarioField::EmploymentIncome => "employment_income",
            ScenarioField::EmploymentGrowthRate => "employment_growth_rate",
            ScenarioField::StockAllocation => "stock_allocation",
            ScenarioField::ExpectedReturn => "expected_return",
            ScenarioField::ReturnVolatility => "return_volatility",
            ScenarioField::DividendYield => "dividend_yield",
            ScenarioField::NSimulations => "n_simulations",
            ScenarioField::IncludeMortality => "include_mortality",
            ScenarioField::HomeValue => "home_value",
            ScenarioField::Spouse(SpouseField::Age) => "spouse.age",
            ScenarioField::Spouse(SpouseField::Gender) => "spouse.gender",
            ScenarioField::Spouse(SpouseField::SocialSecurityMonthly) => {
                "spouse.social_security_monthly"
            }
            ScenarioField::Spouse(SpouseField::SocialSecurityStartAge) => {
                "spouse.social_security_start_age"
            }
            ScenarioField::Spouse(SpouseField::PensionAnnual) => "spouse.pension_annual",
            ScenarioField::Spouse(SpouseField::EmploymentIncome) => "spouse.employment_income",
            ScenarioField::Spouse(SpouseField::EmploymentGrowthRate) => {
                "spouse.employment_growth_rate"
            }
            ScenarioField::Spouse(SpouseField::RetirementAge) => "spouse.retirement_age",
            ScenarioField::Annuity(AnnuityField::MonthlyPayment) => "annuity.monthly_payment",
            ScenarioField::Annuity(AnnuityField::AnnuityType) => "annuity.annuity_type",
            ScenarioField::Annuity(AnnuityField::GuaranteeYears) => "annuity.guarantee_years",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            ScenarioField::CurrentAge
            | ScenarioField::MaxAge
            | ScenarioField::RetirementAge
            | ScenarioField::SocialSecurityStartAge
            | ScenarioField::NSimulations
            | ScenarioField::Spouse(SpouseField::Age)
            | ScenarioField::Spouse(SpouseField::SocialSecurityStartAge)
            | ScenarioField::Spouse(SpouseField::RetirementAge)
            | ScenarioField::Annuity(AnnuityField::GuaranteeYears) => FieldKind::Integer,
            ScenarioField::Gender
            | ScenarioField::State
            | ScenarioField::FilingStatus
            | ScenarioField::Spouse(SpouseField::Gender)
            | ScenarioField::Annuity(AnnuityField::AnnuityType) => FieldKind::Choice,
            ScenarioField::IncludeMortality => FieldKind::Flag,
            _ => FieldKind::Number,
        }
    }
}

impl fmt::Display for ScenarioField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for ScenarioField {
    type Err = FieldUpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioField::all()
            .find(|field| field.path() == s)
            .ok_or_else(|| FieldUpdateError::UnknownField(s.to_string()))
    }
}

fn integer(field: ScenarioField, value: FieldValue) -> Result<u32, FieldUpdateError> {
    match value {
        FieldValue::Number(v) => {
            if v.is_finite() && v.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&v) {
                Ok(v as u32)
            } else {
                Err(FieldUpdateError::NotAnInteger(field))
            }
        }
        _ => Err(FieldUpdateError::WrongType {
            field,
            expected: FieldKind::Integer,
        }),
    }
}

fn number(field: ScenarioField, value: FieldValue) -> Result<f64, FieldUpdateError> {
    match value {
        FieldValue::Number(v) => Ok(v),
        _ => Err(FieldUpdateError::WrongType {
            field,
            expected: FieldKind::Number,
        }),
    }
}

fn flag(field: ScenarioField, value: FieldValue) -> Result<bool, FieldUpdateError> {
    match value {
        FieldValue::Bool(v) => Ok(v),
        _ => Err(FieldUpdateError::WrongType {
            field,
            expected: FieldKind::Flag,
        }),
    }
}

fn choice<T>(field: ScenarioField, value: FieldValue) -> Result<T, FieldUpdateError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match value {
        FieldValue::Text(s) => s.parse().map_err(|e: T::Err| FieldUpdateError::InvalidChoice {
            field,
            message: e.to_string(),
        }),
        _ => Err(FieldUpdateError::WrongType {
            field,
            expected: FieldKind::Choice,
        }),
    }
}

impl Scenario {
    pub fn field(&self, field: ScenarioField) -> Option<FieldValue> {
        let int = |v: u32| Some(FieldValue::Number(f64::from(v)));
        let num = |v: f64| Some(FieldValue::Number(v));
        let text = |v: &str| Some(FieldValue::Text(v.to_string()));
        match field {
            ScenarioField::CurrentAge => int(self.current_age),
            ScenarioField::MaxAge => int(self.max_age),
            ScenarioField::RetirementAge => int(self.retirement_age),
            ScenarioField::Gender => text(self.gender.as_str()),
            ScenarioField::State => text(self.state.as_str()),
            ScenarioField::FilingStatus => text(self.filing_status.as_str()),
            ScenarioField::InitialCapital => num(self.initial_capital),
            ScenarioField::AnnualSpending => num(self.annual_spending),
            ScenarioField::SocialSecurityMonthly => num(self.social_security_monthly),
            ScenarioField::SocialSecurityStartAge => int(self.social_security_start_age),
            ScenarioField::PensionAnnual => num(self.pension_annual),
            ScenarioField::EmploymentIncome => num(self.employment_income),
            ScenarioField::EmploymentGrowthRate => num(self.employment_growth_rate),
            ScenarioField::StockAllocation => num(self.stock_allocation),
            ScenarioField::ExpectedReturn => num(self.expected_return),
            ScenarioField::ReturnVolatility => num(self.return_volatility),
            ScenarioField::DividendYield => num(self.dividend_yield),
            ScenarioField::NSimulations => int(self.n_simulations),
            ScenarioField::IncludeMortality => Some(FieldValue::Bool(self.include_mortality)),
            ScenarioField::HomeValue => num(self.home_value),
            ScenarioField::Spouse(f) => {
                let spouse = self.spouse.as_ref()?;
                match f {
                    SpouseField::Age => int(spouse.age),
                    SpouseField::Gender => text(spouse.gender.as_str()),
                    SpouseField::SocialSecurityMonthly => num(spouse.social_security_monthly),
                    SpouseField::SocialSecurityStartAge => int(spouse.social_security_start_age),
                    SpouseField::PensionAnnual => num(spouse.pension_annual),
                    SpouseField::EmploymentIncome => num(spouse.employment_income),
                    SpouseField::EmploymentGrowthRate => num(spouse.employment_growth_rate),
                    SpouseField::RetirementAge => int(spouse.retirement_age),
                }
            }
            ScenarioField::Annuity(f) => {
                let annuity = self.annuity.as_ref()?;
                match f {
                    AnnuityField::MonthlyPayment => num(annuity.monthly_payment),
                    AnnuityField::AnnuityType => text(annuity.annuity_type.as_str()),
                    AnnuityField::GuaranteeYears => int(annuity.guarantee_years),
                }
            }
        }
    }

    pub fn set_field(
        &mut self,
        field: ScenarioField,
        value: FieldValue,
    ) -> Result<(), FieldUpdateError> {
        match field {
            ScenarioField::CurrentAge => self.current_age = integer(field, value)?,
            ScenarioField::MaxAge => self.max_age = integer(field, value)?,
            ScenarioField::RetirementAge => self.retirement_age = integer(field, value)?,
            ScenarioField::Gender => self.gender = choice(field, value)?,
            ScenarioField::State => match value {
                FieldValue::Text(s) => self.state = s.trim().to_ascii_uppercase(),
                _ => {
                    return Err(FieldUpdateError::WrongType {
                        field,
                        expected: FieldKind::Choice,
                    });
                }
            },
            ScenarioField::FilingStatus => self.filing_status = choice(field, value)?,
            ScenarioField::InitialCapital => self.initial_capital = number(field, value)?,
            ScenarioField::AnnualSpending => self.annual_spending = number(field, value)?,
            ScenarioField::SocialSecurityMonthly => {
                self.social_security_monthly = number(field, value)?
            }
            ScenarioField::SocialSecurityStartAge => {
                self.social_security_start_age = integer(field, value)?
            }
            ScenarioField::PensionAnnual => self.pension_annual = number(field, value)?,
            ScenarioField::EmploymentIncome => self.employment_income = number(field, value)?,
            ScenarioField::EmploymentGrowthRate => {
                self.employment_growth_rate = number(field, value)?
            }
            ScenarioField::StockAllocation => self.stock_allocation = number(field, value)?,
            ScenarioField::ExpectedReturn => self.expected_return = number(field, value)?,
            ScenarioField::ReturnVolatility => self.return_volatility = number(field, value)?,
            ScenarioField::DividendYield => self.dividend_yield = number(field, value)?,
            ScenarioField::NSimulations => self.n_simulations = integer(field, value)?,
            ScenarioField::IncludeMortality => self.include_mortality = flag(field, value)?,
            ScenarioField::HomeValue => self.home_value = number(field, value)?,
            ScenarioField::Spouse(f) => {
                let spouse = self
                    .spouse
                    .as_mut()
                    .ok_or(FieldUpdateError::SpouseDisabled(field))?;
                set_spouse_field(spouse, field, f, value)?;
            }
            ScenarioField::Annuity(f) => {
                let annuity = self
                    .annuity
                    .as_mut()
                    .ok_or(FieldUpdateError::AnnuityDisabled(field))?;
                set_annuity_field(annuity, field, f, value)?;
            }
        }
        Ok(())
    }

    pub fn set_field_by_name(
        &mut self,
        name: &str,
        value: FieldValue,
    ) -> Result<(), FieldUpdateError> {
        let field: ScenarioField = name.parse()?;
        self.set_field(field, value)
    }
}

fn set_spouse_field(
    spouse: &mut SpouseInput,
    field: ScenarioField,
    which: SpouseField,
    value: FieldValue,
) -> Result<(), FieldUpdateError> {
    match which {
        SpouseField::Age => spouse.age = integer(field, value)?,
        SpouseField::Gender => spouse.gender = choice(field, value)?,
        SpouseField::SocialSecurityMonthly => spouse.social_security_monthly = number(field, value)?,
        SpouseField::SocialSecurityStartAge => {
            spouse.social_security_start_age = integer(field, value)?
        }
        SpouseField::PensionAnnual => spouse.pension_annual = number(field, value)?,
        SpouseField::EmploymentIncome => spouse.employment_income = number(field, value)?,
        SpouseField::EmploymentGrowthRate => spouse.employment_growth_rate = number(field, value)?,
        SpouseField::RetirementAge => spouse.retirement_age = integer(field, value)?,
    }
    Ok(())
}

fn set_annuity_field(
    annuity: &mut AnnuityInput,
    field: ScenarioField,
    which: AnnuityField,
    value: FieldValue,
) -> Result<(), FieldUpdateError> {
    match which {
        AnnuityField::MonthlyPayment => annuity.monthly_payment = number(field, value)?,
        AnnuityField::AnnuityType => annuity.annuity_type = choice(field, value)?,
        AnnuityField::GuaranteeYears => annuity.guarantee_years = integer(field, value)?,
    }
    Ok(())
}
