mod fields;
mod patch;
mod types;

pub use fields::{AnnuityField, FieldKind, FieldUpdateError, FieldValue, ScenarioField, SpouseField};
pub use patch::ScenarioPatch;
pub use types::{
    AccountType, AnnuityInput, AnnuityType, FilingStatus, Fund, Gender, Holding,
    NO_INCOME_TAX_STATES, ParseChoiceError, PortfolioMode, STATE_CODES, Scenario, SpouseInput,
    WithdrawalStrategy, is_valid_state,
};
