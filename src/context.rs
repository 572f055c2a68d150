use std::sync::{Arc, Mutex, PoisonError};

use crate::client::{ApiError, SimulationRequest, SimulationResult};
use crate::scenario::{
    AnnuityInput, FieldUpdateError, FieldValue, Holding, PortfolioMode, Scenario, ScenarioField,
    ScenarioPatch, SpouseInput, WithdrawalStrategy,
};

#[derive(Debug, Clone, Default)]
pub struct ScenarioContext {
    scenario: Scenario,
    stashed_spouse: Option<SpouseInput>,
    stashed_annuity: Option<AnnuityInput>,
}

impl ScenarioContext {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            stashed_spouse: None,
            stashed_annuity: None,
        }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn replace(&mut self, scenario: Scenario) {
        self.scenario = scenario;
        self.stashed_spouse = None;
        self.stashed_annuity = None;
    }

    pub fn update_field(
        &mut self,
        field: ScenarioField,
        value: FieldValue,
    ) -> Result<(), FieldUpdateError> {
        self.scenario.set_field(field, value)
    }

    pub fn update_field_by_name(
        &mut self,
        name: &str,
        value: FieldValue,
    ) -> Result<(), FieldUpdateError> {
        self.scenario.set_field_by_name(name, value)
    }

    pub fn set_spouse_enabled(&mut self, enabled: bool) {
        if enabled {
            if self.scenario.spouse.is_none() {
                self.scenario.spouse = Some(self.stashed_spouse.take().unwrap_or_default());
            }
        } else if let Some(spouse) = self.scenario.spouse.take() {
            self.stashed_spouse = Some(spouse);
        }
    }

    pub fn set_annuity_enabled(&mut self, enabled: bool) {
        if enabled {
            if self.scenario.annuity.is_none() {
                self.scenario.annuity = Some(self.stashed_annuity.take().unwrap_or_default());
            }
        } else if let Some(annuity) = self.scenario.annuity.take() {
            self.stashed_annuity = Some(annuity);
        }
    }

    pub fn apply_patch(&mut self, patch: &ScenarioPatch) {
        patch.apply_to(&mut self.scenario);
    }
}

#[derive(Debug, Clone, Default)]
pub struct PortfolioContext {
    mode: PortfolioMode,
    holdings: Vec<Holding>,
    withdrawal_strategy: WithdrawalStrategy,
}

impl PortfolioContext {
    pub fn detailed(holdings: Vec<Holding>, withdrawal_strategy: WithdrawalStrategy) -> Self {
        Self {
            mode: PortfolioMode::Detailed,
            holdings,
            withdrawal_strategy,
        }
    }

    pub fn mode(&self) -> PortfolioMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PortfolioMode) {
        self.mode = mode;
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn set_holdings(&mut self, holdings: Vec<Holding>) {
        self.holdings = holdings;
    }

    pub fn add_holding(&mut self, holding: Holding) {
        self.holdings.push(holding);
    }

    pub fn remove_holding(&mut self, index: usize) -> Option<Holding> {
        (index < self.holdings.len()).then(|| self.holdings.remove(index))
    }

    pub fn withdrawal_strategy(&self) -> WithdrawalStrategy {
        self.withdrawal_strategy
    }

    pub fn set_withdrawal_strategy(&mut self, strategy: WithdrawalStrategy) {
        self.withdrawal_strategy = strategy;
    }

    pub fn holdings_for_validation(&self) -> Option<&[Holding]> {
        match self.mode {
            PortfolioMode::Simple => None,
            PortfolioMode::Detailed => Some(self.holdings.as_slice()),
        }
    }

    pub fn request_for(&self, scenario: &Scenario) -> SimulationRequest {
        match self.mode {
            PortfolioMode::Simple => SimulationRequest::simple(scenario),
            PortfolioMode::Detailed => {
                SimulationRequest::detailed(scenario, &self.holdings, self.withdrawal_strategy)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorSink {
    slot: Arc<Mutex<Option<ApiError>>>,
}

impl ErrorSink {
    pub fn report(&self, error: ApiError) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    pub fn clear(&self) {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn current(&self) -> Option<ApiError> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulationContext {
    base_result: Option<SimulationResult>,
    errors: ErrorSink,
}

impl SimulationContext {
    pub fn new(errors: ErrorSink) -> Self {
        Self {
            base_result: None,
            errors,
        }
    }

    pub fn base_result(&self) -> Option<&SimulationResult> {
        self.base_result.as_ref()
    }

    pub fn has_base_result(&self) -> bool {
        self.base_result.is_some()
    }

    pub fn record_result(&mut self, result: SimulationResult) {
        self.base_result = Some(result);
    }

    pub fn clear_result(&mut self) {
        self.base_result = None;
    }

    pub fn errors(&self) -> &ErrorSink {
        &self.errors
    }
}
