use std::fmt;

use crate::client::{ApiError, ComputeClient};
use crate::context::{ErrorSink, PortfolioContext, ScenarioContext, SimulationContext};
use crate::scenario::{Holding, Scenario, ScenarioPatch};
use crate::validation::{ValidationError, validate};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Step {
    AboutYou,
    YourMoney,
    IncomeSources,
    Spouse,
    Annuity,
    Review,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::AboutYou,
        Step::YourMoney,
        Step::IncomeSources,
        Step::Spouse,
        Step::Annuity,
        Step::Review,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Step> {
        Step::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Step::AboutYou => "About you",
            Step::YourMoney => "Your money",
            Step::IncomeSources => "Income sources",
            Step::Spouse => "Spouse",
            Step::Annuity => "Annuity",
            Step::Review => "Review",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            Step::AboutYou => "about-you",
            Step::YourMoney => "your-money",
            Step::IncomeSources => "income-sources",
            Step::Spouse => "spouse",
            Step::Annuity => "annuity",
            Step::Review => "review",
        }
    }

    pub fn covers(self, path: &str) -> bool {
        match self {
            Step::AboutYou => matches!(
                path,
                "current_age" | "max_age" | "gender" | "state" | "filing_status"
            ),
            Step::YourMoney => {
                path.starts_with("holdings")
                    || matches!(
                        path,
                        "initial_capital"
                            | "annual_spending"
                            | "stock_allocation"
                            | "expected_return"
                            | "return_volatility"
                            | "dividend_yield"
                            | "home_value"
                            | "n_simulations"
                    )
            }
            Step::IncomeSources => {
                path.starts_with("social_security_")
                    || path.starts_with("employment_")
                    || matches!(path, "pension_annual" | "retirement_age")
            }
            Step::Spouse => path.starts_with("spouse."),
            Step::Annuity => path.starts_with("annuity."),
            Step::Review => true,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

pub fn step_errors(
    step: Step,
    scenario: &Scenario,
    holdings: Option<&[Holding]>,
) -> Vec<ValidationError> {
    validate(scenario, holdings)
        .into_iter()
        .filter(|e| step.covers(&e.field))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Moved(Step),
    Blocked(Vec<ValidationError>),
    AtEnd,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Succeeded,
    Failed(ApiError),
    Blocked(Vec<ValidationError>),
    NotAtReview(Step),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("step {requested} is not reachable yet (furthest reachable is {reachable})")]
pub struct JumpRejected {
    pub requested: usize,
    pub reachable: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepInfo {
    pub step: Step,
    pub index: usize,
    pub label: &'static str,
    pub completed: bool,
    pub current: bool,
}

#[derive(Debug, Clone)]
pub struct WizardController {
    current: Step,
    highest_completed: Option<Step>,
    submitted: bool,
}

impl Default for WizardController {
    fn default() -> Self {
        Self::new()
    }
}

impl WizardController {
    pub fn new() -> Self {
        Self {
            current: Step::AboutYou,
            highest_completed: None,
            submitted: false,
        }
    }

    pub fn current(&self) -> Step {
        self.current
    }

    pub fn index(&self) -> usize {
        self.current.index()
    }

    pub fn step_count(&self) -> usize {
        Step::ALL.len()
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub fn is_completed(&self, step: Step) -> bool {
        self.highest_completed.is_some_and(|h| step <= h)
    }

    pub fn steps(&self) -> Vec<StepInfo> {
        Step::ALL
            .iter()
            .map(|&step| StepInfo {
                step,
                index: step.index(),
                label: step.label(),
                completed: self.is_completed(step),
                current: step == self.current,
            })
            .collect()
    }

    fn reachable(&self) -> usize {
        self.highest_completed
            .map_or(0, |h| h.index() + 1)
            .min(Step::ALL.len() - 1)
    }

    fn mark_completed(&mut self, step: Step) {
        if self.highest_completed.is_none_or(|h| step > h) {
            self.highest_completed = Some(step);
        }
    }

    pub fn advance(&mut self, scenario: &Scenario, portfolio: &PortfolioContext) -> Advance {
        if self.submitted {
            return Advance::AtEnd;
        }
        let Some(next) = Step::from_index(self.current.index() + 1) else {
            return Advance::AtEnd;
        };
        let errors = step_errors(self.current, scenario, portfolio.holdings_for_validation());
        if !errors.is_empty() {
            tracing::debug!(step = %self.current, errors = errors.len(), "advance blocked");
            return Advance::Blocked(errors);
        }
        self.mark_completed(self.current);
        tracing::debug!(from = %self.current, to = %next, "wizard advanced");
        self.current = next;
        Advance::Moved(next)
    }

    pub fn retreat(&mut self) -> Step {
        if !self.submitted {
            if let Some(prev) = self.current.index().checked_sub(1).and_then(Step::from_index) {
                self.current = prev;
            }
        }
        self.current
    }

    pub fn jump_to(&mut self, index: usize) -> Result<Step, JumpRejected> {
        let reachable = self.reachable();
        match Step::from_index(index) {
            Some(step) if index <= reachable && !self.submitted => {
                self.current = step;
                Ok(step)
            }
            _ => Err(JumpRejected {
                requested: index,
                reachable,
            }),
        }
    }

    pub async fn complete(
        &mut self,
        client: &dyn ComputeClient,
        scenario: &Scenario,
        portfolio: &PortfolioContext,
        simulation: &mut SimulationContext,
    ) -> Completion {
        if self.current != Step::Review {
            return Completion::NotAtReview(self.current);
        }
        let errors = validate(scenario, portfolio.holdings_for_validation());
        if !errors.is_empty() {
            return Completion::Blocked(errors);
        }
        self.mark_completed(Step::Review);
        self.submit(client, scenario, portfolio, simulation).await
    }

    pub async fn retry(
        &mut self,
        client: &dyn ComputeClient,
        scenario: &Scenario,
        portfolio: &PortfolioContext,
        simulation: &mut SimulationContext,
    ) -> Completion {
        if !self.submitted {
            return self.complete(client, scenario, portfolio, simulation).await;
        }
        let errors = validate(scenario, portfolio.holdings_for_validation());
        if !errors.is_empty() {
            return Completion::Blocked(errors);
        }
        self.submit(client, scenario, portfolio, simulation).await
    }

    async fn submit(
        &mut self,
        client: &dyn ComputeClient,
        scenario: &Scenario,
        portfolio: &PortfolioContext,
        simulation: &mut SimulationContext,
    ) -> Completion {
        simulation.errors().clear();
        let request = portfolio.request_for(scenario);
        let outcome = client.simulate(&request).await;
        self.submitted = true;
        match outcome {
            Ok(result) => {
                tracing::info!(success_rate = result.success_rate, "simulation completed");
                simulation.record_result(result);
                Completion::Succeeded
            }
            Err(err) => {
                tracing::warn!(error = %err, "simulation failed");
                simulation.errors().report(err.clone());
                Completion::Failed(err)
            }
        }
    }

    pub fn edit_inputs(&mut self, errors: &ErrorSink) -> Step {
        self.submitted = false;
        errors.clear();
        self.current
    }

    pub fn apply_what_if(
        &mut self,
        scenario: &mut ScenarioContext,
        patch: &ScenarioPatch,
        errors: &ErrorSink,
    ) -> Step {
        scenario.apply_patch(patch);
        self.edit_inputs(errors)
    }
}
