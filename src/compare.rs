use chrono::{Datelike, Utc};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::client::{
    AllocationComparisonResult, AllocationRequest, ApiError, ComputeClient, SimulationRequest,
    SsTimingComparisonResult, SsTimingRequest, StateComparisonRequest, StateComparisonResult,
};
use crate::context::{ErrorSink, PortfolioContext, SimulationContext};
use crate::scenario::{NO_INCOME_TAX_STATES, Scenario, is_valid_state};
use crate::validation::{MAX_CLAIMING_AGE, MIN_CLAIMING_AGE, ValidationError, validate};

pub const MAX_COMPARE_STATES: usize = 5;
pub const ALLOCATION_SWEEP: [f64; 6] = [0.0, 0.2, 0.4, 0.6, 0.8, 1.0];

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ComparisonKind {
    States,
    SsTiming,
    Allocations,
}

impl fmt::Display for ComparisonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonKind::States => f.write_str("state comparison"),
            ComparisonKind::SsTiming => f.write_str("claiming-age comparison"),
            ComparisonKind::Allocations => f.write_str("allocation comparison"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComparisonRejected {
    #[error("{0} is already running")]
    Busy(ComparisonKind),
    #[error("run the base simulation before comparing")]
    NoBaseResult,
    #[error("scenario has {} validation error(s)", .0.len())]
    Invalid(Vec<ValidationError>),
    #[error("{0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch<T> {
    Applied(T),
    Discarded,
    Failed(ApiError),
}

#[derive(Clone, Copy)]
pub struct ComparisonBasis<'a> {
    pub scenario: &'a Scenario,
    pub portfolio: &'a PortfolioContext,
    pub simulation: &'a SimulationContext,
}

impl ComparisonBasis<'_> {
    fn base_request(&self) -> Result<SimulationRequest, ComparisonRejected> {
        if !self.simulation.has_base_result() {
            return Err(ComparisonRejected::NoBaseResult);
        }
        let errors = validate(self.scenario, self.portfolio.holdings_for_validation());
        if !errors.is_empty() {
            return Err(ComparisonRejected::Invalid(errors));
        }
        Ok(self.portfolio.request_for(self.scenario))
    }
}

struct SlotState<T> {
    busy: bool,
    generation: u64,
    result: Option<T>,
}

struct Slot<T> {
    state: Mutex<SlotState<T>>,
}

impl<T: Clone> Slot<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                busy: false,
                generation: 0,
                result: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, kind: ComparisonKind) -> Result<(u64, BusyGuard<'_, T>), ComparisonRejected> {
        let mut state = self.lock();
        if state.busy {
            return Err(ComparisonRejected::Busy(kind));
        }
        state.busy = true;
        Ok((state.generation, BusyGuard { slot: self }))
    }

    fn settle(
        &self,
        kind: ComparisonKind,
        generation: u64,
        outcome: Result<T, ApiError>,
        errors: &ErrorSink,
    ) -> Dispatch<T> {
        let mut state = self.lock();
        if state.generation != generation {
            tracing::debug!(%kind, generation, current = state.generation, "discarding stale response");
            return Dispatch::Discarded;
        }
        match outcome {
            Ok(result) => {
                tracing::info!(%kind, "comparison applied");
                state.result = Some(result.clone());
                Dispatch::Applied(result)
            }
            Err(err) => {
                tracing::warn!(%kind, error = %err, "comparison failed");
                errors.report(err.clone());
                Dispatch::Failed(err)
            }
        }
    }

    fn reset(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.result = None;
    }

    fn result(&self) -> Option<T> {
        self.lock().result.clone()
    }

    fn is_busy(&self) -> bool {
        self.lock().busy
    }
}

/// Releases the busy flag when the in-flight call ends, even if its future is dropped.
struct BusyGuard<'a, T> {
    slot: &'a Slot<T>,
}

impl<T> Drop for BusyGuard<'_, T> {
    fn drop(&mut self) {
        self.slot
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .busy = false;
    }
}

pub struct ComparisonOrchestrator {
    client: Arc<dyn ComputeClient>,
    errors: ErrorSink,
    states: Slot<StateComparisonResult>,
    ss_timing: Slot<SsTimingComparisonResult>,
    allocations: Slot<AllocationComparisonResult>,
}

impl ComparisonOrchestrator {
    pub fn new(client: Arc<dyn ComputeClient>, errors: ErrorSink) -> Self {
        Self {
            client,
            errors,
            states: Slot::new(),
            ss_timing: Slot::new(),
            allocations: Slot::new(),
        }
    }

    async fn run<T, F>(
        &self,
        kind: ComparisonKind,
        slot: &Slot<T>,
        call: F,
    ) -> Result<Dispatch<T>, ComparisonRejected>
    where
        T: Clone,
        F: Future<Output = Result<T, ApiError>>,
    {
        let (generation, _busy) = slot.begin(kind)?;
        tracing::debug!(%kind, generation, "comparison started");
        let outcome = call.await;
        Ok(slot.settle(kind, generation, outcome, &self.errors))
    }

    pub async fn compare_states(
        &self,
        basis: ComparisonBasis<'_>,
        targets: Option<&[String]>,
    ) -> Result<Dispatch<StateComparisonResult>, ComparisonRejected> {
        let base_input = basis.base_request()?;
        let compare_states = resolve_state_targets(&basis.scenario.state, targets)?;
        let request = StateComparisonRequest {
            base_input,
            compare_states,
        };
        self.run(
            ComparisonKind::States,
            &self.states,
            self.client.compare_states(&request),
        )
        .await
    }

    pub async fn compare_ss_timing(
        &self,
        basis: ComparisonBasis<'_>,
        birth_year: Option<i32>,
        pia_monthly: Option<f64>,
    ) -> Result<Dispatch<SsTimingComparisonResult>, ComparisonRejected> {
        let base_input = basis.base_request()?;
        let birth_year = birth_year.unwrap_or_else(|| {
            let age = i32::try_from(basis.scenario.current_age).unwrap_or(i32::MAX);
            Utc::now().year().saturating_sub(age)
        });
        let pia_monthly = pia_monthly.unwrap_or(basis.scenario.social_security_monthly);
        if !(pia_monthly.is_finite() && pia_monthly > 0.0) {
            return Err(ComparisonRejected::InvalidRequest(
                "monthly benefit at full retirement age must be greater than 0".to_string(),
            ));
        }
        let request = SsTimingRequest {
            base_input,
            birth_year,
            pia_monthly,
            claiming_ages: Some((MIN_CLAIMING_AGE..=MAX_CLAIMING_AGE).collect()),
        };
        self.run(
            ComparisonKind::SsTiming,
            &self.ss_timing,
            self.client.compare_ss_timing(&request),
        )
        .await
    }

    pub async fn compare_allocations(
        &self,
        basis: ComparisonBasis<'_>,
    ) -> Result<Dispatch<AllocationComparisonResult>, ComparisonRejected> {
        let request = AllocationRequest {
            base_input: basis.base_request()?,
            allocations: Some(ALLOCATION_SWEEP.to_vec()),
        };
        self.run(
            ComparisonKind::Allocations,
            &self.allocations,
            self.client.compare_allocations(&request),
        )
        .await
    }

    pub fn reset(&self, kind: ComparisonKind) {
        match kind {
            ComparisonKind::States => self.states.reset(),
            ComparisonKind::SsTiming => self.ss_timing.reset(),
            ComparisonKind::Allocations => self.allocations.reset(),
        }
    }

    pub fn is_busy(&self, kind: ComparisonKind) -> bool {
        match kind {
            ComparisonKind::States => self.states.is_busy(),
            ComparisonKind::SsTiming => self.ss_timing.is_busy(),
            ComparisonKind::Allocations => self.allocations.is_busy(),
        }
    }

    pub fn state_result(&self) -> Option<StateComparisonResult> {
        self.states.result()
    }

    pub fn ss_timing_result(&self) -> Option<SsTimingComparisonResult> {
        self.ss_timing.result()
    }

    pub fn allocation_result(&self) -> Option<AllocationComparisonResult> {
        self.allocations.result()
    }
}

pub fn default_state_targets(base_state: &str) -> Vec<String> {
    NO_INCOME_TAX_STATES
        .iter()
        .filter(|code| **code != base_state)
        .take(MAX_COMPARE_STATES)
        .map(|code| code.to_string())
        .collect()
}

fn resolve_state_targets(
    base_state: &str,
    requested: Option<&[String]>,
) -> Result<Vec<String>, ComparisonRejected> {
    let Some(requested) = requested.filter(|r| !r.is_empty()) else {
        return Ok(default_state_targets(base_state));
    };
    let mut targets: Vec<String> = Vec::with_capacity(requested.len());
    for code in requested {
        let code = code.trim().to_ascii_uppercase();
        if !is_valid_state(&code) {
            return Err(ComparisonRejected::InvalidRequest(format!(
                "'{code}' is not a valid state"
            )));
        }
        if !targets.contains(&code) {
            targets.push(code);
        }
    }
    if targets.len() > MAX_COMPARE_STATES {
        return Err(ComparisonRejected::InvalidRequest(format!(
            "at most {MAX_COMPARE_STATES} states can be compared at once"
        )));
    }
    Ok(targets)
}
