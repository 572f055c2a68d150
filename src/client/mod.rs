mod error;
mod http;
mod types;

use async_trait::async_trait;

use crate::scenario::Gender;

pub use error::ApiError;
pub use http::{ClientConfigError, HttpComputeClient, StreamDecoder};
#[cfg(test)]
pub(crate) use types::sample_result;
pub use types::{
    AllocationComparisonResult, AllocationRequest, AllocationRow, AnnuityComparisonRequest,
    AnnuityComparisonResult, HouseholdMember, HouseholdRequest, HouseholdResult,
    LifeEventRequest, LifeEventResult, MortalityRates, Percentiles, Progress, SimulationRequest,
    SimulationResult, SsTimingComparisonResult, SsTimingRequest, SsTimingRow,
    StateComparisonRequest, StateComparisonResult, StateResultRow, StreamEvent, YearBreakdown,
};

#[async_trait]
pub trait ComputeClient: Send + Sync {
    async fn simulate(&self, request: &SimulationRequest) -> Result<SimulationResult, ApiError>;

    async fn simulate_streaming(
        &self,
        request: &SimulationRequest,
        on_progress: &mut (dyn FnMut(Progress) + Send),
    ) -> Result<SimulationResult, ApiError>;

    async fn compare_states(
        &self,
        request: &StateComparisonRequest,
    ) -> Result<StateComparisonResult, ApiError>;

    async fn compare_ss_timing(
        &self,
        request: &SsTimingRequest,
    ) -> Result<SsTimingComparisonResult, ApiError>;

    async fn compare_allocations(
        &self,
        request: &AllocationRequest,
    ) -> Result<AllocationComparisonResult, ApiError>;

    async fn compare_annuity(
        &self,
        request: &AnnuityComparisonRequest,
    ) -> Result<AnnuityComparisonResult, ApiError>;

    async fn calculate_household(
        &self,
        request: &HouseholdRequest,
    ) -> Result<HouseholdResult, ApiError>;

    async fn compare_life_event(
        &self,
        request: &LifeEventRequest,
    ) -> Result<LifeEventResult, ApiError>;

    async fn mortality(
        &self,
        gender: Gender,
        start_age: u32,
        end_age: u32,
    ) -> Result<MortalityRates, ApiError>;
}
