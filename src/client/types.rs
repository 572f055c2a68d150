use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::scenario::{FilingStatus, Holding, Scenario, WithdrawalStrategy};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationRequest {
    #[serde(flatten)]
    pub scenario: Scenario,
    pub has_spouse: bool,
    pub has_annuity: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holdings: Option<Vec<Holding>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdrawal_strategy: Option<WithdrawalStrategy>,
}

impl SimulationRequest {
    pub fn simple(scenario: &Scenario) -> Self {
        Self {
            has_spouse: scenario.has_spouse(),
            has_annuity: scenario.has_annuity(),
            scenario: scenario.clone(),
            holdings: None,
            withdrawal_strategy: None,
        }
    }

    pub fn detailed(
        scenario: &Scenario,
        holdings: &[Holding],
        withdrawal_strategy: WithdrawalStrategy,
    ) -> Self {
        let mut request = Self::simple(scenario);
        request.scenario.initial_capital = holdings.iter().map(|h| h.balance).sum();
        request.holdings = Some(holdings.to_vec());
        request.withdrawal_strategy = Some(withdrawal_strategy);
        request
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YearBreakdown {
    pub age: u32,
    pub year_index: u32,
    pub portfolio_start: f64,
    pub portfolio_end: f64,
    pub portfolio_return: f64,
    pub employment_income: f64,
    pub social_security: f64,
    pub pension: f64,
    pub dividends: f64,
    pub annuity: f64,
    pub total_income: f64,
    pub withdrawal: f64,
    pub federal_tax: f64,
    pub state_tax: f64,
    pub total_tax: f64,
    pub effective_tax_rate: f64,
    pub net_income: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub success_rate: f64,
    pub median_final_value: f64,
    pub mean_final_value: f64,
    pub percentiles: Percentiles,
    #[serde(default)]
    pub median_depletion_age: Option<u32>,
    #[serde(default)]
    pub median_depletion_year: Option<f64>,
    pub total_withdrawn_median: f64,
    pub total_taxes_median: f64,
    #[serde(default)]
    pub percentile_paths: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub year_breakdown: Vec<YearBreakdown>,
    #[serde(default)]
    pub initial_withdrawal_rate: f64,
    #[serde(default)]
    pub prob_10_year_failure: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub year: u32,
    pub total_years: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Progress(Progress),
    Complete { result: Box<SimulationResult> },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateComparisonRequest {
    pub base_input: SimulationRequest,
    pub compare_states: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResultRow {
    pub state: String,
    pub success_rate: f64,
    pub median_final_value: f64,
    pub total_taxes_median: f64,
    #[serde(default)]
    pub total_withdrawn_median: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateComparisonResult {
    pub base_state: String,
    pub results: Vec<StateResultRow>,
    #[serde(default)]
    pub tax_savings_vs_base: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SsTimingRequest {
    pub base_input: SimulationRequest,
    pub birth_year: i32,
    pub pia_monthly: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claiming_ages: Option<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SsTimingRow {
    pub claiming_age: u32,
    pub monthly_benefit: f64,
    pub success_rate: f64,
    pub median_final_value: f64,
    #[serde(default)]
    pub total_benefits_median: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SsTimingComparisonResult {
    pub birth_year: i32,
    pub pia_monthly: f64,
    pub results: Vec<SsTimingRow>,
    pub optimal_age_for_expected_value: u32,
    pub optimal_age_for_longevity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationRequest {
    pub base_input: SimulationRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocations: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRow {
    pub stock_allocation: f64,
    pub success_rate: f64,
    pub median_final_value: f64,
    pub p5_final_value: f64,
    pub p95_final_value: f64,
    #[serde(default)]
    pub median_depletion_age: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationComparisonResult {
    pub results: Vec<AllocationRow>,
    pub optimal_for_success: f64,
    pub optimal_for_downside: f64,
    #[serde(default)]
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnuityComparisonRequest {
    pub simulation_input: SimulationRequest,
    pub annuity_monthly_payment: f64,
    pub annuity_guarantee_years: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnuityComparisonResult {
    pub simulation_result: SimulationResult,
    pub annuity_total_guaranteed: f64,
    pub probability_simulation_beats_annuity: f64,
    pub simulation_median_total_income: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseholdMember {
    pub age: u32,
    #[serde(default)]
    pub employment_income: f64,
    #[serde(default)]
    pub social_security: f64,
    #[serde(default)]
    pub pension_income: f64,
    #[serde(default)]
    pub is_dependent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseholdRequest {
    pub year: i32,
    pub state: String,
    pub filing_status: FilingStatus,
    pub members: Vec<HouseholdMember>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HouseholdResult {
    pub net_income: f64,
    pub total_tax: f64,
    pub federal_income_tax: f64,
    pub state_income_tax: f64,
    pub benefits: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifeEventRequest {
    pub event: String,
    pub before: HouseholdRequest,
    pub after: HouseholdRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifeEventResult {
    pub before: HouseholdResult,
    pub after: HouseholdResult,
    pub net_income_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MortalityRates {
    pub ages: Vec<u32>,
    pub rates: Vec<f64>,
    pub survival_curve: Vec<f64>,
}

#[cfg(test)]
pub(crate) fn sample_result(success_rate: f64) -> SimulationResult {
    SimulationResult {
        success_rate,
        median_final_value: 750_000.0,
        mean_final_value: 820_000.0,
        percentiles: Percentiles {
            p5: 0.0,
            p25: 310_000.0,
            p50: 750_000.0,
            p75: 1_200_000.0,
            p95: 2_100_000.0,
        },
        median_depletion_age: None,
        median_depletion_year: None,
        total_withdrawn_median: 1_400_000.0,
        total_taxes_median: 180_000.0,
        percentile_paths: BTreeMap::new(),
        year_breakdown: Vec::new(),
        initial_withdrawal_rate: 0.04,
        prob_10_year_failure: 0.01,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{AccountType, Fund};

    #[test]
    fn simple_request_flattens_scenario_fields() {
        let request = SimulationRequest::simple(&Scenario::default());
        let json = serde_json::to_value(&request).expect("request should serialize");
        assert_eq!(json["current_age"], 65);
        assert_eq!(json["state"], "CA");
        assert_eq!(json["has_spouse"], false);
        assert!(json.get("holdings").is_none());
        assert!(json.get("withdrawal_strategy").is_none());
    }

    #[test]
    fn detailed_request_sums_holdings_into_capital() {
        let holdings = vec![
            Holding {
                account_type: AccountType::Traditional401k,
                fund: Fund::Vt,
                balance: 600_000.0,
            },
            Holding {
                account_type: AccountType::RothIra,
                fund: Fund::Bnd,
                balance: 200_000.0,
            },
        ];
        let request = SimulationRequest::detailed(
            &Scenario::default(),
            &holdings,
            WithdrawalStrategy::RothFirst,
        );
        let json = serde_json::to_value(&request).expect("request should serialize");
        assert_eq!(json["initial_capital"], 800_000.0);
        assert_eq!(json["withdrawal_strategy"], "roth_first");
        assert_eq!(json["holdings"][0]["account_type"], "traditional_401k");
    }

    #[test]
    fn stream_events_are_tagged_by_type() {
        let progress: StreamEvent =
            serde_json::from_str(r#"{"type":"progress","year":3,"total_years":30}"#)
                .expect("progress event");
        assert_eq!(
            progress,
            StreamEvent::Progress(Progress {
                year: 3,
                total_years: 30
            })
        );

        let body = serde_json::json!({"type": "complete", "result": sample_result(0.9)});
        let complete: StreamEvent = serde_json::from_value(body).expect("complete event");
        assert!(matches!(complete, StreamEvent::Complete { result } if result.success_rate == 0.9));
    }
}
