use axum::routing::post;
use axum::{Json, Router};
use nestplan::client::HttpComputeClient;
use nestplan::codec::{decode_query, encode_query};
use nestplan::compare::{ComparisonBasis, ComparisonOrchestrator, ComparisonRejected, Dispatch};
use nestplan::context::{ErrorSink, PortfolioContext, ScenarioContext, SimulationContext};
use nestplan::scenario::{AccountType, Fund, Holding, PortfolioMode, Scenario, WithdrawalStrategy};
use nestplan::store::{FileMedium, ScenarioStore};
use nestplan::wizard::{Advance, Completion, Step, WizardController};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

async fn simulate(Json(body): Json<Value>) -> Json<Value> {
    let capital = body["initial_capital"].as_f64().unwrap_or_default();
    Json(json!({
        "success_rate": 0.91,
        "median_final_value": capital * 2.0,
        "mean_final_value": capital * 1.6,
        "percentiles": {"p5": 0.0, "p25": capital, "p50": capital * 2.0, "p75": capital * 2.0, "p95": capital * 3.5},
        "total_withdrawn_median": 1_600_000.0,
        "total_taxes_median": 190_000.0
    }))
}

async fn compare_states(Json(body): Json<Value>) -> Json<Value> {
    let base_state = body["base_input"]["state"].as_str().unwrap_or_default().to_string();
    let mut states = vec![base_state.clone()];
    if let Some(targets) = body["compare_states"].as_array() {
        states.extend(targets.iter().filter_map(Value::as_str).map(str::to_string));
    }
    let results: Vec<Value> = states
        .iter()
        .map(|state| {
            json!({
                "state": state,
                "success_rate": 0.9,
                "median_final_value": 700_000.0,
                "total_taxes_median": if *state == base_state { 190_000.0 } else { 120_000.0 }
            })
        })
        .collect();
    Json(json!({"base_state": base_state, "results": results}))
}

async fn spawn_stub() -> String {
    let app = Router::new()
        .route("/simulate", post(simulate))
        .route("/compare-states", post(compare_states));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = listener.local_addr().expect("stub address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });
    format!("http://{addr}")
}

fn walk_to_review(
    wizard: &mut WizardController,
    scenario: &Scenario,
    portfolio: &PortfolioContext,
) {
    while wizard.current() != Step::Review {
        match wizard.advance(scenario, portfolio) {
            Advance::Moved(_) => {}
            other => panic!("wizard stopped at {}: {other:?}", wizard.current()),
        }
    }
}

#[test]
fn shared_default_scenario_decodes_with_defaults() {
    let decoded = decode_query(&encode_query(&Scenario::default()));
    assert_eq!(decoded.current_age, 65);
    assert_eq!(decoded.state, "CA");
    assert_eq!(decoded, Scenario::default());
}

#[test]
fn valid_first_step_advances() {
    let mut wizard = WizardController::new();
    let outcome = wizard.advance(&Scenario::default(), &PortfolioContext::default());
    assert_eq!(outcome, Advance::Moved(Step::YourMoney));
    assert_eq!(wizard.index(), 1);
}

#[test]
fn underage_scenario_is_blocked_on_the_first_step() {
    let scenario = Scenario {
        current_age: 17,
        ..Scenario::default()
    };
    let mut wizard = WizardController::new();
    let Advance::Blocked(errors) = wizard.advance(&scenario, &PortfolioContext::default()) else {
        panic!("advance should be blocked");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "current_age");
    assert_eq!(wizard.current(), Step::AboutYou);
}

#[tokio::test]
async fn comparing_before_a_base_result_is_rejected() {
    let client = HttpComputeClient::new("http://127.0.0.1:9", Duration::from_secs(1))
        .expect("client should build");
    let errors = ErrorSink::default();
    let orchestrator = ComparisonOrchestrator::new(Arc::new(client), errors.clone());
    let scenario = Scenario::default();
    let portfolio = PortfolioContext::default();
    let simulation = SimulationContext::new(errors.clone());

    let basis = ComparisonBasis {
        scenario: &scenario,
        portfolio: &portfolio,
        simulation: &simulation,
    };
    let rejected = orchestrator
        .compare_states(basis, None)
        .await
        .expect_err("no base result yet");
    assert_eq!(rejected, ComparisonRejected::NoBaseResult);
    assert!(errors.current().is_none());
}

#[tokio::test]
async fn full_session_simulates_compares_and_saves() {
    let base = spawn_stub().await;
    let client = Arc::new(
        HttpComputeClient::new(&base, Duration::from_secs(5)).expect("client should build"),
    );
    let errors = ErrorSink::default();
    let mut simulation = SimulationContext::new(errors.clone());
    let orchestrator = ComparisonOrchestrator::new(client.clone(), errors.clone());

    let mut context = ScenarioContext::new(decode_query("age=60&st=NY&exp=72000"));
    context.set_spouse_enabled(true);
    let portfolio = PortfolioContext::detailed(
        vec![
            Holding {
                account_type: AccountType::Traditional401k,
                fund: Fund::Vt,
                balance: 700_000.0,
            },
            Holding {
                account_type: AccountType::RothIra,
                fund: Fund::Bnd,
                balance: 300_000.0,
            },
        ],
        WithdrawalStrategy::RothFirst,
    );

    let mut wizard = WizardController::new();
    walk_to_review(&mut wizard, context.scenario(), &portfolio);
    let completion = wizard
        .complete(client.as_ref(), context.scenario(), &portfolio, &mut simulation)
        .await;
    assert_eq!(completion, Completion::Succeeded);
    assert!(wizard.is_submitted());
    let base_result = simulation.base_result().expect("base result recorded");
    assert_eq!(base_result.median_final_value, 2_000_000.0);

    let basis = ComparisonBasis {
        scenario: context.scenario(),
        portfolio: &portfolio,
        simulation: &simulation,
    };
    let dispatch = orchestrator
        .compare_states(basis, None)
        .await
        .expect("comparison should be sent");
    let result = match dispatch {
        Dispatch::Applied(result) => result,
        other => panic!("expected an applied comparison, got {other:?}"),
    };
    assert_eq!(result.base_state, "NY");
    let states: Vec<&str> = result.results.iter().map(|r| r.state.as_str()).collect();
    assert_eq!(states, vec!["NY", "AK", "FL", "NV", "NH", "SD"]);
    assert_eq!(orchestrator.state_result(), Some(result));
    assert!(errors.current().is_none());

    let dir = tempfile::tempdir().expect("temp dir");
    let mut store = ScenarioStore::open(FileMedium::new(dir.path()));
    store
        .save("early retirement", context.scenario(), &portfolio)
        .expect("save should persist");

    let reopened = ScenarioStore::open(FileMedium::new(dir.path()));
    let saved = reopened.get("early retirement").expect("saved entry");
    assert_eq!(&saved.scenario, context.scenario());
    assert_eq!(saved.portfolio_mode, PortfolioMode::Detailed);
    assert_eq!(saved.portfolio().holdings(), portfolio.holdings());
    assert_eq!(saved.portfolio().withdrawal_strategy(), WithdrawalStrategy::RothFirst);
}
