use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use crate::client::{AnnuityComparisonRequest, ComputeClient, HttpComputeClient, Progress};
use crate::codec;
use crate::compare::{ComparisonBasis, ComparisonOrchestrator, Dispatch};
use crate::config::Settings;
use crate::context::{PortfolioContext, ScenarioContext, SimulationContext};
use crate::scenario::{
    AccountType, FieldValue, Fund, Gender, Holding, Scenario, ScenarioField, WithdrawalStrategy,
};
use crate::store::StoreError;
use crate::validation::{
    DEFAULT_GUARANTEE_YEARS, ValidationError, validate, validate_annuity_offer,
};
use crate::wizard::{Advance, Completion, WizardController};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliWithdrawalStrategy {
    TaxableFirst,
    TraditionalFirst,
    RothFirst,
}

impl From<CliWithdrawalStrategy> for WithdrawalStrategy {
    fn from(value: CliWithdrawalStrategy) -> Self {
        match value {
            CliWithdrawalStrategy::TaxableFirst => WithdrawalStrategy::TaxableFirst,
            CliWithdrawalStrategy::TraditionalFirst => WithdrawalStrategy::TraditionalFirst,
            CliWithdrawalStrategy::RothFirst => WithdrawalStrategy::RothFirst,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliGender {
    Male,
    Female,
}

impl From<CliGender> for Gender {
    fn from(value: CliGender) -> Self {
        match value {
            CliGender::Male => Gender::Male,
            CliGender::Female => Gender::Female,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "nestplan",
    about = "Build, validate, compare and save retirement scenarios against a compute service"
)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ScenarioSource {
    #[arg(
        long,
        conflicts_with = "file",
        help = "Share-link query string or full share URL"
    )]
    pub query: Option<String>,
    #[arg(long, help = "Scenario JSON file; missing fields take defaults")]
    pub file: Option<PathBuf>,
    #[arg(
        long = "set",
        value_name = "FIELD=VALUE",
        help = "Override one field by its path, e.g. --set spouse.age=60"
    )]
    pub overrides: Vec<String>,
    #[arg(long, help = "Enable the spouse block")]
    pub spouse: bool,
    #[arg(long, help = "Enable the annuity block")]
    pub annuity: bool,
    #[arg(
        long = "holding",
        value_name = "ACCOUNT:FUND:BALANCE",
        help = "Detailed-mode holding, e.g. roth_ira:vt:150000; repeatable"
    )]
    pub holdings: Vec<String>,
    #[arg(long, value_enum, help = "Withdrawal order for detailed mode")]
    pub withdrawal_strategy: Option<CliWithdrawalStrategy>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(about = "Run every validation rule and print the failures")]
    Validate {
        #[command(flatten)]
        source: ScenarioSource,
    },
    #[command(about = "Print the share query string (or a full URL when --base-url is given)")]
    Encode {
        #[command(flatten)]
        source: ScenarioSource,
        #[arg(long)]
        base_url: Option<String>,
    },
    #[command(about = "Decode a share query string into scenario JSON")]
    Decode { query: String },
    #[command(about = "Walk the wizard and submit the base simulation")]
    Simulate {
        #[command(flatten)]
        source: ScenarioSource,
        #[arg(long, help = "Use the streaming endpoint and report progress")]
        stream: bool,
    },
    #[command(about = "Run a derived comparison after the base simulation")]
    Compare {
        #[command(subcommand)]
        analysis: CompareCommand,
    },
    #[command(about = "Compare the simulated portfolio with buying an annuity")]
    Annuity {
        #[command(flatten)]
        source: ScenarioSource,
        #[arg(long, help = "Monthly annuity payment; defaults to the scenario's annuity")]
        payment: Option<f64>,
        #[arg(long, help = "Guarantee period in years; defaults to 20")]
        guarantee_years: Option<u32>,
    },
    #[command(about = "Fetch mortality rates and the survival curve for an age range")]
    Mortality {
        #[arg(value_enum)]
        gender: CliGender,
        #[arg(long, default_value_t = 65)]
        start_age: u32,
        #[arg(long, default_value_t = 100)]
        end_age: u32,
    },
    #[command(about = "Manage named saved scenarios")]
    Saved {
        #[command(subcommand)]
        action: SavedCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum CompareCommand {
    States {
        #[command(flatten)]
        source: ScenarioSource,
        #[arg(long = "state", help = "Target state code; repeatable, at most 5")]
        states: Vec<String>,
    },
    SsTiming {
        #[command(flatten)]
        source: ScenarioSource,
        #[arg(long)]
        birth_year: Option<i32>,
        #[arg(long, help = "Monthly benefit at full retirement age")]
        pia: Option<f64>,
    },
    Allocations {
        #[command(flatten)]
        source: ScenarioSource,
    },
}

impl CompareCommand {
    fn source(&self) -> &ScenarioSource {
        match self {
            CompareCommand::States { source, .. }
            | CompareCommand::SsTiming { source, .. }
            | CompareCommand::Allocations { source } => source,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum SavedCommand {
    List,
    Save {
        name: String,
        #[command(flatten)]
        source: ScenarioSource,
    },
    Load {
        name: String,
        #[arg(long, help = "Print the share query instead of JSON")]
        query: bool,
    },
    Delete {
        name: String,
    },
}

impl ScenarioSource {
    pub fn load(&self) -> Result<(ScenarioContext, PortfolioContext)> {
        let scenario = match (&self.query, &self.file) {
            (Some(query), _) => {
                let query = query.split_once('?').map_or(query.as_str(), |(_, q)| q);
                codec::decode_query(query)
            }
            (None, Some(path)) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("reading scenario file {}", path.display()))?;
                serde_json::from_str::<Scenario>(&raw)
                    .with_context(|| format!("parsing scenario file {}", path.display()))?
            }
            (None, None) => Scenario::default(),
        };

        let mut ctx = ScenarioContext::new(scenario);
        if self.spouse {
            ctx.set_spouse_enabled(true);
        }
        if self.annuity {
            ctx.set_annuity_enabled(true);
        }
        for item in &self.overrides {
            let (name, raw) = item
                .split_once('=')
                .ok_or_else(|| anyhow!("expected FIELD=VALUE, got '{item}'"))?;
            let field: ScenarioField = name.trim().parse()?;
            let value = codec::coerce(field.kind(), &FieldValue::Text(raw.to_string()))
                .ok_or_else(|| anyhow!("'{raw}' is not a valid value for {field}"))?;
            ctx.update_field(field, value)?;
        }

        let portfolio = if self.holdings.is_empty() {
            PortfolioContext::default()
        } else {
            let holdings = self
                .holdings
                .iter()
                .map(|raw| parse_holding(raw))
                .collect::<Result<Vec<_>>>()?;
            let strategy = self
                .withdrawal_strategy
                .map(WithdrawalStrategy::from)
                .unwrap_or_default();
            PortfolioContext::detailed(holdings, strategy)
        };
        Ok((ctx, portfolio))
    }
}

fn parse_holding(raw: &str) -> Result<Holding> {
    let parts: Vec<&str> = raw.split(':').collect();
    let [account, fund, balance] = parts.as_slice() else {
        bail!("expected ACCOUNT:FUND:BALANCE, got '{raw}'");
    };
    Ok(Holding {
        account_type: account.trim().parse::<AccountType>()?,
        fund: fund.trim().parse::<Fund>()?,
        balance: balance
            .trim()
            .parse::<f64>()
            .with_context(|| format!("invalid balance in '{raw}'"))?,
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn invalid(errors: &[ValidationError]) -> anyhow::Error {
    for error in errors {
        eprintln!("  {error}");
    }
    anyhow!("scenario has {} validation error(s)", errors.len())
}

fn applied<T: Serialize>(dispatch: Dispatch<T>) -> Result<()> {
    match dispatch {
        Dispatch::Applied(result) => print_json(&result),
        Dispatch::Discarded => bail!("comparison was reset before it finished"),
        Dispatch::Failed(err) => Err(err.into()),
    }
}

fn annuity_offer(
    scenario: &Scenario,
    portfolio: &PortfolioContext,
    payment: Option<f64>,
    guarantee_years: Option<u32>,
) -> Result<AnnuityComparisonRequest> {
    let mut errors = validate(scenario, portfolio.holdings_for_validation());
    if !errors.is_empty() {
        return Err(invalid(&errors));
    }
    let annuity = scenario.annuity.as_ref();
    let payment = payment
        .or(annuity.map(|a| a.monthly_payment))
        .ok_or_else(|| anyhow!("pass --payment or enable the annuity block"))?;
    let guarantee_years = guarantee_years
        .or(annuity
            .filter(|a| a.annuity_type.uses_guarantee_years())
            .map(|a| a.guarantee_years))
        .unwrap_or(DEFAULT_GUARANTEE_YEARS);
    errors = validate_annuity_offer(payment, guarantee_years);
    if !errors.is_empty() {
        return Err(invalid(&errors));
    }
    Ok(AnnuityComparisonRequest {
        simulation_input: portfolio.request_for(scenario),
        annuity_monthly_payment: payment,
        annuity_guarantee_years: guarantee_years,
    })
}

struct Session {
    scenario: ScenarioContext,
    portfolio: PortfolioContext,
    simulation: SimulationContext,
    wizard: WizardController,
    client: Arc<HttpComputeClient>,
}

impl Session {
    fn start(settings: &Settings, source: &ScenarioSource) -> Result<Self> {
        let (scenario, portfolio) = source.load()?;
        let client = settings
            .client()
            .with_context(|| format!("configuring client for {}", settings.api_url))?;
        Ok(Self {
            scenario,
            portfolio,
            simulation: SimulationContext::default(),
            wizard: WizardController::new(),
            client: Arc::new(client),
        })
    }

    fn walk_to_review(&mut self) -> Result<()> {
        loop {
            match self.wizard.advance(self.scenario.scenario(), &self.portfolio) {
                Advance::Moved(step) => tracing::debug!(%step, "step passed"),
                Advance::Blocked(errors) => return Err(invalid(&errors)),
                Advance::AtEnd => return Ok(()),
            }
        }
    }

    async fn run_base(&mut self) -> Result<()> {
        self.walk_to_review()?;
        let completion = self
            .wizard
            .complete(
                self.client.as_ref(),
                self.scenario.scenario(),
                &self.portfolio,
                &mut self.simulation,
            )
            .await;
        match completion {
            Completion::Succeeded => Ok(()),
            Completion::Failed(err) => Err(err.into()),
            Completion::Blocked(errors) => Err(invalid(&errors)),
            Completion::NotAtReview(step) => bail!("wizard stopped at step {step}"),
        }
    }

    fn basis(&self) -> ComparisonBasis<'_> {
        ComparisonBasis {
            scenario: self.scenario.scenario(),
            portfolio: &self.portfolio,
            simulation: &self.simulation,
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let settings = cli.settings;
    match cli.command {
        Command::Validate { source } => {
            let (ctx, portfolio) = source.load()?;
            let errors = validate(ctx.scenario(), portfolio.holdings_for_validation());
            if !errors.is_empty() {
                return Err(invalid(&errors));
            }
            println!("ok");
            Ok(())
        }
        Command::Encode { source, base_url } => {
            let (ctx, _) = source.load()?;
            match base_url {
                Some(base) => {
                    let base = Url::parse(&base).with_context(|| format!("invalid url {base}"))?;
                    println!("{}", codec::share_url(&base, ctx.scenario()));
                }
                None => println!("{}", codec::encode_query(ctx.scenario())),
            }
            Ok(())
        }
        Command::Decode { query } => {
            let query = query.split_once('?').map_or(query.as_str(), |(_, q)| q);
            print_json(&codec::decode_query(query))
        }
        Command::Simulate { source, stream } => {
            let mut session = Session::start(&settings, &source)?;
            if !stream {
                session.run_base().await?;
                return match session.simulation.base_result() {
                    Some(result) => print_json(result),
                    None => bail!("simulation produced no result"),
                };
            }
            session.walk_to_review()?;
            let request = session.portfolio.request_for(session.scenario.scenario());
            let mut report = |p: Progress| eprintln!("year {}/{}", p.year, p.total_years);
            let result = session
                .client
                .simulate_streaming(&request, &mut report)
                .await?;
            print_json(&result)
        }
        Command::Compare { analysis } => {
            let mut session = Session::start(&settings, analysis.source())?;
            session.run_base().await?;
            let orchestrator = ComparisonOrchestrator::new(
                session.client.clone(),
                session.simulation.errors().clone(),
            );
            let basis = session.basis();
            match &analysis {
                CompareCommand::States { states, .. } => {
                    applied(orchestrator.compare_states(basis, Some(states.as_slice())).await?)
                }
                CompareCommand::SsTiming {
                    birth_year, pia, ..
                } => applied(
                    orchestrator
                        .compare_ss_timing(basis, *birth_year, *pia)
                        .await?,
                ),
                CompareCommand::Allocations { .. } => {
                    applied(orchestrator.compare_allocations(basis).await?)
                }
            }
        }
        Command::Annuity {
            source,
            payment,
            guarantee_years,
        } => {
            let session = Session::start(&settings, &source)?;
            let request = annuity_offer(
                session.scenario.scenario(),
                &session.portfolio,
                payment,
                guarantee_years,
            )?;
            print_json(&session.client.compare_annuity(&request).await?)
        }
        Command::Mortality {
            gender,
            start_age,
            end_age,
        } => {
            if start_age > end_age {
                bail!("start age {start_age} is after end age {end_age}");
            }
            let client = settings
                .client()
                .with_context(|| format!("configuring client for {}", settings.api_url))?;
            print_json(&client.mortality(gender.into(), start_age, end_age).await?)
        }
        Command::Saved { action } => saved(&settings, action),
    }
}

fn saved(settings: &Settings, action: SavedCommand) -> Result<()> {
    let mut store = settings.store();
    match action {
        SavedCommand::List => {
            for entry in store.list() {
                println!(
                    "{}\t{}\t{}",
                    entry.name,
                    entry.saved_at.to_rfc3339(),
                    entry.portfolio_mode
                );
            }
            Ok(())
        }
        SavedCommand::Save { name, source } => {
            let (ctx, portfolio) = source.load()?;
            report_write("saved", &name, store.save(&name, ctx.scenario(), &portfolio));
            Ok(())
        }
        SavedCommand::Load { name, query } => {
            let entry = store
                .get(&name)
                .ok_or_else(|| anyhow!("no saved scenario named '{name}'"))?;
            if query {
                println!("{}", codec::encode_query(&entry.scenario));
                Ok(())
            } else {
                print_json(entry)
            }
        }
        SavedCommand::Delete { name } => {
            report_write("deleted", &name, store.delete(&name));
            Ok(())
        }
    }
}

// A rejected write is not a command failure; the store has already logged it.
fn report_write(verb: &str, name: &str, outcome: Result<(), StoreError>) {
    match outcome {
        Ok(()) => println!("{verb} '{name}'"),
        Err(err) => eprintln!("{verb} '{name}' but the change was not persisted: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::PortfolioMode;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("nestplan").chain(args.iter().copied()))
            .expect("arguments should parse")
    }

    #[test]
    fn source_applies_query_then_overrides() {
        let cli = parse(&[
            "validate",
            "--query",
            "https://example.com/plan?age=60&st=TX",
            "--spouse",
            "--set",
            "spouse.age=58",
            "--set",
            "include_mortality=false",
        ]);
        let Command::Validate { source } = cli.command else {
            panic!("expected validate");
        };
        let (ctx, portfolio) = source.load().expect("source should load");
        let scenario = ctx.scenario();
        assert_eq!(scenario.current_age, 60);
        assert_eq!(scenario.state, "TX");
        assert_eq!(scenario.spouse.as_ref().map(|s| s.age), Some(58));
        assert!(!scenario.include_mortality);
        assert_eq!(portfolio.mode(), PortfolioMode::Simple);
    }

    #[test]
    fn holdings_switch_to_detailed_mode() {
        let cli = parse(&[
            "compare",
            "allocations",
            "--holding",
            "roth_ira:vt:150000",
            "--holding",
            "taxable:bnd:50000",
            "--withdrawal-strategy",
            "roth-first",
        ]);
        let Command::Compare { analysis } = cli.command else {
            panic!("expected compare");
        };
        let (_, portfolio) = analysis.source().load().expect("source should load");
        assert_eq!(portfolio.mode(), PortfolioMode::Detailed);
        assert_eq!(portfolio.holdings().len(), 2);
        assert_eq!(portfolio.withdrawal_strategy(), WithdrawalStrategy::RothFirst);
    }

    #[test]
    fn bad_overrides_and_holdings_are_errors() {
        let source = ScenarioSource {
            overrides: vec!["current_age=old".to_string()],
            ..ScenarioSource::default()
        };
        assert!(source.load().is_err());

        let source = ScenarioSource {
            overrides: vec!["spouse.age=60".to_string()],
            ..ScenarioSource::default()
        };
        assert!(source.load().is_err());

        assert!(parse_holding("roth_ira:vt").is_err());
        assert!(parse_holding("roth_ira:gold:10").is_err());
    }

    #[test]
    fn annuity_offer_defaults_the_guarantee_period() {
        let offer = annuity_offer(
            &Scenario::default(),
            &PortfolioContext::default(),
            Some(2_000.0),
            None,
        )
        .expect("offer should be valid");
        assert_eq!(offer.annuity_monthly_payment, 2_000.0);
        assert_eq!(offer.annuity_guarantee_years, DEFAULT_GUARANTEE_YEARS);
    }

    #[test]
    fn annuity_offer_uses_the_enabled_block() {
        let mut ctx = ScenarioContext::new(Scenario::default());
        ctx.set_annuity_enabled(true);
        let offer = annuity_offer(ctx.scenario(), &PortfolioContext::default(), None, None)
            .expect("offer should be valid");
        assert_eq!(offer.annuity_monthly_payment, 2_000.0);
        assert_eq!(offer.annuity_guarantee_years, 15);
    }

    #[test]
    fn invalid_annuity_offers_never_build_a_request() {
        let scenario = Scenario::default();
        let portfolio = PortfolioContext::default();
        assert!(annuity_offer(&scenario, &portfolio, Some(-5.0), Some(15)).is_err());
        assert!(annuity_offer(&scenario, &portfolio, Some(2_000.0), Some(0)).is_err());
        assert!(annuity_offer(&scenario, &portfolio, Some(2_000.0), Some(41)).is_err());
        assert!(annuity_offer(&scenario, &portfolio, None, None).is_err());
    }

    #[test]
    fn mortality_takes_a_gender_and_default_ages() {
        let cli = parse(&["mortality", "female", "--end-age", "90"]);
        let Command::Mortality {
            gender,
            start_age,
            end_age,
        } = cli.command
        else {
            panic!("expected mortality");
        };
        assert_eq!(Gender::from(gender), Gender::Female);
        assert_eq!((start_age, end_age), (65, 90));
    }

    #[test]
    fn unwritable_store_does_not_fail_the_command() {
        let blocker = tempfile::NamedTempFile::new().expect("temp file");
        let settings = Settings {
            store_dir: blocker.path().to_path_buf(),
            ..Settings::default()
        };
        let save = SavedCommand::Save {
            name: "plan".to_string(),
            source: ScenarioSource::default(),
        };
        assert!(saved(&settings, save).is_ok());
        assert!(settings.store().list().is_empty());

        let delete = SavedCommand::Delete {
            name: "plan".to_string(),
        };
        assert!(saved(&settings, delete).is_ok());
    }

    #[test]
    fn query_and_file_conflict() {
        let result = Cli::try_parse_from([
            "nestplan", "encode", "--query", "age=60", "--file", "plan.json",
        ]);
        assert!(result.is_err());
    }
}
