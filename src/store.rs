use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::context::PortfolioContext;
use crate::scenario::{
    AnnuityInput, FieldValue, Holding, PortfolioMode, Scenario, ScenarioField, SpouseInput,
    WithdrawalStrategy,
};

pub const COLLECTION_KEY: &str = "saved_scenarios";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage io error: {0}")]
    Io(#[from] io::Error),
    #[error("could not serialize saved scenarios: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("storage capacity exceeded: {needed} bytes needed, {capacity} allowed")]
    CapacityExceeded { needed: usize, capacity: usize },
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
}

pub trait KeyValueMedium {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct FileMedium {
    dir: PathBuf,
}

impl FileMedium {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let safe = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !safe {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueMedium for FileMedium {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    values: BTreeMap<String, String>,
    capacity: Option<usize>,
}

impl MemoryMedium {
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            values: BTreeMap::new(),
            capacity: Some(bytes),
        }
    }

    pub fn insert_raw(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }
}

impl KeyValueMedium for MemoryMedium {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Some(capacity) = self.capacity {
            let others: usize = self
                .values
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > capacity {
                return Err(StoreError::CapacityExceeded { needed, capacity });
            }
        }
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedScenario {
    pub name: String,
    pub saved_at: DateTime<Utc>,
    pub scenario: Scenario,
    pub portfolio_mode: PortfolioMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holdings: Option<Vec<Holding>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal_strategy: Option<WithdrawalStrategy>,
}

impl SavedScenario {
    pub fn portfolio(&self) -> PortfolioContext {
        match self.portfolio_mode {
            PortfolioMode::Simple => PortfolioContext::default(),
            PortfolioMode::Detailed => PortfolioContext::detailed(
                self.holdings.clone().unwrap_or_default(),
                self.withdrawal_strategy.unwrap_or_default(),
            ),
        }
    }

    // Rebuilds an entry written by any earlier version. Fields that are missing or no longer
    // type-check fall back to defaults; entries without a name are dropped.
    fn from_stored(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?.to_string();
        let saved_at = value
            .get("saved_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default();
        let portfolio_mode = value
            .get("portfolio_mode")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let holdings = value
            .get("holdings")
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        let withdrawal_strategy = value
            .get("withdrawal_strategy")
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        let scenario = value
            .get("scenario")
            .map(merge_onto_defaults)
            .unwrap_or_default();

        Some(Self {
            name,
            saved_at,
            scenario,
            portfolio_mode,
            holdings,
            withdrawal_strategy,
        })
    }
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, segment| node.get(segment))
}

fn field_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Bool(b) => Some(FieldValue::Bool(*b)),
        Value::Number(n) => n.as_f64().map(FieldValue::Number),
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        _ => None,
    }
}

fn merge_onto_defaults(stored: &Value) -> Scenario {
    let mut scenario = Scenario::default();
    let enabled = |block: &str, flag: &str| {
        stored.get(block).is_some_and(Value::is_object)
            && stored.get(flag).and_then(Value::as_bool) != Some(false)
    };
    if enabled("spouse", "has_spouse") {
        scenario.spouse = Some(SpouseInput::default());
    }
    if enabled("annuity", "has_annuity") {
        scenario.annuity = Some(AnnuityInput::default());
    }

    for field in ScenarioField::all() {
        let Some(value) = lookup(stored, field.path()).and_then(field_value) else {
            continue;
        };
        if let Err(err) = scenario.set_field(field, value) {
            tracing::debug!(%field, error = %err, "saved field ignored");
        }
    }

    if stored.get("annual_spending").is_none() {
        if let Some(monthly) = stored.get("target_monthly_income").and_then(Value::as_f64) {
            scenario.annual_spending = monthly * 12.0;
        }
    }
    scenario
}

/// Named snapshots, kept in memory and written through to the medium after every change.
/// A rejected write leaves the in-memory collection updated and is logged.
pub struct ScenarioStore<M> {
    medium: M,
    entries: Vec<SavedScenario>,
}

impl<M: KeyValueMedium> ScenarioStore<M> {
    pub fn open(medium: M) -> Self {
        let entries = match medium.read(COLLECTION_KEY) {
            Ok(Some(raw)) => parse_collection(&raw),
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!(error = %err, "could not read saved scenarios; starting empty");
                Vec::new()
            }
        };
        Self { medium, entries }
    }

    pub fn list(&self) -> &[SavedScenario] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&SavedScenario> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn load(&self, name: &str) -> Option<Scenario> {
        self.get(name).map(|e| e.scenario.clone())
    }

    pub fn save(
        &mut self,
        name: &str,
        scenario: &Scenario,
        portfolio: &PortfolioContext,
    ) -> Result<(), StoreError> {
        let detailed = portfolio.mode() == PortfolioMode::Detailed;
        let entry = SavedScenario {
            name: name.to_string(),
            saved_at: Utc::now(),
            scenario: scenario.clone(),
            portfolio_mode: portfolio.mode(),
            holdings: detailed.then(|| portfolio.holdings().to_vec()),
            withdrawal_strategy: detailed.then(|| portfolio.withdrawal_strategy()),
        };
        self.entries.retain(|e| e.name != name);
        self.entries.insert(0, entry);
        tracing::info!(name, count = self.entries.len(), "scenario saved");
        self.persist()
    }

    pub fn delete(&mut self, name: &str) -> Result<(), StoreError> {
        let before = self.entries.len();
        self.entries.retain(|e| e.name != name);
        if self.entries.len() == before {
            return Ok(());
        }
        tracing::info!(name, "saved scenario deleted");
        self.persist()
    }

    pub fn medium(&self) -> &M {
        &self.medium
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let result = serde_json::to_string(&self.entries)
            .map_err(StoreError::from)
            .and_then(|raw| self.medium.write(COLLECTION_KEY, &raw));
        if let Err(err) = &result {
            tracing::warn!(error = %err, "saved scenarios were not persisted");
        }
        result
    }
}

fn parse_collection(raw: &str) -> Vec<SavedScenario> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items.iter().filter_map(SavedScenario::from_stored).collect(),
        Ok(_) => {
            tracing::warn!("saved scenarios are not a list; starting empty");
            Vec::new()
        }
        Err(err) => {
            tracing::warn!(error = %err, "saved scenarios are corrupt; starting empty");
            Vec::new()
        }
    }
}
