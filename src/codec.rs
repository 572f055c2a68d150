use std::collections::BTreeMap;
use url::Url;
use url::form_urlencoded;

use crate::scenario::{
    AnnuityField, AnnuityInput, FieldKind, FieldValue, Scenario, ScenarioField, SpouseField,
    SpouseInput,
};

pub const SPOUSE_PREFIX: &str = "sp";
pub const ANNUITY_PREFIX: &str = "an";

const LEGACY_MONTHLY_INCOME_KEY: &str = "inc";

// The fixed short-key mapping. Links are not versioned, so keys are only ever added.
const SHORT_KEYS: [(&str, ScenarioField); 31] = [
    ("age", ScenarioField::CurrentAge),
    ("max", ScenarioField::MaxAge),
    ("ret", ScenarioField::RetirementAge),
    ("g", ScenarioField::Gender),
    ("st", ScenarioField::State),
    ("fs", ScenarioField::FilingStatus),
    ("cap", ScenarioField::InitialCapital),
    ("exp", ScenarioField::AnnualSpending),
    ("ss", ScenarioField::SocialSecurityMonthly),
    ("ssAge", ScenarioField::SocialSecurityStartAge),
    ("pen", ScenarioField::PensionAnnual),
    ("emp", ScenarioField::EmploymentIncome),
    ("empG", ScenarioField::EmploymentGrowthRate),
    ("stk", ScenarioField::StockAllocation),
    ("er", ScenarioField::ExpectedReturn),
    ("vol", ScenarioField::ReturnVolatility),
    ("div", ScenarioField::DividendYield),
    ("sims", ScenarioField::NSimulations),
    ("mort", ScenarioField::IncludeMortality),
    ("home", ScenarioField::HomeValue),
    ("spAge", ScenarioField::Spouse(SpouseField::Age)),
    ("spG", ScenarioField::Spouse(SpouseField::Gender)),
    ("spSs", ScenarioField::Spouse(SpouseField::SocialSecurityMonthly)),
    ("spSsAge", ScenarioField::Spouse(SpouseField::SocialSecurityStartAge)),
    ("spPen", ScenarioField::Spouse(SpouseField::PensionAnnual)),
    ("spEmp", ScenarioField::Spouse(SpouseField::EmploymentIncome)),
    ("spEmpG", ScenarioField::Spouse(SpouseField::EmploymentGrowthRate)),
    ("spRet", ScenarioField::Spouse(SpouseField::RetirementAge)),
    ("anPay", ScenarioField::Annuity(AnnuityField::MonthlyPayment)),
    ("anType", ScenarioField::Annuity(AnnuityField::AnnuityType)),
    ("anYrs", ScenarioField::Annuity(AnnuityField::GuaranteeYears)),
];

pub fn short_key_for(field: ScenarioField) -> &'static str {
    SHORT_KEYS
        .iter()
        .find(|(_, f)| *f == field)
        .map(|(key, _)| *key)
        .unwrap_or_default()
}

fn field_for(key: &str) -> Option<ScenarioField> {
    SHORT_KEYS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, field)| *field)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShareParams(BTreeMap<String, FieldValue>);

impl ShareParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params = Self::new();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            params.insert(key.into_owned(), FieldValue::Text(value.into_owned()));
        }
        params
    }

    pub fn from_url(url: &Url) -> Self {
        Self::from_query(url.query().unwrap_or_default())
    }

    pub fn to_query(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter().map(|(k, v)| (k.as_str(), v.to_string())))
            .finish()
    }
}

pub fn encode(scenario: &Scenario) -> ShareParams {
    let mut params = ShareParams::new();
    for (key, field) in SHORT_KEYS {
        if let Some(value) = scenario.field(field) {
            params.insert(key, value);
        }
    }
    params
}

pub fn decode(params: &ShareParams) -> Scenario {
    let mut scenario = Scenario::default();

    let mapped: Vec<(ScenarioField, &FieldValue)> = params
        .iter()
        .filter_map(|(key, value)| field_for(key).map(|field| (field, value)))
        .collect();

    if mapped
        .iter()
        .any(|(field, _)| matches!(field, ScenarioField::Spouse(_)))
    {
        scenario.spouse = Some(SpouseInput::default());
    }
    if mapped
        .iter()
        .any(|(field, _)| matches!(field, ScenarioField::Annuity(_)))
    {
        scenario.annuity = Some(AnnuityInput::default());
    }

    for (field, raw) in mapped {
        let Some(value) = coerce(field.kind(), raw) else {
            tracing::debug!(field = %field, value = %raw, "ignoring malformed share parameter");
            continue;
        };
        if let Err(err) = scenario.set_field(field, value) {
            tracing::debug!(%err, "ignoring share parameter");
        }
    }

    if params.get(short_key_for(ScenarioField::AnnualSpending)).is_none() {
        let monthly = params
            .get(LEGACY_MONTHLY_INCOME_KEY)
            .and_then(|raw| coerce(FieldKind::Number, raw));
        if let Some(FieldValue::Number(monthly)) = monthly {
            scenario.annual_spending = monthly * 12.0;
        }
    }

    scenario
}

pub fn encode_query(scenario: &Scenario) -> String {
    encode(scenario).to_query()
}

pub fn decode_query(query: &str) -> Scenario {
    decode(&ShareParams::from_query(query))
}

pub fn share_url(base: &Url, scenario: &Scenario) -> Url {
    let mut url = base.clone();
    url.set_query(Some(&encode_query(scenario)));
    url
}

pub(crate) fn coerce(kind: FieldKind, raw: &FieldValue) -> Option<FieldValue> {
    match kind {
        FieldKind::Integer | FieldKind::Number => {
            let value = match raw {
                FieldValue::Number(v) => *v,
                FieldValue::Text(s) => s.trim().parse::<f64>().ok()?,
                FieldValue::Bool(_) => return None,
            };
            value.is_finite().then_some(FieldValue::Number(value))
        }
        FieldKind::Flag => match raw {
            FieldValue::Bool(b) => Some(FieldValue::Bool(*b)),
            FieldValue::Number(v) if *v == 1.0 => Some(FieldValue::Bool(true)),
            FieldValue::Number(v) if *v == 0.0 => Some(FieldValue::Bool(false)),
            FieldValue::Text(s) => match s.trim() {
                "1" | "true" => Some(FieldValue::Bool(true)),
                "0" | "false" => Some(FieldValue::Bool(false)),
                _ => None,
            },
            FieldValue::Number(_) => None,
        },
        FieldKind::Choice => match raw {
            FieldValue::Text(s) => Some(FieldValue::Text(s.trim().to_string())),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{AnnuityType, FilingStatus, Gender, STATE_CODES};
    use proptest::prelude::{prop_assert_eq, proptest};

    #[test]
    fn empty_params_decode_to_default() {
        assert_eq!(decode(&ShareParams::new()), Scenario::default());
        assert_eq!(decode_query(""), Scenario::default());
    }

    #[test]
    fn every_field_has_a_unique_short_key() {
        for field in ScenarioField::all() {
            assert!(!short_key_for(field).is_empty(), "{field} has no short key");
        }
        let mut keys: Vec<&str> = SHORT_KEYS.iter().map(|(k, _)| *k).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), SHORT_KEYS.len());
    }

    #[test]
    fn nested_keys_use_their_prefixes() {
        for (key, field) in SHORT_KEYS {
            match field {
                ScenarioField::Spouse(_) => assert!(key.starts_with(SPOUSE_PREFIX)),
                ScenarioField::Annuity(_) => assert!(key.starts_with(ANNUITY_PREFIX)),
                _ => assert!(
                    !key.starts_with(SPOUSE_PREFIX) && !key.starts_with(ANNUITY_PREFIX),
                    "{key} collides with a nested prefix"
                ),
            }
        }
    }

    #[test]
    fn default_scenario_survives_the_query_string() {
        let query = encode_query(&Scenario::default());
        assert!(query.contains("age=65"));
        assert!(query.contains("st=CA"));
        assert!(query.contains("cap=500000"));
        assert!(!query.contains("spAge"));

        let decoded = decode_query(&format!("?{query}"));
        assert_eq!(decoded, Scenario::default());
    }

    #[test]
    fn malformed_and_unknown_values_fall_back_to_defaults() {
        let decoded = decode_query("age=abc&max=-3&cap=1e400&st=TX&g=robot&mort=maybe&zzz=1");
        let defaults = Scenario::default();
        assert_eq!(decoded.current_age, defaults.current_age);
        assert_eq!(decoded.max_age, defaults.max_age);
        assert_eq!(decoded.initial_capital, defaults.initial_capital);
        assert_eq!(decoded.gender, defaults.gender);
        assert_eq!(decoded.include_mortality, defaults.include_mortality);
        assert_eq!(decoded.state, "TX");
    }

    #[test]
    fn spouse_is_only_merged_when_a_spouse_key_is_present() {
        let without = decode_query("age=60&exp=45000");
        assert!(without.spouse.is_none());

        let with = decode_query("age=60&spAge=58");
        let spouse = with.spouse.expect("spouse key present");
        assert_eq!(spouse.age, 58);
        assert_eq!(spouse.retirement_age, SpouseInput::default().retirement_age);
    }

    #[test]
    fn legacy_monthly_income_maps_to_annual_spending() {
        assert_eq!(decode_query("inc=5000").annual_spending, 60_000.0);
        assert_eq!(decode_query("inc=5000&exp=30000").annual_spending, 30_000.0);
    }

    #[test]
    fn share_url_replaces_the_query() {
        let base = Url::parse("https://app.example.com/simulate?old=1").expect("valid url");
        let mut scenario = Scenario::default();
        scenario.current_age = 58;
        let url = share_url(&base, &scenario);
        assert_eq!(url.path(), "/simulate");
        assert_eq!(ShareParams::from_url(&url).get("old"), None);
        assert_eq!(decode(&ShareParams::from_url(&url)).current_age, 58);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_query_round_trip_reproduces_scenario(
            current_age in 18u32..=99,
            retirement_gap in 1u32..=15,
            capital_cents in 0u64..=1_000_000_000,
            spending in 1u32..=300_000,
            allocation_pct in 0u32..=100,
            state_index in 0usize..51,
            female in proptest::bool::ANY,
            mortality in proptest::bool::ANY,
            with_spouse in proptest::bool::ANY,
            spouse_age in 18u32..=95,
            with_annuity in proptest::bool::ANY,
            guarantee_years in 1u32..=40,
        ) {
            let mut scenario = Scenario::default();
            scenario.current_age = current_age;
            scenario.retirement_age = current_age + retirement_gap;
            scenario.max_age = 110;
            scenario.initial_capital = capital_cents as f64 / 100.0;
            scenario.annual_spending = f64::from(spending);
            scenario.stock_allocation = f64::from(allocation_pct) / 100.0;
            scenario.state = STATE_CODES[state_index].to_string();
            scenario.gender = if female { Gender::Female } else { Gender::Male };
            scenario.filing_status = FilingStatus::MarriedFilingJointly;
            scenario.include_mortality = mortality;
            if with_spouse {
                scenario.spouse = Some(SpouseInput {
                    age: spouse_age,
                    retirement_age: spouse_age + 2,
                    ..SpouseInput::default()
                });
            }
            if with_annuity {
                scenario.annuity = Some(AnnuityInput {
                    monthly_payment: 1_250.5,
                    annuity_type: AnnuityType::FixedPeriod,
                    guarantee_years,
                });
            }

            let decoded = decode_query(&encode_query(&scenario));
            prop_assert_eq!(decoded, scenario);
        }
    }
}
