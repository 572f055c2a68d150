use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::client::{ClientConfigError, HttpComputeClient};
use crate::store::{FileMedium, ScenarioStore};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_STORE_DIR: &str = ".nestplan";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    #[arg(
        long,
        global = true,
        env = "NESTPLAN_API_URL",
        default_value = DEFAULT_API_URL,
        help = "Base URL of the compute service"
    )]
    pub api_url: String,
    #[arg(
        long,
        global = true,
        env = "NESTPLAN_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        help = "Per-request timeout in seconds"
    )]
    pub timeout_secs: u64,
    #[arg(
        long,
        global = true,
        env = "NESTPLAN_STORE_DIR",
        default_value = DEFAULT_STORE_DIR,
        help = "Directory holding saved scenarios"
    )]
    pub store_dir: PathBuf,
    #[arg(
        long,
        global = true,
        env = "NESTPLAN_LOG",
        default_value = DEFAULT_LOG_LEVEL,
        help = "Log filter used when RUST_LOG is unset"
    )]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn client(&self) -> Result<HttpComputeClient, ClientConfigError> {
        HttpComputeClient::new(&self.api_url, self.timeout())
    }

    pub fn store(&self) -> ScenarioStore<FileMedium> {
        ScenarioStore::open(FileMedium::new(self.store_dir.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Harness {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn flags_override_defaults() {
        let harness = Harness::try_parse_from([
            "nestplan",
            "--api-url",
            "http://compute.internal:9000",
            "--timeout-secs",
            "5",
        ])
        .expect("flags should parse");
        assert_eq!(harness.settings.api_url, "http://compute.internal:9000");
        assert_eq!(harness.settings.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn default_settings_build_a_client() {
        let settings = Settings::default();
        let client = settings.client().expect("default url is valid");
        assert_eq!(client.base_url().as_str(), "http://localhost:8000/");
        assert_eq!(settings.store_dir, PathBuf::from(".nestplan"));
    }
}
