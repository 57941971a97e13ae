use super::alert::{Alert, AlertRule};
use super::history::MAX_SIMULATION_DAYS;
use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_CURRENCY_API_URL: &str = "https://cdn.jsdelivr.net";

/// One week.
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AlertConfig {
    pub id: String,
    pub owner: String,
    #[serde(flatten)]
    pub rule: AlertRule,
}

impl AlertConfig {
    pub fn to_alert(&self) -> Alert {
        Alert::new(&self.id, &self.owner, self.rule.clone())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CurrencyApiConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub currency_api: Option<CurrencyApiConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            currency_api: Some(CurrencyApiConfig {
                base_url: DEFAULT_CURRENCY_API_URL.to_string(),
            }),
        }
    }
}

impl ProvidersConfig {
    pub fn currency_api_url(&self) -> &str {
        self.currency_api
            .as_ref()
            .map_or(DEFAULT_CURRENCY_API_URL, |p| &p.base_url)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifierConfig {
    #[default]
    Console,
    Webhook {
        url: String,
    },
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

fn default_interval_minutes() -> u64 {
    15
}

impl ScheduleConfig {
    pub fn interval(&self) -> Result<Duration> {
        self.interval_minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .context("schedule.interval_minutes is too large")
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SimulationConfig {
    #[serde(default = "default_simulation_days")]
    pub days: u32,
}

fn default_simulation_days() -> u32 {
    7
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            days: default_simulation_days(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub alerts: Vec<AlertConfig>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("io", "fxalert", "fxalert")
            .context("Could not determine project directories")
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        debug!(alerts = config.alerts.len(), "Successfully loaded config");
        Ok(config)
    }

    /// Rejects alerts the engine cannot evaluate.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for alert in &self.alerts {
            if alert.id.trim().is_empty() {
                bail!("Alert id must not be empty");
            }
            if !ids.insert(alert.id.as_str()) {
                bail!("Duplicate alert id: {}", alert.id);
            }
            alert
                .rule
                .validate()
                .with_context(|| format!("Alert {} is invalid", alert.id))?;
        }
        if !(1..=MAX_INTERVAL_MINUTES).contains(&self.schedule.interval_minutes) {
            bail!(
                "schedule.interval_minutes must be between 1 and {}, got {}",
                MAX_INTERVAL_MINUTES,
                self.schedule.interval_minutes
            );
        }
        if self.simulation.days > MAX_SIMULATION_DAYS {
            bail!(
                "simulation.days must be at most {}, got {}",
                MAX_SIMULATION_DAYS,
                self.simulation.days
            );
        }
        if let NotifierConfig::Webhook { url } = &self.notifier {
            if url.trim().is_empty() {
                bail!("notifier.url is required for webhook notifier");
            }
        }
        Ok(())
    }

    pub fn alert(&self, id: &str) -> Option<&AlertConfig> {
        self.alerts.iter().find(|a| a.id == id)
    }
}
