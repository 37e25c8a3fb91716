use std::path::Path;

use kontoauszug_core::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::csv::BankFormatProfile;
use crate::dedup::DEFAULT_SNAPSHOT_LIMIT;
use crate::error::ImportError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    pub duplicate_snapshot_limit: usize,
    pub amount_tolerance: Decimal,
    pub default_profile: String,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            duplicate_snapshot_limit: DEFAULT_SNAPSHOT_LIMIT,
            amount_tolerance: Decimal::new(1, 2),
            default_profile: "generic".to_string(),
        }
    }
}

impl ImportSettings {
    pub fn tolerance(&self) -> Money {
        Money::from_decimal(self.amount_tolerance)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Unset disables PDF imports.
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: Some("KONTOAUSZUG_EXTRACTION_KEY".to_string()),
            timeout_secs: 60,
        }
    }
}

/// ```toml
/// [import]
/// duplicate_snapshot_limit = 2000
/// default_profile = "sparkasse"
///
/// [[profiles]]
/// name = "sparkasse"
/// has_header = true
/// mapping = { date_column = 1, amount_column = 14, description_column = 4, date_format = "%d.%m.%y" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub import: ImportSettings,
    pub extraction: ExtractionConfig,
    pub profiles: Vec<BankFormatProfile>,
}

impl ImportConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: ImportConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.import.duplicate_snapshot_limit == 0 {
            return Err(ConfigError::Invalid("import.duplicate_snapshot_limit must be positive".into()));
        }
        if self.import.amount_tolerance <= Decimal::ZERO {
            return Err(ConfigError::Invalid("import.amount_tolerance must be positive".into()));
        }
        if let Some(p) = self.profiles.iter().find(|p| p.name.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("profile without name: {p:?}")));
        }
        if self.profile(&self.import.default_profile).is_none() {
            return Err(ConfigError::Invalid(format!(
                "default_profile '{}' is not defined",
                self.import.default_profile
            )));
        }
        Ok(())
    }

    /// Configured profiles shadow built-ins of the same name.
    pub fn profile(&self, name: &str) -> Option<BankFormatProfile> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .or_else(|| BankFormatProfile::builtin().into_iter().find(|p| p.name == name))
    }

    pub fn resolve_profile(&self, name: Option<&str>) -> Result<BankFormatProfile, ImportError> {
        let name = name.unwrap_or(self.import.default_profile.as_str());
        self.profile(name).ok_or_else(|| ImportError::UnknownProfile(name.to_string()))
    }

    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = BankFormatProfile::builtin().into_iter().map(|p| p.name).collect();
        for p in &self.profiles {
            if !names.contains(&p.name) {
                names.push(p.name.clone());
            }
        }
        names
    }
}
