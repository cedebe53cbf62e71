//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate delivery settings and the destination list
//! - Generate `SinkBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("sink.toml")).unwrap();
//! println!("Destinations: {}", blueprint.resolved_destinations().len());
//! ```

mod parser;
mod validator;

pub use contracts::SinkBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// The format comes from the file extension (.toml / .json); files
    /// without a known extension are sniffed from their content.
    ///
    /// # Errors
    /// - File read failure
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<SinkBlueprint, ContractError> {
        let content = std::fs::read_to_string(path)?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ConfigFormat::from_extension)
            .unwrap_or_else(|| ConfigFormat::sniff(&content));
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<SinkBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Validate a programmatically built blueprint
    pub fn validate(blueprint: &SinkBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    /// Serialize SinkBlueprint to TOML string
    pub fn to_toml(blueprint: &SinkBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize SinkBlueprint to JSON string
    pub fn to_json(blueprint: &SinkBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}
