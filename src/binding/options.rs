//! Serializable binding configuration.

use crate::builder::BuildError;
use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Settings a binding can be loaded with, e.g. from a JSON preferences
/// file.
///
/// ```rust
/// use gestalt::binding::BindingOptions;
/// use gestalt::logging::LogLevel;
///
/// let options = BindingOptions::from_json(r#"{ "continuous_execution": true, "logging": ["usage"] }"#)
///     .unwrap();
///
/// assert!(options.continuous_execution);
/// assert!(options.logging.contains(&LogLevel::Usage));
/// assert_eq!(options.name, None);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BindingOptions {
    /// Name used in log messages.
    pub name: Option<String>,
    /// Execute the command on every update instead of once at the end.
    pub continuous_execution: bool,
    pub logging: BTreeSet<LogLevel>,
}

impl BindingOptions {
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        serde_json::from_str(json).map_err(|e| BuildError::InvalidOptions(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
