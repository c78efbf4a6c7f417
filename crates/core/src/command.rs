//! Validated tool commands

use serde::{Deserialize, Serialize};

/// Volatility dialect a command was written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `vol.py -f img plugin` / `volatility -f img plugin`
    Vol2,
    /// `vol -f img windows.plugin`
    Vol3,
    Unknown,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Vol2 => "vol2",
            Dialect::Vol3 => "vol3",
            Dialect::Unknown => "unknown",
        }
    }
}

/// A command extracted from generated text, with its annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedCommand {
    /// Full command as it appeared in the text
    pub command: String,
    /// Plugin token as written
    pub plugin: String,
    pub dialect: Dialect,
    pub is_valid: bool,
    /// Canonical registry name when the plugin was recognised
    pub matched_plugin: Option<String>,
    /// Nearest registry entry for unrecognised plugins
    pub suggestion: Option<String>,
    pub note: String,
}

/// Aggregate over the commands of one response
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    /// Percentage, 100.0 when there are no commands
    pub validity_rate: f32,
}

impl ValidationSummary {
    pub fn from_commands(commands: &[ValidatedCommand]) -> Self {
        let total = commands.len();
        let valid = commands.iter().filter(|c| c.is_valid).count();
        let validity_rate = if total == 0 {
            100.0
        } else {
            (valid as f32 / total as f32 * 1000.0).round() / 10.0
        };
        Self {
            total,
            valid,
            invalid: total - valid,
            validity_rate,
        }
    }

    pub fn all_valid(&self) -> bool {
        self.invalid == 0
    }
}
