//! Command validation
//!
//! Extract, validate, annotate. Generated text is never rewritten; each
//! command found in it comes back with `is_valid`, the matched plugin and,
//! for unknown plugins, the nearest registry entry.

use std::sync::Arc;

use dfir_core::{Dialect, ValidatedCommand, ValidationSummary};

use crate::extractor::{extract_commands, ExtractedCommand};
use crate::registry::PluginRegistry;

/// Default edit-distance ceiling for suggestions
pub const DEFAULT_MAX_SUGGESTION_DISTANCE: usize = 3;

/// Outcome of validating one response
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub commands: Vec<ValidatedCommand>,
    pub summary: ValidationSummary,
}

impl ValidationReport {
    pub fn invalid(&self) -> impl Iterator<Item = &ValidatedCommand> {
        self.commands.iter().filter(|c| !c.is_valid)
    }
}

#[derive(Debug, Clone)]
pub struct CommandValidator {
    registry: Arc<PluginRegistry>,
    max_suggestion_distance: usize,
}

impl CommandValidator {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            registry,
            max_suggestion_distance: DEFAULT_MAX_SUGGESTION_DISTANCE,
        }
    }

    pub fn with_max_suggestion_distance(mut self, distance: usize) -> Self {
        self.max_suggestion_distance = distance;
        self
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Validate every command in `text`
    pub fn validate_text(&self, text: &str) -> ValidationReport {
        let commands: Vec<ValidatedCommand> = extract_commands(text)
            .iter()
            .map(|extracted| self.validate(extracted))
            .collect();
        let summary = ValidationSummary::from_commands(&commands);

        if summary.invalid > 0 {
            tracing::warn!(
                total = summary.total,
                invalid = summary.invalid,
                "Generated text contains unrecognised commands"
            );
        } else {
            tracing::debug!(total = summary.total, "All commands recognised");
        }

        ValidationReport { commands, summary }
    }

    /// Validate a single extracted command
    pub fn validate(&self, extracted: &ExtractedCommand) -> ValidatedCommand {
        // Either dialect's name is accepted for any invocation style
        match self.registry.lookup(&extracted.plugin) {
            Some(found) => {
                let note = match (&found.spec.vol3_equivalent, extracted.dialect) {
                    (Some(vol3), Dialect::Vol2 | Dialect::Unknown) => {
                        format!("Volatility 2 plugin; Volatility 3 equivalent is `{}`", vol3)
                    }
                    _ if !found.spec.description.is_empty() => found.spec.description.clone(),
                    _ => String::new(),
                };

                ValidatedCommand {
                    command: extracted.command.clone(),
                    plugin: extracted.plugin.clone(),
                    dialect: extracted.dialect,
                    is_valid: true,
                    matched_plugin: Some(found.name.to_string()),
                    suggestion: None,
                    note,
                }
            }
            None => {
                let suggestion = self
                    .registry
                    .nearest(&extracted.plugin, self.max_suggestion_distance)
                    .map(|(name, _)| name.to_string());

                let note = match &suggestion {
                    Some(s) => format!(
                        "Unknown plugin `{}`, did you mean `{}`?",
                        extracted.plugin, s
                    ),
                    None => format!("Unknown plugin `{}`", extracted.plugin),
                };

                tracing::debug!(
                    plugin = %extracted.plugin,
                    suggestion = ?suggestion,
                    "Unrecognised plugin"
                );

                ValidatedCommand {
                    command: extracted.command.clone(),
                    plugin: extracted.plugin.clone(),
                    dialect: extracted.dialect,
                    is_valid: false,
                    matched_plugin: None,
                    suggestion,
                    note,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> CommandValidator {
        let registry = PluginRegistry::from_json(
            r#"{"plugins": {
                "windows.pslist": {"version": ["vol3"], "description": "List processes"},
                "windows.malfind": {"version": ["vol3"]},
                "pslist": {"version": ["vol2"], "vol3_equivalent": "windows.pslist"}
            }}"#,
        )
        .unwrap();
        CommandValidator::new(Arc::new(registry))
    }

    #[test]
    fn test_valid_command() {
        let report = validator().validate_text("vol -f dump.mem windows.pslist");
        assert_eq!(report.commands.len(), 1);
        let cmd = &report.commands[0];
        assert!(cmd.is_valid);
        assert_eq!(cmd.matched_plugin.as_deref(), Some("windows.pslist"));
        assert!(cmd.suggestion.is_none());
        assert!(report.summary.all_valid());
    }

    #[test]
    fn test_typo_gets_suggestion() {
        let report = validator().validate_text("vol -f dump.mem windows.pzlist");
        let cmd = &report.commands[0];
        assert!(!cmd.is_valid);
        assert!(cmd.matched_plugin.is_none());
        assert_eq!(cmd.suggestion.as_deref(), Some("windows.pslist"));
        assert_eq!(report.invalid().count(), 1);
    }

    #[test]
    fn test_far_typo_has_no_suggestion() {
        let report = validator().validate_text("vol -f dump.mem windows.registryscan");
        let cmd = &report.commands[0];
        assert!(!cmd.is_valid);
        assert!(cmd.suggestion.is_none());
    }

    #[test]
    fn test_vol2_note_names_vol3_equivalent() {
        let report = validator().validate_text("vol.py -f mem.img --profile=Win7SP1x64 pslist");
        let cmd = &report.commands[0];
        assert!(cmd.is_valid);
        assert!(cmd.note.contains("windows.pslist"));
    }

    #[test]
    fn test_text_is_not_modified() {
        let text = "Run `vol -f x.mem windows.pzlist` and `vol -f x.mem windows.malfind`.";
        let report = validator().validate_text(text);
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.valid, 1);
        assert_eq!(report.summary.validity_rate, 50.0);
    }

    #[test]
    fn test_no_commands() {
        let report = validator().validate_text("Process hollowing replaces a process image.");
        assert!(report.commands.is_empty());
        assert_eq!(report.summary.validity_rate, 100.0);
    }
}
