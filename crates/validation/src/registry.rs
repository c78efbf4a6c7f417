//! Plugin registry
//!
//! Read-only map of recognised Volatility plugins covering both the Vol2 and
//! Vol3 dialects. Loaded once at startup and shared behind an `Arc`; updating
//! it means redeploying the registry file.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use dfir_core::Dialect;
use serde::{Deserialize, Serialize};

use crate::edit_distance;
use crate::ValidationError;

/// Registry entry for one plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    /// Dialects that accept this name
    #[serde(default)]
    pub version: Vec<Dialect>,
    #[serde(default)]
    pub syntax: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Vol3 name for a Vol2 plugin
    #[serde(default)]
    pub vol3_equivalent: Option<String>,
}

impl PluginSpec {
    pub fn supports(&self, dialect: Dialect) -> bool {
        self.version.is_empty() || self.version.contains(&dialect)
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    plugins: BTreeMap<String, PluginSpec>,
}

/// How a name was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Alias,
    CaseInsensitive,
}

/// Result of a registry lookup
#[derive(Debug, Clone, Copy)]
pub struct PluginMatch<'a> {
    pub name: &'a str,
    pub spec: &'a PluginSpec,
    pub kind: MatchKind,
}

#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, PluginSpec>,
    /// lowercase alias -> canonical
    aliases: HashMap<String, String>,
    /// lowercase name -> canonical
    folded: HashMap<String, String>,
}

impl PluginRegistry {
    /// Load the registry file; a missing or malformed file is fatal
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ValidationError::RegistryNotFound(path.display().to_string())
            } else {
                ValidationError::Io(e)
            }
        })?;

        let registry = Self::from_json(&raw)?;
        tracing::info!(
            path = %path.display(),
            plugins = registry.len(),
            "Loaded plugin registry"
        );
        Ok(registry)
    }

    pub fn from_json(raw: &str) -> Result<Self, ValidationError> {
        let file: RegistryFile =
            serde_json::from_str(raw).map_err(|e| ValidationError::RegistryParse(e.to_string()))?;

        if file.plugins.is_empty() {
            return Err(ValidationError::EmptyRegistry);
        }

        Ok(Self::from_plugins(file.plugins))
    }

    pub fn from_plugins(plugins: impl IntoIterator<Item = (String, PluginSpec)>) -> Self {
        let plugins: BTreeMap<String, PluginSpec> = plugins.into_iter().collect();

        let mut aliases = HashMap::new();
        let mut folded = HashMap::new();
        for (name, spec) in &plugins {
            folded.insert(name.to_lowercase(), name.clone());
            for alias in &spec.aliases {
                aliases.insert(alias.to_lowercase(), name.clone());
            }
        }

        Self {
            plugins,
            aliases,
            folded,
        }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Canonical names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PluginSpec)> {
        self.plugins.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, name: &str) -> Option<&PluginSpec> {
        self.plugins.get(name)
    }

    /// Exact name, then alias, then case-insensitive name
    pub fn lookup(&self, name: &str) -> Option<PluginMatch<'_>> {
        if let Some((canonical, spec)) = self.plugins.get_key_value(name) {
            return Some(PluginMatch {
                name: canonical,
                spec,
                kind: MatchKind::Exact,
            });
        }

        let lower = name.to_lowercase();
        let resolve = |canonical: &String, kind| {
            self.plugins
                .get_key_value(canonical)
                .map(|(name, spec)| PluginMatch {
                    name: name.as_str(),
                    spec,
                    kind,
                })
        };

        if let Some(found) = self.aliases.get(&lower).and_then(|c| resolve(c, MatchKind::Alias)) {
            return Some(found);
        }

        self.folded
            .get(&lower)
            .and_then(|c| resolve(c, MatchKind::CaseInsensitive))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Nearest canonical name by edit distance over names and aliases
    pub fn nearest(&self, name: &str, max_distance: usize) -> Option<(&str, usize)> {
        let by_name = edit_distance::nearest(name, self.names(), max_distance);

        let by_alias = self
            .plugins
            .iter()
            .flat_map(|(canonical, spec)| spec.aliases.iter().map(move |a| (canonical, a)))
            .filter_map(|(canonical, alias)| {
                let d = edit_distance::levenshtein(name, alias);
                (d <= max_distance).then_some((canonical.as_str(), d))
            })
            .min_by_key(|(_, d)| *d);

        match (by_name, by_alias) {
            (Some(n), Some(a)) if a.1 < n.1 => Some(a),
            (Some(n), _) => Some(n),
            (None, a) => a,
        }
    }

    /// Names a query may mention when asking about a plugin
    pub fn keywords(&self) -> Vec<String> {
        let mut words: Vec<String> = self.folded.keys().cloned().collect();
        words.extend(self.aliases.keys().cloned());
        words.sort();
        words.dedup();
        words
    }
}
