//! Run configuration: allocation parameters, rules, roster sources, header aliases.
//!
//! ```json
//! {
//!   "allocation": {"target_min": 40, "target_max": 43, "desired_avg": 40},
//!   "rules": [
//!     {"type": "compound_and", "sub_rules": [
//!       {"type": "in_list", "column": "Extensionista_Atual", "list_name": "immutable_extensionists"},
//!       {"type": "in_list", "column": "Nome_Produtor", "list_name": "immutable_producers"}
//!     ]}
//!   ],
//!   "rosters": [
//!     {"name": "immutable_producers", "file": "PRODUTORES_IMUTAVEIS.csv", "column": "Nome_Produtor"}
//!   ]
//! }
//! ```
//!
//! Rule columns may use source headers; they are resolved through the same
//! alias table the loader uses.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use realloc_kernel::{AllocationConfig, ImmutabilityRule, columns};

/// Where to read a named roster from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSource {
    /// Name rules refer to through `list_name`
    pub name: String,
    /// CSV file, relative to the assets directory unless absolute
    pub file: PathBuf,
    /// Column holding the roster entries
    pub column: String,
}

/// Everything a reallocation run needs besides the input table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub allocation: AllocationConfig,
    pub rules: Vec<ImmutabilityRule>,
    pub rosters: Vec<RosterSource>,
    /// Extra source header -> canonical column mappings
    pub aliases: BTreeMap<String, String>,
}

impl RunConfig {
    /// Load a run configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading run config {}", path.display()))?;
        let config = serde_json::from_str(&json)
            .with_context(|| format!("parsing run config {}", path.display()))?;
        Ok(config)
    }

    /// Header alias table: the built-in source headers plus configured extras.
    pub fn header_aliases(&self) -> HeaderAliases {
        let mut aliases = HeaderAliases::default();
        for (source, canonical) in &self.aliases {
            aliases.insert(source, canonical);
        }
        aliases
    }

    /// Rules with every column name mapped to its canonical name.
    pub fn resolved_rules(&self) -> Vec<ImmutabilityRule> {
        let aliases = self.header_aliases();
        self.rules.iter().map(|rule| resolve_rule(rule, &aliases)).collect()
    }
}

fn resolve_rule(rule: &ImmutabilityRule, aliases: &HeaderAliases) -> ImmutabilityRule {
    match rule {
        ImmutabilityRule::Exact { column, value } => ImmutabilityRule::Exact {
            column: aliases.canonical(column).to_string(),
            value: value.clone(),
        },
        ImmutabilityRule::Contains { column, value } => ImmutabilityRule::Contains {
            column: aliases.canonical(column).to_string(),
            value: value.clone(),
        },
        ImmutabilityRule::InList { column, list_name } => ImmutabilityRule::InList {
            column: aliases.canonical(column).to_string(),
            list_name: list_name.clone(),
        },
        ImmutabilityRule::CompoundAnd { sub_rules } => ImmutabilityRule::CompoundAnd {
            sub_rules: sub_rules.iter().map(|r| resolve_rule(r, aliases)).collect(),
        },
        ImmutabilityRule::Unsupported => ImmutabilityRule::Unsupported,
    }
}

/// Maps source CSV headers onto canonical column names.
#[derive(Debug, Clone)]
pub struct HeaderAliases {
    map: BTreeMap<String, String>,
}

impl HeaderAliases {
    pub fn insert(&mut self, source: impl Into<String>, canonical: impl Into<String>) {
        self.map.insert(source.into(), canonical.into());
    }

    /// Canonical name for `header`; unknown headers map to themselves.
    pub fn canonical<'a>(&'a self, header: &'a str) -> &'a str {
        self.map.get(header).map(String::as_str).unwrap_or(header)
    }
}

impl Default for HeaderAliases {
    fn default() -> Self {
        let map = [
            ("ID_Aviario", columns::UNIT_ID),
            ("ID_Nucleo", columns::NUCLEUS_ID),
            ("Microrregiao", columns::MICROREGION_ID),
            ("Latitude", columns::LATITUDE),
            ("Longitude", columns::LONGITUDE),
            ("Nome_Produtor", columns::PRODUCER_NAME),
            ("Extensionista", columns::CURRENT_AGENT),
            ("Extensionista_Atual", columns::CURRENT_AGENT),
            ("Extensionista_Proposto", columns::PROPOSED_AGENT),
            ("immutable_allocation", columns::IMMUTABLE),
        ]
        .into_iter()
        .map(|(source, canonical)| (source.to_string(), canonical.to_string()))
        .collect();
        Self { map }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: RunConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.allocation.target_min, 40);
        assert!(config.rules.is_empty());
        assert!(config.rosters.is_empty());
    }

    #[test]
    fn test_rule_columns_resolve_through_aliases() {
        let config: RunConfig = serde_json::from_str(
            r#"{
                "rules": [{"type": "compound_and", "sub_rules": [
                    {"type": "in_list", "column": "Extensionista_Atual", "list_name": "a"},
                    {"type": "exact", "column": "Municipio", "value": "Chapecó"}
                ]}],
                "aliases": {"Municipio": "municipality"}
            }"#,
        )
        .unwrap();

        let resolved = config.resolved_rules();

        let ImmutabilityRule::CompoundAnd { sub_rules } = &resolved[0] else {
            panic!("expected compound rule, got {:?}", resolved[0]);
        };
        assert_eq!(
            sub_rules[0],
            ImmutabilityRule::InList {
                column: "current_agent".to_string(),
                list_name: "a".to_string(),
            }
        );
        assert_eq!(
            sub_rules[1],
            ImmutabilityRule::Exact {
                column: "municipality".to_string(),
                value: "Chapecó".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_headers_pass_through() {
        let aliases = HeaderAliases::default();
        assert_eq!(aliases.canonical("ID_Aviario"), "unit_id");
        assert_eq!(aliases.canonical("unit_id"), "unit_id");
        assert_eq!(aliases.canonical("Area_m2"), "Area_m2");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{"allocation": {"target_min": 10, "target_max": 12},
                "rosters": [{"name": "p", "file": "p.csv", "column": "Nome_Produtor"}]}"#,
        )
        .unwrap();

        let config = RunConfig::load(&path).unwrap();

        assert_eq!(config.allocation.target_max, 12);
        assert_eq!(config.rosters[0].file, PathBuf::from("p.csv"));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = RunConfig::load("/nonexistent/run.json").unwrap_err();
        assert!(err.to_string().contains("reading run config"));
    }
}
