//! Immutability rules: declarative predicates that freeze units in place.
//!
//! Rules are a closed set of variants deserialized from configuration:
//!
//! ```json
//! [
//!   {"type": "compound_and", "sub_rules": [
//!     {"type": "in_list", "column": "current_agent", "list_name": "immutable_extensionists"},
//!     {"type": "in_list", "column": "producer_name", "list_name": "immutable_producers"}
//!   ]},
//!   {"type": "contains", "column": "producer_name", "value": "Cooperativa"}
//! ]
//! ```
//!
//! A rule that cannot be evaluated (missing column, unknown or empty roster,
//! unsupported type) is *degraded*: it matches no unit and a warning is logged.
//! Degradation never propagates past the top-level rule it occurred in.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::roster::RosterSet;
use crate::unit::UnitTable;

/// A single immutability predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImmutabilityRule {
    /// Column value equals `value`
    Exact { column: String, value: String },
    /// Column value contains `value`; missing values never match
    Contains { column: String, value: String },
    /// Column value is a member of the named roster
    InList { column: String, list_name: String },
    /// Every sub-rule matches
    CompoundAnd { sub_rules: Vec<ImmutabilityRule> },
    /// Any rule type this build does not know about
    #[serde(other)]
    Unsupported,
}

/// Why a rule could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    MissingColumn(String),
    UnknownRoster(String),
    Unsupported,
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::MissingColumn(column) => write!(f, "column '{column}' not found"),
            Degradation::UnknownRoster(name) => write!(f, "roster '{name}' not found or empty"),
            Degradation::Unsupported => write!(f, "unsupported rule type"),
        }
    }
}

impl ImmutabilityRule {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ImmutabilityRule::Exact { .. } => "exact",
            ImmutabilityRule::Contains { .. } => "contains",
            ImmutabilityRule::InList { .. } => "in_list",
            ImmutabilityRule::CompoundAnd { .. } => "compound_and",
            ImmutabilityRule::Unsupported => "unsupported",
        }
    }

    /// Evaluate this rule against every unit of the table.
    pub fn evaluate(
        &self,
        table: &UnitTable,
        rosters: &RosterSet,
    ) -> Result<Vec<bool>, Degradation> {
        match self {
            ImmutabilityRule::Exact { column, value } => {
                require_column(table, column)?;
                Ok(table
                    .units()
                    .iter()
                    .map(|u| u.value(column).is_some_and(|v| v == value.as_str()))
                    .collect())
            }
            ImmutabilityRule::Contains { column, value } => {
                require_column(table, column)?;
                Ok(table
                    .units()
                    .iter()
                    .map(|u| u.value(column).is_some_and(|v| v.contains(value.as_str())))
                    .collect())
            }
            ImmutabilityRule::InList { column, list_name } => {
                require_column(table, column)?;
                let roster = rosters
                    .resolve(list_name)
                    .ok_or_else(|| Degradation::UnknownRoster(list_name.clone()))?;
                Ok(table
                    .units()
                    .iter()
                    .map(|u| u.value(column).is_some_and(|v| roster.contains(&v)))
                    .collect())
            }
            ImmutabilityRule::CompoundAnd { sub_rules } => {
                let mut matched = vec![true; table.len()];
                for sub_rule in sub_rules {
                    let sub = sub_rule.evaluate(table, rosters)?;
                    for (m, s) in matched.iter_mut().zip(sub) {
                        *m &= s;
                    }
                }
                Ok(matched)
            }
            ImmutabilityRule::Unsupported => Err(Degradation::Unsupported),
        }
    }
}

fn require_column(table: &UnitTable, column: &str) -> Result<(), Degradation> {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(Degradation::MissingColumn(column.to_string()))
    }
}

/// OR every rule's matches into one flag per unit.
///
/// Degraded rules contribute nothing; the rest are unaffected.
pub fn evaluate_rules(
    table: &UnitTable,
    rules: &[ImmutabilityRule],
    rosters: &RosterSet,
) -> Vec<bool> {
    let mut flags = vec![false; table.len()];

    for (index, rule) in rules.iter().enumerate() {
        match rule.evaluate(table, rosters) {
            Ok(matched) => {
                let hits = matched.iter().filter(|m| **m).count();
                info!(rule = index, kind = rule.kind(), hits, "Immutability rule evaluated");
                for (flag, m) in flags.iter_mut().zip(matched) {
                    *flag |= m;
                }
            }
            Err(reason) => {
                warn!(
                    rule = index,
                    kind = rule.kind(),
                    reason = %reason,
                    "Immutability rule degraded; it matches no units"
                );
            }
        }
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::Roster;
    use crate::unit::{columns, Coordinates, GeographicUnit};

    fn table() -> UnitTable {
        let mut units = vec![
            GeographicUnit::new("A1", "N1", "M1", Coordinates::new(0.0, 0.0), "Granja Sol", "Ana"),
            GeographicUnit::new("A2", "N1", "M1", Coordinates::new(0.0, 0.1), "Sitio Lua", "Bruno"),
            GeographicUnit::new("A3", "N2", "M2", Coordinates::new(1.0, 1.0), "Granja Mar", "Ana"),
        ];
        units[1]
            .attributes
            .insert("area".to_string(), "Oeste".to_string());
        UnitTable::new(units, vec!["area".to_string()])
    }

    fn rosters() -> RosterSet {
        RosterSet::new()
            .with(Roster::new("immutable_extensionists", vec!["Ana".to_string()]))
            .with(Roster::new("immutable_producers", vec!["Granja Mar".to_string()]))
            .with(Roster::new("empty", Vec::new()))
    }

    fn in_list(column: &str, list: &str) -> ImmutabilityRule {
        ImmutabilityRule::InList {
            column: column.to_string(),
            list_name: list.to_string(),
        }
    }

    #[test]
    fn test_exact_and_contains() {
        let exact = ImmutabilityRule::Exact {
            column: columns::CURRENT_AGENT.to_string(),
            value: "Bruno".to_string(),
        };
        assert_eq!(exact.evaluate(&table(), &rosters()), Ok(vec![false, true, false]));

        let contains = ImmutabilityRule::Contains {
            column: columns::PRODUCER_NAME.to_string(),
            value: "Granja".to_string(),
        };
        assert_eq!(contains.evaluate(&table(), &rosters()), Ok(vec![true, false, true]));
    }

    #[test]
    fn test_contains_treats_missing_values_as_non_matching() {
        let rule = ImmutabilityRule::Contains {
            column: "area".to_string(),
            value: "".to_string(),
        };
        // Only A2 carries a value for "area"; an empty needle matches any present value.
        assert_eq!(rule.evaluate(&table(), &rosters()), Ok(vec![false, true, false]));
    }

    #[test]
    fn test_compound_and() {
        let rule = ImmutabilityRule::CompoundAnd {
            sub_rules: vec![
                in_list(columns::CURRENT_AGENT, "immutable_extensionists"),
                in_list(columns::PRODUCER_NAME, "immutable_producers"),
            ],
        };
        assert_eq!(rule.evaluate(&table(), &rosters()), Ok(vec![false, false, true]));
    }

    #[test]
    fn test_compound_fails_closed_on_degraded_sub_rule() {
        let rule = ImmutabilityRule::CompoundAnd {
            sub_rules: vec![
                in_list(columns::CURRENT_AGENT, "immutable_extensionists"),
                in_list(columns::PRODUCER_NAME, "empty"),
            ],
        };
        assert_eq!(
            rule.evaluate(&table(), &rosters()),
            Err(Degradation::UnknownRoster("empty".to_string()))
        );
    }

    #[test]
    fn test_degraded_rule_does_not_affect_others() {
        let rules = vec![
            ImmutabilityRule::Exact {
                column: "Extensionista".to_string(),
                value: "Ana".to_string(),
            },
            ImmutabilityRule::Unsupported,
            in_list(columns::CURRENT_AGENT, "missing_roster"),
            in_list(columns::PRODUCER_NAME, "immutable_producers"),
        ];
        assert_eq!(evaluate_rules(&table(), &rules, &rosters()), vec![false, false, true]);
    }

    #[test]
    fn test_or_is_monotonic() {
        let rules = vec![
            in_list(columns::CURRENT_AGENT, "immutable_extensionists"),
            ImmutabilityRule::Exact {
                column: columns::UNIT_ID.to_string(),
                value: "nope".to_string(),
            },
        ];
        assert_eq!(evaluate_rules(&table(), &rules, &rosters()), vec![true, false, true]);
    }

    #[test]
    fn test_unknown_type_deserializes_to_unsupported() {
        let rules: Vec<ImmutabilityRule> = serde_json::from_str(
            r#"[
                {"type": "regex", "column": "producer_name", "value": ".*"},
                {"type": "in_list", "column": "current_agent", "list_name": "immutable_extensionists"}
            ]"#,
        )
        .unwrap();
        assert_eq!(rules[0], ImmutabilityRule::Unsupported);
        assert_eq!(rules[1].kind(), "in_list");
    }

    #[test]
    fn test_no_rules_flags_nothing() {
        assert_eq!(evaluate_rules(&table(), &[], &rosters()), vec![false; 3]);
    }
}
