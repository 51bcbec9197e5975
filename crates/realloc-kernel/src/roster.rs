//! Named rosters of producers or agents referenced by `in_list` rules.

use std::collections::{HashMap, HashSet};

/// A named, ordered list of values. Loaded once, never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    name: String,
    entries: Vec<String>,
    lookup: HashSet<String>,
}

impl Roster {
    pub fn new(name: impl Into<String>, entries: Vec<String>) -> Self {
        let lookup = entries.iter().cloned().collect();
        Self {
            name: name.into(),
            entries,
            lookup,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.lookup.contains(value)
    }
}

/// Rosters keyed by name.
#[derive(Debug, Clone, Default)]
pub struct RosterSet {
    rosters: HashMap<String, Roster>,
}

impl RosterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a roster, replacing any previous roster of the same name.
    pub fn insert(&mut self, roster: Roster) {
        self.rosters.insert(roster.name().to_string(), roster);
    }

    pub fn with(mut self, roster: Roster) -> Self {
        self.insert(roster);
        self
    }

    /// Look up a roster usable for membership tests.
    ///
    /// Unknown names and empty rosters both resolve to `None`.
    pub fn resolve(&self, name: &str) -> Option<&Roster> {
        self.rosters.get(name).filter(|r| !r.is_empty())
    }

    pub fn len(&self) -> usize {
        self.rosters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rosters.is_empty()
    }
}

impl FromIterator<Roster> for RosterSet {
    fn from_iter<I: IntoIterator<Item = Roster>>(iter: I) -> Self {
        let mut set = Self::new();
        for roster in iter {
            set.insert(roster);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_skips_empty_and_unknown() {
        let rosters = RosterSet::new()
            .with(Roster::new("immutable_producers", vec!["Farm A".to_string()]))
            .with(Roster::new("immutable_extensionists", Vec::new()));

        assert!(rosters.resolve("immutable_producers").is_some());
        assert!(rosters.resolve("immutable_extensionists").is_none());
        assert!(rosters.resolve("nope").is_none());
    }

    #[test]
    fn test_contains_is_exact() {
        let roster = Roster::new("r", vec!["Ana".to_string(), "Bruno".to_string()]);
        assert!(roster.contains("Ana"));
        assert!(!roster.contains("ana"));
        assert_eq!(roster.entries(), ["Ana", "Bruno"]);
    }
}
