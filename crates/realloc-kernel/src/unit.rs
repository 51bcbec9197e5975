//! Unit types: the geographically located work items being reassigned.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Canonical names of the built-in unit columns.
///
/// Immutability rules address columns by these names; anything else must be
/// a pass-through attribute of the table.
pub mod columns {
    pub const UNIT_ID: &str = "unit_id";
    pub const NUCLEUS_ID: &str = "nucleus_id";
    pub const MICROREGION_ID: &str = "microregion_id";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
    pub const PRODUCER_NAME: &str = "producer_name";
    pub const CURRENT_AGENT: &str = "current_agent";
    pub const IMMUTABLE: &str = "immutable";
    pub const PROPOSED_AGENT: &str = "proposed_agent";

    /// Built-in columns that rules may reference.
    pub const BUILT_IN: [&str; 7] = [
        UNIT_ID,
        NUCLEUS_ID,
        MICROREGION_ID,
        LATITUDE,
        LONGITUDE,
        PRODUCER_NAME,
        CURRENT_AGENT,
    ];
}

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build a coordinate pair, rejecting non-finite components.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        (latitude.is_finite() && longitude.is_finite()).then_some(Self {
            latitude,
            longitude,
        })
    }

    /// Squared planar distance; good enough for grouping nearby units.
    #[inline]
    pub fn distance_squared(&self, other: &Coordinates) -> f64 {
        let dlat = self.latitude - other.latitude;
        let dlon = self.longitude - other.longitude;
        dlat * dlat + dlon * dlon
    }
}

/// One work unit (aviary) and its current and proposed assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographicUnit {
    pub unit_id: String,
    pub nucleus_id: String,
    /// Microregion, or the configured "no microregion" sentinel
    pub microregion_id: String,
    /// Required for partitioning; `None` aborts optimization
    pub coordinates: Option<Coordinates>,
    pub producer_name: String,
    pub current_agent: String,
    /// Frozen units keep their current agent no matter what
    pub immutable: bool,
    /// Set by the agent mapper
    pub proposed_agent: Option<String>,
    /// Pass-through columns; absent keys are missing values
    pub attributes: BTreeMap<String, String>,
}

impl GeographicUnit {
    /// Create a movable unit with no proposal and no extra attributes.
    pub fn new(
        unit_id: impl Into<String>,
        nucleus_id: impl Into<String>,
        microregion_id: impl Into<String>,
        coordinates: Option<Coordinates>,
        producer_name: impl Into<String>,
        current_agent: impl Into<String>,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            nucleus_id: nucleus_id.into(),
            microregion_id: microregion_id.into(),
            coordinates,
            producer_name: producer_name.into(),
            current_agent: current_agent.into(),
            immutable: false,
            proposed_agent: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Value of a column for this unit; `None` when the value is missing.
    ///
    /// Callers check the column exists on the table first; this only answers
    /// for a single row.
    pub fn value(&self, column: &str) -> Option<Cow<'_, str>> {
        match column {
            columns::UNIT_ID => Some(Cow::Borrowed(&self.unit_id)),
            columns::NUCLEUS_ID => Some(Cow::Borrowed(&self.nucleus_id)),
            columns::MICROREGION_ID => Some(Cow::Borrowed(&self.microregion_id)),
            columns::PRODUCER_NAME => Some(Cow::Borrowed(&self.producer_name)),
            columns::CURRENT_AGENT => Some(Cow::Borrowed(&self.current_agent)),
            columns::LATITUDE => self.coordinates.map(|c| Cow::Owned(c.latitude.to_string())),
            columns::LONGITUDE => self.coordinates.map(|c| Cow::Owned(c.longitude.to_string())),
            other => self.attributes.get(other).map(|v| Cow::Borrowed(v.as_str())),
        }
    }
}

/// An ordered table of units plus the names of its pass-through columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitTable {
    units: Vec<GeographicUnit>,
    attribute_columns: Vec<String>,
}

impl UnitTable {
    /// Create a table with an explicit pass-through schema.
    pub fn new(units: Vec<GeographicUnit>, attribute_columns: Vec<String>) -> Self {
        Self {
            units,
            attribute_columns,
        }
    }

    /// Create a table whose schema is the union of the units' attribute keys.
    pub fn from_units(units: Vec<GeographicUnit>) -> Self {
        let mut attribute_columns: Vec<String> = Vec::new();
        for unit in &units {
            for key in unit.attributes.keys() {
                if !attribute_columns.contains(key) {
                    attribute_columns.push(key.clone());
                }
            }
        }
        Self::new(units, attribute_columns)
    }

    pub fn units(&self) -> &[GeographicUnit] {
        &self.units
    }

    pub fn units_mut(&mut self) -> &mut [GeographicUnit] {
        &mut self.units
    }

    pub fn into_units(self) -> Vec<GeographicUnit> {
        self.units
    }

    pub fn attribute_columns(&self) -> &[String] {
        &self.attribute_columns
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Whether a column of this name exists (built-in or pass-through).
    pub fn has_column(&self, name: &str) -> bool {
        columns::BUILT_IN.contains(&name) || self.attribute_columns.iter().any(|c| c == name)
    }

    /// Number of units flagged immutable.
    pub fn immutable_count(&self) -> usize {
        self.units.iter().filter(|u| u.immutable).count()
    }

    /// Distinct current agents in first-appearance order.
    pub fn current_agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = Vec::new();
        for unit in &self.units {
            if !agents.contains(&unit.current_agent) {
                agents.push(unit.current_agent.clone());
            }
        }
        agents
    }

    /// All coordinates, or the id of the first unit lacking them.
    pub fn coordinates(&self) -> Result<Vec<Coordinates>, String> {
        self.units
            .iter()
            .map(|u| u.coordinates.ok_or_else(|| u.unit_id.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: &str) -> GeographicUnit {
        GeographicUnit::new(id, "N1", "M1", Coordinates::new(-27.1, -52.6), "Farm", "Ana")
    }

    #[test]
    fn test_non_finite_coordinates_rejected() {
        assert!(Coordinates::new(f64::NAN, 1.0).is_none());
        assert!(Coordinates::new(1.0, f64::INFINITY).is_none());
        assert!(Coordinates::new(-27.0, -52.0).is_some());
    }

    #[test]
    fn test_value_reads_builtin_and_attribute_columns() {
        let mut u = unit("A1");
        u.attributes.insert("area".to_string(), "Oeste".to_string());

        assert_eq!(u.value(columns::CURRENT_AGENT).as_deref(), Some("Ana"));
        assert_eq!(u.value("area").as_deref(), Some("Oeste"));
        assert_eq!(u.value("missing"), None);
    }

    #[test]
    fn test_has_column() {
        let mut u = unit("A1");
        u.attributes.insert("area".to_string(), "Oeste".to_string());
        let table = UnitTable::from_units(vec![u]);

        assert!(table.has_column(columns::PRODUCER_NAME));
        assert!(table.has_column("area"));
        assert!(!table.has_column("Extensionista"));
    }

    #[test]
    fn test_coordinates_reports_first_missing_unit() {
        let mut missing = unit("A2");
        missing.coordinates = None;
        let table = UnitTable::from_units(vec![unit("A1"), missing, unit("A3")]);
        assert_eq!(table.coordinates(), Err("A2".to_string()));
    }

    #[test]
    fn test_current_agents_keeps_first_appearance_order() {
        let mut b = unit("A2");
        b.current_agent = "Bruno".to_string();
        let table = UnitTable::from_units(vec![b, unit("A1"), unit("A3")]);
        assert_eq!(table.current_agents(), vec!["Bruno", "Ana"]);
    }
}
