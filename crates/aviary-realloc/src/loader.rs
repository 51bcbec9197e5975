//! CSV input: the aviary export and the immutability rosters.
//!
//! Source files are `;`-delimited and may use a decimal comma in the
//! coordinate columns.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{error, info, warn};

use realloc_kernel::{Coordinates, GeographicUnit, NO_MICROREGION, Roster, UnitTable, columns};

use crate::config::HeaderAliases;

pub const DELIMITER: u8 = b';';

/// Columns without which a unit has no identity.
const REQUIRED: [&str; 3] = [columns::UNIT_ID, columns::NUCLEUS_ID, columns::CURRENT_AGENT];

/// Parse a number written with either a decimal comma or a decimal point.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.replace(',', ".").parse().ok()
}

/// Parse a boolean flag column; anything unrecognised is `false`.
fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "sim" | "verdadeiro"
    )
}

/// Header positions after alias resolution.
struct Layout {
    builtin: BTreeMap<&'static str, usize>,
    attributes: Vec<(String, usize)>,
}

impl Layout {
    fn from_headers(headers: &csv::StringRecord, aliases: &HeaderAliases) -> Self {
        const KNOWN: [&str; 9] = [
            columns::UNIT_ID,
            columns::NUCLEUS_ID,
            columns::MICROREGION_ID,
            columns::LATITUDE,
            columns::LONGITUDE,
            columns::PRODUCER_NAME,
            columns::CURRENT_AGENT,
            columns::IMMUTABLE,
            columns::PROPOSED_AGENT,
        ];

        let mut builtin = BTreeMap::new();
        let mut attributes = Vec::new();
        for (index, header) in headers.iter().enumerate() {
            let canonical = aliases.canonical(header);
            match KNOWN.iter().find(|k| **k == canonical) {
                // First occurrence wins ("Extensionista" and "Extensionista_Atual" both present).
                Some(known) => {
                    builtin.entry(*known).or_insert(index);
                }
                None => attributes.push((header.to_string(), index)),
            }
        }
        Self { builtin, attributes }
    }

    fn get<'r>(&self, record: &'r csv::StringRecord, column: &str) -> Option<&'r str> {
        self.builtin.get(column).and_then(|&i| record.get(i))
    }
}

/// Load the aviary table from a `;`-delimited CSV file.
///
/// Source headers are mapped onto canonical columns through `aliases`;
/// unrecognised headers are kept as pass-through attributes. A missing
/// microregion column or cell loads as the "no microregion" sentinel;
/// missing or unparsable coordinates load as `None`.
///
/// # Errors
///
/// Fails when the file cannot be read or lacks a unit id, nucleus id or
/// current agent column.
pub fn load_units(path: impl AsRef<Path>, aliases: &HeaderAliases) -> Result<UnitTable> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("reading headers of {}", path.display()))?
        .clone();
    let layout = Layout::from_headers(&headers, aliases);

    let missing: Vec<&str> = REQUIRED
        .iter()
        .copied()
        .filter(|c| !layout.builtin.contains_key(c))
        .collect();
    if !missing.is_empty() {
        bail!("{} is missing required columns: {}", path.display(), missing.join(", "));
    }
    for optional in [columns::MICROREGION_ID, columns::PRODUCER_NAME, columns::LATITUDE, columns::LONGITUDE] {
        if !layout.builtin.contains_key(optional) {
            warn!(file = %path.display(), column = optional, "Column not found");
        }
    }

    let mut units = Vec::new();
    let mut without_coordinates = 0;
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading row {} of {}", row + 1, path.display()))?;
        let field = |column: &str| layout.get(&record, column).unwrap_or_default();

        let microregion = match field(columns::MICROREGION_ID) {
            "" => NO_MICROREGION,
            value => value,
        };
        let coordinates = match (
            parse_decimal(field(columns::LATITUDE)),
            parse_decimal(field(columns::LONGITUDE)),
        ) {
            (Some(lat), Some(lon)) => Coordinates::new(lat, lon),
            _ => None,
        };
        if coordinates.is_none() {
            without_coordinates += 1;
        }

        let mut unit = GeographicUnit::new(
            field(columns::UNIT_ID),
            field(columns::NUCLEUS_ID),
            microregion,
            coordinates,
            field(columns::PRODUCER_NAME),
            field(columns::CURRENT_AGENT),
        );
        unit.immutable = parse_flag(field(columns::IMMUTABLE));
        unit.proposed_agent = layout
            .get(&record, columns::PROPOSED_AGENT)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        for (name, index) in &layout.attributes {
            if let Some(value) = record.get(*index).filter(|v| !v.is_empty()) {
                unit.attributes.insert(name.clone(), value.to_string());
            }
        }
        units.push(unit);
    }

    if without_coordinates > 0 {
        warn!(file = %path.display(), units = without_coordinates, "Units without usable coordinates");
    }
    info!(file = %path.display(), units = units.len(), "Units loaded");

    let attribute_columns = layout.attributes.into_iter().map(|(name, _)| name).collect();
    Ok(UnitTable::new(units, attribute_columns))
}

/// Load one column of a `;`-delimited CSV file as a named roster.
///
/// Never fails: a missing file or column yields an empty roster, which
/// degrades every rule that refers to it.
pub fn load_roster(name: &str, path: impl AsRef<Path>, column: &str) -> Roster {
    let path = path.as_ref();
    match read_column(path, column) {
        Ok(Some(entries)) => {
            info!(roster = name, file = %path.display(), entries = entries.len(), "Roster loaded");
            Roster::new(name, entries)
        }
        Ok(None) => {
            warn!(roster = name, file = %path.display(), column, "Roster column not found; using an empty roster");
            Roster::new(name, Vec::new())
        }
        Err(e) => {
            error!(roster = name, file = %path.display(), error = %e, "Failed to load roster; using an empty roster");
            Roster::new(name, Vec::new())
        }
    }
}

fn read_column(path: &Path, column: &str) -> Result<Option<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;
    let Some(index) = reader.headers()?.iter().position(|h| h == column) else {
        return Ok(None);
    };

    let mut entries = Vec::new();
    for record in reader.records() {
        if let Some(value) = record?.get(index).filter(|v| !v.is_empty()) {
            entries.push(value.to_string());
        }
    }
    Ok(Some(entries))
}
