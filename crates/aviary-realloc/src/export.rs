//! CSV output for unit tables.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use realloc_kernel::{UnitTable, columns};

use crate::loader::DELIMITER;

/// Write `table` as a `;`-delimited CSV with `.` decimals.
///
/// Built-in columns come first, then pass-through attributes in table order,
/// then `immutable` and `proposed_agent`. Parent directories are created.
pub fn write_units(path: impl AsRef<Path>, table: &UnitTable) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut header: Vec<&str> = columns::BUILT_IN.to_vec();
    header.extend(table.attribute_columns().iter().map(String::as_str));
    header.push(columns::IMMUTABLE);
    header.push(columns::PROPOSED_AGENT);
    writer.write_record(&header)?;

    for unit in table.units() {
        let (latitude, longitude) = match unit.coordinates {
            Some(c) => (c.latitude.to_string(), c.longitude.to_string()),
            None => (String::new(), String::new()),
        };
        let mut record = vec![
            unit.unit_id.clone(),
            unit.nucleus_id.clone(),
            unit.microregion_id.clone(),
            latitude,
            longitude,
            unit.producer_name.clone(),
            unit.current_agent.clone(),
        ];
        for column in table.attribute_columns() {
            record.push(unit.attributes.get(column).cloned().unwrap_or_default());
        }
        record.push(unit.immutable.to_string());
        record.push(unit.proposed_agent.clone().unwrap_or_default());
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(file = %path.display(), units = table.len(), "Units exported");
    Ok(())
}
