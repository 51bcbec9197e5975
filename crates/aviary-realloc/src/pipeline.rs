//! The end-to-end reallocation run: load, flag, optimize, export, summarize.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use tracing::info;

use realloc_kernel::{Reallocator, RosterSet, UnitTable};

use crate::config::RunConfig;
use crate::export::write_units;
use crate::loader::{load_roster, load_units};
use crate::report::RunReport;
use crate::summary::{summarize, write_summary};

pub const ALLOCATION_FILE: &str = "final_optimized_allocation.csv";
pub const SUMMARY_FILE: &str = "producers_by_extensionist_summary.csv";
pub const REPORT_FILE: &str = "run_report.json";

/// Generate a timestamped output path from the given path.
/// e.g., "run_report.json" -> "run_report-20260108-010530.json"
pub fn timestamped_path(path: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("run_report");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("json");
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!("{}-{}.{}", stem, timestamp, ext))
}

/// Runs the reallocation pipeline for one configuration.
pub struct Pipeline {
    config: RunConfig,
    assets_dir: PathBuf,
    reallocator: Reallocator,
}

impl Pipeline {
    /// Roster files named in `config` are resolved against `assets_dir`.
    pub fn new(config: RunConfig, assets_dir: impl Into<PathBuf>) -> Self {
        let reallocator = Reallocator::new(config.allocation.clone());
        Self {
            config,
            assets_dir: assets_dir.into(),
            reallocator,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Load every configured roster; unreadable ones come back empty.
    pub fn load_rosters(&self) -> RosterSet {
        self.config
            .rosters
            .iter()
            .map(|source| {
                let path = self.assets_dir.join(&source.file);
                load_roster(&source.name, path, &source.column)
            })
            .collect()
    }

    /// Load `input` and set immutable flags.
    pub fn flag(&self, input: &Path) -> Result<UnitTable> {
        let table = load_units(input, &self.config.header_aliases())?;
        let rosters = self.load_rosters();
        Ok(self
            .reallocator
            .apply_immutability(&table, &self.config.resolved_rules(), &rosters))
    }

    /// Full run. Writes the optimized table, the agent summary and a run
    /// report into `output_dir` and returns the report.
    pub fn run(&self, input: &Path, output_dir: &Path) -> Result<RunReport> {
        let started_at = Utc::now();
        let flagged = self.flag(input)?;
        let current_agents = flagged.current_agents();

        let allocation = self
            .reallocator
            .optimize_allocation(&flagged, &current_agents)
            .with_context(|| format!("optimizing allocation for {}", input.display()))?;

        let allocation_path = output_dir.join(ALLOCATION_FILE);
        write_units(&allocation_path, &allocation.table)?;

        let summary_path = output_dir.join(SUMMARY_FILE);
        write_summary(&summary_path, &summarize(&allocation.table))?;

        let mut report = RunReport::new(started_at, input, current_agents.len(), &allocation);
        report.add_output(&allocation_path);
        report.add_output(&summary_path);
        let report_path = timestamped_path(&output_dir.join(REPORT_FILE));
        report.add_output(&report_path);
        report.save(&report_path)?;

        info!(
            run_id = %report.run_id,
            units = report.total_units,
            reassigned = report.reassigned_units,
            output_dir = %output_dir.display(),
            "Reallocation run complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RosterSource;
    use realloc_kernel::{AllocationConfig, ImmutabilityRule};

    /// Two clusters of four aviaries; AV2 is frozen on Bruno inside Ana's cluster.
    const EXPORT: &str = "ID_Aviario;ID_Nucleo;Microrregiao;Latitude;Longitude;Nome_Produtor;Extensionista\n\
        AV1;N1;Oeste;-27,000;-52,000;João;Ana\n\
        AV2;N1;Oeste;-27,001;-52,001;Maria;Bruno\n\
        AV3;N2;Oeste;-27,002;-52,002;Pedro;Ana\n\
        AV4;N2;Oeste;-27,003;-52,003;Pedro;Ana\n\
        AV5;N3;Norte;-20,000;-50,000;Lia;Bruno\n\
        AV6;N3;Norte;-20,001;-50,001;Lia;Bruno\n\
        AV7;N4;Norte;-20,002;-50,002;Rui;Bruno\n\
        AV8;N4;Norte;-20,003;-50,003;Rui;Bruno\n";

    fn setup() -> (tempfile::TempDir, Pipeline) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("exportation.csv"), EXPORT).unwrap();
        std::fs::write(dir.path().join("producers.csv"), "Nome_Produtor\nMaria\n").unwrap();

        let config = RunConfig {
            allocation: AllocationConfig {
                target_min: 4,
                target_max: 4,
                ..Default::default()
            },
            rules: vec![ImmutabilityRule::InList {
                column: "Nome_Produtor".to_string(),
                list_name: "immutable_producers".to_string(),
            }],
            rosters: vec![RosterSource {
                name: "immutable_producers".to_string(),
                file: PathBuf::from("producers.csv"),
                column: "Nome_Produtor".to_string(),
            }],
            ..Default::default()
        };
        let pipeline = Pipeline::new(config, dir.path());
        (dir, pipeline)
    }

    #[test]
    fn test_flag_uses_source_header_rules() {
        let (dir, pipeline) = setup();

        let flagged = pipeline.flag(&dir.path().join("exportation.csv")).unwrap();

        assert_eq!(flagged.immutable_count(), 1);
        assert!(flagged.units()[1].immutable);
    }

    #[test]
    fn test_run_writes_outputs() {
        let (dir, pipeline) = setup();
        let output_dir = dir.path().join("exports");

        let report = pipeline.run(&dir.path().join("exportation.csv"), &output_dir).unwrap();

        assert_eq!(report.total_units, 8);
        assert_eq!(report.immutable_units, 1);
        assert_eq!(report.reassigned_units, 0);
        assert_eq!(report.outputs.len(), 3);
        assert!(report.outputs.iter().all(|p| p.exists()));

        let optimized = load_units(output_dir.join(ALLOCATION_FILE), &Default::default()).unwrap();
        let proposed: Vec<_> = optimized
            .units()
            .iter()
            .map(|u| u.proposed_agent.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(
            proposed,
            vec!["Ana", "Bruno", "Ana", "Ana", "Bruno", "Bruno", "Bruno", "Bruno"]
        );
    }

    #[test]
    fn test_run_fails_on_missing_input() {
        let (dir, pipeline) = setup();
        assert!(pipeline.run(&dir.path().join("absent.csv"), dir.path()).is_err());
    }

    #[test]
    fn test_timestamped_path() {
        let path = timestamped_path(Path::new("exports/run_report.json"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("run_report-"));
        assert!(name.ends_with(".json"));
        assert_eq!(path.parent(), Some(Path::new("exports")));
    }
}
