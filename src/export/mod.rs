//! Result export: persisting optimized settings with enough metadata to
//! reproduce the run (configuration snapshot, seed, schema version).

use crate::config::Config;
use crate::runner::OptimizedScenario;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Batch export with full metadata for reproducibility.
#[derive(Serialize, Deserialize)]
pub struct OptimizationExport {
    /// Schema version for forward/backward compatibility
    pub schema_version: String,
    /// Unix timestamp when the export was generated
    pub generated_at: u64,
    /// Snapshot of the configuration the batch ran with
    pub config: Config,
    /// Per-scenario results, in batch order
    pub scenarios: Vec<ScenarioExport>,
}

/// One scenario's optimized settings and before/after metrics.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScenarioExport {
    pub scenario_id: String,
    pub relays: Vec<RelayExport>,
    pub before_tmt: Option<f64>,
    pub after_tmt: f64,
    pub before_coordination_pct: Option<f64>,
    pub after_coordination_pct: f64,
    pub best_generation: usize,
    pub generations_run: usize,
}

/// Optimized settings for a single relay.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RelayExport {
    pub relay: String,
    pub tds: f64,
    pub pickup: f64,
}

impl From<&OptimizedScenario> for ScenarioExport {
    fn from(optimized: &OptimizedScenario) -> Self {
        Self {
            scenario_id: optimized.scenario_id.clone(),
            relays: optimized
                .relays
                .iter()
                .map(|r| RelayExport {
                    relay: r.id.clone(),
                    tds: r.tds,
                    pickup: r.pickup,
                })
                .collect(),
            before_tmt: optimized.before.map(|m| m.tmt),
            after_tmt: optimized.after.tmt,
            before_coordination_pct: optimized.before.map(|m| m.coordination_pct),
            after_coordination_pct: optimized.after.coordination_pct,
            best_generation: optimized.best_generation,
            generations_run: optimized.generations_run,
        }
    }
}

impl OptimizationExport {
    pub fn new(config: Config, results: &[OptimizedScenario]) -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            generated_at: chrono::Utc::now().timestamp() as u64,
            config,
            scenarios: results.iter().map(ScenarioExport::from).collect(),
        }
    }
}

/// Writes an export to a JSON file.
pub fn write_export_to_json(
    export: &OptimizationExport,
    output_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(export)?;
    std::fs::write(output_path, json)?;
    Ok(())
}

/// Reads an export back from a JSON file.
pub fn read_export_from_json(
    input_path: &Path,
) -> Result<OptimizationExport, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(input_path)?;
    let export: OptimizationExport = serde_json::from_str(&content)?;
    Ok(export)
}
