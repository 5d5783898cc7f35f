//! Scenario data: relays, main/backup pairs, and JSON ingestion.
//!
//! The input format is a flat list of relay-pair records, each tagged with a
//! scenario id. Records are grouped into [`Scenario`] values; within a
//! scenario, relays keep first-appearance order so gene indexing is stable and
//! two loads of the same file score identically.

use log::warn;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Failed to read scenario file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse scenario JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid scenario '{scenario}': {reason}")]
    Invalid { scenario: String, reason: String },
    #[error("Pair references unknown relay '{relay}' in scenario '{scenario}'")]
    DanglingRelay { scenario: String, relay: String },
}

/// A relay's tunable settings: time-dial setting and pickup current.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaySettings {
    pub tds: f64,
    pub pickup: f64,
}

/// One relay in a scenario, with its pre-optimization settings when the input
/// file carries them.
#[derive(Debug, Clone)]
pub struct Relay {
    pub id: String,
    pub initial: Option<RelaySettings>,
    /// Smallest fault current this relay sees across all its pairs. The
    /// pickup upper bound is derived from it: a pickup above every observable
    /// fault current would blind the relay.
    pub min_fault_current: f64,
}

/// A main/backup relay pair with the fault currents seen at each end.
/// Relays are referenced by index into [`Scenario::relays`].
#[derive(Debug, Clone, Copy)]
pub struct RelayPair {
    pub main: usize,
    pub backup: usize,
    pub fault_current_main: f64,
    pub fault_current_backup: f64,
}

/// One coordination scenario: the distinct relays plus every main/backup pair.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub id: String,
    pub relays: Vec<Relay>,
    pub pairs: Vec<RelayPair>,
}

/// Pair description by relay name, used to build a [`Scenario`].
#[derive(Debug, Clone)]
pub struct PairInput {
    pub main_id: String,
    pub backup_id: String,
    pub fault_current_main: f64,
    pub fault_current_backup: f64,
    pub main_settings: Option<RelaySettings>,
    pub backup_settings: Option<RelaySettings>,
}

impl Scenario {
    /// Builds a scenario from named pair inputs, registering relays in
    /// first-appearance order and tracking each relay's minimum fault current.
    ///
    /// # Errors
    /// * `ScenarioError::Invalid` - No pairs, or a non-positive fault current.
    pub fn from_pairs(id: &str, inputs: &[PairInput]) -> Result<Self, ScenarioError> {
        if inputs.is_empty() {
            return Err(ScenarioError::Invalid {
                scenario: id.to_string(),
                reason: "scenario contains no relay pairs".to_string(),
            });
        }

        let mut relays: Vec<Relay> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut pairs: Vec<RelayPair> = Vec::with_capacity(inputs.len());

        let mut register =
            |relays: &mut Vec<Relay>,
             index: &mut HashMap<String, usize>,
             name: &str,
             settings: Option<RelaySettings>| {
                let idx = *index.entry(name.to_string()).or_insert_with(|| {
                    relays.push(Relay {
                        id: name.to_string(),
                        initial: None,
                        min_fault_current: f64::INFINITY,
                    });
                    relays.len() - 1
                });
                // First record with settings wins, matching the original data
                // pipeline's "store once" behavior.
                if relays[idx].initial.is_none() {
                    relays[idx].initial = settings;
                }
                idx
            };

        for input in inputs {
            if input.fault_current_main <= 0.0 || !input.fault_current_main.is_finite() {
                return Err(ScenarioError::Invalid {
                    scenario: id.to_string(),
                    reason: format!(
                        "non-positive fault current {} at main relay '{}'",
                        input.fault_current_main, input.main_id
                    ),
                });
            }
            if input.fault_current_backup <= 0.0 || !input.fault_current_backup.is_finite() {
                return Err(ScenarioError::Invalid {
                    scenario: id.to_string(),
                    reason: format!(
                        "non-positive fault current {} at backup relay '{}'",
                        input.fault_current_backup, input.backup_id
                    ),
                });
            }

            let main = register(&mut relays, &mut index, &input.main_id, input.main_settings);
            let backup = register(
                &mut relays,
                &mut index,
                &input.backup_id,
                input.backup_settings,
            );

            relays[main].min_fault_current =
                relays[main].min_fault_current.min(input.fault_current_main);
            relays[backup].min_fault_current = relays[backup]
                .min_fault_current
                .min(input.fault_current_backup);

            pairs.push(RelayPair {
                main,
                backup,
                fault_current_main: input.fault_current_main,
                fault_current_backup: input.fault_current_backup,
            });
        }

        Ok(Self {
            id: id.to_string(),
            relays,
            pairs,
        })
    }

    /// Re-checks the structural invariants. Construction through
    /// [`Scenario::from_pairs`] already guarantees them; this guards
    /// hand-built scenarios at the engine boundary.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.relays.is_empty() {
            return Err(ScenarioError::Invalid {
                scenario: self.id.clone(),
                reason: "scenario has no relays".to_string(),
            });
        }
        if self.pairs.is_empty() {
            return Err(ScenarioError::Invalid {
                scenario: self.id.clone(),
                reason: "scenario has no relay pairs".to_string(),
            });
        }
        for pair in &self.pairs {
            if pair.main >= self.relays.len() {
                return Err(ScenarioError::DanglingRelay {
                    scenario: self.id.clone(),
                    relay: format!("#{}", pair.main),
                });
            }
            if pair.backup >= self.relays.len() {
                return Err(ScenarioError::DanglingRelay {
                    scenario: self.id.clone(),
                    relay: format!("#{}", pair.backup),
                });
            }
            if pair.fault_current_main <= 0.0 || pair.fault_current_backup <= 0.0 {
                return Err(ScenarioError::Invalid {
                    scenario: self.id.clone(),
                    reason: "pair has a non-positive fault current".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Number of genes in a candidate vector: TDS and pickup per relay.
    pub fn num_genes(&self) -> usize {
        2 * self.relays.len()
    }

    /// Encodes the scenario's original settings as a gene vector (TDS block
    /// then pickup block), or `None` if any relay lacks them.
    pub fn initial_genes(&self) -> Option<Vec<f64>> {
        let n = self.relays.len();
        let mut genes = vec![0.0; 2 * n];
        for (i, relay) in self.relays.iter().enumerate() {
            let settings = relay.initial?;
            genes[i] = settings.tds;
            genes[n + i] = settings.pickup;
        }
        Some(genes)
    }
}

/// Raw JSON shape of one relay inside a pair record.
#[derive(Deserialize, Debug)]
struct RawRelay {
    relay: Option<String>,
    #[serde(alias = "I_shc", alias = "Isc", alias = "fault_current")]
    #[serde(rename = "Ishc")]
    ishc: Option<f64>,
    #[serde(alias = "tds")]
    #[serde(rename = "TDS")]
    tds: Option<f64>,
    #[serde(alias = "pickup")]
    #[serde(rename = "pick_up")]
    pick_up: Option<f64>,
}

/// Raw JSON shape of one relay-pair record.
#[derive(Deserialize, Debug)]
struct RawPairRecord {
    scenario_id: Option<String>,
    main_relay: Option<RawRelay>,
    backup_relay: Option<RawRelay>,
}

fn settings_of(raw: &RawRelay) -> Option<RelaySettings> {
    match (raw.tds, raw.pick_up) {
        (Some(tds), Some(pickup)) => Some(RelaySettings { tds, pickup }),
        _ => None,
    }
}

/// Parses a flat list of relay-pair records and groups it into scenarios.
///
/// Records with a missing scenario id, missing relay names, or non-positive
/// fault currents are skipped with a warning rather than failing the whole
/// batch; a malformed record is bad data for one pair, not for every scenario
/// in the file. Scenarios are returned sorted by id, numeric suffixes ordered
/// numerically so `scenario_2` precedes `scenario_10`.
pub fn parse_scenarios(json: &str) -> Result<Vec<Scenario>, ScenarioError> {
    let records: Vec<RawPairRecord> = serde_json::from_str(json)?;

    let mut grouped: HashMap<String, Vec<PairInput>> = HashMap::new();
    let mut skipped = 0usize;

    for record in &records {
        let (Some(sid), Some(main), Some(backup)) = (
            record.scenario_id.as_deref(),
            record.main_relay.as_ref(),
            record.backup_relay.as_ref(),
        ) else {
            skipped += 1;
            continue;
        };

        let main_name = main.relay.as_deref().map(str::trim).unwrap_or("");
        let backup_name = backup.relay.as_deref().map(str::trim).unwrap_or("");
        if main_name.is_empty() || backup_name.is_empty() {
            skipped += 1;
            continue;
        }

        let (Some(im), Some(ib)) = (main.ishc, backup.ishc) else {
            skipped += 1;
            continue;
        };
        if im <= 0.0 || ib <= 0.0 {
            skipped += 1;
            continue;
        }

        grouped.entry(sid.to_string()).or_default().push(PairInput {
            main_id: main_name.to_string(),
            backup_id: backup_name.to_string(),
            fault_current_main: im,
            fault_current_backup: ib,
            main_settings: settings_of(main),
            backup_settings: settings_of(backup),
        });
    }

    if skipped > 0 {
        warn!("Skipped {} malformed relay-pair records", skipped);
    }

    let mut ids: Vec<String> = grouped.keys().cloned().collect();
    ids.sort_by_key(|id| (numeric_suffix(id).is_none(), numeric_suffix(id), id.clone()));

    let mut scenarios = Vec::with_capacity(ids.len());
    for id in ids {
        scenarios.push(Scenario::from_pairs(&id, &grouped[&id])?);
    }
    Ok(scenarios)
}

/// Loads and groups scenarios from a JSON file.
pub fn load_scenarios(path: &Path) -> Result<Vec<Scenario>, ScenarioError> {
    let content = fs::read_to_string(path)?;
    parse_scenarios(&content)
}

fn numeric_suffix(id: &str) -> Option<u64> {
    id.rsplit(['_', '-']).next().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(main: &str, backup: &str, im: f64, ib: f64) -> PairInput {
        PairInput {
            main_id: main.to_string(),
            backup_id: backup.to_string(),
            fault_current_main: im,
            fault_current_backup: ib,
            main_settings: Some(RelaySettings {
                tds: 0.3,
                pickup: 5.0,
            }),
            backup_settings: Some(RelaySettings {
                tds: 0.3,
                pickup: 5.0,
            }),
        }
    }

    #[test]
    fn test_from_pairs_registers_distinct_relays_in_order() {
        let scenario = Scenario::from_pairs(
            "s1",
            &[
                pair("R1", "R2", 1000.0, 800.0),
                pair("R2", "R3", 900.0, 700.0),
                pair("R1", "R3", 1100.0, 650.0),
            ],
        )
        .unwrap();

        let ids: Vec<&str> = scenario.relays.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["R1", "R2", "R3"]);
        assert_eq!(scenario.pairs.len(), 3);
        assert_eq!(scenario.num_genes(), 6);
    }

    #[test]
    fn test_min_fault_current_tracking() {
        let scenario = Scenario::from_pairs(
            "s1",
            &[
                pair("R1", "R2", 1000.0, 800.0),
                pair("R1", "R2", 400.0, 900.0),
            ],
        )
        .unwrap();

        assert_eq!(scenario.relays[0].min_fault_current, 400.0);
        assert_eq!(scenario.relays[1].min_fault_current, 800.0);
    }

    #[test]
    fn test_rejects_empty_and_bad_currents() {
        assert!(Scenario::from_pairs("empty", &[]).is_err());
        assert!(Scenario::from_pairs("bad", &[pair("R1", "R2", -1.0, 800.0)]).is_err());
        assert!(Scenario::from_pairs("bad", &[pair("R1", "R2", 1000.0, 0.0)]).is_err());
    }

    #[test]
    fn test_validate_catches_dangling_reference() {
        let mut scenario =
            Scenario::from_pairs("s1", &[pair("R1", "R2", 1000.0, 800.0)]).unwrap();
        scenario.pairs[0].backup = 7;
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::DanglingRelay { .. })
        ));
    }

    #[test]
    fn test_initial_genes_layout() {
        let scenario = Scenario::from_pairs("s1", &[pair("R1", "R2", 1000.0, 800.0)]).unwrap();
        let genes = scenario.initial_genes().unwrap();
        // TDS block first, then pickup block.
        assert_eq!(genes, vec![0.3, 0.3, 5.0, 5.0]);
    }

    #[test]
    fn test_initial_genes_missing_settings() {
        let mut input = pair("R1", "R2", 1000.0, 800.0);
        input.backup_settings = None;
        let scenario = Scenario::from_pairs("s1", &[input]).unwrap();
        assert!(scenario.initial_genes().is_none());
    }

    #[test]
    fn test_parse_scenarios_groups_and_sorts() {
        let json = r#"[
            {"scenario_id": "scenario_10", "fault": "3ph",
             "main_relay": {"relay": "R1", "Ishc": 1200.0, "TDS": 0.3, "pick_up": 5.0},
             "backup_relay": {"relay": "R2", "Ishc": 950.0, "TDS": 0.4, "pick_up": 4.0}},
            {"scenario_id": "scenario_2", "fault": "3ph",
             "main_relay": {"relay": "R3", "Ishc": 800.0, "TDS": 0.2, "pick_up": 6.0},
             "backup_relay": {"relay": "R4", "Ishc": 700.0, "TDS": 0.5, "pick_up": 3.0}}
        ]"#;

        let scenarios = parse_scenarios(json).unwrap();
        assert_eq!(scenarios.len(), 2);
        // Numeric suffix ordering: scenario_2 before scenario_10.
        assert_eq!(scenarios[0].id, "scenario_2");
        assert_eq!(scenarios[1].id, "scenario_10");
        assert_eq!(
            scenarios[0].relays[0].initial,
            Some(RelaySettings {
                tds: 0.2,
                pickup: 6.0
            })
        );
    }

    #[test]
    fn test_parse_scenarios_skips_malformed_records() {
        let json = r#"[
            {"scenario_id": "s1",
             "main_relay": {"relay": "R1", "Ishc": 1200.0},
             "backup_relay": {"relay": "R2", "Ishc": 950.0}},
            {"scenario_id": "s1",
             "main_relay": {"relay": "", "Ishc": 1200.0},
             "backup_relay": {"relay": "R2", "Ishc": 950.0}},
            {"scenario_id": "s1",
             "main_relay": {"relay": "R1", "Ishc": -5.0},
             "backup_relay": {"relay": "R2", "Ishc": 950.0}},
            {"main_relay": {"relay": "R1", "Ishc": 1200.0},
             "backup_relay": {"relay": "R2", "Ishc": 950.0}}
        ]"#;

        let scenarios = parse_scenarios(json).unwrap();
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].pairs.len(), 1);
    }

    #[test]
    fn test_parse_accepts_field_aliases() {
        let json = r#"[
            {"scenario_id": "s1",
             "main_relay": {"relay": "R1", "fault_current": 1200.0, "tds": 0.3, "pickup": 5.0},
             "backup_relay": {"relay": "R2", "Isc": 950.0, "tds": 0.4, "pickup": 4.0}}
        ]"#;
        let scenarios = parse_scenarios(json).unwrap();
        assert_eq!(scenarios[0].pairs[0].fault_current_main, 1200.0);
        assert_eq!(scenarios[0].pairs[0].fault_current_backup, 950.0);
        assert!(scenarios[0].initial_genes().is_some());
    }
}
